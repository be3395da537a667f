use crate::prelude::*;

use crate::config::Estimation;
use crate::coordinator::alarms;
use crate::coordinator::commands::read_status::{ReadStatus, Readings};
use crate::coordinator::estimate::CarryOver;
use crate::coordinator::pending::PendingReceiver;
use crate::dialect::{DeviceMode, Telemetry};
use crate::state::InverterState;

/// Result of one successful cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct Outcome {
    pub snapshot: Snapshot,
    /// Pending writes folded into this snapshot.
    pub applied: usize,
}

/// Owns the published state. Nothing else writes derived fields; accepted bus
/// writes only reach it through the pending queue.
pub struct PollCycle {
    estimation: Estimation,
    carry: CarryOver,
    dc_power: watch::Receiver<Option<f64>>,
    state: InverterState,
}

impl PollCycle {
    pub fn new(estimation: Estimation, dc_power: watch::Receiver<Option<f64>>) -> Self {
        Self {
            estimation,
            carry: CarryOver::default(),
            dc_power,
            state: InverterState::default(),
        }
    }

    pub fn state(&self) -> &InverterState {
        &self.state
    }

    pub fn carry(&self) -> &CarryOver {
        &self.carry
    }

    /// Read, derive, fold in pending writes, then replace the state in one
    /// step. A failed read leaves state, carry-overs and the queue untouched.
    pub async fn run(&mut self, device: &mut Device, pending: &mut PendingReceiver) -> Result<Outcome> {
        let readings = ReadStatus::new().run(device).await?;
        let dc_power = *self.dc_power.borrow();

        let mut state = self.derive(device.dialect(), &readings, dc_power);

        let writes = pending.drain();
        let applied = writes.len();
        for (path, value) in writes {
            debug!("applying pending {} = {}", path, value);
            state.controls.insert(path, value);
        }

        self.state = state;

        Ok(Outcome {
            snapshot: self.state.to_snapshot(),
            applied,
        })
    }

    pub fn derive(&mut self, dialect: &Dialect, readings: &Readings, dc_power: Option<f64>) -> InverterState {
        let mut state = InverterState {
            controls: self.state.controls.clone(),
            alarms: alarms::map(dialect.alarm_sources(), &readings.warnings),
            ..Default::default()
        };

        if let Some(err) = readings.status.error() {
            warn!("device reports a connection error: {}", err);
            state.operating_state = OperatingState::Off;
            state.connection_alarm = AlarmLevel::Alarm;
            state.connected = false;
            self.carry.reset();
            return state;
        }
        state.connected = true;

        let t = dialect.telemetry(&readings.status);
        let mode = dialect.device_mode(&readings.mode);
        state.operating_state = operating_state(&mode, t.charging_on);

        state.dc_voltage = t.battery_voltage;
        state.dc_current = dc_current(&t);
        state.soc = t.soc;
        state.temperature = t.temperature;
        state.ac_in_voltage = t.ac_in_voltage;
        state.ac_in_frequency = t.ac_in_frequency;
        state.ac_out_voltage = t.ac_out_voltage;
        state.ac_out_frequency = t.ac_out_frequency;
        state.ac_out_apparent_power = t.ac_out_apparent_power;
        state.pv_voltage = t.pv_voltage;
        state.pv_power = t.pv_power;

        state.ac_out_power = self.carry.output_power(&t, dc_power, &self.estimation);

        if self.estimation.assume_bypass_when_load_off && t.load_on == Some(false) {
            state.ac_out_power = None;
            state.ac_out_apparent_power = None;
        }

        let charge_current = self.carry.charge_current(&t, dc_power, &self.estimation);
        state.ac_in_power = ac_input_power(
            state.operating_state,
            state.ac_out_power,
            t.charging_on,
            charge_current,
            t.battery_voltage,
        );

        state
    }
}

pub fn operating_state(mode: &DeviceMode, charging: bool) -> OperatingState {
    match (mode, charging) {
        (DeviceMode::Battery, _) => OperatingState::Inverting,
        (DeviceMode::Line, true) => OperatingState::Bulk,
        (DeviceMode::Line, false) => OperatingState::Passthru,
        (DeviceMode::Standby, true) => OperatingState::Storage,
        (DeviceMode::Standby, false) => OperatingState::Off,
        (DeviceMode::Other(_), _) => OperatingState::Off,
    }
}

/// Discharge is published as negative charge current.
fn dc_current(t: &Telemetry) -> Option<f64> {
    match (t.battery_discharge_current, t.battery_charging_current) {
        (Some(discharge), _) if discharge > 0.0 => Some(-discharge),
        (_, Some(charge)) => Some(charge),
        (Some(_), None) => Some(0.0),
        (None, None) => None,
    }
}

/// Input power is never measured: pass-through load plus whatever the
/// charger is pushing into the battery while it is active.
pub fn ac_input_power(
    state: OperatingState,
    ac_out_power: Option<f64>,
    charging: bool,
    charge_current: f64,
    battery_voltage: Option<f64>,
) -> Option<f64> {
    if state == OperatingState::Off {
        return None;
    }

    let base = if state == OperatingState::Inverting {
        0.0
    } else {
        ac_out_power.unwrap_or(0.0)
    };
    let charging = if charging {
        charge_current * battery_voltage.unwrap_or(0.0)
    } else {
        0.0
    };

    Some(base + charging)
}
