use crate::prelude::*;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// Paths {{{
pub mod paths {
    pub const STATE: &str = "/State";
    pub const CONNECTED: &str = "/Connected";

    pub const AC_IN_V: &str = "/Ac/In/1/L1/V";
    pub const AC_IN_F: &str = "/Ac/In/1/L1/F";
    pub const AC_IN_P: &str = "/Ac/In/1/L1/P";
    pub const AC_OUT_V: &str = "/Ac/Out/L1/V";
    pub const AC_OUT_F: &str = "/Ac/Out/L1/F";
    pub const AC_OUT_P: &str = "/Ac/Out/L1/P";
    pub const AC_OUT_S: &str = "/Ac/Out/L1/S";

    pub const DC_V: &str = "/Dc/0/Voltage";
    pub const DC_I: &str = "/Dc/0/Current";
    pub const SOC: &str = "/Soc";
    pub const TEMPERATURE: &str = "/Temperature";

    pub const PV_V: &str = "/Pv/0/V";
    pub const PV_P: &str = "/Pv/0/P";
    pub const YIELD_POWER: &str = "/Yield/Power";

    pub const ALARM_CONNECTION: &str = "/Alarms/Connection";

    pub const MGMT_PROCESS_NAME: &str = "/Mgmt/ProcessName";
    pub const MGMT_PROCESS_VERSION: &str = "/Mgmt/ProcessVersion";
    pub const MGMT_CONNECTION: &str = "/Mgmt/Connection";
    pub const DEVICE_INSTANCE: &str = "/DeviceInstance";
    pub const PRODUCT_ID: &str = "/ProductId";
    pub const PRODUCT_NAME: &str = "/ProductName";
    pub const FIRMWARE_VERSION: &str = "/FirmwareVersion";
    pub const HARDWARE_VERSION: &str = "/HardwareVersion";
    pub const SERIAL: &str = "/Serial";
    pub const NUMBER_OF_PHASES: &str = "/Ac/NumberOfPhases";
    pub const AC_IN_TYPE: &str = "/Ac/In/1/Type";
    pub const ACTIVE_INPUT: &str = "/Ac/ActiveIn/ActiveInput";
} // }}}

// BusValue {{{
/// A typed value as carried on the bus. `Null` is the bus's "unknown".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BusValue {
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl BusValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BusValue::Int(i) => Some(*i as f64),
            BusValue::Float(f) => Some(*f),
            BusValue::Text(s) => s.trim().parse().ok(),
            BusValue::Null => None,
        }
    }

    /// Integer view of the value; floats only convert when they carry no fraction.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            BusValue::Int(i) => Some(*i),
            BusValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            BusValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<Option<f64>> for BusValue {
    fn from(value: Option<f64>) -> Self {
        value.map(BusValue::Float).unwrap_or(BusValue::Null)
    }
}

impl From<f64> for BusValue {
    fn from(value: f64) -> Self {
        BusValue::Float(value)
    }
}

impl From<i64> for BusValue {
    fn from(value: i64) -> Self {
        BusValue::Int(value)
    }
}

impl From<&str> for BusValue {
    fn from(value: &str) -> Self {
        BusValue::Text(value.to_owned())
    }
}

impl std::fmt::Display for BusValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusValue::Int(i) => write!(f, "{}", i),
            BusValue::Float(v) => write!(f, "{}", v),
            BusValue::Text(s) => write!(f, "{:?}", s),
            BusValue::Null => write!(f, "null"),
        }
    }
} // }}}

/// One atomic publish: every path in here is written to the bus together.
pub type Snapshot = BTreeMap<&'static str, BusValue>;

// OperatingState {{{
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum OperatingState {
    #[default]
    Off = 0,
    Bulk = 3,
    Storage = 6,
    Passthru = 8,
    Inverting = 9,
} // }}}

// AlarmLevel {{{
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AlarmLevel {
    #[default]
    Ok = 0,
    Warning = 1,
    Alarm = 2,
} // }}}

// Alarm {{{
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Alarm {
    HighTemperature,
    HighVoltage,
    HighVoltageAcOut,
    LowVoltage,
    LowVoltageAcOut,
    Overload,
    Ripple,
}

impl Alarm {
    pub fn all() -> &'static [Alarm] {
        use Alarm::*;
        &[
            HighTemperature,
            HighVoltage,
            HighVoltageAcOut,
            LowVoltage,
            LowVoltageAcOut,
            Overload,
            Ripple,
        ]
    }

    pub fn path(&self) -> &'static str {
        use Alarm::*;
        match self {
            HighTemperature => "/Alarms/HighTemperature",
            HighVoltage => "/Alarms/HighVoltage",
            HighVoltageAcOut => "/Alarms/HighVoltageAcOut",
            LowVoltage => "/Alarms/LowVoltage",
            LowVoltageAcOut => "/Alarms/LowVoltageAcOut",
            Overload => "/Alarms/Overload",
            Ripple => "/Alarms/Ripple",
        }
    }
} // }}}

// InverterState {{{
/// The canonical device state. Only the poll cycle builds one of these;
/// control fields arrive through the pending queue.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InverterState {
    pub operating_state: OperatingState,
    pub connected: bool,

    pub ac_in_voltage: Option<f64>,
    pub ac_in_frequency: Option<f64>,
    pub ac_in_power: Option<f64>,
    pub ac_out_voltage: Option<f64>,
    pub ac_out_frequency: Option<f64>,
    pub ac_out_power: Option<f64>,
    pub ac_out_apparent_power: Option<f64>,

    pub dc_voltage: Option<f64>,
    pub dc_current: Option<f64>,
    pub soc: Option<f64>,
    pub temperature: Option<f64>,

    pub pv_voltage: Option<f64>,
    pub pv_power: Option<f64>,

    pub connection_alarm: AlarmLevel,
    pub alarms: BTreeMap<Alarm, AlarmLevel>,

    pub controls: BTreeMap<ControlPath, BusValue>,
}

impl InverterState {
    pub fn alarm(&self, alarm: Alarm) -> AlarmLevel {
        self.alarms.get(&alarm).copied().unwrap_or_default()
    }

    pub fn to_snapshot(&self) -> Snapshot {
        use paths::*;

        let mut s = Snapshot::new();

        s.insert(STATE, BusValue::Int(u8::from(self.operating_state) as i64));
        s.insert(CONNECTED, BusValue::Int(self.connected as i64));

        s.insert(AC_IN_V, self.ac_in_voltage.into());
        s.insert(AC_IN_F, self.ac_in_frequency.into());
        s.insert(AC_IN_P, self.ac_in_power.into());
        s.insert(AC_OUT_V, self.ac_out_voltage.into());
        s.insert(AC_OUT_F, self.ac_out_frequency.into());
        s.insert(AC_OUT_P, self.ac_out_power.into());
        s.insert(AC_OUT_S, self.ac_out_apparent_power.into());

        s.insert(DC_V, self.dc_voltage.into());
        s.insert(DC_I, self.dc_current.into());
        s.insert(SOC, self.soc.into());
        s.insert(TEMPERATURE, self.temperature.into());

        s.insert(PV_V, self.pv_voltage.into());
        s.insert(PV_P, self.pv_power.into());
        s.insert(YIELD_POWER, self.pv_power.into());

        s.insert(
            ALARM_CONNECTION,
            BusValue::Int(u8::from(self.connection_alarm) as i64),
        );
        for alarm in Alarm::all() {
            s.insert(alarm.path(), BusValue::Int(u8::from(self.alarm(*alarm)) as i64));
        }

        for (path, value) in &self.controls {
            s.insert(path.as_str(), value.clone());
        }

        s
    }
} // }}}

// Identity {{{
/// Static device-object fields, published once after detection.
#[derive(Clone, Debug, PartialEq)]
pub struct Identity {
    pub process_name: String,
    pub process_version: String,
    pub connection: String,
    pub device_instance: u32,
    pub product_name: String,
    pub serial: Option<String>,
    pub firmware: Option<String>,
}

impl Identity {
    pub fn to_snapshot(&self) -> Snapshot {
        use paths::*;

        let mut s = Snapshot::new();
        s.insert(MGMT_PROCESS_NAME, self.process_name.as_str().into());
        s.insert(MGMT_PROCESS_VERSION, self.process_version.as_str().into());
        s.insert(MGMT_CONNECTION, self.connection.as_str().into());
        s.insert(DEVICE_INSTANCE, BusValue::Int(self.device_instance as i64));
        s.insert(PRODUCT_ID, BusValue::Int(0));
        s.insert(PRODUCT_NAME, self.product_name.as_str().into());
        s.insert(
            FIRMWARE_VERSION,
            self.firmware
                .as_deref()
                .map(BusValue::from)
                .unwrap_or(BusValue::Int(0)),
        );
        s.insert(HARDWARE_VERSION, BusValue::Int(0));
        s.insert(
            SERIAL,
            self.serial.as_deref().map(BusValue::from).unwrap_or(BusValue::Null),
        );
        s.insert(CONNECTED, BusValue::Int(1));
        s.insert(NUMBER_OF_PHASES, BusValue::Int(1));
        s.insert(AC_IN_TYPE, BusValue::Int(1)); // grid
        s.insert(ACTIVE_INPUT, BusValue::Int(0));
        s
    }
} // }}}
