use crate::prelude::*;

use enum_dispatch::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

use crate::state::Alarm;

pub mod pi30;
pub mod pi30revo;

pub use pi30::Pi30;
pub use pi30revo::Pi30Revo;

// DialectKind {{{
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    Pi30,
    Pi30Revo,
}

impl std::fmt::Display for DialectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DialectKind::Pi30 => write!(f, "pi30"),
            DialectKind::Pi30Revo => write!(f, "pi30revo"),
        }
    }
} // }}}

// Query {{{
/// The logical queries the bridge issues. Each dialect names its own command.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Query {
    Identify,
    Status,
    Mode,
    Warnings,
    SerialNumber,
    Firmware,
} // }}}

// priorities {{{
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ChargerPriority {
    UtilityFirst = 0,
    SolarFirst = 1,
    SolarAndUtility = 2,
    SolarOnly = 3,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum OutputSourcePriority {
    UtilityFirst = 0,
    SolarFirst = 1,
    Sbu = 2,
} // }}}

/// A single device-level setting change.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControlCommand {
    ChargerPriority(ChargerPriority),
    OutputSourcePriority(OutputSourcePriority),
    UtilityChargeCurrent(u16),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DeviceMode {
    Line,
    Battery,
    Standby,
    Other(String),
}

/// One warning/fault flag feeding one published alarm.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AlarmSource {
    pub alarm: Alarm,
    pub key: &'static str,
    pub level: AlarmLevel,
}

// Telemetry {{{
/// Measurements pulled out of a status reading, before any estimation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Telemetry {
    pub battery_voltage: Option<f64>,
    pub battery_charging_current: Option<f64>,
    pub battery_discharge_current: Option<f64>,
    pub soc: Option<f64>,
    pub temperature: Option<f64>,

    pub ac_in_voltage: Option<f64>,
    pub ac_in_frequency: Option<f64>,
    pub ac_out_voltage: Option<f64>,
    pub ac_out_frequency: Option<f64>,
    pub ac_out_power: Option<f64>,
    pub ac_out_apparent_power: Option<f64>,

    pub pv_voltage: Option<f64>,
    pub pv_power: Option<f64>,

    pub load_on: Option<bool>,
    /// Charger active in any form.
    pub charging_on: bool,
} // }}}

#[enum_dispatch]
pub trait DialectOps {
    fn kind(&self) -> DialectKind;

    /// Protocol name understood by the external `mpp-solar` tool.
    fn tool_protocol(&self) -> &'static str;

    fn product_name(&self) -> &'static str;

    fn command(&self, query: Query) -> &'static str;

    /// Turn a response payload (frame markers and CRC already stripped) into
    /// named fields. `command` is the request that produced it.
    fn decode(&self, command: &str, payload: &str) -> Result<Reading>;

    fn telemetry(&self, status: &Reading) -> Telemetry;

    fn device_mode(&self, mode: &Reading) -> DeviceMode;

    fn alarm_sources(&self) -> &'static [AlarmSource];

    fn encode(&self, command: &ControlCommand) -> String;

    /// Utility charge currents the device accepts, ascending.
    fn utility_charge_currents(&self) -> &'static [u16];

    fn matches_identity(&self, identity: &Reading) -> bool;
}

#[enum_dispatch(DialectOps)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Dialect {
    Pi30(Pi30),
    Pi30Revo(Pi30Revo),
}

impl From<DialectKind> for Dialect {
    fn from(kind: DialectKind) -> Self {
        match kind {
            DialectKind::Pi30 => Dialect::Pi30(Pi30),
            DialectKind::Pi30Revo => Dialect::Pi30Revo(Pi30Revo),
        }
    }
}

// Device {{{
/// The selected dialect paired with the transport that reaches the device.
pub struct Device {
    dialect: Dialect,
    protocol: Box<dyn Protocol>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("dialect", &self.dialect)
            .finish_non_exhaustive()
    }
}

impl Device {
    pub fn new(dialect: Dialect, protocol: Box<dyn Protocol>) -> Self {
        Self { dialect, protocol }
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub async fn query(&mut self, query: Query) -> Result<Reading> {
        let command = self.dialect.command(query);
        self.protocol.execute(command).await
    }

    /// Issue a setting change. The device must acknowledge it.
    pub async fn send(&mut self, command: &ControlCommand) -> Result<String> {
        let raw = self.dialect.encode(command);
        let reading = self.protocol.execute(&raw).await?;

        if let Some(err) = reading.error() {
            bail!("{} failed: {}", raw, err);
        }

        let refused = [raw.as_str(), "response"]
            .iter()
            .filter_map(|key| reading.str(key))
            .any(|v| v.eq_ignore_ascii_case("nak") || v.eq_ignore_ascii_case("failed"));
        if refused {
            bail!("{} refused by device", raw);
        }

        Ok(raw)
    }
} // }}}

/// Probe each candidate in order with its identification query. PI30 and
/// PI30 Revo both identify as PI30, so a candidate must also read a status
/// response in its own layout. The first one that passes both is kept for the
/// process lifetime.
pub async fn detect<F>(candidates: &[DialectKind], mut connect: F) -> Result<Device>
where
    F: FnMut(Dialect) -> Result<Box<dyn Protocol>>,
{
    for kind in candidates {
        let dialect = Dialect::from(*kind);

        let protocol = match connect(dialect) {
            Ok(protocol) => protocol,
            Err(err) => {
                warn!("{}: cannot open device: {:#}", kind, err);
                continue;
            }
        };

        let mut device = Device::new(dialect, protocol);
        match device.query(Query::Identify).await {
            Ok(reading) if reading.error().is_none() && dialect.matches_identity(&reading) => {
                match device.query(Query::Status).await {
                    Ok(status) if status.error().is_none() => {
                        info!("detected {} dialect", kind);
                        return Ok(device);
                    }
                    Ok(status) => {
                        debug!("{}: status reports {:?}", kind, status.error());
                    }
                    Err(err) => {
                        debug!("{}: status not in this layout: {:#}", kind, err);
                    }
                }
            }
            Ok(reading) => {
                debug!("{}: identity mismatch {:?}", kind, reading);
            }
            Err(err) => {
                debug!("{}: no response: {:#}", kind, err);
            }
        }
    }

    bail!(
        "no dialect matched the device (tried {})",
        candidates
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )
}
