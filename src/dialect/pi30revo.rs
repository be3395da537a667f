use crate::prelude::*;

use super::pi30::{self, Field, DEVICE_STATUS, DEVICE_STATUS2};
use super::{AlarmSource, ControlCommand, DeviceMode, Query, Telemetry};

/// PI30 variant used by the Revo family. Same commands, but the status
/// response carries PV power where PI30 reports the SCC battery voltage.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Pi30Revo;

const STATUS: &[Field] = &[
    Field::Number("ac_input_voltage"),
    Field::Number("ac_input_frequency"),
    Field::Number("ac_output_voltage"),
    Field::Number("ac_output_frequency"),
    Field::Number("ac_output_apparent_power"),
    Field::Number("ac_output_active_power"),
    Field::Number("ac_output_load"),
    Field::Number("bus_voltage"),
    Field::Number("battery_voltage"),
    Field::Number("battery_charging_current"),
    Field::Number("battery_capacity"),
    Field::Number("inverter_heat_sink_temperature"),
    Field::Number("pv_input_current_for_battery"),
    Field::Number("pv_input_voltage"),
    Field::Number("pv_input_power"),
    Field::Number("battery_discharge_current"),
    Field::Flags(DEVICE_STATUS),
    Field::Number("battery_voltage_offset_for_fans_on"),
    Field::Text("eeprom_version"),
    Field::Flags(DEVICE_STATUS2),
];

const STATUS_FIELD_COUNTS: &[usize] = &[20];

impl super::DialectOps for Pi30Revo {
    fn kind(&self) -> DialectKind {
        DialectKind::Pi30Revo
    }

    fn tool_protocol(&self) -> &'static str {
        "pi30revo"
    }

    fn product_name(&self) -> &'static str {
        "MPP Solar PI30 Revo Inverter"
    }

    fn command(&self, query: Query) -> &'static str {
        pi30::command(query)
    }

    fn decode(&self, command: &str, payload: &str) -> Result<Reading> {
        pi30::decode(command, payload, STATUS, STATUS_FIELD_COUNTS)
    }

    fn telemetry(&self, status: &Reading) -> Telemetry {
        pi30::telemetry(status)
    }

    fn device_mode(&self, mode: &Reading) -> DeviceMode {
        pi30::device_mode(mode)
    }

    fn alarm_sources(&self) -> &'static [AlarmSource] {
        pi30::ALARM_SOURCES
    }

    fn encode(&self, command: &ControlCommand) -> String {
        pi30::encode(command)
    }

    fn utility_charge_currents(&self) -> &'static [u16] {
        pi30::UTILITY_CHARGE_CURRENTS
    }

    fn matches_identity(&self, identity: &Reading) -> bool {
        pi30::matches_identity(identity)
    }
}
