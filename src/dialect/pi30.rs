use crate::prelude::*;

use super::{AlarmSource, ControlCommand, DeviceMode, Query, Telemetry};
use crate::state::Alarm;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Pi30;

// status layout {{{
#[derive(Clone, Copy, Debug)]
pub(super) enum Field {
    Number(&'static str),
    Text(&'static str),
    Flags(&'static [&'static str]),
}

/// Bits of `device_status`, most significant first.
pub(super) const DEVICE_STATUS: &[&str] = &[
    "is_sbu_priority_version_added",
    "is_configuration_changed",
    "is_scc_firmware_updated",
    "is_load_on",
    "is_battery_voltage_to_steady_while_charging",
    "is_charging_on",
    "is_scc_charging_on",
    "is_ac_charging_on",
];

pub(super) const DEVICE_STATUS2: &[&str] = &[
    "is_charging_to_floating",
    "is_switched_on",
    "is_dustproof_installed",
];

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
    Field::Number("battery_voltage_from_scc"),
    Field::Number("battery_discharge_current"),
    Field::Flags(DEVICE_STATUS),
    Field::Number("battery_voltage_offset_for_fans_on"),
    Field::Text("eeprom_version"),
    Field::Number("pv_input_power"),
    Field::Flags(DEVICE_STATUS2),
];

/// Field counts a PI30 status response may have. Older firmware stops after
/// the status bits; 20 fields is the Revo layout and never PI30.
const STATUS_FIELD_COUNTS: &[usize] = &[17, 18, 19, 21];
// }}}

// warnings {{{
const WARNINGS: &[&str] = &[
    "reserved",
    "inverter_fault",
    "bus_over_fault",
    "bus_under_fault",
    "bus_soft_fail_fault",
    "line_fail_warning",
    "opv_short_warning",
    "inverter_voltage_too_low_fault",
    "inverter_voltage_too_high_fault",
    "over_temperature_fault",
    "fan_locked_fault",
    "battery_voltage_to_high_fault",
    "battery_low_alarm_warning",
    "reserved",
    "battery_under_shutdown_warning",
    "reserved",
    "overload_fault",
    "eeprom_fault",
    "inverter_over_current_fault",
    "inverter_soft_fail_fault",
    "self_test_fail_fault",
    "op_dc_voltage_over_fault",
    "bat_open_fault",
    "current_sensor_fail_fault",
    "battery_short_fault",
    "power_limit_warning",
    "pv_voltage_high_warning",
    "mppt_overload_fault",
    "mppt_overload_warning",
    "battery_too_low_to_charge_warning",
];

pub(super) const ALARM_SOURCES: &[AlarmSource] = &[
    AlarmSource {
        alarm: Alarm::HighTemperature,
        key: "over_temperature_fault",
        level: AlarmLevel::Alarm,
    },
    AlarmSource {
        alarm: Alarm::HighVoltage,
        key: "battery_voltage_to_high_fault",
        level: AlarmLevel::Alarm,
    },
    AlarmSource {
        alarm: Alarm::HighVoltageAcOut,
        key: "inverter_voltage_too_high_fault",
        level: AlarmLevel::Alarm,
    },
    AlarmSource {
        alarm: Alarm::LowVoltage,
        key: "battery_low_alarm_warning",
        level: AlarmLevel::Warning,
    },
    AlarmSource {
        alarm: Alarm::LowVoltage,
        key: "battery_under_shutdown_warning",
        level: AlarmLevel::Alarm,
    },
    AlarmSource {
        alarm: Alarm::LowVoltageAcOut,
        key: "inverter_voltage_too_low_fault",
        level: AlarmLevel::Alarm,
    },
    AlarmSource {
        alarm: Alarm::Overload,
        key: "overload_fault",
        level: AlarmLevel::Alarm,
    },
    AlarmSource {
        alarm: Alarm::Overload,
        key: "power_limit_warning",
        level: AlarmLevel::Warning,
    },
    AlarmSource {
        alarm: Alarm::Ripple,
        key: "bus_over_fault",
        level: AlarmLevel::Alarm,
    },
    AlarmSource {
        alarm: Alarm::Ripple,
        key: "bus_under_fault",
        level: AlarmLevel::Alarm,
    },
];
// }}}

pub(super) const UTILITY_CHARGE_CURRENTS: &[u16] = &[2, 10, 20, 30, 40, 50, 60];

// shared decoding {{{
pub(super) fn command(query: Query) -> &'static str {
    match query {
        Query::Identify => "QPI",
        Query::Status => "QPIGS",
        Query::Mode => "QMOD",
        Query::Warnings => "QPIWS",
        Query::SerialNumber => "QID",
        Query::Firmware => "QVFW",
    }
}

pub(super) fn decode(
    command: &str,
    payload: &str,
    status: &[Field],
    status_counts: &[usize],
) -> Result<Reading> {
    let payload = payload.trim();

    let r = match command {
        "QPI" => Reading::new().with("protocol_id", Value::Text(payload.to_owned())),
        "QPIGS" => decode_status(payload, status, status_counts)?,
        "QMOD" => decode_mode(payload)?,
        "QPIWS" => decode_flags(payload, WARNINGS)?,
        "QID" => Reading::new().with("serial_number", Value::Text(payload.to_owned())),
        "QVFW" => {
            let version = payload.strip_prefix("VERFW:").unwrap_or(payload);
            Reading::new().with("main_cpu_firmware_version", Value::Text(version.to_owned()))
        }
        _ => {
            // setting commands answer ACK or NAK
            if payload.eq_ignore_ascii_case("NAK") {
                bail!("{} answered NAK", command);
            }
            Reading::new().with("response", Value::Text(payload.to_owned()))
        }
    };

    Ok(r)
}

fn decode_status(payload: &str, layout: &[Field], counts: &[usize]) -> Result<Reading> {
    let values: Vec<&str> = payload.split_whitespace().collect();
    if !counts.contains(&values.len()) {
        bail!(
            "status response has {} fields, expected one of {:?}",
            values.len(),
            counts
        );
    }

    let mut r = Reading::new();
    for (field, raw) in layout.iter().zip(values) {
        match field {
            Field::Number(name) => {
                let n: f64 = raw
                    .parse()
                    .map_err(|_| anyhow!("{}: {:?} is not a number", name, raw))?;
                r.insert(name, Value::Number(n));
            }
            Field::Text(name) => r.insert(name, Value::Text(raw.to_owned())),
            Field::Flags(names) => {
                for (name, bit) in names.iter().zip(raw.chars()) {
                    r.insert(name, Value::Flag(bit == '1'));
                }
            }
        }
    }

    Ok(r)
}

fn decode_mode(payload: &str) -> Result<Reading> {
    let mode = match payload {
        "P" => "Power on",
        "S" => "Standby",
        "L" => "Line",
        "B" => "Battery",
        "F" => "Fault",
        "H" => "Power saving",
        "D" => "Shutdown",
        other => bail!("unknown mode letter {:?}", other),
    };

    Ok(Reading::new().with("device_mode", Value::Text(mode.to_owned())))
}

fn decode_flags(payload: &str, names: &[&str]) -> Result<Reading> {
    if payload.is_empty() || !payload.chars().all(|c| c == '0' || c == '1') {
        bail!("{:?} is not a bit string", payload);
    }

    let mut r = Reading::new();
    for (name, bit) in names.iter().zip(payload.chars()) {
        if *name != "reserved" {
            r.insert(name, Value::Flag(bit == '1'));
        }
    }

    Ok(r)
}

pub(super) fn telemetry(status: &Reading) -> Telemetry {
    Telemetry {
        battery_voltage: status.f64("battery_voltage"),
        battery_charging_current: status.f64("battery_charging_current"),
        battery_discharge_current: status.f64("battery_discharge_current"),
        soc: status.f64("battery_capacity"),
        temperature: status.f64("inverter_heat_sink_temperature"),

        ac_in_voltage: status.f64("ac_input_voltage"),
        ac_in_frequency: status.f64("ac_input_frequency"),
        ac_out_voltage: status.f64("ac_output_voltage"),
        ac_out_frequency: status.f64("ac_output_frequency"),
        ac_out_power: status.f64("ac_output_active_power"),
        ac_out_apparent_power: status.f64("ac_output_apparent_power"),

        pv_voltage: status.f64("pv_input_voltage"),
        pv_power: status.f64("pv_input_power"),

        load_on: status.flag("is_load_on"),
        charging_on: status.flag("is_charging_on").unwrap_or(false),
    }
}

pub(super) fn device_mode(mode: &Reading) -> DeviceMode {
    match mode.str("device_mode") {
        Some("Line") => DeviceMode::Line,
        Some("Battery") => DeviceMode::Battery,
        Some("Standby") => DeviceMode::Standby,
        Some(other) => DeviceMode::Other(other.to_owned()),
        None => DeviceMode::Other(String::new()),
    }
}

pub(super) fn encode(command: &ControlCommand) -> String {
    match command {
        ControlCommand::ChargerPriority(p) => format!("PCP{:02}", u8::from(*p)),
        ControlCommand::OutputSourcePriority(p) => format!("POP{:02}", u8::from(*p)),
        ControlCommand::UtilityChargeCurrent(amps) => format!("MUCHGC{:03}", amps),
    }
}

pub(super) fn matches_identity(identity: &Reading) -> bool {
    identity
        .str("protocol_id")
        .map(|id| id.trim().to_ascii_uppercase().starts_with("PI30"))
        .unwrap_or(false)
}
// }}}

impl super::DialectOps for Pi30 {
    fn kind(&self) -> DialectKind {
        DialectKind::Pi30
    }

    fn tool_protocol(&self) -> &'static str {
        "pi30"
    }

    fn product_name(&self) -> &'static str {
        "MPP Solar PI30 Inverter"
    }

    fn command(&self, query: Query) -> &'static str {
        command(query)
    }

    fn decode(&self, command: &str, payload: &str) -> Result<Reading> {
        decode(command, payload, STATUS, STATUS_FIELD_COUNTS)
    }

    fn telemetry(&self, status: &Reading) -> Telemetry {
        telemetry(status)
    }

    fn device_mode(&self, mode: &Reading) -> DeviceMode {
        device_mode(mode)
    }

    fn alarm_sources(&self) -> &'static [AlarmSource] {
        ALARM_SOURCES
    }

    fn encode(&self, command: &ControlCommand) -> String {
        encode(command)
    }

    fn utility_charge_currents(&self) -> &'static [u16] {
        UTILITY_CHARGE_CURRENTS
    }

    fn matches_identity(&self, identity: &Reading) -> bool {
        matches_identity(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{ChargerPriority, DialectOps, OutputSourcePriority};

    const QPIGS: &str = "000.0 00.0 230.0 49.9 0161 0119 003 460 57.50 012 100 0069 0014 103.8 57.45 00000 00110110 00 00 00856 010";

    #[test]
    fn decodes_status() {
        let r = Pi30.decode("QPIGS", QPIGS).unwrap();
        assert_eq!(r.f64("ac_output_voltage"), Some(230.0));
        assert_eq!(r.f64("ac_output_active_power"), Some(119.0));
        assert_eq!(r.f64("battery_voltage"), Some(57.5));
        assert_eq!(r.f64("battery_charging_current"), Some(12.0));
        assert_eq!(r.f64("battery_voltage_from_scc"), Some(57.45));
        assert_eq!(r.f64("pv_input_power"), Some(856.0));
        assert_eq!(r.str("eeprom_version"), Some("00"));

        assert_eq!(r.flag("is_load_on"), Some(true));
        assert_eq!(r.flag("is_charging_on"), Some(true));
        assert_eq!(r.flag("is_scc_charging_on"), Some(true));
        assert_eq!(r.flag("is_ac_charging_on"), Some(false));
        assert_eq!(r.flag("is_switched_on"), Some(true));
    }

    #[test]
    fn short_status_is_an_error() {
        assert!(Pi30.decode("QPIGS", "230.0 49.9").is_err());
    }

    #[test]
    fn revo_shaped_status_is_rejected() {
        let revo = "230.1 50.0 230.0 50.0 0460 0400 009 390 52.10 000 088 0038 0006 250.4 01540 00003 00010000 00 00 000";
        let err = Pi30.decode("QPIGS", revo).unwrap_err();
        assert!(err.to_string().contains("has 20 fields"));

        // firmware that stops after the status bits
        let old = QPIGS.split_whitespace().take(17).collect::<Vec<_>>().join(" ");
        assert_eq!(Pi30.decode("QPIGS", &old).unwrap().f64("battery_voltage"), Some(57.5));
    }

    #[test]
    fn telemetry_from_status() {
        let t = Pi30.telemetry(&Pi30.decode("QPIGS", QPIGS).unwrap());
        assert_eq!(t.ac_out_power, Some(119.0));
        assert_eq!(t.soc, Some(100.0));
        assert_eq!(t.temperature, Some(69.0));
        assert_eq!(t.pv_voltage, Some(103.8));
        assert_eq!(t.load_on, Some(true));
        assert!(t.charging_on);
    }

    #[test]
    fn decodes_mode() {
        let r = Pi30.decode("QMOD", "L").unwrap();
        assert_eq!(Pi30.device_mode(&r), DeviceMode::Line);
        let r = Pi30.decode("QMOD", "F").unwrap();
        assert_eq!(Pi30.device_mode(&r), DeviceMode::Other("Fault".to_owned()));
        assert!(Pi30.decode("QMOD", "Z").is_err());
    }

    #[test]
    fn decodes_warnings_skipping_reserved() {
        let mut bits = "0".repeat(32);
        bits.replace_range(9..10, "1");
        let r = Pi30.decode("QPIWS", &bits).unwrap();
        assert_eq!(r.flag("over_temperature_fault"), Some(true));
        assert_eq!(r.flag("overload_fault"), Some(false));
        assert!(!r.contains("reserved"));
        assert!(Pi30.decode("QPIWS", "01x0").is_err());
    }

    #[test]
    fn decodes_identity_and_firmware() {
        let r = Pi30.decode("QPI", "PI30").unwrap();
        assert!(Pi30.matches_identity(&r));
        assert!(!Pi30.matches_identity(&Reading::new()));

        let r = Pi30.decode("QVFW", "VERFW:00072.70").unwrap();
        assert_eq!(r.str("main_cpu_firmware_version"), Some("00072.70"));
    }

    #[test]
    fn nak_is_an_error() {
        assert!(Pi30.decode("PCP00", "NAK").is_err());
        assert_eq!(Pi30.decode("PCP00", "ACK").unwrap().str("response"), Some("ACK"));
    }

    #[test]
    fn encodes_commands() {
        assert_eq!(
            Pi30.encode(&ControlCommand::ChargerPriority(ChargerPriority::SolarOnly)),
            "PCP03"
        );
        assert_eq!(
            Pi30.encode(&ControlCommand::OutputSourcePriority(OutputSourcePriority::Sbu)),
            "POP02"
        );
        assert_eq!(Pi30.encode(&ControlCommand::UtilityChargeCurrent(2)), "MUCHGC002");
        assert_eq!(Pi30.encode(&ControlCommand::UtilityChargeCurrent(30)), "MUCHGC030");
    }
}
