#![allow(dead_code)]

pub use mppsolar_bridge::prelude::*;

use mppsolar_bridge::coordinator::commands::read_status::Readings;
use mppsolar_bridge::dialect::Pi30;
use mppsolar_bridge::protocol::Scripted;

pub fn common_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub const NO_WARNINGS: &str = "00000000000000000000000000000000";

pub struct Factory;

impl Factory {
    /// MQTT enabled so the coordinator publishes to `to_mqtt`, polling every second.
    pub fn config() -> ConfigWrapper {
        Self::config_from(
            r#"
device:
  port: /dev/ttyUSB0
  poll_interval: 1
mqtt:
  enabled: true
"#,
        )
    }

    pub fn config_from(yaml: &str) -> ConfigWrapper {
        ConfigWrapper::from_config(Config::from_yaml(yaml).unwrap())
    }

    pub fn dialect() -> Dialect {
        Dialect::Pi30(Pi30)
    }

    /// A QPIGS reading with the given active output power and device status bits.
    pub fn status(active_power: u32, device_status: &str) -> Reading {
        let payload = format!(
            "229.8 50.0 230.1 50.0 0367 {:04} 007 400 52.70 010 088 0036 0000 000.0 00.00 00000 {} 00 00 00000 010",
            active_power, device_status
        );
        Self::dialect().decode("QPIGS", &payload).unwrap()
    }

    pub fn mode(letter: &str) -> Reading {
        Self::dialect().decode("QMOD", letter).unwrap()
    }

    pub fn warnings(bits: &str) -> Reading {
        Self::dialect().decode("QPIWS", bits).unwrap()
    }

    pub fn readings(status: Reading, mode: &str) -> Readings {
        Readings {
            status,
            mode: Self::mode(mode),
            warnings: Self::warnings(NO_WARNINGS),
        }
    }

    /// Scripted PI30 device: line mode, load on, not charging.
    pub fn script() -> Scripted {
        let script = Scripted::new();
        script.set("QPI", Self::dialect().decode("QPI", "PI30").unwrap());
        script.set("QPIGS", Self::status(250, "00010000"));
        script.set("QMOD", Self::mode("L"));
        script.set("QPIWS", Self::warnings(NO_WARNINGS));
        script.set("QID", Self::dialect().decode("QID", "92932004102443").unwrap());
        script.set("QVFW", Self::dialect().decode("QVFW", "VERFW:00072.70").unwrap());
        script
    }

    pub fn device(script: &Scripted) -> Device {
        Device::new(Self::dialect(), script.boxed())
    }
}
