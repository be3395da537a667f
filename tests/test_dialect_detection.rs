mod common;
use common::*;

use async_trait::async_trait;
use mppsolar_bridge::protocol::Scripted;
use std::collections::HashMap;

const PI30_STATUS: &str = "000.0 00.0 230.0 49.9 0161 0119 003 460 57.50 012 100 0069 0014 103.8 57.45 00000 00110110 00 00 00856 010";
const REVO_STATUS: &str = "230.1 50.0 230.0 50.0 0460 0400 009 390 52.10 000 088 0038 0006 250.4 01540 00003 00010000 00 00 000";

/// Answers with raw payloads decoded by whichever dialect opened it, the way
/// the serial transport does.
struct RawDevice {
    dialect: Dialect,
    payloads: HashMap<&'static str, &'static str>,
}

impl RawDevice {
    fn boxed(dialect: Dialect, status: &'static str) -> Box<dyn Protocol> {
        let payloads = HashMap::from([("QPI", "PI30"), ("QPIGS", status)]);
        Box::new(Self { dialect, payloads })
    }
}

#[async_trait]
impl Protocol for RawDevice {
    async fn execute(&mut self, command: &str) -> Result<Reading> {
        let payload = self
            .payloads
            .get(command)
            .ok_or_else(|| anyhow!("{}: no response", command))?;
        self.dialect.decode(command, payload)
    }
}

async fn detect_raw(candidates: &[DialectKind], status: &'static str) -> Result<Device> {
    dialect::detect(candidates, |dialect| Ok(RawDevice::boxed(dialect, status))).await
}

#[tokio::test]
async fn falls_through_to_a_working_candidate() {
    common_setup();

    let script = Factory::script();
    let mut tried = Vec::new();

    let device = dialect::detect(&[DialectKind::Pi30Revo, DialectKind::Pi30], |dialect| {
        tried.push(dialect.kind());
        if dialect.kind() == DialectKind::Pi30Revo {
            bail!("port busy");
        }
        Ok(script.boxed())
    })
    .await
    .unwrap();

    assert_eq!(device.dialect().kind(), DialectKind::Pi30);
    assert_eq!(tried, vec![DialectKind::Pi30Revo, DialectKind::Pi30]);
    assert_eq!(script.issued(), vec!["QPI", "QPIGS"]);
}

#[tokio::test]
async fn first_match_wins() {
    common_setup();

    let script = Factory::script();
    let device = dialect::detect(&[DialectKind::Pi30Revo, DialectKind::Pi30], |_| {
        Ok(script.boxed())
    })
    .await
    .unwrap();

    assert_eq!(device.dialect().kind(), DialectKind::Pi30Revo);
    assert_eq!(script.issued(), vec!["QPI", "QPIGS"]);
}

#[tokio::test]
async fn no_candidate_matches() {
    common_setup();

    let script = Factory::script();
    script.set("QPI", Factory::dialect().decode("QPI", "PI17").unwrap());

    let err = dialect::detect(&[DialectKind::Pi30, DialectKind::Pi30Revo], |_| {
        Ok(script.boxed())
    })
    .await
    .unwrap_err();

    assert_eq!(
        err.to_string(),
        "no dialect matched the device (tried pi30, pi30revo)"
    );
    assert_eq!(script.issued(), vec!["QPI", "QPI"]);
}

#[tokio::test]
async fn silent_device_matches_nothing() {
    common_setup();

    let script = Scripted::new();
    let result = dialect::detect(&[DialectKind::Pi30], |_| Ok(script.boxed())).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn fake_device_uses_the_simulator() {
    common_setup();

    let config = Factory::config_from("fake: true\n");
    let mut device = mppsolar_bridge::connect(&config).await.unwrap();

    assert_eq!(device.dialect().kind(), DialectKind::Pi30Revo);
    let status = device.query(dialect::Query::Status).await.unwrap();
    assert_eq!(status.f64("battery_voltage"), Some(52.7));
}

#[tokio::test]
async fn revo_device_is_detected_as_revo() {
    common_setup();

    let defaults = Config::from_yaml("").unwrap().device.dialects;
    let mut device = detect_raw(&defaults, REVO_STATUS).await.unwrap();
    assert_eq!(device.dialect().kind(), DialectKind::Pi30Revo);

    let status = device.query(dialect::Query::Status).await.unwrap();
    assert_eq!(device.dialect().telemetry(&status).pv_power, Some(1540.0));

    // also when PI30 is tried first
    let device = detect_raw(&[DialectKind::Pi30, DialectKind::Pi30Revo], REVO_STATUS)
        .await
        .unwrap();
    assert_eq!(device.dialect().kind(), DialectKind::Pi30Revo);
}

#[tokio::test]
async fn pi30_device_falls_through_revo() {
    common_setup();

    let defaults = Config::from_yaml("").unwrap().device.dialects;
    let mut device = detect_raw(&defaults, PI30_STATUS).await.unwrap();
    assert_eq!(device.dialect().kind(), DialectKind::Pi30);

    let status = device.query(dialect::Query::Status).await.unwrap();
    assert_eq!(device.dialect().telemetry(&status).pv_power, Some(856.0));
}
