mod common;
use common::*;

use mppsolar_bridge::command::BusWrite;
use mppsolar_bridge::coordinator::Coordinator;
use mppsolar_bridge::mqtt::ChannelData;

fn unwrap_snapshot(data: ChannelData) -> Snapshot {
    match data {
        ChannelData::Snapshot(snapshot) => snapshot,
        other => panic!("expected a snapshot, got {:?}", other),
    }
}

#[tokio::test]
async fn publishes_identity_then_polls() {
    common_setup();

    let channels = Channels::new();
    let coordinator = Coordinator::new(Factory::config(), channels.clone());
    let script = Factory::script();
    let device = Factory::device(&script);
    let mut to_mqtt = channels.to_mqtt.subscribe();

    let cf = coordinator.start(device);

    let tf = async {
        let identity = unwrap_snapshot(to_mqtt.recv().await?);
        assert_eq!(identity["/Serial"], BusValue::Text("92932004102443".to_owned()));
        assert_eq!(identity["/FirmwareVersion"], BusValue::Text("00072.70".to_owned()));
        assert_eq!(
            identity["/ProductName"],
            BusValue::Text("MPP Solar PI30 Inverter".to_owned())
        );
        assert_eq!(identity["/Mgmt/ProcessName"], BusValue::Text("mppsolar-bridge".to_owned()));

        let first = unwrap_snapshot(to_mqtt.recv().await?);
        assert_eq!(first["/State"], BusValue::Int(8));
        assert_eq!(first["/Ac/Out/L1/P"], BusValue::Float(250.0));
        assert!(!first.contains_key("/Mode"));

        coordinator.stop();
        Ok::<(), anyhow::Error>(())
    };

    futures::try_join!(cf, tf).unwrap();
    assert_eq!(script.issued(), vec!["QID", "QVFW", "QPIGS", "QMOD", "QPIWS"]);
    assert_eq!(coordinator.stats.lock().unwrap().cycles_ok, 1);
}

#[tokio::test]
async fn write_is_published_by_the_next_poll() {
    common_setup();

    let channels = Channels::new();
    let coordinator = Coordinator::new(Factory::config(), channels.clone());
    let script = Factory::script();
    let device = Factory::device(&script);
    let mut to_mqtt = channels.to_mqtt.subscribe();

    let cf = coordinator.start(device);

    let tf = async {
        unwrap_snapshot(to_mqtt.recv().await?); // identity
        unwrap_snapshot(to_mqtt.recv().await?); // first poll
        script.clear_issued();

        channels.from_mqtt.send(ChannelData::Write(BusWrite {
            path: "/Mode".to_owned(),
            value: BusValue::Int(3),
        }))?;

        let next = unwrap_snapshot(to_mqtt.recv().await?);
        assert_eq!(next["/Mode"], BusValue::Int(3));

        channels.shutdown.cancel();
        Ok::<(), anyhow::Error>(())
    };

    futures::try_join!(cf, tf).unwrap();
    assert_eq!(
        script.issued(),
        vec!["PCP00", "POP02", "QPIGS", "QMOD", "QPIWS"]
    );
}

#[tokio::test]
async fn reset_stops_the_loop() {
    common_setup();

    let channels = Channels::new();
    let coordinator = Coordinator::new(Factory::config(), channels.clone());
    let script = Factory::script();
    let device = Factory::device(&script);
    let mut to_mqtt = channels.to_mqtt.subscribe();

    let cf = coordinator.start(device);

    let tf = async {
        unwrap_snapshot(to_mqtt.recv().await?);
        unwrap_snapshot(to_mqtt.recv().await?);

        channels.from_mqtt.send(ChannelData::Write(BusWrite {
            path: "/Settings/Reset".to_owned(),
            value: BusValue::Int(1),
        }))?;
        Ok::<(), anyhow::Error>(())
    };

    futures::try_join!(cf, tf).unwrap();
    assert!(channels.shutdown.is_cancelled());
}

#[tokio::test]
async fn failed_poll_is_fatal() {
    common_setup();

    let channels = Channels::new();
    let coordinator = Coordinator::new(Factory::config(), channels.clone());
    let script = Factory::script();
    script.set_failure("QPIGS", "timeout");
    let device = Factory::device(&script);
    let mut to_mqtt = channels.to_mqtt.subscribe();

    let result = coordinator.start(device).await;

    assert!(result.unwrap_err().to_string().contains("timeout"));
    assert!(channels.shutdown.is_cancelled());
    assert_eq!(coordinator.stats.lock().unwrap().cycles_failed, 1);

    // identity went out, no poll snapshot did
    unwrap_snapshot(to_mqtt.recv().await.unwrap());
    assert!(to_mqtt.try_recv().is_err());
}

#[tokio::test]
async fn identity_failures_are_not_fatal() {
    common_setup();

    let channels = Channels::new();
    let coordinator = Coordinator::new(Factory::config(), channels.clone());
    let script = Factory::script();
    script.set_failure("QID", "NAK");
    script.set_failure("QVFW", "NAK");
    let device = Factory::device(&script);
    let mut to_mqtt = channels.to_mqtt.subscribe();

    let cf = coordinator.start(device);

    let tf = async {
        let identity = unwrap_snapshot(to_mqtt.recv().await?);
        assert_eq!(identity["/Serial"], BusValue::Null);
        assert_eq!(identity["/FirmwareVersion"], BusValue::Int(0));

        unwrap_snapshot(to_mqtt.recv().await?);
        channels.shutdown.cancel();
        Ok::<(), anyhow::Error>(())
    };

    futures::try_join!(cf, tf).unwrap();
}
