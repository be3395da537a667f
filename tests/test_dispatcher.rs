mod common;
use common::*;

use mppsolar_bridge::command::BusWrite;
use mppsolar_bridge::coordinator::dispatch::Dispatcher;
use mppsolar_bridge::coordinator::{pending, PollStats};

use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

fn write(path: &str, value: BusValue) -> BusWrite {
    BusWrite {
        path: path.to_owned(),
        value,
    }
}

struct Subject {
    dispatcher: Dispatcher,
    pending: pending::PendingReceiver,
    shutdown: CancellationToken,
    stats: Arc<Mutex<PollStats>>,
}

fn subject() -> Subject {
    let (tx, rx) = pending::channel(8);
    let shutdown = CancellationToken::new();
    let stats = Arc::new(Mutex::new(PollStats::default()));

    Subject {
        dispatcher: Dispatcher::new(tx, shutdown.clone(), stats.clone()),
        pending: rx,
        shutdown,
        stats,
    }
}

#[tokio::test]
async fn mode_is_sent_as_two_priorities() {
    common_setup();

    let script = Factory::script();
    let mut device = Factory::device(&script);
    let mut s = subject();

    assert!(s.dispatcher.handle(&mut device, write("/Mode", BusValue::Int(3))).await);

    assert_eq!(script.issued(), vec!["PCP00", "POP02"]);
    assert_eq!(s.pending.drain(), vec![(ControlPath::Mode, BusValue::Int(3))]);
    assert_eq!(s.stats.lock().unwrap().commands_sent, 2);
}

#[tokio::test]
async fn priorities_and_current_limit() {
    common_setup();

    let script = Factory::script();
    let mut device = Factory::device(&script);
    let mut s = subject();

    s.dispatcher
        .handle(&mut device, write("/Settings/ChargerPriority", BusValue::Int(3)))
        .await;
    s.dispatcher
        .handle(&mut device, write("/Settings/OutputSourcePriority", BusValue::Int(1)))
        .await;
    s.dispatcher
        .handle(&mut device, write("/Ac/In/1/CurrentLimit", BusValue::Float(25.0)))
        .await;

    assert_eq!(script.issued(), vec!["PCP03", "POP01", "MUCHGC020"]);
    // the published value is what was written, not what the device was snapped to
    assert_eq!(
        s.pending.drain(),
        vec![
            (ControlPath::ChargerPriority, BusValue::Int(3)),
            (ControlPath::OutputSourcePriority, BusValue::Int(1)),
            (ControlPath::AcInCurrentLimit, BusValue::Float(25.0)),
        ]
    );
}

#[tokio::test]
async fn invalid_value_is_acknowledged_without_device_command() {
    common_setup();

    let script = Factory::script();
    let mut device = Factory::device(&script);
    let mut s = subject();

    assert!(s.dispatcher.handle(&mut device, write("/Mode", BusValue::Int(7))).await);

    assert!(script.issued().is_empty());
    assert_eq!(s.pending.drain(), vec![(ControlPath::Mode, BusValue::Int(7))]);
    assert_eq!(s.stats.lock().unwrap().writes_ignored, 1);
}

#[tokio::test]
async fn refused_command_still_reaches_the_bus() {
    common_setup();

    let script = Factory::script();
    script.set_failure("PCP00", "NAK");
    let mut device = Factory::device(&script);
    let mut s = subject();

    assert!(s.dispatcher.handle(&mut device, write("/Mode", BusValue::Int(3))).await);

    // stops at the first refused command
    assert_eq!(script.issued(), vec!["PCP00"]);
    assert_eq!(s.pending.drain(), vec![(ControlPath::Mode, BusValue::Int(3))]);
    assert_eq!(s.stats.lock().unwrap().command_failures, 1);
}

#[tokio::test]
async fn reset_requests_shutdown() {
    common_setup();

    let script = Factory::script();
    let mut device = Factory::device(&script);
    let mut s = subject();

    assert!(!s.shutdown.is_cancelled());
    assert!(
        s.dispatcher
            .handle(&mut device, write("/Settings/Reset", BusValue::Int(1)))
            .await
    );

    assert!(s.shutdown.is_cancelled());
    assert!(script.issued().is_empty());
    assert!(s.pending.drain().is_empty());
}

#[tokio::test]
async fn unknown_path_is_ignored() {
    common_setup();

    let script = Factory::script();
    let mut device = Factory::device(&script);
    let mut s = subject();

    assert!(s.dispatcher.handle(&mut device, write("/Dc/0/Voltage", BusValue::Float(48.0))).await);

    assert!(script.issued().is_empty());
    assert!(s.pending.drain().is_empty());
    assert_eq!(s.stats.lock().unwrap().writes_ignored, 1);
}
