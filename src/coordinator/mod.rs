use crate::prelude::*;

pub mod alarms;
pub mod commands;
pub mod dispatch;
pub mod estimate;
pub mod pending;
pub mod poll;

use std::sync::{Arc, Mutex};
use tokio::time::MissedTickBehavior;

use crate::dialect::Query;
use crate::state::Identity;
use dispatch::Dispatcher;
use poll::PollCycle;

#[derive(Default)]
pub struct PollStats {
    pub cycles_ok: u64,
    pub cycles_failed: u64,
    pub snapshots_published: u64,
    pub pending_applied: u64,
    // bus writes
    pub writes_received: u64,
    pub writes_ignored: u64,
    pub commands_sent: u64,
    pub command_failures: u64,
    // MQTT
    pub mqtt_messages_sent: u64,
    pub mqtt_errors: u64,
}

impl PollStats {
    pub fn print_summary(&self) {
        info!("Poll Statistics:");
        info!("  Cycles ok: {}", self.cycles_ok);
        info!("  Cycles failed: {}", self.cycles_failed);
        info!("  Snapshots published: {}", self.snapshots_published);
        info!("  Pending writes applied: {}", self.pending_applied);
        info!("  Bus Writes:");
        info!("    Received: {}", self.writes_received);
        info!("    Ignored: {}", self.writes_ignored);
        info!("    Device commands sent: {}", self.commands_sent);
        info!("    Device command failures: {}", self.command_failures);
        info!("  MQTT:");
        info!("    Messages sent: {}", self.mqtt_messages_sent);
        info!("    Errors: {}", self.mqtt_errors);
    }
}

#[derive(Clone)]
pub struct Coordinator {
    config: ConfigWrapper,
    channels: Channels,
    pub stats: Arc<Mutex<PollStats>>,
}

impl Coordinator {
    pub fn new(config: ConfigWrapper, channels: Channels) -> Self {
        Self {
            config,
            channels,
            stats: Arc::new(Mutex::new(PollStats::default())),
        }
    }

    /// Run the poll/dispatch loop until shutdown. Poll ticks and bus writes
    /// are handled one at a time on this task, so device access never
    /// overlaps and a tick is not re-armed until the previous cycle is done.
    ///
    /// A failed poll cancels the shutdown token and returns the error.
    pub async fn start(&self, mut device: Device) -> Result<()> {
        let identity = self.identify(&mut device).await;
        self.publish(identity.to_snapshot())?;

        let (pending_tx, mut pending_rx) = pending::channel(self.config.pending_capacity());
        let mut poll = PollCycle::new(
            self.config.estimation(),
            self.channels.dc_system_power.subscribe(),
        );
        let dispatcher = Dispatcher::new(
            pending_tx,
            self.channels.shutdown.clone(),
            self.stats.clone(),
        );

        let mut writes = self.channels.from_mqtt.subscribe();
        let mut interval = tokio::time::interval(self.config.device().poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                _ = self.channels.shutdown.cancelled() => break Ok(()),

                _ = interval.tick() => {
                    match poll.run(&mut device, &mut pending_rx).await {
                        Ok(outcome) => {
                            if let Ok(mut stats) = self.stats.lock() {
                                stats.cycles_ok += 1;
                                stats.pending_applied += outcome.applied as u64;
                            }
                            self.publish(outcome.snapshot)?;
                        }
                        Err(err) => {
                            error!("poll cycle failed: {:#}", err);
                            if let Ok(mut stats) = self.stats.lock() {
                                stats.cycles_failed += 1;
                            }
                            self.channels.shutdown.cancel();
                            break Err(err);
                        }
                    }
                }

                data = writes.recv() => match data {
                    Ok(mqtt::ChannelData::Write(write)) => {
                        dispatcher.handle(&mut device, write).await;
                    }
                    Ok(mqtt::ChannelData::Shutdown) => break Ok(()),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("coordinator lagged, {} bus writes dropped", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break Ok(()),
                }
            }
        };

        info!("Coordinator stopping, final statistics:");
        if let Ok(stats) = self.stats.lock() {
            stats.print_summary();
        }

        result
    }

    pub fn stop(&self) {
        let _ = self.channels.from_mqtt.send(mqtt::ChannelData::Shutdown);
    }

    /// Serial number and firmware are read once; failures only cost the
    /// corresponding field.
    async fn identify(&self, device: &mut Device) -> Identity {
        let serial = match device.query(Query::SerialNumber).await {
            Ok(r) => r.str("serial_number").map(str::to_owned),
            Err(err) => {
                warn!("could not read serial number: {:#}", err);
                None
            }
        };
        let firmware = match device.query(Query::Firmware).await {
            Ok(r) => r.str("main_cpu_firmware_version").map(str::to_owned),
            Err(err) => {
                warn!("could not read firmware version: {:#}", err);
                None
            }
        };

        let device_config = self.config.device();
        let connection = if self.config.fake() {
            "simulated".to_owned()
        } else {
            format!("{:?} {}", device_config.transport(), device_config.port())
        };

        let identity = Identity {
            process_name: env!("CARGO_PKG_NAME").to_owned(),
            process_version: env!("CARGO_PKG_VERSION").to_owned(),
            connection,
            device_instance: self.config.mqtt().device_instance(),
            product_name: device.dialect().product_name().to_owned(),
            serial,
            firmware,
        };
        info!("device identity: {:?}", identity);

        identity
    }

    fn publish(&self, snapshot: Snapshot) -> Result<()> {
        if !self.config.mqtt().enabled() {
            debug!("snapshot: {:?}", snapshot);
            return Ok(());
        }

        if self
            .channels
            .to_mqtt
            .send(mqtt::ChannelData::Snapshot(snapshot))
            .is_err()
        {
            if let Ok(mut stats) = self.stats.lock() {
                stats.mqtt_errors += 1;
            }
            bail!("send(to_mqtt) failed - channel closed?");
        }
        if let Ok(mut stats) = self.stats.lock() {
            stats.snapshots_published += 1;
        }

        Ok(())
    }
}
