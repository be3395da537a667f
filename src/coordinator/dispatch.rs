use crate::prelude::*;

use crate::command::BusWrite;
use crate::coordinator::commands;
use crate::coordinator::pending::PendingSender;
use crate::coordinator::PollStats;

use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Turns bus writes into device commands. Never touches the published state;
/// accepted values go on the pending queue for the next poll.
pub struct Dispatcher {
    pending: PendingSender,
    shutdown: CancellationToken,
    stats: Arc<Mutex<PollStats>>,
}

impl Dispatcher {
    pub fn new(pending: PendingSender, shutdown: CancellationToken, stats: Arc<Mutex<PollStats>>) -> Self {
        Self {
            pending,
            shutdown,
            stats,
        }
    }

    /// Handle one external write. Always returns true: the bus never sees a
    /// write refused, even when the device is left unchanged.
    pub async fn handle(&self, device: &mut Device, write: BusWrite) -> bool {
        self.count(|s| s.writes_received += 1);

        let path = match ControlPath::from_str(&write.path) {
            Ok(path) => path,
            Err(_) => {
                debug!("ignoring write to {}", write.path);
                self.count(|s| s.writes_ignored += 1);
                return true;
            }
        };

        match Command::from_write(path, &write.value) {
            Ok(Command::Reset) => {
                info!("reset requested via {}, shutting down", path);
                self.shutdown.cancel();
                return true;
            }
            Ok(command) => self.issue(device, command).await,
            Err(err) => {
                warn!("{}: {:#}; device left unchanged", path, err);
                self.count(|s| s.writes_ignored += 1);
            }
        }

        if let Err(err) = self.pending.enqueue(path, write.value) {
            error!("{:#}", err);
        }

        true
    }

    async fn issue(&self, device: &mut Device, command: Command) {
        use commands::{
            set_current_limit::SetCurrentLimit, set_mode::SetMode, set_priority::SetPriority,
        };

        let result = match &command {
            Command::SetMode(mode) => SetMode::new(*mode).run(device).await,
            Command::SetChargerPriority(p) => SetPriority::charger(*p).run(device).await,
            Command::SetOutputSourcePriority(p) => SetPriority::output_source(*p).run(device).await,
            Command::SetCurrentLimit(amps) => SetCurrentLimit::new(*amps).run(device).await,
            Command::Reset => Ok(Vec::new()),
        };

        match result {
            Ok(sent) => self.count(|s| s.commands_sent += sent.len() as u64),
            Err(err) => {
                error!("{:?} failed: {:#}", command, err);
                self.count(|s| s.command_failures += 1);
            }
        }
    }

    fn count(&self, f: impl FnOnce(&mut PollStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }
}
