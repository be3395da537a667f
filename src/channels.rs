use crate::prelude::*;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct Channels {
    pub from_mqtt: broadcast::Sender<mqtt::ChannelData>,
    pub to_mqtt: broadcast::Sender<mqtt::ChannelData>,
    /// Total DC system power from elsewhere on the bus, if known.
    pub dc_system_power: Arc<watch::Sender<Option<f64>>>,
    /// Cancelled when the process should stop.
    pub shutdown: CancellationToken,
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}

impl Channels {
    pub fn new() -> Self {
        Self::with_shutdown(CancellationToken::new())
    }

    /// Channels that stop when an externally owned token is cancelled.
    pub fn with_shutdown(shutdown: CancellationToken) -> Self {
        Self {
            from_mqtt: Self::channel(),
            to_mqtt: Self::channel(),
            dc_system_power: Arc::new(watch::channel(None).0),
            shutdown,
        }
    }

    fn channel<T: Clone>() -> broadcast::Sender<T> {
        broadcast::channel(2048).0
    }
}
