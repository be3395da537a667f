use crate::prelude::*;

use tokio::sync::mpsc;

/// Accepted bus writes waiting for the next successful poll to publish them.
pub fn channel(capacity: usize) -> (PendingSender, PendingReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (PendingSender(tx), PendingReceiver(rx))
}

#[derive(Clone, Debug)]
pub struct PendingSender(mpsc::Sender<(ControlPath, BusValue)>);

impl PendingSender {
    pub fn enqueue(&self, path: ControlPath, value: BusValue) -> Result<()> {
        use mpsc::error::TrySendError;

        match self.0.try_send((path, value)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full((path, _))) => bail!("pending queue full, dropping write to {}", path),
            Err(TrySendError::Closed((path, _))) => bail!("pending queue closed, dropping write to {}", path),
        }
    }
}

#[derive(Debug)]
pub struct PendingReceiver(mpsc::Receiver<(ControlPath, BusValue)>);

impl PendingReceiver {
    /// Everything queued so far, oldest first.
    pub fn drain(&mut self) -> Vec<(ControlPath, BusValue)> {
        let mut r = Vec::new();
        while let Ok(item) = self.0.try_recv() {
            r.push(item);
        }
        r
    }
}
