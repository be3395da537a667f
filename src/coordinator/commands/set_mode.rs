use crate::prelude::*;
use crate::command::Mode;
use crate::dialect::ControlCommand;

/// A requested mode is realised as a charger priority followed by an output
/// source priority. Stops at the first command the device refuses.
pub struct SetMode {
    mode: Mode,
}

impl SetMode {
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }

    pub async fn run(&self, device: &mut Device) -> Result<Vec<String>> {
        let (charger, output) = self.mode.priorities();

        let mut sent = Vec::with_capacity(2);
        for command in [
            ControlCommand::ChargerPriority(charger),
            ControlCommand::OutputSourcePriority(output),
        ] {
            sent.push(device.send(&command).await?);
        }

        info!("[set_mode] {:?} sent as {}", self.mode, sent.join(" + "));
        Ok(sent)
    }
}
