use crate::prelude::*;
use crate::dialect::{ChargerPriority, ControlCommand, OutputSourcePriority};

pub struct SetPriority {
    command: ControlCommand,
}

impl SetPriority {
    pub fn charger(priority: ChargerPriority) -> Self {
        Self {
            command: ControlCommand::ChargerPriority(priority),
        }
    }

    pub fn output_source(priority: OutputSourcePriority) -> Self {
        Self {
            command: ControlCommand::OutputSourcePriority(priority),
        }
    }

    pub async fn run(&self, device: &mut Device) -> Result<Vec<String>> {
        let sent = device.send(&self.command).await?;
        info!("[set_priority] {:?} sent as {}", self.command, sent);
        Ok(vec![sent])
    }
}
