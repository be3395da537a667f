use crate::prelude::*;
use crate::coordinator::commands::validation;
use crate::dialect::ControlCommand;

pub struct SetCurrentLimit {
    amps: f64,
}

impl SetCurrentLimit {
    pub fn new(amps: f64) -> Self {
        Self { amps }
    }

    pub async fn run(&self, device: &mut Device) -> Result<Vec<String>> {
        let supported = device.dialect().utility_charge_currents();
        let amps = validation::snap_current(self.amps, supported)?;
        if f64::from(amps) != self.amps {
            info!("[set_current_limit] {}A not supported, using {}A", self.amps, amps);
        }

        let sent = device.send(&ControlCommand::UtilityChargeCurrent(amps)).await?;
        info!("[set_current_limit] {}A sent as {}", amps, sent);
        Ok(vec![sent])
    }
}
