use crate::prelude::*;
use crate::dialect::Query;

/// The three raw readings one poll cycle is derived from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Readings {
    pub status: Reading,
    pub mode: Reading,
    pub warnings: Reading,
}

pub struct ReadStatus;

impl ReadStatus {
    pub fn new() -> Self {
        Self
    }

    /// Any query failing fails the whole read; nothing partial comes back.
    pub async fn run(&self, device: &mut Device) -> Result<Readings> {
        let status = device.query(Query::Status).await?;
        debug!("status: {:?}", status);

        let mode = device.query(Query::Mode).await?;
        debug!("mode: {:?}", mode);

        let warnings = device.query(Query::Warnings).await?;
        debug!("warnings: {:?}", warnings);

        Ok(Readings {
            status,
            mode,
            warnings,
        })
    }
}

impl Default for ReadStatus {
    fn default() -> Self {
        Self::new()
    }
}
