use crate::prelude::*;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::dialect::Query;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Script {
    responses: HashMap<String, std::result::Result<Reading, String>>,
    issued: Vec<String>,
}

/// A fake device answering from canned readings. Clones share the same
/// script, so a test can keep one to change answers and inspect the
/// commands the bridge issued.
#[derive(Clone, Default)]
pub struct Scripted {
    script: Arc<Mutex<Script>>,
}

impl Scripted {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device in line mode charging from the grid, for `--fake`.
    pub fn simulator(dialect: &Dialect) -> Result<Self> {
        let status = match dialect.kind() {
            DialectKind::Pi30 => "229.8 50.0 229.8 50.0 0367 0315 007 400 52.70 010 088 0036 0000 000.0 00.00 00000 00010101 00 00 00000 010",
            DialectKind::Pi30Revo => "229.8 50.0 229.8 50.0 0367 0315 007 400 52.70 010 088 0036 0000 000.0 00000 00000 00010101 00 00 010",
        };

        let r = Self::new();
        r.set(dialect.command(Query::Identify), dialect.decode("QPI", "PI30")?);
        r.set(dialect.command(Query::Status), dialect.decode("QPIGS", status)?);
        r.set(dialect.command(Query::Mode), dialect.decode("QMOD", "L")?);
        r.set(
            dialect.command(Query::Warnings),
            dialect.decode("QPIWS", "00000000000000000000000000000000")?,
        );
        r.set(
            dialect.command(Query::SerialNumber),
            dialect.decode("QID", "92932004102443")?,
        );
        r.set(
            dialect.command(Query::Firmware),
            dialect.decode("QVFW", "VERFW:00072.70")?,
        );

        Ok(r)
    }

    pub fn set(&self, command: &str, reading: Reading) {
        if let Ok(mut script) = self.script.lock() {
            script.responses.insert(command.to_owned(), Ok(reading));
        }
    }

    pub fn set_failure(&self, command: &str, message: &str) {
        if let Ok(mut script) = self.script.lock() {
            script
                .responses
                .insert(command.to_owned(), Err(message.to_owned()));
        }
    }

    /// Every command received so far, in order.
    pub fn issued(&self) -> Vec<String> {
        self.script
            .lock()
            .map(|script| script.issued.clone())
            .unwrap_or_default()
    }

    pub fn clear_issued(&self) {
        if let Ok(mut script) = self.script.lock() {
            script.issued.clear();
        }
    }

    pub fn boxed(&self) -> Box<dyn Protocol> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl Protocol for Scripted {
    async fn execute(&mut self, command: &str) -> Result<Reading> {
        let mut script = self
            .script
            .lock()
            .map_err(|_| anyhow!("script lock poisoned"))?;

        script.issued.push(command.to_owned());

        match script.responses.get(command) {
            Some(Ok(reading)) => Ok(reading.clone()),
            Some(Err(message)) => bail!("{}: {}", command, message),
            // settings are acknowledged unless scripted otherwise
            None if !command.starts_with('Q') => {
                Ok(Reading::new().with("response", Value::Text("ACK".to_owned())))
            }
            None => bail!("{}: no scripted response", command),
        }
    }
}
