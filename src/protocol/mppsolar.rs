use crate::prelude::*;

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;

/// Reads the device through the external `mpp-solar` command line tool, one
/// child process per command.
pub struct MppSolarTool {
    program: String,
    port: String,
    baudrate: u32,
    timeout: Duration,
    tool_protocol: &'static str,
}

impl MppSolarTool {
    pub fn new(
        program: &str,
        port: &str,
        baudrate: u32,
        timeout: Duration,
        dialect: &Dialect,
    ) -> Self {
        Self {
            program: program.to_owned(),
            port: port.to_owned(),
            baudrate,
            timeout,
            tool_protocol: dialect.tool_protocol(),
        }
    }

    pub fn args(&self, command: &str) -> Vec<String> {
        vec![
            "-b".to_owned(),
            self.baudrate.to_string(),
            "-P".to_owned(),
            self.tool_protocol.to_owned(),
            "-p".to_owned(),
            self.port.clone(),
            "-o".to_owned(),
            "json".to_owned(),
            "-c".to_owned(),
            command.to_owned(),
        ]
    }

    /// The tool may print log noise before its JSON; take the last line that
    /// parses as an object.
    pub fn parse_output(stdout: &str) -> Result<Reading> {
        let json = stdout
            .lines()
            .rev()
            .map(str::trim)
            .filter(|line| line.starts_with('{'))
            .find_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
            .or_else(|| serde_json::from_str(stdout.trim()).ok())
            .ok_or_else(|| anyhow!("no JSON object in output: {:?}", stdout))?;

        Reading::from_json(&json)
    }
}

#[async_trait]
impl Protocol for MppSolarTool {
    async fn execute(&mut self, command: &str) -> Result<Reading> {
        let args = self.args(command);
        debug!("running {} {}", self.program, args.join(" "));

        let child = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| anyhow!("{} {} timed out after {:?}", self.program, command, self.timeout))?
            .map_err(|err| anyhow!("failed to run {}: {}", self.program, err))?;

        if !output.status.success() {
            bail!(
                "{} {} exited with {}: {}",
                self.program,
                command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Self::parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}
