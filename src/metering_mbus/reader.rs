use async_trait::async_trait;
use log::debug;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("Unable to start {program}: {source}")]
    Spawn { program: String, source: std::io::Error },
    #[error("Command {program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error("Command {program} failed with {status}: {output}")]
    Failed { program: String, status: ExitStatus, output: String },
}

/// Everything needed to query one meter on the bus.
#[derive(Debug, Clone)]
pub struct ReadRequest<'a> {
    pub address: &'a str,
    pub serial: &'a str,
    pub baud: u32,
    pub timeout: Duration,
}

#[async_trait]
pub trait DeviceReader: Send + Sync {
    /// Returns the raw XML response of the meter at `request.address`.
    async fn read(&self, request: &ReadRequest<'_>) -> Result<String, ReaderError>;
}

/// Reads meters through the libmbus `mbus-serial-request-data` tool.
pub struct ToolReader {
    tool: String,
}

impl ToolReader {
    pub fn new(tool: String) -> Self {
        return ToolReader { tool };
    }

    pub fn command(&self, request: &ReadRequest<'_>) -> Command {
        let mut cmd = Command::new(&self.tool);
        cmd.arg("-b")
            .arg(request.baud.to_string())
            .arg(request.serial)
            .arg(request.address);
        return cmd;
    }
}

#[async_trait]
impl DeviceReader for ToolReader {
    async fn read(&self, request: &ReadRequest<'_>) -> Result<String, ReaderError> {
        debug!("Reading address {} on {} with {} baud", request.address, request.serial, request.baud);
        return run_with_timeout(self.command(request), &self.tool, request.timeout).await;
    }
}

/// Runs `cmd` and returns stdout followed by stderr.
///
/// The child gets killed if it does not finish within `timeout`.
pub async fn run_with_timeout(mut cmd: Command, program: &str, timeout: Duration) -> Result<String, ReaderError> {
    cmd.stdin(Stdio::null()).kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Err(_) => {
            return Err(ReaderError::Timeout { program: program.to_string(), timeout });
        },
        Ok(result) => result.map_err(|e| ReaderError::Spawn { program: program.to_string(), source: e })?,
    };

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(ReaderError::Failed {
            program: program.to_string(),
            status: output.status,
            output: text.trim().to_string(),
        });
    }

    return Ok(text);
}
