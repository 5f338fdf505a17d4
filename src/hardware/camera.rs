use crate::error::HardwareError;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// One captured still, owned by a single pipeline run
#[derive(Debug, Clone)]
pub struct CaptureArtifact {
    pub bytes: Vec<u8>,
    pub captured_at: DateTime<Local>,
}

/// Still-capture capability
#[async_trait]
pub trait Camera: Send + Sync {
    async fn capture(&self) -> Result<CaptureArtifact, HardwareError>;
}

/// Camera driven by an external still-capture tool such as `rpicam-still`
///
/// The tool is invoked once per capture with `-o <file>` appended to the
/// configured arguments; the file is read back and deleted.
pub struct CommandCamera {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandCamera {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl Camera for CommandCamera {
    async fn capture(&self) -> Result<CaptureArtifact, HardwareError> {
        let image = tempfile::Builder::new()
            .prefix("poetcam-")
            .suffix(".jpg")
            .tempfile()?;

        tracing::debug!("Capturing to {:?}", image.path());

        let child = Command::new(&self.command)
            .args(&self.args)
            .arg("-o")
            .arg(image.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| HardwareError::Timeout(self.command.clone(), self.timeout))??;

        if !output.status.success() {
            return Err(HardwareError::CommandFailed {
                command: self.command.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let bytes = tokio::fs::read(image.path()).await?;
        if bytes.is_empty() {
            return Err(HardwareError::EmptyCapture);
        }

        tracing::info!("Captured {} bytes", bytes.len());
        Ok(CaptureArtifact {
            bytes,
            captured_at: Local::now(),
        })
    }
}
