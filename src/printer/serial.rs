use super::sink::PrinterSink;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Put the serial port into raw mode at `baud` with `stty`
pub async fn configure_port(path: impl AsRef<Path>, baud: u32) -> Result<()> {
    let path = path.as_ref();
    let output = Command::new("stty")
        .arg("-F")
        .arg(path)
        .args([baud.to_string().as_str(), "raw", "-echo"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .context("Failed to run stty")?;

    if !output.status.success() {
        anyhow::bail!(
            "stty failed on {:?}: {}",
            path,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    tracing::debug!("Configured {:?} at {} baud", path, baud);
    Ok(())
}

/// Printer attached to a serial device node such as `/dev/serial0`
///
/// The port's line settings (baud rate, raw mode) are applied beforehand
/// with `stty`; this type only writes bytes to the open device.
pub struct SerialSink {
    path: PathBuf,
    file: File,
}

impl SerialSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open printer device {:?}", path))?;

        tracing::info!("Opened printer at {:?}", path);
        Ok(Self { path, file })
    }
}

impl PrinterSink for SerialSink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.file
            .write_all(bytes)
            .with_context(|| format!("Failed to write to printer {:?}", self.path))
    }

    fn flush(&mut self) -> Result<()> {
        self.file
            .flush()
            .with_context(|| format!("Failed to flush printer {:?}", self.path))
    }
}
