//! Operator-configured shell commands (e.g. the power-off command)

use anyhow::{Context, Result, bail};
use std::process::Stdio;
use tokio::process::Command;

/// Run `command` through `sh -c` and wait for it
pub async fn run_command(label: &str, command: &str) -> Result<()> {
    tracing::info!("[{}] Running: {}", label, command);

    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .with_context(|| format!("[{}] Failed to spawn {:?}", label, command))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("[{}] exited with {}: {}", label, output.status, stderr.trim());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command() {
        run_command("test", "true").await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_carries_status_and_stderr() {
        let err = run_command("test", "echo 'permission denied' >&2; exit 3")
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("[test]"));
        assert!(message.contains("permission denied"));
    }
}
