use std::time::Duration;

/// Failures of the camera, printer or input hardware
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("{0} timed out after {1:?}")]
    Timeout(String, Duration),

    #[error("camera produced an empty image")]
    EmptyCapture,

    #[error("no input device supports key code {0}")]
    NoInputDevice(u16),
}

/// Failures of the remote poem service
///
/// Transport problems, non-200 replies and bodies without a poem all take
/// the same recovery path in the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Hardware that failed its startup self-test
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("camera failed to initialize: {0}")]
    Camera(#[source] HardwareError),

    #[error("printer failed to initialize: {0}")]
    Printer(#[source] anyhow::Error),

    #[error("shutter button unavailable: {0}")]
    Input(#[source] anyhow::Error),
}

/// Shorten a diagnostic to at most `max` characters for the receipt.
pub fn truncate_detail(detail: &str, max: usize) -> String {
    let detail = detail.trim();
    if detail.chars().count() <= max {
        return detail.to_string();
    }
    let mut short: String = detail.chars().take(max.saturating_sub(3)).collect();
    short.push_str("...");
    short
}
