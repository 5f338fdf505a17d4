//! In-memory stand-ins for the device's hardware and network capabilities

use crate::connectivity::ReachabilityProbe;
use crate::error::{HardwareError, InferenceError};
use crate::hardware::camera::CaptureArtifact;
use crate::hardware::{Camera, IndicatorMode, StatusIndicator, SwitchBank};
use crate::inference::{InferenceClient, PoemRequest, PoemResult};
use crate::printer::PrinterSink;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Local;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Printer sink that keeps everything written to it
#[derive(Clone, Default)]
pub struct MemorySink {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock().unwrap()).to_string()
    }
}

impl PrinterSink for MemorySink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.bytes.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct FailingSink;

impl PrinterSink for FailingSink {
    fn write_all(&mut self, _bytes: &[u8]) -> Result<()> {
        anyhow::bail!("paper jam")
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Indicator that records every request made of it
#[derive(Default)]
pub struct RecordingIndicator {
    modes: Mutex<Vec<IndicatorMode>>,
    offline: Mutex<Vec<bool>>,
}

impl RecordingIndicator {
    pub fn modes(&self) -> Vec<IndicatorMode> {
        self.modes.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<IndicatorMode> {
        self.modes.lock().unwrap().last().copied()
    }

    pub fn offline_changes(&self) -> Vec<bool> {
        self.offline.lock().unwrap().clone()
    }
}

impl StatusIndicator for RecordingIndicator {
    fn set(&self, mode: IndicatorMode) {
        self.modes.lock().unwrap().push(mode);
    }

    fn set_offline(&self, offline: bool) {
        self.offline.lock().unwrap().push(offline);
    }
}

/// Probe that replays a fixed script, then reports offline
pub struct ScriptedProbe {
    script: Mutex<VecDeque<Result<bool>>>,
    hang: bool,
}

impl ScriptedProbe {
    pub fn new(script: impl IntoIterator<Item = Result<bool>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            hang: false,
        }
    }

    /// A probe that never answers
    pub fn hanging() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            hang: true,
        }
    }
}

#[async_trait]
impl ReachabilityProbe for ScriptedProbe {
    async fn probe(&self, _timeout: Duration) -> Result<bool> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(false))
    }
}

pub struct FakeSwitches {
    pressed: Vec<u16>,
    broken: bool,
}

impl FakeSwitches {
    pub fn pressed(keys: &[u16]) -> Self {
        Self {
            pressed: keys.to_vec(),
            broken: false,
        }
    }

    pub fn broken() -> Self {
        Self {
            pressed: Vec::new(),
            broken: true,
        }
    }
}

impl SwitchBank for FakeSwitches {
    fn is_pressed(&self, key: u16) -> std::io::Result<bool> {
        if self.broken {
            return Err(std::io::Error::other("device unplugged"));
        }
        Ok(self.pressed.contains(&key))
    }
}

/// Camera returning a fixed image, optionally held until released
pub struct FakeCamera {
    image: Option<Vec<u8>>,
    gate: Option<Arc<Notify>>,
}

impl FakeCamera {
    pub fn ok(image: &[u8]) -> Self {
        Self {
            image: Some(image.to_vec()),
            gate: None,
        }
    }

    /// Blocks each capture until `gate().notify_one()`
    pub fn gated(image: &[u8]) -> Self {
        Self {
            image: Some(image.to_vec()),
            gate: Some(Arc::new(Notify::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            image: None,
            gate: None,
        }
    }

    pub fn gate(&self) -> Arc<Notify> {
        self.gate.clone().unwrap_or_default()
    }
}

#[async_trait]
impl Camera for FakeCamera {
    async fn capture(&self) -> Result<CaptureArtifact, HardwareError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match &self.image {
            Some(bytes) => Ok(CaptureArtifact {
                bytes: bytes.clone(),
                captured_at: Local::now(),
            }),
            None => Err(HardwareError::EmptyCapture),
        }
    }
}

/// Inference client replaying canned replies and recording requests
pub struct FakeInference {
    replies: Mutex<VecDeque<Result<PoemResult, InferenceError>>>,
    requests: Mutex<Vec<PoemRequest>>,
    gate: Option<Arc<Notify>>,
}

impl FakeInference {
    pub fn replying(replies: impl IntoIterator<Item = Result<PoemResult, InferenceError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Holds each reply until `gate().notify_one()`
    pub fn gated(replies: impl IntoIterator<Item = Result<PoemResult, InferenceError>>) -> Self {
        Self {
            gate: Some(Arc::new(Notify::new())),
            ..Self::replying(replies)
        }
    }

    pub fn gate(&self) -> Arc<Notify> {
        self.gate.clone().unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<PoemRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceClient for FakeInference {
    async fn compose(&self, request: &PoemRequest) -> Result<PoemResult, InferenceError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(InferenceError::Malformed("no reply scripted".to_string())))
    }
}
