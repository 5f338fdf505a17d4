use crate::error::HardwareError;
use crate::hardware::knob::SwitchBank;
use crate::messages::{ButtonEvent, Edge};
use anyhow::{Context, Result};
use evdev::{Device, EventSummary, KeyCode};
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Open the input device carrying `key`.
///
/// Uses `path` when configured, otherwise the first input device that
/// reports the key (e.g. the gpio-keys node wired to the shutter).
pub fn open_input(path: Option<&str>, key: u16) -> Result<(PathBuf, Device)> {
    let code = KeyCode::new(key);

    if let Some(path) = path {
        let device =
            Device::open(path).with_context(|| format!("Failed to open input device {}", path))?;
        if !supports(&device, code) {
            tracing::warn!("Input device {} does not report key code {}", path, key);
        }
        return Ok((PathBuf::from(path), device));
    }

    let (path, device) = evdev::enumerate()
        .find(|(_, device)| supports(device, code))
        .ok_or(HardwareError::NoInputDevice(key))?;

    tracing::info!(
        "Using input device {:?} ({})",
        path,
        device.name().unwrap_or("unnamed")
    );
    Ok((path, device))
}

fn supports(device: &Device, key: KeyCode) -> bool {
    device
        .supported_keys()
        .is_some_and(|keys| keys.contains(key))
}

/// Map an evdev key value to an edge; autorepeat (2) is ignored
pub fn edge_for(value: i32) -> Option<Edge> {
    match value {
        1 => Some(Edge::Pressed),
        0 => Some(Edge::Released),
        _ => None,
    }
}

/// Forward edges of `key` from the device as timestamped button events.
///
/// Runs until the device goes away or the receiver is dropped.
pub async fn monitor_button(device: Device, key: u16, tx: mpsc::Sender<ButtonEvent>) -> Result<()> {
    let code = KeyCode::new(key);
    let mut events = device
        .into_event_stream()
        .context("Failed to stream input events")?;

    loop {
        let event = events
            .next_event()
            .await
            .context("Failed to read input event")?;

        let EventSummary::Key(_, event_code, value) = event.destructure() else {
            continue;
        };
        if event_code != code {
            continue;
        }
        let Some(edge) = edge_for(value) else {
            continue;
        };

        tracing::debug!("Button {:?}", edge);
        let event = ButtonEvent {
            edge,
            at: Instant::now(),
        };
        if tx.send(event).await.is_err() {
            break;
        }
    }

    Ok(())
}

/// Knob switches polled from an evdev device's current key state
pub struct EvdevSwitches {
    device: Mutex<Device>,
}

impl EvdevSwitches {
    pub fn new(device: Device) -> Self {
        Self {
            device: Mutex::new(device),
        }
    }
}

impl SwitchBank for EvdevSwitches {
    fn is_pressed(&self, key: u16) -> std::io::Result<bool> {
        let device = self.device.lock().unwrap_or_else(|e| e.into_inner());
        Ok(device.get_key_state()?.contains(KeyCode::new(key)))
    }
}
