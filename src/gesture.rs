//! Shutter gesture recognition
//!
//! Button edges are paired into press/release cycles and classified purely
//! by how long the button was held:
//!
//! | held for                        | gesture |
//! |---------------------------------|---------|
//! | `< bounce`                      | Bounce  |
//! | `bounce <= d < tap_max`         | Tap     |
//! | `>= tap_max`                    | Hold    |

use crate::hardware::{IndicatorMode, StatusIndicator};
use crate::messages::{ButtonEvent, Edge};
use crate::pipeline::BusyFlag;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_BOUNCE: Duration = Duration::from_millis(50);
pub const DEFAULT_TAP_MAX: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Tap,
    Hold,
    /// Contact noise, discarded
    Bounce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gesture {
    pub kind: GestureKind,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureThresholds {
    pub bounce: Duration,
    pub tap_max: Duration,
}

impl Default for GestureThresholds {
    fn default() -> Self {
        Self {
            bounce: DEFAULT_BOUNCE,
            tap_max: DEFAULT_TAP_MAX,
        }
    }
}

pub fn classify(duration: Duration, thresholds: &GestureThresholds) -> GestureKind {
    if duration < thresholds.bounce {
        GestureKind::Bounce
    } else if duration < thresholds.tap_max {
        GestureKind::Tap
    } else {
        GestureKind::Hold
    }
}

/// What the device should do in response to a gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Start a pipeline run; the indicator now belongs to the pipeline
    Capture,
    Shutdown,
}

pub struct GestureRecognizer {
    thresholds: GestureThresholds,
    pressed_at: Option<Instant>,
    indicator: Arc<dyn StatusIndicator>,
    busy: BusyFlag,
}

impl GestureRecognizer {
    pub fn new(
        thresholds: GestureThresholds,
        indicator: Arc<dyn StatusIndicator>,
        busy: BusyFlag,
    ) -> Self {
        Self {
            thresholds,
            pressed_at: None,
            indicator,
            busy,
        }
    }

    /// Feed one button edge; returns a trigger when a release completes a
    /// gesture that needs acting on.
    pub fn handle(&mut self, event: ButtonEvent) -> Option<Trigger> {
        match event.edge {
            Edge::Pressed => {
                if self.pressed_at.replace(event.at).is_some() {
                    tracing::debug!("Press without release, restarting gesture");
                }
                self.show(IndicatorMode::Pressed);
                None
            }
            Edge::Released => {
                let gesture = match self.pressed_at.take() {
                    Some(pressed_at) => {
                        let duration = event.at.saturating_duration_since(pressed_at);
                        Gesture {
                            kind: classify(duration, &self.thresholds),
                            duration,
                        }
                    }
                    None => Gesture {
                        kind: GestureKind::Bounce,
                        duration: Duration::ZERO,
                    },
                };
                self.act(gesture)
            }
        }
    }

    fn act(&self, gesture: Gesture) -> Option<Trigger> {
        tracing::debug!("Gesture: {:?} after {:?}", gesture.kind, gesture.duration);

        match gesture.kind {
            GestureKind::Bounce => {
                self.show(IndicatorMode::Ready);
                None
            }
            GestureKind::Tap if self.busy.is_set() => {
                tracing::info!("Ignoring tap while pipeline is running");
                None
            }
            GestureKind::Tap => Some(Trigger::Capture),
            GestureKind::Hold => {
                tracing::info!("Hold for {:.1?}, shutting down", gesture.duration);
                self.show(IndicatorMode::Ready);
                Some(Trigger::Shutdown)
            }
        }
    }

    // A running pipeline owns the indicator
    fn show(&self, mode: IndicatorMode) {
        if !self.busy.is_set() {
            self.indicator.set(mode);
        }
    }
}
