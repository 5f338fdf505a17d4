use serde::{Deserialize, Serialize};
use std::io;

/// Read-only view of the knob's switch inputs
pub trait SwitchBank: Send + Sync {
    fn is_pressed(&self, key: u16) -> io::Result<bool>;
}

/// Positions past this many cannot be reported in the request's `knob` byte
pub const MAX_POSITIONS: usize = u8::MAX as usize;

/// One knob position: the switch that selects it and its poem format
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KnobPosition {
    pub key: u16,
    pub format: String,
}

/// Selection read at the start of a pipeline run; index 0 means none
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnobSelection {
    pub index: u8,
    pub format: String,
}

/// Resolves the rotary knob to a single selection
///
/// Positions are checked in order and the first pressed switch wins, so a
/// knob caught between two detents resolves to the lower position.
pub struct KnobSelector {
    positions: Vec<KnobPosition>,
    default_format: String,
    bank: Box<dyn SwitchBank>,
}

impl KnobSelector {
    pub fn new(positions: Vec<KnobPosition>, default_format: String, bank: Box<dyn SwitchBank>) -> Self {
        Self {
            positions,
            default_format,
            bank,
        }
    }

    pub fn selection(&self) -> KnobSelection {
        for (index, position) in (1..=u8::MAX).zip(&self.positions) {
            match self.bank.is_pressed(position.key) {
                Ok(true) => {
                    return KnobSelection {
                        index,
                        format: position.format.clone(),
                    };
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Failed to read knob switches, using default: {}", e);
                    break;
                }
            }
        }

        KnobSelection {
            index: 0,
            format: self.default_format.clone(),
        }
    }
}

/// Switch bank for devices without a knob
pub struct NoSwitches;

impl SwitchBank for NoSwitches {
    fn is_pressed(&self, _key: u16) -> io::Result<bool> {
        Ok(false)
    }
}
