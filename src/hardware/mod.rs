pub mod buttons;
pub mod camera;
pub mod indicator;
pub mod knob;

pub use buttons::EvdevSwitches;
pub use camera::{Camera, CommandCamera};
pub use indicator::{IndicatorMode, LedIndicator, StatusIndicator};
pub use knob::{KnobPosition, KnobSelector, NoSwitches, SwitchBank};
