//! Status LED driven through the Linux LED class (`/sys/class/leds/*`)

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// What the status light is telling the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorMode {
    Off,
    /// Steady on: waiting for the shutter
    Ready,
    /// Off while the shutter is held down
    Pressed,
    /// Blinking while a pipeline run is in progress
    Working,
    /// Fast blink before the device powers off
    ShuttingDown,
    /// Repeating SOS: unrecoverable hardware problem
    Fault,
}

/// Status-indicator capability
///
/// Setting a mode never fails from the caller's point of view; drivers log
/// their own write errors.
pub trait StatusIndicator: Send + Sync {
    fn set(&self, mode: IndicatorMode);

    /// Connectivity overlay, only visible while the mode is `Ready`
    fn set_offline(&self, offline: bool);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Steady(bool),
    /// Repeated forever: (lit, how long)
    Cycle(Vec<(bool, Duration)>),
}

pub fn pattern(mode: IndicatorMode, offline: bool) -> Pattern {
    match mode {
        IndicatorMode::Off | IndicatorMode::Pressed => Pattern::Steady(false),
        IndicatorMode::Ready if offline => Pattern::Cycle(vec![(true, ms(100)), (false, ms(1900))]),
        IndicatorMode::Ready => Pattern::Steady(true),
        IndicatorMode::Working => Pattern::Cycle(vec![(true, ms(500)), (false, ms(500))]),
        IndicatorMode::ShuttingDown => Pattern::Cycle(vec![(true, ms(250)), (false, ms(250))]),
        IndicatorMode::Fault => Pattern::Cycle(sos()),
    }
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn sos() -> Vec<(bool, Duration)> {
    const DOT: u64 = 200;
    const DASH: u64 = 3 * DOT;

    let letter = |on: u64, gap_after: u64| {
        vec![
            (true, ms(on)),
            (false, ms(DOT)),
            (true, ms(on)),
            (false, ms(DOT)),
            (true, ms(on)),
            (false, ms(gap_after)),
        ]
    };

    let mut steps = letter(DOT, DASH);
    steps.extend(letter(DASH, DASH));
    steps.extend(letter(DOT, 7 * DOT));
    steps
}

struct LedState {
    mode: IndicatorMode,
    offline: bool,
    blink: Option<JoinHandle<()>>,
}

/// LED exposed at e.g. `/sys/class/leds/poetcam-status`
pub struct LedIndicator {
    brightness_path: PathBuf,
    max_brightness: u32,
    generation: Arc<AtomicU64>,
    state: Mutex<LedState>,
}

impl LedIndicator {
    pub fn new(led_path: impl AsRef<Path>) -> Self {
        let led_path = led_path.as_ref();
        let max_brightness_path = led_path.join("max_brightness");

        let max_brightness = match std::fs::read_to_string(&max_brightness_path) {
            Ok(s) => s.trim().parse::<u32>().ok().filter(|v| *v > 0).unwrap_or(1),
            Err(e) => {
                tracing::warn!(
                    path = %max_brightness_path.display(),
                    error = %e,
                    "Cannot read max_brightness, assuming 1"
                );
                1
            }
        };

        tracing::info!(path = %led_path.display(), max_brightness, "Using status LED");

        Self {
            brightness_path: led_path.join("brightness"),
            max_brightness,
            generation: Arc::new(AtomicU64::new(0)),
            state: Mutex::new(LedState {
                mode: IndicatorMode::Off,
                offline: false,
                blink: None,
            }),
        }
    }

    fn apply(&self, state: &mut LedState) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(blink) = state.blink.take() {
            blink.abort();
        }

        match pattern(state.mode, state.offline) {
            Pattern::Steady(lit) => write_brightness(&self.brightness_path, self.level(lit)),
            Pattern::Cycle(steps) => match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    state.blink = Some(runtime.spawn(blink(
                        self.brightness_path.clone(),
                        self.max_brightness,
                        steps,
                        generation,
                        self.generation.clone(),
                    )));
                }
                Err(_) => write_brightness(&self.brightness_path, self.max_brightness),
            },
        }
    }

    fn level(&self, lit: bool) -> u32 {
        if lit { self.max_brightness } else { 0 }
    }
}

impl StatusIndicator for LedIndicator {
    fn set(&self, mode: IndicatorMode) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.mode == mode && state.blink.is_some() {
            return;
        }
        tracing::debug!("Indicator: {:?}", mode);
        state.mode = mode;
        self.apply(&mut state);
    }

    fn set_offline(&self, offline: bool) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.offline == offline {
            return;
        }
        state.offline = offline;
        self.apply(&mut state);
    }
}

impl Drop for LedIndicator {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(blink) = state.blink.take() {
            blink.abort();
        }
    }
}

async fn blink(
    path: PathBuf,
    max_brightness: u32,
    steps: Vec<(bool, Duration)>,
    generation: u64,
    current: Arc<AtomicU64>,
) {
    loop {
        for (lit, duration) in &steps {
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            write_brightness(&path, if *lit { max_brightness } else { 0 });
            tokio::time::sleep(*duration).await;
        }
    }
}

fn write_brightness(path: &Path, value: u32) {
    if let Err(e) = std::fs::write(path, value.to_string()) {
        tracing::debug!(path = %path.display(), error = %e, "LED write failed");
    }
}
