use crate::gesture::GestureThresholds;
use crate::hardware::{KnobPosition, knob};
use crate::pipeline::CaptureFailureSeverity;
use crate::text_wrap;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_device_id")]
    pub device_id: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Remote call timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Input device with the shutter key; auto-detected when unset
    #[serde(default)]
    pub input_device: Option<String>,

    #[serde(default = "default_shutter_key")]
    pub shutter_key: u16,

    /// Input device carrying the knob switches; the shutter's device when unset
    #[serde(default)]
    pub knob_device: Option<String>,

    #[serde(default = "default_knobs")]
    pub knobs: Vec<KnobPosition>,

    #[serde(default = "default_poem_format")]
    pub default_poem_format: String,

    #[serde(default = "default_bounce_threshold_ms")]
    pub bounce_threshold_ms: u64,

    #[serde(default = "default_tap_max_ms")]
    pub tap_max_ms: u64,

    #[serde(default = "default_line_width")]
    pub line_width: usize,

    #[serde(default = "default_footer")]
    pub footer: Vec<String>,

    #[serde(default = "default_led_path")]
    pub led_path: String,

    #[serde(default = "default_shutdown_command")]
    pub shutdown_command: String,

    #[serde(default = "default_shutdown_ack_ms")]
    pub shutdown_ack_ms: u64,

    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub printer: PrinterConfig,

    #[serde(default)]
    pub connectivity: ConnectivityConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CameraConfig {
    #[serde(default = "default_camera_command")]
    pub command: String,

    #[serde(default = "default_camera_args")]
    pub args: Vec<String>,

    #[serde(default = "default_camera_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub failure_severity: CaptureFailureSeverity,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PrinterConfig {
    #[serde(default = "default_printer_device")]
    pub device: String,

    /// Applied with `stty` before opening; skipped when unset
    #[serde(default = "default_baud_rate")]
    pub baud_rate: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ConnectivityConfig {
    #[serde(default = "default_probe_host")]
    pub host: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Printed under offline notices
    #[serde(default = "default_setup_hint")]
    pub setup_hint: String,
}

fn default_device_id() -> String {
    "poetcam".to_string()
}

fn default_api_url() -> String {
    "http://localhost:8000/poem".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_shutter_key() -> u16 {
    // KEY_CAMERA
    212
}

fn default_knobs() -> Vec<KnobPosition> {
    // KEY_1..KEY_8 from the rotary switch's gpio-keys overlay
    [
        "4 line free verse. Do not rhyme. DO NOT EXCEED 4 LINES.",
        "Modern Sonnet. The poem must match the format of a sonnet, but it should be written in modern vernacular english, it must not be written in olde english.",
        "limerick. DO NOT EXCEED 5 LINES.",
        "couplet. You must write a poem that is only two lines long. Make sure to incorporate elements from the image. It must be only two lines.",
        "poem where each word begins with the same letter. It must be four lines or less.",
        "poem where each word is a verb. It must be four lines or less.",
        "haiku. You must match the 5 syllable, 7 syllable, 5 syllable format. It must not rhyme",
        "8 line rhyming poem. Do not exceed 8 lines.",
    ]
    .into_iter()
    .zip(2u16..)
    .map(|(format, key)| KnobPosition {
        key,
        format: format.to_string(),
    })
    .collect()
}

fn default_poem_format() -> String {
    "4 line free verse. Do not rhyme. DO NOT EXCEED 4 LINES.".to_string()
}

fn default_bounce_threshold_ms() -> u64 {
    50
}

fn default_tap_max_ms() -> u64 {
    2000
}

fn default_line_width() -> usize {
    32
}

fn default_footer() -> Vec<String> {
    vec![
        "This poem was written by AI.".to_string(),
        String::new(),
        "Explore the archives at".to_string(),
        "poetry.camera".to_string(),
    ]
}

fn default_led_path() -> String {
    "/sys/class/leds/poetcam-status".to_string()
}

fn default_shutdown_command() -> String {
    "sudo shutdown -h now".to_string()
}

fn default_shutdown_ack_ms() -> u64 {
    2500
}

fn default_camera_command() -> String {
    "rpicam-still".to_string()
}

fn default_camera_args() -> Vec<String> {
    ["--nopreview", "--immediate", "--width", "1280", "--height", "960"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_camera_timeout() -> u64 {
    10
}

fn default_printer_device() -> String {
    "/dev/serial0".to_string()
}

fn default_baud_rate() -> Option<u32> {
    Some(9600)
}

fn default_probe_host() -> String {
    "8.8.8.8".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_setup_hint() -> String {
    "connect to PoetryCameraSetup wifi network on your phone or laptop".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            api_url: default_api_url(),
            timeout: default_timeout(),
            input_device: None,
            shutter_key: default_shutter_key(),
            knob_device: None,
            knobs: default_knobs(),
            default_poem_format: default_poem_format(),
            bounce_threshold_ms: default_bounce_threshold_ms(),
            tap_max_ms: default_tap_max_ms(),
            line_width: default_line_width(),
            footer: default_footer(),
            led_path: default_led_path(),
            shutdown_command: default_shutdown_command(),
            shutdown_ack_ms: default_shutdown_ack_ms(),
            camera: CameraConfig::default(),
            printer: PrinterConfig::default(),
            connectivity: ConnectivityConfig::default(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            command: default_camera_command(),
            args: default_camera_args(),
            timeout_secs: default_camera_timeout(),
            failure_severity: CaptureFailureSeverity::default(),
        }
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            device: default_printer_device(),
            baud_rate: default_baud_rate(),
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            host: default_probe_host(),
            poll_interval_secs: default_poll_interval(),
            probe_timeout_secs: default_probe_timeout(),
            setup_hint: default_setup_hint(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.config/poetcam/config.json)
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!(
                "Config file not found at {:?}, creating default config",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        tracing::info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        tracing::info!("Saved config to {:?}", config_path);
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("POETCAM_CONFIG") {
            return Ok(PathBuf::from(path));
        }

        let config_dir = if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(dir)
        } else {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            PathBuf::from(home).join(".config")
        };

        Ok(config_dir.join("poetcam").join("config.json"))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_url.is_empty() {
            return Err(anyhow::anyhow!("api_url cannot be empty"));
        }

        if self.device_id.is_empty() {
            return Err(anyhow::anyhow!("device_id cannot be empty"));
        }

        if self.tap_max_ms <= self.bounce_threshold_ms {
            return Err(anyhow::anyhow!(
                "tap_max_ms ({}) must be greater than bounce_threshold_ms ({})",
                self.tap_max_ms,
                self.bounce_threshold_ms
            ));
        }

        if self.line_width <= text_wrap::INDENT.len() {
            return Err(anyhow::anyhow!(
                "line_width must be wider than the {}-column indent",
                text_wrap::INDENT.len()
            ));
        }

        for (name, secs) in [
            ("timeout", self.timeout),
            ("camera.timeout_secs", self.camera.timeout_secs),
            ("connectivity.poll_interval_secs", self.connectivity.poll_interval_secs),
            ("connectivity.probe_timeout_secs", self.connectivity.probe_timeout_secs),
        ] {
            if secs == 0 {
                return Err(anyhow::anyhow!("{} cannot be 0", name));
            }
        }

        if self.knobs.len() > knob::MAX_POSITIONS {
            return Err(anyhow::anyhow!(
                "at most {} knob positions are supported, got {}",
                knob::MAX_POSITIONS,
                self.knobs.len()
            ));
        }

        let mut keys = HashSet::new();
        if let Some(knob) = self.knobs.iter().find(|knob| !keys.insert(knob.key)) {
            return Err(anyhow::anyhow!("knob key {} is used more than once", knob.key));
        }

        Ok(())
    }

    pub fn gesture_thresholds(&self) -> GestureThresholds {
        GestureThresholds {
            bounce: Duration::from_millis(self.bounce_threshold_ms),
            tap_max: Duration::from_millis(self.tap_max_ms),
        }
    }
}
