use crate::config::Config;
use crate::connectivity::{ConnectivityMonitor, PingProbe};
use crate::error::StartupError;
use crate::gesture::{GestureRecognizer, Trigger};
use crate::hardware::buttons;
use crate::hardware::{
    Camera, CommandCamera, EvdevSwitches, IndicatorMode, KnobSelector, NoSwitches,
    StatusIndicator, SwitchBank,
};
use crate::hooks;
use crate::inference::HttpInferenceClient;
use crate::messages::{ButtonEvent, DeviceState};
use crate::pipeline::{PipelineOrchestrator, PipelineOutcome, PipelineSettings};
use crate::printer::{SerialSink, serial};
use crate::receipt;
use crate::services::{PrinterHandle, PrinterService};

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};

/// What a hold on the shutter does
pub struct ShutdownSettings {
    pub command: String,
    /// How long the indicator acknowledges the hold before the command runs
    pub ack: Duration,
}

pub struct App {
    state: DeviceState,
    indicator: Arc<dyn StatusIndicator>,
    pipeline: Arc<PipelineOrchestrator>,
    recognizer: GestureRecognizer,
    button_rx: mpsc::Receiver<ButtonEvent>,
    input_open: bool,
    runs: JoinSet<PipelineOutcome>,
    monitor: Option<JoinHandle<()>>,
    shutdown: ShutdownSettings,
}

impl App {
    /// Bring up the hardware and self-test it.
    ///
    /// Any error here means the device cannot work at all; the caller is
    /// expected to signal it with `app::halt`.
    pub async fn new(config: Config, indicator: Arc<dyn StatusIndicator>) -> Result<Self> {
        let printer = Self::setup_printer(&config).await?;
        let camera = Self::setup_camera(&config);
        self_test(&printer, camera.as_ref()).await?;
        let (button_rx, knob) = Self::setup_input(&config)?;

        let inference = HttpInferenceClient::new(&config.api_url, Duration::from_secs(config.timeout))?;

        let pipeline = PipelineOrchestrator::new(
            camera,
            Arc::new(inference),
            printer.clone(),
            indicator.clone(),
            knob,
            PipelineSettings {
                device_id: config.device_id.clone(),
                line_width: config.line_width,
                footer: config.footer.clone(),
                capture_failure: config.camera.failure_severity,
            },
        );

        let monitor = ConnectivityMonitor::new(
            Box::new(PingProbe::new(&config.connectivity.host)),
            printer,
            indicator.clone(),
            Duration::from_secs(config.connectivity.probe_timeout_secs),
            config.connectivity.setup_hint.clone(),
        )
        .spawn(Duration::from_secs(config.connectivity.poll_interval_secs));

        let mut app = Self::assemble(
            &config,
            indicator,
            Arc::new(pipeline),
            button_rx,
            ShutdownSettings {
                command: config.shutdown_command.clone(),
                ack: Duration::from_millis(config.shutdown_ack_ms),
            },
        );
        app.monitor = Some(monitor);

        tracing::info!(
            "Ready! Tap the shutter for a poem, hold it for {:?} to power off",
            config.gesture_thresholds().tap_max
        );
        Ok(app)
    }

    fn assemble(
        config: &Config,
        indicator: Arc<dyn StatusIndicator>,
        pipeline: Arc<PipelineOrchestrator>,
        button_rx: mpsc::Receiver<ButtonEvent>,
        shutdown: ShutdownSettings,
    ) -> Self {
        let recognizer = GestureRecognizer::new(
            config.gesture_thresholds(),
            indicator.clone(),
            pipeline.busy_flag(),
        );

        Self {
            state: DeviceState::Ready,
            indicator,
            pipeline,
            recognizer,
            button_rx,
            input_open: true,
            runs: JoinSet::new(),
            monitor: None,
            shutdown,
        }
    }

    async fn setup_printer(config: &Config) -> Result<PrinterHandle, StartupError> {
        let device = &config.printer.device;

        if let Some(baud) = config.printer.baud_rate {
            serial::configure_port(device, baud)
                .await
                .map_err(StartupError::Printer)?;
        }

        let sink = SerialSink::open(device).map_err(StartupError::Printer)?;
        Ok(PrinterService::spawn(Box::new(sink)))
    }

    fn setup_camera(config: &Config) -> Arc<dyn Camera> {
        Arc::new(CommandCamera::new(
            &config.camera.command,
            config.camera.args.clone(),
            Duration::from_secs(config.camera.timeout_secs),
        ))
    }

    fn setup_input(
        config: &Config,
    ) -> Result<(mpsc::Receiver<ButtonEvent>, KnobSelector), StartupError> {
        let (path, device) = buttons::open_input(config.input_device.as_deref(), config.shutter_key)
            .map_err(StartupError::Input)?;

        let knob_path = config.knob_device.as_deref().map(Path::new).unwrap_or(&path);
        let bank: Box<dyn SwitchBank> = if config.knobs.is_empty() {
            Box::new(NoSwitches)
        } else {
            match evdev::Device::open(knob_path) {
                Ok(knob) => Box::new(EvdevSwitches::new(knob)),
                Err(e) => {
                    tracing::warn!("Knob unavailable at {:?}, using default format: {}", knob_path, e);
                    Box::new(NoSwitches)
                }
            }
        };
        let knob = KnobSelector::new(config.knobs.clone(), config.default_poem_format.clone(), bank);

        let (tx, rx) = mpsc::channel(32);
        let key = config.shutter_key;
        tokio::spawn(async move {
            if let Err(e) = buttons::monitor_button(device, key, tx).await {
                tracing::error!("Shutter monitoring stopped: {:#}", e);
            }
        });

        Ok((rx, knob))
    }

    pub async fn run(mut self) -> Result<()> {
        self.indicator.set(IndicatorMode::Ready);

        let terminated = termination();
        tokio::pin!(terminated);

        loop {
            tokio::select! {
                event = self.button_rx.recv(), if self.input_open => match event {
                    Some(event) => self.handle_button(event),
                    None => {
                        tracing::error!("Shutter input closed");
                        self.input_open = false;
                        self.halt();
                    }
                },
                Some(joined) = self.runs.join_next() => self.handle_outcome(joined),
                result = &mut terminated => {
                    result?;
                    break;
                }
            }
        }

        self.stop();
        tracing::info!("Poetry camera stopped");
        Ok(())
    }

    fn handle_button(&mut self, event: ButtonEvent) {
        if self.state != DeviceState::Ready {
            tracing::debug!("Ignoring button while {:?}", self.state);
            return;
        }

        match self.recognizer.handle(event) {
            Some(Trigger::Capture) => match self.pipeline.begin() {
                Some(run) => {
                    self.runs.spawn(run);
                }
                None => tracing::info!("Ignoring tap while pipeline is running"),
            },
            Some(Trigger::Shutdown) => self.begin_shutdown(),
            None => {}
        }
    }

    fn handle_outcome(&mut self, joined: Result<PipelineOutcome, JoinError>) {
        match joined {
            Ok(PipelineOutcome::HardwareFault) => self.halt(),
            Ok(outcome) => tracing::info!("Pipeline finished: {:?}", outcome),
            Err(e) => tracing::error!("Pipeline task failed: {}", e),
        }

        // A run that ends late hands the indicator back as Ready
        match self.state {
            DeviceState::Ready => {}
            DeviceState::Halted => self.indicator.set(IndicatorMode::Fault),
            DeviceState::ShuttingDown => self.indicator.set(IndicatorMode::ShuttingDown),
        }
    }

    fn halt(&mut self) {
        tracing::error!("Hardware fault, no longer accepting input");
        self.state = DeviceState::Halted;
        self.indicator.set(IndicatorMode::Fault);
    }

    fn begin_shutdown(&mut self) {
        self.state = DeviceState::ShuttingDown;
        self.indicator.set(IndicatorMode::ShuttingDown);

        let command = self.shutdown.command.clone();
        let ack = self.shutdown.ack;
        tokio::spawn(async move {
            tokio::time::sleep(ack).await;
            if let Err(e) = hooks::run_command("shutdown", &command).await {
                tracing::error!("Power off failed: {:#}", e);
            }
        });
    }

    fn stop(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
        self.indicator.set(IndicatorMode::Off);
    }
}

/// Prove the printer and camera work before accepting input.
///
/// The greeting goes out first so a working printer shows life even when
/// the camera is what fails.
async fn self_test(printer: &PrinterHandle, camera: &dyn Camera) -> Result<(), StartupError> {
    printer
        .print(receipt::greeting())
        .await
        .map_err(StartupError::Printer)?;

    // One throwaway capture proves the sensor works and warms it up
    camera.capture().await.map_err(StartupError::Camera)?;
    tracing::info!("Camera self-test passed");

    Ok(())
}

/// Signal a failed startup with SOS until the process is told to stop
pub async fn halt(indicator: Arc<dyn StatusIndicator>, error: anyhow::Error) -> Result<()> {
    tracing::error!("Startup failed: {:#}", error);
    indicator.set(IndicatorMode::Fault);

    let result = termination().await;
    indicator.set(IndicatorMode::Off);
    result
}

/// Resolves on Ctrl+C or SIGTERM
async fn termination() -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            tracing::info!("Received Ctrl+C, shutting down");
        }
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
    }

    Ok(())
}
