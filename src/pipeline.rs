//! Capture → remote inference → render, one run per recognized tap.
//!
//! A run owns the busy flag and the status indicator from the moment it is
//! admitted until it finishes. Both are handed back by `RunGuard`'s drop,
//! so every exit path (success, each failure, even a panic or a dropped
//! future) leaves the shutter usable.

use crate::error::HardwareError;
use crate::hardware::{Camera, IndicatorMode, KnobSelector, StatusIndicator};
use crate::inference::{self, InferenceClient, PoemRequest};
use crate::printer::PrintJob;
use crate::receipt;
use crate::services::{PrintSession, PrinterHandle};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// How a failed capture is surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureFailureSeverity {
    /// Print an apology and stay usable
    #[default]
    Report,
    /// Treat as a hardware fault: stop taking pictures, signal SOS
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Capturing,
    Encoding,
    Captioning,
    Composing,
    Rendering,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    Printed,
    CaptureFailed,
    InferenceFailed,
    /// Capture failed with `CaptureFailureSeverity::Fatal`
    HardwareFault,
    /// Another run held the busy flag; nothing happened
    #[cfg(test)]
    AlreadyRunning,
}

/// Shared "a run is in progress" flag
///
/// Anyone may read it; only the orchestrator sets and clears it.
#[derive(Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn try_acquire(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn release(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
impl BusyFlag {
    /// A flag as seen while some run is in progress
    pub fn held() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
}

/// Ownership of the busy flag and indicator for one run
struct RunGuard {
    busy: BusyFlag,
    indicator: Arc<dyn StatusIndicator>,
}

impl RunGuard {
    fn acquire(busy: &BusyFlag, indicator: &Arc<dyn StatusIndicator>) -> Option<Self> {
        if !busy.try_acquire() {
            return None;
        }
        indicator.set(IndicatorMode::Working);
        Some(Self {
            busy: busy.clone(),
            indicator: indicator.clone(),
        })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        // Indicator first: once the flag clears, a new run may claim it
        self.indicator.set(IndicatorMode::Ready);
        self.busy.release();
    }
}

pub struct PipelineSettings {
    pub device_id: String,
    pub line_width: usize,
    pub footer: Vec<String>,
    pub capture_failure: CaptureFailureSeverity,
}

pub struct PipelineOrchestrator {
    camera: Arc<dyn Camera>,
    inference: Arc<dyn InferenceClient>,
    printer: PrinterHandle,
    indicator: Arc<dyn StatusIndicator>,
    knob: KnobSelector,
    busy: BusyFlag,
    settings: PipelineSettings,
}

impl PipelineOrchestrator {
    pub fn new(
        camera: Arc<dyn Camera>,
        inference: Arc<dyn InferenceClient>,
        printer: PrinterHandle,
        indicator: Arc<dyn StatusIndicator>,
        knob: KnobSelector,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            camera,
            inference,
            printer,
            indicator,
            knob,
            busy: BusyFlag::default(),
            settings,
        }
    }

    /// Read-only view of the busy flag for the gesture recognizer
    pub fn busy_flag(&self) -> BusyFlag {
        self.busy.clone()
    }

    /// Claim the busy flag and return the run to drive, or `None` if a run
    /// is already in progress.
    ///
    /// The flag is taken synchronously, before the caller spawns the
    /// returned future, so two taps can never both be admitted.
    pub fn begin(self: &Arc<Self>) -> Option<BoxFuture<'static, PipelineOutcome>> {
        let guard = RunGuard::acquire(&self.busy, &self.indicator)?;
        let this = Arc::clone(self);

        Some(
            async move {
                let _guard = guard;
                this.execute().await
            }
            .boxed(),
        )
    }

    /// Run the pipeline in place
    #[cfg(test)]
    pub async fn run(self: &Arc<Self>) -> PipelineOutcome {
        match self.begin() {
            Some(run) => run.await,
            None => {
                tracing::debug!("Pipeline already running");
                PipelineOutcome::AlreadyRunning
            }
        }
    }

    async fn execute(&self) -> PipelineOutcome {
        let started = Instant::now();

        self.enter(Stage::Capturing);
        let capture = match self.camera.capture().await {
            Ok(capture) => capture,
            Err(e) => return self.capture_failed(e).await,
        };

        self.enter(Stage::Encoding);
        let image = inference::encode_image(&capture.bytes);
        let selection = self.knob.selection();
        tracing::info!(knob = selection.index, format = %selection.format, "Poem format selected");

        let request = PoemRequest {
            image,
            device_id: self.settings.device_id.clone(),
            knob: selection.index,
            poem_format: Some(selection.format),
        };

        // The receipt keeps the printer from the header to the footer; the
        // header prints while the poem is still being written
        let session = self.printer.session().await;
        self.enter(Stage::Captioning);
        let (_, response) = tokio::join!(
            session.print_or_log(receipt::header(capture.captured_at)),
            self.inference.compose(&request),
        );

        self.enter(Stage::Composing);
        let poem = match response {
            Ok(poem) => poem,
            Err(e) => {
                tracing::warn!("Poem request failed: {}", e);
                self.print_apology(&session, &e.to_string()).await;
                return PipelineOutcome::InferenceFailed;
            }
        };
        if let Some(caption) = &poem.caption {
            tracing::info!("Caption: {}", caption);
        }

        self.enter(Stage::Rendering);
        let job = receipt::poem(&poem, self.settings.line_width)
            .append(receipt::footer(&self.settings.footer));
        session.print_or_log(job).await;

        tracing::info!("Poem printed in {:.1?}", started.elapsed());
        PipelineOutcome::Printed
    }

    fn enter(&self, stage: Stage) {
        tracing::debug!("Pipeline stage: {:?}", stage);
    }

    async fn capture_failed(&self, error: HardwareError) -> PipelineOutcome {
        match self.settings.capture_failure {
            CaptureFailureSeverity::Report => {
                tracing::error!("Capture failed: {}", error);
                let session = self.printer.session().await;
                self.print_apology(&session, &format!("camera: {}", error))
                    .await;
                PipelineOutcome::CaptureFailed
            }
            CaptureFailureSeverity::Fatal => {
                tracing::error!("Capture failed, treating camera as faulty: {}", error);
                PipelineOutcome::HardwareFault
            }
        }
    }

    async fn print_apology(&self, session: &PrintSession, detail: &str) {
        let job: PrintJob = receipt::apology(detail, self.settings.line_width)
            .append(receipt::footer(&self.settings.footer));
        session.print_or_log(job).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use crate::hardware::{KnobPosition, NoSwitches};
    use crate::inference::PoemResult;
    use crate::connectivity::ConnectivityMonitor;
    use crate::services::PrinterService;
    use crate::testing::{
        FakeCamera, FakeInference, FakeSwitches, MemorySink, RecordingIndicator, ScriptedProbe,
    };

    struct Rig {
        pipeline: Arc<PipelineOrchestrator>,
        printer: PrinterHandle,
        sink: MemorySink,
        indicator: Arc<RecordingIndicator>,
        inference: Arc<FakeInference>,
    }

    fn rig_with(
        camera: FakeCamera,
        inference: FakeInference,
        knob: KnobSelector,
        capture_failure: CaptureFailureSeverity,
    ) -> Rig {
        let sink = MemorySink::default();
        let indicator = Arc::new(RecordingIndicator::default());
        let inference = Arc::new(inference);
        let printer = PrinterService::spawn(Box::new(sink.clone()));
        let pipeline = PipelineOrchestrator::new(
            Arc::new(camera),
            inference.clone(),
            printer.clone(),
            indicator.clone(),
            knob,
            PipelineSettings {
                device_id: "poetcam-test".to_string(),
                line_width: 32,
                footer: vec!["a poem by".to_string(), "poetcam".to_string()],
                capture_failure,
            },
        );

        Rig {
            pipeline: Arc::new(pipeline),
            printer,
            sink,
            indicator,
            inference,
        }
    }

    fn no_knob() -> KnobSelector {
        KnobSelector::new(vec![], "free verse".to_string(), Box::new(NoSwitches))
    }

    fn rig(inference: FakeInference) -> Rig {
        rig_with(
            FakeCamera::ok(b"jpeg"),
            inference,
            no_knob(),
            CaptureFailureSeverity::Report,
        )
    }

    fn poem(text: &str) -> Result<PoemResult, InferenceError> {
        Ok(PoemResult {
            text: text.to_string(),
            caption: None,
        })
    }

    fn server_error() -> Result<PoemResult, InferenceError> {
        Err(InferenceError::Status {
            status: 500,
            body: "internal server error".to_string(),
        })
    }

    #[tokio::test]
    async fn test_successful_run_prints_header_poem_and_footer() {
        let rig = rig(FakeInference::replying([poem("silver kettle sings")]));

        assert_eq!(rig.pipeline.run().await, PipelineOutcome::Printed);

        let text = rig.sink.text();
        let header = text.find("`'. .'`").unwrap();
        let body = text.find("silver kettle sings").unwrap();
        let footer = text.find("a poem by").unwrap();
        assert!(header < body && body < footer);
        assert!(!rig.pipeline.busy_flag().is_set());
    }

    #[tokio::test]
    async fn test_server_error_prints_apology_and_recovers() {
        let rig = rig(FakeInference::replying([server_error()]));

        assert_eq!(rig.pipeline.run().await, PipelineOutcome::InferenceFailed);

        let text = rig.sink.text();
        assert!(text.contains("Error"));
        assert!(text.contains("500"));
        assert!(text.contains("a poem by"));
        assert!(!rig.pipeline.busy_flag().is_set());
        assert_eq!(rig.indicator.last(), Some(IndicatorMode::Ready));
    }

    #[tokio::test]
    async fn test_malformed_response_takes_the_same_path() {
        let rig = rig(FakeInference::replying([Err(InferenceError::Malformed(
            "response has no poem".to_string(),
        ))]));

        assert_eq!(rig.pipeline.run().await, PipelineOutcome::InferenceFailed);
        assert!(rig.sink.text().contains("Error: malformed response"));
    }

    #[tokio::test]
    async fn test_busy_flag_is_clear_around_every_outcome() {
        let rig = rig(FakeInference::replying([
            poem("one"),
            server_error(),
            Err(InferenceError::Malformed("no poem".to_string())),
            poem("two"),
        ]));
        let busy = rig.pipeline.busy_flag();

        for expected in [
            PipelineOutcome::Printed,
            PipelineOutcome::InferenceFailed,
            PipelineOutcome::InferenceFailed,
            PipelineOutcome::Printed,
        ] {
            assert!(!busy.is_set());
            assert_eq!(rig.pipeline.run().await, expected);
            assert!(!busy.is_set());
        }

        let modes = rig.indicator.modes();
        assert_eq!(
            modes.iter().filter(|m| **m == IndicatorMode::Working).count(),
            4
        );
        assert_eq!(modes.last(), Some(&IndicatorMode::Ready));
    }

    #[tokio::test]
    async fn test_second_trigger_while_running_is_refused() {
        let camera = FakeCamera::gated(b"jpeg");
        let gate = camera.gate();
        let rig = rig_with(
            camera,
            FakeInference::replying([poem("only once")]),
            no_knob(),
            CaptureFailureSeverity::Report,
        );

        let first = rig.pipeline.begin().expect("first run admitted");
        let running = tokio::spawn(first);
        tokio::task::yield_now().await;

        assert!(rig.pipeline.busy_flag().is_set());
        assert!(rig.pipeline.begin().is_none());
        assert_eq!(rig.pipeline.run().await, PipelineOutcome::AlreadyRunning);

        gate.notify_one();
        assert_eq!(running.await.unwrap(), PipelineOutcome::Printed);
        assert!(!rig.pipeline.busy_flag().is_set());
        assert_eq!(rig.inference.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_connectivity_notice_waits_for_the_receipt() {
        let rig = rig(FakeInference::gated([Err(InferenceError::Malformed(
            "timed out".to_string(),
        ))]));
        let gate = rig.inference.gate();

        let running = tokio::spawn(rig.pipeline.begin().unwrap());
        for _ in 0..100 {
            if rig.sink.text().contains("`'. .'`") {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let mut monitor = ConnectivityMonitor::new(
            Box::new(ScriptedProbe::new([Ok(false)])),
            rig.printer.clone(),
            rig.indicator.clone(),
            std::time::Duration::from_secs(1),
            String::new(),
        );
        let notice = tokio::spawn(async move { monitor.tick().await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!rig.sink.text().contains("OFFLINE"));

        gate.notify_one();
        assert_eq!(running.await.unwrap(), PipelineOutcome::InferenceFailed);
        assert!(notice.await.unwrap().is_some());

        let text = rig.sink.text();
        let header = text.find("`'. .'`").unwrap();
        let error = text.find("Error: malformed response").unwrap();
        let footer = text.find("a poem by").unwrap();
        let offline = text.find("OFFLINE").unwrap();
        assert!(header < error && error < footer && footer < offline);
    }

    #[tokio::test]
    async fn test_dropping_a_run_releases_the_flag() {
        let camera = FakeCamera::gated(b"jpeg");
        let rig = rig_with(
            camera,
            FakeInference::replying([]),
            no_knob(),
            CaptureFailureSeverity::Report,
        );

        let run = rig.pipeline.begin().unwrap();
        assert!(rig.pipeline.busy_flag().is_set());
        drop(run);
        assert!(!rig.pipeline.busy_flag().is_set());
    }

    #[tokio::test]
    async fn test_capture_failure_is_reported() {
        let rig = rig_with(
            FakeCamera::failing(),
            FakeInference::replying([]),
            no_knob(),
            CaptureFailureSeverity::Report,
        );

        assert_eq!(rig.pipeline.run().await, PipelineOutcome::CaptureFailed);
        assert!(rig.sink.text().contains("Error: camera"));
        assert!(rig.inference.requests().is_empty());
        assert!(!rig.pipeline.busy_flag().is_set());
    }

    #[tokio::test]
    async fn test_fatal_capture_failure_is_a_hardware_fault() {
        let rig = rig_with(
            FakeCamera::failing(),
            FakeInference::replying([]),
            no_knob(),
            CaptureFailureSeverity::Fatal,
        );

        assert_eq!(rig.pipeline.run().await, PipelineOutcome::HardwareFault);
        assert!(rig.sink.text().is_empty());
        assert!(!rig.pipeline.busy_flag().is_set());
    }

    #[tokio::test]
    async fn test_request_carries_image_device_and_knob() {
        let knob = KnobSelector::new(
            vec![
                KnobPosition {
                    key: 2,
                    format: "haiku".to_string(),
                },
                KnobPosition {
                    key: 3,
                    format: "sonnet".to_string(),
                },
            ],
            "free verse".to_string(),
            Box::new(FakeSwitches::pressed(&[3])),
        );
        let rig = rig_with(
            FakeCamera::ok(b"jpeg"),
            FakeInference::replying([poem("fourteen lines")]),
            knob,
            CaptureFailureSeverity::Report,
        );

        rig.pipeline.run().await;

        let requests = rig.inference.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].image, "data:image/jpeg;base64,anBlZw==");
        assert_eq!(requests[0].device_id, "poetcam-test");
        assert_eq!(requests[0].knob, 2);
        assert_eq!(requests[0].poem_format.as_deref(), Some("sonnet"));
    }
}
