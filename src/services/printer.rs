use crate::messages::PrinterCommand;
use crate::printer::{PrintJob, PrinterSink, escpos};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc, oneshot};

/// Serializes all access to the receipt printer
///
/// This service:
/// - Owns the printer sink exclusively
/// - Receives whole print jobs via channel
/// - Encodes each job and writes it before taking the next one
///
/// The serial link blocks on writes, so the service runs on its own OS
/// thread. It exits once every `PrinterHandle` has been dropped, which
/// closes the device.
pub struct PrinterService {
    cmd_rx: mpsc::Receiver<PrinterCommand>,
    sink: Box<dyn PrinterSink>,
}

impl PrinterService {
    pub fn new(cmd_rx: mpsc::Receiver<PrinterCommand>, sink: Box<dyn PrinterSink>) -> Self {
        Self { cmd_rx, sink }
    }

    /// Start the service on a dedicated thread and return its handle
    pub fn spawn(sink: Box<dyn PrinterSink>) -> PrinterHandle {
        let (tx, rx) = mpsc::channel(16);
        let service = Self::new(rx, sink);
        if let Err(e) = std::thread::Builder::new()
            .name("printer".to_string())
            .spawn(move || service.run())
        {
            // The handle still works; every print reports the closed channel
            tracing::error!("Failed to start printer thread: {}", e);
        }
        PrinterHandle::new(tx)
    }

    fn run(mut self) {
        while let Some(cmd) = self.cmd_rx.blocking_recv() {
            self.handle_command(cmd);
        }
        tracing::debug!("Printer service stopped");
    }

    fn handle_command(&mut self, cmd: PrinterCommand) {
        match cmd {
            PrinterCommand::Print { job, reply } => {
                let bytes = escpos::encode(&job);
                tracing::debug!("Printing job: {} ops, {} bytes", job.ops().len(), bytes.len());

                let result = self
                    .sink
                    .write_all(&bytes)
                    .and_then(|_| self.sink.flush());

                if let Err(e) = &result {
                    tracing::error!("Failed to print: {:#}", e);
                }
                let _ = reply.send(result);
            }
        }
    }
}

/// Handle for submitting jobs to the PrinterService
///
/// Single jobs wait for any open [`PrintSession`], so nothing lands in
/// the middle of a receipt that is still being assembled.
#[derive(Clone)]
pub struct PrinterHandle {
    tx: mpsc::Sender<PrinterCommand>,
    receipt: Arc<Mutex<()>>,
}

impl PrinterHandle {
    pub fn new(tx: mpsc::Sender<PrinterCommand>) -> Self {
        Self {
            tx,
            receipt: Arc::new(Mutex::new(())),
        }
    }

    /// Print a job and wait until it has been written
    pub async fn print(&self, job: PrintJob) -> Result<()> {
        let _receipt = self.receipt.lock().await;
        self.submit(job).await
    }

    /// Print a job, logging instead of returning any failure
    pub async fn print_or_log(&self, job: PrintJob) {
        if let Err(e) = self.print(job).await {
            tracing::warn!("Print failed, continuing: {:#}", e);
        }
    }

    /// Reserve the printer for a multi-job receipt until the session drops
    pub async fn session(&self) -> PrintSession {
        PrintSession {
            printer: self.clone(),
            _receipt: self.receipt.clone().lock_owned().await,
        }
    }

    async fn submit(&self, job: PrintJob) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PrinterCommand::Print { job, reply })
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send print command: {}", e))?;

        rx.await
            .map_err(|e| anyhow::anyhow!("Failed to receive print response: {}", e))?
    }
}

/// Exclusive use of the printer for one receipt
pub struct PrintSession {
    printer: PrinterHandle,
    _receipt: OwnedMutexGuard<()>,
}

impl PrintSession {
    pub async fn print_or_log(&self, job: PrintJob) {
        if let Err(e) = self.printer.submit(job).await {
            tracing::warn!("Print failed, continuing: {:#}", e);
        }
    }
}
