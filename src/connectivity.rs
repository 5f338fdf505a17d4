//! Connectivity monitor
//!
//! Polls network reachability in the background and reacts only to state
//! transitions, so a flaky or long-lasting outage prints one notice rather
//! than one per probe.

use crate::hardware::StatusIndicator;
use crate::receipt;
use crate::services::PrinterHandle;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Process-wide connectivity state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    /// Not probed yet
    Unknown,
    Online,
    Offline,
}

/// Observable change of connectivity state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityTransition {
    /// First probe after startup succeeded
    InitiallyOnline,
    /// First probe after startup failed
    InitiallyOffline,
    WentOffline,
    BackOnline,
}

/// Reachability probe capability
///
/// `Ok(false)` is a clean "unreachable" answer; `Err` means the probe
/// itself could not run.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self, timeout: Duration) -> Result<bool>;
}

/// Probe by sending a single ICMP echo with the system `ping`
pub struct PingProbe {
    host: String,
}

impl PingProbe {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

#[async_trait]
impl ReachabilityProbe for PingProbe {
    async fn probe(&self, timeout: Duration) -> Result<bool> {
        let wait_secs = timeout.as_secs().max(1).to_string();
        let status = Command::new("ping")
            .args(["-c", "1", "-W", &wait_secs, &self.host])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .context("Failed to run ping")?;

        Ok(status.success())
    }
}

/// Edge detector over probe results
#[derive(Debug)]
pub struct ConnectivityTracker {
    state: ConnectivityState,
}

impl Default for ConnectivityTracker {
    fn default() -> Self {
        Self {
            state: ConnectivityState::Unknown,
        }
    }
}

impl ConnectivityTracker {
    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    /// Fold one probe result into the state, returning the transition if any.
    ///
    /// A probe error only counts as offline when the device was online;
    /// otherwise it is logged and the state is left alone.
    pub fn observe(&mut self, result: &Result<bool>) -> Option<ConnectivityTransition> {
        let next = match result {
            Ok(true) => ConnectivityState::Online,
            Ok(false) => ConnectivityState::Offline,
            Err(e) if self.state == ConnectivityState::Online => {
                tracing::warn!("Connectivity probe failed while online: {:#}", e);
                ConnectivityState::Offline
            }
            Err(e) => {
                tracing::warn!("Connectivity probe failed: {:#}", e);
                return None;
            }
        };

        let transition = match (self.state, next) {
            (ConnectivityState::Unknown, ConnectivityState::Online) => {
                Some(ConnectivityTransition::InitiallyOnline)
            }
            (ConnectivityState::Unknown, ConnectivityState::Offline) => {
                Some(ConnectivityTransition::InitiallyOffline)
            }
            (ConnectivityState::Online, ConnectivityState::Offline) => {
                Some(ConnectivityTransition::WentOffline)
            }
            (ConnectivityState::Offline, ConnectivityState::Online) => {
                Some(ConnectivityTransition::BackOnline)
            }
            _ => None,
        };

        self.state = next;
        transition
    }
}

/// Background monitor: probe, detect transitions, notify
///
/// Holds only a printer handle and the indicator; it never touches the
/// pipeline or its busy flag.
pub struct ConnectivityMonitor {
    probe: Box<dyn ReachabilityProbe>,
    printer: PrinterHandle,
    indicator: Arc<dyn StatusIndicator>,
    tracker: ConnectivityTracker,
    probe_timeout: Duration,
    setup_hint: String,
}

impl ConnectivityMonitor {
    pub fn new(
        probe: Box<dyn ReachabilityProbe>,
        printer: PrinterHandle,
        indicator: Arc<dyn StatusIndicator>,
        probe_timeout: Duration,
        setup_hint: String,
    ) -> Self {
        Self {
            probe,
            printer,
            indicator,
            tracker: ConnectivityTracker::default(),
            probe_timeout,
            setup_hint,
        }
    }

    /// Run forever, probing every `interval`
    pub fn spawn(mut self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }

    /// Probe once and act on any transition
    pub async fn tick(&mut self) -> Option<ConnectivityTransition> {
        // Bound the probe even if the underlying tool ignores its own timeout
        let deadline = self.probe_timeout.saturating_mul(2);
        let result = tokio::time::timeout(deadline, self.probe.probe(self.probe_timeout))
            .await
            .unwrap_or(Ok(false));

        let transition = self.tracker.observe(&result)?;
        tracing::info!("Connectivity: {:?} (now {:?})", transition, self.tracker.state());

        self.indicator
            .set_offline(self.tracker.state() == ConnectivityState::Offline);

        let notice = receipt::connectivity_notice(transition, Local::now(), &self.setup_hint);
        self.printer.print_or_log(notice).await;

        Some(transition)
    }
}
