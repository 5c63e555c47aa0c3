//! Background privacy-region detection.
//!
//! [`PrivacyDetectionScheduler`] walks the images that need detection one at
//! a time, spacing requests so a batch never floods the backend, and stops the
//! moment the quota runs out. At most one run is active at any time.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;

use crate::ai::VisionClient;
use crate::config::SchedulerConfig;
use crate::error::AiError;
use crate::model::ImageId;
use crate::resilience::{QuotaCircuitBreaker, ResilientInvoker};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every candidate was attempted.
    Completed,
    /// Another run was active; nothing was done.
    AlreadyRunning,
    /// The breaker was open before a candidate could start.
    CircuitOpen,
    /// The quota ran out mid-run; the breaker has been tripped.
    QuotaExceeded,
}

/// Result of one scheduler run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Images whose detection result was stored, in processing order.
    pub processed: Vec<ImageId>,
    /// Of those, how many came back with no regions.
    pub clean: usize,
    /// Of those, how many have regions to redact.
    pub redacted: usize,
    /// Images whose detection failed; they stay eligible for a later run.
    pub failed: Vec<ImageId>,
    /// Seconds left on the breaker when the run stopped because of it.
    pub cooldown_secs: u64,
}

impl RunReport {
    fn new(outcome: RunOutcome) -> Self {
        Self {
            outcome,
            processed: Vec::new(),
            clean: 0,
            redacted: 0,
            failed: Vec::new(),
            cooldown_secs: 0,
        }
    }

    pub fn status_message(&self) -> String {
        let summary = format!(
            "{} scanned ({} with regions, {} clean), {} failed",
            self.processed.len(),
            self.redacted,
            self.clean,
            self.failed.len()
        );
        match self.outcome {
            RunOutcome::AlreadyRunning => "Privacy scan already in progress".into(),
            RunOutcome::Completed if self.processed.is_empty() && self.failed.is_empty() => {
                "No images need privacy detection".into()
            }
            RunOutcome::Completed => format!("Privacy scan finished: {summary}"),
            RunOutcome::CircuitOpen => format!(
                "Privacy scan paused, AI is cooling down ({}s left): {summary}",
                self.cooldown_secs
            ),
            RunOutcome::QuotaExceeded => format!(
                "AI quota exceeded, privacy scan stopped for {}s: {summary}",
                self.cooldown_secs
            ),
        }
    }
}

/// Resets the scheduler to [`SchedulerState::Idle`] however a run ends.
struct RunGuard<'a> {
    state: &'a Mutex<SchedulerState>,
}

impl<'a> RunGuard<'a> {
    fn acquire(state: &'a Mutex<SchedulerState>) -> Option<Self> {
        let mut current = state.lock();
        if *current == SchedulerState::Running {
            return None;
        }
        *current = SchedulerState::Running;
        Some(Self { state })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock() = SchedulerState::Idle;
    }
}

/// Serialized, rate-limited privacy detection over a [`Workspace`].
///
/// Candidates are selected images with privacy blur on and no detection
/// result yet. The viewed image goes first. After each stored result the
/// scheduler waits `spacing_ms` before the next request.
///
/// # Example
///
/// ```rust,no_run
/// use retouch_ai::config::Config;
/// use retouch_ai::pipeline::build_vision_client;
/// use retouch_ai::resilience::{QuotaCircuitBreaker, ResilientInvoker};
/// use retouch_ai::scheduler::PrivacyDetectionScheduler;
/// use retouch_ai::workspace::Workspace;
/// use std::sync::Arc;
///
/// # async fn example() {
/// let config = Config::default();
/// let client = build_vision_client(&config).expect("no AI backend configured");
/// let workspace = Workspace::new();
/// let scheduler = PrivacyDetectionScheduler::new(
///     workspace.clone(),
///     client,
///     ResilientInvoker::from_config(&config.resilience),
///     Arc::new(QuotaCircuitBreaker::new(config.resilience.cooldown())),
///     config.scheduler.clone(),
/// );
/// let report = scheduler.trigger().await;
/// println!("{}", report.status_message());
/// # }
/// ```
pub struct PrivacyDetectionScheduler {
    workspace: Workspace,
    client: Arc<dyn VisionClient>,
    invoker: ResilientInvoker,
    breaker: Arc<QuotaCircuitBreaker>,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
}

impl PrivacyDetectionScheduler {
    pub fn new(
        workspace: Workspace,
        client: Arc<dyn VisionClient>,
        invoker: ResilientInvoker,
        breaker: Arc<QuotaCircuitBreaker>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            workspace,
            client,
            invoker,
            breaker,
            config,
            state: Mutex::new(SchedulerState::Idle),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    /// Run detection now. A call while a run is active returns
    /// [`RunOutcome::AlreadyRunning`] without doing anything.
    pub async fn trigger(&self) -> RunReport {
        let Some(_guard) = RunGuard::acquire(&self.state) else {
            log::debug!("Privacy scan requested while one is running");
            return RunReport::new(RunOutcome::AlreadyRunning);
        };
        self.run().await
    }

    /// Trigger a run after each burst of workspace changes.
    ///
    /// Waits for a change, then for `debounce_ms` of quiet (restarting the
    /// wait on every further change). Returns when the workspace is dropped.
    pub async fn watch_changes(&self, mut changes: watch::Receiver<u64>) {
        let debounce = self.config.debounce();
        loop {
            if changes.changed().await.is_err() {
                return;
            }
            loop {
                tokio::select! {
                    changed = changes.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    _ = tokio::time::sleep(debounce) => break,
                }
            }

            if self.workspace.detection_candidates().is_empty() {
                continue;
            }
            let report = self.trigger().await;
            log::info!("{}", report.status_message());
        }
    }

    async fn run(&self) -> RunReport {
        let mut report = RunReport::new(RunOutcome::Completed);
        let mut attempted = HashSet::new();

        loop {
            // recomputed every step so images that qualify mid-run are included
            let Some(id) = self
                .workspace
                .detection_candidates()
                .into_iter()
                .find(|id| !attempted.contains(id))
            else {
                break;
            };
            attempted.insert(id);

            if self.breaker.is_open() {
                report.outcome = RunOutcome::CircuitOpen;
                report.cooldown_secs = self.breaker.remaining_secs();
                log::info!("{}", self.breaker.wait_message());
                break;
            }

            let Some(entry) = self.workspace.get(id) else {
                continue;
            };
            let bytes = match entry.source.load().await {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("Cannot read {} for privacy detection: {e}", entry.name);
                    report.failed.push(id);
                    continue;
                }
            };

            log::info!("Detecting privacy regions in {} ({id})", entry.name);
            let mime = entry.mime_type();
            let result = self
                .invoker
                .invoke(|| self.client.detect_privacy_regions(&bytes, mime))
                .await;

            match result {
                Ok(regions) => {
                    let found = regions.len();
                    if !self.workspace.set_regions(id, regions) {
                        log::debug!("{} was removed during detection", entry.name);
                        continue;
                    }
                    log::info!("{}: {found} region(s)", entry.name);
                    if found == 0 {
                        report.clean += 1;
                    } else {
                        report.redacted += 1;
                    }
                    report.processed.push(id);
                    tokio::time::sleep(self.config.spacing()).await;
                }
                Err(err @ AiError::QuotaExceeded { .. }) => {
                    log::warn!("Privacy scan stopped at {}: {err}", entry.name);
                    self.breaker.trip_default();
                    report.outcome = RunOutcome::QuotaExceeded;
                    report.cooldown_secs = self.breaker.remaining_secs();
                    break;
                }
                Err(err) => {
                    log::warn!("Privacy detection failed for {}: {err}", entry.name);
                    report.failed.push(id);
                }
            }
        }

        report
    }
}
