//! Per-target pipeline sequencing: acquire with retries, reconcile, persist.
//!
//! Acquisition for up to `workers` targets runs concurrently, each attempt on a
//! blocking thread with its own browser session. Results are drained one at a
//! time by the loop in [`run`], which is the only code touching the [`Store`],
//! so writes are serialized through a single connection regardless of
//! concurrency. A failed target never aborts its siblings; failed targets are
//! retried in later passes unless their error cannot go away on its own.
//!
//! ```text
//! Pending -> Acquiring -> Acquired -> Reconciling -> Done
//!                 |   |                    |
//!                 |   v                    v
//!                 |  FailedRetryable <-----+
//!                 |   |
//!                 |   +--> Acquiring (next pass) | FailedTerminal (no passes left)
//!                 v
//!          FailedTerminal (non-transient error)
//! ```

use crate::config::RunSettings;
use crate::error::{Result, ScrapeError};
use crate::retry::with_retries;
use crate::store::{Store, now_timestamp};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

/// One kind of acquisition (channels, videos, comments) over its targets.
pub trait Pipeline: Send + Sync + 'static {
    type Target: Clone + Send + Sync + 'static;
    type Record: Send + 'static;

    /// Plural noun for what is acquired, used in logs and progress output.
    const KIND: &'static str;

    fn label(&self, target: &Self::Target) -> String;

    /// One blocking acquisition attempt. Opens and releases its own session.
    fn acquire(&self, target: &Self::Target) -> Result<Vec<Self::Record>>;

    /// Reconcile `records` against storage and commit the delta together with
    /// the parent's timestamp. Returns the number of new rows.
    fn persist(
        &self,
        store: &mut Store,
        target: &Self::Target,
        records: Vec<Self::Record>,
        now: &str,
    ) -> Result<usize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Pending,
    Acquiring,
    Acquired,
    FailedRetryable,
    Reconciling,
    Done,
    FailedTerminal,
}

impl TargetState {
    pub fn can_advance_to(self, next: TargetState) -> bool {
        use TargetState::*;
        matches!(
            (self, next),
            (Pending, Acquiring)
                | (Acquiring, Acquired)
                | (Acquiring, FailedRetryable)
                | (Acquiring, FailedTerminal)
                | (Acquired, Reconciling)
                | (Reconciling, Done)
                | (Reconciling, FailedRetryable)
                | (FailedRetryable, Acquiring)
                | (FailedRetryable, FailedTerminal)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TargetState::Done | TargetState::FailedTerminal)
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetState::Pending => "pending",
            TargetState::Acquiring => "acquiring",
            TargetState::Acquired => "acquired",
            TargetState::FailedRetryable => "failed (retryable)",
            TargetState::Reconciling => "reconciling",
            TargetState::Done => "done",
            TargetState::FailedTerminal => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct TargetOutcome {
    pub label: String,
    pub state: TargetState,
    pub new_records: usize,
    pub last_error: Option<String>,
}

impl TargetOutcome {
    fn new(label: String) -> Self {
        Self {
            label,
            state: TargetState::Pending,
            new_records: 0,
            last_error: None,
        }
    }

    fn advance(&mut self, next: TargetState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        debug!(target_label = %self.label, from = %self.state, to = %next, "Target state change");
        self.state = next;
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Concurrent acquisitions; 1 processes targets strictly in sequence.
    pub workers: usize,
    pub max_attempts: usize,
    pub passes: usize,
    /// Wall-clock limit for one target's acquisition, retries included.
    pub target_timeout: Option<Duration>,
    pub retry_base_delay: Duration,
    pub show_progress: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions::from(&RunSettings::default())
    }
}

impl From<&RunSettings> for RunOptions {
    fn from(settings: &RunSettings) -> Self {
        Self {
            workers: settings.workers.max(1),
            max_attempts: settings.max_retries.max(1),
            passes: settings.passes.max(1),
            target_timeout: (settings.target_timeout_secs > 0).then(|| settings.target_timeout()),
            retry_base_delay: settings.retry_base_delay(),
            show_progress: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub kind: &'static str,
    pub succeeded: usize,
    pub failed: usize,
    pub new_records: usize,
    pub passes: usize,
    pub outcomes: Vec<TargetOutcome>,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Saved {} new {} for {} target(s), {} failed",
            self.new_records, self.kind, self.succeeded, self.failed
        )
    }
}

fn progress_bar(len: usize, kind: &str, pass: usize, visible: bool) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if !visible {
        pb.set_draw_target(ProgressDrawTarget::hidden());
        return pb;
    }
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} (ETA: {eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.set_message(format!("{kind} (pass {pass})"));
    pb
}

/// Acquire one target with retries on a blocking thread, bounded by the timeout.
#[instrument(level = "debug", skip_all, fields(kind = P::KIND))]
async fn acquire_target<P: Pipeline>(
    pipeline: Arc<P>,
    target: P::Target,
    opts: &RunOptions,
) -> Result<Vec<P::Record>> {
    let attempt = || {
        let pipeline = Arc::clone(&pipeline);
        let target = target.clone();
        async move {
            match tokio::task::spawn_blocking(move || pipeline.acquire(&target)).await {
                Ok(res) => res,
                Err(e) => Err(ScrapeError::Session(format!("acquisition task failed: {e}"))),
            }
        }
    };
    let acquisition = with_retries(opts.max_attempts, opts.retry_base_delay, attempt);

    match opts.target_timeout {
        Some(limit) => match timeout(limit, acquisition).await {
            Ok(res) => res,
            // The abandoned attempt keeps running on its thread and releases
            // its session when it returns.
            Err(_) => Err(ScrapeError::Timeout(limit)),
        },
        None => acquisition.await,
    }
}

/// Run `pipeline` over `targets` and report per-target outcomes.
#[instrument(level = "info", skip_all, fields(kind = P::KIND, targets = targets.len()))]
pub async fn run<P: Pipeline>(
    pipeline: Arc<P>,
    store: &mut Store,
    targets: Vec<P::Target>,
    opts: &RunOptions,
) -> RunSummary {
    let t0 = Instant::now();
    let max_passes = opts.passes.max(1);
    let mut outcomes: Vec<TargetOutcome> =
        targets.iter().map(|t| TargetOutcome::new(pipeline.label(t))).collect();
    let mut pending: Vec<usize> = (0..targets.len()).collect();
    let mut passes = 0usize;

    info!(
        kind = P::KIND,
        targets = targets.len(),
        workers = opts.workers,
        "Starting acquisition"
    );

    while !pending.is_empty() && passes < max_passes {
        passes += 1;
        if passes > 1 {
            info!(pass = passes, max = max_passes, remaining = pending.len(), "Retrying failed targets");
        }
        for &i in &pending {
            outcomes[i].advance(TargetState::Acquiring);
        }

        let pb = progress_bar(pending.len(), P::KIND, passes, opts.show_progress);
        let mut completions = stream::iter(pending.iter().copied())
            .map(|i| {
                let pipeline = Arc::clone(&pipeline);
                let target = targets[i].clone();
                async move { (i, acquire_target(pipeline, target, opts).await) }
            })
            .buffer_unordered(opts.workers.max(1));

        let mut failed = Vec::new();
        let mut terminal = 0usize;
        while let Some((i, acquired)) = completions.next().await {
            let outcome = &mut outcomes[i];
            match acquired {
                Ok(records) => {
                    outcome.advance(TargetState::Acquired);
                    let found = records.len();
                    outcome.advance(TargetState::Reconciling);
                    match pipeline.persist(store, &targets[i], records, &now_timestamp()) {
                        Ok(inserted) => {
                            info!(
                                target_label = %outcome.label,
                                found,
                                inserted,
                                "Saved new {}",
                                P::KIND
                            );
                            outcome.new_records += inserted;
                            outcome.last_error = None;
                            outcome.advance(TargetState::Done);
                        }
                        Err(e) => {
                            error!(target_label = %outcome.label, error = %e, "Persisting failed; nothing written");
                            outcome.last_error = Some(e.to_string());
                            outcome.advance(TargetState::FailedRetryable);
                            failed.push(i);
                        }
                    }
                }
                Err(e) if !e.is_transient() => {
                    error!(target_label = %outcome.label, error = %e, "Acquisition failed; not retrying");
                    outcome.last_error = Some(e.to_string());
                    outcome.advance(TargetState::FailedTerminal);
                    terminal += 1;
                }
                Err(e) => {
                    warn!(target_label = %outcome.label, error = %e, "Acquisition failed");
                    outcome.last_error = Some(e.to_string());
                    outcome.advance(TargetState::FailedRetryable);
                    failed.push(i);
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();
        drop(completions);

        info!(
            pass = passes,
            succeeded = pending.len() - failed.len() - terminal,
            failed = failed.len() + terminal,
            "Pass complete"
        );
        pending = failed;
    }

    for &i in &pending {
        outcomes[i].advance(TargetState::FailedTerminal);
    }

    let succeeded = outcomes
        .iter()
        .filter(|o| o.state == TargetState::Done)
        .count();
    let summary = RunSummary {
        kind: P::KIND,
        succeeded,
        failed: outcomes.len() - succeeded,
        new_records: outcomes.iter().map(|o| o.new_records).sum(),
        passes,
        outcomes,
    };
    info!(
        kind = P::KIND,
        succeeded = summary.succeeded,
        failed = summary.failed,
        new_records = summary.new_records,
        passes,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Acquisition complete"
    );
    summary
}
