// Poll scheduling and snapshot bookkeeping, free of any runtime concerns
// The driver in poller.rs feeds it clock readings and fetch results

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::PollerConfig;
use crate::models::{AnalysisJob, JobStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    /// No timer; nothing is in progress
    Idle,
    NormalPolling,
    /// Fast polling until the aggressive deadline passes
    AggressivePolling,
}

/// A job whose status differs from the previously committed snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransition {
    pub job: AnalysisJob,
    pub from: JobStatus,
}

pub struct PollerCore {
    config: PollerConfig,
    previous: Option<Vec<AnalysisJob>>,
    aggressive_until: Option<Instant>,
    issued: u64,
    committed: u64,
}

impl PollerCore {
    pub fn new(config: PollerConfig) -> Self {
        Self {
            config,
            previous: None,
            aggressive_until: None,
            issued: 0,
            committed: 0,
        }
    }

    /// Last committed snapshot
    pub fn jobs(&self) -> &[AnalysisJob] {
        self.previous.as_deref().unwrap_or_default()
    }

    pub fn has_in_progress(&self) -> bool {
        self.jobs().iter().any(|j| j.status.is_in_progress())
    }

    /// Enter (or extend) aggressive mode. A repeat trigger moves the single
    /// deadline rather than adding another one.
    pub fn trigger_aggressive(&mut self, now: Instant) {
        self.aggressive_until = Some(now + self.config.aggressive_duration());
    }

    pub fn aggressive_deadline(&self) -> Option<Instant> {
        self.aggressive_until
    }

    pub fn mode(&self, now: Instant) -> PollMode {
        if self.aggressive_until.is_some_and(|until| now < until) {
            PollMode::AggressivePolling
        } else if self.has_in_progress() {
            PollMode::NormalPolling
        } else {
            PollMode::Idle
        }
    }

    pub fn interval(&self, now: Instant) -> Option<Duration> {
        match self.mode(now) {
            PollMode::AggressivePolling => Some(self.config.aggressive_interval()),
            PollMode::NormalPolling => Some(self.config.interval()),
            PollMode::Idle => None,
        }
    }

    /// Sequence number for a fetch about to be issued
    pub fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Commit the result of fetch `seq`. Returns `None` when a fetch issued
    /// later has already committed, in which case nothing changes.
    pub fn commit(&mut self, seq: u64, jobs: Vec<AnalysisJob>) -> Option<Vec<StatusTransition>> {
        if seq <= self.committed {
            return None;
        }
        self.committed = seq;
        let transitions = match &self.previous {
            Some(previous) => diff(previous, &jobs),
            None => Vec::new(),
        };
        self.previous = Some(jobs);
        Some(transitions)
    }
}

/// Jobs present in both snapshots whose status changed. New jobs are not transitions.
pub fn diff(previous: &[AnalysisJob], current: &[AnalysisJob]) -> Vec<StatusTransition> {
    let before: HashMap<&str, JobStatus> = previous
        .iter()
        .map(|j| (j.id.as_str(), j.status))
        .collect();

    current
        .iter()
        .filter_map(|job| {
            let from = *before.get(job.id.as_str())?;
            (from != job.status).then(|| StatusTransition {
                job: job.clone(),
                from,
            })
        })
        .collect()
}
