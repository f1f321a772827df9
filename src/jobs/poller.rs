//! Background Job Poller
//!
//! Periodically re-fetches the job list, commits it through `PollerCore`
//! and raises a notification for each announced status transition. Fetches
//! may overlap on a slow network; each one carries the sequence number it
//! was issued with and a result older than the committed snapshot is
//! dropped.
//!
//! The loop ends on `shutdown()` or when the handle is dropped. Fetches
//! still in flight at that point are discarded unapplied.
//!
//! A fetch that has not answered within `FETCH_TIMEOUT` counts as a failed
//! tick, independent of any timeout the gateway applies itself.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::PollerConfig;
use crate::gateway::RemoteGateway;
use crate::jobs::core::{PollMode, PollerCore};
use crate::models::AnalysisJob;
use crate::notify::{Notification, Notifier};
use crate::types::{AppError, AppResult};

/// Upper bound on overlapping fetches; further ticks are skipped until one lands
const MAX_IN_FLIGHT: usize = 4;

/// A fetch still pending after this long counts as failed and frees its slot
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

type Fetch = BoxFuture<'static, (u64, AppResult<Vec<AnalysisJob>>)>;

#[derive(Debug)]
enum PollerCommand {
    Aggressive,
    Refresh,
    Shutdown,
}

pub struct PollerHandle {
    commands: mpsc::UnboundedSender<PollerCommand>,
    jobs: watch::Receiver<Vec<AnalysisJob>>,
    mode: watch::Receiver<PollMode>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Poll fast for a bounded period, e.g. right after creating an analysis
    pub fn trigger_aggressive(&self) {
        let _ = self.commands.send(PollerCommand::Aggressive);
    }

    /// Fetch once now, regardless of mode
    pub fn refresh(&self) {
        let _ = self.commands.send(PollerCommand::Refresh);
    }

    /// Latest committed job list
    pub fn jobs(&self) -> Vec<AnalysisJob> {
        self.jobs.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<AnalysisJob>> {
        self.jobs.clone()
    }

    pub fn mode(&self) -> PollMode {
        *self.mode.borrow()
    }

    pub async fn shutdown(self) {
        let _ = self.commands.send(PollerCommand::Shutdown);
        if let Err(e) = self.task.await {
            warn!("Job poller task ended abnormally: {}", e);
        }
    }
}

pub struct JobPoller;

impl JobPoller {
    pub fn spawn(
        gateway: Arc<dyn RemoteGateway>,
        config: PollerConfig,
        notifier: Notifier,
    ) -> PollerHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (jobs_tx, jobs_rx) = watch::channel(Vec::new());
        let (mode_tx, mode_rx) = watch::channel(PollMode::Idle);

        let driver = Driver {
            gateway,
            core: PollerCore::new(config),
            notifier,
            jobs_tx,
            mode_tx,
            in_flight: FuturesUnordered::new(),
        };
        let task = tokio::spawn(driver.run(command_rx));

        PollerHandle {
            commands: command_tx,
            jobs: jobs_rx,
            mode: mode_rx,
            task,
        }
    }
}

struct Driver {
    gateway: Arc<dyn RemoteGateway>,
    core: PollerCore,
    notifier: Notifier,
    jobs_tx: watch::Sender<Vec<AnalysisJob>>,
    mode_tx: watch::Sender<PollMode>,
    in_flight: FuturesUnordered<Fetch>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<PollerCommand>) {
        info!("Job poller started");
        let mut last_tick = Instant::now();
        // Baseline snapshot
        self.tick();

        loop {
            let now = Instant::now();
            let mode = self.core.mode(now);
            self.mode_tx.send_if_modified(|current| {
                let changed = *current != mode;
                *current = mode;
                changed
            });

            let next_tick = self.core.interval(now).map(|interval| last_tick + interval);
            let expiry = self.core.aggressive_deadline().filter(|deadline| *deadline > now);

            tokio::select! {
                command = commands.recv() => match command {
                    Some(PollerCommand::Aggressive) => {
                        debug!("Aggressive polling requested");
                        let now = Instant::now();
                        let was_aggressive = self.core.mode(now) == PollMode::AggressivePolling;
                        self.core.trigger_aggressive(now);
                        if !was_aggressive {
                            last_tick = now;
                            self.tick();
                        }
                    }
                    Some(PollerCommand::Refresh) => {
                        last_tick = Instant::now();
                        self.tick();
                    }
                    Some(PollerCommand::Shutdown) | None => break,
                },
                _ = sleep_until(next_tick.unwrap_or(now)), if next_tick.is_some() => {
                    last_tick = Instant::now();
                    self.tick();
                }
                // Wake at the aggressive deadline to fall back to normal/idle on time
                _ = sleep_until(expiry.unwrap_or(now)), if expiry.is_some() => {}
                Some((seq, result)) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    self.apply(seq, result);
                }
            }
        }

        info!("Job poller stopped");
    }

    fn tick(&mut self) {
        if self.in_flight.len() >= MAX_IN_FLIGHT {
            debug!("Skipping job poll; {} fetches still pending", self.in_flight.len());
            return;
        }
        let seq = self.core.issue();
        self.in_flight.push(fetch(self.gateway.clone(), seq));
    }

    fn apply(&mut self, seq: u64, result: AppResult<Vec<AnalysisJob>>) {
        let jobs = match result {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("Job poll #{} failed: {}", seq, e);
                return;
            }
        };

        let Some(transitions) = self.core.commit(seq, jobs) else {
            debug!("Discarding stale job snapshot #{}", seq);
            return;
        };

        for transition in &transitions {
            info!(
                "Job {} moved from {} to {}",
                transition.job.id, transition.from, transition.job.status
            );
            if let Some(notification) = Notification::for_transition(&transition.job) {
                self.notifier.notify(notification);
            }
        }
        self.jobs_tx.send_replace(self.core.jobs().to_vec());
    }
}

fn fetch(gateway: Arc<dyn RemoteGateway>, seq: u64) -> Fetch {
    async move {
        let result = match timeout(FETCH_TIMEOUT, gateway.list_jobs(None)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Internal(format!(
                "job poll timed out after {}s",
                FETCH_TIMEOUT.as_secs()
            ))),
        };
        (seq, result)
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::{job, FakeGateway};
    use crate::models::JobStatus;
    use tokio::time::sleep;
    use tokio_test::assert_err;

    fn fast_config() -> PollerConfig {
        PollerConfig {
            interval_ms: 20,
            aggressive_interval_ms: 5,
            aggressive_duration_ms: 60,
        }
    }

    fn scripted(snapshots: Vec<Vec<AnalysisJob>>) -> Arc<FakeGateway> {
        let gateway = FakeGateway::new();
        gateway.state().job_snapshots = snapshots.into();
        Arc::new(gateway)
    }

    #[tokio::test]
    async fn test_training_to_trained_notifies_once() {
        let gateway = scripted(vec![
            vec![job("1", JobStatus::Training)],
            vec![job("1", JobStatus::Trained)],
            vec![job("1", JobStatus::Trained)],
        ]);
        let (notifier, mut rx) = Notifier::channel(16);
        let handle = JobPoller::spawn(gateway.clone(), fast_config(), notifier);

        let notification = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no notification")
            .unwrap();
        assert_eq!(notification.title, "Training complete");
        assert_eq!(notification.job_id.as_deref(), Some("1"));

        // Keep polling the unchanged snapshot for a while
        handle.trigger_aggressive();
        sleep(Duration::from_millis(100)).await;
        assert!(gateway.call_count("list_jobs") >= 3);
        assert!(rx.try_recv().is_err());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_idle_without_in_progress_jobs() {
        let gateway = scripted(vec![vec![job("1", JobStatus::Configured)]]);
        let (notifier, _rx) = Notifier::channel(16);
        let handle = JobPoller::spawn(gateway.clone(), fast_config(), notifier);

        let mut jobs = handle.subscribe();
        timeout(Duration::from_secs(1), jobs.changed())
            .await
            .unwrap()
            .unwrap();
        sleep(Duration::from_millis(80)).await;

        assert_eq!(handle.mode(), PollMode::Idle);
        assert_eq!(gateway.call_count("list_jobs"), 1);
        assert_eq!(handle.jobs().len(), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_aggressive_mode_expires() {
        let gateway = scripted(vec![vec![job("1", JobStatus::Configured)]]);
        let (notifier, _rx) = Notifier::channel(16);
        let handle = JobPoller::spawn(gateway.clone(), fast_config(), notifier);

        handle.trigger_aggressive();
        sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.mode(), PollMode::AggressivePolling);

        sleep(Duration::from_millis(150)).await;
        assert_eq!(handle.mode(), PollMode::Idle);
        let settled = gateway.call_count("list_jobs");
        sleep(Duration::from_millis(60)).await;
        assert_eq!(gateway.call_count("list_jobs"), settled);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_tick_does_not_stop_polling() {
        let gateway = scripted(vec![vec![job("1", JobStatus::Training)]]);
        gateway.fail("list_jobs");
        let (notifier, _rx) = Notifier::channel(16);
        let config = PollerConfig {
            aggressive_duration_ms: 1_000,
            ..fast_config()
        };
        let handle = JobPoller::spawn(gateway.clone(), config, notifier);
        handle.trigger_aggressive();

        sleep(Duration::from_millis(30)).await;
        assert!(handle.jobs().is_empty());
        gateway.recover("list_jobs");

        let mut jobs = handle.subscribe();
        timeout(Duration::from_secs(1), jobs.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handle.jobs()[0].status, JobStatus::Training);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_fetching() {
        let gateway = scripted(vec![vec![job("1", JobStatus::Analyzing)]]);
        let (notifier, _rx) = Notifier::channel(16);
        let handle = JobPoller::spawn(gateway.clone(), fast_config(), notifier);

        sleep(Duration::from_millis(50)).await;
        handle.shutdown().await;
        let calls = gateway.call_count("list_jobs");
        assert!(calls >= 2);

        sleep(Duration::from_millis(60)).await;
        assert_eq!(gateway.call_count("list_jobs"), calls);
    }

    #[tokio::test]
    async fn test_shutdown_drops_pending_fetch() {
        let gateway = scripted(vec![
            vec![job("1", JobStatus::Training)],
            vec![job("1", JobStatus::Trained)],
        ]);
        let (notifier, mut rx) = Notifier::channel(16);
        let handle = JobPoller::spawn(gateway.clone(), fast_config(), notifier);

        let mut jobs = handle.subscribe();
        timeout(Duration::from_secs(1), jobs.changed())
            .await
            .unwrap()
            .unwrap();
        let release = gateway.hold("list_jobs");
        while gateway.call_count("list_jobs") < 2 {
            sleep(Duration::from_millis(2)).await;
        }

        handle.shutdown().await;
        release.notify_one();
        sleep(Duration::from_millis(20)).await;

        assert_eq!(jobs.borrow()[0].status, JobStatus::Training);
        assert!(rx.try_recv().is_err());
        assert_eq!(gateway.call_count("list_jobs"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_fetch_times_out() {
        let gateway = scripted(vec![vec![job("1", JobStatus::Training)]]);
        let _release = gateway.hold("list_jobs");

        let (seq, result) = fetch(gateway.clone(), 7).await;

        assert_eq!(seq, 7);
        assert!(matches!(assert_err!(result), AppError::Internal(_)));
    }
}
