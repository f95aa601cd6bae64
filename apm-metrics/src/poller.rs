//! Background refresh loop feeding the series store.
//!
//! One [`Poller`] owns one spawned task. The task waits one refresh interval,
//! fetches a snapshot, stamps every sample of it with a single capture instant
//! and records counters and gauges into the store it was started with.
//!
//! # Cancellation
//!
//! [`Poller::stop`] cancels the task and awaits its join handle. The
//! cancellation token is checked before and raced against every fetch, and
//! recording is synchronous, so once `stop` returns the task can no longer
//! write. Each task also holds its own `Arc<SeriesStore>`: a superseded loop
//! can only ever reach the store it was created for.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use common::Clock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use crate::config::MAX_INTERVAL;
use crate::error::{Error, Result};
use crate::fetcher::SourceFetcher;
use crate::server::metrics::{Metrics, PollOutcome};
use crate::model::Snapshot;
use crate::store::SeriesStore;

const MIN_REFRESH: Duration = Duration::from_millis(1);

/// Counts of one applied snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordStats {
    pub recorded: usize,
    pub skipped: usize,
}

/// Records every counter and gauge of `snapshot` into `store` at `now`.
pub fn record_snapshot(store: &SeriesStore, snapshot: &Snapshot, now: SystemTime) -> RecordStats {
    let mut recordable = Vec::new();
    let mut skipped = 0;
    for (family, entries) in snapshot {
        for entry in entries {
            if entry.kind.is_recorded() {
                recordable.push((entry.key(family), entry.value));
            } else {
                skipped += 1;
            }
        }
    }
    let recorded = store.record_batch(now, recordable);
    RecordStats { recorded, skipped }
}

/// Handle to a running refresh loop.
pub struct Poller {
    stop_tok: CancellationToken,
    task_jh: Option<JoinHandle<()>>,
}

impl Poller {
    /// Spawns the refresh loop. The first fetch happens one `refresh` after
    /// start.
    ///
    /// `refresh` is clamped to between one millisecond and one day.
    pub fn start(
        fetcher: Arc<dyn SourceFetcher>,
        store: Arc<SeriesStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
        refresh: Duration,
    ) -> Self {
        let refresh = refresh.clamp(MIN_REFRESH, MAX_INTERVAL);
        let stop_tok = CancellationToken::new();
        let task = PollTask {
            fetcher,
            store,
            clock,
            metrics,
            refresh,
            stop_tok: stop_tok.clone(),
        };
        let task_jh = tokio::spawn(task.run());
        tracing::info!("Started poller with refresh interval {:?}", refresh);
        Self {
            stop_tok,
            task_jh: Some(task_jh),
        }
    }

    /// Whether the loop task is still alive.
    pub fn is_running(&self) -> bool {
        self.task_jh
            .as_ref()
            .is_some_and(|jh| !jh.is_finished())
    }

    /// Cancels the loop and waits until it has exited.
    pub async fn stop(mut self) {
        let Some(task_jh) = self.task_jh.take() else {
            return;
        };
        self.stop_tok.cancel();
        if let Err(e) = task_jh.await {
            tracing::error!("poller task failed: {}", e);
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop_tok.cancel();
    }
}

struct PollTask {
    fetcher: Arc<dyn SourceFetcher>,
    store: Arc<SeriesStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    refresh: Duration,
    stop_tok: CancellationToken,
}

impl PollTask {
    async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.refresh, self.refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.stop_tok.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                biased;
                _ = self.stop_tok.cancelled() => break,
                result = self.fetcher.fetch() => result,
            };
            self.apply(result);
        }

        tracing::info!("Poller stopped");
    }

    fn apply(&self, result: Result<Snapshot>) {
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let outcome = match e {
                    Error::Decode(_) => PollOutcome::DecodeError,
                    _ => PollOutcome::FetchError,
                };
                tracing::warn!("Skipping poll, could not fetch metrics: {}", e);
                self.metrics.record_poll(outcome);
                return;
            }
        };

        let now = self.clock.now();
        let stats = record_snapshot(&self.store, &snapshot, now);
        self.metrics.record_poll(PollOutcome::Success);
        self.metrics
            .samples_recorded_total
            .inc_by(stats.recorded as u64);
        self.metrics
            .samples_skipped_total
            .inc_by(stats.skipped as u64);
        self.metrics.series_cached.set(self.store.len() as i64);
        tracing::debug!(
            families = snapshot.len(),
            recorded = stats.recorded,
            skipped = stats.skipped,
            "Applied snapshot"
        );
    }
}
