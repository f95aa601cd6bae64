use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::error::Result;
use crate::fetcher::SourceFetcher;
use crate::model::{MetricEntry, MetricKind, Sample, Series, Snapshot, TimeRange};

/// Instant `secs` seconds after the unix epoch.
pub(crate) fn at(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

pub(crate) fn range(from: u64, to: u64) -> TimeRange {
    TimeRange::new(at(from), at(to))
}

pub(crate) fn series(points: &[(u64, f64)]) -> Series {
    points.iter().map(|(t, v)| Sample::new(at(*t), *v)).collect()
}

pub(crate) fn snapshot(entries: &[(&str, MetricKind, &[(&str, &str)], f64)]) -> Snapshot {
    let mut snapshot = Snapshot::new();
    for (family, kind, labels, value) in entries {
        snapshot
            .entry(family.to_string())
            .or_default()
            .push(MetricEntry {
                labels: labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                kind: *kind,
                value: *value,
            });
    }
    snapshot
}

/// Lets spawned tasks run until they block again.
pub(crate) async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

enum Script {
    Queue(Mutex<VecDeque<Result<Snapshot>>>),
    Repeat(Snapshot),
    Hang,
}

/// A fetcher replaying canned results and counting calls.
pub(crate) struct ScriptedFetcher {
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    /// Replays `results` in order, then returns empty snapshots.
    pub(crate) fn new(results: Vec<Result<Snapshot>>) -> Self {
        Self::with_script(Script::Queue(Mutex::new(results.into())))
    }

    pub(crate) fn repeating(snapshot: Snapshot) -> Self {
        Self::with_script(Script::Repeat(snapshot))
    }

    /// Every fetch pends forever.
    pub(crate) fn hanging() -> Self {
        Self::with_script(Script::Hang)
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFetcher for ScriptedFetcher {
    async fn fetch(&self) -> Result<Snapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Queue(results) => {
                let next = results.lock().unwrap().pop_front();
                next.unwrap_or_else(|| Ok(Snapshot::new()))
            }
            Script::Repeat(snapshot) => Ok(snapshot.clone()),
            Script::Hang => std::future::pending().await,
        }
    }
}
