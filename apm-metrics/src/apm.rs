//! The metrics cache component.
//!
//! [`MetricsApm`] ties the pieces together: it owns the current
//! [`SeriesStore`], the [`Poller`] filling it and the configuration both were
//! built from. Each applied configuration gets a fresh store; queries always
//! read whichever store is current.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use common::{Clock, SystemClock};
use tokio::sync::Mutex;

use crate::config::{ApmConfig, DEFAULT_RETENTION_MINS};
use crate::error::Result;
use crate::expr::Program;
use crate::fetcher::{HttpFetcher, RetryPolicy, SourceFetcher};
use crate::model::{MetricsEnv, PLUGIN_INFO, PluginInfo, Series, TimeRange};
use crate::poller::Poller;
use crate::query;
use crate::server::Metrics;
use crate::store::SeriesStore;

/// Builds the fetcher for an applied configuration.
pub type FetcherFactory =
    Arc<dyn Fn(&ApmConfig) -> Result<Arc<dyn SourceFetcher>> + Send + Sync>;

pub struct MetricsApm {
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    fetcher_factory: FetcherFactory,
    store: RwLock<Arc<SeriesStore>>,
    config: RwLock<Option<ApmConfig>>,
    poller: Mutex<Option<Poller>>,
}

impl Default for MetricsApm {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(Metrics::new()))
    }
}

impl MetricsApm {
    /// Creates an unconfigured component. Queries return empty results until
    /// [`configure`](Self::configure) succeeds.
    pub fn new(clock: Arc<dyn Clock>, metrics: Arc<Metrics>) -> Self {
        let fetcher_factory: FetcherFactory =
            Arc::new(|config: &ApmConfig| -> Result<Arc<dyn SourceFetcher>> {
                let fetcher = HttpFetcher::new(config, RetryPolicy::default())?;
                Ok(Arc::new(fetcher))
            });
        Self {
            clock,
            metrics,
            fetcher_factory,
            store: RwLock::new(Arc::new(SeriesStore::new(Duration::from_secs(
                60 * DEFAULT_RETENTION_MINS,
            )))),
            config: RwLock::new(None),
            poller: Mutex::new(None),
        }
    }

    /// Replaces how fetchers are built for each applied configuration.
    pub fn with_fetcher_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&ApmConfig) -> Result<Arc<dyn SourceFetcher>> + Send + Sync + 'static,
    {
        self.fetcher_factory = Arc::new(factory);
        self
    }

    pub fn plugin_info(&self) -> PluginInfo {
        PLUGIN_INFO
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Applies a configuration.
    ///
    /// The configuration is validated and the fetcher built before anything
    /// running is touched. Then the previous poller is stopped and awaited, a
    /// new empty store is installed and a poller is started against it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) for an invalid
    /// configuration; the previous activation keeps running in that case.
    pub async fn configure(&self, settings: &HashMap<String, String>) -> Result<()> {
        let config = ApmConfig::from_map(settings)?;
        let fetcher = (self.fetcher_factory)(&config)?;

        let mut poller = self.poller.lock().await;
        if let Some(previous) = poller.take() {
            previous.stop().await;
        }

        let store = Arc::new(SeriesStore::new(config.retention));
        *self.store.write().unwrap_or_else(|e| e.into_inner()) = store.clone();
        self.metrics.series_cached.set(0);

        *poller = Some(Poller::start(
            fetcher,
            store,
            self.clock.clone(),
            self.metrics.clone(),
            config.refresh,
        ));
        tracing::info!(
            url = %config.url,
            refresh = ?config.refresh,
            retention = ?config.retention,
            "Applied configuration"
        );
        self.metrics.reconfigurations_total.inc();
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = Some(config);
        Ok(())
    }

    /// Stops polling. Cached series stay queryable.
    pub async fn stop(&self) {
        if let Some(poller) = self.poller.lock().await.take() {
            poller.stop().await;
        }
    }

    /// Whether a poller is currently running.
    pub async fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .await
            .as_ref()
            .is_some_and(Poller::is_running)
    }

    /// The currently applied configuration, if any.
    pub fn config(&self) -> Option<ApmConfig> {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The store of the current activation.
    pub fn store(&self) -> Arc<SeriesStore> {
        self.store.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Resolves optional bounds: `to` defaults to now and `from` to one
    /// retention window before now.
    pub fn time_range(&self, from: Option<SystemTime>, to: Option<SystemTime>) -> TimeRange {
        let now = self.clock.now();
        let from = from.unwrap_or_else(|| {
            now.checked_sub(self.store().retention())
                .unwrap_or(UNIX_EPOCH)
        });
        TimeRange::new(from, to.unwrap_or(now))
    }

    pub fn query(&self, key: &str, range: &TimeRange) -> Result<Series> {
        query::query(&self.store(), key, range)
    }

    pub fn query_multiple(&self, key: &str, range: &TimeRange) -> Vec<Series> {
        query::query_multiple(&self.store(), key, range)
    }

    /// Compiles `expression`, loads every series it references within `range`
    /// and runs it.
    ///
    /// Only keys the store has seen are bound, so referencing any other key
    /// fails with [`Error::Run`](crate::Error::Run). A known key with no
    /// samples in `range` is bound to an empty series.
    pub fn evaluate(&self, expression: &str, range: &TimeRange) -> Result<Series> {
        let program = Program::compile(expression)?;
        let store = self.store();
        let mut env = MetricsEnv::new();
        for key in program.metric_keys() {
            let streams = query::query_multiple(&store, key, range);
            if !streams.is_empty() {
                env.insert(key.clone(), query::single(streams)?);
            }
        }
        let result = program.run(&env)?.into_series();
        tracing::debug!(
            expression,
            keys = program.metric_keys().len(),
            ok = result.is_ok(),
            "Evaluated expression"
        );
        result
    }
}
