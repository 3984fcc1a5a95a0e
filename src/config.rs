use std::time::Duration;

use crate::probe::CheckDepth;

/// Whether the poller writes results back to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Log what would be written, never mutate the registry
    DryRun,
    /// Submit status updates and wait expiries
    Update,
}

/// Whether the poller keeps ticking or stops after the first tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Continuous,
    OneShot,
}

/// Scheduler and worker pool settings.
///
/// Built once at startup and handed to every component by value; nothing
/// mutates it afterwards.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Short name of the game whose hosts are polled
    pub game: String,
    /// Time between scheduler ticks
    pub interval: Duration,
    /// Maximum wait for any single probe or registry call
    pub timeout: Duration,
    /// Number of concurrent workers
    pub worker_count: usize,
    pub update_mode: UpdateMode,
    pub run_mode: RunMode,
    /// How far each host probe goes
    pub check_depth: CheckDepth,
    /// How long to wait for in-flight jobs after a shutdown signal
    pub shutdown_grace: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            game: "soku".to_string(),
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(1),
            worker_count: 5,
            update_mode: UpdateMode::DryRun,
            run_mode: RunMode::Continuous,
            check_depth: CheckDepth::SpecRelay,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl PollerConfig {
    /// Capacity of the dispatch queue: one slot per worker plus one.
    pub fn queue_capacity(&self) -> usize {
        self.worker_count + 1
    }

    pub fn updates_enabled(&self) -> bool {
        self.update_mode == UpdateMode::Update
    }

    pub fn is_one_shot(&self) -> bool {
        self.run_mode == RunMode::OneShot
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count.max(1);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_update_mode(mut self, update_mode: UpdateMode) -> Self {
        self.update_mode = update_mode;
        self
    }

    pub fn with_run_mode(mut self, run_mode: RunMode) -> Self {
        self.run_mode = run_mode;
        self
    }
}

/// Connection settings for the HTTP registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Base URI of the registry API, e.g. `http://127.0.0.1:8080/api`
    pub uri: String,
    /// Bearer token sent with every request
    pub token: Option<String>,
    pub timeout: Duration,
}

/// Connection settings for the remote check daemon.
#[derive(Debug, Clone)]
pub struct CheckServiceConfig {
    pub uri: String,
}
