use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::PollerConfig;
use crate::error::Result;
use crate::registry::{with_deadline, Game, ListedHosts, RegistryClient};
use crate::scheduler::job::{HostCheckJob, Job, WaiterExpiryJob};
use crate::scheduler::queue::{JobSender, PushError};

/// Jobs built from one listing, in enqueue order.
#[derive(Debug, Default)]
pub struct TickPlan {
    pub jobs: Vec<Job>,
    /// Hosts dropped because no job could be built for them
    pub skipped_hosts: usize,
}

/// Summary of one scheduler tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub hosts_listed: usize,
    pub host_jobs: usize,
    pub hosts_skipped: usize,
    pub waiters_listed: usize,
    pub waiter_jobs: usize,
    /// Jobs actually pushed onto the dispatch queue
    pub enqueued: usize,
    /// Shutdown arrived (or the queue closed) before every job was pushed
    pub interrupted: bool,
}

/// Turns registry listings into jobs and feeds them to the dispatch queue.
pub struct Scheduler {
    registry: Arc<dyn RegistryClient>,
    game: Arc<Game>,
    config: PollerConfig,
    sender: JobSender,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        game: Arc<Game>,
        config: PollerConfig,
        sender: JobSender,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            game,
            config,
            sender,
            shutdown,
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Run one tick: list, plan, enqueue.
    ///
    /// The listing is bounded by the configured timeout. A listing failure is
    /// returned to the caller untouched; deciding whether it is fatal is the
    /// caller's business. Waits on the queue when it is full. Shutdown
    /// abandons the tick at either wait.
    pub async fn tick(&self) -> Result<TickReport> {
        tracing::debug!(game = %self.game.url_short_name, "Grabbing current host list");
        let listing = with_deadline(self.config.timeout, self.registry.list_hosts(&self.game));
        let listed = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                tracing::info!("Shutdown requested while listing hosts");
                return Ok(TickReport {
                    interrupted: true,
                    ..Default::default()
                });
            }
            listed = listing => listed?,
        };
        let now = Utc::now();
        let plan = plan_jobs(&listed, &self.config, now);

        let mut report = TickReport {
            hosts_listed: listed.hosts.len(),
            hosts_skipped: plan.skipped_hosts,
            waiters_listed: listed.waits.len(),
            ..Default::default()
        };
        for job in &plan.jobs {
            match job {
                Job::HostCheck(_) => report.host_jobs += 1,
                Job::WaiterExpiry(_) => report.waiter_jobs += 1,
            }
        }
        tracing::debug!(
            hosts = report.hosts_listed,
            waiters = report.waiters_listed,
            expired = report.waiter_jobs,
            "Listed active hosters and waiters"
        );

        for job in plan.jobs {
            match self.sender.push(job, &self.shutdown).await {
                Ok(()) => report.enqueued += 1,
                Err(PushError::Cancelled) => {
                    tracing::info!(
                        enqueued = report.enqueued,
                        "Shutdown requested, abandoning rest of tick"
                    );
                    report.interrupted = true;
                    break;
                }
                Err(PushError::Closed) => {
                    tracing::warn!(
                        enqueued = report.enqueued,
                        "Dispatch queue closed mid-tick"
                    );
                    report.interrupted = true;
                    break;
                }
            }
        }

        Ok(report)
    }

    /// Close the dispatch queue, letting workers drain what is left.
    pub fn close(self) {
        self.sender.close();
    }
}

/// Build the jobs for one listing: every host with a usable address in list
/// order, then every waiter whose wait ended strictly before `now`, in list
/// order.
pub fn plan_jobs(listed: &ListedHosts, config: &PollerConfig, now: DateTime<Utc>) -> TickPlan {
    let mut plan = TickPlan::default();

    for listing in &listed.hosts {
        match HostCheckJob::from_listing(listing, config.check_depth) {
            Ok(job) => {
                tracing::debug!(
                    host_id = listing.host.id,
                    name = %listing.host.display_name,
                    address = %job.address,
                    version_hint = ?job.version_hint,
                    "Planned host check"
                );
                plan.jobs.push(Job::HostCheck(job));
            }
            Err(e) => {
                tracing::warn!(
                    host_id = listing.host.id,
                    name = %listing.host.display_name,
                    error = %e,
                    "Could not build check for host, skipping"
                );
                plan.skipped_hosts += 1;
            }
        }
    }

    plan.jobs.extend(
        listed
            .waits
            .iter()
            .filter(|w| w.waiter.is_expired_at(now))
            .map(|w| Job::WaiterExpiry(WaiterExpiryJob::from(&w.waiter))),
    );

    plan
}
