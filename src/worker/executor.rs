use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::{PollerConfig, UpdateMode};
use crate::probe::{CheckResult, Prober, Spectate};
use crate::registry::{with_deadline, Game, HostStatus, RegistryClient, StatusUpdate};
use crate::scheduler::{HostCheckJob, Job, WaiterExpiryJob};

/// What happened to a job. Failures are reported here and logged, never
/// propagated.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Registry accepted the new host status
    StatusUpdated {
        address: String,
        confirmed: HostStatus,
    },
    /// Dry-run: the update that would have been sent
    StatusLogged {
        address: String,
        update: StatusUpdate,
    },
    WaitExpired { user_id: u64 },
    /// Dry-run: the wait that would have been cleared
    WaitExpiryLogged { user_id: u64 },
    Failed { error: String },
}

impl JobOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, JobOutcome::Failed { .. })
    }
}

/// Executes jobs against the probe and registry collaborators.
///
/// Cheap to clone; every worker holds its own copy sharing the same client
/// handles. Each job is attempted once; there is no retry here.
#[derive(Clone)]
pub struct JobExecutor {
    registry: Arc<dyn RegistryClient>,
    prober: Arc<dyn Prober>,
    game: Arc<Game>,
    update_mode: UpdateMode,
    timeout: Duration,
}

impl JobExecutor {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        prober: Arc<dyn Prober>,
        game: Arc<Game>,
        config: &PollerConfig,
    ) -> Self {
        Self {
            registry,
            prober,
            game,
            update_mode: config.update_mode,
            timeout: config.timeout,
        }
    }

    /// Process one job to completion.
    pub async fn execute(&self, worker_id: usize, job: Job) -> JobOutcome {
        match job {
            Job::HostCheck(job) => self.check_host(worker_id, job).await,
            Job::WaiterExpiry(job) => self.expire_waiter(worker_id, job).await,
        }
    }

    async fn expire_waiter(&self, worker_id: usize, job: WaiterExpiryJob) -> JobOutcome {
        if self.update_mode == UpdateMode::DryRun {
            tracing::info!(
                worker_id,
                user_id = job.user_id,
                name = %job.display_name,
                expired_at = %job.expires_at,
                "[NOT UPDATING] terminating wait"
            );
            return JobOutcome::WaitExpiryLogged {
                user_id: job.user_id,
            };
        }

        tracing::debug!(
            worker_id,
            user_id = job.user_id,
            name = %job.display_name,
            "Terminating wait"
        );
        let call = self
            .registry
            .expire_wait(&self.game, job.user_id, Duration::ZERO, "");
        match with_deadline(self.timeout, call).await {
            Ok(()) => JobOutcome::WaitExpired {
                user_id: job.user_id,
            },
            Err(e) => {
                tracing::warn!(
                    worker_id,
                    user_id = job.user_id,
                    name = %job.display_name,
                    error = %e,
                    "Terminating wait failed"
                );
                JobOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn check_host(&self, worker_id: usize, job: HostCheckJob) -> JobOutcome {
        let request = job.probe_request(self.timeout);
        tracing::debug!(
            worker_id,
            address = %job.address,
            depth = %job.depth,
            version_aware = request.is_version_aware(),
            "Probing host"
        );

        let result = match tokio::time::timeout(self.timeout, self.prober.probe(&request)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::warn!(
                    worker_id,
                    address = %job.address,
                    error = %e,
                    "Checking on host failed"
                );
                return JobOutcome::Failed {
                    error: e.to_string(),
                };
            }
            Err(_) => CheckResult::timed_out(&job.address, self.timeout),
        };

        let update = status_update(&job, &result, Utc::now());
        tracing::debug!(
            worker_id,
            address = %job.address,
            status = %update.status,
            was = %job.previous.status,
            error = ?result.error,
            "Check finished"
        );

        if self.update_mode == UpdateMode::DryRun {
            tracing::info!(
                worker_id,
                address = %job.address,
                status = %update.status,
                was = %job.previous.status,
                opponent = update.opponent_addr.as_deref().unwrap_or(""),
                spec = %spectate_label(update.can_spec),
                version = update.new_version.as_deref().unwrap_or("unknown"),
                prof1 = update.prof1_name.as_deref().unwrap_or("(none)"),
                prof2 = update.prof2_name.as_deref().unwrap_or("(none)"),
                "[NOT UPDATING] host check result"
            );
            return JobOutcome::StatusLogged {
                address: job.address,
                update,
            };
        }

        let call = self.registry.update_host_status(&self.game, &update);
        match with_deadline(self.timeout, call).await {
            Ok(confirmed) => {
                tracing::debug!(
                    worker_id,
                    address = %job.address,
                    check_id = confirmed.id,
                    status = %confirmed.status,
                    was = %job.previous.status,
                    spec = ?confirmed.can_spec,
                    version = ?confirmed.version,
                    "Host status updated"
                );
                JobOutcome::StatusUpdated {
                    address: job.address,
                    confirmed,
                }
            }
            Err(e) => {
                tracing::warn!(
                    worker_id,
                    address = %job.address,
                    error = %e,
                    "Update host status failed"
                );
                JobOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

/// Build the registry update for a finished probe.
///
/// Spectator capability is only reported for probes that reached the host;
/// empty version, profile and opponent values are left out.
pub fn status_update(
    job: &HostCheckJob,
    result: &CheckResult,
    checked_at: DateTime<Utc>,
) -> StatusUpdate {
    let mut profiles = result
        .profiles
        .iter()
        .take(2)
        .map(|name| non_empty(Some(name)));

    StatusUpdate {
        check_date: checked_at,
        status: result.status.clone(),
        hoster_id: job.previous.hoster_id,
        last_check_id: job.previous.last_check_id,
        new_version: non_empty(result.version.as_ref()),
        can_spec: if result.is_good() {
            result.spectate.as_bool()
        } else {
            None
        },
        prof1_name: profiles.next().flatten(),
        prof2_name: profiles.next().flatten(),
        opponent_addr: non_empty(result.opponent.as_ref()),
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

fn spectate_label(can_spec: Option<bool>) -> Spectate {
    match can_spec {
        Some(true) => Spectate::Yes,
        Some(false) => Spectate::No,
        None => Spectate::Unknown,
    }
}
