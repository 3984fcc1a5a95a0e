use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::scheduler::{Job, JobReceiver};
use crate::worker::executor::JobExecutor;

/// What a worker is doing right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerActivity {
    Idle,
    Checking { address: String },
    Expiring { user_id: u64 },
    Stopped,
}

impl WorkerActivity {
    fn for_job(job: &Job) -> Self {
        match job {
            Job::HostCheck(j) => WorkerActivity::Checking {
                address: j.address.clone(),
            },
            Job::WaiterExpiry(j) => WorkerActivity::Expiring { user_id: j.user_id },
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            WorkerActivity::Checking { .. } | WorkerActivity::Expiring { .. }
        )
    }
}

impl fmt::Display for WorkerActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerActivity::Idle => write!(f, "idle, waiting on queue"),
            WorkerActivity::Checking { address } => write!(f, "checking host {}", address),
            WorkerActivity::Expiring { user_id } => write!(f, "expiring wait of user {}", user_id),
            WorkerActivity::Stopped => write!(f, "stopped"),
        }
    }
}

/// Read-only handle onto one worker, used by diagnostics and tests.
#[derive(Debug, Clone)]
pub struct WorkerMonitor {
    pub id: usize,
    activity: watch::Receiver<WorkerActivity>,
    processed: Arc<AtomicU64>,
}

impl WorkerMonitor {
    pub fn activity(&self) -> WorkerActivity {
        self.activity.borrow().clone()
    }

    /// Jobs this worker has finished, whatever their outcome.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
}

/// Fixed set of workers draining the dispatch queue.
pub struct WorkerPool {
    tasks: JoinSet<()>,
    monitors: Vec<WorkerMonitor>,
}

impl WorkerPool {
    /// Spawn `worker_count` workers. They run until the queue is closed and
    /// drained, or until `shutdown` fires, whichever comes first. A job that
    /// has already been dequeued always runs to completion.
    pub fn spawn(
        worker_count: usize,
        executor: JobExecutor,
        receiver: JobReceiver,
        shutdown: CancellationToken,
    ) -> Self {
        let mut tasks = JoinSet::new();
        let mut monitors = Vec::with_capacity(worker_count);

        for id in 0..worker_count {
            let (activity_tx, activity_rx) = watch::channel(WorkerActivity::Idle);
            let processed = Arc::new(AtomicU64::new(0));
            monitors.push(WorkerMonitor {
                id,
                activity: activity_rx,
                processed: processed.clone(),
            });

            tasks.spawn(worker_loop(
                id,
                executor.clone(),
                receiver.clone(),
                shutdown.clone(),
                activity_tx,
                processed,
            ));
        }

        tracing::info!(workers = worker_count, "Worker pool started");
        Self { tasks, monitors }
    }

    pub fn monitors(&self) -> Vec<WorkerMonitor> {
        self.monitors.clone()
    }

    /// Wait for every worker to exit. Safe to call again after being
    /// cancelled.
    pub async fn join(&mut self) {
        while let Some(res) = self.tasks.join_next().await {
            if let Err(e) = res {
                if e.is_panic() {
                    tracing::error!(error = %e, "Worker panicked");
                }
            }
        }
    }

    /// Wait up to `grace` for workers to exit, then abort the stragglers.
    pub async fn join_within(&mut self, grace: Duration) {
        if tokio::time::timeout(grace, self.join()).await.is_err() {
            let busy = self
                .monitors
                .iter()
                .filter(|m| m.activity().is_busy())
                .count();
            tracing::warn!(
                busy,
                grace = ?grace,
                "Workers still busy after grace period, aborting them"
            );
            self.tasks.abort_all();
            self.join().await;
        }
    }
}

async fn worker_loop(
    id: usize,
    executor: JobExecutor,
    receiver: JobReceiver,
    shutdown: CancellationToken,
    activity: watch::Sender<WorkerActivity>,
    processed: Arc<AtomicU64>,
) {
    tracing::debug!(worker_id = id, "Worker started");

    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = receiver.pop() => match job {
                Some(job) => job,
                None => break,
            },
        };

        activity.send_replace(WorkerActivity::for_job(&job));
        let outcome = executor.execute(id, job).await;
        processed.fetch_add(1, Ordering::Relaxed);
        activity.send_replace(WorkerActivity::Idle);

        if outcome.is_failure() {
            tracing::debug!(worker_id = id, ?outcome, "Job dropped after failure");
        }
    }

    activity.send_replace(WorkerActivity::Stopped);
    tracing::debug!(worker_id = id, "Worker stopped");
}
