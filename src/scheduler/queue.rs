use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::scheduler::job::Job;

/// Why a push did not enqueue its job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// Every receiver is gone
    Closed,
    /// Shutdown was requested while waiting for a free slot
    Cancelled,
}

/// Occupancy counters shared by both ends of the queue.
#[derive(Debug)]
struct Gauge {
    depth: AtomicUsize,
    capacity: usize,
}

/// Read-only view of queue occupancy for diagnostics.
#[derive(Debug, Clone)]
pub struct QueueGauge {
    inner: Arc<Gauge>,
}

impl QueueGauge {
    pub fn depth(&self) -> usize {
        self.inner.depth.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

/// Create the bounded dispatch queue.
///
/// Jobs come out in the order they went in. Dropping (or [`JobSender::close`]-ing)
/// the sender closes the queue; receivers see `None` once it is drained.
pub fn dispatch_queue(capacity: usize) -> (JobSender, JobReceiver) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    let gauge = Arc::new(Gauge {
        depth: AtomicUsize::new(0),
        capacity,
    });
    (
        JobSender {
            tx,
            gauge: gauge.clone(),
        },
        JobReceiver {
            rx: Arc::new(Mutex::new(rx)),
            gauge,
        },
    )
}

/// Producer side, owned by the scheduler.
#[derive(Debug)]
pub struct JobSender {
    tx: mpsc::Sender<Job>,
    gauge: Arc<Gauge>,
}

impl JobSender {
    /// Enqueue a job, waiting while the queue is full. The wait is abandoned
    /// when `shutdown` fires.
    pub async fn push(&self, job: Job, shutdown: &CancellationToken) -> Result<(), PushError> {
        let permit = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(PushError::Cancelled),
            permit = self.tx.reserve() => permit.map_err(|_| PushError::Closed)?,
        };
        self.gauge.depth.fetch_add(1, Ordering::Relaxed);
        permit.send(job);
        Ok(())
    }

    /// Close the queue. Workers finish whatever is still buffered, then stop.
    pub fn close(self) {
        tracing::debug!(depth = self.gauge.depth.load(Ordering::Relaxed), "Dispatch queue closed");
    }

    pub fn gauge(&self) -> QueueGauge {
        QueueGauge {
            inner: self.gauge.clone(),
        }
    }
}

/// Consumer side, shared by every worker. Each job is handed to exactly one
/// caller of [`JobReceiver::pop`].
#[derive(Debug, Clone)]
pub struct JobReceiver {
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    gauge: Arc<Gauge>,
}

impl JobReceiver {
    /// Wait for the next job. Returns `None` once the queue is closed and empty.
    pub async fn pop(&self) -> Option<Job> {
        let job = self.rx.lock().await.recv().await;
        if job.is_some() {
            self.gauge.depth.fetch_sub(1, Ordering::Relaxed);
        }
        job
    }

    pub fn gauge(&self) -> QueueGauge {
        QueueGauge {
            inner: self.gauge.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::WaiterExpiryJob;
    use chrono::Utc;
    use std::time::Duration;

    fn job(user_id: u64) -> Job {
        Job::WaiterExpiry(WaiterExpiryJob {
            user_id,
            display_name: format!("user-{}", user_id),
            expires_at: Utc::now(),
        })
    }

    fn user_id(job: &Job) -> u64 {
        match job {
            Job::WaiterExpiry(j) => j.user_id,
            Job::HostCheck(_) => panic!("unexpected host check"),
        }
    }

    #[tokio::test]
    async fn preserves_fifo_order() {
        let token = CancellationToken::new();
        let (tx, rx) = dispatch_queue(4);
        for id in 1..=3 {
            tx.push(job(id), &token).await.unwrap();
        }
        assert_eq!(tx.gauge().depth(), 3);

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(user_id(&rx.pop().await.unwrap()));
        }
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(rx.gauge().depth(), 0);
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let token = CancellationToken::new();
        let (tx, rx) = dispatch_queue(2);
        tx.push(job(1), &token).await.unwrap();
        tx.close();

        assert_eq!(rx.pop().await.map(|j| user_id(&j)), Some(1));
        assert!(rx.pop().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn push_blocks_when_full_until_cancelled() {
        let token = CancellationToken::new();
        let (tx, _rx) = dispatch_queue(1);
        tx.push(job(1), &token).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.push(job(2), &token)).await;
        assert!(blocked.is_err(), "push into a full queue must wait");

        token.cancel();
        assert_eq!(tx.push(job(3), &token).await, Err(PushError::Cancelled));
    }

    #[tokio::test]
    async fn push_fails_once_receivers_are_gone() {
        let token = CancellationToken::new();
        let (tx, rx) = dispatch_queue(1);
        drop(rx);
        assert_eq!(tx.push(job(1), &token).await, Err(PushError::Closed));
    }

    #[test]
    fn capacity_is_at_least_one() {
        let (tx, _rx) = dispatch_queue(0);
        assert_eq!(tx.gauge().capacity(), 1);
    }
}
