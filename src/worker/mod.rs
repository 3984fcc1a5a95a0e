//! Worker pool that processes dispatched jobs.
//!
//! - [`JobExecutor`]: runs a single job, either probing a host and reporting
//!   its status or clearing an expired wait
//! - [`WorkerPool`]: a fixed number of workers pulling from the shared
//!   dispatch queue
//!
//! # Execution Flow
//!
//! 1. A worker takes the next job off the queue (or exits once the queue is
//!    closed and empty, or shutdown is signalled)
//! 2. [`JobExecutor::execute`] probes or expires, bounded by the configured
//!    timeout
//! 3. In update mode the result is written to the registry; in dry-run mode
//!    it is only logged
//! 4. The job is discarded whatever the outcome. Nothing is retried.

pub mod executor;
pub mod pool;

pub use executor::{status_update, JobExecutor, JobOutcome};
pub use pool::{WorkerActivity, WorkerMonitor, WorkerPool};
