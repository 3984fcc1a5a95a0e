//! Runtime diagnostics dumps.
//!
//! The lifecycle controller calls a [`Diagnostics`] implementation when asked
//! for a dump; it does not know which signal (if any) triggered it.

use std::backtrace::Backtrace;
use std::io::{self, Write};

use crate::scheduler::QueueGauge;
use crate::worker::WorkerMonitor;

/// Port invoked for a non-terminating diagnostics dump.
pub trait Diagnostics: Send + Sync {
    fn dump(&self, out: &mut dyn Write) -> io::Result<()>;
}

/// Dumps dispatch queue occupancy, per-worker activity and tokio runtime
/// counters, followed by a backtrace of the calling task.
pub struct PoolDiagnostics {
    queue: QueueGauge,
    workers: Vec<WorkerMonitor>,
}

impl PoolDiagnostics {
    pub fn new(queue: QueueGauge, workers: Vec<WorkerMonitor>) -> Self {
        Self { queue, workers }
    }
}

impl Diagnostics for PoolDiagnostics {
    fn dump(&self, out: &mut dyn Write) -> io::Result<()> {
        let depth = self.queue.depth();
        let capacity = self.queue.capacity();
        let busy = self
            .workers
            .iter()
            .filter(|w| w.activity().is_busy())
            .count();

        writeln!(out, "*** blocking dump ***")?;
        writeln!(out, "dispatch queue: {}/{} jobs waiting", depth, capacity)?;
        writeln!(out, "workers busy: {}/{}", busy, self.workers.len())?;
        if depth >= capacity {
            writeln!(out, "dispatch queue full: scheduler is blocked on push")?;
        }

        writeln!(out, "*** task dump ***")?;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let metrics = handle.metrics();
            writeln!(
                out,
                "runtime: {} worker threads, {} alive tasks",
                metrics.num_workers(),
                metrics.num_alive_tasks()
            )?;
        }
        for worker in &self.workers {
            writeln!(
                out,
                "worker {}: {} (processed {})",
                worker.id,
                worker.activity(),
                worker.processed()
            )?;
        }

        writeln!(out, "*** controller backtrace ***")?;
        writeln!(out, "{}", Backtrace::force_capture())?;
        writeln!(out, "*** end diagnostics dump ***")?;
        out.flush()
    }
}
