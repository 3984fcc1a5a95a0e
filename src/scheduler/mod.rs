pub mod job;
pub mod queue;
pub mod tick;

pub use job::{HostCheckJob, Job, JobKind, PreviousStatus, WaiterExpiryJob};
pub use queue::{dispatch_queue, JobReceiver, JobSender, PushError, QueueGauge};
pub use tick::{plan_jobs, Scheduler, TickPlan, TickReport};
