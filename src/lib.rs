pub mod config;
pub mod diagnostics;
pub mod error;
pub mod lifecycle;
pub mod poller;
pub mod probe;
pub mod registry;
pub mod scheduler;
pub mod shutdown;
pub mod worker;
