//! Poller lifecycle.
//!
//! The poller is `Running` from startup until a shutdown request moves it to
//! `Draining`, and `Stopped` once the top-level loop has returned. Control
//! requests arrive as [`ControlEvent`]s; [`crate::shutdown`] turns OS signals
//! into them, tests send them directly.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::scheduler::Scheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Draining => write!(f, "draining"),
            LifecycleState::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Stop ticking and shut down gracefully
    Shutdown,
    /// Dump diagnostics and keep running
    Diagnostics,
}

/// Why the tick loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// One-shot mode finished its single tick
    OneShotComplete,
    /// A shutdown was requested
    Shutdown,
}

/// Observable lifecycle state.
#[derive(Debug)]
pub struct Lifecycle {
    state: watch::Sender<LifecycleState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Running);
        Self { state }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Move forward to `next`. Never moves backwards.
    pub fn advance(&self, next: LifecycleState) {
        self.state.send_if_modified(|current| {
            let forward = matches!(
                (*current, next),
                (LifecycleState::Running, LifecycleState::Draining)
                    | (LifecycleState::Running, LifecycleState::Stopped)
                    | (LifecycleState::Draining, LifecycleState::Stopped)
            );
            if forward {
                tracing::info!(from = %current, to = %next, "Lifecycle transition");
                *current = next;
            }
            forward
        });
    }
}

/// Drives the scheduler on its interval and reacts to control events.
pub struct LifecycleController<'a> {
    lifecycle: &'a Lifecycle,
    diagnostics: Arc<dyn Diagnostics>,
    shutdown: CancellationToken,
}

impl<'a> LifecycleController<'a> {
    pub fn new(
        lifecycle: &'a Lifecycle,
        diagnostics: Arc<dyn Diagnostics>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            lifecycle,
            diagnostics,
            shutdown,
        }
    }

    /// Apply a control event. Returns `true` when the poller should stop.
    pub fn handle(&self, event: ControlEvent) -> bool {
        match event {
            ControlEvent::Shutdown => {
                tracing::info!("Stopping on shutdown request");
                self.lifecycle.advance(LifecycleState::Draining);
                self.shutdown.cancel();
                true
            }
            ControlEvent::Diagnostics => {
                tracing::info!("Diagnostics requested");
                let mut stderr = std::io::stderr().lock();
                if let Err(e) = self.diagnostics.dump(&mut stderr) {
                    tracing::warn!(error = %e, "Failed to write diagnostics dump");
                }
                false
            }
        }
    }

    /// Tick until one-shot completion or a shutdown request.
    ///
    /// The first tick fires immediately; ticks missed while a tick is stuck
    /// on a full queue are skipped. Control events are still served while a
    /// tick is in progress, and a shutdown drops the tick in hand. A listing
    /// failure ends the loop with an error in one-shot mode and only skips
    /// the tick otherwise.
    pub async fn run(
        &self,
        scheduler: &Scheduler,
        control: &mut mpsc::Receiver<ControlEvent>,
    ) -> Result<StopReason> {
        let one_shot = scheduler.config().is_one_shot();
        let mut ticker = tokio::time::interval(scheduler.config().interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let tick = scheduler.tick();
                    tokio::pin!(tick);
                    let outcome = loop {
                        tokio::select! {
                            outcome = &mut tick => break outcome,
                            Some(event) = control.recv() => {
                                if self.handle(event) {
                                    return Ok(StopReason::Shutdown);
                                }
                            }
                        }
                    };

                    if self.shutdown.is_cancelled() {
                        return Ok(StopReason::Shutdown);
                    }
                    match outcome {
                        Ok(report) => {
                            tracing::debug!(?report, "Tick complete");
                        }
                        Err(e) if one_shot => {
                            tracing::error!(error = %e, "Failed to get host list");
                            return Err(e);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to get host list, skipping tick");
                        }
                    }
                    if one_shot {
                        return Ok(StopReason::OneShotComplete);
                    }
                }
                Some(event) = control.recv() => {
                    if self.handle(event) {
                        return Ok(StopReason::Shutdown);
                    }
                }
            }
        }
    }
}
