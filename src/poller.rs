use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::PollerConfig;
use crate::diagnostics::{Diagnostics, PoolDiagnostics};
use crate::error::Result;
use crate::lifecycle::{ControlEvent, Lifecycle, LifecycleController, LifecycleState, StopReason};
use crate::probe::Prober;
use crate::registry::{resolve_game, RegistryClient};
use crate::scheduler::{dispatch_queue, Scheduler};
use crate::worker::{JobExecutor, WorkerPool};

/// Top-level poller that wires the scheduler, dispatch queue and worker pool
/// together and runs them until completion.
pub struct Poller {
    config: PollerConfig,
    registry: Arc<dyn RegistryClient>,
    prober: Arc<dyn Prober>,
    diagnostics: Option<Arc<dyn Diagnostics>>,
    lifecycle: Lifecycle,
}

impl Poller {
    pub fn new(
        config: PollerConfig,
        registry: Arc<dyn RegistryClient>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        Self {
            config,
            registry,
            prober,
            diagnostics: None,
            lifecycle: Lifecycle::new(),
        }
    }

    /// Replace the default pool diagnostics dump.
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.lifecycle.subscribe()
    }

    /// Run the poller.
    ///
    /// 1. Resolves the configured game on the registry; failure here aborts
    ///    before any tick
    /// 2. Spawns the worker pool on a dispatch queue of `worker_count + 1`
    /// 3. Ticks until one-shot completion or a [`ControlEvent::Shutdown`]
    /// 4. Closes the queue. After one-shot completion workers finish every
    ///    queued job; after a shutdown they only finish the job in hand,
    ///    bounded by the shutdown grace period
    ///
    /// # Errors
    ///
    /// Returns an error if the game cannot be resolved, or if listing hosts
    /// fails in one-shot mode.
    pub async fn run(self, mut control: mpsc::Receiver<ControlEvent>) -> Result<()> {
        let resolved = resolve_game(
            self.registry.as_ref(),
            &self.config.game,
            self.config.timeout,
        )
        .await;
        let game = match resolved {
            Ok(game) => Arc::new(game),
            Err(e) => {
                tracing::error!(game = %self.config.game, error = %e, "Failed to resolve game");
                self.lifecycle.advance(LifecycleState::Stopped);
                return Err(e);
            }
        };
        tracing::info!(
            game = %game.url_short_name,
            game_id = game.id,
            workers = self.config.worker_count,
            interval = ?self.config.interval,
            timeout = ?self.config.timeout,
            depth = %self.config.check_depth,
            updates = self.config.updates_enabled(),
            one_shot = self.config.is_one_shot(),
            "Starting poller"
        );

        let shutdown = CancellationToken::new();
        let (sender, receiver) = dispatch_queue(self.config.queue_capacity());

        let executor = JobExecutor::new(
            self.registry.clone(),
            self.prober.clone(),
            game.clone(),
            &self.config,
        );
        let mut pool = WorkerPool::spawn(
            self.config.worker_count,
            executor,
            receiver.clone(),
            shutdown.clone(),
        );

        let diagnostics = match self.diagnostics.clone() {
            Some(diagnostics) => diagnostics,
            None => Arc::new(PoolDiagnostics::new(receiver.gauge(), pool.monitors())),
        };
        drop(receiver);

        let scheduler = Scheduler::new(
            self.registry.clone(),
            game,
            self.config.clone(),
            sender,
            shutdown.clone(),
        );
        let controller = LifecycleController::new(&self.lifecycle, diagnostics, shutdown.clone());

        let outcome = controller.run(&scheduler, &mut control).await;
        scheduler.close();

        match outcome {
            Ok(StopReason::OneShotComplete) => {
                tracing::info!("Single check dispatched, waiting for workers to finish");
                let mut interrupted = false;
                loop {
                    tokio::select! {
                        _ = pool.join() => break,
                        Some(event) = control.recv() => {
                            if controller.handle(event) {
                                interrupted = true;
                                break;
                            }
                        }
                    }
                }
                if interrupted {
                    pool.join_within(self.config.shutdown_grace).await;
                }
            }
            _ => {
                self.lifecycle.advance(LifecycleState::Draining);
                shutdown.cancel();
                pool.join_within(self.config.shutdown_grace).await;
            }
        }

        self.lifecycle.advance(LifecycleState::Stopped);
        tracing::info!("Poller stopped");
        outcome.map(|_| ())
    }
}
