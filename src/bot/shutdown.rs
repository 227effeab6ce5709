// src/bot/shutdown.rs - Graceful shutdown on Ctrl-C / SIGTERM

use anyhow::Result;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{broadcast, RwLock};
use tokio::time::timeout;

/// Shutdown phases for orderly termination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    /// Signal received, components are being stopped
    Terminating,
    Stopped,
}

/// Component that can be gracefully shut down
#[async_trait::async_trait]
pub trait ShutdownComponent: Send + Sync {
    /// Component name for logging
    fn name(&self) -> &str;

    async fn shutdown(&self) -> Result<()>;
}

/// Outcome of a completed shutdown
#[derive(Debug, Clone, Default)]
pub struct ShutdownStats {
    pub components_shutdown: Vec<String>,
    pub failed_components: Vec<(String, String)>, // (component, error)
    pub duration_seconds: f64,
}

/// Waits for a termination signal and stops registered components in
/// registration order.
pub struct GracefulShutdown {
    component_timeout: Duration,
    phase: Arc<RwLock<ShutdownPhase>>,
    notifier: broadcast::Sender<ShutdownPhase>,
    components: RwLock<Vec<Box<dyn ShutdownComponent>>>,
}

impl GracefulShutdown {
    pub fn new(component_timeout: Duration) -> Self {
        let (notifier, _) = broadcast::channel(10);
        Self {
            component_timeout,
            phase: Arc::new(RwLock::new(ShutdownPhase::Running)),
            notifier,
            components: RwLock::new(Vec::new()),
        }
    }

    pub async fn register_component(&self, component: Box<dyn ShutdownComponent>) {
        debug!("Registered shutdown component: {}", component.name());
        self.components.write().await.push(component);
    }

    /// Listen for Ctrl-C and SIGTERM in the background
    pub fn start_signal_handlers(&self) {
        let phase = Arc::clone(&self.phase);
        let notifier = self.notifier.clone();

        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C signal, initiating graceful shutdown...");
                    request(&phase, &notifier).await;
                }
                Err(err) => error!("Failed to listen for Ctrl+C signal: {}", err),
            }
        });

        #[cfg(unix)]
        {
            let phase = Arc::clone(&self.phase);
            let notifier = self.notifier.clone();

            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(sigterm) => sigterm,
                    Err(err) => {
                        error!("Failed to register SIGTERM handler: {}", err);
                        return;
                    }
                };
                sigterm.recv().await;
                info!("Received SIGTERM signal, initiating graceful shutdown...");
                request(&phase, &notifier).await;
            });
        }

        info!("Shutdown signal handlers started");
    }

    /// Request shutdown without a signal (tests, fatal runtime errors)
    pub async fn trigger_shutdown(&self) {
        request(&self.phase, &self.notifier).await;
    }

    pub async fn get_phase(&self) -> ShutdownPhase {
        *self.phase.read().await
    }

    /// Block until shutdown is requested, then stop every component
    pub async fn wait_for_shutdown(&self) -> ShutdownStats {
        let mut receiver = self.notifier.subscribe();

        while self.get_phase().await == ShutdownPhase::Running {
            match receiver.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        info!("Shutting down...");
        self.shutdown_all_components().await
    }

    async fn shutdown_all_components(&self) -> ShutdownStats {
        let started = std::time::Instant::now();
        let mut stats = ShutdownStats::default();
        let components = self.components.read().await;

        for component in components.iter() {
            let name = component.name().to_string();
            info!("Shutting down component: {}", name);

            match timeout(self.component_timeout, component.shutdown()).await {
                Ok(Ok(())) => stats.components_shutdown.push(name),
                Ok(Err(e)) => {
                    error!("Component {} failed to shut down: {}", name, e);
                    stats.failed_components.push((name, e.to_string()));
                }
                Err(_) => {
                    warn!("Component {} timed out during shutdown", name);
                    stats.failed_components.push((name, "timed out".to_string()));
                }
            }
        }

        *self.phase.write().await = ShutdownPhase::Stopped;
        let _ = self.notifier.send(ShutdownPhase::Stopped);

        stats.duration_seconds = started.elapsed().as_secs_f64();
        info!("Graceful shutdown completed in {:.2} seconds", stats.duration_seconds);
        stats
    }
}

async fn request(phase: &RwLock<ShutdownPhase>, notifier: &broadcast::Sender<ShutdownPhase>) {
    let mut phase = phase.write().await;
    if *phase == ShutdownPhase::Running {
        *phase = ShutdownPhase::Terminating;
        let _ = notifier.send(ShutdownPhase::Terminating);
    }
}
