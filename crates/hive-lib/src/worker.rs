//! Polling loop driving one agent
//!
//! Each loop runs steps strictly one after another and picks the next delay
//! from the step outcome. Delays race the shutdown signal; a step that has
//! started is always awaited to completion.

use crate::agent::Agent;
use crate::health::{Component, HealthRegistry};
use crate::observability::AgentMetrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Delays used by the worker loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSchedule {
    /// Grace period before the first step
    pub startup: Duration,
    /// After a step that did work
    pub busy: Duration,
    /// After a step that found nothing to do
    pub idle: Duration,
    /// After a failed step
    pub error: Duration,
}

impl WorkerSchedule {
    /// Favour throughput while the queue is non-empty
    pub fn scoring() -> Self {
        Self {
            startup: Duration::from_secs(3),
            busy: Duration::from_millis(100),
            idle: Duration::from_secs(2),
            error: Duration::from_secs(5),
        }
    }

    /// Avoid re-triggering right after a training run
    pub fn retrain() -> Self {
        Self {
            startup: Duration::from_secs(5),
            busy: Duration::from_secs(60),
            idle: Duration::from_secs(10),
            error: Duration::from_secs(30),
        }
    }
}

impl Default for WorkerSchedule {
    fn default() -> Self {
        Self::scoring()
    }
}

/// Step counts reported when the loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub steps: u64,
    pub work: u64,
    pub idle: u64,
    pub errors: u64,
}

pub struct AgentWorker<A: Agent> {
    agent: Arc<A>,
    schedule: WorkerSchedule,
    metrics: AgentMetrics,
    health: Option<(HealthRegistry, Component)>,
}

impl<A: Agent> AgentWorker<A> {
    pub fn new(agent: Arc<A>, schedule: WorkerSchedule) -> Self {
        Self {
            agent,
            schedule,
            metrics: AgentMetrics::new(),
            health: None,
        }
    }

    /// Report step outcomes on `component`.
    ///
    /// Persistence failures also mark the store unhealthy until a later step
    /// completes work, which implies a successful write.
    pub fn with_health(mut self, registry: HealthRegistry, component: Component) -> Self {
        self.health = Some((registry, component));
        self
    }

    /// Poll until shutdown is signalled or the sender is dropped
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> WorkerStats {
        let name = self.agent.name();
        let mut stats = WorkerStats::default();
        info!(agent = name, schedule = ?self.schedule, "Worker started");

        if !wait_or_shutdown(self.schedule.startup, &mut shutdown).await {
            info!(agent = name, "Worker stopped before first step");
            return stats;
        }

        loop {
            let started = Instant::now();
            let outcome = self.agent.step().await;
            self.metrics
                .observe_step_latency(name, started.elapsed().as_secs_f64());
            stats.steps += 1;

            let delay = match outcome {
                Ok(Some(output)) => {
                    stats.work += 1;
                    self.metrics.inc_step_outcome(name, "work");
                    debug!(agent = name, result = ?output, "Step completed");
                    self.report_healthy().await;
                    if let Some((registry, _)) = &self.health {
                        registry.set_healthy(Component::Store).await;
                    }
                    self.schedule.busy
                }
                Ok(None) => {
                    stats.idle += 1;
                    self.metrics.inc_step_outcome(name, "idle");
                    if let Err(e) = self.agent.on_idle().await {
                        warn!(agent = name, error = %e, "Idle housekeeping failed");
                    }
                    self.report_healthy().await;
                    self.schedule.idle
                }
                Err(e) => {
                    stats.errors += 1;
                    self.metrics.inc_step_outcome(name, "error");
                    error!(
                        agent = name,
                        error = %e,
                        kind = e.kind(),
                        transient = e.is_transient(),
                        retry_in_ms = self.schedule.error.as_millis() as u64,
                        "Step failed, backing off"
                    );
                    if let Some((registry, component)) = &self.health {
                        registry.set_degraded(*component, e.to_string()).await;
                        if e.is_persistence_failure() {
                            registry.set_unhealthy(Component::Store, e.to_string()).await;
                        }
                    }
                    self.schedule.error
                }
            };

            if !wait_or_shutdown(delay, &mut shutdown).await {
                break;
            }
        }

        info!(
            agent = name,
            steps = stats.steps,
            work = stats.work,
            errors = stats.errors,
            "Worker stopped"
        );
        stats
    }

    async fn report_healthy(&self) {
        if let Some((registry, component)) = &self.health {
            registry.set_healthy(*component).await;
        }
    }
}

/// Sleep for `delay`; returns false if shutdown arrived first
async fn wait_or_shutdown(delay: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown.recv() => false,
    }
}
