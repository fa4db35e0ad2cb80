//! Scheduler configuration and builder.

use crate::error::Error;
use crate::monitor::EscalationPolicy;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use super::worker_pool::PoolOptions;
use super::Scheduler;

/// Configuration for a [`Scheduler`].
#[derive(Clone)]
pub struct SchedulerConfig {
    /// Minimum number of worker threads kept alive.
    pub min_workers: usize,
    /// Maximum number of worker threads.
    pub max_workers: usize,
    /// Idle timeout before retiring threads above the minimum.
    pub idle_timeout: Duration,
    /// Worker thread name prefix.
    pub thread_name_prefix: String,
    /// Policy applied to unobserved faults that no handler claims.
    pub escalation_policy: EscalationPolicy,
    /// Callback run when a worker thread starts.
    pub on_thread_start: Option<Arc<dyn Fn() + Send + Sync>>,
    /// Callback run when a worker thread stops.
    pub on_thread_stop: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl SchedulerConfig {
    /// Default worker ceiling: one per available core, at least 4.
    #[must_use]
    pub fn default_max_workers() -> usize {
        std::thread::available_parallelism()
            .map_or(4, NonZeroUsize::get)
            .max(4)
    }

    pub(crate) fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            idle_timeout: self.idle_timeout,
            thread_name_prefix: self.thread_name_prefix.clone(),
            on_thread_start: self.on_thread_start.clone(),
            on_thread_stop: self.on_thread_stop.clone(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_workers: 1,
            max_workers: Self::default_max_workers(),
            idle_timeout: Duration::from_secs(10),
            thread_name_prefix: "promissory".to_string(),
            escalation_policy: EscalationPolicy::Escalate,
            on_thread_start: None,
            on_thread_stop: None,
        }
    }
}

impl core::fmt::Debug for SchedulerConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SchedulerConfig")
            .field("min_workers", &self.min_workers)
            .field("max_workers", &self.max_workers)
            .field("idle_timeout", &self.idle_timeout)
            .field("thread_name_prefix", &self.thread_name_prefix)
            .field("escalation_policy", &self.escalation_policy)
            .field("on_thread_start", &self.on_thread_start.is_some())
            .field("on_thread_stop", &self.on_thread_stop.is_some())
            .finish()
    }
}

/// Builder for constructing a [`Scheduler`] with custom configuration.
#[derive(Clone, Debug, Default)]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
}

impl SchedulerBuilder {
    /// Creates a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the minimum and maximum number of worker threads.
    #[must_use]
    pub fn worker_threads(mut self, min: usize, max: usize) -> Self {
        self.config.min_workers = min;
        self.config.max_workers = max;
        self
    }

    /// Sets the worker thread name prefix.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Sets the idle timeout before retiring threads above the minimum.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Sets the policy applied to unobserved faults no handler claims.
    #[must_use]
    pub fn escalation_policy(mut self, policy: EscalationPolicy) -> Self {
        self.config.escalation_policy = policy;
        self
    }

    /// Registers a callback to run when a worker thread starts.
    #[must_use]
    pub fn on_thread_start<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.config.on_thread_start = Some(Arc::new(f));
        self
    }

    /// Registers a callback to run when a worker thread stops.
    #[must_use]
    pub fn on_thread_stop<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.config.on_thread_stop = Some(Arc::new(f));
        self
    }

    /// Builds a scheduler from this configuration.
    pub fn build(self) -> Result<Scheduler, Error> {
        Scheduler::with_config(self.config)
    }
}
