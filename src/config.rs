//! Runner configuration.

use std::{borrow::Cow, num::NonZeroUsize, thread, time::Duration};

use crate::error::{Error, Result};

/// The worker count used by [`WorkerConfig::default`].
pub const DEFAULT_WORKERS: usize = 4;

/// How often a cancellable run re-checks its cancellation probe while it is
/// blocked joining a unit.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Poll intervals are clamped to at least this much so a cancellable join
/// never degenerates into a busy loop.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// The default thread-name prefix for thread units.
pub const DEFAULT_NAME: &str = "shardrun-worker";

/// Immutable settings for a [`Runner`]. The worker count is fixed at
/// construction and is always positive; the remaining knobs are set through
/// the consuming `with_*` builders.
///
/// ```
/// # use shardrun::prelude::*;
/// # use std::time::Duration;
/// let config = WorkerConfig::new(8)?
///     .with_join_timeout(Duration::from_secs(30))
///     .with_name("indexer");
/// assert_eq!(config.workers(), 8);
/// # Ok::<(), shardrun::Error>(())
/// ```
///
/// [`Runner`]: crate::runner::Runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    workers: NonZeroUsize,
    join_timeout: Option<Duration>,
    poll_interval: Duration,
    name: Cow<'static, str>,
}

impl WorkerConfig {
    /// Creates a configuration for `workers` workers. Fails with
    /// [`Error::Configuration`] when `workers` is zero.
    pub fn new(workers: usize) -> Result<WorkerConfig> {
        let workers = NonZeroUsize::new(workers)
            .ok_or_else(|| Error::config("worker count must be positive"))?;
        Ok(WorkerConfig::with_workers(workers))
    }

    /// Creates a configuration with one worker per unit of available
    /// parallelism, falling back to a single worker when that can't be
    /// determined.
    pub fn available() -> WorkerConfig {
        let workers = thread::available_parallelism().unwrap_or(NonZeroUsize::MIN);
        WorkerConfig::with_workers(workers)
    }

    fn with_workers(workers: NonZeroUsize) -> WorkerConfig {
        WorkerConfig {
            workers,
            join_timeout: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            name: Cow::Borrowed(DEFAULT_NAME),
        }
    }

    /// Bounds how long the runner waits on each unit. A unit still running
    /// when its timeout expires is left to the terminate-all step.
    pub fn with_join_timeout(mut self, timeout: Duration) -> WorkerConfig {
        self.join_timeout = Some(timeout);
        self
    }

    /// Sets how often a cancellable run checks its probe. Clamped to
    /// [`MIN_POLL_INTERVAL`].
    pub fn with_poll_interval(mut self, interval: Duration) -> WorkerConfig {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Sets the thread-name prefix used by thread units. Unit `i` is named
    /// `{prefix}-{i}`.
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> WorkerConfig {
        self.name = name.into();
        self
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.workers.get()
    }

    #[inline]
    pub fn join_timeout(&self) -> Option<Duration> {
        self.join_timeout
    }

    #[inline]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        const WORKERS: NonZeroUsize = match NonZeroUsize::new(DEFAULT_WORKERS) {
            Some(workers) => workers,
            None => panic!("DEFAULT_WORKERS must be non-zero"),
        };
        WorkerConfig::with_workers(WORKERS)
    }
}
