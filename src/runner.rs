//! The runner drives one full cycle: schedule, spawn, join, clean up.
//!
//! A run proceeds as follows:
//!
//! 1. The scheduler splits the work set into chunks.
//! 2. If there are more chunks than workers the run fails with
//!    [`Error::TooManyTasks`] before anything is spawned.
//! 3. Chunks are visited in order and one unit is created and started per
//!    chunk. The first empty chunk ends spawning, even if a custom scheduler
//!    put work in a later chunk.
//! 4. Units are joined in spawn order.
//! 5. Every unit is terminated, whatever happened in steps 3 and 4. Units
//!    that already finished ignore this.
//!
//! Step 5 is tied to the lifetime of the unit list rather than to the happy
//! path, so it also runs when a spawn or join fails, when the run is
//! cancelled, and when the runner's own thread unwinds.

use std::time::Instant;

use tracing::{debug, debug_span, trace, warn};

use crate::{
    config::WorkerConfig,
    error::{Error, Result},
    latch::Probe,
    scheduler::{Chunk, EqualShare, Scheduler},
    thread_unit::ThreadUnits,
    unit::{ConcurrentUnit, UnitFactory, UnitStatus},
};

// -----------------------------------------------------------------------------
// Run report

/// How each spawned unit ended, in spawn order. Entry `i` belongs to the unit
/// that worked on chunk `i`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    statuses: Vec<UnitStatus>,
}

impl RunReport {
    /// The status of every spawned unit.
    pub fn statuses(&self) -> &[UnitStatus] {
        &self.statuses
    }

    /// The number of units that were spawned.
    pub fn spawned(&self) -> usize {
        self.statuses.len()
    }

    /// `(chunk index, status)` for every unit that did not complete
    /// successfully.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &UnitStatus)> + '_ {
        self.statuses
            .iter()
            .enumerate()
            .filter(|(_, status)| !status.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.statuses.iter().all(UnitStatus::is_success)
    }
}

// -----------------------------------------------------------------------------
// Live units

/// The units spawned by one run. Dropping the list terminates every unit in
/// it, which is what guarantees cleanup on every exit path.
struct LiveUnits<U: ConcurrentUnit> {
    units: Vec<U>,
}

impl<U: ConcurrentUnit> LiveUnits<U> {
    fn with_capacity(capacity: usize) -> LiveUnits<U> {
        LiveUnits {
            units: Vec::with_capacity(capacity),
        }
    }

    /// Tracks `unit` and returns it for starting. Units are tracked before they
    /// are started so a partially started unit is still cleaned up.
    fn track(&mut self, unit: U) -> &mut U {
        self.units.push(unit);
        let last = self.units.len() - 1;
        &mut self.units[last]
    }

    fn terminate_all(&mut self) {
        for unit in &mut self.units {
            unit.terminate();
        }
    }

    /// Terminates whatever is still running and collects the final statuses.
    fn finish(mut self) -> Vec<UnitStatus> {
        self.terminate_all();
        self.units
            .iter()
            .map(|unit| unit.status().unwrap_or(UnitStatus::Terminated))
            .collect()
    }
}

impl<U: ConcurrentUnit> Drop for LiveUnits<U> {
    fn drop(&mut self) {
        self.terminate_all();
    }
}

// -----------------------------------------------------------------------------
// Runner

/// Runs a worker function over a work set, one isolated unit per chunk.
///
/// ```
/// # use shardrun::prelude::*;
/// # use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
/// let total = Arc::new(AtomicU64::new(0));
/// let runner = Runner::new(WorkerConfig::new(4)?).with_args(Arc::clone(&total));
///
/// let items: Vec<u64> = (1..=100).collect();
/// runner.run(
///     |chunk: Chunk<u64>, total: Arc<AtomicU64>| {
///         total.fetch_add(chunk.iter().sum(), Ordering::Relaxed);
///     },
///     &items,
/// )?;
/// assert_eq!(total.load(Ordering::Relaxed), 5050);
/// # Ok::<(), shardrun::Error>(())
/// ```
///
/// The scheduler, the unit factory and the extra arguments are all swappable
/// through the `with_*` builders. Every worker invocation receives its chunk
/// first and a clone of the extra arguments second.
#[derive(Debug, Clone)]
pub struct Runner<S = EqualShare, U = ThreadUnits, A = ()> {
    config: WorkerConfig,
    scheduler: S,
    units: U,
    args: A,
}

impl Runner {
    /// Creates a runner using the equal-share scheduler and thread units
    /// named after `config`.
    pub fn new(config: WorkerConfig) -> Runner {
        Runner {
            scheduler: EqualShare,
            units: ThreadUnits::named(config.name().to_owned()),
            args: (),
            config,
        }
    }
}

impl Default for Runner {
    fn default() -> Self {
        Runner::new(WorkerConfig::default())
    }
}

impl<S, U, A> Runner<S, U, A> {
    /// Replaces the partitioning strategy.
    pub fn with_scheduler<S2: Scheduler>(self, scheduler: S2) -> Runner<S2, U, A> {
        Runner {
            config: self.config,
            scheduler,
            units: self.units,
            args: self.args,
        }
    }

    /// Replaces the unit factory, for example with `ProcessUnits` for crash
    /// isolation.
    pub fn with_units<U2: UnitFactory>(self, units: U2) -> Runner<S, U2, A> {
        Runner {
            config: self.config,
            scheduler: self.scheduler,
            units,
            args: self.args,
        }
    }

    /// Sets the extra arguments passed to every worker invocation after its
    /// chunk. Each unit gets its own clone.
    pub fn with_args<A2>(self, args: A2) -> Runner<S, U, A2> {
        Runner {
            config: self.config,
            scheduler: self.scheduler,
            units: self.units,
            args,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn args(&self) -> &A {
        &self.args
    }
}

impl<S, U, A> Runner<S, U, A>
where
    S: Scheduler,
    U: UnitFactory,
    A: Clone + Send + 'static,
{
    /// Runs `worker` over `items` and blocks until every unit has finished.
    ///
    /// Worker failures are not reported here; use
    /// [`Runner::run_with_report`] to see them.
    pub fn run<T, F>(&self, worker: F, items: &[T]) -> Result<()>
    where
        T: Clone + Send + 'static,
        F: Fn(Chunk<T>, A) + Clone + Send + 'static,
    {
        self.execute(worker, items, None).map(drop)
    }

    /// Like [`Runner::run`], but returns how every unit ended.
    pub fn run_with_report<T, F>(&self, worker: F, items: &[T]) -> Result<RunReport>
    where
        T: Clone + Send + 'static,
        F: Fn(Chunk<T>, A) + Clone + Send + 'static,
    {
        self.execute(worker, items, None)
    }

    /// Like [`Runner::run_with_report`], but gives up with
    /// [`Error::Cancelled`] once `cancel` opens. The probe is checked before
    /// each unit is spawned, and joins are sliced by the configured poll
    /// interval so it is checked regularly while waiting. All units are
    /// terminated before this returns; for thread units that means waiting
    /// for their bodies to return.
    pub fn run_cancellable<T, F, P>(&self, worker: F, items: &[T], cancel: &P) -> Result<RunReport>
    where
        T: Clone + Send + 'static,
        F: Fn(Chunk<T>, A) + Clone + Send + 'static,
        P: Probe,
    {
        self.execute(worker, items, Some(cancel as &dyn Probe))
    }

    /// Binds `worker` to an owned work set and returns a callable that runs
    /// the full cycle over it each time it is called.
    pub fn parallelize<T, F>(self, worker: F, items: Vec<T>) -> impl Fn() -> Result<()>
    where
        T: Clone + Send + 'static,
        F: Fn(Chunk<T>, A) + Clone + Send + 'static,
    {
        move || self.run(worker.clone(), &items)
    }

    fn execute<T, F>(&self, worker: F, items: &[T], cancel: Option<&dyn Probe>) -> Result<RunReport>
    where
        T: Clone + Send + 'static,
        F: Fn(Chunk<T>, A) + Clone + Send + 'static,
    {
        let workers = self.config.workers();
        let span = debug_span!("run", workers, items = items.len());
        let _enter = span.enter();

        let chunks = self.scheduler.schedule(items, workers)?;
        if chunks.len() > workers {
            return Err(Error::TooManyTasks {
                chunks: chunks.len(),
                workers,
            });
        }

        let mut live = LiveUnits::with_capacity(chunks.len());
        for (index, share) in chunks.into_iter().enumerate().take(workers) {
            if share.is_empty() {
                debug!(index, "empty chunk; no further units");
                break;
            }
            if cancel.is_some_and(|cancel| cancel.probe()) {
                debug!(index, "run cancelled while spawning");
                return Err(Error::Cancelled);
            }

            let chunk = Chunk::new(index, share.to_vec());
            let worker = worker.clone();
            let args = self.args.clone();
            let unit = self.units.create(index, move || worker(chunk, args));
            live.track(unit).start()?;
            debug!(index, len = share.len(), "started unit");
        }

        for unit in &mut live.units {
            self.join_unit(unit, cancel)?;
        }

        let statuses = live.finish();
        for (index, status) in statuses.iter().enumerate() {
            if !status.is_success() {
                warn!(index, %status, "unit did not complete");
            }
        }
        Ok(RunReport { statuses })
    }

    /// Waits for one unit, honouring the join timeout and the cancellation
    /// probe. A unit that is still running on return is left to cleanup.
    fn join_unit(&self, unit: &mut U::Unit, cancel: Option<&dyn Probe>) -> Result<()> {
        let index = unit.index();
        trace!(index, "joining unit");

        let Some(cancel) = cancel else {
            if unit.join(self.config.join_timeout())?.is_none() {
                warn!(index, "join timed out");
            }
            return Ok(());
        };

        let deadline = self.config.join_timeout().map(|timeout| Instant::now() + timeout);
        loop {
            if cancel.probe() {
                debug!(index, "run cancelled");
                return Err(Error::Cancelled);
            }

            let mut slice = self.config.poll_interval();
            if let Some(deadline) = deadline {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    warn!(index, "join timed out");
                    return Ok(());
                }
                slice = slice.min(left);
            }

            if unit.join(Some(slice))?.is_some() {
                return Ok(());
            }
        }
    }
}
