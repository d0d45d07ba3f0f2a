//! Split a work set into equal shares and run one isolated worker per share.
//!
//! Shardrun is a small fork-join helper. Given a slice of work items and a
//! fixed number of workers, it divides the items into near-equal contiguous
//! chunks, runs the worker function once per chunk inside its own concurrent
//! unit, waits for every unit to finish, and then terminates any unit that is
//! still alive. There is no work stealing, no rebalancing, no retrying and no
//! result collection; workers that produce output write it somewhere
//! themselves.
//!
//! The equal-share scheduler gives every chunk `len / workers` items and hands
//! the remainder out one item at a time to the leading chunks, so no two
//! workers ever differ in load by more than one item.
//!
//! Units come in two flavours. [`ThreadUnit`]s are the default and run each
//! worker on an OS thread. `ProcessUnit`s, available on unix, fork a child
//! process per worker, which contains crashes and can be killed outright.
//!
//! ```
//! # use shardrun::prelude::*;
//! let runner = Runner::new(WorkerConfig::new(3)?);
//! let report = runner.run_with_report(
//!     |chunk: Chunk<&str>, ()| {
//!         for word in &chunk {
//!             assert!(!word.is_empty());
//!         }
//!     },
//!     &["alpha", "beta", "gamma", "delta"],
//! )?;
//! assert_eq!(report.spawned(), 3);
//! assert!(report.is_success());
//! # Ok::<(), shardrun::Error>(())
//! ```
//!
//! [`ThreadUnit`]: crate::thread_unit::ThreadUnit

pub mod config;
pub mod error;
pub mod latch;
pub mod runner;
pub mod scheduler;
pub mod thread_unit;
pub mod unit;

#[cfg(unix)]
pub mod process_unit;

mod util;

pub use error::{Error, Result};

pub mod prelude {
    #[cfg(unix)]
    pub use crate::process_unit::{ProcessUnit, ProcessUnits};
    pub use crate::{
        config::WorkerConfig,
        error::Error,
        latch::{AtomicLatch, Latch, LockLatch, Probe},
        runner::{RunReport, Runner},
        scheduler::{schedule, Chunk, EqualShare, Scheduler},
        thread_unit::{ThreadUnit, ThreadUnits},
        unit::{ConcurrentUnit, UnitFactory, UnitState, UnitStatus},
    };
}
