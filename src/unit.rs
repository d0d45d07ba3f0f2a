//! This module defines the isolation boundary a worker runs behind, called a
//! `ConcurrentUnit`. The runner creates one unit per non-empty chunk, starts
//! it, joins it, and finally terminates it.
//!
//! A unit moves through a small lifecycle:
//!
//! ```text
//! Created --start--> Running --join--> Completed
//!    |                  |
//!    +----terminate-----+-------------> Terminated
//! ```
//!
//! Terminating a unit that has already completed does nothing, which is what
//! lets the runner terminate every unit unconditionally on the way out.
//!
//! Two implementations ship with the crate:
//!
//! + [`ThreadUnit`] runs the worker on an OS thread. It is portable and cheap,
//!   but offers no crash isolation (a worker that aborts takes the process
//!   with it) and cannot be forcibly stopped: terminating a running thread
//!   unit waits for its body to return.
//! + `ProcessUnit` (unix only) forks a child process for the worker. This gives
//!   true crash isolation, and termination sends `SIGKILL`.
//!
//! [`ThreadUnit`]: crate::thread_unit::ThreadUnit

use std::{fmt, time::Duration};

use crate::error::Result;

// -----------------------------------------------------------------------------
// Unit state and outcome

/// Where a unit is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitState {
    /// Bound to a worker but not yet started.
    Created,
    /// Started and not yet observed to finish.
    Running,
    /// Observed to finish, successfully or not.
    Completed,
    /// Stopped by `terminate` before it was observed to finish.
    Terminated,
}

/// How a unit ended.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnitStatus {
    /// The worker returned normally.
    Completed,
    /// The worker panicked or its process exited unsuccessfully.
    Failed { reason: String },
    /// The unit was terminated before it finished.
    Terminated,
}

impl UnitStatus {
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, UnitStatus::Completed)
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitStatus::Completed => write!(f, "completed"),
            UnitStatus::Failed { reason } => write!(f, "failed: {reason}"),
            UnitStatus::Terminated => write!(f, "terminated"),
        }
    }
}

// -----------------------------------------------------------------------------
// ConcurrentUnit

/// One spawned worker.
pub trait ConcurrentUnit {
    /// The position of the chunk this unit works on.
    fn index(&self) -> usize;

    /// The current lifecycle state.
    fn state(&self) -> UnitState;

    /// The outcome, once the unit has completed or been terminated.
    fn status(&self) -> Option<UnitStatus>;

    /// Launches the worker. Calling this on a unit that is not `Created` does
    /// nothing.
    fn start(&mut self) -> Result<()>;

    /// Blocks until the unit finishes, or until `timeout` elapses when one is
    /// given. Returns `Ok(None)` on timeout, leaving the unit running.
    /// Joining a finished unit returns its recorded status again.
    fn join(&mut self, timeout: Option<Duration>) -> Result<Option<UnitStatus>>;

    /// Stops the unit as forcefully as the implementation allows. Once this
    /// returns the worker body is no longer running. Units that have already
    /// finished ignore this.
    fn terminate(&mut self);
}

/// Creates units for the runner. The factory binds a worker body to a unit;
/// the runner decides when to start it.
pub trait UnitFactory {
    type Unit: ConcurrentUnit;

    fn create<F>(&self, index: usize, body: F) -> Self::Unit
    where
        F: FnOnce() + Send + 'static;
}
