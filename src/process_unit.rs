//! Units backed by forked child processes.
//!
//! The child inherits a copy of the parent's memory at `start`, runs the
//! worker body, and exits with status 0, or 101 if the body panicked. Nothing
//! flows back from the child except its exit status; workers that produce
//! results have to write them somewhere themselves.
//!
//! Only the thread calling `fork` exists in the child. Worker bodies must not
//! rely on locks that other threads of the parent might have been holding at
//! that moment.

use std::{
    panic::{self, AssertUnwindSafe},
    thread,
    time::{Duration, Instant},
};

use crossbeam_utils::Backoff;
use nix::{
    errno::Errno,
    sys::{
        signal::{kill, Signal},
        wait::{waitpid, WaitPidFlag, WaitStatus},
    },
    unistd::{fork, ForkResult, Pid},
};
use tracing::warn;

use crate::{
    error::{Error, Result},
    unit::{ConcurrentUnit, UnitFactory, UnitState, UnitStatus},
};

/// Exit status of a child whose worker body panicked.
pub const PANIC_EXIT_STATUS: i32 = 101;

/// Once spinning stops paying off, a timed join sleeps this long between
/// polls of the child.
const POLL_SLEEP: Duration = Duration::from_millis(1);

/// Creates [`ProcessUnit`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessUnits;

impl UnitFactory for ProcessUnits {
    type Unit = ProcessUnit;

    fn create<F>(&self, index: usize, body: F) -> ProcessUnit
    where
        F: FnOnce() + Send + 'static,
    {
        ProcessUnit {
            index,
            body: Some(Box::new(body)),
            pid: None,
            state: UnitState::Created,
            status: None,
        }
    }
}

/// A worker running in a forked child process.
pub struct ProcessUnit {
    index: usize,
    body: Option<Box<dyn FnOnce() + Send + 'static>>,
    pid: Option<Pid>,
    state: UnitState,
    status: Option<UnitStatus>,
}

impl ProcessUnit {
    /// The child's process id, once started.
    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    fn record(&mut self, state: UnitState, status: UnitStatus) -> UnitStatus {
        self.state = state;
        self.status = Some(status.clone());
        status
    }

    /// Polls the child once. Returns how it ended, or `None` if it is still
    /// running.
    fn try_wait(&self, pid: Pid) -> Result<Option<UnitStatus>> {
        loop {
            match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => return Ok(None),
                Ok(status) => {
                    if let Some(status) = exit_status(status) {
                        return Ok(Some(status));
                    }
                }
                Err(Errno::EINTR) => {}
                Err(errno) => return Err(Error::join(self.index, errno.desc())),
            }
        }
    }

    /// Blocks until the child ends.
    fn wait(&self, pid: Pid) -> Result<UnitStatus> {
        loop {
            match waitpid(pid, None) {
                Ok(status) => {
                    if let Some(status) = exit_status(status) {
                        return Ok(status);
                    }
                }
                Err(Errno::EINTR) => {}
                Err(errno) => return Err(Error::join(self.index, errno.desc())),
            }
        }
    }

    /// Waits for the child until `deadline`, spinning briefly before falling
    /// back to short sleeps.
    fn wait_until(&self, pid: Pid, deadline: Instant) -> Result<Option<UnitStatus>> {
        let backoff = Backoff::new();
        loop {
            if let Some(status) = self.try_wait(pid)? {
                return Ok(Some(status));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            if backoff.is_completed() {
                thread::sleep(POLL_SLEEP.min(deadline - now));
            } else {
                backoff.snooze();
            }
        }
    }
}

/// Maps a final wait status to a unit status. Stops and continues are not
/// final and map to `None`.
fn exit_status(status: WaitStatus) -> Option<UnitStatus> {
    match status {
        WaitStatus::Exited(_, 0) => Some(UnitStatus::Completed),
        WaitStatus::Exited(_, PANIC_EXIT_STATUS) => Some(UnitStatus::Failed {
            reason: "worker panicked".to_owned(),
        }),
        WaitStatus::Exited(_, code) => Some(UnitStatus::Failed {
            reason: format!("exited with status {code}"),
        }),
        WaitStatus::Signaled(_, signal, _) => Some(UnitStatus::Failed {
            reason: format!("killed by signal {signal:?}"),
        }),
        _ => None,
    }
}

impl ConcurrentUnit for ProcessUnit {
    fn index(&self) -> usize {
        self.index
    }

    fn state(&self) -> UnitState {
        self.state
    }

    fn status(&self) -> Option<UnitStatus> {
        self.status.clone()
    }

    fn start(&mut self) -> Result<()> {
        let Some(body) = self.body.take() else {
            return Ok(());
        };

        // SAFETY: The child only runs the worker body and then leaves through
        // `_exit`, skipping the parent's atexit handlers and destructors.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                let code = match panic::catch_unwind(AssertUnwindSafe(body)) {
                    Ok(()) => 0,
                    Err(_) => PANIC_EXIT_STATUS,
                };
                // SAFETY: `_exit` never returns and touches no Rust state.
                unsafe { libc::_exit(code) }
            }
            Ok(ForkResult::Parent { child }) => {
                self.pid = Some(child);
                self.state = UnitState::Running;
                Ok(())
            }
            Err(errno) => Err(Error::Spawn {
                index: self.index,
                source: errno.into(),
            }),
        }
    }

    fn join(&mut self, timeout: Option<Duration>) -> Result<Option<UnitStatus>> {
        match (self.state, self.pid) {
            (UnitState::Completed | UnitState::Terminated, _) => Ok(self.status.clone()),
            (UnitState::Running, Some(pid)) => {
                let status = match timeout {
                    None => Some(self.wait(pid)?),
                    Some(timeout) => self.wait_until(pid, Instant::now() + timeout)?,
                };
                Ok(status.map(|status| self.record(UnitState::Completed, status)))
            }
            _ => Err(Error::join(self.index, "unit was never started")),
        }
    }

    fn terminate(&mut self) {
        match (self.state, self.pid) {
            (UnitState::Running, Some(pid)) => {
                match self.try_wait(pid) {
                    Ok(None) => {}
                    // A child that already exited only needs reaping.
                    Ok(Some(status)) => {
                        self.record(UnitState::Completed, status);
                        return;
                    }
                    // The child is gone or no longer ours, so its pid may
                    // already belong to another process.
                    Err(err) => {
                        warn!(index = self.index, %err, "lost track of worker process");
                        self.record(UnitState::Terminated, UnitStatus::Terminated);
                        return;
                    }
                }
                warn!(index = self.index, pid = pid.as_raw(), "killing worker process");
                match kill(pid, Signal::SIGKILL) {
                    Ok(()) | Err(Errno::ESRCH) => {}
                    Err(errno) => warn!(index = self.index, %errno, "failed to kill worker process"),
                }
                if let Err(err) = self.wait(pid) {
                    warn!(index = self.index, %err, "failed to reap worker process");
                }
                self.record(UnitState::Terminated, UnitStatus::Terminated);
            }
            (UnitState::Completed | UnitState::Terminated, _) => {}
            _ => {
                self.body = None;
                self.record(UnitState::Terminated, UnitStatus::Terminated);
            }
        }
    }
}

impl Drop for ProcessUnit {
    fn drop(&mut self) {
        // Never leave a running child or a zombie behind.
        self.terminate();
    }
}
