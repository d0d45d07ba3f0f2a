use std::{
    borrow::Cow,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use tracing::{debug, warn};

use crate::{
    config::DEFAULT_NAME,
    error::{Error, Result},
    latch::{Latch, LockLatch, Probe},
    unit::{ConcurrentUnit, UnitFactory, UnitState, UnitStatus},
    util::{panic_message, CallOnDrop},
};

// -----------------------------------------------------------------------------
// Thread units

/// Creates [`ThreadUnit`]s. This is the runner's default factory.
#[derive(Debug, Clone)]
pub struct ThreadUnits {
    /// Thread name prefix. Unit `i` runs on a thread named `{name}-{i}`.
    name: Cow<'static, str>,
}

impl ThreadUnits {
    pub fn new() -> ThreadUnits {
        ThreadUnits::named(DEFAULT_NAME)
    }

    pub fn named(name: impl Into<Cow<'static, str>>) -> ThreadUnits {
        ThreadUnits { name: name.into() }
    }
}

impl Default for ThreadUnits {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitFactory for ThreadUnits {
    type Unit = ThreadUnit;

    fn create<F>(&self, index: usize, body: F) -> ThreadUnit
    where
        F: FnOnce() + Send + 'static,
    {
        ThreadUnit {
            index,
            name: format!("{}-{}", self.name, index),
            body: Some(Box::new(body)),
            handle: None,
            done: Arc::new(LockLatch::new()),
            state: UnitState::Created,
            status: None,
        }
    }
}

/// A worker running on its own OS thread.
///
/// Thread units share the address space with the runner, so a worker that
/// aborts the process is not contained, and a running thread cannot be killed.
/// Terminating a running thread unit records it as terminated and then blocks
/// until its body returns, so a hung worker blocks the run that owns it.
/// Workers that need to stop early should watch a latch passed in through the
/// runner's arguments. Use `ProcessUnit` when a worker must be stoppable from
/// the outside.
pub struct ThreadUnit {
    index: usize,
    name: String,
    body: Option<Box<dyn FnOnce() + Send + 'static>>,
    handle: Option<JoinHandle<()>>,
    /// Opened by the worker thread when its body returns or unwinds.
    done: Arc<LockLatch>,
    state: UnitState,
    status: Option<UnitStatus>,
}

impl ThreadUnit {
    /// The name of the thread this unit runs on.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reaps the finished thread and records how it ended. The caller must
    /// have observed the `done` latch open.
    fn finish(&mut self) -> UnitStatus {
        let status = match self.handle.take().map(JoinHandle::join) {
            Some(Ok(())) | None => UnitStatus::Completed,
            Some(Err(payload)) => UnitStatus::Failed {
                reason: panic_message(payload.as_ref()),
            },
        };
        self.state = UnitState::Completed;
        self.status = Some(status.clone());
        status
    }
}

impl ConcurrentUnit for ThreadUnit {
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

        let done = Arc::clone(&self.done);
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                // Opens the latch even if the body unwinds, so joins never
                // wait on a thread that is already gone.
                let _done = CallOnDrop(|| done.set());
                body();
            })
            .map_err(|source| Error::Spawn {
                index: self.index,
                source,
            })?;

        self.handle = Some(handle);
        self.state = UnitState::Running;
        Ok(())
    }

    fn join(&mut self, timeout: Option<Duration>) -> Result<Option<UnitStatus>> {
        match self.state {
            UnitState::Created => Err(Error::join(self.index, "unit was never started")),
            UnitState::Completed | UnitState::Terminated => Ok(self.status.clone()),
            UnitState::Running => {
                match timeout {
                    None => self.done.wait(),
                    Some(timeout) => {
                        if !self.done.wait_timeout(timeout) {
                            return Ok(None);
                        }
                    }
                }
                Ok(Some(self.finish()))
            }
        }
    }

    fn terminate(&mut self) {
        match self.state {
            UnitState::Completed | UnitState::Terminated => {}
            UnitState::Created => {
                self.body = None;
                self.state = UnitState::Terminated;
                self.status = Some(UnitStatus::Terminated);
            }
            UnitState::Running => {
                if self.done.probe() {
                    // Finished after the last join; nothing to stop.
                    self.finish();
                    return;
                }
                warn!(
                    index = self.index,
                    thread = %self.name,
                    "thread unit is still running; waiting for it to return"
                );
                self.state = UnitState::Terminated;
                self.status = Some(UnitStatus::Terminated);
                self.done.wait();
                if let Some(Err(payload)) = self.handle.take().map(JoinHandle::join) {
                    debug!(
                        index = self.index,
                        reason = %panic_message(payload.as_ref()),
                        "terminated thread unit panicked"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn runs_body_and_completes() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut unit = {
            let hits = Arc::clone(&hits);
            ThreadUnits::named("test").create(3, move || {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        assert_eq!(unit.name(), "test-3");
        assert_eq!(unit.state(), UnitState::Created);

        unit.start().unwrap();
        assert_eq!(unit.join(None).unwrap(), Some(UnitStatus::Completed));
        assert_eq!(unit.state(), UnitState::Completed);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Terminating a completed unit changes nothing.
        unit.terminate();
        assert_eq!(unit.state(), UnitState::Completed);
        assert_eq!(unit.status(), Some(UnitStatus::Completed));
    }

    #[test]
    fn panic_is_reported_as_failure() {
        let mut unit = ThreadUnits::new().create(0, || panic!("bad chunk"));
        unit.start().unwrap();
        assert_eq!(
            unit.join(None).unwrap(),
            Some(UnitStatus::Failed {
                reason: "bad chunk".to_owned()
            })
        );
    }

    #[test]
    fn terminate_waits_for_a_running_body() {
        let release = Arc::new(LockLatch::new());
        let finished = Arc::new(AtomicUsize::new(0));
        let mut unit = {
            let release = Arc::clone(&release);
            let finished = Arc::clone(&finished);
            ThreadUnits::new().create(0, move || {
                release.wait();
                finished.fetch_add(1, Ordering::SeqCst);
            })
        };
        unit.start().unwrap();

        assert_eq!(unit.join(Some(Duration::from_millis(20))).unwrap(), None);
        assert_eq!(unit.state(), UnitState::Running);

        let releaser = {
            let release = Arc::clone(&release);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                release.set();
            })
        };
        unit.terminate();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(unit.state(), UnitState::Terminated);
        assert_eq!(unit.status(), Some(UnitStatus::Terminated));
        assert_eq!(unit.join(None).unwrap(), Some(UnitStatus::Terminated));

        releaser.join().unwrap();
    }

    #[test]
    fn unstarted_unit() {
        let mut unit = ThreadUnits::new().create(1, || {});
        assert!(matches!(unit.join(None), Err(Error::Join { index: 1, .. })));
        unit.terminate();
        assert_eq!(unit.state(), UnitState::Terminated);
        // A terminated unit can't be started again.
        unit.start().unwrap();
        assert_eq!(unit.state(), UnitState::Terminated);
    }
}
