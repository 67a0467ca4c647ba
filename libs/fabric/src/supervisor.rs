//! Supervised background threads.
//!
//! Every thread receives the supervisor's cancellation token and returns a
//! `Result`. A thread that fails or panics is logged, recorded and cancels the
//! token so its siblings wind down; the owner collects the failure on
//! [`Supervisor::join`] instead of the process aborting.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct Supervisor {
    token: CancellationToken,
    threads: Mutex<Vec<JoinHandle<()>>>,
    failures: Arc<Mutex<Vec<Error>>>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            threads: Mutex::new(Vec::new()),
            failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn a named thread running `task` with a clone of the token
    pub fn spawn<F>(&self, name: impl Into<String>, task: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Result<()> + Send + 'static,
    {
        let name = name.into();
        let token = self.token.clone();
        let failures = Arc::clone(&self.failures);
        let thread_name = name.clone();

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| task(token.clone())));
                let failure = match outcome {
                    Ok(Ok(())) => {
                        tracing::debug!(thread = %thread_name, "thread finished");
                        return;
                    }
                    Ok(Err(source)) => Error::ThreadFailed {
                        thread: thread_name,
                        source: Box::new(source),
                    },
                    Err(payload) => Error::ThreadPanicked {
                        thread: thread_name,
                        message: panic_message(payload.as_ref()),
                    },
                };
                tracing::error!(error = %failure, "background thread failed");
                failures.lock().push(failure);
                token.cancel();
            })
            .map_err(|e| Error::setup("failed to spawn thread", e))?;

        self.threads.lock().push(handle);
        Ok(())
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn has_failed(&self) -> bool {
        !self.failures.lock().is_empty()
    }

    /// Description of the first recorded failure
    pub fn failure(&self) -> Option<String> {
        self.failures.lock().first().map(|e| e.to_string())
    }

    /// Join every thread spawned so far and hand back the first failure.
    ///
    /// A supervised thread calling this skips joining itself.
    pub fn join(&self) -> Result<()> {
        let handles: Vec<_> = self.threads.lock().drain(..).collect();
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            // panics are caught inside the thread, so join only fails if
            // unwinding itself went wrong
            if handle.join().is_err() {
                tracing::error!("supervised thread could not be joined");
            }
        }

        let mut failures = self.failures.lock();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures.remove(0))
        }
    }

    /// Cancel, then [`join`](Self::join)
    pub fn shutdown(&self) -> Result<()> {
        self.cancel();
        self.join()
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        // threads not joined by now are detached; make sure they wind down
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn clean_threads_join_ok() {
        let supervisor = Supervisor::new();
        supervisor
            .spawn("worker", |token| {
                while !token.is_cancelled() {
                    thread::sleep(Duration::from_millis(5));
                }
                Ok(())
            })
            .unwrap();
        supervisor.shutdown().unwrap();
        assert!(!supervisor.has_failed());
    }

    #[test]
    fn failure_is_reported_and_cancels_siblings() {
        let supervisor = Supervisor::new();
        supervisor
            .spawn("sibling", |token| {
                while !token.is_cancelled() {
                    thread::sleep(Duration::from_millis(5));
                }
                Ok(())
            })
            .unwrap();
        supervisor
            .spawn("io", |_| Err(Error::ConnectionClosed))
            .unwrap();

        // the sibling only exits because the failure cancelled the token
        match supervisor.join() {
            Err(Error::ThreadFailed { thread, source }) => {
                assert_eq!(thread, "io");
                assert!(matches!(*source, Error::ConnectionClosed));
            }
            other => panic!("expected ThreadFailed, got {other:?}"),
        }
        assert!(supervisor.is_cancelled());
    }

    #[test]
    fn panics_are_captured() {
        let supervisor = Supervisor::new();
        supervisor
            .spawn("boom", |_| -> Result<()> { panic!("kaboom") })
            .unwrap();
        match supervisor.join() {
            Err(Error::ThreadPanicked { thread, message }) => {
                assert_eq!(thread, "boom");
                assert_eq!(message, "kaboom");
            }
            other => panic!("expected ThreadPanicked, got {other:?}"),
        }
    }
}
