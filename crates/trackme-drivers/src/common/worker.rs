//! Sampling-thread lifecycle shared by every producer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::error;
use trackme_core::{PipelineError, Result};

/// One dedicated OS thread plus its run flag.
///
/// The thread body receives the flag and should exit its loop once the flag
/// is cleared. The flag is also cleared when the body returns on its own, so
/// [`is_running`](Self::is_running) reflects a source that ran dry.
#[derive(Debug)]
pub(crate) struct Worker<T> {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<T>>,
}

impl<T: Send + 'static> Worker<T> {
    pub(crate) fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether a thread exists that has not been joined yet.
    pub(crate) fn is_spawned(&self) -> bool {
        self.handle.is_some()
    }

    pub(crate) fn spawn<F>(&mut self, producer: &str, body: F) -> Result<()>
    where
        F: FnOnce(Arc<AtomicBool>) -> T + Send + 'static,
    {
        if self.handle.is_some() {
            return Err(PipelineError::producer(producer, "already started"));
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let spawned = thread::Builder::new()
            .name(format!("trackme-{producer}"))
            .spawn(move || {
                let output = body(Arc::clone(&running));
                running.store(false, Ordering::SeqCst);
                output
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(PipelineError::producer(
                    producer,
                    format!("failed to spawn sampling thread: {e}"),
                ))
            }
        }
    }

    /// Clear the run flag without waiting.
    pub(crate) fn signal_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Clear the run flag and wait for the thread.
    ///
    /// Returns the thread's output, or `None` if no thread was running or it
    /// panicked.
    pub(crate) fn stop(&mut self, producer: &str) -> Option<T> {
        self.signal_stop();
        self.join(producer)
    }

    /// Wait for the thread without touching the run flag.
    pub(crate) fn join(&mut self, producer: &str) -> Option<T> {
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(output) => Some(output),
            Err(e) => {
                error!(producer, "Sampling thread panicked: {:?}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_stop_joins_and_returns_output() {
        let mut worker = Worker::new();
        worker
            .spawn("test", |running| {
                let mut spins = 0u32;
                while running.load(Ordering::SeqCst) {
                    spins += 1;
                    thread::sleep(Duration::from_millis(1));
                }
                spins
            })
            .unwrap();
        assert!(worker.is_running());

        thread::sleep(Duration::from_millis(20));
        let spins = worker.stop("test").unwrap();
        assert!(spins > 0);
        assert!(!worker.is_running());
        assert!(worker.stop("test").is_none());
    }

    #[test]
    fn test_flag_clears_when_body_returns() {
        let mut worker = Worker::new();
        worker.spawn("test", |_| 7).unwrap();
        assert_eq!(worker.join("test"), Some(7));
        assert!(!worker.is_running());
    }

    #[test]
    fn test_second_spawn_rejected_until_joined() {
        let mut worker = Worker::new();
        worker.spawn("test", |_| ()).unwrap();
        assert!(worker.spawn("test", |_| ()).is_err());
        worker.join("test");
        assert!(worker.spawn("test", |_| ()).is_ok());
        worker.join("test");
    }
}
