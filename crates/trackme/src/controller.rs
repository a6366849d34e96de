//! Recording session lifecycle.
//!
//! A session wires one producer to the configured sinks through a fresh event
//! queue:
//!
//! 1. any running session is stopped
//! 2. the queue is created and every sink opened (failures end `start` here)
//! 3. the sink runner is spawned on the tokio runtime
//! 4. after the start delay the producer starts on its own thread
//!
//! [`RecordingController::stop`] stops the producer, which enqueues Stop, and
//! waits for the runner to drain and close the sinks.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use trackme_core::{event_queue, PipelineError, Producer, QueuePolicy, Result};
use trackme_storage::{RunSummary, SinkRunner};

use crate::config::{OutputConfig, TrackmeConfig};

struct Session {
    producer: Box<dyn Producer>,
    runner: JoinHandle<Result<RunSummary>>,
    done: watch::Receiver<bool>,
}

/// Starts and stops recording sessions.
///
/// All methods take `&self`; share the controller through an `Arc` to stop a
/// session from another task.
pub struct RecordingController {
    queue: QueuePolicy,
    start_delay: Duration,
    output: Mutex<OutputConfig>,
    session: AsyncMutex<Option<Session>>,
}

impl fmt::Debug for RecordingController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingController")
            .field("queue", &self.queue)
            .field("start_delay", &self.start_delay)
            .field("output", &*self.output.lock())
            .finish_non_exhaustive()
    }
}

impl RecordingController {
    /// Controller with no sinks configured yet.
    pub fn new(queue: QueuePolicy, start_delay: Duration) -> Self {
        Self {
            queue,
            start_delay,
            output: Mutex::new(OutputConfig::default()),
            session: AsyncMutex::new(None),
        }
    }

    /// Controller set up from the `[queue]`, `[controller]` and `[output]`
    /// sections.
    pub fn from_config(config: &TrackmeConfig) -> Self {
        let controller = Self::new(config.queue, config.controller.start_delay);
        controller.configure(config.output.clone());
        controller
    }

    /// Replace the sink configuration used by the next [`start`](Self::start).
    pub fn configure(&self, output: OutputConfig) {
        *self.output.lock() = output;
    }

    /// Start a session with `producer`.
    ///
    /// A running session is stopped first; its outcome is logged, not
    /// returned. Sink open failures are returned before the producer is
    /// touched.
    #[instrument(skip_all, fields(producer = producer.name()))]
    pub async fn start<P>(&self, producer: P) -> Result<()>
    where
        P: Producer + 'static,
    {
        let mut slot = self.session.lock().await;
        if let Some(previous) = slot.take() {
            info!("Stopping the running session first");
            if let Err(e) = teardown(previous).await {
                warn!(error = %e, "Previous session ended with an error");
            }
        }

        let runner = self.build_runner();
        let active = runner.open().await?;
        let (tx, rx) = event_queue(self.queue);
        let (done_tx, done) = watch::channel(false);
        let runner = tokio::spawn(async move {
            let outcome = active.run(rx).await;
            done_tx.send_replace(true);
            outcome
        });

        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }

        let mut producer: Box<dyn Producer> = Box::new(producer);
        if let Err(e) = producer.start(tx) {
            // The queue went down with the failed start; the runner closes its sinks.
            if let Ok(Err(runner_error)) = runner.await {
                warn!(error = %runner_error, "Runner closed after failed start");
            }
            return Err(e);
        }

        info!(queue = ?self.queue, "Session started");
        *slot = Some(Session {
            producer,
            runner,
            done,
        });
        Ok(())
    }

    /// Stop the running session and return the runner's outcome.
    ///
    /// Returns `None` when no session is running, so repeated or concurrent
    /// calls are harmless: only one of them performs the teardown.
    pub async fn stop(&self) -> Option<Result<RunSummary>> {
        let session = self.session.lock().await.take()?;
        Some(teardown(session).await)
    }

    /// Resolve once the runner of the current session has ended on its own,
    /// after an exhausted producer sent Stop or a sink failed.
    ///
    /// Resolves immediately when no session is running.
    pub async fn finished(&self) {
        let done = self.session.lock().await.as_ref().map(|s| s.done.clone());
        if let Some(mut done) = done {
            // A dropped sender also means the runner task is gone.
            let _ = done.wait_for(|finished| *finished).await;
        }
    }

    /// Whether a session is running and its runner is still draining.
    pub async fn is_recording(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !*s.done.borrow())
    }

    fn build_runner(&self) -> SinkRunner {
        let output = self.output.lock();
        let mut runner = SinkRunner::new();
        if let Some(file) = &output.file {
            runner.set_file(&file.directory, file.name.clone());
        }
        if let Some(network) = &output.network {
            runner
                .set_network(&network.host, network.port)
                .set_connect_timeout(network.connect_timeout);
        }
        runner
    }
}

/// Stop the producer, then wait for the runner.
///
/// `Producer::stop` joins the producer thread, which may block on a full
/// bounded queue until the runner drains it, so it runs on the blocking pool.
async fn teardown(session: Session) -> Result<RunSummary> {
    let Session {
        mut producer,
        runner,
        ..
    } = session;
    let name = producer.name().to_string();

    let stopped = tokio::task::spawn_blocking(move || producer.stop())
        .await
        .map_err(|e| PipelineError::Task(format!("stopping producer '{name}': {e}")))?;

    let outcome = runner
        .await
        .map_err(|e| PipelineError::Task(format!("sink runner: {e}")))?;

    match (outcome, stopped) {
        (Err(e), Err(stop_error)) => {
            warn!(producer = %name, error = %stop_error, "Producer stop failed");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(_), Err(stop_error)) => Err(stop_error),
        (Ok(summary), Ok(())) => {
            info!(producer = %name, events = summary.events, "Session finished");
            Ok(summary)
        }
    }
}
