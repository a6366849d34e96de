//! Records one remote session to a file.
//!
//! The recorder waits for a sender to connect and transmit Start, then writes
//! Start, every following record and the closing Stop to a [`FileSink`]. While
//! the session is active further connections are accepted and closed at once,
//! so only one sender is served at a time. A sender that disconnects before
//! Stop leaves a truncated session; the recorder appends a Stop record so the
//! file is still a well-terminated stream.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, warn};
use trackme_core::{encode, Event, EventKind, PipelineError, Result};

use crate::listener::{RemoteStream, StreamListener};
use crate::sink::{default_file_name, FileSink, RecordSink};

/// Outcome of one recorded session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordingSummary {
    /// File the session was written to
    pub path: PathBuf,
    /// Sender address
    pub peer: SocketAddr,
    /// Records written, Start and Stop included
    pub records: u64,
    /// Whether the sender disconnected before Stop
    pub truncated: bool,
    /// Bytes skipped while resynchronising
    pub skipped_bytes: u64,
    /// Connections refused while the session was active
    pub rejected: u64,
}

/// Writes the next remote session to `<directory>/<name>`.
#[derive(Debug, Clone)]
pub struct SessionRecorder {
    directory: PathBuf,
    name: Option<String>,
}

impl SessionRecorder {
    /// Record into `directory` using the default `<unix-millis>.sns` name.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            name: None,
        }
    }

    /// Use a fixed file name instead of the timestamped default.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Accept senders until one transmits Start, then record that session.
    ///
    /// Senders that disconnect before Start are skipped and the recorder goes
    /// back to accepting.
    pub async fn record(&self, listener: &StreamListener) -> Result<RecordingSummary> {
        loop {
            let mut remote = listener.accept().await.map_err(|e| {
                PipelineError::producer("listener", format!("accept failed: {e}"))
            })?;

            if wait_for_start(&mut remote).await {
                return self.record_session(listener, remote).await;
            }
            info!(peer = %remote.peer(), "Sender left before Start, waiting for the next one");
        }
    }

    async fn record_session(
        &self,
        listener: &StreamListener,
        mut remote: RemoteStream,
    ) -> Result<RecordingSummary> {
        let name = self.name.clone().unwrap_or_else(default_file_name);
        let mut file = FileSink::open(&self.directory, &name).await?;
        let path = file.path().to_path_buf();
        let peer = remote.peer();
        info!(%peer, path = %path.display(), "Recording session");

        let copied = copy_session(&mut file, listener, &mut remote).await?;
        let summary = RecordingSummary {
            path,
            peer,
            records: copied.records,
            truncated: copied.truncated,
            skipped_bytes: remote.skipped_bytes(),
            rejected: copied.rejected,
        };
        info!(?summary, "Recording finished");
        Ok(summary)
    }
}

#[derive(Debug, Default)]
struct Copied {
    records: u64,
    rejected: u64,
    truncated: bool,
}

/// Write the session from Start to Stop into `sink` and close it.
///
/// The sink is closed on every path. After a failed write the close is best
/// effort so records already buffered still reach the sink, and the write
/// error is the one returned.
async fn copy_session<S>(
    sink: &mut S,
    listener: &StreamListener,
    remote: &mut RemoteStream,
) -> Result<Copied>
where
    S: RecordSink + ?Sized,
{
    let mut copied = Copied::default();
    if let Err(e) = stream_records(sink, listener, remote, &mut copied).await {
        if let Err(close_error) = sink.close().await {
            warn!(sink = %sink.describe(), error = %close_error, "Close after failed write failed too");
        }
        warn!(sink = %sink.describe(), records = copied.records, "Recording aborted");
        return Err(e);
    }
    sink.close().await.map_err(|source| PipelineError::SinkWrite {
        sink: sink.describe(),
        source,
    })?;
    Ok(copied)
}

async fn stream_records<S>(
    sink: &mut S,
    listener: &StreamListener,
    remote: &mut RemoteStream,
    copied: &mut Copied,
) -> Result<()>
where
    S: RecordSink + ?Sized,
{
    let peer = remote.peer();
    write(sink, &Event::start(), &mut copied.records).await?;
    loop {
        tokio::select! {
            next = remote.next_event() => match next {
                Ok(Some(event)) if event.is_stop() => {
                    write(sink, &event, &mut copied.records).await?;
                    break;
                }
                Ok(Some(event)) if event.is_control() => {
                    debug!(%peer, kind = %event.kind(), "Ignoring repeated Start");
                }
                Ok(Some(event)) => write(sink, &event, &mut copied.records).await?,
                Ok(None) => {
                    copied.truncated = true;
                    break;
                }
                Err(e) => {
                    warn!(%peer, error = %e, "Session read failed");
                    copied.truncated = true;
                    break;
                }
            },
            incoming = listener.reject_next() => match incoming {
                Ok(other) => {
                    copied.rejected += 1;
                    warn!(%peer, rejected_peer = %other, "Session active, connection refused");
                }
                Err(e) => warn!(error = %e, "Accept failed during session"),
            },
        }
    }

    if copied.truncated {
        warn!(%peer, records = copied.records, "Sender disconnected before Stop, closing recording");
        write(sink, &Event::stop(), &mut copied.records).await?;
    }
    Ok(())
}

/// Drop everything up to the first Start. Returns `false` if the sender left.
async fn wait_for_start(remote: &mut RemoteStream) -> bool {
    loop {
        match remote.next_event().await {
            Ok(Some(event)) if event.kind() == EventKind::Start => return true,
            Ok(Some(event)) => {
                debug!(peer = %remote.peer(), kind = %event.kind(), "Discarding record before Start");
            }
            Ok(None) => return false,
            Err(e) => {
                warn!(peer = %remote.peer(), error = %e, "Read failed before Start");
                return false;
            }
        }
    }
}

async fn write<S>(sink: &mut S, event: &Event, records: &mut u64) -> Result<()>
where
    S: RecordSink + ?Sized,
{
    sink.write_record(&encode(event))
        .await
        .map_err(|source| PipelineError::SinkWrite {
            sink: sink.describe(),
            source,
        })?;
    *records += 1;
    Ok(())
}
