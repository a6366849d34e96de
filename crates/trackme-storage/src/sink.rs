//! Output sinks.
//!
//! A sink receives encoded 25-byte records in stream order. The two built-in
//! sinks emit identical bytes:
//!
//! - [`FileSink`]: appends to `<directory>/<name>`, creating the directory
//! - [`NetworkSink`]: one outbound TCP connection
//!
//! Anything else (test doubles, in-memory captures) implements
//! [`RecordSink`] and is handed to the runner already open.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info};
use trackme_core::{PipelineError, Result, RECORD_SIZE};

/// Connect timeout used when none is configured.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A destination for encoded records.
#[async_trait]
pub trait RecordSink: Send {
    /// Human-readable description used in logs and errors.
    fn describe(&self) -> String;

    /// Write one record.
    async fn write_record(&mut self, record: &[u8; RECORD_SIZE]) -> io::Result<()>;

    /// Flush buffered bytes and release the underlying resource.
    async fn close(&mut self) -> io::Result<()>;
}

/// Default recording name: `<unix-millis>.sns`.
pub fn default_file_name() -> String {
    format!("{}.sns", chrono::Utc::now().timestamp_millis())
}

/// File sink settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    /// Directory that receives the recording (created if absent)
    pub directory: PathBuf,
    /// File name; defaults to `<unix-millis>.sns` when opened
    #[serde(default)]
    pub name: Option<String>,
}

/// Network sink settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Remote host name or address
    pub host: String,
    /// Remote TCP port
    pub port: u16,
    /// Upper bound on connection establishment
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

impl fmt::Display for NetworkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Appends records to a local file.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    /// Create the directory if needed and open `<directory>/<name>` for append.
    pub async fn open(directory: impl AsRef<Path>, name: &str) -> Result<Self> {
        let directory = directory.as_ref();
        let path = directory.join(name);
        let sink_open = |source| PipelineError::SinkOpen {
            sink: format!("file {}", path.display()),
            source,
        };

        fs::create_dir_all(directory).await.map_err(sink_open)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(sink_open)?;

        info!(path = %path.display(), "Opened file sink");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Path being written.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for FileSink {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    async fn write_record(&mut self, record: &[u8; RECORD_SIZE]) -> io::Result<()> {
        self.writer.write_all(record).await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.writer.flush().await?;
        self.writer.get_ref().sync_data().await?;
        debug!(path = %self.path.display(), "Closed file sink");
        Ok(())
    }
}

/// Streams records over one outbound TCP connection.
#[derive(Debug)]
pub struct NetworkSink {
    peer: SocketAddr,
    stream: TcpStream,
}

impl NetworkSink {
    /// Connect, giving up after `timeout`.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let sink_open = |source| PipelineError::SinkOpen {
            sink: format!("network {host}:{port}"),
            source,
        };

        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                sink_open(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {timeout:?}"),
                ))
            })?
            .map_err(sink_open)?;
        stream.set_nodelay(true).map_err(sink_open)?;
        let peer = stream.peer_addr().map_err(sink_open)?;

        info!(%peer, "Connected network sink");
        Ok(Self { peer, stream })
    }

    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait]
impl RecordSink for NetworkSink {
    fn describe(&self) -> String {
        format!("network {}", self.peer)
    }

    async fn write_record(&mut self, record: &[u8; RECORD_SIZE]) -> io::Result<()> {
        self.stream.write_all(record).await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.stream.flush().await?;
        self.stream.shutdown().await?;
        debug!(peer = %self.peer, "Closed network sink");
        Ok(())
    }
}
