//! Receiving side of the network sink.
//!
//! [`StreamListener`] accepts remote sessions on a TCP port; each accepted
//! connection becomes a [`RemoteStream`] that yields decoded events. Bytes
//! that do not form valid records are skipped by the stream decoder.

use std::io;
use std::net::SocketAddr;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info};
use trackme_core::{Event, RecordDecoder};

/// Default port of the desktop receiver.
pub const DEFAULT_LISTEN_PORT: u16 = 50000;

const READ_CAPACITY: usize = 4096;

/// TCP listener for incoming record streams.
#[derive(Debug)]
pub struct StreamListener {
    listener: TcpListener,
}

impl StreamListener {
    /// Bind to `addr`.
    pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "Listening for record streams");
        Ok(Self { listener })
    }

    /// Bound address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Wait for the next session.
    pub async fn accept(&self) -> io::Result<RemoteStream> {
        let (stream, peer) = self.listener.accept().await?;
        info!(%peer, "Session connected");
        Ok(RemoteStream::new(stream, peer))
    }

    /// Accept a connection and close it straight away.
    ///
    /// Used while a session is active; returns the rejected peer.
    pub async fn reject_next(&self) -> io::Result<SocketAddr> {
        let (stream, peer) = self.listener.accept().await?;
        drop(stream);
        Ok(peer)
    }
}

/// One connected sender.
#[derive(Debug)]
pub struct RemoteStream {
    stream: TcpStream,
    peer: SocketAddr,
    decoder: RecordDecoder,
    scratch: BytesMut,
}

impl RemoteStream {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            decoder: RecordDecoder::new(),
            scratch: BytesMut::with_capacity(READ_CAPACITY),
        }
    }

    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Bytes skipped so far while resynchronising.
    pub fn skipped_bytes(&self) -> u64 {
        self.decoder.skipped()
    }

    /// Next decoded event, or `None` once the sender has disconnected.
    ///
    /// Cancel safe: no bytes are lost if the future is dropped.
    pub async fn next_event(&mut self) -> io::Result<Option<Event>> {
        loop {
            if let Some(event) = self.decoder.next_event() {
                return Ok(Some(event));
            }

            self.scratch.clear();
            self.scratch.reserve(READ_CAPACITY);
            let read = self.stream.read_buf(&mut self.scratch).await?;
            if read == 0 {
                if self.decoder.pending() > 0 {
                    debug!(peer = %self.peer, pending = self.decoder.pending(), "Partial record at disconnect");
                }
                return Ok(None);
            }
            self.decoder.extend(&self.scratch);
        }
    }
}
