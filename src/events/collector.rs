//! Event collector task
//!
//! Maintains a connection to the event source, reads newline-delimited JSON
//! records, and feeds parsed events into the shared ring buffer. Connection
//! loss triggers reconnection with exponential backoff; malformed lines are
//! counted and dropped without disturbing the stream.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::config::EventsConfig;
use crate::events::{parse_line, EventBuffer, S3OperationEvent};
use crate::metrics;
use crate::utils::{truncate_text, Backoff};

/// Longest prefix of a malformed line worth logging
const LOG_LINE_MAX: usize = 200;

/// Byte cap on a single access-log line; anything longer is dropped
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Buffered reader over some line-oriented byte stream
pub type BoxedLineReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// A reconnectable source of event lines
///
/// The production source is a TCP endpoint; tests script readers over
/// in-memory byte buffers.
#[async_trait]
pub trait LineSource: Send + Sync {
    /// Establish a fresh connection to the source
    async fn connect(&self) -> io::Result<BoxedLineReader>;

    /// Human-readable source description for logs
    fn describe(&self) -> String;
}

/// Line source backed by a TCP connection
pub struct TcpLineSource {
    addr: String,
}

impl TcpLineSource {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl LineSource for TcpLineSource {
    async fn connect(&self) -> io::Result<BoxedLineReader> {
        let stream = TcpStream::connect(&self.addr).await?;
        Ok(Box::new(BufReader::new(stream)))
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}

/// Why a read session ended
enum ReadEnd {
    /// Stream hit EOF or a read error; reconnect
    Disconnected,
    /// Shutdown signal flipped; stop for good
    Shutdown,
}

/// Outcome of one bounded line read
#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    /// A complete line, newline stripped
    Line,
    /// The line exceeded the byte cap and was discarded
    Oversized,
    /// The stream ended
    Eof,
}

/// Read one newline-terminated line into `line`, bounded by `max_bytes`.
///
/// `read_line` appends until a newline or EOF with no length bound, so a
/// source that streams bytes without newlines would grow the buffer without
/// limit. This walks the buffered chunks directly: once an unterminated
/// line passes the cap its bytes are discarded, but input is still consumed
/// up to the next newline so the stream stays in sync. Invalid UTF-8 is
/// replaced rather than treated as a stream error; the parser rejects the
/// line downstream.
async fn read_line_capped(
    reader: &mut BoxedLineReader,
    line: &mut String,
    max_bytes: usize,
) -> io::Result<LineRead> {
    line.clear();
    let mut bytes: Vec<u8> = Vec::new();
    let mut oversized = false;
    let mut eof = false;

    loop {
        let (consumed, done) = {
            let chunk = reader.fill_buf().await?;
            if chunk.is_empty() {
                // EOF; a trailing unterminated line still counts
                eof = true;
                (0, true)
            } else {
                match chunk.iter().position(|&b| b == b'\n') {
                    Some(pos) => {
                        if !oversized {
                            bytes.extend_from_slice(&chunk[..pos]);
                        }
                        (pos + 1, true)
                    }
                    None => {
                        if !oversized {
                            bytes.extend_from_slice(chunk);
                        }
                        (chunk.len(), false)
                    }
                }
            }
        };
        if bytes.len() > max_bytes {
            oversized = true;
            bytes.clear();
        }
        reader.consume(consumed);
        if done {
            break;
        }
    }

    if oversized {
        Ok(LineRead::Oversized)
    } else if eof && bytes.is_empty() {
        Ok(LineRead::Eof)
    } else {
        *line = String::from_utf8_lossy(&bytes).into_owned();
        Ok(LineRead::Line)
    }
}

/// Ingests event lines and serves queries over the buffered feed
pub struct EventCollector {
    buffer: RwLock<EventBuffer>,
    total_ingested: AtomicU64,
    total_dropped: AtomicU64,
    config: EventsConfig,
}

impl EventCollector {
    pub fn new(config: EventsConfig) -> Self {
        Self {
            buffer: RwLock::new(EventBuffer::new(config.buffer_capacity)),
            total_ingested: AtomicU64::new(0),
            total_dropped: AtomicU64::new(0),
            config,
        }
    }

    /// Parse one wire line and buffer the event
    ///
    /// Blank lines are ignored. Malformed lines increment the drop counter
    /// and leave the buffer untouched.
    pub async fn ingest_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        match parse_line(line, &self.config.source_label) {
            Ok(event) => {
                let len = {
                    let mut buffer = self.buffer.write().await;
                    buffer.push(event);
                    buffer.len()
                };
                self.total_ingested.fetch_add(1, Ordering::Relaxed);
                metrics::record_event_ingested();
                metrics::update_event_buffer_size(len);
            }
            Err(e) => {
                self.total_dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_event_dropped();
                debug!(
                    "Dropping malformed event line ({}): {}",
                    e,
                    truncate_text(line, LOG_LINE_MAX)
                );
            }
        }
    }

    /// Buffered events with a timestamp strictly after the cutoff
    pub async fn since(&self, cutoff: DateTime<Utc>) -> Vec<S3OperationEvent> {
        self.buffer.read().await.since(cutoff)
    }

    /// All buffered events in arrival order
    pub async fn snapshot(&self) -> Vec<S3OperationEvent> {
        self.buffer.read().await.snapshot()
    }

    /// Number of events currently buffered
    pub async fn buffered(&self) -> usize {
        self.buffer.read().await.len()
    }

    /// Events accepted since startup
    pub fn total_ingested(&self) -> u64 {
        self.total_ingested.load(Ordering::Relaxed)
    }

    /// Malformed lines dropped since startup
    pub fn total_dropped(&self) -> u64 {
        self.total_dropped.load(Ordering::Relaxed)
    }

    /// Drive the collect loop until shutdown
    ///
    /// Connects to the source, reads lines until the stream ends, then
    /// reconnects. Backoff grows on consecutive connect failures and resets
    /// once a connection is established.
    pub async fn run(
        self: Arc<Self>,
        source: Arc<dyn LineSource>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut backoff = Backoff::new(
            self.config.reconnect_base_delay(),
            self.config.reconnect_max_delay(),
        );
        info!("Event collector connecting to {}", source.describe());

        loop {
            tokio::select! {
                connected = source.connect() => {
                    match connected {
                        Ok(reader) => {
                            info!("Event source {} connected", source.describe());
                            backoff.reset();
                            match self.read_lines(reader, &mut shutdown).await {
                                ReadEnd::Shutdown => return,
                                ReadEnd::Disconnected => {
                                    let delay = backoff.next_delay();
                                    warn!(
                                        "Event source {} disconnected, reconnecting in {:?}",
                                        source.describe(),
                                        delay
                                    );
                                    tokio::select! {
                                        _ = tokio::time::sleep(delay) => {}
                                        _ = shutdown.changed() => return,
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            let delay = backoff.next_delay();
                            warn!(
                                "Event source {} unavailable ({}), retrying in {:?}",
                                source.describe(),
                                e,
                                delay
                            );
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = shutdown.changed() => return,
                            }
                        }
                    }
                }
                _ = shutdown.changed() => return,
            }
        }
    }

    async fn read_lines(
        &self,
        mut reader: BoxedLineReader,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ReadEnd {
        let mut line = String::new();
        loop {
            tokio::select! {
                read = read_line_capped(&mut reader, &mut line, MAX_LINE_BYTES) => {
                    match read {
                        Ok(LineRead::Line) => self.ingest_line(&line).await,
                        Ok(LineRead::Oversized) => self.drop_oversized_line(),
                        Ok(LineRead::Eof) => return ReadEnd::Disconnected,
                        Err(e) => {
                            warn!("Event source read error: {}", e);
                            return ReadEnd::Disconnected;
                        }
                    }
                }
                _ = shutdown.changed() => return ReadEnd::Shutdown,
            }
        }
    }

    /// Count a line discarded before it could be parsed
    fn drop_oversized_line(&self) {
        self.total_dropped.fetch_add(1, Ordering::Relaxed);
        metrics::record_event_dropped();
        warn!("Dropping event line longer than {} bytes", MAX_LINE_BYTES);
    }
}
