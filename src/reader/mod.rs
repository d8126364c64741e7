// src/reader/mod.rs - pull-based ingest of encoded audio into the consumer ring
pub mod transfer;

use std::io;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use bytes::{Buf, Bytes};

use crate::config::ReaderConfig;
use crate::core::{ComponentLogger, ConsumerBuffer, LogContext, ReaderError, ReaderResult, millis};
use crate::io::{Connector, NetworkSession, SessionConfig, UreqConnector};
use crate::types::{AudioReaderState, MediaFile, MediaFileType};

pub use transfer::TransferBuffer;

static READER_IDS: AtomicU64 = AtomicU64::new(1);

/// Bytes the next network read may request.
pub fn read_quota(transfer_capacity: usize, consumer_free: usize) -> usize {
    transfer_capacity.min(consumer_free)
}

/// A network step that received less than 3/4 of the staging capacity is
/// followed by the pacing delay.
pub fn needs_pacing(received: usize, transfer_capacity: usize) -> bool {
    received.saturating_mul(4) < transfer_capacity.saturating_mul(3)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub steps: u64,
    pub bytes_read: u64,
    pub bytes_forwarded: u64,
    pub bytes_dropped: u64,
    pub empty_reads: u64,
}

struct NetworkStream {
    session: Box<dyn NetworkSession>,
    url: String,
    content_length: Option<u64>,
    // Unforwarded bytes inside the staging buffer (retain_unwritten only)
    pending: Range<usize>,
    idle_reads: u32,
}

enum Source {
    Idle,
    File { remaining: Bytes },
    Network(NetworkStream),
    Done(AudioReaderState),
}

enum NetworkStep {
    Received(usize),
    Flushed,
    Complete,
    Failed(String),
}

/// Moves encoded audio from a memory buffer or an HTTP stream into a
/// shared [`ConsumerBuffer`], one bounded step per [`AudioReader::step`].
pub struct AudioReader {
    id: String,
    output: Arc<dyn ConsumerBuffer>,
    connector: Arc<dyn Connector>,
    config: ReaderConfig,
    transfer: TransferBuffer,
    source: Source,
    file_type: MediaFileType,
    stats: ReaderStats,
}

impl AudioReader {
    pub fn new(output: Arc<dyn ConsumerBuffer>, transfer_buffer_size: usize) -> Self {
        Self::with_config(
            output,
            ReaderConfig::default().with_transfer_buffer_size(transfer_buffer_size),
        )
    }

    pub fn with_config(output: Arc<dyn ConsumerBuffer>, config: ReaderConfig) -> Self {
        Self::with_connector(output, config, Arc::new(UreqConnector::new()))
    }

    pub fn with_connector(
        output: Arc<dyn ConsumerBuffer>,
        config: ReaderConfig,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let id = format!("reader-{}", READER_IDS.fetch_add(1, Ordering::Relaxed));
        Self {
            id,
            output,
            connector,
            transfer: TransferBuffer::new(config.transfer_buffer_size),
            config,
            source: Source::Idle,
            file_type: MediaFileType::None,
            stats: ReaderStats::default(),
        }
    }

    /// Starts streaming a memory-resident file. Any previous source is
    /// released first.
    pub fn start_file(&mut self, media_file: &MediaFile) -> ReaderResult<MediaFileType> {
        self.file_type = MediaFileType::None;
        self.transfer.allocate()?;

        self.cleanup_connection();
        self.stats = ReaderStats::default();
        self.source = Source::File {
            remaining: media_file.data.clone(),
        };
        self.file_type = media_file.file_type;

        self.info(&format!(
            "start file: {} bytes ({})",
            media_file.len(),
            media_file.file_type
        ));
        Ok(media_file.file_type)
    }

    /// Opens `uri` and prepares it for stepping. The media type comes from
    /// the suffix of the URL after redirects.
    pub fn start_url(&mut self, uri: &str) -> ReaderResult<MediaFileType> {
        self.file_type = MediaFileType::None;
        self.transfer.allocate()?;

        self.cleanup_connection();
        self.source = Source::Idle;
        self.stats = ReaderStats::default();

        if uri.is_empty() {
            return Err(ReaderError::invalid_argument("uri must not be empty"));
        }

        let session_config = SessionConfig::for_url(uri, &self.config);
        let mut session = self.connector.open(&session_config).inspect_err(|e| {
            self.warn(&format!("open {} failed: {}", uri, e));
        })?;

        let (file_type, content_length, url) = match self.prepare_session(session.as_mut()) {
            Ok(prepared) => prepared,
            Err(e) => {
                session.close();
                self.warn(&format!("start {} failed: {}", uri, e));
                return Err(e);
            }
        };

        self.source = Source::Network(NetworkStream {
            session,
            url,
            content_length,
            pending: 0..0,
            idle_reads: 0,
        });
        self.file_type = file_type;

        self.info(&format!(
            "start url: {} ({}, length={:?}, read timeout {}ms)",
            uri,
            file_type,
            content_length,
            millis(self.config.stream_read_timeout())
        ));
        Ok(file_type)
    }

    fn prepare_session(
        &self,
        session: &mut dyn NetworkSession,
    ) -> ReaderResult<(MediaFileType, Option<u64>, String)> {
        let content_length = session.fetch_headers()?;
        let url = session.resolved_url()?;

        let file_type = MediaFileType::from_url(&url);
        if !file_type.is_supported() {
            return Err(ReaderError::unsupported_format(url));
        }

        session.set_read_timeout(self.config.stream_read_timeout())?;
        Ok((file_type, content_length, url))
    }

    /// Performs one bounded unit of transfer work.
    pub fn step(&mut self) -> AudioReaderState {
        self.stats.steps += 1;
        match self.source {
            Source::Idle => {
                self.trace("step without source");
                AudioReaderState::Failed
            }
            Source::Done(state) => state,
            Source::File { .. } => self.file_step(),
            Source::Network(_) => self.http_step(),
        }
    }

    fn file_step(&mut self) -> AudioReaderState {
        let Source::File { remaining } = &mut self.source else {
            return AudioReaderState::Failed;
        };
        if remaining.is_empty() {
            return self.finish(AudioReaderState::Finished);
        }

        let written = self
            .output
            .write_without_replacement(&remaining[..], self.config.read_write_timeout());
        remaining.advance(written);
        self.stats.bytes_read += written as u64;
        self.stats.bytes_forwarded += written as u64;

        AudioReaderState::Reading
    }

    fn http_step(&mut self) -> AudioReaderState {
        let capacity = self.transfer.capacity();
        let outcome = match &mut self.source {
            Source::Network(stream) => advance_network(
                stream,
                &mut self.transfer,
                self.output.as_ref(),
                &self.config,
                &mut self.stats,
            ),
            _ => return AudioReaderState::Failed,
        };

        match outcome {
            NetworkStep::Complete => self.finish(AudioReaderState::Finished),
            NetworkStep::Failed(reason) => {
                self.warn(&reason);
                self.finish(AudioReaderState::Failed)
            }
            NetworkStep::Flushed => AudioReaderState::Reading,
            NetworkStep::Received(received) => {
                if needs_pacing(received, capacity) {
                    thread::sleep(self.config.pacing_delay());
                }
                AudioReaderState::Reading
            }
        }
    }

    fn finish(&mut self, state: AudioReaderState) -> AudioReaderState {
        self.cleanup_connection();
        self.source = Source::Done(state);

        let stats = &self.stats;
        let summary = format!(
            "{:?} after {} steps: forwarded={} dropped={}",
            state, stats.steps, stats.bytes_forwarded, stats.bytes_dropped
        );
        match state {
            AudioReaderState::Failed => self.warn(&summary),
            _ => self.info(&summary),
        }
        state
    }

    /// Releases the network session, if any. Returns whether one was open.
    fn cleanup_connection(&mut self) -> bool {
        if !matches!(self.source, Source::Network(_)) {
            return false;
        }
        let Source::Network(mut stream) = std::mem::replace(&mut self.source, Source::Idle) else {
            return false;
        };

        stream.session.close();
        self.debug(&format!("released session for {}", stream.url));
        true
    }

    /// Aborts an active network stream. Safe to call in any state and any
    /// number of times; returns whether a session was released.
    pub fn close(&mut self) -> bool {
        self.cleanup_connection()
    }

    pub fn state(&self) -> Option<AudioReaderState> {
        match self.source {
            Source::Idle => None,
            Source::Done(state) => Some(state),
            Source::File { .. } | Source::Network(_) => Some(AudioReaderState::Reading),
        }
    }

    pub fn has_network_session(&self) -> bool {
        matches!(self.source, Source::Network(_))
    }

    pub fn file_type(&self) -> MediaFileType {
        self.file_type
    }

    /// Content length announced by the server for the active stream.
    pub fn content_length(&self) -> Option<u64> {
        match &self.source {
            Source::Network(stream) => stream.content_length,
            _ => None,
        }
    }

    /// Bytes of the memory source not yet forwarded.
    pub fn remaining(&self) -> Option<usize> {
        match &self.source {
            Source::File { remaining } => Some(remaining.len()),
            _ => None,
        }
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats.clone()
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn transfer_capacity(&self) -> usize {
        self.transfer.capacity()
    }

    pub fn is_transfer_allocated(&self) -> bool {
        self.transfer.is_allocated()
    }
}

fn advance_network(
    stream: &mut NetworkStream,
    transfer: &mut TransferBuffer,
    output: &dyn ConsumerBuffer,
    config: &ReaderConfig,
    stats: &mut ReaderStats,
) -> NetworkStep {
    let Some(buffer) = transfer.as_mut_slice() else {
        return NetworkStep::Failed("transfer buffer not allocated".into());
    };

    if !stream.pending.is_empty() {
        let written = output.write_without_replacement(
            &buffer[stream.pending.clone()],
            config.read_write_timeout(),
        );
        stream.pending.start += written;
        stats.bytes_forwarded += written as u64;
        return NetworkStep::Flushed;
    }

    if stream.session.is_complete() {
        return NetworkStep::Complete;
    }

    let quota = read_quota(buffer.len(), output.free());
    if quota == 0 {
        return NetworkStep::Received(0);
    }

    let received = match stream.session.read(&mut buffer[..quota]) {
        Ok(n) => n.min(quota),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
            ) =>
        {
            0
        }
        Err(e) => return NetworkStep::Failed(format!("read from {} failed: {}", stream.url, e)),
    };

    if received == 0 {
        stats.empty_reads += 1;
        stream.idle_reads += 1;
        if let Some(limit) = config.max_idle_reads {
            if stream.idle_reads >= limit {
                return NetworkStep::Failed(format!(
                    "no data from {} after {} consecutive reads",
                    stream.url, stream.idle_reads
                ));
            }
        }
        return NetworkStep::Received(0);
    }

    stream.idle_reads = 0;
    stats.bytes_read += received as u64;

    let written = output.write_without_replacement(&buffer[..received], config.read_write_timeout());
    stats.bytes_forwarded += written as u64;

    if written < received {
        if config.retain_unwritten {
            stream.pending = written..received;
        } else {
            stats.bytes_dropped += (received - written) as u64;
            log::debug!(
                "[reader] consumer accepted {}/{} bytes, dropping remainder",
                written,
                received
            );
        }
    }

    NetworkStep::Received(received)
}

impl ComponentLogger for AudioReader {
    fn log_context(&self) -> LogContext {
        let ctx = LogContext::new("AudioReader", &self.id);
        match &self.source {
            Source::Network(stream) => ctx.with_stream(&stream.url),
            _ => ctx,
        }
    }
}

impl Drop for AudioReader {
    fn drop(&mut self) {
        if self.cleanup_connection() {
            self.debug("dropped with an active session");
        }
    }
}
