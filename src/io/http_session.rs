use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};

use crate::core::{ReaderError, ReaderResult};
use crate::io::{Connector, NetworkSession, SessionConfig};

// Chunks buffered between the body pump and the reader.
const PUMP_QUEUE_DEPTH: usize = 4;

// Slack on top of the socket timeout before close gives up on the pump.
const PUMP_EXIT_GRACE: Duration = Duration::from_millis(250);

type BodyReader = Box<dyn Read + Send + Sync + 'static>;

/// Opens blocking HTTP(S) sessions with `ureq`.
///
/// TLS uses ureq's rustls backend with its bundled webpki trust roots.
///
/// ureq applies one socket read timeout to the response headers and the
/// body alike. Sessions run with the short poll interval, so the body pump
/// sees `close` quickly, and repeat the request with a doubled timeout when
/// the headers are slower than that, up to the connect timeout.
#[derive(Debug, Default, Clone)]
pub struct UreqConnector;

impl UreqConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for UreqConnector {
    fn open(&self, config: &SessionConfig) -> ReaderResult<Box<dyn NetworkSession>> {
        let scheme_ok = ["http://", "https://"].iter().any(|scheme| {
            config
                .url
                .get(..scheme.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
        });
        if !scheme_ok {
            return Err(ReaderError::connection(
                format!("open {}", config.url),
                "only http and https urls are supported",
            ));
        }
        if config.use_trust_bundle {
            debug!("[http_session] validating {} against bundled trust roots", config.url);
        }

        let poll_interval = if config.poll_interval.is_zero() {
            config.timeout
        } else {
            config.poll_interval.min(config.timeout)
        };

        Ok(Box::new(UreqSession {
            url: config.url.clone(),
            max_redirects: config.max_redirects,
            keep_alive: config.keep_alive,
            connect_timeout: config.timeout,
            poll_interval,
            chunk_size: config.buffer_size.max(1),
            read_timeout: config.timeout,
            body: None,
        }))
    }
}

enum Chunk {
    Data(Bytes),
    End,
    Failed(io::Error),
}

struct Body {
    resolved_url: String,
    content_length: Option<u64>,
    rx: Receiver<Chunk>,
    stop: Arc<AtomicBool>,
    // Disconnects once the pump has dropped the connection.
    released: Receiver<()>,
    pump: JoinHandle<()>,
    socket_timeout: Duration,
    pending: Bytes,
    received: u64,
    eof: bool,
    failed: bool,
}

impl Body {
    fn is_complete(&self) -> bool {
        if self.failed {
            return false;
        }
        if self.eof && self.pending.is_empty() {
            return true;
        }
        self.content_length
            .is_some_and(|len| self.received >= len)
    }
}

/// One GET request whose body is pumped by a helper thread, so reads can
/// wait on a timeout that is changeable after the headers arrived.
pub struct UreqSession {
    url: String,
    max_redirects: u32,
    keep_alive: bool,
    connect_timeout: Duration,
    poll_interval: Duration,
    chunk_size: usize,
    read_timeout: Duration,
    body: Option<Body>,
}

impl UreqSession {
    fn agent(&self, socket_timeout: Duration) -> ureq::Agent {
        let mut builder = ureq::AgentBuilder::new()
            .redirects(self.max_redirects)
            .timeout_connect(self.connect_timeout)
            .timeout_read(socket_timeout);
        if !self.keep_alive {
            builder = builder.max_idle_connections(0);
        }
        builder.build()
    }

    /// Sends the GET and returns the response with the socket timeout it
    /// was received under.
    fn request(&self) -> Result<(ureq::Response, Duration), ureq::Error> {
        let deadline = Instant::now() + self.connect_timeout;
        let mut socket_timeout = self.poll_interval;
        loop {
            match self.agent(socket_timeout).get(&self.url).call() {
                Err(e) if is_socket_timeout(&e) && Instant::now() < deadline => {
                    debug!(
                        "[http_session] no headers from {} within {:?}, retrying",
                        self.url, socket_timeout
                    );
                    socket_timeout = (socket_timeout * 2).min(self.connect_timeout);
                }
                result => return result.map(|response| (response, socket_timeout)),
            }
        }
    }

    fn spawn_pump(&self, reader: BodyReader, resumable: bool) -> ReaderResult<PumpHandle> {
        let (tx, rx) = channel::bounded(PUMP_QUEUE_DEPTH);
        let (released_tx, released) = channel::bounded(1);
        let stop = Arc::new(AtomicBool::new(false));
        let chunk_size = self.chunk_size;

        let pump_stop = stop.clone();
        let pump = thread::Builder::new()
            .name("http-body-pump".into())
            .spawn(move || {
                pump_body(reader, &tx, &pump_stop, chunk_size, resumable);
                drop(released_tx);
            })
            .map_err(|e| ReaderError::connection("spawning body pump", e))?;

        Ok(PumpHandle {
            rx,
            stop,
            released,
            pump,
        })
    }
}

struct PumpHandle {
    rx: Receiver<Chunk>,
    stop: Arc<AtomicBool>,
    released: Receiver<()>,
    pump: JoinHandle<()>,
}

fn is_timeout(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

fn is_socket_timeout(err: &ureq::Error) -> bool {
    let ureq::Error::Transport(transport) = err else {
        return false;
    };
    matches!(transport.kind(), ureq::ErrorKind::Io)
        && std::error::Error::source(transport)
            .and_then(|source| source.downcast_ref::<io::Error>())
            .is_some_and(|e| is_timeout(e.kind()))
}

/// Moves the body into the channel until it ends, fails, or `stop` is set.
/// Returns after the reader, and with it the connection, has been dropped.
///
/// A socket timeout is harmless for identity bodies: nothing was consumed.
/// The chunked decoder may lose a partly read chunk-size line, so for
/// chunked bodies a timeout ends the stream.
fn pump_body(
    mut reader: BodyReader,
    tx: &Sender<Chunk>,
    stop: &AtomicBool,
    chunk_size: usize,
    resumable: bool,
) {
    let mut buf = vec![0u8; chunk_size];
    while !stop.load(Ordering::Relaxed) {
        let chunk = match reader.read(&mut buf) {
            Ok(0) => Chunk::End,
            Ok(n) => Chunk::Data(Bytes::copy_from_slice(&buf[..n])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            // A quiet server is not an error here; stall policy belongs to the reader.
            Err(e) if is_timeout(e.kind()) && resumable => continue,
            Err(e) if is_timeout(e.kind()) => Chunk::Failed(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("chunked body stalled mid-stream: {}", e),
            )),
            Err(e) => Chunk::Failed(e),
        };

        let last = !matches!(chunk, Chunk::Data(_));
        if tx.send(chunk).is_err() || last {
            break;
        }
    }
    drop(reader);
    debug!("[http_session] body pump stopped");
}

impl NetworkSession for UreqSession {
    fn fetch_headers(&mut self) -> ReaderResult<Option<u64>> {
        let context = format!("GET {}", self.url);
        let (response, socket_timeout) = match self.request() {
            Ok(found) => found,
            Err(ureq::Error::Status(code, response)) => {
                return Err(ReaderError::connection(
                    context,
                    format!("http status {} {}", code, response.status_text()),
                ));
            }
            Err(e) => return Err(ReaderError::connection(context, e)),
        };

        let resolved_url = response.get_url().to_string();
        let content_length = response
            .header("Content-Length")
            .and_then(|value| value.trim().parse::<u64>().ok());
        // Same rule ureq uses to pick its chunked decoder.
        let chunked = !response.http_version().eq_ignore_ascii_case("HTTP/1.0")
            && response
                .header("Transfer-Encoding")
                .is_some_and(|value| !value.is_empty());

        info!(
            "[http_session] {} -> {} ({} {}, length={:?}, chunked={})",
            self.url,
            resolved_url,
            response.status(),
            response.content_type(),
            content_length,
            chunked
        );

        let pump = self.spawn_pump(response.into_reader(), !chunked)?;
        self.body = Some(Body {
            resolved_url,
            content_length,
            rx: pump.rx,
            stop: pump.stop,
            released: pump.released,
            pump: pump.pump,
            socket_timeout,
            pending: Bytes::new(),
            received: 0,
            eof: false,
            failed: false,
        });

        Ok(content_length)
    }

    fn resolved_url(&self) -> ReaderResult<String> {
        self.body
            .as_ref()
            .map(|body| body.resolved_url.clone())
            .ok_or_else(|| {
                ReaderError::connection(format!("resolve {}", self.url), "headers not fetched")
            })
    }

    fn is_complete(&self) -> bool {
        self.body.as_ref().is_some_and(Body::is_complete)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let Some(body) = self.body.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "session has no response body",
            ));
        };

        if body.pending.is_empty() {
            if body.eof {
                return Ok(0);
            }
            match body.rx.recv_timeout(self.read_timeout) {
                Ok(Chunk::Data(data)) => body.pending = data,
                Ok(Chunk::End) => {
                    body.eof = true;
                    return Ok(0);
                }
                Ok(Chunk::Failed(e)) => {
                    body.eof = true;
                    body.failed = true;
                    return Err(e);
                }
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => {
                    body.eof = true;
                    body.failed = true;
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "body pump terminated unexpectedly",
                    ));
                }
            }
        }

        let n = buf.len().min(body.pending.len());
        buf[..n].copy_from_slice(&body.pending[..n]);
        body.pending.advance(n);
        body.received += n as u64;
        Ok(n)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> ReaderResult<()> {
        if timeout.is_zero() {
            return Err(ReaderError::invalid_argument("read timeout must be > 0"));
        }
        self.read_timeout = timeout;
        Ok(())
    }

    fn close(&mut self) {
        let Some(body) = self.body.take() else {
            return;
        };
        if !body.is_complete() {
            warn!(
                "[http_session] closing {} after {} bytes (incomplete)",
                self.url, body.received
            );
        }

        let Body {
            rx,
            stop,
            released,
            pump,
            socket_timeout,
            ..
        } = body;
        stop.store(true, Ordering::Relaxed);
        // Unblocks a pump waiting on a full queue.
        drop(rx);

        // The pump sees `stop` once its current socket read returns.
        match released.recv_timeout(socket_timeout + PUMP_EXIT_GRACE) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "[http_session] body pump for {} did not stop within {:?}, detaching",
                    self.url,
                    socket_timeout + PUMP_EXIT_GRACE
                );
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if pump.join().is_err() {
                    warn!("[http_session] body pump for {} panicked", self.url);
                }
            }
        }
        debug!("[http_session] closed {}", self.url);
    }
}

impl Drop for UreqSession {
    fn drop(&mut self) {
        self.close();
    }
}
