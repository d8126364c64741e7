use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::lock::lock_mutex;
use crate::core::{ReaderError, ReaderResult};
use crate::io::{Connector, NetworkSession, SessionConfig};

/// One scripted answer of [`MockSession::read`].
#[derive(Debug, Clone)]
pub enum MockRead {
    Data(Vec<u8>),
    Empty,
    Error(io::ErrorKind),
}

/// Observations shared by a [`MockConnector`] and every session it opened.
#[derive(Debug, Default)]
pub struct SessionProbe {
    opened: AtomicUsize,
    closed: AtomicUsize,
    read_requests: Mutex<Vec<usize>>,
    read_timeouts: Mutex<Vec<Duration>>,
    configs: Mutex<Vec<SessionConfig>>,
}

impl SessionProbe {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn open_sessions(&self) -> usize {
        self.opened() - self.closed()
    }

    /// Buffer sizes passed to every `read` call, in order.
    pub fn read_requests(&self) -> Vec<usize> {
        lock_mutex(&self.read_requests, "SessionProbe::read_requests").clone()
    }

    pub fn read_timeouts(&self) -> Vec<Duration> {
        lock_mutex(&self.read_timeouts, "SessionProbe::read_timeouts").clone()
    }

    pub fn configs(&self) -> Vec<SessionConfig> {
        lock_mutex(&self.configs, "SessionProbe::configs").clone()
    }
}

#[derive(Debug, Clone, Default)]
struct Script {
    resolved_url: Option<String>,
    content_length: Option<u64>,
    reads: VecDeque<MockRead>,
    fail_open: bool,
    fail_headers: bool,
    fail_timeout: bool,
    never_complete: bool,
}

/// Connector handing out scripted sessions; every session replays the same script.
pub struct MockConnector {
    script: Script,
    probe: Arc<SessionProbe>,
}

impl MockConnector {
    pub fn new(reads: Vec<MockRead>) -> Self {
        Self {
            script: Script {
                reads: reads.into(),
                ..Default::default()
            },
            probe: Arc::new(SessionProbe::default()),
        }
    }

    /// Serves `total` bytes (0, 1, 2, ... wrapping) in chunks of `chunk`.
    pub fn with_payload(total: usize, chunk: usize) -> Self {
        let payload: Vec<u8> = (0..total).map(|i| i as u8).collect();
        let reads = payload
            .chunks(chunk.max(1))
            .map(|c| MockRead::Data(c.to_vec()))
            .collect();
        Self::new(reads).content_length(total as u64)
    }

    pub fn redirect_to(mut self, url: &str) -> Self {
        self.script.resolved_url = Some(url.to_string());
        self
    }

    pub fn content_length(mut self, len: u64) -> Self {
        self.script.content_length = Some(len);
        self
    }

    pub fn fail_open(mut self) -> Self {
        self.script.fail_open = true;
        self
    }

    pub fn fail_headers(mut self) -> Self {
        self.script.fail_headers = true;
        self
    }

    pub fn fail_timeout(mut self) -> Self {
        self.script.fail_timeout = true;
        self
    }

    /// Keeps the session incomplete after the script ran dry.
    pub fn never_complete(mut self) -> Self {
        self.script.never_complete = true;
        self
    }

    pub fn probe(&self) -> Arc<SessionProbe> {
        self.probe.clone()
    }
}

impl Connector for MockConnector {
    fn open(&self, config: &SessionConfig) -> ReaderResult<Box<dyn NetworkSession>> {
        lock_mutex(&self.probe.configs, "MockConnector::open").push(config.clone());
        if self.script.fail_open {
            return Err(ReaderError::connection(format!("open {}", config.url), "mock refused"));
        }

        self.probe.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            url: config.url.clone(),
            script: self.script.clone(),
            probe: self.probe.clone(),
            headers_fetched: false,
            closed: false,
        }))
    }
}

pub struct MockSession {
    url: String,
    script: Script,
    probe: Arc<SessionProbe>,
    headers_fetched: bool,
    closed: bool,
}

impl NetworkSession for MockSession {
    fn fetch_headers(&mut self) -> ReaderResult<Option<u64>> {
        if self.script.fail_headers {
            return Err(ReaderError::connection(format!("GET {}", self.url), "mock headers failed"));
        }
        self.headers_fetched = true;
        Ok(self.script.content_length)
    }

    fn resolved_url(&self) -> ReaderResult<String> {
        if !self.headers_fetched {
            return Err(ReaderError::connection("resolve", "headers not fetched"));
        }
        Ok(self
            .script
            .resolved_url
            .clone()
            .unwrap_or_else(|| self.url.clone()))
    }

    fn is_complete(&self) -> bool {
        !self.script.never_complete && self.script.reads.is_empty()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        lock_mutex(&self.probe.read_requests, "MockSession::read").push(buf.len());

        match self.script.reads.pop_front() {
            Some(MockRead::Data(data)) => {
                let n = buf.len().min(data.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.script.reads.push_front(MockRead::Data(data[n..].to_vec()));
                }
                Ok(n)
            }
            Some(MockRead::Empty) | None => Ok(0),
            Some(MockRead::Error(kind)) => Err(io::Error::new(kind, "mock read failed")),
        }
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> ReaderResult<()> {
        if self.script.fail_timeout {
            return Err(ReaderError::connection("set timeout", "mock timeout rejected"));
        }
        lock_mutex(&self.probe.read_timeouts, "MockSession::set_read_timeout").push(timeout);
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.probe.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.close();
    }
}
