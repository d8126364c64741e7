// src/io/mod.rs
pub mod http_session;

use std::io;
use std::time::Duration;

use crate::config::ReaderConfig;
use crate::core::ReaderResult;

pub use http_session::{UreqConnector, UreqSession};

/// Parameters for opening one network session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub url: String,
    pub max_redirects: u32,
    /// Connect and header timeout; also the initial read timeout.
    pub timeout: Duration,
    /// Socket read timeout once connected. Closing a session waits at most
    /// about this long for the connection to be released.
    pub poll_interval: Duration,
    pub keep_alive: bool,
    /// Set for `https` URLs. Informational for [`UreqConnector`], which
    /// always verifies certificates against ureq's bundled webpki roots;
    /// other connectors may use it to pick their trust store.
    pub use_trust_bundle: bool,
    pub buffer_size: usize,
}

impl SessionConfig {
    pub fn for_url(url: &str, reader: &ReaderConfig) -> Self {
        Self {
            url: url.to_string(),
            max_redirects: reader.max_redirects,
            timeout: reader.connect_timeout(),
            poll_interval: reader.socket_poll_interval(),
            keep_alive: reader.keep_alive,
            use_trust_bundle: is_secure_url(url),
            buffer_size: reader.http_buffer_size,
        }
    }
}

pub fn is_secure_url(url: &str) -> bool {
    url.get(..6)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https:"))
}

/// An open connection delivering one response body.
///
/// Dropping the session releases it; `close` does the same eagerly and must
/// tolerate being called more than once.
pub trait NetworkSession: Send {
    /// Performs the request and waits for the response headers.
    /// Returns the announced content length, if any.
    fn fetch_headers(&mut self) -> ReaderResult<Option<u64>>;

    /// Final URL after redirects.
    fn resolved_url(&self) -> ReaderResult<String>;

    /// True once the whole body has been handed out by `read`.
    fn is_complete(&self) -> bool;

    /// Reads at most `buf.len()` body bytes. `Ok(0)` means nothing arrived
    /// within the read timeout; it is not end of stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn set_read_timeout(&mut self, timeout: Duration) -> ReaderResult<()>;

    fn close(&mut self);
}

pub trait Connector: Send + Sync {
    fn open(&self, config: &SessionConfig) -> ReaderResult<Box<dyn NetworkSession>>;
}
