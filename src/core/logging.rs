// src/core/logging.rs
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::timestamp::utc_ns_now;

// Global sequence number for correlating log lines across components
static LOG_SEQUENCE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub struct LogContext {
    pub component: String,
    pub instance_id: String,
    pub stream_id: Option<String>,
    pub sequence: u64,
    pub timestamp_ns: u64,
}

impl LogContext {
    pub fn new(component: &str, instance_id: &str) -> Self {
        Self {
            component: component.to_string(),
            instance_id: instance_id.to_string(),
            stream_id: None,
            sequence: LOG_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            timestamp_ns: utc_ns_now(),
        }
    }

    pub fn with_stream(mut self, stream_id: &str) -> Self {
        self.stream_id = Some(stream_id.to_string());
        self
    }

    pub fn format(&self, level: &str, message: &str) -> String {
        let stream_info = match &self.stream_id {
            Some(stream) => format!(" stream={}", stream),
            None => String::new(),
        };

        format!(
            "[{}][seq={:06}][{}:{}{}] {}",
            level, self.sequence, self.component, self.instance_id, stream_info, message
        )
    }
}

/// Uniform, context-tagged logging for long-lived components.
pub trait ComponentLogger {
    fn log_context(&self) -> LogContext;

    fn trace(&self, message: &str) {
        if log::log_enabled!(log::Level::Trace) {
            let ctx = self.log_context();
            log::trace!("{}", ctx.format("TRACE", message));
        }
    }

    fn debug(&self, message: &str) {
        let ctx = self.log_context();
        log::debug!("{}", ctx.format("DEBUG", message));
    }

    fn info(&self, message: &str) {
        let ctx = self.log_context();
        log::info!("{}", ctx.format("INFO", message));
    }

    fn warn(&self, message: &str) {
        let ctx = self.log_context();
        log::warn!("{}", ctx.format("WARN", message));
    }

    fn error(&self, message: &str) {
        let ctx = self.log_context();
        log::error!("{}", ctx.format("ERROR", message));
    }

    fn trace_buffer(&self, buffer: &super::ringbuffer::ByteRingBuffer) {
        let stats = buffer.stats();
        let ctx = self.log_context();

        let buffer_info = format!(
            "buffer[addr={:?}] bytes={}/{} written={} read={}",
            buffer as *const _,
            stats.available,
            stats.capacity,
            stats.bytes_written,
            stats.bytes_read
        );

        log::debug!("{}", ctx.format("TRACE", &buffer_info));
    }
}
