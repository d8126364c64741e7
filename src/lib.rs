// src/lib.rs
pub mod config;
pub mod core;
pub mod io;
pub mod reader;
pub mod testing;
pub mod types;

// Re-export the main types
pub use config::{Config, ReaderConfig, RingConfig};
pub use crate::core::{
    ByteRingBuffer, ComponentLogger, ConfigError, ConsumerBuffer, LogContext, ReaderError,
    ReaderResult,
};
pub use io::{Connector, NetworkSession, SessionConfig, UreqConnector};
pub use reader::{AudioReader, ReaderStats};
pub use types::{AudioReaderState, MediaFile, MediaFileType};
