pub mod error;
pub mod lock;
pub mod logging;
pub mod ringbuffer;
pub mod timestamp;

pub use error::{ConfigError, ReaderError, ReaderResult};
pub use logging::{ComponentLogger, LogContext};
pub use ringbuffer::{ByteRingBuffer, ConsumerBuffer, RingBufferStats};
pub use timestamp::*;
