//! Scripted network sessions for exercising the reader without sockets.
pub mod mocks;

pub use mocks::{MockConnector, MockRead, MockSession, SessionProbe};
