//! The shared push channel: transport seam, frame decoding, and the client
//! that keeps one connection alive per session.

pub mod client;
pub mod decode;
pub mod transport;

pub use client::{StreamHealth, TaskStreamClient};
pub use decode::{DecodeError, StreamEvent, decode};
pub use transport::{EventTransport, SseTransport, TransportEvent};
