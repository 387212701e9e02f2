//! Assistant relay: mediates streamed assistant runs between HTTP clients
//! and a remote assistants API, serializing runs per session and dispatching
//! mid-run tool calls to registered handlers.

pub mod admission;
pub mod config;
pub mod framer;
pub mod router;
pub mod sessions;
pub mod testing;
pub mod tools;
pub mod turn;
