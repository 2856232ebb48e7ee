//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces the supervisor expects from its host. They
//! contain no implementation details and use only domain types.

pub mod event_emitter;
pub mod output_sink;

pub use event_emitter::{NoopEmitter, SupervisorEventEmitter};
pub use output_sink::{NoopOutputSink, OutputChunk, OutputSinkPort, OutputStream};
