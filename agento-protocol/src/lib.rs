//! Wire protocol for Agento runs.
//!
//! The third-party agent runtime emits a heterogeneous JSON event stream (§6: `system`,
//! `assistant`, `stream_event`, `user`, `user_input_required`, `result`). The run
//! orchestrator (`agento-core`) demultiplexes that stream into the homogenized
//! [`RunEvent`] kinds defined here, which is what crosses the HTTP/SSE boundary and what
//! gets captured into [`MessageBlock`]s for persistence.
//!
//! This crate has no dependency on the runtime client or on persistence; it only
//! defines the wire shape (event + envelope).

pub mod envelope;
pub mod event;

pub use envelope::{Envelope, EnvelopeState};
pub use event::{DeltaPayload, MessageBlock, RunEvent, Usage};
