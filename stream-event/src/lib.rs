//! Wire-level chat stream event types.
//!
//! One [`ChatEvent`] maps to one SSE frame: [`ChatEvent::name`] is the SSE
//! `event:` field, [`ChatEvent::payload`] the JSON `data:` field. Shared by
//! the core graph runner (which emits events) and the server (which frames
//! them as `text/event-stream`).

mod event;

pub use event::{ChatEvent, SourceRef, StepPhase};
