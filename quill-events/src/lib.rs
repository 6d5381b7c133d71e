//! Quill Events - Chain Event Stream
//!
//! Wraps a [`Chain`](quill_engine::Chain) so every call produces an ordered
//! list of events, ready to forward to a client as server-sent events.
//!
//! ```text
//! host ──step/resume──▶ EventEmitter ──▶ Chain
//!                            │
//!                            ▼
//!   id:1 step  →  id:2 step-complete  →  id:3 step  →  …  →  complete | error
//! ```
//!
//! Frame ids start at 1 and grow by one per frame. Exactly one terminal
//! event (`complete` or `error`) closes the stream.

mod emitter;
mod event;

pub use emitter::{EmitterError, EmitterResult, EventEmitter};
pub use event::{ChainEvent, EventFrame};
