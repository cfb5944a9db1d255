//! Protocol tracing.
//!
//! - [`ConnectionObserver`]: one callback per connection lifecycle phase,
//!   injected into the transport when it is built
//! - [`Tracer`]: observer printing the request timeline
//! - [`NoTrace`]: observer used when tracing is off, every callback is empty
//! - [`TraceLog`]: colored printer shared by the tracer and the renderer

mod observer;
mod printer;
mod tracer;

pub use observer::{ConnectionObserver, NoTrace, TlsState};
pub use printer::{MemorySink, TraceLog};
pub use tracer::{EventKind, Phase, PhaseStarts, TraceEvent, Tracer};
