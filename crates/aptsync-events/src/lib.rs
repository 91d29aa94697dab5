mod event;
mod sink;
mod snapshot;

use std::sync::Arc;

pub use event::*;
pub use sink::*;
pub use snapshot::*;

/// Shared handle to an event sink.
pub type EventSinkHandle = Arc<dyn EventSink>;
