//! Domain event capture and post-success dispatch.
//!
//! 1. **Capture** (`capture`): flow-local slot that handlers and listeners raise into
//! 2. **Listeners** (`listener`): per-event-type listener table
//! 3. **Retry** (`retry`): bounded backoff schedule for failing listeners
//! 4. **Dispatch** (`dispatcher`): worklist-driven fan-out and cascades
//! 5. **Record** (`record`): what ran, what failed, and the observer hook

pub mod capture;
pub mod dispatcher;
pub mod listener;
pub mod record;
pub mod retry;

pub use capture::{
    capture, is_active, pending, prepare, raise, raise_shared, run_captured, scoped,
};
pub use dispatcher::EventDispatcher;
pub use listener::{Listener, ListenerRegistry, ListenerRegistryBuilder, ListenerSlot};
pub use record::{
    DispatchEntry, DispatchFailure, DispatchObserver, ExecutionRecord, LoggingObserver,
};
pub use retry::{Backoff, RetryError, RetryOutcome, RetryPolicy, TokioBackoff};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
