//! isolate-core: the data model shared by every other crate in the daemon
//! (spec.md §3) -- isolate records, per-connection state, the process-wide
//! connection registry, and the small self-contained pieces (headers,
//! timers, test registry, callback table, class registry, LRU tracker)
//! that isolate, bridge, and engine code all build on.

pub mod body;
pub mod callback;
pub mod class_registry;
pub mod connection;
pub mod error;
pub mod headers;
pub mod isolate;
pub mod lru;
pub mod stream_session;
pub mod test_registry;
pub mod timer;

pub use body::BodyPayload;
pub use callback::{CallbackEntry, CallbackTable, CapabilityKind};
pub use class_registry::{ClassInstance, ClassRegistry};
pub use connection::{Connection, ConnectionRegistry};
pub use error::CoreError;
pub use headers::HeaderState;
pub use isolate::{CapabilitySet, Isolate, IsolateLifecycle};
pub use lru::IsolateLru;
pub use stream_session::{StreamSession, StreamState};
pub use test_registry::{Suite, TestCase, TestModifier, TestOutcome, TestRegistry, TestResult};
pub use timer::{FiredTimer, TimerId, TimerKind, TimerQueue};
