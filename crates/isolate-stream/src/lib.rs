//! isolate-stream: the byte-oriented, credit-controlled stream engine
//! (spec.md §4.4). Single-producer/single-consumer per session by default;
//! fan-out is explicit via `tee`.

pub mod credit;
pub mod error;
pub mod passthrough;
pub mod session;
pub mod tee;
pub mod transform;

pub use credit::CreditWindow;
pub use error::StreamError;
pub use passthrough::passthrough;
pub use session::{channel, StreamConsumer, StreamItem, StreamProducer};
pub use tee::{tee, TeeBranch, TeeConfig, TeeItem};
pub use transform::{identity, pipe_through};
