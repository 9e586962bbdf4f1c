//! isolate-bridge: the marshaller and the capability bridge runtime
//! (spec.md §4.2, §4.3). This crate is engine-independent -- it never
//! touches a real V8 handle. `isolate-engine` walks a `v8::Local<Value>`
//! into this crate's `GuestValue` tree and binds the `globals` entry points
//! to V8 function templates; everything here is plain, testable Rust.

pub mod error_bridge;
pub mod globals;
pub mod marshal;

pub use error_bridge::BridgeError;
pub use marshal::{expect_integer_typed_array, marshal, GuestValue, MarshalPass};
