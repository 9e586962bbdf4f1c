//! The local IPC transport (spec.md §6 "endpoint"): a Unix domain socket or
//! a loopback TCP listener, whichever `Config::endpoint` names. Both accept
//! loops hand each connection to `multiplexer::run`.

mod listener;

pub use listener::serve;
