//! Shared test harness for integration tests against the framed IPC
//! protocol (`isolate-daemon`'s tests and, if ever needed, `isolate-core`'s).

mod mock_ipc_client;

pub use mock_ipc_client::MockIpcClient;
