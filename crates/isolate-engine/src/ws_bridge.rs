//! Cross-connection WebSocket delivery (spec.md §4.6 "the guest emits
//! outbound commands ... over the bridge; the host delivers them to the
//! peer"). A guest's `websocket.message` handler for one connection may
//! need to push into a *different* connection's socket -- the two-user
//! chat scenario is the motivating case -- so every live connection's
//! outbound half is registered here, keyed by the connection id the
//! dispatcher already assigns, and looked up by `op_ws_send`/`op_ws_close`
//! regardless of which connection's handler is currently running.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use isolate_bridge::globals::websocket::WsOutboundCommand;
use isolate_protocol::WsConnectionId;
use tokio::sync::mpsc;

pub type WsOutboundRegistry = Rc<RefCell<HashMap<WsConnectionId, mpsc::UnboundedSender<WsOutboundCommand>>>>;

#[must_use]
pub fn new_registry() -> WsOutboundRegistry {
    Rc::new(RefCell::new(HashMap::new()))
}
