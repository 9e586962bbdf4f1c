//! `WebSocket` and the `serve({websocket})` inbound surface (spec.md §4.3,
//! §4.6 "WebSocket"). A proxied connection goes through
//! connecting -> open -> closing -> closed; messages are forwarded as-is,
//! text as a UTF-8 string and binary as a byte sequence.

use isolate_core::ClassRegistry;
use isolate_protocol::value::ClassTag;
use isolate_protocol::WsConnectionId;

use crate::error_bridge::{type_error, BridgeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsConnectionPhase {
    Connecting,
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
}

/// A command the guest emits toward the peer via the bridge.
#[derive(Debug, Clone)]
pub enum WsOutboundCommand {
    Send(WsMessage),
    Close { code: u16, reason: String },
}

/// An event the host dispatches into the guest's registered handler.
#[derive(Debug, Clone)]
pub enum WsInboundEvent {
    Open,
    Message(WsMessage),
    Close { code: u16, reason: String },
}

#[derive(Debug, Clone)]
pub struct WebSocketState {
    pub connection_id: WsConnectionId,
    pub phase: WsConnectionPhase,
    /// Opaque per-connection data the guest attached at upgrade time
    /// (`server.upgrade(req, {data})`), rematerialised on every dispatched
    /// event (spec.md §4.6 "stores the guest-provided per-connection data").
    pub data: Option<isolate_protocol::MarshalledValue>,
}

#[derive(Debug, Default)]
pub struct WebSocketApi {
    sockets: ClassRegistry<WebSocketState>,
}

impl WebSocketApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly upgraded connection, returning its guest-visible
    /// instance id.
    pub fn register_upgrade(
        &mut self,
        connection_id: WsConnectionId,
        data: Option<isolate_protocol::MarshalledValue>,
    ) -> u64 {
        self.sockets.insert(
            ClassTag::WebSocket,
            WebSocketState {
                connection_id,
                phase: WsConnectionPhase::Connecting,
                data,
            },
        )
    }

    pub fn mark_open(&mut self, instance_id: u64) -> Result<(), BridgeError> {
        self.transition(instance_id, WsConnectionPhase::Open)
    }

    pub fn begin_close(&mut self, instance_id: u64) -> Result<(), BridgeError> {
        self.transition(instance_id, WsConnectionPhase::Closing)
    }

    pub fn mark_closed(&mut self, instance_id: u64) -> Result<(), BridgeError> {
        self.transition(instance_id, WsConnectionPhase::Closed)
    }

    pub fn phase(&self, instance_id: u64) -> Result<WsConnectionPhase, BridgeError> {
        Ok(self.state(instance_id)?.phase)
    }

    /// Validates and accepts an outbound `send`/`close` command from the
    /// guest; rejects anything after the socket has started closing.
    pub fn accept_outbound(
        &self,
        instance_id: u64,
        command: &WsOutboundCommand,
    ) -> Result<(), BridgeError> {
        let state = self.state(instance_id)?;
        match (state.phase, command) {
            (WsConnectionPhase::Open, WsOutboundCommand::Send(_)) => Ok(()),
            (WsConnectionPhase::Open | WsConnectionPhase::Connecting, WsOutboundCommand::Close { .. }) => Ok(()),
            _ => Err(type_error("WebSocket is not open")),
        }
    }

    fn transition(&mut self, instance_id: u64, phase: WsConnectionPhase) -> Result<(), BridgeError> {
        self.sockets
            .get_mut(instance_id)
            .ok_or_else(|| type_error("unknown WebSocket"))?
            .state
            .phase = phase;
        Ok(())
    }

    fn state(&self, instance_id: u64) -> Result<&WebSocketState, BridgeError> {
        Ok(&self
            .sockets
            .get(instance_id)
            .ok_or_else(|| type_error("unknown WebSocket"))?
            .state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions_connecting_through_closed() {
        let mut api = WebSocketApi::new();
        let id = api.register_upgrade(1, None);
        assert_eq!(api.phase(id).unwrap(), WsConnectionPhase::Connecting);

        api.mark_open(id).unwrap();
        assert_eq!(api.phase(id).unwrap(), WsConnectionPhase::Open);

        api.begin_close(id).unwrap();
        api.mark_closed(id).unwrap();
        assert_eq!(api.phase(id).unwrap(), WsConnectionPhase::Closed);
    }

    #[test]
    fn send_is_rejected_once_the_socket_has_left_the_open_phase() {
        let mut api = WebSocketApi::new();
        let id = api.register_upgrade(1, None);
        api.mark_open(id).unwrap();
        api.begin_close(id).unwrap();

        let result = api.accept_outbound(id, &WsOutboundCommand::Send(WsMessage::Text("hi".to_owned())));
        assert!(result.is_err());
    }

    #[test]
    fn close_is_accepted_while_still_connecting() {
        let mut api = WebSocketApi::new();
        let id = api.register_upgrade(1, None);
        let result = api.accept_outbound(
            id,
            &WsOutboundCommand::Close {
                code: 1000,
                reason: String::new(),
            },
        );
        assert!(result.is_ok());
    }
}
