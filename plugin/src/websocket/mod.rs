//! Local WebSocket emulation
//!
//! Connections requested by the script runtime never touch the network. The
//! [`ConnectionRegistry`] owns the id table on the event-loop thread and routes
//! frames between the script side and the application [`Handler`](crate::Handler),
//! which talks back through cloneable [`WebSocket`] handles.

mod registry;
mod socket;

pub use registry::ConnectionRegistry;
pub use socket::{ConnectionId, WebSocket};

/// WebSocket ready states (matching browser API)
pub const WS_CONNECTING: u32 = 0;
pub const WS_OPEN: u32 = 1;
pub const WS_CLOSING: u32 = 2;
pub const WS_CLOSED: u32 = 3;

/// Events raised toward the script side, one per event channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptEvent {
    Open(ConnectionId),
    Message(ConnectionId, String),
    Close(ConnectionId),
}

impl ScriptEvent {
    pub fn id(&self) -> ConnectionId {
        match self {
            ScriptEvent::Open(id) | ScriptEvent::Message(id, _) | ScriptEvent::Close(id) => *id,
        }
    }

    /// Name of the channel the event is emitted on.
    pub fn channel(&self) -> &'static str {
        match self {
            ScriptEvent::Open(_) => "onopen",
            ScriptEvent::Message(..) => "onmessage",
            ScriptEvent::Close(_) => "onclose",
        }
    }
}
