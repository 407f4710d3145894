use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::bridge::Bridge;
use crate::dispatcher::Dispatcher;
use crate::error::SocketError;
use crate::websocket::{WS_CLOSING, WS_CONNECTING, WS_OPEN};

/// Connection id, unique within one registry and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u32);

impl ConnectionId {
    /// An id as passed around by the script side.
    pub fn from_raw(id: u32) -> Self {
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handler-side handle to one emulated connection.
///
/// Safe to clone and move to worker threads; every call is marshalled onto the
/// event loop. The ready state is shared with the registry, so a send on a
/// closed or not yet accepted connection fails right away.
#[derive(Clone)]
pub struct WebSocket {
    id: ConnectionId,
    url: String,
    ready_state: Arc<AtomicU32>,
    bridge: Bridge<Dispatcher>,
}

impl WebSocket {
    pub(crate) fn new(id: ConnectionId, url: String, bridge: Bridge<Dispatcher>) -> Self {
        Self {
            id,
            url,
            ready_state: Arc::new(AtomicU32::new(WS_CONNECTING)),
            bridge,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Parsed target url, if it is a valid absolute url.
    pub fn parsed_url(&self) -> Option<url::Url> {
        url::Url::parse(&self.url).ok()
    }

    pub fn ready_state(&self) -> u32 {
        self.ready_state.load(Ordering::SeqCst)
    }

    pub(crate) fn set_ready_state(&self, state: u32) {
        self.ready_state.store(state, Ordering::SeqCst);
    }

    /// Move a connecting socket to open. False once a close has begun.
    pub(crate) fn open(&self) -> bool {
        match self.ready_state.compare_exchange(
            WS_CONNECTING,
            WS_OPEN,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => true,
            Err(state) => state == WS_OPEN,
        }
    }

    /// Accept the connection. The script side sees `onopen`.
    pub fn connected(&self) -> Result<(), SocketError> {
        if let Err(state) = self.ready_state.compare_exchange(
            WS_CONNECTING,
            WS_OPEN,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            return Err(match state {
                WS_OPEN => SocketError::AlreadyAccepted(self.id),
                _ => SocketError::NotFound(self.id),
            });
        }

        let id = self.id;
        self.bridge.post(move |dispatcher: &mut Dispatcher| {
            if let Err(e) = dispatcher.sockets().accept(id) {
                log::warn!("[WebSocket {}] accept dropped: {}", id, e);
            }
        })?;
        Ok(())
    }

    /// Send a text frame to the script side.
    pub fn send(&self, data: impl Into<String>) -> Result<(), SocketError> {
        match self.ready_state() {
            WS_OPEN => {}
            WS_CONNECTING => return Err(SocketError::NotOpen(self.id)),
            _ => return Err(SocketError::NotFound(self.id)),
        }

        let id = self.id;
        let data = data.into();
        self.bridge.post(move |dispatcher: &mut Dispatcher| {
            if let Err(e) = dispatcher.sockets().send_to_client(id, data) {
                log::warn!("[WebSocket {}] send dropped: {}", id, e);
            }
        })?;
        Ok(())
    }

    /// Close the connection from the handler side, or reject it before
    /// [`connected`](Self::connected). The script side sees `onclose`.
    pub fn close(&self) -> Result<(), SocketError> {
        let closing = self
            .ready_state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |state| {
                matches!(state, WS_CONNECTING | WS_OPEN).then_some(WS_CLOSING)
            });
        if closing.is_err() {
            return Err(SocketError::NotFound(self.id));
        }

        let id = self.id;
        self.bridge.post(move |dispatcher: &mut Dispatcher| {
            if let Err(e) = dispatcher.sockets().server_close(id) {
                log::warn!("[WebSocket {}] close dropped: {}", id, e);
            }
        })?;
        Ok(())
    }
}

impl fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocket")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("ready_state", &self.ready_state())
            .finish()
    }
}
