use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

use crate::bridge::Bridge;
use crate::dispatcher::Dispatcher;
use crate::error::SocketError;
use crate::websocket::{ConnectionId, ScriptEvent, WS_CLOSED, WS_OPEN, WebSocket};

/// Connection table for the emulated WebSockets.
///
/// Lives on the event-loop thread (it is neither `Send` nor `Sync`). Script
/// calls reach it synchronously; handler calls arrive as posted closures.
/// Every id in the table is a connection that is still open or connecting.
///
/// Events for the script side collect in an outbox until the dispatcher
/// delivers them to its script runtime or someone calls
/// [`take_events`](Self::take_events). Without a script runtime nothing drains
/// it automatically, so the embedder must.
pub struct ConnectionRegistry {
    connections: RefCell<HashMap<ConnectionId, WebSocket>>,
    next_id: Cell<u32>,
    outbox: RefCell<VecDeque<ScriptEvent>>,
    bridge: Bridge<Dispatcher>,
}

impl ConnectionRegistry {
    pub fn new(bridge: Bridge<Dispatcher>) -> Self {
        Self {
            connections: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
            outbox: RefCell::new(VecDeque::new()),
            bridge,
        }
    }

    /// Register a new connection attempt and notify the handler.
    pub fn connect(&self, url: &str) -> ConnectionId {
        let id = ConnectionId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let socket = WebSocket::new(id, url.to_string(), self.bridge.clone());
        self.connections.borrow_mut().insert(id, socket.clone());
        log::info!("[WebSocket {}] connect {}", id, url);

        let posted = self.bridge.post(move |dispatcher: &mut Dispatcher| {
            dispatcher.with_handler(|handler| handler.on_connect(socket));
        });
        if posted.is_err() {
            log::warn!("[WebSocket {}] event loop closed, connect not delivered", id);
        }
        id
    }

    /// Handler accepted the connection: raise `onopen` on the script side.
    ///
    /// A connection the handler already started closing stays closing and
    /// raises no `onopen`.
    pub fn accept(&self, id: ConnectionId) -> Result<(), SocketError> {
        let connections = self.connections.borrow();
        let socket = connections.get(&id).ok_or(SocketError::NotFound(id))?;
        if !socket.open() {
            log::debug!("[WebSocket {}] closing before accept, no open event", id);
            return Ok(());
        }
        self.emit(ScriptEvent::Open(id));
        log::info!("[WebSocket {}] open", id);
        Ok(())
    }

    /// The script side closed the connection.
    pub fn client_close(&self, id: ConnectionId) -> Result<(), SocketError> {
        let socket = self.remove(id)?;
        log::info!("[WebSocket {}] closed by client", id);

        self.bridge.post(move |dispatcher: &mut Dispatcher| {
            dispatcher.with_handler(|handler| handler.on_close(socket));
        })?;
        Ok(())
    }

    /// The handler closed the connection: raise `onclose` on the script side.
    pub fn server_close(&self, id: ConnectionId) -> Result<(), SocketError> {
        self.remove(id)?;
        log::info!("[WebSocket {}] closed by handler", id);
        self.emit(ScriptEvent::Close(id));
        Ok(())
    }

    /// Relay a frame from the script side to the handler.
    pub fn send_to_server(&self, id: ConnectionId, data: String) -> Result<(), SocketError> {
        let socket = self.open_socket(id)?;
        log::debug!("[WebSocket {}] script -> handler ({} bytes)", id, data.len());

        self.bridge.post(move |dispatcher: &mut Dispatcher| {
            dispatcher.with_handler(|handler| handler.on_receive(socket, data));
        })?;
        Ok(())
    }

    /// Relay a frame from the handler to the script side.
    pub fn send_to_client(&self, id: ConnectionId, data: String) -> Result<(), SocketError> {
        self.open_socket(id)?;
        log::debug!("[WebSocket {}] handler -> script ({} bytes)", id, data.len());
        self.emit(ScriptEvent::Message(id, data));
        Ok(())
    }

    /// Ready state of a connection; closed for unknown ids.
    pub fn ready_state(&self, id: ConnectionId) -> u32 {
        self.connections
            .borrow()
            .get(&id)
            .map(WebSocket::ready_state)
            .unwrap_or(WS_CLOSED)
    }

    pub fn get(&self, id: ConnectionId) -> Option<WebSocket> {
        self.connections.borrow().get(&id).cloned()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.borrow().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.borrow().is_empty()
    }

    /// Drain the events raised toward the script side.
    pub fn take_events(&self) -> Vec<ScriptEvent> {
        self.outbox.borrow_mut().drain(..).collect()
    }

    /// Drop every connection, closing them on both sides.
    pub fn close_all(&self) {
        let ids: Vec<ConnectionId> = self.connections.borrow().keys().copied().collect();
        for id in ids {
            if let Err(e) = self.server_close(id) {
                log::warn!("[WebSocket {}] close on teardown failed: {}", id, e);
            }
        }
    }

    fn remove(&self, id: ConnectionId) -> Result<WebSocket, SocketError> {
        let socket = self
            .connections
            .borrow_mut()
            .remove(&id)
            .ok_or(SocketError::NotFound(id))?;
        socket.set_ready_state(WS_CLOSED);
        Ok(socket)
    }

    fn open_socket(&self, id: ConnectionId) -> Result<WebSocket, SocketError> {
        let connections = self.connections.borrow();
        let socket = connections.get(&id).ok_or(SocketError::NotFound(id))?;
        if socket.ready_state() != WS_OPEN {
            return Err(SocketError::NotOpen(id));
        }
        Ok(socket.clone())
    }

    fn emit(&self, event: ScriptEvent) {
        self.outbox.borrow_mut().push_back(event);
    }
}
