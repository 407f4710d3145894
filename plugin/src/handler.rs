//! Application handler interface.

use std::time::Duration;

use once_cell::sync::Lazy;
use url::Url;

use crate::bridge::Bridge;
use crate::dispatcher::Dispatcher;
use crate::error::BridgeError;
use crate::message::Method;
use crate::request::Request;
use crate::websocket::WebSocket;

/// Callbacks the dispatcher invokes on the event-loop thread.
///
/// Every method has a no-op default, so implementors override only what they
/// need. `Request` and `WebSocket` handles may be moved to other threads to
/// answer later.
pub trait Handler: 'static {
    /// Decide whether a request is answered locally. Returning `false` makes
    /// the dispatcher report pass-through for it.
    fn intercepts(&self, _method: &Method, _url: &Url) -> bool {
        true
    }

    /// Called once after the host is ready.
    fn on_startup(&mut self, _host: Host) {}

    /// A request to answer with [`Request::respond`].
    fn on_request(&mut self, _request: Request) {}

    /// A connection attempt; accept with [`WebSocket::connected`] or reject
    /// with [`WebSocket::close`].
    fn on_connect(&mut self, _socket: WebSocket) {}

    /// A frame sent by the script side.
    fn on_receive(&mut self, _socket: WebSocket, _data: String) {}

    /// The script side closed the connection.
    fn on_close(&mut self, _socket: WebSocket) {}
}

/// Shared runtime for delayed calls (timers only, no I/O).
static TIMERS: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("dispatch-timers")
        .enable_time()
        .build()
        .expect("Failed to build timer runtime")
});

/// Handle to the host, passed to [`Handler::on_startup`].
#[derive(Clone)]
pub struct Host {
    bridge: Bridge<Dispatcher>,
}

impl Host {
    pub(crate) fn new(bridge: Bridge<Dispatcher>) -> Self {
        Self { bridge }
    }

    /// Run `call` on the event-loop thread at the next opportunity.
    pub fn run_later(
        &self,
        call: impl FnOnce(&mut Dispatcher) + Send + 'static,
    ) -> Result<(), BridgeError> {
        self.bridge.post(call)
    }

    /// Run `call` on the event-loop thread once `delay` has passed.
    pub fn run_after(&self, delay: Duration, call: impl FnOnce(&mut Dispatcher) + Send + 'static) {
        let bridge = self.bridge.clone();
        TIMERS.spawn(async move {
            tokio::time::sleep(delay).await;
            if bridge.post(call).is_err() {
                log::debug!("[Host] timer fired after the event loop closed");
            }
        });
    }

    /// Ask the host to shut down.
    pub fn close(&self) -> Result<(), BridgeError> {
        self.bridge
            .post(|dispatcher: &mut Dispatcher| dispatcher.request_close())
    }

    pub fn bridge(&self) -> &Bridge<Dispatcher> {
        &self.bridge
    }
}
