//! # Local transport interception for embedded content engines
//!
//! An embedded engine believes it talks to a server; every request it makes is
//! handed to an application [`Handler`] instead and answered with a fake reply
//! (immediate, streamed, or aborted). WebSocket connections opened by the
//! engine's scripts are emulated the same way.
//!
//! All engine-facing state lives in a [`Dispatcher`] owned by one event-loop
//! thread. Handler code may run anywhere: [`Request`] and [`WebSocket`]
//! handles post their calls back through a [`Bridge`].
//!
//! ## Example
//!
//! ```no_run
//! use webview_dispatch::{DispatchConfig, Handler, LoopThread, Request};
//!
//! struct Hello;
//!
//! impl Handler for Hello {
//!     fn on_request(&mut self, mut request: Request) {
//!         if let Err(e) = request.found("hello", "text/plain") {
//!             eprintln!("reply dropped: {}", e);
//!         }
//!     }
//! }
//!
//! let host = LoopThread::spawn(Hello, DispatchConfig::default()).unwrap();
//! let outcome = host
//!     .call(|dispatcher| {
//!         dispatcher.intercept("GET", "app://local/", Vec::<(String, String)>::new(), None)
//!     })
//!     .unwrap();
//! println!("{:?}", outcome);
//! host.shutdown();
//! ```

pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod host;
pub mod js;
pub mod message;
pub mod reply;
pub mod request;
pub mod websocket;

pub use bridge::{Bridge, EventLoop, LoopStatus, Task};
pub use config::{AvailableBytes, DispatchConfig};
pub use dispatcher::{Dispatcher, Intercept};
pub use error::{BridgeError, ConfigError, DispatchError, MessageError, ReplyError, SocketError};
pub use handler::{Handler, Host};
pub use host::{DispatchBridge, DispatchLoop, DispatchPlugin, LoopThread};
pub use js::ScriptRuntime;
pub use message::{Headers, Message, Method, Status, guess_content_type, reason_phrase};
pub use reply::{ReplyEvent, ReplyId, ReplyState, ReplyStream};
pub use request::Request;
pub use websocket::{
    ConnectionId, ConnectionRegistry, ScriptEvent, WS_CLOSED, WS_CLOSING, WS_CONNECTING, WS_OPEN,
    WebSocket,
};
