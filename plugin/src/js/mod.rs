//! Script Runtime
//!
//! A Boa context living on the event-loop thread. It exposes the `_wsExt`
//! native object (connect / send_to_server / client_close plus the onopen,
//! onmessage and onclose channels) and a browser-style `WebSocket` built only
//! on top of it.

mod native;
mod runtime;
mod shim;

pub use runtime::ScriptRuntime;
