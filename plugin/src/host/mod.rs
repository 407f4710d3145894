//! Hosts
//!
//! Owners of the event loop. [`LoopThread`] runs it on a dedicated thread;
//! [`DispatchPlugin`] runs it on Bevy's main thread and pumps it every frame.

mod plugin;
mod runner;

pub use plugin::{DispatchBridge, DispatchLoop, DispatchPlugin};
pub use runner::LoopThread;
