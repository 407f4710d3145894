//! Bevy host
//!
//! Keeps the dispatcher on Bevy's main thread as a non-send resource and
//! drains its event loop once per frame.

use std::ops::Deref;
use std::sync::Mutex;

use bevy::prelude::*;

use crate::bridge::{Bridge, EventLoop};
use crate::config::DispatchConfig;
use crate::dispatcher::Dispatcher;
use crate::handler::Handler;

/// The event loop and the state it drives. Only reachable from the main
/// thread (`NonSend` / `NonSendMut`), which makes it the event-loop thread.
pub struct DispatchLoop {
    event_loop: EventLoop<Dispatcher>,
    dispatcher: Dispatcher,
}

impl DispatchLoop {
    pub fn new(config: DispatchConfig) -> Self {
        let event_loop = EventLoop::new();
        let dispatcher = Dispatcher::new(event_loop.bridge(), config);
        Self {
            event_loop,
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The engine-facing side. Call it from systems that own the engine.
    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    /// Run every queued call, then deliver socket events to the script side.
    /// Returns how many calls ran.
    pub fn pump(&mut self) -> usize {
        let ran = self.event_loop.run_pending(&mut self.dispatcher);
        self.dispatcher.flush_script_events();
        ran
    }
}

/// Bevy Resource wrapper for the loop's posting handle, usable from any system.
#[derive(Resource, Clone)]
pub struct DispatchBridge(Bridge<Dispatcher>);

impl Deref for DispatchBridge {
    type Target = Bridge<Dispatcher>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Bevy plugin installing the dispatcher.
///
/// ## Usage
///
/// ```ignore
/// App::new()
///     .add_plugins(DispatchPlugin::new(MyHandler, DispatchConfig::default()))
///     .run();
/// ```
pub struct DispatchPlugin {
    /// Taken once in `build` (wrapped for interior mutability).
    handler: Mutex<Option<Box<dyn Handler + Send>>>,
    config: DispatchConfig,
}

impl DispatchPlugin {
    pub fn new(handler: impl Handler + Send, config: DispatchConfig) -> Self {
        Self {
            handler: Mutex::new(Some(Box::new(handler))),
            config,
        }
    }

    fn take_handler(&self) -> Option<Box<dyn Handler + Send>> {
        self.handler.lock().ok().and_then(|mut guard| guard.take())
    }
}

impl Plugin for DispatchPlugin {
    fn build(&self, app: &mut App) {
        let mut dispatch = DispatchLoop::new(self.config.clone());
        match self.take_handler() {
            Some(handler) => dispatch.dispatcher_mut().set_boxed_handler(handler),
            None => log::warn!("DispatchPlugin built twice, second instance has no handler"),
        }

        app.insert_resource(DispatchBridge(dispatch.dispatcher().bridge()));
        app.insert_non_send_resource(dispatch);
        app.add_systems(Startup, start_dispatcher)
            .add_systems(Update, pump_dispatcher);

        log::info!("Dispatch plugin configured");
    }
}

fn start_dispatcher(mut dispatch: NonSendMut<DispatchLoop>) {
    dispatch.dispatcher_mut().startup();
    dispatch.pump();
}

/// Drain the loop each frame and exit once the handler asked to close.
fn pump_dispatcher(mut dispatch: NonSendMut<DispatchLoop>, mut exit: MessageWriter<AppExit>) {
    dispatch.pump();

    if dispatch.dispatcher().close_requested() {
        dispatch.dispatcher_mut().shutdown();
        exit.write(AppExit::Success);
    }
}
