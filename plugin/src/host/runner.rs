use std::io;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use crate::bridge::{Bridge, EventLoop, LoopStatus};
use crate::config::DispatchConfig;
use crate::dispatcher::Dispatcher;
use crate::error::BridgeError;
use crate::handler::Handler;

/// Event loop running on its own thread.
///
/// The engine side is driven with [`post`](Self::post) or [`call`](Self::call);
/// the handler sees the usual callbacks on the loop thread. The loop stops on
/// [`shutdown`](Self::shutdown) or after [`Host::close`](crate::Host::close).
pub struct LoopThread {
    bridge: Bridge<Dispatcher>,
    handle: Option<JoinHandle<()>>,
}

impl LoopThread {
    pub fn spawn<H: Handler + Send>(handler: H, config: DispatchConfig) -> io::Result<Self> {
        let event_loop = EventLoop::new();
        let bridge = event_loop.bridge();

        let handle = thread::Builder::new()
            .name("dispatch-loop".into())
            .spawn(move || {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    run_loop(event_loop, handler, config);
                }));

                if let Err(e) = result {
                    log::error!("Dispatch loop panicked: {:?}", e);
                }
            })?;

        Ok(Self {
            bridge,
            handle: Some(handle),
        })
    }

    pub fn bridge(&self) -> Bridge<Dispatcher> {
        self.bridge.clone()
    }

    /// Run `call` on the loop thread without waiting for it.
    pub fn post(&self, call: impl FnOnce(&mut Dispatcher) + Send + 'static) -> Result<(), BridgeError> {
        self.bridge.post(call)
    }

    /// Run `call` on the loop thread and wait for its result.
    ///
    /// Must not be called from the loop thread itself.
    pub fn call<R: Send + 'static>(
        &self,
        call: impl FnOnce(&mut Dispatcher) -> R + Send + 'static,
    ) -> Result<R, BridgeError> {
        let (sender, receiver) = mpsc::sync_channel(1);
        self.bridge.post(move |dispatcher: &mut Dispatcher| {
            let _ = sender.send(call(dispatcher));
        })?;
        receiver.recv().map_err(|_| BridgeError::Closed)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the loop to stop on its own.
    pub fn join(mut self) {
        self.join_thread();
    }

    /// Stop the loop after the calls already queued and wait for it.
    pub fn shutdown(mut self) {
        self.bridge.shutdown();
        self.join_thread();
    }

    fn join_thread(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Dispatch loop thread could not be joined");
            }
        }
    }
}

impl Drop for LoopThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.bridge.shutdown();
            self.join_thread();
        }
    }
}

fn run_loop<H: Handler>(mut event_loop: EventLoop<Dispatcher>, handler: H, config: DispatchConfig) {
    log::info!("Dispatch loop thread started");

    let mut dispatcher = Dispatcher::new(event_loop.bridge(), config);
    dispatcher.set_handler(handler);
    dispatcher.startup();
    dispatcher.flush_script_events();

    while event_loop.wait(&mut dispatcher) == LoopStatus::Running {
        dispatcher.flush_script_events();
        if dispatcher.close_requested() {
            break;
        }
    }

    dispatcher.shutdown();
    log::info!("Dispatch loop thread stopped");
}
