//! Transport Bridge
//!
//! Marshals calls from any thread onto the single event-loop thread that owns
//! the engine-facing objects. A [`Bridge`] is the cheap, cloneable, `Send`
//! posting side; the [`EventLoop`] is the draining side and stays on its
//! thread.
//!
//! Calls posted from one thread run in posting order. Calls posted from
//! different threads interleave in arrival order.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, ThreadId};

use once_cell::unsync::OnceCell;

use crate::error::BridgeError;

/// A call scheduled to run against the loop-owned state.
pub type Task<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

/// Commands that travel to the event-loop thread.
enum LoopCommand<S> {
    /// Run a posted call.
    Call(Task<S>),
    /// Stop the loop after the commands already queued.
    Shutdown,
}

/// Posting handle for the event loop.
///
/// Cheap to clone and safe to share across threads. `post` never blocks.
pub struct Bridge<S> {
    sender: Sender<LoopCommand<S>>,
}

impl<S> Clone for Bridge<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<S: 'static> Bridge<S> {
    /// Schedule `call` to run on the event-loop thread.
    pub fn post(&self, call: impl FnOnce(&mut S) + Send + 'static) -> Result<(), BridgeError> {
        self.sender
            .send(LoopCommand::Call(Box::new(call)))
            .map_err(|_| BridgeError::Closed)
    }

    /// Ask the loop to stop once it reaches this point in the queue.
    pub fn shutdown(&self) {
        if self.sender.send(LoopCommand::Shutdown).is_err() {
            log::debug!("[Bridge] shutdown requested after the loop was dropped");
        }
    }
}

/// Outcome of waiting for one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    /// A call ran; keep going.
    Running,
    /// Shutdown was requested.
    Stopped,
}

/// The draining side of the bridge.
///
/// The loop binds to the first thread that drains it. Draining it from any
/// other thread afterwards is a programming error and panics.
pub struct EventLoop<S> {
    receiver: Receiver<LoopCommand<S>>,
    bridge: Bridge<S>,
    owner: OnceCell<ThreadId>,
    stopped: bool,
}

impl<S: 'static> EventLoop<S> {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            receiver,
            bridge: Bridge { sender },
            owner: OnceCell::new(),
            stopped: false,
        }
    }

    /// A posting handle for this loop.
    pub fn bridge(&self) -> Bridge<S> {
        self.bridge.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Run every call queued right now without blocking. Returns how many ran.
    pub fn run_pending(&mut self, state: &mut S) -> usize {
        self.check_thread();

        let mut ran = 0;
        while !self.stopped {
            match self.receiver.try_recv() {
                Ok(command) => {
                    if self.apply(command, state) == LoopStatus::Running {
                        ran += 1;
                    }
                }
                Err(TryRecvError::Empty) => break,
                // Unreachable while we hold our own sender.
                Err(TryRecvError::Disconnected) => {
                    self.stopped = true;
                }
            }
        }
        ran
    }

    /// Block until one command arrives and run it.
    pub fn wait(&mut self, state: &mut S) -> LoopStatus {
        self.check_thread();

        if self.stopped {
            return LoopStatus::Stopped;
        }

        match self.receiver.recv() {
            Ok(command) => self.apply(command, state),
            Err(e) => {
                log::error!("[Bridge] event loop channel error: {}", e);
                self.stopped = true;
                LoopStatus::Stopped
            }
        }
    }

    fn apply(&mut self, command: LoopCommand<S>, state: &mut S) -> LoopStatus {
        match command {
            LoopCommand::Call(call) => {
                call(state);
                LoopStatus::Running
            }
            LoopCommand::Shutdown => {
                log::info!("[Bridge] event loop shutting down");
                self.stopped = true;
                LoopStatus::Stopped
            }
        }
    }

    fn check_thread(&self) {
        let current = thread::current().id();
        let owner = *self.owner.get_or_init(|| current);
        assert_eq!(
            owner, current,
            "event loop drained from a thread other than its owner"
        );
    }
}

impl<S: 'static> Default for EventLoop<S> {
    fn default() -> Self {
        Self::new()
    }
}
