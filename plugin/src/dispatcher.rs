//! Dispatcher
//!
//! The state owned by the event-loop thread: every live fake reply, the
//! WebSocket registry, the optional script runtime and the application
//! handler. The engine calls into it directly (it runs on the same thread);
//! handler-side handles reach it through the [`Bridge`].

use std::collections::HashMap;
use std::rc::Rc;

use url::Url;

use crate::bridge::Bridge;
use crate::config::DispatchConfig;
use crate::error::{DispatchError, ReplyError};
use crate::handler::{Handler, Host};
use crate::js::ScriptRuntime;
use crate::message::{Message, Method};
use crate::reply::{ReplyEvent, ReplyId, ReplyStream};
use crate::request::Request;
use crate::websocket::{ConnectionId, ConnectionRegistry};

/// Outcome of [`Dispatcher::intercept`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intercept {
    /// Answered locally. Poll the reply with this id.
    Local(ReplyId),
    /// Nobody handles this request; the caller should use the real network.
    PassThrough,
}

/// Event-loop-owned state behind every interception.
///
/// Replies stay in the table after they finish, so the engine can still read
/// metadata and drain events. Each one is dropped only by
/// [`release`](Self::release); an engine that never releases its replies
/// keeps them all.
pub struct Dispatcher {
    handler: Option<Box<dyn Handler>>,
    replies: HashMap<ReplyId, ReplyStream>,
    next_reply: u64,
    sockets: Rc<ConnectionRegistry>,
    script: Option<ScriptRuntime>,
    config: DispatchConfig,
    bridge: Bridge<Dispatcher>,
    started: bool,
    close_requested: bool,
}

impl Dispatcher {
    /// Create the dispatcher for the loop behind `bridge`.
    pub fn new(bridge: Bridge<Dispatcher>, config: DispatchConfig) -> Self {
        let sockets = Rc::new(ConnectionRegistry::new(bridge.clone()));

        let script = if config.script_runtime {
            match ScriptRuntime::new(Rc::clone(&sockets)) {
                Ok(runtime) => Some(runtime),
                Err(e) => {
                    log::error!("[Dispatcher] failed to start script runtime: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            handler: None,
            replies: HashMap::new(),
            next_reply: 1,
            sockets,
            script,
            config,
            bridge,
            started: false,
            close_requested: false,
        }
    }

    pub fn set_handler(&mut self, handler: impl Handler) {
        self.set_boxed_handler(Box::new(handler));
    }

    pub fn set_boxed_handler(&mut self, handler: Box<dyn Handler>) {
        if self.handler.is_some() {
            log::warn!("[Dispatcher] replacing the registered handler");
        }
        self.handler = Some(handler);
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn bridge(&self) -> Bridge<Dispatcher> {
        self.bridge.clone()
    }

    /// Call [`Handler::on_startup`]. Only the first call has an effect.
    pub fn startup(&mut self) {
        if self.started {
            return;
        }
        self.started = true;

        log::info!("[Dispatcher] starting up");
        let host = Host::new(self.bridge.clone());
        self.with_handler(|handler| handler.on_startup(host));
    }

    /// Intercept one outgoing engine request.
    ///
    /// Never blocks: the handler receives the [`Request`] on a later turn of
    /// the loop, and the engine polls the reply by id in the meantime.
    pub fn intercept<I, K, V>(
        &mut self,
        method: impl Into<Method>,
        url: &str,
        headers: I,
        body: Option<&[u8]>,
    ) -> Result<Intercept, DispatchError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<[u8]>,
    {
        let method = method.into();
        let parsed = Url::parse(url).map_err(|source| DispatchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        let wanted = self
            .handler
            .as_deref()
            .is_some_and(|handler| handler.intercepts(&method, &parsed));
        if !wanted {
            log::debug!("[Dispatcher] pass-through {} {}", method, url);
            return Ok(Intercept::PassThrough);
        }

        let message = Message::from_raw(headers, body)?;

        let id = ReplyId(self.next_reply);
        self.next_reply += 1;
        let reply = ReplyStream::new(id, self.config.available_bytes);
        let request = Request::new(
            method.clone(),
            parsed,
            message,
            id,
            reply.abort_flag(),
            self.bridge.clone(),
        );
        self.replies.insert(id, reply);

        log::info!("[Reply {}] {} {}", id, method, url);
        let posted = self.bridge.post(move |dispatcher: &mut Dispatcher| {
            dispatcher.with_handler(|handler| handler.on_request(request));
        });
        if posted.is_err() {
            log::warn!("[Reply {}] event loop closed, request not delivered", id);
        }

        Ok(Intercept::Local(id))
    }

    /// Open an emulated WebSocket for the script side.
    pub fn open_socket(&mut self, url: &str) -> ConnectionId {
        self.sockets.connect(url)
    }

    pub fn sockets(&self) -> &Rc<ConnectionRegistry> {
        &self.sockets
    }

    pub fn reply(&self, id: ReplyId) -> Option<&ReplyStream> {
        self.replies.get(&id)
    }

    pub fn reply_mut(&mut self, id: ReplyId) -> Option<&mut ReplyStream> {
        self.replies.get_mut(&id)
    }

    /// Number of replies the engine has not released yet.
    pub fn live_replies(&self) -> usize {
        self.replies.len()
    }

    pub fn bytes_available(&self, id: ReplyId) -> usize {
        self.replies
            .get(&id)
            .map(ReplyStream::bytes_available)
            .unwrap_or(0)
    }

    pub fn read(&mut self, id: ReplyId, max_size: usize) -> Option<Vec<u8>> {
        self.replies.get_mut(&id)?.read(max_size)
    }

    /// Drain the notifications queued for one reply.
    pub fn take_events(&mut self, id: ReplyId) -> Vec<ReplyEvent> {
        self.replies
            .get_mut(&id)
            .map(ReplyStream::take_events)
            .unwrap_or_default()
    }

    /// Engine-side cancellation.
    pub fn abort(&mut self, id: ReplyId) -> bool {
        self.replies
            .get_mut(&id)
            .is_some_and(ReplyStream::abort)
    }

    /// The engine dropped its reply object. An unfinished reply is aborted so
    /// the handler stops producing.
    pub fn release(&mut self, id: ReplyId) -> Option<ReplyStream> {
        let mut reply = self.replies.remove(&id)?;
        reply.abort();
        log::debug!("[Reply {}] released in state {:?}", id, reply.state());
        Some(reply)
    }

    /// Deliver queued socket events to the script runtime and run its pending
    /// jobs. Without a script runtime the events stay queued in the registry.
    pub fn flush_script_events(&mut self) {
        let Some(script) = self.script.as_mut() else {
            return;
        };

        for event in self.sockets.take_events() {
            if let Err(e) = script.deliver(&event) {
                log::error!("[WebSocket {}] {} handler failed: {}", event.id(), event.channel(), e);
            }
        }
        script.run_jobs();
    }

    pub fn script(&self) -> Option<&ScriptRuntime> {
        self.script.as_ref()
    }

    pub fn script_mut(&mut self) -> Option<&mut ScriptRuntime> {
        self.script.as_mut()
    }

    /// Ask the host to stop. See [`Host::close`].
    pub fn request_close(&mut self) {
        log::info!("[Dispatcher] close requested");
        self.close_requested = true;
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    /// Close every connection and abort every unfinished reply.
    pub fn shutdown(&mut self) {
        log::info!(
            "[Dispatcher] shutting down ({} replies, {} sockets)",
            self.replies.len(),
            self.sockets.len()
        );
        self.sockets.close_all();
        self.flush_script_events();
        for reply in self.replies.values_mut() {
            reply.abort();
        }
    }

    /// Run `call` against the handler, if one is registered.
    pub(crate) fn with_handler(&mut self, call: impl FnOnce(&mut dyn Handler)) {
        match self.handler.as_deref_mut() {
            Some(handler) => call(handler),
            None => log::debug!("[Dispatcher] no handler registered, event dropped"),
        }
    }

    /// Apply a handler-side mutation to a reply. Failures were already
    /// reported to the handler where they could be detected; here they are
    /// only logged.
    pub(crate) fn apply(
        &mut self,
        id: ReplyId,
        change: impl FnOnce(&mut ReplyStream) -> Result<(), ReplyError>,
    ) {
        let Some(reply) = self.replies.get_mut(&id) else {
            log::debug!("[Reply {}] released, handler update ignored", id);
            return;
        };

        match change(reply) {
            Ok(()) => {}
            Err(e) if e.is_aborted() => log::debug!("[Reply {}] update after abort ignored", id),
            Err(e) => log::warn!("[Reply {}] handler update rejected: {}", id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::EventLoop;
    use crate::message::Status;
    use crate::reply::ReplyState;

    struct NotFound;

    impl Handler for NotFound {
        fn intercepts(&self, _method: &Method, url: &Url) -> bool {
            url.path() != "/external"
        }

        fn on_request(&mut self, mut request: Request) {
            // The engine may have released the reply before the handler runs.
            if let Err(e) = request.not_found("missing") {
                assert!(e.is_aborted(), "unexpected error: {}", e);
            }
        }
    }

    fn dispatcher(handler: Option<NotFound>) -> (EventLoop<Dispatcher>, Dispatcher) {
        let event_loop = EventLoop::new();
        let config = DispatchConfig::new().with_script_runtime(false);
        let mut dispatcher = Dispatcher::new(event_loop.bridge(), config);
        if let Some(handler) = handler {
            dispatcher.set_handler(handler);
        }
        (event_loop, dispatcher)
    }

    fn no_headers() -> Vec<(String, String)> {
        Vec::new()
    }

    #[test]
    fn missing_handler_passes_through() {
        let (_loop, mut dispatcher) = dispatcher(None);
        let outcome = dispatcher
            .intercept("GET", "http://app.local/a", no_headers(), None)
            .unwrap();
        assert_eq!(outcome, Intercept::PassThrough);
        assert_eq!(dispatcher.live_replies(), 0);
    }

    #[test]
    fn filtered_url_passes_through() {
        let (_loop, mut dispatcher) = dispatcher(Some(NotFound));
        let outcome = dispatcher
            .intercept("GET", "http://app.local/external", no_headers(), None)
            .unwrap();
        assert_eq!(outcome, Intercept::PassThrough);
    }

    #[test]
    fn invalid_url_is_an_error() {
        let (_loop, mut dispatcher) = dispatcher(Some(NotFound));
        let err = dispatcher
            .intercept("GET", "not a url", no_headers(), None)
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidUrl { .. }));
    }

    #[test]
    fn handler_runs_on_a_later_turn() {
        let (mut event_loop, mut dispatcher) = dispatcher(Some(NotFound));
        let Intercept::Local(id) = dispatcher
            .intercept("GET", "http://app.local/a", no_headers(), None)
            .unwrap()
        else {
            panic!("expected a local reply");
        };

        assert_eq!(dispatcher.reply(id).map(ReplyStream::state), Some(ReplyState::Pending));
        assert_eq!(dispatcher.bytes_available(id), 0);

        // on_request, then the posted respond
        assert_eq!(event_loop.run_pending(&mut dispatcher), 2);

        let reply = dispatcher.reply(id).unwrap();
        assert_eq!(reply.status(), Some(&Status::new(404)));
        assert_eq!(dispatcher.read(id, 100), Some(b"missing".to_vec()));
        assert_eq!(dispatcher.reply(id).map(ReplyStream::state), Some(ReplyState::Finished));
    }

    #[test]
    fn released_reply_ignores_late_updates() {
        let (mut event_loop, mut dispatcher) = dispatcher(Some(NotFound));
        let Intercept::Local(id) = dispatcher
            .intercept("GET", "http://app.local/a", no_headers(), None)
            .unwrap()
        else {
            panic!("expected a local reply");
        };

        let released = dispatcher.release(id).unwrap();
        assert_eq!(released.state(), ReplyState::Aborted);
        event_loop.run_pending(&mut dispatcher);
        assert!(dispatcher.reply(id).is_none());
        assert_eq!(dispatcher.read(id, 10), None);
    }

    #[test]
    fn finished_reply_is_kept_until_released() {
        let (mut event_loop, mut dispatcher) = dispatcher(Some(NotFound));
        let Intercept::Local(id) = dispatcher
            .intercept("GET", "http://app.local/a", no_headers(), None)
            .unwrap()
        else {
            panic!("expected a local reply");
        };
        event_loop.run_pending(&mut dispatcher);
        while dispatcher.read(id, 100).is_some() {}

        assert!(dispatcher.take_events(id).contains(&ReplyEvent::Finished));
        assert_eq!(dispatcher.live_replies(), 1);
        assert_eq!(dispatcher.reply(id).map(ReplyStream::state), Some(ReplyState::Finished));

        let released = dispatcher.release(id).unwrap();
        assert_eq!(released.state(), ReplyState::Finished);
        assert_eq!(dispatcher.live_replies(), 0);
    }

    #[test]
    fn startup_runs_once() {
        struct Counting(std::sync::Arc<std::sync::atomic::AtomicUsize>);
        impl Handler for Counting {
            fn on_startup(&mut self, _host: Host) {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        }

        let count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let (_loop, mut dispatcher) = dispatcher(None);
        dispatcher.set_handler(Counting(count.clone()));
        dispatcher.startup();
        dispatcher.startup();
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
