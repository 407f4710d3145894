//! Intercepted requests, as seen by the handler.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{Stream, StreamExt, pin_mut};
use url::Url;

use crate::bridge::Bridge;
use crate::dispatcher::Dispatcher;
use crate::error::ReplyError;
use crate::message::{Headers, Message, Method, Status, guess_content_type};
use crate::reply::ReplyId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Pending,
    Responded,
    Streaming,
    Closed,
}

/// One intercepted request paired with its fake reply.
///
/// The handle is `Send`: answer it on the event-loop thread or move it to a
/// worker. Every mutation is posted to the event loop; the calls return an
/// error right away when the engine has already aborted the reply or when the
/// call is out of order.
pub struct Request {
    method: Method,
    url: Url,
    message: Message,
    reply: ReplyId,
    aborted: Arc<AtomicBool>,
    bridge: Bridge<Dispatcher>,
    phase: Phase,
}

impl Request {
    pub(crate) fn new(
        method: Method,
        url: Url,
        message: Message,
        reply: ReplyId,
        aborted: Arc<AtomicBool>,
        bridge: Bridge<Dispatcher>,
    ) -> Self {
        Self {
            method,
            url,
            message,
            reply,
            aborted,
            bridge,
            phase: Phase::Pending,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn fragment(&self) -> Option<&str> {
        self.url.fragment()
    }

    /// Query parameters; repeated keys keep every value in order.
    pub fn query_pairs(&self) -> HashMap<String, Vec<String>> {
        let mut pairs: HashMap<String, Vec<String>> = HashMap::new();
        for (key, value) in self.url.query_pairs() {
            pairs
                .entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }
        pairs
    }

    /// Headers and body sent by the engine.
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn reply_id(&self) -> ReplyId {
        self.reply
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Respond with `message`. With a body the reply is complete; without one
    /// the reply streams and must be fed with [`write`](Self::write) and ended
    /// with [`close`](Self::close).
    pub fn respond(&mut self, status: impl Into<Status>, message: Message) -> Result<(), ReplyError> {
        self.check_not_aborted()?;
        if self.phase != Phase::Pending {
            return Err(ReplyError::AlreadyResponded);
        }

        let streaming = !message.has_body();
        let status = status.into();
        let id = self.reply;
        self.bridge.post(move |dispatcher: &mut Dispatcher| {
            dispatcher.apply(id, |reply| reply.respond(status, message));
        })?;

        self.phase = if streaming {
            Phase::Streaming
        } else {
            Phase::Responded
        };
        Ok(())
    }

    /// Start a streaming reply. A body on `message` becomes the first chunk.
    pub fn respond_streaming(
        &mut self,
        status: impl Into<Status>,
        message: Message,
    ) -> Result<(), ReplyError> {
        let (headers, body) = message.into_parts();
        self.respond(status, Message::from_parts(headers, None))?;
        match body {
            Some(body) => self.write(body),
            None => Ok(()),
        }
    }

    /// Append a chunk to a streaming reply.
    pub fn write(&mut self, chunk: impl Into<Vec<u8>>) -> Result<(), ReplyError> {
        self.check_not_aborted()?;
        self.check_streaming()?;

        let chunk = chunk.into();
        let id = self.reply;
        self.bridge.post(move |dispatcher: &mut Dispatcher| {
            dispatcher.apply(id, |reply| reply.write(&chunk));
        })?;
        Ok(())
    }

    /// End a streaming reply.
    pub fn close(&mut self) -> Result<(), ReplyError> {
        self.check_not_aborted()?;
        self.check_streaming()?;

        let id = self.reply;
        self.bridge.post(move |dispatcher: &mut Dispatcher| {
            dispatcher.apply(id, |reply| reply.close());
        })?;
        self.phase = Phase::Closed;
        Ok(())
    }

    /// Stream every chunk of `chunks` into the reply, then close it.
    ///
    /// Responds with `status` and `message` first when nothing was sent yet.
    /// Stops with [`ReplyError::Aborted`] as soon as the engine cancels.
    pub async fn pipe<S, B>(
        mut self,
        status: impl Into<Status>,
        message: Message,
        chunks: S,
    ) -> Result<(), ReplyError>
    where
        S: Stream<Item = B>,
        B: Into<Vec<u8>>,
    {
        if self.phase == Phase::Pending {
            self.respond_streaming(status, message)?;
        }

        pin_mut!(chunks);
        while let Some(chunk) = chunks.next().await {
            self.write(chunk)?;
        }
        self.close()
    }

    /// Respond with `404 Not Found` and a plain-text message.
    pub fn not_found(&mut self, msg: &str) -> Result<(), ReplyError> {
        self.respond(Status::new(404), plain_text(msg))
    }

    /// Respond with `410 Gone` and a plain-text message.
    pub fn gone(&mut self, msg: &str) -> Result<(), ReplyError> {
        self.respond(Status::new(410), plain_text(msg))
    }

    /// Respond with `302 Found` pointing at `location`.
    pub fn redirect(&mut self, location: &str) -> Result<(), ReplyError> {
        self.respond(Status::new(302), with_header("Location", location, Vec::new()))
    }

    /// Respond with `200 Found` and `body`.
    pub fn found(&mut self, body: impl Into<Vec<u8>>, content_type: &str) -> Result<(), ReplyError> {
        self.respond(
            Status::with_reason(200, "Found"),
            with_header("Content-Type", content_type, body),
        )
    }

    /// Respond with `200` and the contents of a file. The content type is
    /// guessed from the extension unless given.
    pub fn found_file(
        &mut self,
        path: impl AsRef<Path>,
        content_type: Option<&str>,
    ) -> Result<(), ReplyError> {
        let path = path.as_ref();
        let body = std::fs::read(path)?;
        let content_type = content_type
            .unwrap_or_else(|| guess_content_type(&path.to_string_lossy()));
        self.found(body, content_type)
    }

    fn check_not_aborted(&self) -> Result<(), ReplyError> {
        if self.is_aborted() {
            Err(ReplyError::Aborted)
        } else {
            Ok(())
        }
    }

    fn check_streaming(&self) -> Result<(), ReplyError> {
        match self.phase {
            Phase::Streaming => Ok(()),
            Phase::Pending => Err(ReplyError::NotResponded),
            Phase::Responded => Err(ReplyError::NotStreaming),
            Phase::Closed => Err(ReplyError::Closed),
        }
    }
}

fn plain_text(msg: &str) -> Message {
    with_header("Content-Type", "text/plain", msg)
}

fn with_header(name: &str, value: &str, body: impl Into<Vec<u8>>) -> Message {
    let mut headers = Headers::new();
    headers.set(name, value.trim().to_string());
    Message::from_parts(headers, Some(body.into()))
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("reply", &self.reply)
            .field("phase", &self.phase)
            .finish()
    }
}
