//! Fake Reply
//!
//! The state machine behind one intercepted request. The handler side fills it
//! (through the bridge), the engine side drains it with pull-based reads.
//!
//! ```text
//! Pending ──respond(body)──► ImmediateReady ───────────────┐
//!    │                                                     ├─drained─► Finished
//!    └──respond(no body)──► StreamingOpen ──close──► StreamingClosed
//!                               ▲   │
//!                               └───┘ write
//! any state but Finished ──abort──► Aborted
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::AvailableBytes;
use crate::error::ReplyError;
use crate::message::{Headers, Message, Status};

/// Identifies one fake reply within a dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReplyId(pub(crate) u64);

impl ReplyId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ReplyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyState {
    /// Created, no response yet.
    Pending,
    /// Full content known, waiting to be drained.
    ImmediateReady,
    /// Content arrives in chunks.
    StreamingOpen,
    /// No more chunks, waiting to be drained.
    StreamingClosed,
    /// Drained and completion signalled.
    Finished,
    /// Cancelled by the engine.
    Aborted,
}

impl ReplyState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReplyState::Finished | ReplyState::Aborted)
    }
}

/// Notifications queued for the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyEvent {
    /// Status and headers are fixed and readable.
    MetaDataReady,
    /// More bytes can be read.
    ReadyRead,
    /// Everything was read and no more content will arrive. Sent once.
    Finished,
    /// The reply was cancelled.
    Aborted,
}

pub struct ReplyStream {
    id: ReplyId,
    state: ReplyState,
    status: Option<Status>,
    headers: Headers,
    content_length: Option<u64>,
    content: Vec<u8>,
    offset: usize,
    aborted: Arc<AtomicBool>,
    available_bytes: AvailableBytes,
    events: VecDeque<ReplyEvent>,
}

impl ReplyStream {
    pub fn new(id: ReplyId, available_bytes: AvailableBytes) -> Self {
        Self {
            id,
            state: ReplyState::Pending,
            status: None,
            headers: Headers::new(),
            content_length: None,
            content: Vec::new(),
            offset: 0,
            aborted: Arc::new(AtomicBool::new(false)),
            available_bytes,
            events: VecDeque::new(),
        }
    }

    pub fn id(&self) -> ReplyId {
        self.id
    }

    pub fn state(&self) -> ReplyState {
        self.state
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Declared or computed content length. `None` for streams without one.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn is_aborted(&self) -> bool {
        self.state == ReplyState::Aborted
    }

    /// Abort flag shared with the handler-side request handle.
    pub(crate) fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.aborted)
    }

    /// Fix status and headers. A message with a body completes the reply, one
    /// without starts a stream.
    pub fn respond(&mut self, status: Status, message: Message) -> Result<(), ReplyError> {
        self.check_not_aborted()?;
        if self.state != ReplyState::Pending {
            return Err(ReplyError::AlreadyResponded);
        }

        let (mut headers, body) = message.into_parts();
        let declared = headers
            .get("Content-Length")
            .and_then(|v| v.parse::<u64>().ok());

        log::debug!("[Reply {}] respond {}", self.id, status);
        self.status = Some(status);

        match body {
            Some(body) => {
                if declared.is_none() {
                    headers.set("Content-Length", body.len().to_string());
                }
                self.content_length = declared.or(Some(body.len() as u64));
                self.headers = headers;
                self.content = body;
                self.state = ReplyState::ImmediateReady;
                self.events.push_back(ReplyEvent::MetaDataReady);
                if !self.content.is_empty() {
                    self.events.push_back(ReplyEvent::ReadyRead);
                }
            }
            None => {
                self.content_length = declared;
                self.headers = headers;
                self.state = ReplyState::StreamingOpen;
                self.events.push_back(ReplyEvent::MetaDataReady);
            }
        }

        self.try_finish();
        Ok(())
    }

    /// Append a chunk to a streaming reply.
    pub fn write(&mut self, chunk: &[u8]) -> Result<(), ReplyError> {
        self.check_not_aborted()?;
        match self.state {
            ReplyState::StreamingOpen => {}
            ReplyState::Pending => return Err(ReplyError::NotResponded),
            ReplyState::ImmediateReady => return Err(ReplyError::NotStreaming),
            _ => return Err(ReplyError::Closed),
        }

        if chunk.is_empty() {
            return Ok(());
        }

        log::debug!("[Reply {}] write {} bytes", self.id, chunk.len());
        self.content.extend_from_slice(chunk);
        self.events.push_back(ReplyEvent::ReadyRead);
        Ok(())
    }

    /// End a streaming reply.
    pub fn close(&mut self) -> Result<(), ReplyError> {
        self.check_not_aborted()?;
        match self.state {
            ReplyState::StreamingOpen => {}
            ReplyState::Pending => return Err(ReplyError::NotResponded),
            ReplyState::ImmediateReady => return Err(ReplyError::NotStreaming),
            _ => return Err(ReplyError::Closed),
        }

        log::debug!("[Reply {}] stream closed", self.id);
        self.state = ReplyState::StreamingClosed;
        self.try_finish();
        Ok(())
    }

    /// Engine-side cancellation. Returns false if the reply had already finished
    /// or was already aborted.
    pub fn abort(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }

        log::info!("[Reply {}] aborted in state {:?}", self.id, self.state);
        self.aborted.store(true, Ordering::SeqCst);
        self.state = ReplyState::Aborted;
        self.events.push_back(ReplyEvent::Aborted);
        true
    }

    /// Bytes the engine may read now.
    pub fn bytes_available(&self) -> usize {
        if self.state == ReplyState::Aborted {
            return 0;
        }

        let remaining = self.content.len() - self.offset;
        match self.available_bytes {
            AvailableBytes::Remaining => remaining,
            AvailableBytes::FullContent { below } => {
                let applies = below.is_none_or(|limit| self.content.len() < limit);
                if remaining > 0 && applies {
                    self.content.len()
                } else {
                    remaining
                }
            }
        }
    }

    /// Read up to `max_size` bytes. `None` means nothing is available right now;
    /// completion is only signalled through [`ReplyEvent::Finished`].
    pub fn read(&mut self, max_size: usize) -> Option<Vec<u8>> {
        if self.state == ReplyState::Aborted || max_size == 0 {
            return None;
        }
        if self.offset >= self.content.len() {
            return None;
        }

        let end = self.offset + max_size.min(self.content.len() - self.offset);
        let data = self.content[self.offset..end].to_vec();
        self.offset = end;
        self.try_finish();
        Some(data)
    }

    /// Drain the queued engine notifications.
    pub fn take_events(&mut self) -> Vec<ReplyEvent> {
        self.events.drain(..).collect()
    }

    fn check_not_aborted(&self) -> Result<(), ReplyError> {
        if self.state == ReplyState::Aborted {
            Err(ReplyError::Aborted)
        } else {
            Ok(())
        }
    }

    fn try_finish(&mut self) {
        let complete = matches!(
            self.state,
            ReplyState::ImmediateReady | ReplyState::StreamingClosed
        );
        if complete && self.offset >= self.content.len() {
            log::debug!("[Reply {}] finished ({} bytes)", self.id, self.content.len());
            self.state = ReplyState::Finished;
            self.events.push_back(ReplyEvent::Finished);
        }
    }
}

impl fmt::Debug for ReplyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyStream")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("status", &self.status)
            .field("buffered", &self.content.len())
            .field("offset", &self.offset)
            .finish()
    }
}
