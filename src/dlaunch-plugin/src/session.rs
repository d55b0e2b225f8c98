//! A provider backed by an external process or socket server.

use crate::items::ItemSet;
use crate::options::{OptionsError, ProviderOptions};
use crate::protocol::{self, BatchParser, FramingError, Reply};
use crate::retry::RetryThrottle;
use crate::transport::{Backend, ReadStatus, Transport, TransportError};
use dlaunch_core::{ActivationMode, Interest, Provider, ProviderResult, Registrar};
use std::time::Instant;
use thiserror::Error;

const READ_CHUNK: usize = 4096;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error("backend closed the connection before the reply was complete")]
    UnexpectedEof,
    #[error("blocking read returned no data")]
    NoReply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    /// Connected with no request outstanding.
    Idle,
    /// Query sent, reply byte not read yet.
    AwaitingReply,
    /// A batch is being received.
    Streaming,
}

pub struct ExternalProvider {
    name: String,
    options: ProviderOptions,
    transport: Transport,
    state: SessionState,
    items: ItemSet,
    parser: Option<BatchParser>,
    /// Latest text typed while a batch was streaming.
    pending_query: Option<String>,
    retry: RetryThrottle,
}

impl ExternalProvider {
    pub fn new(name: impl Into<String>, entry: impl Into<String>, options: ProviderOptions) -> Self {
        let transport = Transport::new(Backend::from_entry(options.kind, entry));
        let retry = RetryThrottle::new(options.retry_command.clone(), options.retry_delay);
        Self {
            name: name.into(),
            options,
            transport,
            state: SessionState::Disconnected,
            items: ItemSet::new(),
            parser: None,
            pending_query: None,
            retry,
        }
    }

    /// Build a provider from its declared name, backend entry and option string.
    pub fn from_declaration(
        name: impl Into<String>,
        entry: impl Into<String>,
        options: &str,
    ) -> Result<Self, OptionsError> {
        Ok(Self::new(name, entry, ProviderOptions::parse(options)?))
    }

    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }

    pub fn backend(&self) -> &Backend {
        self.transport.backend()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// False while a reply is outstanding.
    pub fn is_ready(&self) -> bool {
        !matches!(
            self.state,
            SessionState::AwaitingReply | SessionState::Streaming
        )
    }

    pub fn pending_query(&self) -> Option<&str> {
        self.pending_query.as_deref()
    }

    pub fn restart_attempts(&self) -> usize {
        self.retry.fired()
    }

    /// Drop the connection and any outstanding request.
    pub fn disconnect(&mut self) {
        self.items.clear();
        self.parser = None;
        self.pending_query = None;
        self.transport.close();
        self.state = SessionState::Disconnected;
    }

    fn ensure_connected(&mut self) -> Result<(), SessionError> {
        if self.transport.is_connected() {
            return Ok(());
        }
        self.state = SessionState::Connecting;
        self.transport.connect()?;
        self.state = SessionState::Idle;
        tracing::info!(
            provider = %self.name,
            backend = %self.transport.backend().describe(),
            "provider connected"
        );
        Ok(())
    }

    fn exchange(&mut self, text: &str) -> Result<usize, SessionError> {
        self.ensure_connected()?;
        self.transport.set_nonblocking(false)?;
        self.transport.write_all(&protocol::encode_query(text))?;
        self.state = SessionState::AwaitingReply;

        match self.read_reply()? {
            Reply::Filter => {
                // The backend's claim that `text` refines the previous query is
                // not checked here.
                tracing::debug!(provider = %self.name, query = %text, "filtering cached items");
                self.items.refilter(text);
                self.state = SessionState::Idle;
            }
            Reply::Clear => {
                self.items.clear();
                self.parser = Some(BatchParser::new());
                self.state = SessionState::Streaming;
                if self.options.asynchronous {
                    self.transport.set_nonblocking(true)?;
                } else {
                    self.read_batch_blocking()?;
                }
            }
        }
        Ok(self.items.len())
    }

    fn read_reply(&mut self) -> Result<Reply, SessionError> {
        let mut byte = [0u8; 1];
        match self.transport.read(&mut byte)? {
            ReadStatus::Data(_) => Ok(Reply::from_byte(byte[0])?),
            ReadStatus::Closed => Err(SessionError::UnexpectedEof),
            ReadStatus::WouldBlock => Err(SessionError::NoReply),
        }
    }

    fn read_batch_blocking(&mut self) -> Result<(), SessionError> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match self.transport.read(&mut buf)? {
                ReadStatus::Data(n) => {
                    if self.feed(&buf[..n])? {
                        return Ok(());
                    }
                }
                ReadStatus::Closed => return Err(SessionError::UnexpectedEof),
                ReadStatus::WouldBlock => return Err(SessionError::NoReply),
            }
        }
    }

    /// Read until the backend has nothing more buffered. Returns `true` once
    /// the batch is complete.
    fn drain(&mut self) -> Result<bool, SessionError> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match self.transport.read(&mut buf)? {
                ReadStatus::Data(n) => {
                    if self.feed(&buf[..n])? {
                        return Ok(true);
                    }
                }
                ReadStatus::WouldBlock => return Ok(false),
                ReadStatus::Closed => return Err(SessionError::UnexpectedEof),
            }
        }
    }

    fn feed(&mut self, bytes: &[u8]) -> Result<bool, SessionError> {
        let Some(parser) = self.parser.as_mut() else {
            return Ok(true);
        };
        if !parser.feed(bytes)? {
            return Ok(false);
        }
        if let Some(parser) = self.parser.take() {
            self.items.replace(parser.into_items());
        }
        self.state = SessionState::Idle;
        tracing::debug!(provider = %self.name, items = self.items.len(), "batch complete");
        Ok(true)
    }

    fn send_activation(&mut self, text: &str, mode: ActivationMode) -> Result<(), SessionError> {
        self.ensure_connected()?;
        let restore = self.transport.is_nonblocking();
        self.transport.set_nonblocking(false)?;
        self.transport
            .write_all(&protocol::encode_activation(text, mode))?;
        if restore {
            self.transport.set_nonblocking(true)?;
        }
        Ok(())
    }

    fn fail(&mut self, err: &SessionError) {
        tracing::warn!(provider = %self.name, error = %err, "provider session failed");
        if let Some(query) = self.pending_query.as_deref() {
            tracing::debug!(provider = %self.name, query = %query, "dropping queued query");
        }
        self.disconnect();
        if self.retry.trigger(Instant::now()) {
            tracing::info!(provider = %self.name, "restart command triggered");
        }
    }
}

impl Provider for ExternalProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.options.priority
    }

    fn records_history(&self) -> bool {
        self.options.history
    }

    fn init(&mut self) {
        tracing::debug!(
            provider = %self.name,
            backend = %self.transport.backend().describe(),
            asynchronous = self.options.asynchronous,
            "provider registered"
        );
    }

    fn query(&mut self, input: &str) -> usize {
        if self.state == SessionState::Streaming {
            tracing::debug!(provider = %self.name, query = %input, "batch in flight, queueing query");
            self.pending_query = Some(input.to_string());
            return self.items.len();
        }
        self.pending_query = None;

        match self.exchange(input) {
            Ok(count) => count,
            Err(err) => {
                self.fail(&err);
                0
            }
        }
    }

    fn before_update<'a>(&'a self, registrar: &mut Registrar<'_, 'a>) {
        if self.state != SessionState::Streaming {
            return;
        }
        if let Some(fd) = self.transport.poll_fd() {
            registrar.register(fd, Interest::READ | Interest::STATUS);
        }
    }

    fn update(&mut self) -> usize {
        if self.state != SessionState::Streaming {
            return self.items.len();
        }
        match self.drain() {
            Ok(true) => {
                if let Some(next) = self.pending_query.take() {
                    tracing::debug!(provider = %self.name, query = %next, "sending queued query");
                    return self.query(&next);
                }
            }
            Ok(false) => {}
            Err(err) => self.fail(&err),
        }
        self.items.len()
    }

    fn item_count(&self) -> usize {
        self.items.len()
    }

    fn description(&self, index: usize) -> ProviderResult<&str> {
        self.items.get(index).map(|item| item.description.as_str())
    }

    fn action_text(&self, index: usize) -> ProviderResult<&str> {
        self.items.get(index).map(|item| item.action.as_str())
    }

    fn open(&mut self, index: Option<usize>, fallback: &str, mode: ActivationMode) -> bool {
        let text = match index.and_then(|i| self.items.get(i).ok()) {
            Some(item) => item.action.clone(),
            None => fallback.to_string(),
        };
        match self.send_activation(&text, mode) {
            Ok(()) => {
                tracing::info!(provider = %self.name, action = %text, ?mode, "activation sent");
                true
            }
            Err(err) => {
                self.fail(&err);
                false
            }
        }
    }

    fn housekeeping(&mut self) {
        self.retry.reap();
    }
}
