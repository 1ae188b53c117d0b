//! Error and close policies.
//!
//! The client never surfaces transport faults to callers directly. Every error
//! or close event is handed to an [`ErrorHandler`], whose answer alone decides
//! whether the client keeps going, shuts down, or reconnects.
use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::ConnectionError;

/// What to do after a transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Keep the connection and stay active.
    Continue,
    /// Shut the client down without reconnecting.
    ShutDown,
}

/// What to do after the transport closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Stop the client.
    DoNotReconnect,
    /// Run the full activation sequence again.
    Reconnect,
}

/// Decides how the client reacts to transport faults.
pub trait ErrorHandler: Send + Sync {
    /// Called for every error reported by the active connection.
    fn error(
        &self,
        error: &ConnectionError,
        message: Option<&serde_json::Value>,
        count: Option<u32>,
    ) -> ErrorAction;

    /// Called when the active connection closes.
    fn closed(&self) -> CloseAction;
}

/// Continues on every error and never reconnects.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {
    fn error(
        &self,
        _error: &ConnectionError,
        _message: Option<&serde_json::Value>,
        _count: Option<u32>,
    ) -> ErrorAction {
        ErrorAction::Continue
    }

    fn closed(&self) -> CloseAction {
        CloseAction::DoNotReconnect
    }
}

type ErrorCallback =
    Box<dyn Fn(&ConnectionError, Option<&serde_json::Value>, Option<u32>) -> ErrorAction + Send + Sync>;
type CloseCallback = Box<dyn Fn() -> CloseAction + Send + Sync>;

/// Adapts a pair of caller-supplied closures to [`ErrorHandler`].
pub struct CallbackErrorHandler {
    on_error: ErrorCallback,
    on_closed: CloseCallback,
}

impl CallbackErrorHandler {
    /// Wrap the two decision callbacks.
    pub fn new<E, C>(on_error: E, on_closed: C) -> Self
    where
        E: Fn(&ConnectionError, Option<&serde_json::Value>, Option<u32>) -> ErrorAction
            + Send
            + Sync
            + 'static,
        C: Fn() -> CloseAction + Send + Sync + 'static,
    {
        Self {
            on_error: Box::new(on_error),
            on_closed: Box::new(on_closed),
        }
    }
}

impl ErrorHandler for CallbackErrorHandler {
    fn error(
        &self,
        error: &ConnectionError,
        message: Option<&serde_json::Value>,
        count: Option<u32>,
    ) -> ErrorAction {
        (self.on_error)(error, message, count)
    }

    fn closed(&self) -> CloseAction {
        (self.on_closed)()
    }
}

impl std::fmt::Debug for CallbackErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackErrorHandler").finish_non_exhaustive()
    }
}

/// Bounded recovery: shuts down after too many errors and stops
/// reconnecting once the server restarts too often.
#[derive(Debug)]
pub struct RestartLimitErrorHandler {
    max_errors: u32,
    max_restarts: u32,
    window: Duration,
    restarts: Mutex<VecDeque<Instant>>,
}

impl RestartLimitErrorHandler {
    /// Create a handler.
    ///
    /// `max_errors` of 0 means errors never shut the client down.
    /// `max_restarts` of 0 means the client never reconnects.
    pub fn new(max_errors: u32, max_restarts: u32, window: Duration) -> Self {
        Self {
            max_errors,
            max_restarts,
            window,
            restarts: Mutex::new(VecDeque::new()),
        }
    }

    /// Number of reconnects granted inside the current window.
    pub fn recent_restarts(&self) -> usize {
        let mut restarts = self.restarts.lock();
        Self::expire(&mut restarts, self.window);
        restarts.len()
    }

    fn expire(restarts: &mut VecDeque<Instant>, window: Duration) {
        let now = Instant::now();
        while let Some(oldest) = restarts.front() {
            if now.duration_since(*oldest) >= window {
                restarts.pop_front();
            } else {
                break;
            }
        }
    }
}

impl ErrorHandler for RestartLimitErrorHandler {
    fn error(
        &self,
        _error: &ConnectionError,
        _message: Option<&serde_json::Value>,
        count: Option<u32>,
    ) -> ErrorAction {
        match count {
            Some(count) if self.max_errors > 0 && count >= self.max_errors => ErrorAction::ShutDown,
            _ => ErrorAction::Continue,
        }
    }

    fn closed(&self) -> CloseAction {
        if self.max_restarts == 0 {
            return CloseAction::DoNotReconnect;
        }
        let mut restarts = self.restarts.lock();
        Self::expire(&mut restarts, self.window);
        if restarts.len() >= self.max_restarts as usize {
            tracing::warn!(
                "server closed {} times in the last {:?}; not reconnecting",
                restarts.len(),
                self.window
            );
            return CloseAction::DoNotReconnect;
        }
        restarts.push_back(Instant::now());
        CloseAction::Reconnect
    }
}
