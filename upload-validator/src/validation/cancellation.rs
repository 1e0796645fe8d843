//! Cancellation and deadlines for in-flight validations

use crate::error::ValidatorError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// A cancellation token shared between the server and running validations
///
/// Cloning is cheap; every clone observes the same signal. The server holds one
/// token for its whole lifetime and cancels it on shutdown, which aborts every
/// validation still waiting on its stream.
///
/// # Examples
///
/// ```rust
/// use upload_validator::validation::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let token = CancellationToken::new();
///     let child = token.clone();
///
///     token.cancel();
///     child.cancelled().await;
///     assert!(child.is_cancelled());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<CancellationState>,
}

#[derive(Debug)]
struct CancellationState {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    /// Create a new cancellation token
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            state: Arc::new(CancellationState { tx, rx }),
        }
    }

    /// Check if cancellation has been requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.state.rx.borrow()
    }

    /// Request cancellation of every clone of this token
    pub fn cancel(&self) {
        let _ = self.state.tx.send(true);
        debug!("Cancellation requested");
    }

    /// Wait for cancellation signal
    ///
    /// Returns immediately if already cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.state.rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                // Sender dropped, treat as cancelled
                break;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-call execution context: a cancellation token and an optional deadline
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    /// Aborts the validation when cancelled
    pub cancel: CancellationToken,

    /// Absolute deadline for consuming the stream
    pub deadline: Option<Instant>,
}

impl ValidationContext {
    /// Context bound to an existing token, without a deadline
    #[must_use]
    pub const fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Sets the deadline to `timeout` from now
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Fails fast if the context is already spent
    ///
    /// # Errors
    ///
    /// Returns [`ValidatorError::Cancelled`] or [`ValidatorError::DeadlineExceeded`].
    pub fn check(&self) -> Result<(), ValidatorError> {
        if self.cancel.is_cancelled() {
            return Err(ValidatorError::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(ValidatorError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Resolves when the deadline passes; never resolves without one
    pub async fn deadline_elapsed(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }
}
