use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// A deadline and cancellation signal that bounds blocking operations.
///
/// A `Context` is handed to every operation that may suspend (transport
/// round-trips and backoff sleeps). Deriving a tighter context with
/// [`Context::bounded`] shares the cancellation flag with the parent, so
/// cancelling the parent cancels every derived context as well.
#[derive(Debug, Clone)]
pub struct Context {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

/// A handle that cancels the [`Context`] it was created from.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Cancel the associated context.
    ///
    /// In-flight operations observe the cancellation at their next
    /// suspension point and return [`ContextError::Cancelled`].
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContextError {
    Cancelled,
    DeadlineExceeded,
}

impl Context {
    /// A context without a deadline that is never cancelled.
    pub fn background() -> Self {
        Self {
            deadline: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a handle that can be used to cancel this context from
    /// another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancelled))
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Time left until the deadline. `None` if no deadline is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Return an error if this context is cancelled or past its deadline.
    pub fn check(&self) -> Result<(), ContextError> {
        if self.is_cancelled() {
            Err(ContextError::Cancelled)
        } else if self.remaining().is_some_and(|left| left.is_zero()) {
            Err(ContextError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }

    /// Derive a context whose deadline is at most `timeout` from now,
    /// sharing this context's cancellation flag.
    pub fn bounded(&self, timeout: Duration) -> Self {
        let attempt_deadline = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(deadline) => deadline.min(attempt_deadline),
            None => attempt_deadline,
        };

        Self {
            deadline: Some(deadline),
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    /// Sleep for `duration`, waking early on cancellation or deadline expiry.
    pub fn sleep(&self, duration: Duration) -> Result<(), ContextError> {
        const SLICE: Duration = Duration::from_millis(50);

        let wakeup = Instant::now() + duration;

        loop {
            self.check()?;

            let left = wakeup.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Ok(());
            }

            std::thread::sleep(left.min(SLICE));
        }
    }
}
