use crate::commands::CompletionCode;

/// Observer for session activity.
///
/// The session reports command attempts, retries, failures and responses
/// through this trait instead of mutating global counters. All methods
/// have empty default bodies, so an implementation only overrides what it
/// cares about.
pub trait SessionObserver: Send {
    /// A command is about to be sent for the first time.
    fn command_attempt(&self, _command: &str) {}

    /// A previously sent command is being retried.
    fn command_retry(&self, _command: &str) {}

    /// A command failed without producing a completion code.
    fn command_failure(&self, _command: &str) {}

    /// A command round-trip completed with `code`.
    fn command_response(&self, _command: &str, _code: CompletionCode) {}

    /// A session reached the established state.
    fn session_established(&self) {}

    /// A session was closed (whether or not the BMC confirmed).
    fn session_closed(&self) {}
}

/// The default observer: discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl SessionObserver for NoOpObserver {}
