use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn an asset reference into a loadable URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot resolve '{input}': {reason}")]
pub struct PathResolutionError {
    pub input: String,
    pub reason: String,
}

/// Failure to fetch or parse the kiosk configuration document.
///
/// Always transient: the synchronizer keeps the last good snapshot and tries
/// again on the next poll.
#[derive(Debug, Error)]
pub enum ConfigFetchError {
    #[error("configuration document {path} is not readable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("configuration document is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("action id {0} appears more than once")]
    DuplicateActionId(i64),
}

/// Error reported by a media surface call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct MediaError(pub String);

/// Terminal outcome of a failed playback session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("media could not be prepared: {0}")]
    MediaPrepare(String),
    #[error("playback stalled and did not recover after {attempts} attempts")]
    StallTimeout { attempts: u32 },
    #[error("playback failed: {0}")]
    Media(String),
}

/// A host command that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("host command '{command}' failed: {reason}")]
pub struct HostCommandError {
    pub command: &'static str,
    pub reason: String,
}

impl HostCommandError {
    pub fn new(command: &'static str, reason: impl Into<String>) -> Self {
        Self {
            command,
            reason: reason.into(),
        }
    }
}

/// Errors shown inside the action gate. The display strings are user-facing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("Incorrect PIN")]
    PinMismatch,
    #[error("Configuration not loaded")]
    ConfigurationMissing,
    #[error("Could not close the application")]
    CloseFailed(#[source] HostCommandError),
    #[error("Could not power off the computer")]
    ShutdownFailed(#[source] HostCommandError),
}

/// Reasons an action selection does not open a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectError {
    #[error("Configuration not loaded yet")]
    NoConfiguration,
    #[error("Unknown action {0}")]
    UnknownAction(i64),
    #[error("An animation is already playing")]
    SessionOpen,
    #[error("Close the menu first")]
    GateOpen,
    #[error("Animation file unavailable: {0}")]
    Unresolved(#[from] PathResolutionError),
    #[error("Animation could not be started: {0}")]
    Prepare(#[from] PlaybackError),
}
