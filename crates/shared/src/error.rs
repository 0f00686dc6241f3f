//! Error taxonomy for the turn pipeline.

use thiserror::Error;

/// Everything that can terminate a turn before a successful result.
///
/// `Cancelled` is a first-class terminal outcome rather than a fault: it
/// must never reach history and must leave the conversation context
/// untouched. Per-line decode failures are not represented here at all;
/// they are swallowed inside the stream decoder.
#[derive(Debug, Error)]
pub enum TurnError {
    /// No auth token could be obtained (markup changed, or not signed in).
    #[error("authentication token unavailable: {0}")]
    Auth(String),

    /// The upload init call returned no upload URL.
    #[error("image upload initialization failed: {0}")]
    UploadInit(String),

    /// The byte transfer to the upload URL failed.
    #[error("image upload transfer failed: {0}")]
    UploadTransfer(String),

    /// Connection failure or non-2xx opening the stream.
    #[error("network error: {0}")]
    Network(String),

    /// The stream ended with zero decodable lines. Distinct from a valid
    /// response whose text happens to be empty.
    #[error("stream ended with no decodable response")]
    EmptyStream,

    #[error("request cancelled")]
    Cancelled,
}

impl TurnError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TurnError::Cancelled)
    }
}

/// Engine preconditions, separate from turn outcomes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// A turn is already in flight; callers must cancel explicitly first.
    #[error("a turn is already in flight")]
    Busy,
}
