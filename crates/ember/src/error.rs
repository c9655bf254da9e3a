use std::io;

/// Errors from running a session outside of the conversation itself.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The conversation could not be loaded or saved.
    #[error(transparent)]
    Core(#[from] ember_core::Error),
    /// Reading requests or writing notifications failed.
    #[error("bridge I/O failed: {0}")]
    Io(#[from] io::Error),
    /// A notification could not be encoded.
    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),
}
