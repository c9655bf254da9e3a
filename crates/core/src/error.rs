use std::io;
use std::path::PathBuf;

/// Errors from reading or writing the persisted conversation.
///
/// Endpoint failures never show up here, the controller turns them into
/// conversation turns instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backing file could not be read or written.
    #[error("failed to access {}: {source}", path.display())]
    Io {
        /// The file being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The state could not be encoded or decoded.
    #[error("failed to encode stored state: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A stored slot holds a value of the wrong shape.
    #[error("stored conversation is corrupted: {0}")]
    Corrupted(String),
    /// The store refused the operation.
    #[error("storage is unavailable: {0}")]
    Unavailable(String),
}
