//! A chat with a model served by a local Ollama server.
//!
//! The crate includes a CLI tool for chatting in the terminal, or for
//! driving the conversation from another process over JSON lines. You can
//! also use it as a library to bring the chat into your own host apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod bridge;
mod config;
mod error;
mod session;

pub use config::{Config, HOST_ENV, MODEL_ENV, STATE_PATH_ENV};
pub use error::Error;
pub use session::{Session, SessionBuilder};

/// Re-exports of [`ember_core`] crate.
pub mod core {
    pub use ember_core::*;
}
