//! An abstraction layer for chat-completion backends.
//!
//! This crate establishes a small protocol between the conversation
//! controller and the services that actually run the model, so that the
//! controller can stream replies from a local server, a remote one or a
//! scripted fake without knowing which one it talks to.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
