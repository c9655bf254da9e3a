//! Core logic of the chat: conversation state, persistence, the controller
//! that streams model replies, and the notifications it sends to whatever
//! renders the transcript.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod controller;
pub mod conversation;
mod error;
mod model_client;
pub mod notification;
pub mod store;
pub mod transcript;

pub use controller::{Controller, EMPTY_INPUT_NOTICE, SubmitOutcome};
pub use conversation::{Conversation, Message, Role};
pub use error::Error;
pub use model_client::{ModelClient, ModelClientResponse, RetryPolicy};
pub use notification::{Notification, Renderer, UiRequest};
pub use store::Store;
