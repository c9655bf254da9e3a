//! Messages exchanged between the controller and the rendering surface.
//!
//! Both directions serialize to JSON objects tagged by a `command` field,
//! e.g. `{"command":"updateStreamingText","text":"Hel"}`, so a surface living
//! in another process (a webview, an editor panel) can speak the protocol
//! directly.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::conversation::Message;

/// A notification from the controller to the renderer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Notification {
    /// A complete message was appended to the conversation.
    AddMessage {
        /// The appended message.
        message: Message,
    },
    /// The reply being streamed has grown. `text` is everything received so
    /// far, not just the latest delta.
    UpdateStreamingText {
        /// The cumulative reply text.
        text: String,
    },
    /// The streamed reply is complete and has been appended.
    FinalizeMessage {
        /// The final assistant message.
        message: Message,
    },
    /// The conversation was cleared.
    ClearMessages,
    /// The model started answering.
    StartTyping,
    /// The model stopped answering, successfully or not.
    StopTyping,
    /// A transient notice that is not part of the conversation.
    Error {
        /// The notice text.
        text: String,
    },
}

/// A request from the renderer to the controller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum UiRequest {
    /// The user submitted a prompt.
    Chat {
        /// The raw input, validated by the controller.
        #[serde(default)]
        text: String,
    },
    /// The user asked to wipe the conversation.
    ClearHistory,
}

/// A surface that displays the conversation.
///
/// Notifications arrive in the order the controller produced them, and a
/// renderer is expected to apply them without blocking.
pub trait Renderer: Send {
    /// Applies a notification.
    fn notify(&mut self, notification: Notification);
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    #[inline]
    fn notify(&mut self, notification: Notification) {
        (**self).notify(notification)
    }
}

/// Forwards notifications to another task. A closed channel drops them.
impl Renderer for mpsc::UnboundedSender<Notification> {
    #[inline]
    fn notify(&mut self, notification: Notification) {
        if self.send(notification).is_err() {
            trace!("renderer channel closed, notification dropped");
        }
    }
}

/// Records notifications, mostly useful in tests.
impl Renderer for Vec<Notification> {
    #[inline]
    fn notify(&mut self, notification: Notification) {
        self.push(notification);
    }
}
