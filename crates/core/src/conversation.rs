//! Conversation-related types.

use ember_model::{ModelMessage, ModelRequest};
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::store::Store;

/// The storage slot the conversation is persisted under.
pub const HISTORY_KEY: &str = "chatHistory";

/// Who wrote a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person typing into the chat.
    User,
    /// The model, or the controller speaking for it when a request fails.
    Assistant,
}

impl Role {
    /// Returns the label shown next to messages of this role.
    #[inline]
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Assistant => "Assistant",
        }
    }

    /// Returns the lowercase role name.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single turn of the conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// The author of the message.
    pub role: Role,
    /// The message text, not escaped in any way.
    pub content: String,
}

impl Message {
    /// Creates a user message.
    #[inline]
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    #[inline]
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Creates the assistant turn recorded in place of a failed reply.
    #[inline]
    pub fn error<D: std::fmt::Display + ?Sized>(description: &D) -> Self {
        Self::assistant(format!("Error: {description}"))
    }

    fn to_model_message(&self) -> ModelMessage {
        match self.role {
            Role::User => ModelMessage::User(self.content.clone()),
            Role::Assistant => ModelMessage::Assistant(self.content.clone()),
        }
    }
}

/// An ordered list of messages.
///
/// Messages can only be appended or cleared all at once, which is what keeps
/// the persisted copy a plain snapshot of this list.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Returns the messages, oldest first.
    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the number of messages.
    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if there are no messages.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[inline]
    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    #[inline]
    pub(crate) fn clear(&mut self) {
        self.messages.clear();
    }

    /// Builds a model request carrying the whole history.
    pub fn to_model_request(&self) -> ModelRequest {
        ModelRequest {
            messages: self
                .messages
                .iter()
                .map(Message::to_model_message)
                .collect(),
        }
    }

    /// Loads the conversation from its slot, a missing slot is an empty
    /// conversation.
    pub async fn load<S: Store + ?Sized>(store: &S) -> Result<Self, Error> {
        let Some(value) = store.get(HISTORY_KEY).await? else {
            return Ok(Self::default());
        };
        let messages = serde_json::from_value::<Vec<Message>>(value)
            .map_err(|err| Error::Corrupted(err.to_string()))?;
        Ok(Self { messages })
    }

    /// Writes the whole conversation to its slot.
    pub async fn save<S: Store + ?Sized>(&self, store: &S) -> Result<(), Error> {
        let value = serde_json::to_value(&self.messages)?;
        store.update(HISTORY_KEY, value).await
    }
}

impl From<Vec<Message>> for Conversation {
    #[inline]
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}
