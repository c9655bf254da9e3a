/// A request to be sent to the model provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ModelRequest {
    /// The conversation so far, oldest message first.
    pub messages: Vec<ModelMessage>,
}

/// A complete message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelMessage {
    /// A user input text.
    User(String),
    /// An assistant text.
    Assistant(String),
}

impl ModelMessage {
    /// Returns the role name used by chat-completion APIs.
    #[inline]
    pub fn role(&self) -> &'static str {
        match self {
            ModelMessage::User(_) => "user",
            ModelMessage::Assistant(_) => "assistant",
        }
    }

    /// Returns the text of this message.
    #[inline]
    pub fn content(&self) -> &str {
        match self {
            ModelMessage::User(content) | ModelMessage::Assistant(content) => {
                content
            }
        }
    }
}
