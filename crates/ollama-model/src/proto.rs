use ember_model::{ModelMessage, ModelRequest};
use serde::{Deserialize, Serialize};

use crate::OllamaConfig;

// ------------------------------
// Types received from the server
// ------------------------------

/// One line of a streamed `/api/chat` response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct ChatResponseChunk {
    pub message: Option<ResponseMessage>,
    #[serde(default)]
    pub done: bool,
    pub done_reason: Option<String>,
    /// Set when the server fails after the stream has started.
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: String,
}

/// Error body of a non-successful HTTP response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    User { content: String },
    Assistant { content: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
}

// -----------
// Conversions
// -----------

#[inline]
pub fn create_request(req: &ModelRequest, config: &OllamaConfig) -> ChatRequest {
    ChatRequest {
        model: config.model.clone(),
        messages: req.messages.iter().map(create_message).collect(),
        stream: true,
    }
}

#[inline]
fn create_message(msg: &ModelMessage) -> Message {
    match msg {
        ModelMessage::User(content) => Message::User {
            content: content.clone(),
        },
        ModelMessage::Assistant(content) => Message::Assistant {
            content: content.clone(),
        },
    }
}
