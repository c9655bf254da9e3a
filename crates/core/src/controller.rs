#[cfg(test)]
mod tests;

use ember_model::{ModelProviderError, ModelRequest};

use crate::Error;
use crate::conversation::{Conversation, Message};
use crate::model_client::ModelClient;
use crate::notification::{Notification, Renderer, UiRequest};
use crate::store::Store;

/// The notice shown when a blank prompt is submitted.
pub const EMPTY_INPUT_NOTICE: &str = "Please enter a question or prompt.";

/// What happened to a submitted prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The prompt was blank, nothing was appended.
    Rejected,
    /// The model replied, the reply is the last message.
    Completed(Message),
    /// The request or the stream failed, an error turn was appended instead
    /// of the reply.
    Failed(Message),
}

/// Owns a conversation and drives it: forwards prompts to the model, streams
/// the reply to the renderer and keeps the stored copy up to date.
///
/// Every mutation is written to the store before the renderer hears about
/// it. A failed write aborts the operation and is returned to the caller,
/// the in-memory conversation is not rolled back.
pub struct Controller<S, R> {
    conversation: Conversation,
    store: S,
    renderer: R,
    model_client: ModelClient,
}

impl<S: Store, R: Renderer> Controller<S, R> {
    /// Creates a controller, picking up the conversation persisted in
    /// `store`.
    ///
    /// Nothing is sent to the renderer, call [`Controller::restore`] to show
    /// the loaded history.
    pub async fn load(
        store: S,
        renderer: R,
        model_client: ModelClient,
    ) -> Result<Self, Error> {
        let conversation = Conversation::load(&store).await?;
        debug!("loaded conversation with {} messages", conversation.len());
        Ok(Self {
            conversation,
            store,
            renderer,
            model_client,
        })
    }

    /// Returns the current conversation.
    #[inline]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Returns the renderer.
    #[inline]
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Returns the renderer mutably.
    #[inline]
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// Replays the whole history to the renderer, for a surface that
    /// attaches to an existing conversation.
    pub fn restore(&mut self) {
        for message in self.conversation.messages() {
            self.renderer.notify(Notification::AddMessage {
                message: message.clone(),
            });
        }
    }

    /// Submits a prompt and waits until the reply is complete.
    ///
    /// Endpoint failures are not errors here, they end up in the
    /// conversation as an error turn and the outcome says so. Only store
    /// failures are returned as `Err`.
    pub async fn submit(&mut self, text: &str) -> Result<SubmitOutcome, Error> {
        let text = text.trim();
        if text.is_empty() {
            self.renderer.notify(Notification::Error {
                text: EMPTY_INPUT_NOTICE.to_owned(),
            });
            return Ok(SubmitOutcome::Rejected);
        }

        let message = Message::user(text);
        self.append(message.clone()).await?;
        self.renderer.notify(Notification::AddMessage { message });

        let req = self.conversation.to_model_request();
        match self.stream_reply(req).await {
            Ok(content) => {
                self.renderer.notify(Notification::StopTyping);
                let message = Message::assistant(content);
                self.append(message.clone()).await?;
                self.renderer.notify(Notification::FinalizeMessage {
                    message: message.clone(),
                });
                Ok(SubmitOutcome::Completed(message))
            }
            Err(err) => {
                warn!("model request failed: {err}");
                let message = Message::error(&*err);
                self.append(message.clone()).await?;
                self.renderer.notify(Notification::AddMessage {
                    message: message.clone(),
                });
                self.renderer.notify(Notification::StopTyping);
                Ok(SubmitOutcome::Failed(message))
            }
        }
    }

    /// Removes every message.
    pub async fn clear(&mut self) -> Result<(), Error> {
        self.conversation.clear();
        self.conversation.save(&self.store).await?;
        self.renderer.notify(Notification::ClearMessages);
        Ok(())
    }

    /// Dispatches a request coming from the renderer.
    pub async fn handle(&mut self, req: UiRequest) -> Result<(), Error> {
        match req {
            UiRequest::Chat { text } => {
                self.submit(&text).await?;
            }
            UiRequest::ClearHistory => self.clear().await?,
        }
        Ok(())
    }

    async fn append(&mut self, message: Message) -> Result<(), Error> {
        self.conversation.push(message);
        self.conversation.save(&self.store).await
    }

    async fn stream_reply(
        &mut self,
        req: ModelRequest,
    ) -> Result<String, Box<dyn ModelProviderError>> {
        let mut resp = self.model_client.send_request(req).await?;
        self.renderer.notify(Notification::StartTyping);

        // Updates carry the whole reply so far, not the delta.
        let mut buffer = String::new();
        while let Some(delta) = resp.next_delta().await? {
            buffer.push_str(&delta);
            self.renderer.notify(Notification::UpdateStreamingText {
                text: buffer.clone(),
            });
        }
        debug!("reply complete ({} bytes)", buffer.len());
        Ok(buffer)
    }
}
