//! A rendering surface that keeps the transcript in memory.
//!
//! [`Transcript`] applies notifications the way a chat panel does: it keeps
//! the list of bubbles, the typing indicator, the state of the send button
//! and whether the view should stick to the bottom. It can render the
//! bubbles to HTML, escaping all message text.

use std::fmt::Write;

use crate::conversation::{Message, Role};
use crate::notification::{Notification, Renderer, UiRequest};

/// How close to the end of the history, in display units, the view must be
/// to keep following new output.
pub const NEAR_BOTTOM_THRESHOLD: f64 = 50.0;

/// Escapes text for insertion into HTML, both as element content and inside
/// quoted attributes.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Renders messages as chat bubbles.
pub fn render_messages<'a, I>(messages: I) -> String
where
    I: IntoIterator<Item = &'a Message>,
{
    let mut html = String::new();
    for message in messages {
        let role = message.role.as_str();
        // Writing to a `String` never fails.
        let _ = write!(
            html,
            "<div class=\"message {role}\" data-role=\"{role}\">\
             <div class=\"bubble\"><strong>{label}:</strong>\
             <p>{content}</p></div></div>",
            label = message.role.label(),
            content = escape_html(&message.content),
        );
    }
    html
}

/// Tracks whether the user is reading the latest output or has scrolled
/// back.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScrollState {
    near_bottom: bool,
}

impl Default for ScrollState {
    #[inline]
    fn default() -> Self {
        Self { near_bottom: true }
    }
}

impl ScrollState {
    /// Records a scroll position reported by the view.
    pub fn on_scroll(
        &mut self,
        scroll_height: f64,
        scroll_top: f64,
        client_height: f64,
    ) {
        self.near_bottom =
            scroll_height - scroll_top - client_height < NEAR_BOTTOM_THRESHOLD;
    }

    /// Returns `true` if new output should scroll the view to the end.
    #[inline]
    pub fn is_near_bottom(&self) -> bool {
        self.near_bottom
    }
}

/// An in-memory chat panel.
#[derive(Clone, Debug)]
pub struct Transcript {
    entries: Vec<Message>,
    typing: bool,
    send_enabled: bool,
    scroll: ScrollState,
    scroll_requested: bool,
}

impl Default for Transcript {
    fn default() -> Self {
        Self {
            entries: vec![],
            typing: false,
            send_enabled: true,
            scroll: ScrollState::default(),
            scroll_requested: false,
        }
    }
}

impl Transcript {
    /// Creates a transcript showing `messages`.
    pub fn with_messages<I: IntoIterator<Item = Message>>(messages: I) -> Self {
        Self {
            entries: messages.into_iter().collect(),
            // Opening the panel starts at the latest message.
            scroll_requested: true,
            ..Default::default()
        }
    }

    /// Returns the displayed entries, oldest first.
    #[inline]
    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    /// Returns `true` while the typing indicator is shown.
    #[inline]
    pub fn is_typing(&self) -> bool {
        self.typing
    }

    /// Returns `true` if the send button is enabled.
    #[inline]
    pub fn is_send_enabled(&self) -> bool {
        self.send_enabled
    }

    /// Returns the scroll tracking state.
    #[inline]
    pub fn scroll(&self) -> &ScrollState {
        &self.scroll
    }

    /// Returns the scroll tracking state mutably, to feed scroll events.
    #[inline]
    pub fn scroll_mut(&mut self) -> &mut ScrollState {
        &mut self.scroll
    }

    /// Returns `true` once if the view should jump to the end since the last
    /// call.
    #[inline]
    pub fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.scroll_requested)
    }

    /// Turns the input box content into a chat request.
    ///
    /// Returns `None` when the input is blank or a reply is still being
    /// waited for. Otherwise the send button stays disabled until the reply
    /// ends.
    pub fn begin_send(&mut self, input: &str) -> Option<UiRequest> {
        let text = input.trim();
        if text.is_empty() || !self.send_enabled {
            return None;
        }
        self.send_enabled = false;
        Some(UiRequest::Chat {
            text: text.to_owned(),
        })
    }

    /// Renders the displayed entries as HTML.
    #[inline]
    pub fn render_html(&self) -> String {
        render_messages(&self.entries)
    }

    fn last_assistant_mut(&mut self) -> Option<&mut Message> {
        self.entries
            .last_mut()
            .filter(|entry| entry.role == Role::Assistant)
    }
}

impl Renderer for Transcript {
    fn notify(&mut self, notification: Notification) {
        match notification {
            Notification::AddMessage { message } => self.entries.push(message),
            Notification::UpdateStreamingText { text } => {
                match self.last_assistant_mut() {
                    Some(entry) => entry.content = text,
                    None => self.entries.push(Message::assistant(text)),
                }
            }
            Notification::FinalizeMessage { message } => {
                if let Some(entry) = self.last_assistant_mut() {
                    entry.content = message.content;
                }
                self.send_enabled = true;
            }
            Notification::ClearMessages => {
                self.entries.clear();
                self.typing = false;
            }
            Notification::StartTyping => self.typing = true,
            Notification::StopTyping => {
                self.typing = false;
                self.send_enabled = true;
            }
            Notification::Error { text } => {
                self.entries.push(Message::assistant(text));
                // A failed save can cut a reply short before `stopTyping`.
                self.typing = false;
                self.send_enabled = true;
            }
        }
        if self.scroll.is_near_bottom() {
            self.scroll_requested = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#039;Jerry&#039;&lt;/b&gt;"
        );
        assert_eq!(escape_html("plain text"), "plain text");
        // Escaping is not idempotent, entities get escaped again.
        assert_eq!(escape_html("&amp;"), "&amp;amp;");
    }

    #[test]
    fn test_render_messages() {
        let html = render_messages(&[
            Message::user("<script>alert(1)</script>"),
            Message::assistant("4"),
        ]);
        assert_eq!(
            html,
            "<div class=\"message user\" data-role=\"user\">\
             <div class=\"bubble\"><strong>You:</strong>\
             <p>&lt;script&gt;alert(1)&lt;/script&gt;</p></div></div>\
             <div class=\"message assistant\" data-role=\"assistant\">\
             <div class=\"bubble\"><strong>Assistant:</strong>\
             <p>4</p></div></div>"
        );
        assert_eq!(render_messages(std::iter::empty()), "");
    }

    #[test]
    fn test_scroll_state() {
        let mut scroll = ScrollState::default();
        assert!(scroll.is_near_bottom());

        scroll.on_scroll(1000.0, 500.0, 400.0);
        assert!(!scroll.is_near_bottom());
        scroll.on_scroll(1000.0, 551.0, 400.0);
        assert!(scroll.is_near_bottom());
        // Exactly at the threshold counts as scrolled away.
        scroll.on_scroll(1000.0, 550.0, 400.0);
        assert!(!scroll.is_near_bottom());
    }

    #[test]
    fn test_streaming_reply() {
        let mut transcript = Transcript::default();
        let req = transcript.begin_send("  2+2?  ").unwrap();
        assert_eq!(
            req,
            UiRequest::Chat {
                text: "2+2?".to_owned()
            }
        );
        assert!(!transcript.is_send_enabled());
        // A second send while waiting is swallowed.
        assert_eq!(transcript.begin_send("again"), None);

        transcript.notify(Notification::AddMessage {
            message: Message::user("2+2?"),
        });
        transcript.notify(Notification::StartTyping);
        assert!(transcript.is_typing());
        for text in ["Hel", "Hello", "Hello world"] {
            transcript.notify(Notification::UpdateStreamingText {
                text: text.to_owned(),
            });
        }
        assert_eq!(
            transcript.entries(),
            [Message::user("2+2?"), Message::assistant("Hello world")]
        );

        transcript.notify(Notification::StopTyping);
        transcript.notify(Notification::FinalizeMessage {
            message: Message::assistant("Hello world!"),
        });
        assert!(!transcript.is_typing());
        assert!(transcript.is_send_enabled());
        assert_eq!(
            transcript.entries(),
            [Message::user("2+2?"), Message::assistant("Hello world!")]
        );
    }

    #[test]
    fn test_finalize_without_stream() {
        let mut transcript = Transcript::with_messages([Message::user("Hi")]);
        transcript.notify(Notification::FinalizeMessage {
            message: Message::assistant("ignored"),
        });
        assert_eq!(transcript.entries(), [Message::user("Hi")]);
    }

    #[test]
    fn test_error_and_clear() {
        let mut transcript = Transcript::default();
        assert_eq!(transcript.begin_send("   "), None);
        assert!(transcript.is_send_enabled());

        transcript.begin_send("Hi").unwrap();
        transcript.notify(Notification::Error {
            text: "Please enter a question or prompt.".to_owned(),
        });
        assert!(transcript.is_send_enabled());
        assert_eq!(transcript.entries().len(), 1);

        transcript.notify(Notification::StartTyping);
        transcript.notify(Notification::ClearMessages);
        assert!(transcript.entries().is_empty());
        assert!(!transcript.is_typing());
        assert_eq!(transcript.render_html(), "");
    }

    #[test]
    fn test_error_stops_typing() {
        let mut transcript = Transcript::default();
        transcript.begin_send("Hi").unwrap();
        transcript.notify(Notification::AddMessage {
            message: Message::user("Hi"),
        });
        transcript.notify(Notification::StartTyping);
        transcript.notify(Notification::Error {
            text: "Failed to save the conversation: disk full".to_owned(),
        });
        assert!(!transcript.is_typing());
        assert!(transcript.is_send_enabled());
        assert_eq!(transcript.entries().len(), 2);
    }

    #[test]
    fn test_auto_scroll() {
        let mut transcript = Transcript::with_messages([Message::user("Hi")]);
        assert!(transcript.take_scroll_request());
        assert!(!transcript.take_scroll_request());

        transcript.notify(Notification::StartTyping);
        assert!(transcript.take_scroll_request());

        // The user scrolled up to read older messages.
        transcript.scroll_mut().on_scroll(2000.0, 100.0, 400.0);
        transcript.notify(Notification::UpdateStreamingText {
            text: "Hel".to_owned(),
        });
        assert!(!transcript.take_scroll_request());

        transcript.scroll_mut().on_scroll(2000.0, 1600.0, 400.0);
        transcript.notify(Notification::UpdateStreamingText {
            text: "Hello".to_owned(),
        });
        assert!(transcript.take_scroll_request());
    }
}
