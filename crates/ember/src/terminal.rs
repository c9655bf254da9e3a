use ember_core::{Message, Notification, Role};
use owo_colors::{AnsiColors, OwoColorize};

const BAR_CHAR: &str = "▎";

/// Turns notifications into terminal output.
///
/// A terminal can only append, so streamed replies are printed by writing
/// the part of each cumulative update that is not on screen yet.
pub struct Printer {
    styled: bool,
    // The streamed reply printed so far, `None` when no reply is streaming.
    streamed: Option<String>,
}

impl Printer {
    pub fn new(styled: bool) -> Self {
        Self {
            styled,
            streamed: None,
        }
    }

    /// Returns `true` while a reply is being printed.
    #[inline]
    pub fn is_streaming(&self) -> bool {
        self.streamed.is_some()
    }

    /// Returns the text to print for a notification.
    pub fn print(&mut self, notification: &Notification) -> String {
        match notification {
            Notification::AddMessage { message } => {
                let mut out = self.end_stream();
                out.push_str(&self.message_line(message));
                out
            }
            Notification::UpdateStreamingText { text } => {
                self.stream_update(text)
            }
            Notification::FinalizeMessage { message } => {
                if self.streamed.is_none() {
                    return self.message_line(message);
                }
                let mut out = self.stream_update(&message.content);
                out.push_str(&self.end_stream());
                out
            }
            Notification::ClearMessages => {
                let mut out = self.end_stream();
                out.push_str(
                    &self.notice("History cleared.", AnsiColors::BrightBlack),
                );
                out
            }
            // The spinner is driven by the caller.
            Notification::StartTyping | Notification::StopTyping => {
                String::new()
            }
            Notification::Error { text } => {
                let mut out = self.end_stream();
                out.push_str(&self.notice(text, AnsiColors::BrightYellow));
                out
            }
        }
    }

    fn stream_update(&mut self, text: &str) -> String {
        let mut out = String::new();
        if self.streamed.is_none() {
            out.push_str(&self.prefix(Role::Assistant));
        }
        let streamed = self.streamed.get_or_insert_with(String::new);
        match text.strip_prefix(streamed.as_str()) {
            Some(suffix) => out.push_str(suffix),
            None => {
                // Not an extension of what is on screen, start over on a new
                // line.
                warn!("streamed text diverged from printed output");
                out.push('\n');
                out.push_str(text);
            }
        }
        *streamed = text.to_owned();
        out
    }

    fn end_stream(&mut self) -> String {
        match self.streamed.take() {
            Some(_) => "\n".to_owned(),
            None => String::new(),
        }
    }

    fn message_line(&self, message: &Message) -> String {
        let content = if self.styled {
            message.content.bright_white().to_string()
        } else {
            message.content.clone()
        };
        format!("{}{content}\n", self.prefix(message.role))
    }

    fn prefix(&self, role: Role) -> String {
        let (color, icon) = match role {
            Role::User => (AnsiColors::BrightGreen, "🧑"),
            Role::Assistant => (AnsiColors::BrightCyan, "🤖"),
        };
        format!("{}{icon} ", self.paint(BAR_CHAR, color))
    }

    fn notice(&self, text: &str, color: AnsiColors) -> String {
        format!("{}{text}\n", self.paint(BAR_CHAR, color))
    }

    fn paint(&self, text: &str, color: AnsiColors) -> String {
        if self.styled {
            text.color(color).to_string()
        } else {
            text.to_owned()
        }
    }
}
