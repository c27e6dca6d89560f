//! Pluggable summarization for compacting old conversation history.
//!
//! The window never talks to a model itself. [`ContextWindow::summarize_old`]
//! renders the messages it wants to drop as a plain transcript and hands it
//! to a caller-supplied [`Summarizer`]; whatever comes back is injected as a
//! single system message in their place.
//!
//! [`ContextWindow::summarize_old`]: super::ContextWindow::summarize_old

use super::window::Message;

/// Prefix for the system message that replaces summarized history.
pub const SUMMARY_PREFIX: &str = "[Previous conversation summary: ";

/// Produces a summary from a transcript of older messages.
///
/// Closures of the form `Fn(&str) -> Result<String, String>` implement this
/// trait directly:
///
/// ```
/// use cinch_memory::context::Summarizer;
///
/// let first_line = |transcript: &str| -> Result<String, String> {
///     transcript
///         .lines()
///         .next()
///         .map(str::to_string)
///         .ok_or_else(|| "empty transcript".to_string())
/// };
/// assert_eq!(first_line.summarize("user: hi\nassistant: hello").unwrap(), "user: hi");
/// ```
pub trait Summarizer {
    /// Summarize `transcript`. An `Err` aborts the compaction and leaves the
    /// window untouched.
    fn summarize(&self, transcript: &str) -> Result<String, String>;
}

impl<F> Summarizer for F
where
    F: Fn(&str) -> Result<String, String>,
{
    fn summarize(&self, transcript: &str) -> Result<String, String> {
        self(transcript)
    }
}

/// Render messages as one `role: content` line each.
pub fn format_transcript<'a>(messages: impl IntoIterator<Item = &'a Message>) -> String {
    messages
        .into_iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wrap a summary in the marker used for the injected system message.
pub fn summary_message(summary: &str) -> String {
    format!("{SUMMARY_PREFIX}{summary}]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MessageRole;

    #[test]
    fn transcript_is_role_prefixed_lines() {
        let messages = [
            Message::new(MessageRole::User, "Read src/main.rs", Default::default()),
            Message::new(MessageRole::Assistant, "It defines main.", Default::default()),
        ];
        let transcript = format_transcript(&messages);
        assert_eq!(transcript, "user: Read src/main.rs\nassistant: It defines main.");
    }

    #[test]
    fn empty_transcript_is_empty_string() {
        let messages: [Message; 0] = [];
        assert!(format_transcript(&messages).is_empty());
    }

    #[test]
    fn summary_message_wraps_text() {
        assert_eq!(
            summary_message("found the bug"),
            "[Previous conversation summary: found the bug]"
        );
    }

    #[test]
    fn closure_summarizer_propagates_error() {
        let failing = |_: &str| -> Result<String, String> { Err("model unavailable".into()) };
        assert_eq!(failing.summarize("x").unwrap_err(), "model unavailable");
    }
}
