//! Conversation context under a token budget.
//!
//! 1. **[`budget`]**: the [`estimate_tokens`] heuristic and the
//!    [`TokenUsage`] report.
//!
//! 2. **[`window`]**: [`ContextWindow`], a rolling message buffer with a
//!    pinned system message. New messages evict the oldest ones (FIFO) until
//!    they fit; a message that cannot fit at all is rejected with `false`.
//!
//! 3. **[`summarizer`]**: the [`Summarizer`] hook used by
//!    [`ContextWindow::summarize_old`] to collapse older history into a single
//!    system message.

pub mod budget;
pub mod summarizer;
pub mod window;

pub use budget::{CHARS_PER_TOKEN, TokenUsage, estimate_tokens};
pub use summarizer::Summarizer;
pub use window::{ContextMessage, ContextWindow, Message, MessageRole};
