//! Rolling, token-budgeted conversation buffer.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use super::budget::{TokenUsage, estimate_tokens};
use super::summarizer::{Summarizer, format_transcript, summary_message};
use crate::config::ContextWindowConfig;
use crate::error::panic_message;

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A message held by a [`ContextWindow`].
///
/// The token cost is computed once at creation and never changes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    pub token_count: usize,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>, metadata: Map<String, Value>) -> Self {
        let content = content.into();
        Self {
            role,
            token_count: estimate_tokens(&content),
            content,
            timestamp: Utc::now(),
            metadata,
        }
    }
}

/// The `{role, content}` pair handed to a chat-completion call.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ContextMessage {
    pub role: MessageRole,
    pub content: String,
}

impl From<&Message> for ContextMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role,
            content: msg.content.clone(),
        }
    }
}

// ── ContextWindow ──────────────────────────────────────────────────

/// Ordered conversation history kept under a token budget.
///
/// An optional system message sits outside the rolling list and is never
/// evicted. Rolling messages are evicted oldest-first whenever a new message
/// would push the total past the budget. A message too large to fit even in
/// an empty window is rejected and the window is left exactly as it was.
///
/// Token costs come from [`estimate_tokens`], a character-count heuristic.
///
/// Not internally synchronized: one agent loop owns the window, and sharing
/// it across threads needs an external lock.
///
/// # Example
///
/// ```
/// use cinch_memory::config::ContextWindowConfig;
/// use cinch_memory::context::{ContextWindow, MessageRole};
///
/// let mut window = ContextWindow::new(ContextWindowConfig::new(100, 20));
/// window.set_system_message("You are terse.");
/// assert!(window.add_message(MessageRole::User, "Summarize the diff.", None));
///
/// let context = window.get_context();
/// assert_eq!(context[0].role, MessageRole::System);
/// assert_eq!(context[1].content, "Summarize the diff.");
/// ```
#[derive(Debug, Clone)]
pub struct ContextWindow {
    config: ContextWindowConfig,
    /// Budget for rolling messages: max minus reserve minus system message.
    available_tokens: usize,
    messages: VecDeque<Message>,
    system_message: Option<Message>,
    /// Sum of `token_count` over `messages`.
    total_tokens: usize,
}

impl ContextWindow {
    pub fn new(config: ContextWindowConfig) -> Self {
        Self {
            available_tokens: config.budget(),
            config,
            messages: VecDeque::new(),
            system_message: None,
            total_tokens: 0,
        }
    }

    /// Replace the system message and recompute the rolling budget.
    ///
    /// Retained messages are not touched, even if the new system message
    /// shrinks the budget below their total; the next `add_message` evicts
    /// as needed.
    pub fn set_system_message(&mut self, content: impl Into<String>) {
        let msg = Message::new(MessageRole::System, content, Map::new());
        let budget = self.config.budget();
        if msg.token_count > budget {
            warn!(
                tokens = msg.token_count,
                budget,
                "System message exceeds the context budget; no rolling messages will fit"
            );
        }
        self.available_tokens = budget.saturating_sub(msg.token_count);
        debug!(
            "System message set ({} tokens); rolling budget now {}",
            msg.token_count, self.available_tokens
        );
        self.system_message = Some(msg);
    }

    /// Append a message, evicting the oldest retained messages as needed.
    ///
    /// Returns `false` without modifying the window if the message alone is
    /// larger than the rolling budget.
    pub fn add_message(
        &mut self,
        role: MessageRole,
        content: impl Into<String>,
        metadata: Option<Map<String, Value>>,
    ) -> bool {
        let msg = Message::new(role, content, metadata.unwrap_or_default());
        let tokens = msg.token_count;

        if tokens > self.available_tokens {
            debug!(
                "Rejected {role} message: {tokens} tokens exceeds rolling budget of {}",
                self.available_tokens
            );
            return false;
        }

        let mut evicted = 0;
        while self.total_tokens + tokens > self.available_tokens {
            if self.evict_oldest().is_none() {
                return false;
            }
            evicted += 1;
        }
        if evicted > 0 {
            debug!("Evicted {evicted} message(s) to admit {tokens} tokens");
        }

        self.total_tokens += tokens;
        self.messages.push_back(msg);
        true
    }

    fn evict_oldest(&mut self) -> Option<Message> {
        let removed = self.messages.pop_front()?;
        self.total_tokens -= removed.token_count;
        trace!(
            "Evicted {} message from {} ({} tokens)",
            removed.role, removed.timestamp, removed.token_count
        );
        Some(removed)
    }

    /// The chat-completion payload: system message first, then retained
    /// messages in insertion order.
    pub fn get_context(&self) -> Vec<ContextMessage> {
        self.system_message
            .iter()
            .chain(self.messages.iter())
            .map(ContextMessage::from)
            .collect()
    }

    /// The `n` most recent retained messages, oldest first.
    pub fn get_last_n(&self, n: usize) -> Vec<&Message> {
        let skip = self.messages.len().saturating_sub(n);
        self.messages.iter().skip(skip).collect()
    }

    /// Retained messages whose content contains `query`, ignoring case.
    pub fn search(&self, query: &str) -> Vec<&Message> {
        let needle = query.to_lowercase();
        self.messages
            .iter()
            .filter(|m| m.content.to_lowercase().contains(&needle))
            .collect()
    }

    /// Drop every retained message, and the system message too unless
    /// `keep_system` is set.
    pub fn clear(&mut self, keep_system: bool) {
        self.messages.clear();
        self.total_tokens = 0;
        if !keep_system {
            self.system_message = None;
            self.available_tokens = self.config.budget();
        }
    }

    /// Replace all but the `keep_recent` newest messages with a summary.
    ///
    /// The older messages are rendered as a transcript and passed to
    /// `summarizer`; its output becomes a single system-role message placed
    /// where the summarized messages were, ahead of the kept ones rather than
    /// appended after them. Returns the summary text, or an
    /// empty string when there was nothing to summarize or compaction was
    /// abandoned. Compaction is abandoned, leaving the window unchanged, if
    /// the summarizer fails or panics, or if the summary plus the kept
    /// messages would not fit the budget.
    pub fn summarize_old<S>(&mut self, summarizer: &S, keep_recent: usize) -> String
    where
        S: Summarizer + ?Sized,
    {
        if self.messages.len() <= keep_recent {
            return String::new();
        }
        let split = self.messages.len() - keep_recent;
        let transcript = format_transcript(self.messages.range(..split));

        let summary = match catch_unwind(AssertUnwindSafe(|| summarizer.summarize(&transcript))) {
            Ok(Ok(summary)) => summary,
            Ok(Err(e)) => {
                warn!(error = %e, "Summarizer failed; context left unchanged");
                return String::new();
            }
            Err(payload) => {
                warn!(
                    panic = %panic_message(payload.as_ref()),
                    "Summarizer panicked; context left unchanged"
                );
                return String::new();
            }
        };

        let summary_msg = Message::new(MessageRole::System, summary_message(&summary), Map::new());
        let kept_tokens: usize = self.messages.range(split..).map(|m| m.token_count).sum();
        let new_total = kept_tokens + summary_msg.token_count;
        if new_total > self.available_tokens {
            warn!(
                "Summary ({} tokens) plus {keep_recent} kept message(s) exceeds rolling budget of {}; context left unchanged",
                summary_msg.token_count, self.available_tokens
            );
            return String::new();
        }

        self.messages.drain(..split);
        self.messages.push_front(summary_msg);
        self.total_tokens = new_total;
        debug!("Summarized {split} message(s); {}", self.token_usage().to_log_string());
        summary
    }

    /// Current token accounting.
    pub fn token_usage(&self) -> TokenUsage {
        let system = self.system_message.as_ref().map_or(0, |m| m.token_count);
        TokenUsage {
            total: self.total_tokens + system,
            messages: self.total_tokens,
            system,
            available: self.available_tokens.saturating_sub(self.total_tokens),
            max: self.config.max_tokens,
        }
    }

    /// Rolling budget after the reserve and system message are subtracted.
    pub fn available_tokens(&self) -> usize {
        self.available_tokens
    }

    /// Tokens used by retained (non-system) messages.
    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    pub fn system_message(&self) -> Option<&Message> {
        self.system_message.as_ref()
    }

    /// Retained messages, oldest first. Excludes the system message.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn config(&self) -> &ContextWindowConfig {
        &self.config
    }

    /// Number of retained messages, excluding the system message.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self::new(ContextWindowConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Content whose estimate is exactly `tokens`.
    fn text_of(tokens: usize) -> String {
        "x".repeat((tokens - 1) * 4)
    }

    fn window(max: usize, reserve: usize) -> ContextWindow {
        ContextWindow::new(ContextWindowConfig::new(max, reserve))
    }

    fn contents(window: &ContextWindow) -> Vec<String> {
        window.get_context().into_iter().map(|m| m.content).collect()
    }

    #[test]
    fn available_tokens_subtracts_reserve_and_system() {
        let mut w = window(100, 20);
        assert_eq!(w.available_tokens(), 80);
        w.set_system_message(text_of(10));
        assert_eq!(w.available_tokens(), 70);
        w.clear(false);
        assert_eq!(w.available_tokens(), 80);
    }

    #[test]
    fn oversized_system_message_leaves_no_rolling_budget() {
        let mut w = window(100, 20);
        w.set_system_message(text_of(90));
        assert_eq!(w.available_tokens(), 0);
        assert!(!w.add_message(MessageRole::User, "hi", None));
        assert!(w.is_empty());
        assert_eq!(w.get_context().len(), 1);
    }

    #[test]
    fn third_message_evicts_first() {
        let mut w = window(100, 20);
        let (a, b, c) = (
            format!("a{}", text_of(30).split_off(1)),
            format!("b{}", text_of(30).split_off(1)),
            format!("c{}", text_of(30).split_off(1)),
        );
        assert!(w.add_message(MessageRole::User, a, None));
        assert!(w.add_message(MessageRole::Assistant, b.clone(), None));
        assert_eq!(w.len(), 2);
        assert!(w.add_message(MessageRole::User, c.clone(), None));

        assert_eq!(contents(&w), vec![b, c]);
        assert_eq!(w.total_tokens(), 60);
    }

    #[test]
    fn oversized_message_rejected_without_eviction() {
        let mut w = window(100, 20);
        assert!(w.add_message(MessageRole::User, text_of(40), None));
        assert!(w.add_message(MessageRole::User, text_of(30), None));
        let before = contents(&w);

        assert!(!w.add_message(MessageRole::User, text_of(81), None));
        assert_eq!(contents(&w), before);
        assert_eq!(w.total_tokens(), 70);
    }

    #[test]
    fn exact_fit_is_admitted() {
        let mut w = window(100, 20);
        assert!(w.add_message(MessageRole::User, text_of(80), None));
        assert_eq!(w.token_usage().available, 0);
    }

    #[test]
    fn system_message_never_evicted() {
        let mut w = window(100, 20);
        w.set_system_message("rules");
        for i in 0..20 {
            assert!(w.add_message(MessageRole::User, format!("{i}{}", text_of(25)), None));
        }
        let ctx = w.get_context();
        assert_eq!(ctx[0].role, MessageRole::System);
        assert_eq!(ctx[0].content, "rules");
        let usage = w.token_usage();
        assert!(usage.total <= 80);
    }

    #[test]
    fn budget_invariant_holds_across_mixed_sizes() {
        let mut w = window(200, 50);
        w.set_system_message(text_of(12));
        for size in [5, 40, 90, 3, 60, 139, 1, 70, 140, 20] {
            w.add_message(MessageRole::User, text_of(size), None);
            let usage = w.token_usage();
            assert!(usage.total <= 150, "total {} over budget", usage.total);
            assert_eq!(usage.messages, w.messages().map(|m| m.token_count).sum::<usize>());
        }
    }

    #[test]
    fn eviction_is_fifo() {
        let mut w = window(50, 0);
        for i in 0..7 {
            w.add_message(MessageRole::User, format!("msg-{i}-{}", "x".repeat(30)), None);
        }
        assert_eq!(w.len(), 5);
        let firsts: Vec<&str> = w.messages().filter_map(|m| m.content.split('x').next()).collect();
        assert_eq!(firsts, vec!["msg-2-", "msg-3-", "msg-4-", "msg-5-", "msg-6-"]);
    }

    #[test]
    fn get_last_n_returns_newest_in_order() {
        let mut w = window(1000, 0);
        for i in 0..5 {
            w.add_message(MessageRole::User, format!("m{i}"), None);
        }
        let last: Vec<&str> = w.get_last_n(2).iter().map(|m| m.content.as_str()).collect();
        assert_eq!(last, vec!["m3", "m4"]);
        assert_eq!(w.get_last_n(10).len(), 5);
        assert!(w.get_last_n(0).is_empty());
    }

    #[test]
    fn search_is_case_insensitive_and_ordered() {
        let mut w = window(1000, 0);
        w.add_message(MessageRole::User, "Deploy to STAGING", None);
        w.add_message(MessageRole::Assistant, "unrelated", None);
        w.add_message(MessageRole::User, "staging looks good", None);
        let hits: Vec<&str> = w.search("Staging").iter().map(|m| m.content.as_str()).collect();
        assert_eq!(hits, vec!["Deploy to STAGING", "staging looks good"]);
    }

    #[test]
    fn clear_keeps_system_by_default() {
        let mut w = window(100, 0);
        w.set_system_message("sys");
        w.add_message(MessageRole::User, "hello", None);
        w.clear(true);
        assert!(w.is_empty());
        assert_eq!(w.total_tokens(), 0);
        assert_eq!(w.get_context().len(), 1);
    }

    #[test]
    fn metadata_is_retained() {
        let mut w = window(100, 0);
        let mut meta = Map::new();
        meta.insert("agent".into(), Value::from("planner"));
        w.add_message(MessageRole::Tool, "result", Some(meta));
        let msg = w.messages().next().unwrap();
        assert_eq!(msg.metadata["agent"], "planner");
        assert_eq!(msg.token_count, 2);
    }

    #[test]
    fn summarize_noop_when_few_messages() {
        let mut w = window(1000, 0);
        w.add_message(MessageRole::User, "one", None);
        let called = std::cell::Cell::new(false);
        let summarizer = |_: &str| -> Result<String, String> {
            called.set(true);
            Ok("unused".into())
        };
        assert_eq!(w.summarize_old(&summarizer, 5), "");
        assert!(!called.get());
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn summarize_replaces_old_messages() {
        let mut w = window(1000, 0);
        for i in 0..6 {
            w.add_message(MessageRole::User, format!("step {i}"), None);
        }
        let seen = std::cell::RefCell::new(String::new());
        let summarizer = |t: &str| -> Result<String, String> {
            *seen.borrow_mut() = t.to_string();
            Ok("did steps 0-3".into())
        };

        let summary = w.summarize_old(&summarizer, 2);
        assert_eq!(summary, "did steps 0-3");
        assert_eq!(
            seen.borrow().as_str(),
            "user: step 0\nuser: step 1\nuser: step 2\nuser: step 3"
        );
        assert_eq!(
            contents(&w),
            vec![
                "[Previous conversation summary: did steps 0-3]".to_string(),
                "step 4".to_string(),
                "step 5".to_string(),
            ]
        );
        assert_eq!(w.messages().next().unwrap().role, MessageRole::System);
        assert_eq!(
            w.total_tokens(),
            w.messages().map(|m| m.token_count).sum::<usize>()
        );
    }

    #[test]
    fn summarizer_error_leaves_window_unchanged() {
        let mut w = window(1000, 0);
        for i in 0..4 {
            w.add_message(MessageRole::User, format!("m{i}"), None);
        }
        let before = contents(&w);
        let failing = |_: &str| -> Result<String, String> { Err("offline".into()) };
        assert_eq!(w.summarize_old(&failing, 1), "");
        assert_eq!(contents(&w), before);
    }

    #[test]
    fn summarizer_panic_is_contained() {
        let mut w = window(1000, 0);
        for i in 0..4 {
            w.add_message(MessageRole::User, format!("m{i}"), None);
        }
        let panicking = |_: &str| -> Result<String, String> { panic!("summarizer bug") };
        assert_eq!(w.summarize_old(&panicking, 1), "");
        assert_eq!(w.len(), 4);
    }

    #[test]
    fn oversized_summary_is_refused() {
        let mut w = window(40, 0);
        for _ in 0..3 {
            w.add_message(MessageRole::User, text_of(10), None);
        }
        let verbose = |_: &str| -> Result<String, String> { Ok("y".repeat(200)) };
        assert_eq!(w.summarize_old(&verbose, 1), "");
        assert_eq!(w.len(), 3);
        assert_eq!(w.total_tokens(), 30);
    }

    #[test]
    fn context_message_serializes_role_lowercase() {
        let msg = ContextMessage {
            role: MessageRole::Assistant,
            content: "hi".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "hi"}));
    }
}
