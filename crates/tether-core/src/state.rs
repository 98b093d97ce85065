//! UI-facing state model
//!
//! `AppState` is the aggregate snapshot published to observers. The mutation
//! helpers here are pure with respect to I/O; the coordinator worker in
//! `tether-client` is the only writer. Thread ordering (most recently
//! updated first) is re-established by `sort_threads` on every commit.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tether_protocol::{AuthMethod, ModelInfo};

use crate::types::{
    ConnectionStatus, MessageRole, ModelSelection, ServerConfig, ServerId, ThreadKey, ThreadStatus,
};

/// One chat message. Mutable only while `streaming` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub text: String,
    pub streaming: bool,
    /// Unix milliseconds
    pub timestamp: i64,
}

impl ChatMessage {
    /// A finalized (non-streaming) message
    pub fn finalized(role: MessageRole, text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            role,
            text: text.into(),
            streaming: false,
            timestamp,
        }
    }
}

/// State of one conversation thread
#[derive(Debug, Clone)]
pub struct ThreadState {
    pub key: ThreadKey,
    pub status: ThreadStatus,
    pub messages: Vec<ChatMessage>,
    pub preview: String,
    pub cwd: Option<String>,
    /// Unix milliseconds; only ever moves forward
    pub updated_at: i64,
    pub active_turn: Option<String>,
    pub last_error: Option<String>,
}

impl ThreadState {
    /// A fresh thread with no history
    pub fn new(key: ThreadKey, updated_at: i64) -> Self {
        Self {
            key,
            status: ThreadStatus::Ready,
            messages: Vec::new(),
            preview: String::new(),
            cwd: None,
            updated_at,
            active_turn: None,
            last_error: None,
        }
    }

    /// Append a finalized message and advance the update timestamp
    pub fn push_message(&mut self, message: ChatMessage) {
        self.touch(message.timestamp);
        if matches!(message.role, MessageRole::User | MessageRole::Assistant) {
            self.preview = preview_of(&message.text);
        }
        self.messages.push(message);
    }

    /// Apply one streaming fragment of assistant output. Appends to the
    /// trailing streaming assistant message if one is open, else opens a new
    /// one. Empty deltas are ignored.
    pub fn append_delta(&mut self, delta: &str, timestamp: i64) {
        if delta.is_empty() {
            return;
        }
        self.touch(timestamp);
        match self.messages.last_mut() {
            Some(last) if last.streaming && last.role == MessageRole::Assistant => {
                last.text.push_str(delta);
            }
            _ => self.messages.push(ChatMessage {
                role: MessageRole::Assistant,
                text: delta.to_string(),
                streaming: true,
                timestamp,
            }),
        }
    }

    /// Close any open streaming message. Idempotent.
    pub fn finalize_streaming(&mut self) {
        if let Some(last) = self.messages.last_mut() {
            if last.streaming {
                last.streaming = false;
                self.preview = preview_of(&last.text);
            }
        }
    }

    /// Merge remote metadata from a thread listing: preview and cwd are
    /// replaced, the timestamp is merged monotonically (max of both sides),
    /// and locally-known fields (messages, active turn) are untouched.
    pub fn merge_summary(&mut self, preview: Option<&str>, cwd: Option<&str>, updated_at: Option<i64>) {
        if let Some(preview) = preview {
            self.preview = preview.to_string();
        }
        if let Some(cwd) = cwd {
            self.cwd = Some(cwd.to_string());
        }
        if let Some(incoming) = updated_at {
            self.updated_at = self.updated_at.max(incoming);
        }
    }

    /// Advance the update timestamp, never backwards
    pub fn touch(&mut self, timestamp: i64) {
        self.updated_at = self.updated_at.max(timestamp);
    }
}

/// First line of a message, shortened for list display
fn preview_of(text: &str) -> String {
    const MAX: usize = 80;
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() <= MAX {
        line.to_string()
    } else {
        let cut: String = line.chars().take(MAX).collect();
        format!("{}…", cut)
    }
}

/// Per-server account state; replaced wholesale on each auth operation
#[derive(Debug, Clone, Default)]
pub struct AccountState {
    pub auth_method: AuthMethod,
    pub email: Option<String>,
    pub pending_login_url: Option<String>,
    pub pending_login_id: Option<String>,
    pub last_error: Option<String>,
}

/// The aggregate application snapshot
#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub connection_status: ConnectionStatus,
    pub connection_error: Option<String>,
    pub active_server: Option<ServerId>,
    pub active_thread: Option<ThreadKey>,
    /// Connected servers
    pub servers: Vec<ServerConfig>,
    /// Threads across all servers, sorted most-recently-updated first
    pub threads: Vec<ThreadState>,
    pub models: Vec<ModelInfo>,
    pub selected_model: Option<ModelSelection>,
    pub accounts: HashMap<ServerId, AccountState>,
}

impl AppState {
    /// Re-establish the thread ordering invariant. Stable, so threads with
    /// equal timestamps keep their relative order.
    pub fn sort_threads(&mut self) {
        self.threads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    }

    /// Look up a thread by key
    pub fn thread(&self, key: &ThreadKey) -> Option<&ThreadState> {
        self.threads.iter().find(|t| &t.key == key)
    }

    /// Look up a connected server by id
    pub fn server(&self, id: &ServerId) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| &s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ThreadKey {
        ThreadKey::new(ServerId::new("s1"), "t1")
    }

    #[test]
    fn test_deltas_concatenate_into_one_streaming_message() {
        let mut thread = ThreadState::new(key(), 0);
        thread.append_delta("Hel", 1);
        thread.append_delta("lo ", 2);
        thread.append_delta("world", 3);

        assert_eq!(thread.messages.len(), 1);
        let msg = &thread.messages[0];
        assert_eq!(msg.text, "Hello world");
        assert!(msg.streaming);
        assert_eq!(msg.role, MessageRole::Assistant);
    }

    #[test]
    fn test_empty_delta_ignored() {
        let mut thread = ThreadState::new(key(), 0);
        thread.append_delta("", 1);
        assert!(thread.messages.is_empty());
    }

    #[test]
    fn test_delta_after_finalize_opens_new_message() {
        let mut thread = ThreadState::new(key(), 0);
        thread.append_delta("first", 1);
        thread.finalize_streaming();
        thread.append_delta("second", 2);

        assert_eq!(thread.messages.len(), 2);
        assert!(!thread.messages[0].streaming);
        assert!(thread.messages[1].streaming);
    }

    #[test]
    fn test_finalize_streaming_idempotent() {
        let mut thread = ThreadState::new(key(), 0);
        thread.append_delta("output", 1);
        thread.finalize_streaming();
        let once = thread.clone();
        thread.finalize_streaming();

        assert_eq!(thread.messages, once.messages);
        assert_eq!(thread.preview, once.preview);
    }

    #[test]
    fn test_merge_summary_monotonic_timestamp() {
        let mut thread = ThreadState::new(key(), 100);
        thread.merge_summary(Some("new preview"), Some("/work"), Some(50));
        assert_eq!(thread.updated_at, 100);
        assert_eq!(thread.preview, "new preview");
        assert_eq!(thread.cwd.as_deref(), Some("/work"));

        thread.merge_summary(None, None, Some(200));
        assert_eq!(thread.updated_at, 200);
        assert_eq!(thread.preview, "new preview");
    }

    #[test]
    fn test_merge_summary_preserves_messages() {
        let mut thread = ThreadState::new(key(), 0);
        thread.push_message(ChatMessage::finalized(MessageRole::User, "hi", 1));
        thread.active_turn = Some("turn-1".to_string());

        thread.merge_summary(Some("remote preview"), None, Some(99));
        assert_eq!(thread.messages.len(), 1);
        assert_eq!(thread.active_turn.as_deref(), Some("turn-1"));
    }

    #[test]
    fn test_sort_threads_most_recent_first() {
        let mut state = AppState::default();
        for (id, ts) in [("a", 5), ("b", 50), ("c", 20)] {
            let mut t = ThreadState::new(ThreadKey::new(ServerId::new("s1"), id), ts);
            t.touch(ts);
            state.threads.push(t);
        }
        state.sort_threads();
        let order: Vec<&str> = state.threads.iter().map(|t| t.key.thread_id.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_preview_truncation() {
        let mut thread = ThreadState::new(key(), 0);
        let long = "x".repeat(200);
        thread.push_message(ChatMessage::finalized(MessageRole::User, long, 1));
        assert!(thread.preview.chars().count() <= 81);
        assert!(thread.preview.ends_with('…'));
    }
}
