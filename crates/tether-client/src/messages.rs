//! Message composition and reconstruction
//!
//! Outbound: a structured [`OutgoingMessage`] is the composition boundary;
//! the embedded `[image:<path>]` marker is only honored as a compatibility
//! shim for legacy free-text input, and an explicitly attached image always
//! wins over an embedded marker.
//!
//! Inbound: resumed threads arrive as turn/item history. Each item maps to
//! zero or one chat message: user content parts combine into one text
//! block, assistant items pass through verbatim, tool-shaped items render
//! into a titled block, and unknown types are dropped.

use tether_core::{ChatMessage, MessageRole};
use tether_protocol::{combine_user_content, InputItem, ThreadHistory, ThreadItem};

/// Opening token of the legacy embedded image marker
const IMAGE_MARKER_OPEN: &str = "[image:";

/// A composed outbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub image: Option<String>,
}

impl OutgoingMessage {
    /// Compose from free text plus an optional explicit image attachment.
    /// The explicit attachment takes priority; otherwise an embedded marker
    /// is extracted from the text.
    pub fn compose(text: &str, image: Option<String>) -> Self {
        match image {
            Some(image) => Self {
                text: text.trim().to_string(),
                image: Some(image),
            },
            None => {
                let (text, image) = extract_image_marker(text);
                Self { text, image }
            }
        }
    }

    /// Structured turn input: the text part plus an optional local image part
    pub fn input_items(&self) -> Vec<InputItem> {
        let mut items = vec![InputItem::Text {
            text: self.text.clone(),
        }];
        if let Some(path) = &self.image {
            items.push(InputItem::LocalImage { path: path.clone() });
        }
        items
    }
}

/// Strip the first embedded `[image:<path>]` marker out of free text,
/// returning the cleaned text and the extracted path
pub fn extract_image_marker(text: &str) -> (String, Option<String>) {
    let Some(open) = text.find(IMAGE_MARKER_OPEN) else {
        return (text.trim().to_string(), None);
    };
    let after = &text[open + IMAGE_MARKER_OPEN.len()..];
    let Some(close) = after.find(']') else {
        return (text.trim().to_string(), None);
    };

    let path = after[..close].trim().to_string();
    let mut cleaned = String::with_capacity(text.len());
    cleaned.push_str(&text[..open]);
    cleaned.push_str(&after[close + 1..]);

    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let path = if path.is_empty() { None } else { Some(path) };
    (cleaned, path)
}

/// Render a structured item into a display message. Direct message items
/// (user/assistant) return None here: they are carried by the direct and
/// delta paths and would duplicate.
pub fn render_item(item: &ThreadItem, timestamp: i64) -> Option<ChatMessage> {
    let (role, text) = match item {
        ThreadItem::AgentMessage { .. } | ThreadItem::UserMessage { .. } => return None,

        ThreadItem::Reasoning { summary, content } => {
            let text = if summary.is_empty() {
                content.join("\n")
            } else {
                summary.join("\n")
            };
            if text.trim().is_empty() {
                return None;
            }
            (MessageRole::Reasoning, text)
        }

        ThreadItem::CommandExecution {
            command,
            aggregated_output,
            exit_code,
        } => {
            let mut text = match command {
                Some(command) => format!("$ {}", command.display()),
                None => "$ <command>".to_string(),
            };
            if let Some(output) = aggregated_output {
                if !output.trim().is_empty() {
                    text.push('\n');
                    text.push_str(output.trim_end());
                }
            }
            if let Some(code) = exit_code {
                if *code != 0 {
                    text.push_str(&format!("\n(exit {})", code));
                }
            }
            (MessageRole::System, text)
        }

        ThreadItem::FileChange { changes } => {
            let mut text = String::from("Edited files:");
            for change in changes {
                match &change.kind {
                    Some(kind) => text.push_str(&format!("\n- {} ({})", change.path, kind)),
                    None => text.push_str(&format!("\n- {}", change.path)),
                }
            }
            (MessageRole::System, text)
        }

        ThreadItem::McpToolCall {
            server,
            name,
            status,
        } => {
            let tool = match (server, name) {
                (Some(server), Some(name)) => format!("{}.{}", server, name),
                (None, Some(name)) => name.clone(),
                (Some(server), None) => server.clone(),
                (None, None) => "tool".to_string(),
            };
            let text = match status {
                Some(status) => format!("Tool call: {} ({})", tool, status),
                None => format!("Tool call: {}", tool),
            };
            (MessageRole::System, text)
        }

        ThreadItem::WebSearch { query } => {
            let text = match query {
                Some(query) => format!("Searched the web: {}", query),
                None => "Searched the web".to_string(),
            };
            (MessageRole::System, text)
        }

        ThreadItem::Plan { entries } => {
            let mut text = String::from("Plan:");
            for entry in entries {
                let mark = if entry.completed { "x" } else { " " };
                text.push_str(&format!("\n- [{}] {}", mark, entry.text));
            }
            (MessageRole::System, text)
        }

        ThreadItem::EnteredReviewMode { review } => {
            let text = match review {
                Some(review) => format!("Entered review mode: {}", review),
                None => "Entered review mode".to_string(),
            };
            (MessageRole::System, text)
        }
        ThreadItem::ExitedReviewMode { .. } => {
            (MessageRole::System, "Exited review mode".to_string())
        }

        ThreadItem::Compacted {} => (MessageRole::System, "Context compacted".to_string()),

        ThreadItem::ImageView { path } => {
            let text = match path {
                Some(path) => format!("Viewed image: {}", path),
                None => "Viewed image".to_string(),
            };
            (MessageRole::System, text)
        }
    };

    Some(ChatMessage::finalized(role, text, timestamp))
}

/// Rebuild a thread's message list from resume history. Handles both the
/// nested turns form and the flat legacy item array.
pub fn reconstruct_history(history: &ThreadHistory, timestamp: i64) -> Vec<ChatMessage> {
    let mut messages = Vec::new();

    let items = history
        .turns
        .iter()
        .flat_map(|turn| turn.items.iter())
        .chain(history.items.iter());

    for value in items {
        let Some(item) = ThreadItem::from_value(value) else {
            tracing::trace!("Dropping unrecognized history item");
            continue;
        };
        match &item {
            ThreadItem::UserMessage { text, content } => {
                let text = match text {
                    Some(text) if !text.is_empty() => text.clone(),
                    _ => combine_user_content(content),
                };
                if !text.is_empty() {
                    messages.push(ChatMessage::finalized(MessageRole::User, text, timestamp));
                }
            }
            ThreadItem::AgentMessage { text, content, .. } => {
                let text = match text {
                    Some(text) if !text.is_empty() => text.clone(),
                    _ => combine_user_content(content),
                };
                if !text.is_empty() {
                    messages.push(ChatMessage::finalized(
                        MessageRole::Assistant,
                        text,
                        timestamp,
                    ));
                }
            }
            other => {
                if let Some(message) = render_item(other, timestamp) {
                    messages.push(message);
                }
            }
        }
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_marker() {
        let (text, image) = extract_image_marker("look at [image:/tmp/shot.png] this");
        assert_eq!(text, "look at this");
        assert_eq!(image.as_deref(), Some("/tmp/shot.png"));
    }

    #[test]
    fn test_extract_no_marker() {
        let (text, image) = extract_image_marker("  plain text  ");
        assert_eq!(text, "plain text");
        assert!(image.is_none());
    }

    #[test]
    fn test_extract_unclosed_marker_left_alone() {
        let (text, image) = extract_image_marker("broken [image:/tmp/x");
        assert_eq!(text, "broken [image:/tmp/x");
        assert!(image.is_none());
    }

    #[test]
    fn test_explicit_image_wins_over_marker() {
        let message =
            OutgoingMessage::compose("see [image:/tmp/embedded.png]", Some("/tmp/explicit.png".into()));
        assert_eq!(message.image.as_deref(), Some("/tmp/explicit.png"));
        // The marker stays in the text when the explicit attachment wins
        assert!(message.text.contains("embedded.png"));
    }

    #[test]
    fn test_input_items_shape() {
        let message = OutgoingMessage::compose("hi [image:/tmp/a.png]", None);
        let items = message.input_items();
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0],
            InputItem::Text {
                text: "hi".to_string()
            }
        );
        assert_eq!(
            items[1],
            InputItem::LocalImage {
                path: "/tmp/a.png".to_string()
            }
        );
    }

    #[test]
    fn test_render_skips_direct_messages() {
        let agent = ThreadItem::from_value(&json!({"type": "agentMessage", "text": "hi"})).unwrap();
        assert!(render_item(&agent, 0).is_none());
        let user = ThreadItem::from_value(&json!({"type": "userMessage", "text": "hi"})).unwrap();
        assert!(render_item(&user, 0).is_none());
    }

    #[test]
    fn test_render_command_execution() {
        let item = ThreadItem::from_value(&json!({
            "type": "commandExecution",
            "command": ["cargo", "test"],
            "aggregatedOutput": "ok\n",
            "exitCode": 1
        }))
        .unwrap();
        let message = render_item(&item, 5).unwrap();
        assert_eq!(message.role, MessageRole::System);
        assert_eq!(message.text, "$ cargo test\nok\n(exit 1)");
        assert_eq!(message.timestamp, 5);
    }

    #[test]
    fn test_reconstruct_nested_and_flat() {
        let history: ThreadHistory = serde_json::from_value(json!({
            "turns": [
                {"items": [
                    {"type": "userMessage", "content": [{"type": "text", "text": "run tests"}]},
                    {"type": "commandExecution", "command": "cargo test"},
                    {"type": "agentMessage", "text": "all green"},
                    {"type": "mysteryItem", "x": 1}
                ]}
            ]
        }))
        .unwrap();

        let messages = reconstruct_history(&history, 7);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].text, "run tests");
        assert_eq!(messages[1].role, MessageRole::System);
        assert_eq!(messages[2].role, MessageRole::Assistant);
        assert_eq!(messages[2].text, "all green");
    }

    #[test]
    fn test_reconstruct_flat_legacy_array() {
        let history: ThreadHistory = serde_json::from_value(json!({
            "items": [{"type": "agentMessage", "text": "from before"}]
        }))
        .unwrap();
        let messages = reconstruct_history(&history, 0);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "from before");
    }
}
