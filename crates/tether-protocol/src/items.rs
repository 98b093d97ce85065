//! Structured thread items
//!
//! Items are the units a server streams inside a turn: messages, command
//! executions, file changes, tool calls, and so on. History payloads carry
//! them as loose JSON; [`ThreadItem::from_value`] maps each one to a typed
//! item or drops it when the type is unrecognized.

use serde::Deserialize;
use serde_json::Value;

/// A structured item within a turn
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ThreadItem {
    /// Assistant output, either flat text or content parts
    #[serde(alias = "AgentMessage", alias = "assistantMessage")]
    AgentMessage {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        content: Vec<Value>,
    },

    /// User input echoed back in history
    #[serde(alias = "UserMessage")]
    UserMessage {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        content: Vec<Value>,
    },

    /// Model reasoning, summary and raw content as string blocks
    #[serde(alias = "Reasoning")]
    Reasoning {
        #[serde(default, alias = "summary_text")]
        summary: Vec<String>,
        #[serde(default, alias = "raw_content")]
        content: Vec<String>,
    },

    /// A command the agent executed
    CommandExecution {
        #[serde(default)]
        command: Option<CommandField>,
        #[serde(default, alias = "aggregated_output", alias = "output")]
        aggregated_output: Option<String>,
        #[serde(default, alias = "exit_code")]
        exit_code: Option<i32>,
    },

    /// A set of file edits the agent applied
    FileChange {
        #[serde(default)]
        changes: Vec<FileUpdate>,
    },

    /// An external tool invocation
    #[serde(alias = "toolCall")]
    McpToolCall {
        #[serde(default)]
        server: Option<String>,
        #[serde(default, alias = "tool")]
        name: Option<String>,
        #[serde(default)]
        status: Option<String>,
    },

    /// A web search the agent performed
    WebSearch {
        #[serde(default)]
        query: Option<String>,
    },

    /// The agent's running plan
    #[serde(alias = "todoList")]
    Plan {
        #[serde(default, alias = "plan", alias = "steps")]
        entries: Vec<PlanStep>,
    },

    /// Review-mode transitions
    EnteredReviewMode {
        #[serde(default)]
        review: Option<String>,
    },
    ExitedReviewMode {
        #[serde(default)]
        review: Option<String>,
    },

    /// Context-window compaction marker
    #[serde(alias = "contextCompaction")]
    Compacted {},

    /// The agent opened an image for inspection
    #[serde(alias = "viewImage")]
    ImageView {
        #[serde(default)]
        path: Option<String>,
    },
}

impl ThreadItem {
    /// Parse a loose history value into a typed item; unknown types yield None
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// A command rendered either as a shell line or an argv vector
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CommandField {
    Line(String),
    Argv(Vec<String>),
}

impl CommandField {
    /// Single-line display form
    pub fn display(&self) -> String {
        match self {
            CommandField::Line(line) => line.clone(),
            CommandField::Argv(argv) => argv.join(" "),
        }
    }
}

/// One file touched by a file-change item
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUpdate {
    pub path: String,
    #[serde(default)]
    pub kind: Option<String>,
}

/// One step of a plan item
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    #[serde(alias = "step")]
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

/// One part of a user message's structured content
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ContentPart {
    Text {
        text: String,
    },
    /// Inline data URL or remote image
    #[serde(alias = "inputImage")]
    Image {
        #[serde(default, alias = "image_url", alias = "imageUrl")]
        url: Option<String>,
    },
    LocalImage {
        #[serde(default)]
        path: Option<String>,
    },
    #[serde(alias = "skillReference")]
    Skill {
        name: String,
    },
    Mention {
        #[serde(alias = "path")]
        name: String,
    },
}

impl ContentPart {
    /// Parse one content part; unknown part types yield None
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// Combine a user message's content parts into one text block. Unknown parts
/// are skipped; image parts become a placeholder token.
pub fn combine_user_content(parts: &[Value]) -> String {
    let mut pieces = Vec::new();
    for value in parts {
        match ContentPart::from_value(value) {
            Some(ContentPart::Text { text }) => pieces.push(text),
            Some(ContentPart::Image { .. }) => pieces.push("[image]".to_string()),
            Some(ContentPart::LocalImage { path }) => {
                pieces.push(match path {
                    Some(path) => format!("[image: {}]", path),
                    None => "[image]".to_string(),
                });
            }
            Some(ContentPart::Skill { name }) => pieces.push(format!("${}", name)),
            Some(ContentPart::Mention { name }) => pieces.push(format!("@{}", name)),
            None => {}
        }
    }
    pieces.join("\n")
}
