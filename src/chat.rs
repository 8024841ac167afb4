// Per-project assistant transcript
//
// Transcripts are UI-only state: they are never sent back to the backend and
// reset whenever the project is (re)selected.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

pub const WELCOME_MESSAGE: &str = "Hello! I'm Orthrus, your AI assistant. I can help you analyze security findings and answer questions about your target. How can I assist you today?";

pub const CLEARED_MESSAGE: &str = "Chat cleared. How can I help you with your security analysis?";

pub const NETWORK_ERROR_REPLY: &str = "Error processing your request.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Assistant => "ASSISTANT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTranscript {
    messages: Vec<ChatMessage>,
}

impl Default for ChatTranscript {
    fn default() -> Self {
        Self::welcome()
    }
}

impl ChatTranscript {
    /// Fresh transcript holding only the greeting
    pub fn welcome() -> Self {
        Self::with_greeting(WELCOME_MESSAGE)
    }

    fn with_greeting(text: &str) -> Self {
        let mut transcript = Self {
            messages: Vec::new(),
        };
        transcript.push(ChatRole::Assistant, text);
        transcript
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, role: ChatRole, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    /// Drop the history, leaving the short post-clear greeting
    pub fn clear(&mut self) {
        *self = Self::with_greeting(CLEARED_MESSAGE);
    }

    /// Plain-text export: `[timestamp] ROLE: content` blocks, blank-line separated
    pub fn export(&self) -> String {
        self.messages
            .iter()
            .map(|m| {
                format!(
                    "[{}] {}: {}",
                    m.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                    m.role.label(),
                    m.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// File name for an exported transcript
pub fn export_file_name(project_name: &str, date: DateTime<Utc>) -> String {
    let slug: String = project_name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { "project" } else { slug };
    format!("chat-export-{}-{}.txt", slug, date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_transcript_has_welcome() {
        let chat = ChatTranscript::welcome();
        assert_eq!(chat.len(), 1);
        assert_eq!(chat.messages()[0].role, ChatRole::Assistant);
        assert_eq!(chat.messages()[0].content, WELCOME_MESSAGE);
    }

    #[test]
    fn test_clear_leaves_short_greeting() {
        let mut chat = ChatTranscript::welcome();
        chat.push(ChatRole::User, "what ports are open?");
        chat.push(ChatRole::Assistant, "22 and 443");
        chat.clear();
        assert_eq!(chat.len(), 1);
        assert_eq!(chat.messages()[0].content, CLEARED_MESSAGE);
    }

    #[test]
    fn test_export_format() {
        let mut chat = ChatTranscript::welcome();
        chat.push(ChatRole::User, "hi");
        let text = chat.export();
        let blocks: Vec<&str> = text.split("\n\n").collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].starts_with('['));
        assert!(blocks[0].contains("] ASSISTANT: Hello!"));
        assert!(blocks[1].ends_with("] USER: hi"));
    }

    #[test]
    fn test_export_file_name() {
        let date = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(
            export_file_name("Shop Audit", date),
            "chat-export-shop-audit-2024-03-09.txt"
        );
        assert_eq!(export_file_name("  ", date), "chat-export-project-2024-03-09.txt");
    }
}
