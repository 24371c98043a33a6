//! Core data models.
//!
//! [`Work`] and [`CleansedWork`] are transient values that live for one
//! pass of the pipeline. [`StoredWork`] and [`ConversationRecord`] mirror
//! rows in SQLite.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One source text as read from an extracted archive.
#[derive(Debug, Clone)]
pub struct Work {
    pub path: PathBuf,
    /// Label of the codec the text was decoded with (e.g. `"Shift_JIS"`).
    pub encoding: &'static str,
    pub text: String,
}

impl Work {
    /// Lines without their terminators.
    pub fn lines(&self) -> Vec<&str> {
        self.text.lines().collect()
    }

    /// File stem used to name output files.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "work".to_string())
    }
}

/// A line that survived cleansing. `text` always has more than one character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleansedLine {
    pub index: usize,
    pub text: String,
}

/// Output of the line cleanser for a single work.
#[derive(Debug, Clone)]
pub struct CleansedWork {
    /// The untrimmed first line of the source.
    pub title: String,
    pub lines: Vec<CleansedLine>,
}

impl CleansedWork {
    pub fn texts(&self) -> Vec<&str> {
        self.lines.iter().map(|l| l.text.as_str()).collect()
    }

    /// Body joined with newlines, as stored in the `works` table.
    pub fn body(&self) -> String {
        self.texts().join("\n")
    }
}

/// A work row in SQLite.
#[derive(Debug, Clone, Serialize)]
pub struct StoredWork {
    pub id: String,
    pub author: String,
    pub title: String,
    pub source_file: String,
    pub text_content: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The five evaluation axes, each 0–10.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    pub creativity: u8,
    pub logic: u8,
    pub empathy: u8,
    pub expression: u8,
    pub insight: u8,
}

impl Scores {
    pub const MAX: u8 = 10;

    pub fn as_array(&self) -> [(&'static str, u8); 5] {
        [
            ("creativity", self.creativity),
            ("logic", self.logic),
            ("empathy", self.empathy),
            ("expression", self.expression),
            ("insight", self.insight),
        ]
    }
}

/// A user's conversation about one work.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationRecord {
    pub id: Option<i64>,
    pub username: String,
    pub author: String,
    pub title: String,
    pub transcript: Vec<Message>,
    pub summary: Option<String>,
    pub scores: Option<Scores>,
    pub created_at: i64,
    pub updated_at: i64,
}
