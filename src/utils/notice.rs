//! Dismissible user-facing messages.
//!
//! Failures and action results are appended here instead of replacing whatever
//! the user was looking at.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub id: u64,
    pub kind: NoticeKind,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Ordered list of notices; ids are never reused.
#[derive(Debug, Default, Clone)]
pub struct Notices {
    items: Vec<Notice>,
    next_id: u64,
}

impl Notices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: NoticeKind, text: impl Into<String>) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.items.push(Notice { id, kind, text: text.into(), created_at: Utc::now() });
        id
    }

    pub fn success(&mut self, text: impl Into<String>) -> u64 {
        self.push(NoticeKind::Success, text)
    }

    pub fn info(&mut self, text: impl Into<String>) -> u64 {
        self.push(NoticeKind::Info, text)
    }

    /// Record a failure using its user-facing message.
    pub fn error(&mut self, err: &Error) -> u64 {
        self.push(NoticeKind::Error, err.display_message())
    }

    /// Remove a notice. Returns false when the id is unknown or already dismissed.
    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.items.len();
        self.items.retain(|n| n.id != id);
        self.items.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn latest(&self) -> Option<&Notice> {
        self.items.last()
    }
}
