use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::EntityType;

/// Anchor of an inline comment inside the parent entity's text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InlineAnchor {
    pub linked_text: String,
    /// Character offset (inclusive)
    pub text_position_start: i64,
    /// Character offset (exclusive)
    pub text_position_end: i64,
}

impl InlineAnchor {
    /// Whether the anchor still points at `linked_text` within `text`
    pub fn matches(&self, text: &str) -> bool {
        match self.slice(text) {
            Some(slice) => slice == self.linked_text,
            None => false,
        }
    }

    /// Whether `0 <= start < end <= len(text)`, counted in characters
    pub fn in_bounds(&self, text: &str) -> bool {
        let len = text.chars().count() as i64;
        0 <= self.text_position_start
            && self.text_position_start < self.text_position_end
            && self.text_position_end <= len
    }

    fn slice(&self, text: &str) -> Option<String> {
        if !self.in_bounds(text) {
            return None;
        }
        let start = self.text_position_start as usize;
        let end = self.text_position_end as usize;
        Some(text.chars().skip(start).take(end - start).collect())
    }
}

/// A comment on an epic, user story, acceptance criterion or requirement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub author_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_comment_id: Option<Uuid>,
    pub content: String,
    pub is_resolved: bool,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<InlineAnchor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(entity_type: EntityType, entity_id: Uuid, author_id: Uuid, content: String) -> Self {
        let now = super::now();
        Self {
            id: Uuid::new_v4(),
            entity_type,
            entity_id,
            author_id,
            parent_comment_id: None,
            content,
            is_resolved: false,
            anchor: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_reply(&self) -> bool {
        self.parent_comment_id.is_some()
    }

    pub fn is_inline(&self) -> bool {
        self.anchor.is_some()
    }
}

/// Result of re-checking an inline comment against current parent text
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InlineCommentValidity {
    pub comment_id: Uuid,
    pub is_valid: bool,
}
