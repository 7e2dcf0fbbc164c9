//! Canonical status values and the configurable status-model records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::ids::EntityType;

/// Status of an Epic or User Story
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowStatus {
    Backlog,
    Draft,
    #[serde(rename = "In Progress")]
    InProgress,
    Done,
    Cancelled,
}

impl WorkflowStatus {
    pub const ALL: [WorkflowStatus; 5] = [
        WorkflowStatus::Backlog,
        WorkflowStatus::Draft,
        WorkflowStatus::InProgress,
        WorkflowStatus::Done,
        WorkflowStatus::Cancelled,
    ];

    /// Canonical stored form
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Backlog => "Backlog",
            WorkflowStatus::Draft => "Draft",
            WorkflowStatus::InProgress => "In Progress",
            WorkflowStatus::Done => "Done",
            WorkflowStatus::Cancelled => "Cancelled",
        }
    }

    pub fn from_canonical(s: &str) -> Option<Self> {
        WorkflowStatus::ALL.into_iter().find(|v| v.as_str() == s)
    }
}

impl Default for WorkflowStatus {
    fn default() -> Self {
        WorkflowStatus::Backlog
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a Requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequirementStatus {
    Draft,
    Active,
    Obsolete,
}

impl RequirementStatus {
    pub const ALL: [RequirementStatus; 3] = [
        RequirementStatus::Draft,
        RequirementStatus::Active,
        RequirementStatus::Obsolete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequirementStatus::Draft => "Draft",
            RequirementStatus::Active => "Active",
            RequirementStatus::Obsolete => "Obsolete",
        }
    }

    pub fn from_canonical(s: &str) -> Option<Self> {
        RequirementStatus::ALL.into_iter().find(|v| v.as_str() == s)
    }
}

impl Default for RequirementStatus {
    fn default() -> Self {
        RequirementStatus::Draft
    }
}

impl fmt::Display for RequirementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named state machine assigned to an entity type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusModel {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A state within a status model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Status {
    pub id: Uuid,
    pub status_model_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub sort_order: i64,
    pub is_initial: bool,
    pub is_final: bool,
    pub created_at: DateTime<Utc>,
}

/// A directed edge between two statuses of the same model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusTransition {
    pub id: Uuid,
    pub status_model_id: Uuid,
    pub from_status_id: Uuid,
    pub to_status_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A status model together with its statuses and transitions
#[derive(Debug, Clone, Serialize)]
pub struct StatusModelDetail {
    #[serde(flatten)]
    pub model: StatusModel,
    pub statuses: Vec<Status>,
    pub transitions: Vec<StatusTransition>,
}

/// Canonical status names for an entity type, in workflow order
pub fn canonical_status_names(entity_type: EntityType) -> &'static [&'static str] {
    match entity_type {
        EntityType::Epic | EntityType::UserStory => {
            &["Backlog", "Draft", "In Progress", "Done", "Cancelled"]
        }
        EntityType::Requirement => &["Draft", "Active", "Obsolete"],
        EntityType::AcceptanceCriteria => &["Draft", "Verified", "Rejected"],
    }
}
