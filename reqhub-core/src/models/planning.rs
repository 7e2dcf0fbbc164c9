//! The planning hierarchy: Epic → User Story → {Acceptance Criteria, Requirement}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::Priority;
use super::status::{RequirementStatus, WorkflowStatus};

/// Maximum length of a title field, in characters
pub const MAX_TITLE_LEN: usize = 500;
/// Maximum length of a description field, in characters
pub const MAX_DESCRIPTION_LEN: usize = 50_000;

/// Top-level planning artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Epic {
    pub id: Uuid,
    pub reference_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: Priority,
    pub status: WorkflowStatus,
    pub creator_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Epic {
    /// Creates an epic with an unallocated reference ID
    pub fn new(title: String, priority: Priority, creator_id: Uuid) -> Self {
        let now = super::now();
        Self {
            id: Uuid::new_v4(),
            reference_id: String::new(),
            title,
            description: None,
            priority,
            status: WorkflowStatus::default(),
            creator_id,
            assignee_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A user story; belongs to exactly one epic
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserStory {
    pub id: Uuid,
    pub reference_id: String,
    pub epic_id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: Priority,
    pub status: WorkflowStatus,
    pub creator_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserStory {
    pub fn new(epic_id: Uuid, title: String, priority: Priority, creator_id: Uuid) -> Self {
        let now = super::now();
        Self {
            id: Uuid::new_v4(),
            reference_id: String::new(),
            epic_id,
            title,
            description: None,
            priority,
            status: WorkflowStatus::default(),
            creator_id,
            assignee_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An acceptance criterion of a user story, ideally phrased in EARS form
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcceptanceCriteria {
    pub id: Uuid,
    pub reference_id: String,
    pub user_story_id: Uuid,
    pub description: String,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AcceptanceCriteria {
    pub fn new(user_story_id: Uuid, description: String, author_id: Uuid) -> Self {
        let now = super::now();
        Self {
            id: Uuid::new_v4(),
            reference_id: String::new(),
            user_story_id,
            description,
            author_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A requirement; belongs to a user story and may point at one acceptance criterion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Requirement {
    pub id: Uuid,
    pub reference_id: String,
    pub user_story_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria_id: Option<Uuid>,
    pub type_id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: Priority,
    pub status: RequirementStatus,
    pub creator_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Requirement {
    pub fn new(
        user_story_id: Uuid,
        type_id: Uuid,
        title: String,
        priority: Priority,
        creator_id: Uuid,
    ) -> Self {
        let now = super::now();
        Self {
            id: Uuid::new_v4(),
            reference_id: String::new(),
            user_story_id,
            acceptance_criteria_id: None,
            type_id,
            title,
            description: None,
            priority,
            status: RequirementStatus::default(),
            creator_id,
            assignee_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A requirement classification (Functional, Non-Functional, ...)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequirementType {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A named kind of edge between requirements (depends_on, blocks, ...)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationshipType {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A directed, typed edge between two requirements
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequirementRelationship {
    pub id: Uuid,
    pub source_requirement_id: Uuid,
    pub target_requirement_id: Uuid,
    pub relationship_type_id: Uuid,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Free-form guidance linkable to many epics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SteeringDocument {
    pub id: Uuid,
    pub reference_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A system prompt served to tool clients; at most one is active
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prompt {
    pub id: Uuid,
    pub reference_id: String,
    pub name: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub content: String,
    pub creator_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
