//! Entity mappings and entity-specific queries
//!
//! Each submodule implements [`Entity`](super::Entity) for one model and
//! adds the relation filters and eager-load variants that entity needs on
//! top of the generic [`Repository`](super::Repository).

mod acceptance_criteria;
mod comment;
mod credential;
mod epic;
mod prompt;
mod relationship;
mod requirement;
mod search;
mod status;
mod steering;
mod token;
mod types;
mod user;
mod user_story;

pub use credential::CredentialRepository;
pub use relationship::RelationshipView;
pub use search::{fts_query, like_pattern, SearchHit, SearchRepository};
pub use status::StatusRepository;

use rusqlite::Row;

use crate::models::{EntityType, Priority, RequirementStatus, WorkflowStatus};

use super::traits::parse_failure;

pub(crate) fn get_priority(row: &Row<'_>, idx: usize) -> rusqlite::Result<Priority> {
    let value: i64 = row.get(idx)?;
    Priority::try_from(value).map_err(|e| parse_failure(idx, e))
}

pub(crate) fn get_workflow_status(row: &Row<'_>, idx: usize) -> rusqlite::Result<WorkflowStatus> {
    let value: String = row.get(idx)?;
    WorkflowStatus::from_canonical(&value)
        .ok_or_else(|| parse_failure(idx, format!("unknown status '{}'", value)))
}

pub(crate) fn get_requirement_status(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<RequirementStatus> {
    let value: String = row.get(idx)?;
    RequirementStatus::from_canonical(&value)
        .ok_or_else(|| parse_failure(idx, format!("unknown status '{}'", value)))
}

pub(crate) fn get_entity_type(row: &Row<'_>, idx: usize) -> rusqlite::Result<EntityType> {
    super::traits::get_parsed(row, idx)
}
