//! Domain records persisted by reqhub

pub mod comment;
pub mod ids;
pub mod planning;
pub mod status;
pub mod token;
pub mod user;
pub mod views;

pub use comment::{Comment, InlineAnchor, InlineCommentValidity};
pub use ids::{EntityType, IdOrRef, Priority, ReferenceId, ReferencePrefix};
pub use planning::{
    AcceptanceCriteria, Epic, Prompt, RelationshipType, Requirement, RequirementRelationship,
    RequirementType, SteeringDocument, UserStory, MAX_DESCRIPTION_LEN, MAX_TITLE_LEN,
};
pub use status::{
    canonical_status_names, RequirementStatus, Status, StatusModel, StatusModelDetail,
    StatusTransition, WorkflowStatus,
};
pub use token::{PersonalAccessToken, RefreshToken, Session};
pub use user::{Role, User};
pub use views::{
    AcceptanceCriteriaDetail, EpicDetail, EpicHierarchy, Include, Includes, RequirementDetail,
    RequirementWithType, UserStoryDetail, UserStoryHierarchy,
};

use chrono::{DateTime, SubsecRound, Utc};

/// Current time, truncated to the microsecond precision used in storage
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
