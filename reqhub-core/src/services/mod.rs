//! Domain services
//!
//! Each service borrows the [`Database`](crate::db::Database), takes the
//! caller's [`RequestContext`](crate::context::RequestContext) on every
//! call, checks the caller's capability, and runs its work in one
//! transaction.
//!
//! Shared rules live here: id-or-reference resolution, field limits,
//! priority parsing, assignee handling and pagination.

pub mod acceptance_criteria;
pub mod admin;
pub mod comment;
pub mod epic;
pub mod prompt;
pub mod relationship;
pub mod requirement;
pub mod search;
pub mod steering;
pub mod user;
pub mod user_story;

pub use acceptance_criteria::AcceptanceCriteriaService;
pub use admin::AdminService;
pub use comment::CommentService;
pub use epic::EpicService;
pub use prompt::PromptService;
pub use relationship::RelationshipService;
pub use requirement::RequirementService;
pub use search::SearchService;
pub use steering::SteeringService;
pub use user::UserService;
pub use user_story::UserStoryService;

use serde::Deserialize;
use uuid::Uuid;

use crate::db::{Referenced, Repos};
use crate::error::{Error, Result, ValidationError};
use crate::models::{
    EntityType, IdOrRef, Priority, RequirementStatus, User, WorkflowStatus, MAX_DESCRIPTION_LEN,
    MAX_TITLE_LEN,
};
use crate::status::{self, StatusEngine};

/// Limit used when a caller does not ask for one
pub const DEFAULT_PAGE_LIMIT: u32 = 50;
/// Hard upper bound on any page
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Caller-supplied pagination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

impl Page {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    /// The effective limit, clamped to `1..=max`
    pub fn limit_within(&self, max: u32) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, max.max(1))
    }

    pub fn limit(&self) -> u32 {
        self.limit_within(MAX_PAGE_LIMIT)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

/// Loads `E` from a UUID or a reference ID
///
/// References are matched exactly first, then case-insensitively.
pub(crate) fn resolve<E: Referenced>(repos: &Repos<'_>, field: &str, input: &str) -> Result<E> {
    let parsed = IdOrRef::parse(input, E::PREFIX)
        .map_err(|msg| Error::Validation(ValidationError::new("INVALID_ID", msg).field(field)))?;
    let repo = repos.of::<E>();
    match parsed {
        IdOrRef::Id(id) => Ok(repo.get_by_id(id)?),
        IdOrRef::Reference(reference) => match repo.get_by_reference_id(&reference) {
            Ok(entity) => Ok(entity),
            Err(err) if err.is_not_found() => {
                Ok(repo.get_by_reference_id_case_insensitive(&reference)?)
            }
            Err(err) => Err(err.into()),
        },
    }
}

/// Trimmed, non-empty, at most [`MAX_TITLE_LEN`] characters
pub(crate) fn validate_title(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::new("REQUIRED", format!("{} is required", field))
            .field(field)
            .into());
    }
    if value.chars().count() > MAX_TITLE_LEN {
        return Err(ValidationError::new(
            "TOO_LONG",
            format!("{} must be at most {} characters", field, MAX_TITLE_LEN),
        )
        .field(field)
        .into());
    }
    Ok(value.to_string())
}

/// At most [`MAX_DESCRIPTION_LEN`] characters; blank becomes `None`
pub(crate) fn validate_description(field: &str, value: Option<String>) -> Result<Option<String>> {
    match value {
        Some(text) if text.chars().count() > MAX_DESCRIPTION_LEN => Err(ValidationError::new(
            "TOO_LONG",
            format!("{} must be at most {} characters", field, MAX_DESCRIPTION_LEN),
        )
        .field(field)
        .into()),
        Some(text) if text.trim().is_empty() => Ok(None),
        other => Ok(other),
    }
}

/// Required long text (acceptance criteria, comments, prompt content)
pub(crate) fn validate_body(field: &str, value: &str) -> Result<String> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("REQUIRED", format!("{} is required", field))
            .field(field)
            .into());
    }
    validate_description(field, Some(value.to_string())).map(|v| v.unwrap_or_default())
}

pub(crate) fn parse_priority(value: Option<u8>) -> Result<Priority> {
    match value {
        None => Ok(Priority::default()),
        Some(raw) => Priority::try_from(raw).map_err(|msg| {
            ValidationError::new("INVALID_PRIORITY", msg)
                .field("priority")
                .valid_values(["1", "2", "3", "4"])
                .into()
        }),
    }
}

/// Finds a user by UUID or username
pub(crate) fn resolve_user(repos: &Repos<'_>, input: &str) -> Result<User> {
    let input = input.trim();
    let found = match Uuid::parse_str(input) {
        Ok(id) => repos.users().find_by_id(id)?,
        Err(_) => repos.users().find_by_username(input)?,
    };
    found.ok_or_else(|| Error::not_found("user", input))
}

/// Interprets an `assignee_id` field
///
/// `None` leaves the assignee alone, `Some("")` clears it, anything else
/// must name an existing user.
pub(crate) fn resolve_assignee(repos: &Repos<'_>, input: Option<&str>) -> Result<Option<Option<Uuid>>> {
    match input {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(Some(None)),
        Some(raw) => Ok(Some(Some(resolve_user(repos, raw)?.id))),
    }
}

/// Starting status of a new epic or user story
pub(crate) fn initial_workflow_status(
    repos: &Repos<'_>,
    entity_type: EntityType,
    requested: Option<&str>,
) -> Result<WorkflowStatus> {
    let requested = requested
        .map(|s| status::canonical_status(entity_type, s))
        .transpose()?;
    let name = StatusEngine::new(repos).initial_status(entity_type, requested)?;
    status::parse_workflow_status(entity_type, &name).map_err(Error::from)
}

/// An unknown target status is reported like any other disallowed move
fn unreachable_status(repos: &Repos<'_>, entity_type: EntityType, current: &str, requested: &str) -> Error {
    match StatusEngine::new(repos).allowed_transitions(entity_type, current) {
        Ok(valid) => ValidationError::new(
            "INVALID_STATUS_TRANSITION",
            format!(
                "cannot move {} from '{}' to unknown status '{}'",
                entity_type,
                current,
                requested.trim()
            ),
        )
        .field("status")
        .valid_values(valid)
        .into(),
        Err(err) => err,
    }
}

/// Validated next status, or `None` when `requested` equals `current`
pub(crate) fn next_workflow_status(
    repos: &Repos<'_>,
    entity_type: EntityType,
    current: WorkflowStatus,
    requested: &str,
) -> Result<Option<WorkflowStatus>> {
    let proposed = status::parse_workflow_status(entity_type, requested)
        .map_err(|_| unreachable_status(repos, entity_type, current.as_str(), requested))?;
    if proposed == current {
        return Ok(None);
    }
    StatusEngine::new(repos).validate_transition(entity_type, current.as_str(), proposed.as_str())?;
    Ok(Some(proposed))
}

pub(crate) fn initial_requirement_status(
    repos: &Repos<'_>,
    requested: Option<&str>,
) -> Result<RequirementStatus> {
    let requested = requested
        .map(|s| status::canonical_status(EntityType::Requirement, s))
        .transpose()?;
    let name = StatusEngine::new(repos).initial_status(EntityType::Requirement, requested)?;
    status::parse_requirement_status(&name).map_err(Error::from)
}

pub(crate) fn next_requirement_status(
    repos: &Repos<'_>,
    current: RequirementStatus,
    requested: &str,
) -> Result<Option<RequirementStatus>> {
    let proposed = status::parse_requirement_status(requested).map_err(|_| {
        unreachable_status(repos, EntityType::Requirement, current.as_str(), requested)
    })?;
    if proposed == current {
        return Ok(None);
    }
    StatusEngine::new(repos).validate_transition(
        EntityType::Requirement,
        current.as_str(),
        proposed.as_str(),
    )?;
    Ok(Some(proposed))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::context::{Caller, Cancellation, RequestContext};
    use crate::db::seed::seed_all;
    use crate::db::test_support::{test_db, TestDb};
    use crate::error::Result;
    use crate::models::{Role, User};

    pub struct Fixture {
        pub t: TestDb,
        pub admin: User,
        pub user: User,
        pub commenter: User,
    }

    impl Fixture {
        pub fn ctx(&self, user: &User) -> RequestContext {
            RequestContext::new(Caller::from_user(user))
        }

        pub fn user_ctx(&self) -> RequestContext {
            self.ctx(&self.user)
        }
    }

    /// Seeded database with one user per role
    pub fn fixture() -> Fixture {
        let t = test_db();
        let users: Result<(User, User, User)> = t.db.with_transaction(&Cancellation::new(), |repos| {
            seed_all(repos)?;
            let mk = |name: &str, role| {
                repos
                    .users()
                    .create(&User::new(name.into(), format!("{}@example.com", name), "h".into(), role))
            };
            Ok((
                mk("root", Role::Administrator)?,
                mk("uma", Role::User)?,
                mk("cleo", Role::Commenter)?,
            ))
        });
        let (admin, user, commenter) = users.unwrap();
        Fixture {
            t,
            admin,
            user,
            commenter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_clamps() {
        assert_eq!(Page::default().limit(), DEFAULT_PAGE_LIMIT);
        assert_eq!(Page::new(1000, 0).limit(), MAX_PAGE_LIMIT);
        assert_eq!(Page::new(0, 5).limit(), 1);
        assert_eq!(Page::new(0, 5).offset(), 5);
        assert_eq!(Page::new(80, 0).limit_within(20), 20);
    }

    #[test]
    fn test_title_limits() {
        assert_eq!(validate_title("title", "  Auth ").unwrap(), "Auth");
        assert!(validate_title("title", "   ").is_err());
        let long = "x".repeat(MAX_TITLE_LEN + 1);
        let err = validate_title("title", &long).unwrap_err();
        assert_eq!(err.as_validation().unwrap().code, "TOO_LONG");
    }

    #[test]
    fn test_priority_parsing() {
        assert_eq!(parse_priority(None).unwrap(), Priority::Medium);
        assert_eq!(parse_priority(Some(1)).unwrap(), Priority::Critical);
        let err = parse_priority(Some(7)).unwrap_err();
        assert_eq!(err.as_validation().unwrap().code, "INVALID_PRIORITY");
    }

    #[test]
    fn test_description_blank_is_none() {
        assert_eq!(validate_description("description", Some("  ".into())).unwrap(), None);
        assert!(validate_description("description", Some("y".repeat(MAX_DESCRIPTION_LEN + 1))).is_err());
    }
}
