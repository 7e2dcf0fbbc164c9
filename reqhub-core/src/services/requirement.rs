use serde::Deserialize;
use uuid::Uuid;

use super::{
    initial_requirement_status, next_requirement_status, parse_priority, resolve, resolve_assignee,
    resolve_user, validate_description, validate_title, Page,
};
use crate::auth::{require, Capability};
use crate::context::RequestContext;
use crate::db::repos::RelationshipView;
use crate::db::{Database, Filter, ListOptions, OrderBy, Repos};
use crate::deletion::{self, DeletionResult, DependencyReport};
use crate::error::{Error, Result, ValidationError};
use crate::models::{
    self, AcceptanceCriteria, EntityType, Includes, Requirement, RequirementDetail,
    RequirementType, UserStory,
};
use crate::status;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRequirement {
    /// UUID or `US-n`
    pub user_story_id: String,
    /// Requirement type UUID or name
    #[serde(alias = "type")]
    pub type_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub status: Option<String>,
    /// UUID or `AC-n`; must belong to the same user story
    #[serde(default)]
    pub acceptance_criteria_id: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRequirement {
    #[serde(default, alias = "type")]
    pub type_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub status: Option<String>,
    /// Empty string unlinks
    #[serde(default)]
    pub acceptance_criteria_id: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequirementFilter {
    #[serde(default)]
    pub user_story_id: Option<String>,
    #[serde(default)]
    pub acceptance_criteria_id: Option<String>,
    #[serde(default, alias = "type")]
    pub type_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub creator_id: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub page: Page,
}

/// Finds a requirement type by UUID or case-insensitive name
pub(crate) fn resolve_requirement_type(repos: &Repos<'_>, input: &str) -> Result<RequirementType> {
    let input = input.trim();
    let found = match Uuid::parse_str(input) {
        Ok(id) => repos.requirement_types().find_by_id(id)?,
        Err(_) => repos.requirement_types().find_by_name(input)?,
    };
    match found {
        Some(found) => Ok(found),
        None => {
            let names: Vec<String> = repos
                .requirement_types()
                .select("ORDER BY name ASC", [])?
                .into_iter()
                .map(|t| t.name)
                .collect();
            Err(ValidationError::new(
                "INVALID_REQUIREMENT_TYPE",
                format!("unknown requirement type '{}'", input),
            )
            .field("type_id")
            .valid_values(names)
            .into())
        }
    }
}

/// Resolves an acceptance criterion and checks it hangs off `user_story_id`
fn linked_acceptance_criteria(repos: &Repos<'_>, input: &str, user_story_id: Uuid) -> Result<Uuid> {
    let ac: AcceptanceCriteria = resolve(repos, "acceptance_criteria_id", input)?;
    if !repos
        .requirements()
        .check_acceptance_criteria_parent(ac.id, user_story_id)?
    {
        return Err(ValidationError::new(
            "ACCEPTANCE_CRITERIA_MISMATCH",
            format!("{} does not belong to the requirement's user story", ac.reference_id),
        )
        .field("acceptance_criteria_id")
        .into());
    }
    Ok(ac.id)
}

pub struct RequirementService<'a> {
    db: &'a Database,
}

impl<'a> RequirementService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(&self, ctx: &RequestContext, input: CreateRequirement) -> Result<Requirement> {
        require(&ctx.caller, Capability::WriteDomain)?;
        let title = validate_title("title", &input.title)?;
        let description = validate_description("description", input.description)?;
        let priority = parse_priority(input.priority)?;

        let requirement = self.db.with_transaction(&ctx.cancel, |repos| -> Result<Requirement> {
            let story: UserStory = resolve(repos, "user_story_id", &input.user_story_id)?;
            let kind = resolve_requirement_type(repos, &input.type_id)?;
            let mut requirement = Requirement::new(story.id, kind.id, title, priority, ctx.user_id());
            requirement.description = description;
            requirement.status = initial_requirement_status(repos, input.status.as_deref())?;
            if let Some(ac) = input.acceptance_criteria_id.as_deref().filter(|s| !s.trim().is_empty()) {
                requirement.acceptance_criteria_id = Some(linked_acceptance_criteria(repos, ac, story.id)?);
            }
            if let Some(assignee) = resolve_assignee(repos, input.assignee_id.as_deref())? {
                requirement.assignee_id = assignee;
            }
            Ok(repos.requirements().create_with_reference(&requirement)?)
        })?;
        tracing::debug!(reference_id = %requirement.reference_id, "requirement created");
        Ok(requirement)
    }

    pub fn get(&self, ctx: &RequestContext, id: &str, includes: &Includes) -> Result<RequirementDetail> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let requirement: Requirement = resolve(repos, "id", id)?;
            Ok(repos.requirements().get_with_includes(requirement.id, includes)?)
        })
    }

    pub fn update(&self, ctx: &RequestContext, id: &str, input: UpdateRequirement) -> Result<Requirement> {
        require(&ctx.caller, Capability::WriteDomain)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let mut requirement: Requirement = resolve(repos, "id", id)?;
            if let Some(kind) = &input.type_id {
                requirement.type_id = resolve_requirement_type(repos, kind)?.id;
            }
            if let Some(title) = &input.title {
                requirement.title = validate_title("title", title)?;
            }
            if input.description.is_some() {
                requirement.description =
                    validate_description("description", input.description.clone())?;
            }
            if input.priority.is_some() {
                requirement.priority = parse_priority(input.priority)?;
            }
            if let Some(requested) = &input.status {
                if let Some(next) = next_requirement_status(repos, requirement.status, requested)? {
                    requirement.status = next;
                }
            }
            match input.acceptance_criteria_id.as_deref() {
                None => {}
                Some(ac) if ac.trim().is_empty() => requirement.acceptance_criteria_id = None,
                Some(ac) => {
                    requirement.acceptance_criteria_id =
                        Some(linked_acceptance_criteria(repos, ac, requirement.user_story_id)?);
                }
            }
            if let Some(assignee) = resolve_assignee(repos, input.assignee_id.as_deref())? {
                requirement.assignee_id = assignee;
            }
            requirement.updated_at = models::now();
            repos.requirements().update(&requirement)?;
            Ok(requirement)
        })
    }

    pub fn change_status(&self, ctx: &RequestContext, id: &str, status: &str) -> Result<Requirement> {
        require(&ctx.caller, Capability::WriteDomain)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let mut requirement: Requirement = resolve(repos, "id", id)?;
            if let Some(next) = next_requirement_status(repos, requirement.status, status)? {
                requirement.status = next;
                requirement.updated_at = models::now();
                repos.requirements().update(&requirement)?;
            }
            Ok(requirement)
        })
    }

    pub fn assign(&self, ctx: &RequestContext, id: &str, assignee: &str) -> Result<Requirement> {
        require(&ctx.caller, Capability::WriteDomain)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let mut requirement: Requirement = resolve(repos, "id", id)?;
            requirement.assignee_id = resolve_assignee(repos, Some(assignee))?.flatten();
            requirement.updated_at = models::now();
            repos.requirements().update(&requirement)?;
            Ok(requirement)
        })
    }

    pub fn list(
        &self,
        ctx: &RequestContext,
        filter: &RequirementFilter,
        includes: &Includes,
    ) -> Result<Vec<RequirementDetail>> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let options = list_options(repos, filter)?;
            Ok(repos.requirements().list_with_includes(&options, includes)?)
        })
    }

    /// Inbound and outbound relationships of a requirement
    pub fn list_relationships(&self, ctx: &RequestContext, id: &str) -> Result<Vec<RelationshipView>> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let requirement: Requirement = resolve(repos, "id", id)?;
            Ok(repos.relationships().list_for_requirement(requirement.id)?)
        })
    }

    /// Requirements of one type, given as UUID or name
    pub fn get_by_type(&self, ctx: &RequestContext, kind: &str) -> Result<Vec<Requirement>> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let kind = resolve_requirement_type(repos, kind)?;
            Ok(repos.requirements().list_by_type(kind.id)?)
        })
    }

    pub fn validate_deletion(&self, ctx: &RequestContext, id: &str) -> Result<DependencyReport> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let requirement: Requirement = resolve(repos, "id", id)?;
            deletion::validate_deletion(repos, EntityType::Requirement, requirement.id)
        })
    }

    pub fn delete(&self, ctx: &RequestContext, id: &str, force: bool) -> Result<DeletionResult> {
        require(&ctx.caller, Capability::WriteDomain)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let requirement: Requirement = resolve(repos, "id", id)?;
            deletion::delete(repos, EntityType::Requirement, requirement.id, force)
        })
    }
}

fn list_options(repos: &Repos<'_>, filter: &RequirementFilter) -> Result<ListOptions> {
    let mut options = ListOptions::new();
    if let Some(story) = &filter.user_story_id {
        let story: UserStory = resolve(repos, "user_story_id", story)?;
        options = options.filter(Filter::uuid("user_story_id", story.id));
    }
    if let Some(ac) = &filter.acceptance_criteria_id {
        let ac: AcceptanceCriteria = resolve(repos, "acceptance_criteria_id", ac)?;
        options = options.filter(Filter::uuid("acceptance_criteria_id", ac.id));
    }
    if let Some(kind) = &filter.type_id {
        options = options.filter(Filter::uuid("type_id", resolve_requirement_type(repos, kind)?.id));
    }
    if let Some(raw) = &filter.status {
        let status = status::parse_requirement_status(raw).map_err(Error::from)?;
        options = options.filter(Filter::eq("status", status.as_str().to_string()));
    }
    if filter.priority.is_some() {
        options = options.filter(Filter::eq("priority", parse_priority(filter.priority)?.as_i64()));
    }
    if let Some(creator) = &filter.creator_id {
        options = options.filter(Filter::uuid("creator_id", resolve_user(repos, creator)?.id));
    }
    if let Some(assignee) = &filter.assignee_id {
        options = options.filter(Filter::uuid("assignee_id", resolve_user(repos, assignee)?.id));
    }
    if let Some(order) = &filter.order_by {
        options = options.order_by(OrderBy::parse(order));
    }
    Ok(options.page(filter.page.limit(), filter.page.offset()))
}
