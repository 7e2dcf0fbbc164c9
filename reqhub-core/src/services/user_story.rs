use serde::Deserialize;

use super::{
    initial_workflow_status, next_workflow_status, parse_priority, resolve, resolve_assignee,
    resolve_user, validate_description, validate_title, Page,
};
use crate::auth::{require, Capability};
use crate::context::RequestContext;
use crate::db::{Database, Filter, ListOptions, OrderBy, Repos};
use crate::deletion::{self, DeletionResult, DependencyReport};
use crate::error::Result;
use crate::models::{
    self, AcceptanceCriteria, EntityType, Epic, Includes, Requirement, UserStory, UserStoryDetail,
};
use crate::status;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUserStory {
    /// UUID or `EP-n`
    pub epic_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserStory {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserStoryFilter {
    #[serde(default)]
    pub epic_id: Option<String>,
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

pub struct UserStoryService<'a> {
    db: &'a Database,
}

impl<'a> UserStoryService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(&self, ctx: &RequestContext, input: CreateUserStory) -> Result<UserStory> {
        require(&ctx.caller, Capability::WriteDomain)?;
        let title = validate_title("title", &input.title)?;
        let description = validate_description("description", input.description)?;
        let priority = parse_priority(input.priority)?;

        let story = self.db.with_transaction(&ctx.cancel, |repos| -> Result<UserStory> {
            let epic: Epic = resolve(repos, "epic_id", &input.epic_id)?;
            let mut story = UserStory::new(epic.id, title, priority, ctx.user_id());
            story.description = description;
            story.status =
                initial_workflow_status(repos, EntityType::UserStory, input.status.as_deref())?;
            if let Some(assignee) = resolve_assignee(repos, input.assignee_id.as_deref())? {
                story.assignee_id = assignee;
            }
            Ok(repos.user_stories().create_with_reference(&story)?)
        })?;
        tracing::debug!(reference_id = %story.reference_id, "user story created");
        Ok(story)
    }

    pub fn get(&self, ctx: &RequestContext, id: &str, includes: &Includes) -> Result<UserStoryDetail> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let story: UserStory = resolve(repos, "id", id)?;
            Ok(repos.user_stories().get_with_includes(story.id, includes)?)
        })
    }

    pub fn update(&self, ctx: &RequestContext, id: &str, input: UpdateUserStory) -> Result<UserStory> {
        require(&ctx.caller, Capability::WriteDomain)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let mut story: UserStory = resolve(repos, "id", id)?;
            if let Some(title) = &input.title {
                story.title = validate_title("title", title)?;
            }
            if input.description.is_some() {
                story.description = validate_description("description", input.description.clone())?;
            }
            if input.priority.is_some() {
                story.priority = parse_priority(input.priority)?;
            }
            if let Some(requested) = &input.status {
                if let Some(next) =
                    next_workflow_status(repos, EntityType::UserStory, story.status, requested)?
                {
                    story.status = next;
                }
            }
            if let Some(assignee) = resolve_assignee(repos, input.assignee_id.as_deref())? {
                story.assignee_id = assignee;
            }
            story.updated_at = models::now();
            repos.user_stories().update(&story)?;
            Ok(story)
        })
    }

    pub fn change_status(&self, ctx: &RequestContext, id: &str, status: &str) -> Result<UserStory> {
        require(&ctx.caller, Capability::WriteDomain)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let mut story: UserStory = resolve(repos, "id", id)?;
            if let Some(next) = next_workflow_status(repos, EntityType::UserStory, story.status, status)? {
                story.status = next;
                story.updated_at = models::now();
                repos.user_stories().update(&story)?;
            }
            Ok(story)
        })
    }

    pub fn assign(&self, ctx: &RequestContext, id: &str, assignee: &str) -> Result<UserStory> {
        require(&ctx.caller, Capability::WriteDomain)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let mut story: UserStory = resolve(repos, "id", id)?;
            story.assignee_id = resolve_assignee(repos, Some(assignee))?.flatten();
            story.updated_at = models::now();
            repos.user_stories().update(&story)?;
            Ok(story)
        })
    }

    pub fn list(
        &self,
        ctx: &RequestContext,
        filter: &UserStoryFilter,
        includes: &Includes,
    ) -> Result<Vec<UserStoryDetail>> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let options = list_options(repos, filter)?;
            Ok(repos.user_stories().list_with_includes(&options, includes)?)
        })
    }

    pub fn list_acceptance_criteria(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<Vec<AcceptanceCriteria>> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let story: UserStory = resolve(repos, "id", id)?;
            Ok(repos.acceptance_criteria().list_by_user_story(story.id)?)
        })
    }

    pub fn list_requirements(&self, ctx: &RequestContext, id: &str) -> Result<Vec<Requirement>> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let story: UserStory = resolve(repos, "id", id)?;
            Ok(repos.requirements().list_by_user_story(story.id)?)
        })
    }

    pub fn validate_deletion(&self, ctx: &RequestContext, id: &str) -> Result<DependencyReport> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let story: UserStory = resolve(repos, "id", id)?;
            deletion::validate_deletion(repos, EntityType::UserStory, story.id)
        })
    }

    pub fn delete(&self, ctx: &RequestContext, id: &str, force: bool) -> Result<DeletionResult> {
        require(&ctx.caller, Capability::WriteDomain)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let story: UserStory = resolve(repos, "id", id)?;
            deletion::delete(repos, EntityType::UserStory, story.id, force)
        })
    }
}

fn list_options(repos: &Repos<'_>, filter: &UserStoryFilter) -> Result<ListOptions> {
    let mut options = ListOptions::new();
    if let Some(epic) = &filter.epic_id {
        let epic: Epic = resolve(repos, "epic_id", epic)?;
        options = options.filter(Filter::uuid("epic_id", epic.id));
    }
    if let Some(raw) = &filter.status {
        let status = status::parse_workflow_status(EntityType::UserStory, raw)?;
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
