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
    self, EntityType, Epic, EpicDetail, EpicHierarchy, Includes, UserStory, WorkflowStatus,
};
use crate::status;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateEpic {
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

/// Whitelisted epic fields; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateEpic {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub status: Option<String>,
    /// Empty string unassigns
    #[serde(default)]
    pub assignee_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EpicFilter {
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

pub struct EpicService<'a> {
    db: &'a Database,
}

impl<'a> EpicService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(&self, ctx: &RequestContext, input: CreateEpic) -> Result<Epic> {
        require(&ctx.caller, Capability::WriteDomain)?;
        let title = validate_title("title", &input.title)?;
        let description = validate_description("description", input.description)?;
        let priority = parse_priority(input.priority)?;

        let epic = self.db.with_transaction(&ctx.cancel, |repos| -> Result<Epic> {
            let mut epic = Epic::new(title, priority, ctx.user_id());
            epic.description = description;
            epic.status = initial_workflow_status(repos, EntityType::Epic, input.status.as_deref())?;
            if let Some(assignee) = resolve_assignee(repos, input.assignee_id.as_deref())? {
                epic.assignee_id = assignee;
            }
            Ok(repos.epics().create_with_reference(&epic)?)
        })?;
        tracing::debug!(reference_id = %epic.reference_id, "epic created");
        Ok(epic)
    }

    pub fn get(&self, ctx: &RequestContext, id: &str, includes: &Includes) -> Result<EpicDetail> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let epic: Epic = resolve(repos, "id", id)?;
            Ok(repos.epics().get_with_includes(epic.id, includes)?)
        })
    }

    pub fn update(&self, ctx: &RequestContext, id: &str, input: UpdateEpic) -> Result<Epic> {
        require(&ctx.caller, Capability::WriteDomain)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let mut epic: Epic = resolve(repos, "id", id)?;
            if let Some(title) = &input.title {
                epic.title = validate_title("title", title)?;
            }
            if input.description.is_some() {
                epic.description = validate_description("description", input.description.clone())?;
            }
            if input.priority.is_some() {
                epic.priority = parse_priority(input.priority)?;
            }
            if let Some(requested) = &input.status {
                if let Some(next) = next_workflow_status(repos, EntityType::Epic, epic.status, requested)? {
                    epic.status = next;
                }
            }
            if let Some(assignee) = resolve_assignee(repos, input.assignee_id.as_deref())? {
                epic.assignee_id = assignee;
            }
            epic.updated_at = models::now();
            repos.epics().update(&epic)?;
            Ok(epic)
        })
    }

    /// Moves the epic along its status model; an unchanged status is a no-op
    pub fn change_status(&self, ctx: &RequestContext, id: &str, status: &str) -> Result<Epic> {
        require(&ctx.caller, Capability::WriteDomain)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let mut epic: Epic = resolve(repos, "id", id)?;
            if let Some(next) = next_workflow_status(repos, EntityType::Epic, epic.status, status)? {
                epic.status = next;
                epic.updated_at = models::now();
                repos.epics().update(&epic)?;
            }
            Ok(epic)
        })
    }

    /// Sets the assignee; an empty string unassigns
    pub fn assign(&self, ctx: &RequestContext, id: &str, assignee: &str) -> Result<Epic> {
        require(&ctx.caller, Capability::WriteDomain)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let epic: Epic = resolve(repos, "id", id)?;
            let assignee = resolve_assignee(repos, Some(assignee))?.flatten();
            Ok(repos.epics().set_assignee(epic.id, assignee)?)
        })
    }

    pub fn list(
        &self,
        ctx: &RequestContext,
        filter: &EpicFilter,
        includes: &Includes,
    ) -> Result<Vec<EpicDetail>> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let options = list_options(repos, filter)?;
            Ok(repos.epics().list_with_includes(&options, includes)?)
        })
    }

    pub fn list_user_stories(&self, ctx: &RequestContext, id: &str) -> Result<Vec<UserStory>> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let epic: Epic = resolve(repos, "id", id)?;
            Ok(repos.user_stories().list_by_epic(epic.id)?)
        })
    }

    /// Steering documents and stories, each story with requirements and criteria
    pub fn complete_hierarchy(&self, ctx: &RequestContext, id: &str) -> Result<EpicHierarchy> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let epic: Epic = resolve(repos, "id", id)?;
            Ok(repos.epics().complete_hierarchy(epic.id)?)
        })
    }

    pub fn validate_deletion(&self, ctx: &RequestContext, id: &str) -> Result<DependencyReport> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let epic: Epic = resolve(repos, "id", id)?;
            deletion::validate_deletion(repos, EntityType::Epic, epic.id)
        })
    }

    pub fn delete(&self, ctx: &RequestContext, id: &str, force: bool) -> Result<DeletionResult> {
        require(&ctx.caller, Capability::WriteDomain)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let epic: Epic = resolve(repos, "id", id)?;
            deletion::delete(repos, EntityType::Epic, epic.id, force)
        })
    }
}

fn list_options(repos: &Repos<'_>, filter: &EpicFilter) -> Result<ListOptions> {
    let mut options = ListOptions::new();
    if let Some(raw) = &filter.status {
        let status: WorkflowStatus = status::parse_workflow_status(EntityType::Epic, raw)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::{Include, Priority};
    use crate::services::test_support::fixture;

    fn auth_epic() -> CreateEpic {
        CreateEpic {
            title: "Auth".into(),
            priority: Some(2),
            ..CreateEpic::default()
        }
    }

    #[test]
    fn test_create_pins_creator_and_allocates_reference() {
        let f = fixture();
        let service = EpicService::new(&f.t.db);
        let epic = service.create(&f.user_ctx(), auth_epic()).unwrap();
        assert_eq!(epic.reference_id, "EP-1");
        assert_eq!(epic.creator_id, f.user.id);
        assert_eq!(epic.priority, Priority::High);
        assert_eq!(epic.status, WorkflowStatus::Backlog);
    }

    #[test]
    fn test_reference_lookup_is_case_insensitive() {
        let f = fixture();
        let service = EpicService::new(&f.t.db);
        let ctx = f.user_ctx();
        let epic = service.create(&ctx, auth_epic()).unwrap();
        for input in ["EP-1", "ep-1", "Ep-1"] {
            let found = service.get(&ctx, input, &Includes::none()).unwrap();
            assert_eq!(found.epic.id, epic.id, "{input}");
        }
        let found = service
            .get(&ctx, &epic.id.to_string(), &Includes::of(&[Include::Creator]))
            .unwrap();
        assert_eq!(found.creator.unwrap().id, f.user.id);
        assert!(matches!(
            service.get(&ctx, "EP-99", &Includes::none()),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            service.get(&ctx, "US-1", &Includes::none()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_status_changes_follow_model() {
        let f = fixture();
        let service = EpicService::new(&f.t.db);
        let ctx = f.user_ctx();
        service.create(&ctx, auth_epic()).unwrap();

        let err = service.change_status(&ctx, "EP-1", "Done").unwrap_err();
        let v = err.as_validation().unwrap();
        assert_eq!(v.code, "INVALID_STATUS_TRANSITION");
        assert_eq!(
            v.valid_values.clone().unwrap(),
            vec!["Draft".to_string(), "Cancelled".into()]
        );

        let epic = service.change_status(&ctx, "EP-1", "draft").unwrap();
        assert_eq!(epic.status, WorkflowStatus::Draft);
        let epic = service.change_status(&ctx, "EP-1", "in_progress").unwrap();
        assert_eq!(epic.status, WorkflowStatus::InProgress);
        let same = service.change_status(&ctx, "EP-1", "In Progress").unwrap();
        assert_eq!(same.updated_at, epic.updated_at);
    }

    #[test]
    fn test_create_rejects_non_initial_status() {
        let f = fixture();
        let service = EpicService::new(&f.t.db);
        let err = service
            .create(
                &f.user_ctx(),
                CreateEpic {
                    status: Some("Done".into()),
                    ..auth_epic()
                },
            )
            .unwrap_err();
        assert_eq!(err.as_validation().unwrap().code, "INVALID_INITIAL_STATUS");
    }

    #[test]
    fn test_assign_and_unassign() {
        let f = fixture();
        let service = EpicService::new(&f.t.db);
        let ctx = f.user_ctx();
        service.create(&ctx, auth_epic()).unwrap();

        let epic = service.assign(&ctx, "EP-1", "root").unwrap();
        assert_eq!(epic.assignee_id, Some(f.admin.id));
        let epic = service
            .update(&ctx, "EP-1", UpdateEpic { title: Some("Auth v2".into()), ..UpdateEpic::default() })
            .unwrap();
        assert_eq!(epic.assignee_id, Some(f.admin.id));
        assert_eq!(epic.title, "Auth v2");
        let epic = service.assign(&ctx, "EP-1", "").unwrap();
        assert_eq!(epic.assignee_id, None);
    }

    #[test]
    fn test_commenter_cannot_create() {
        let f = fixture();
        let service = EpicService::new(&f.t.db);
        let err = service.create(&f.ctx(&f.commenter), auth_epic()).unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert!(service
            .list(&f.ctx(&f.commenter), &EpicFilter::default(), &Includes::none())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_list_filters_and_paginates() {
        let f = fixture();
        let service = EpicService::new(&f.t.db);
        let ctx = f.user_ctx();
        for (title, priority) in [("A", 1), ("B", 2), ("C", 2)] {
            service
                .create(&ctx, CreateEpic { title: title.into(), priority: Some(priority), ..CreateEpic::default() })
                .unwrap();
        }
        let high = service
            .list(&ctx, &EpicFilter { priority: Some(2), ..EpicFilter::default() }, &Includes::none())
            .unwrap();
        assert_eq!(high.len(), 2);

        let page = service
            .list(
                &ctx,
                &EpicFilter { page: Page::new(1, 1), ..EpicFilter::default() },
                &Includes::none(),
            )
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].epic.title, "B");

        let by_title = service
            .list(
                &ctx,
                &EpicFilter { order_by: Some("-title".into()), ..EpicFilter::default() },
                &Includes::none(),
            )
            .unwrap();
        assert_eq!(by_title[0].epic.title, "C");
    }
}
