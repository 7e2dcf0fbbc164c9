use serde::Deserialize;

use super::{resolve, resolve_user, validate_body};
use crate::auth::{require, Capability};
use crate::context::RequestContext;
use crate::db::Database;
use crate::deletion::{self, DeletionResult, DependencyReport};
use crate::error::Result;
use crate::models::{
    self, AcceptanceCriteria, AcceptanceCriteriaDetail, EntityType, Includes, UserStory,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateAcceptanceCriteria {
    /// UUID or `US-n`
    pub user_story_id: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAcceptanceCriteria {
    #[serde(default)]
    pub description: Option<String>,
}

pub struct AcceptanceCriteriaService<'a> {
    db: &'a Database,
}

impl<'a> AcceptanceCriteriaService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(
        &self,
        ctx: &RequestContext,
        input: CreateAcceptanceCriteria,
    ) -> Result<AcceptanceCriteria> {
        require(&ctx.caller, Capability::WriteDomain)?;
        let description = validate_body("description", &input.description)?;
        let ac = self.db.with_transaction(&ctx.cancel, |repos| -> Result<AcceptanceCriteria> {
            let story: UserStory = resolve(repos, "user_story_id", &input.user_story_id)?;
            let ac = AcceptanceCriteria::new(story.id, description, ctx.user_id());
            Ok(repos.acceptance_criteria().create_with_reference(&ac)?)
        })?;
        tracing::debug!(reference_id = %ac.reference_id, "acceptance criteria created");
        Ok(ac)
    }

    pub fn get(
        &self,
        ctx: &RequestContext,
        id: &str,
        includes: &Includes,
    ) -> Result<AcceptanceCriteriaDetail> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let ac: AcceptanceCriteria = resolve(repos, "id", id)?;
            Ok(repos.acceptance_criteria().get_with_includes(ac.id, includes)?)
        })
    }

    pub fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        input: UpdateAcceptanceCriteria,
    ) -> Result<AcceptanceCriteria> {
        require(&ctx.caller, Capability::WriteDomain)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let mut ac: AcceptanceCriteria = resolve(repos, "id", id)?;
            if let Some(description) = &input.description {
                ac.description = validate_body("description", description)?;
                ac.updated_at = models::now();
                repos.acceptance_criteria().update(&ac)?;
            }
            Ok(ac)
        })
    }

    pub fn list_by_user_story(
        &self,
        ctx: &RequestContext,
        user_story: &str,
    ) -> Result<Vec<AcceptanceCriteria>> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let story: UserStory = resolve(repos, "user_story_id", user_story)?;
            Ok(repos.acceptance_criteria().list_by_user_story(story.id)?)
        })
    }

    /// Criteria written by a user, given as UUID or username
    pub fn list_by_author(&self, ctx: &RequestContext, author: &str) -> Result<Vec<AcceptanceCriteria>> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let author = resolve_user(repos, author)?;
            Ok(repos.acceptance_criteria().list_by_author(author.id)?)
        })
    }

    pub fn validate_deletion(&self, ctx: &RequestContext, id: &str) -> Result<DependencyReport> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let ac: AcceptanceCriteria = resolve(repos, "id", id)?;
            deletion::validate_deletion(repos, EntityType::AcceptanceCriteria, ac.id)
        })
    }

    pub fn delete(&self, ctx: &RequestContext, id: &str, force: bool) -> Result<DeletionResult> {
        require(&ctx.caller, Capability::WriteDomain)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let ac: AcceptanceCriteria = resolve(repos, "id", id)?;
            deletion::delete(repos, EntityType::AcceptanceCriteria, ac.id, force)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::Include;
    use crate::services::epic::{CreateEpic, EpicService};
    use crate::services::test_support::{fixture, Fixture};
    use crate::services::user_story::{CreateUserStory, UserStoryService};

    fn with_story(f: &Fixture) {
        let ctx = f.user_ctx();
        EpicService::new(&f.t.db)
            .create(&ctx, CreateEpic { title: "Auth".into(), ..CreateEpic::default() })
            .unwrap();
        UserStoryService::new(&f.t.db)
            .create(
                &ctx,
                CreateUserStory { epic_id: "EP-1".into(), title: "Login".into(), ..CreateUserStory::default() },
            )
            .unwrap();
    }

    fn when(story: &str) -> CreateAcceptanceCriteria {
        CreateAcceptanceCriteria {
            user_story_id: story.into(),
            description: "WHEN the user submits valid credentials THE system SHALL sign them in".into(),
        }
    }

    #[test]
    fn test_create_pins_author() {
        let f = fixture();
        with_story(&f);
        let service = AcceptanceCriteriaService::new(&f.t.db);
        let ac = service.create(&f.user_ctx(), when("US-1")).unwrap();
        assert_eq!(ac.reference_id, "AC-1");
        assert_eq!(ac.author_id, f.user.id);

        let detail = service
            .get(&f.user_ctx(), "ac-1", &Includes::of(&[Include::Creator]))
            .unwrap();
        assert_eq!(detail.author.unwrap().username, "uma");
    }

    #[test]
    fn test_empty_description_rejected() {
        let f = fixture();
        with_story(&f);
        let service = AcceptanceCriteriaService::new(&f.t.db);
        let err = service
            .create(&f.user_ctx(), CreateAcceptanceCriteria { user_story_id: "US-1".into(), description: " ".into() })
            .unwrap_err();
        assert_eq!(err.as_validation().unwrap().code, "REQUIRED");
    }

    #[test]
    fn test_list_by_story_and_author() {
        let f = fixture();
        with_story(&f);
        let service = AcceptanceCriteriaService::new(&f.t.db);
        service.create(&f.user_ctx(), when("US-1")).unwrap();
        service.create(&f.ctx(&f.admin), when("US-1")).unwrap();

        assert_eq!(service.list_by_user_story(&f.user_ctx(), "US-1").unwrap().len(), 2);
        let mine = service.list_by_author(&f.user_ctx(), "uma").unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].reference_id, "AC-1");
        assert!(matches!(
            service.list_by_author(&f.user_ctx(), "ghost"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_update_description() {
        let f = fixture();
        with_story(&f);
        let service = AcceptanceCriteriaService::new(&f.t.db);
        service.create(&f.user_ctx(), when("US-1")).unwrap();
        let ac = service
            .update(
                &f.user_ctx(),
                "AC-1",
                UpdateAcceptanceCriteria { description: Some("IF the password is wrong THEN reject".into()) },
            )
            .unwrap();
        assert!(ac.description.starts_with("IF"));
    }
}
