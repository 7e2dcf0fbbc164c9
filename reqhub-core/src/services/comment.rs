//! Threaded and inline comments on the four planning entity types
//!
//! A comment targets `(entity_type, entity_id)`; there is no foreign key to
//! the parent entity, so existence is checked here on create. Inline
//! anchors are validated against the parent's description (its title when
//! it has none) at creation time and never re-anchored afterwards;
//! [`CommentService::validate_inline`] reports which anchors went stale.

use serde::Deserialize;
use uuid::Uuid;

use super::{resolve, validate_body, Page};
use crate::auth::{require, Capability};
use crate::context::RequestContext;
use crate::db::{Database, Repos};
use crate::error::{Error, Result, ValidationError};
use crate::models::{
    self, AcceptanceCriteria, Comment, EntityType, Epic, InlineAnchor, InlineCommentValidity,
    Requirement, UserStory,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateComment {
    pub entity_type: EntityType,
    /// UUID or reference of the commented entity
    pub entity_id: String,
    pub content: String,
    #[serde(default)]
    pub parent_comment_id: Option<Uuid>,
    #[serde(default)]
    pub linked_text: Option<String>,
    #[serde(default)]
    pub text_position_start: Option<i64>,
    #[serde(default)]
    pub text_position_end: Option<i64>,
}

impl CreateComment {
    pub fn new(entity_type: EntityType, entity_id: &str, content: &str) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.to_string(),
            content: content.to_string(),
            parent_comment_id: None,
            linked_text: None,
            text_position_start: None,
            text_position_end: None,
        }
    }

    fn anchor(&self) -> Result<Option<InlineAnchor>> {
        match (&self.linked_text, self.text_position_start, self.text_position_end) {
            (None, None, None) => Ok(None),
            (Some(linked_text), Some(start), Some(end)) => Ok(Some(InlineAnchor {
                linked_text: linked_text.clone(),
                text_position_start: start,
                text_position_end: end,
            })),
            _ => Err(ValidationError::new(
                "INVALID_ANCHOR",
                "inline comments need linked_text, text_position_start and text_position_end",
            )
            .field("linked_text")
            .into()),
        }
    }
}

/// The commented entity's id and the text inline anchors point into
fn load_target(repos: &Repos<'_>, entity_type: EntityType, input: &str) -> Result<(Uuid, String)> {
    let pick = |description: Option<String>, title: String| description.unwrap_or(title);
    Ok(match entity_type {
        EntityType::Epic => {
            let epic: Epic = resolve(repos, "entity_id", input)?;
            (epic.id, pick(epic.description, epic.title))
        }
        EntityType::UserStory => {
            let story: UserStory = resolve(repos, "entity_id", input)?;
            (story.id, pick(story.description, story.title))
        }
        EntityType::AcceptanceCriteria => {
            let ac: AcceptanceCriteria = resolve(repos, "entity_id", input)?;
            (ac.id, ac.description)
        }
        EntityType::Requirement => {
            let requirement: Requirement = resolve(repos, "entity_id", input)?;
            (requirement.id, pick(requirement.description, requirement.title))
        }
    })
}

pub struct CommentService<'a> {
    db: &'a Database,
}

impl<'a> CommentService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Creates a root comment, a reply (`parent_comment_id`) or an inline comment
    pub fn create(&self, ctx: &RequestContext, input: CreateComment) -> Result<Comment> {
        require(&ctx.caller, Capability::Comment)?;
        let content = validate_body("content", &input.content)?;
        let anchor = input.anchor()?;

        self.db.with_transaction(&ctx.cancel, |repos| {
            let (entity_id, text) = load_target(repos, input.entity_type, &input.entity_id)?;
            let comments = repos.comments();

            if let Some(parent_id) = input.parent_comment_id {
                let parent = comments.get_by_id(parent_id)?;
                if parent.entity_type != input.entity_type || parent.entity_id != entity_id {
                    return Err(ValidationError::new(
                        "PARENT_MISMATCH",
                        "a reply must target the same entity as its parent",
                    )
                    .field("parent_comment_id")
                    .into());
                }
            }
            if let Some(anchor) = &anchor {
                if !anchor.matches(&text) {
                    return Err(ValidationError::new(
                        "INVALID_ANCHOR",
                        format!(
                            "anchor {}..{} does not select '{}' in the {} text",
                            anchor.text_position_start,
                            anchor.text_position_end,
                            anchor.linked_text,
                            input.entity_type
                        ),
                    )
                    .field("text_position_start")
                    .into());
                }
            }

            let mut comment = Comment::new(input.entity_type, entity_id, ctx.user_id(), content);
            comment.parent_comment_id = input.parent_comment_id;
            comment.anchor = anchor;
            Ok(comments.create(&comment)?)
        })
    }

    pub fn get(&self, ctx: &RequestContext, id: Uuid) -> Result<Comment> {
        require(&ctx.caller, Capability::Read)?;
        self.db
            .with_read(&ctx.cancel, |repos| Ok(repos.comments().get_by_id(id)?))
    }

    /// Rewrites the content; only the author may
    pub fn update(&self, ctx: &RequestContext, id: Uuid, content: &str) -> Result<Comment> {
        require(&ctx.caller, Capability::Comment)?;
        let content = validate_body("content", content)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let mut comment = repos.comments().get_by_id(id)?;
            if comment.author_id != ctx.user_id() {
                return Err(Error::Forbidden("only the author may edit a comment".to_string()));
            }
            comment.content = content;
            comment.updated_at = models::now();
            repos.comments().update(&comment)?;
            Ok(comment)
        })
    }

    /// Sets the resolution flag of a root comment
    pub fn set_resolved(&self, ctx: &RequestContext, id: Uuid, resolved: bool) -> Result<Comment> {
        require(&ctx.caller, Capability::Comment)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let mut comment = repos.comments().get_by_id(id)?;
            if comment.is_reply() {
                return Err(ValidationError::new(
                    "NOT_A_ROOT_COMMENT",
                    "only root comments can be resolved",
                )
                .field("id")
                .into());
            }
            if comment.is_resolved != resolved {
                comment.is_resolved = resolved;
                comment.updated_at = models::now();
                repos.comments().update(&comment)?;
            }
            Ok(comment)
        })
    }

    pub fn resolve(&self, ctx: &RequestContext, id: Uuid) -> Result<Comment> {
        self.set_resolved(ctx, id, true)
    }

    pub fn unresolve(&self, ctx: &RequestContext, id: Uuid) -> Result<Comment> {
        self.set_resolved(ctx, id, false)
    }

    /// Deletes a comment and its replies; author or administrator only
    pub fn delete(&self, ctx: &RequestContext, id: Uuid) -> Result<()> {
        require(&ctx.caller, Capability::Comment)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let comment = repos.comments().get_by_id(id)?;
            if comment.author_id != ctx.user_id() && !ctx.caller.is_admin() {
                return Err(Error::Forbidden(
                    "only the author or an administrator may delete a comment".to_string(),
                ));
            }
            Ok(repos.comments().delete(id)?)
        })
    }

    /// Root comments of an entity, oldest first
    pub fn list_roots(
        &self,
        ctx: &RequestContext,
        entity_type: EntityType,
        entity_id: &str,
        page: Page,
    ) -> Result<Vec<Comment>> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let (entity_id, _) = load_target(repos, entity_type, entity_id)?;
            Ok(repos
                .comments()
                .list_roots(entity_type, entity_id, page.limit(), page.offset())?)
        })
    }

    pub fn list_replies(&self, ctx: &RequestContext, parent_id: Uuid, page: Page) -> Result<Vec<Comment>> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            repos.comments().get_by_id(parent_id)?;
            Ok(repos
                .comments()
                .list_replies(parent_id, page.limit(), page.offset())?)
        })
    }

    /// Re-checks every inline anchor on an entity against its current text
    pub fn validate_inline(
        &self,
        ctx: &RequestContext,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Vec<InlineCommentValidity>> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let (entity_id, text) = load_target(repos, entity_type, entity_id)?;
            Ok(repos
                .comments()
                .list_inline(entity_type, entity_id)?
                .into_iter()
                .map(|comment| InlineCommentValidity {
                    comment_id: comment.id,
                    is_valid: comment.anchor.as_ref().is_some_and(|a| a.matches(&text)),
                })
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::epic::{CreateEpic, EpicService, UpdateEpic};
    use crate::services::test_support::{fixture, Fixture};

    const TEXT: &str = "WHEN the user logs in THE system SHALL greet them";

    fn with_epic(f: &Fixture) {
        EpicService::new(&f.t.db)
            .create(
                &f.user_ctx(),
                CreateEpic { title: "Auth".into(), description: Some(TEXT.into()), ..CreateEpic::default() },
            )
            .unwrap();
    }

    fn inline(start: i64, end: i64, linked: &str) -> CreateComment {
        CreateComment {
            linked_text: Some(linked.into()),
            text_position_start: Some(start),
            text_position_end: Some(end),
            ..CreateComment::new(EntityType::Epic, "EP-1", "Which user?")
        }
    }

    #[test]
    fn test_commenter_can_comment_and_reply() {
        let f = fixture();
        with_epic(&f);
        let service = CommentService::new(&f.t.db);
        let cleo = f.ctx(&f.commenter);

        let root = service
            .create(&cleo, CreateComment::new(EntityType::Epic, "ep-1", "Looks good"))
            .unwrap();
        assert_eq!(root.author_id, f.commenter.id);
        let reply = service
            .create(
                &f.user_ctx(),
                CreateComment { parent_comment_id: Some(root.id), ..CreateComment::new(EntityType::Epic, "EP-1", "Thanks") },
            )
            .unwrap();
        assert!(reply.is_reply());

        let roots = service.list_roots(&cleo, EntityType::Epic, "EP-1", Page::default()).unwrap();
        assert_eq!(roots.len(), 1);
        let replies = service.list_replies(&cleo, root.id, Page::default()).unwrap();
        assert_eq!(replies[0].id, reply.id);
    }

    #[test]
    fn test_missing_entity_rejected() {
        let f = fixture();
        let service = CommentService::new(&f.t.db);
        let err = service
            .create(&f.user_ctx(), CreateComment::new(EntityType::Requirement, "REQ-5", "?"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_inline_anchor_validation() {
        let f = fixture();
        with_epic(&f);
        let service = CommentService::new(&f.t.db);
        let ctx = f.user_ctx();

        let comment = service.create(&ctx, inline(9, 13, "user")).unwrap();
        assert!(comment.is_inline());

        for bad in [inline(9, 9, ""), inline(-1, 3, "WHE"), inline(40, 999, "x"), inline(0, 4, "THEN")] {
            let err = service.create(&ctx, bad).unwrap_err();
            assert_eq!(err.as_validation().unwrap().code, "INVALID_ANCHOR");
        }
        let partial = CreateComment { linked_text: Some("user".into()), ..CreateComment::new(EntityType::Epic, "EP-1", "x") };
        assert!(service.create(&ctx, partial).is_err());
    }

    #[test]
    fn test_validate_inline_reports_stale_anchors() {
        let f = fixture();
        with_epic(&f);
        let service = CommentService::new(&f.t.db);
        let ctx = f.user_ctx();
        let kept = service.create(&ctx, inline(0, 4, "WHEN")).unwrap();
        let stale = service.create(&ctx, inline(9, 13, "user")).unwrap();

        EpicService::new(&f.t.db)
            .update(
                &ctx,
                "EP-1",
                UpdateEpic { description: Some("WHEN an admin logs in".into()), ..UpdateEpic::default() },
            )
            .unwrap();
        let report = service.validate_inline(&ctx, EntityType::Epic, "EP-1").unwrap();
        assert_eq!(
            report,
            vec![
                InlineCommentValidity { comment_id: kept.id, is_valid: true },
                InlineCommentValidity { comment_id: stale.id, is_valid: false },
            ]
        );
    }

    #[test]
    fn test_resolution_and_ownership() {
        let f = fixture();
        with_epic(&f);
        let service = CommentService::new(&f.t.db);
        let uma = f.user_ctx();
        let cleo = f.ctx(&f.commenter);

        let root = service.create(&uma, CreateComment::new(EntityType::Epic, "EP-1", "Root")).unwrap();
        let reply = service
            .create(&cleo, CreateComment { parent_comment_id: Some(root.id), ..CreateComment::new(EntityType::Epic, "EP-1", "Reply") })
            .unwrap();

        assert!(service.resolve(&cleo, root.id).unwrap().is_resolved);
        assert!(!service.unresolve(&uma, root.id).unwrap().is_resolved);
        assert_eq!(
            service.resolve(&uma, reply.id).unwrap_err().as_validation().unwrap().code,
            "NOT_A_ROOT_COMMENT"
        );

        assert!(matches!(service.update(&cleo, root.id, "mine now"), Err(Error::Forbidden(_))));
        assert_eq!(service.update(&uma, root.id, "Edited").unwrap().content, "Edited");
        assert!(matches!(service.delete(&cleo, root.id), Err(Error::Forbidden(_))));

        service.delete(&f.ctx(&f.admin), root.id).unwrap();
        assert!(matches!(service.get(&uma, reply.id), Err(Error::NotFound(_))));
    }
}
