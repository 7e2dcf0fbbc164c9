use serde::Deserialize;
use uuid::Uuid;

use super::{resolve, resolve_user, validate_description, validate_title, Page};
use crate::auth::{require, Capability};
use crate::context::RequestContext;
use crate::db::{Database, Filter, ListOptions, OrderBy};
use crate::error::{Error, Result};
use crate::models::{self, Epic, SteeringDocument};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSteeringDocument {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateSteeringDocument {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SteeringFilter {
    #[serde(default)]
    pub creator_id: Option<String>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub page: Page,
}

pub struct SteeringService<'a> {
    db: &'a Database,
}

impl<'a> SteeringService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(&self, ctx: &RequestContext, input: CreateSteeringDocument) -> Result<SteeringDocument> {
        require(&ctx.caller, Capability::WriteDomain)?;
        let title = validate_title("title", &input.title)?;
        let description = validate_description("description", input.description)?;
        let now = models::now();
        let document = SteeringDocument {
            id: Uuid::new_v4(),
            reference_id: String::new(),
            title,
            description,
            creator_id: ctx.user_id(),
            created_at: now,
            updated_at: now,
        };
        let document = self.db.with_transaction(&ctx.cancel, |repos| -> Result<SteeringDocument> {
            Ok(repos.steering_documents().create_with_reference(&document)?)
        })?;
        tracing::debug!(reference_id = %document.reference_id, "steering document created");
        Ok(document)
    }

    pub fn get(&self, ctx: &RequestContext, id: &str) -> Result<SteeringDocument> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| resolve(repos, "id", id))
    }

    pub fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        input: UpdateSteeringDocument,
    ) -> Result<SteeringDocument> {
        require(&ctx.caller, Capability::WriteDomain)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let mut document: SteeringDocument = resolve(repos, "id", id)?;
            if let Some(title) = &input.title {
                document.title = validate_title("title", title)?;
            }
            if input.description.is_some() {
                document.description = validate_description("description", input.description.clone())?;
            }
            document.updated_at = models::now();
            repos.steering_documents().update(&document)?;
            Ok(document)
        })
    }

    /// Deletes the document; its epic links go with it
    pub fn delete(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        require(&ctx.caller, Capability::WriteDomain)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let document: SteeringDocument = resolve(repos, "id", id)?;
            Ok(repos.steering_documents().delete(document.id)?)
        })
    }

    pub fn list(&self, ctx: &RequestContext, filter: &SteeringFilter) -> Result<Vec<SteeringDocument>> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let mut options = ListOptions::new();
            if let Some(creator) = &filter.creator_id {
                options = options.filter(Filter::uuid("creator_id", resolve_user(repos, creator)?.id));
            }
            if let Some(order) = &filter.order_by {
                options = options.order_by(OrderBy::parse(order));
            }
            let options = options.page(filter.page.limit(), filter.page.offset());
            Ok(repos.steering_documents().list(&options)?)
        })
    }

    /// Links a document to an epic; an existing link is a conflict
    pub fn link(&self, ctx: &RequestContext, epic: &str, document: &str) -> Result<()> {
        require(&ctx.caller, Capability::WriteDomain)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let epic: Epic = resolve(repos, "epic_id", epic)?;
            let document: SteeringDocument = resolve(repos, "steering_document_id", document)?;
            let documents = repos.steering_documents();
            let already = || {
                Error::conflict(format!(
                    "{} is already linked to {}",
                    document.reference_id, epic.reference_id
                ))
            };
            if documents.is_linked(epic.id, document.id)? {
                return Err(already());
            }
            match documents.link(epic.id, document.id) {
                Ok(()) => Ok(()),
                Err(err) if err.is_duplicate_of("epic_steering_documents") => Err(already()),
                Err(err) => Err(err.into()),
            }
        })
    }

    /// Removes a link; a missing link is not found
    pub fn unlink(&self, ctx: &RequestContext, epic: &str, document: &str) -> Result<()> {
        require(&ctx.caller, Capability::WriteDomain)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let epic: Epic = resolve(repos, "epic_id", epic)?;
            let document: SteeringDocument = resolve(repos, "steering_document_id", document)?;
            if !repos.steering_documents().unlink(epic.id, document.id)? {
                return Err(Error::not_found(
                    "steering link",
                    format!("{} -> {}", epic.reference_id, document.reference_id),
                ));
            }
            Ok(())
        })
    }

    pub fn list_for_epic(&self, ctx: &RequestContext, epic: &str) -> Result<Vec<SteeringDocument>> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let epic: Epic = resolve(repos, "epic_id", epic)?;
            Ok(repos.steering_documents().list_for_epic(epic.id)?)
        })
    }

    pub fn list_epics(&self, ctx: &RequestContext, document: &str) -> Result<Vec<Epic>> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            let document: SteeringDocument = resolve(repos, "steering_document_id", document)?;
            Ok(repos.epics().list_by_steering_document(document.id)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::epic::{CreateEpic, EpicService};
    use crate::services::test_support::{fixture, Fixture};

    fn setup(f: &Fixture) {
        let ctx = f.user_ctx();
        for title in ["Auth", "Billing"] {
            EpicService::new(&f.t.db)
                .create(&ctx, CreateEpic { title: title.into(), ..CreateEpic::default() })
                .unwrap();
        }
        SteeringService::new(&f.t.db)
            .create(&ctx, CreateSteeringDocument { title: "Security baseline".into(), description: None })
            .unwrap();
    }

    #[test]
    fn test_create_allocates_std_reference() {
        let f = fixture();
        setup(&f);
        let doc = SteeringService::new(&f.t.db).get(&f.user_ctx(), "std-1").unwrap();
        assert_eq!(doc.reference_id, "STD-1");
        assert_eq!(doc.creator_id, f.user.id);
    }

    #[test]
    fn test_link_twice_conflicts_and_unlink_missing_is_not_found() {
        let f = fixture();
        setup(&f);
        let ctx = f.user_ctx();
        let service = SteeringService::new(&f.t.db);

        service.link(&ctx, "EP-1", "STD-1").unwrap();
        service.link(&ctx, "EP-2", "STD-1").unwrap();
        assert!(matches!(service.link(&ctx, "ep-1", "STD-1"), Err(Error::Conflict { .. })));

        assert_eq!(service.list_for_epic(&ctx, "EP-1").unwrap().len(), 1);
        assert_eq!(service.list_epics(&ctx, "STD-1").unwrap().len(), 2);

        service.unlink(&ctx, "EP-1", "STD-1").unwrap();
        assert!(matches!(service.unlink(&ctx, "EP-1", "STD-1"), Err(Error::NotFound(_))));
        assert!(service.list_for_epic(&ctx, "EP-1").unwrap().is_empty());
    }

    #[test]
    fn test_delete_removes_links() {
        let f = fixture();
        setup(&f);
        let ctx = f.user_ctx();
        let service = SteeringService::new(&f.t.db);
        service.link(&ctx, "EP-1", "STD-1").unwrap();
        service
            .update(&ctx, "STD-1", UpdateSteeringDocument { title: Some("Baseline v2".into()), ..UpdateSteeringDocument::default() })
            .unwrap();
        service.delete(&ctx, "STD-1").unwrap();
        assert!(service.list_for_epic(&ctx, "EP-1").unwrap().is_empty());
        assert!(service.list(&ctx, &SteeringFilter::default()).unwrap().is_empty());
    }
}
