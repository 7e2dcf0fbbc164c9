//! Configuration surfaces: type catalogs and status models
//!
//! Every call here needs [`Capability::ManageConfig`] except the read-only
//! listings, which any caller may use.

use serde::Deserialize;
use uuid::Uuid;

use super::validate_description;
use crate::auth::{require, Capability};
use crate::context::RequestContext;
use crate::db::{Database, Entity, ListOptions, OrderBy, RepoResult, Repos};
use crate::error::{Error, Result, ValidationError};
use crate::models::{
    self, EntityType, RelationshipType, RequirementType, Status, StatusModel, StatusModelDetail,
    StatusTransition,
};
use crate::status::{self, NewStatus};

const MAX_TYPE_NAME_LEN: usize = 100;

/// Requirement and relationship types share one shape
trait CatalogType: Entity + Clone {
    fn build(name: String, description: Option<String>) -> Self;
    fn name(&self) -> &str;
    fn rename(&mut self, name: String);
    fn describe(&mut self, description: Option<String>);
    fn touch(&mut self);
    fn find_by_name(repos: &Repos<'_>, name: &str) -> RepoResult<Option<Self>>;
    fn is_in_use(repos: &Repos<'_>, id: Uuid) -> RepoResult<bool>;
}

macro_rules! catalog_type {
    ($ty:ty, $repo:ident) => {
        impl CatalogType for $ty {
            fn build(name: String, description: Option<String>) -> Self {
                let now = models::now();
                Self {
                    id: Uuid::new_v4(),
                    name,
                    description,
                    created_at: now,
                    updated_at: now,
                }
            }

            fn name(&self) -> &str {
                &self.name
            }

            fn rename(&mut self, name: String) {
                self.name = name;
            }

            fn describe(&mut self, description: Option<String>) {
                self.description = description;
            }

            fn touch(&mut self) {
                self.updated_at = models::now();
            }

            fn find_by_name(repos: &Repos<'_>, name: &str) -> RepoResult<Option<Self>> {
                repos.$repo().find_by_name(name)
            }

            fn is_in_use(repos: &Repos<'_>, id: Uuid) -> RepoResult<bool> {
                repos.$repo().is_in_use(id)
            }
        }
    };
}

catalog_type!(RequirementType, requirement_types);
catalog_type!(RelationshipType, relationship_types);

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateType {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateType {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateStatusModel {
    pub entity_type: EntityType,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddStatus {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub is_initial: bool,
    #[serde(default)]
    pub is_final: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddTransition {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub name: Option<String>,
}

fn validate_type_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_TYPE_NAME_LEN {
        return Err(ValidationError::new(
            "INVALID_NAME",
            format!("type name must be 1 to {} characters", MAX_TYPE_NAME_LEN),
        )
        .field("name")
        .into());
    }
    Ok(name.to_string())
}

fn name_clash<T: CatalogType>(name: &str) -> Error {
    Error::conflict(format!("{} '{}' already exists", T::NAME, name))
}

pub struct AdminService<'a> {
    db: &'a Database,
}

impl<'a> AdminService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    // ---------------------------------------------------------------------
    // Type catalogs
    // ---------------------------------------------------------------------

    pub fn list_requirement_types(&self, ctx: &RequestContext) -> Result<Vec<RequirementType>> {
        self.list_types(ctx)
    }

    pub fn create_requirement_type(&self, ctx: &RequestContext, input: CreateType) -> Result<RequirementType> {
        self.create_type(ctx, input)
    }

    pub fn update_requirement_type(
        &self,
        ctx: &RequestContext,
        id: &str,
        input: UpdateType,
    ) -> Result<RequirementType> {
        self.update_type(ctx, id, input)
    }

    pub fn delete_requirement_type(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        self.delete_type::<RequirementType>(ctx, id)
    }

    pub fn list_relationship_types(&self, ctx: &RequestContext) -> Result<Vec<RelationshipType>> {
        self.list_types(ctx)
    }

    pub fn create_relationship_type(&self, ctx: &RequestContext, input: CreateType) -> Result<RelationshipType> {
        self.create_type(ctx, input)
    }

    pub fn update_relationship_type(
        &self,
        ctx: &RequestContext,
        id: &str,
        input: UpdateType,
    ) -> Result<RelationshipType> {
        self.update_type(ctx, id, input)
    }

    pub fn delete_relationship_type(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        self.delete_type::<RelationshipType>(ctx, id)
    }

    fn list_types<T: CatalogType>(&self, ctx: &RequestContext) -> Result<Vec<T>> {
        require(&ctx.caller, Capability::Read)?;
        let options = ListOptions::new().order_by(OrderBy::asc("name"));
        self.db
            .with_read(&ctx.cancel, |repos| Ok(repos.of::<T>().list(&options)?))
    }

    fn create_type<T: CatalogType>(&self, ctx: &RequestContext, input: CreateType) -> Result<T> {
        require(&ctx.caller, Capability::ManageConfig)?;
        let name = validate_type_name(&input.name)?;
        let description = validate_description("description", input.description)?;
        let created = self.db.with_transaction(&ctx.cancel, |repos| {
            if T::find_by_name(repos, &name)?.is_some() {
                return Err(name_clash::<T>(&name));
            }
            Ok(repos.of::<T>().create(&T::build(name, description))?)
        })?;
        tracing::info!(kind = T::NAME, name = %created.name(), "type created");
        Ok(created)
    }

    fn update_type<T: CatalogType>(&self, ctx: &RequestContext, id: &str, input: UpdateType) -> Result<T> {
        require(&ctx.caller, Capability::ManageConfig)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let mut entry: T = find_type(repos, id)?;
            if let Some(name) = &input.name {
                let name = validate_type_name(name)?;
                if let Some(other) = T::find_by_name(repos, &name)? {
                    if other.id() != entry.id() {
                        return Err(name_clash::<T>(&name));
                    }
                }
                entry.rename(name);
            }
            if input.description.is_some() {
                entry.describe(validate_description("description", input.description.clone())?);
            }
            entry.touch();
            repos.of::<T>().update(&entry)?;
            Ok(entry)
        })
    }

    fn delete_type<T: CatalogType>(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        require(&ctx.caller, Capability::ManageConfig)?;
        let name = self.db.with_transaction(&ctx.cancel, |repos| {
            let entry: T = find_type(repos, id)?;
            if T::is_in_use(repos, entry.id())? {
                return Err(Error::conflict(format!(
                    "{} '{}' is in use",
                    T::NAME,
                    entry.name()
                )));
            }
            repos.of::<T>().delete(entry.id())?;
            Ok(entry.name().to_string())
        })?;
        tracing::info!(kind = T::NAME, %name, "type deleted");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Status models
    // ---------------------------------------------------------------------

    pub fn list_status_models(
        &self,
        ctx: &RequestContext,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<StatusModel>> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            Ok(repos.status_models().list_models(entity_type)?)
        })
    }

    pub fn status_model(&self, ctx: &RequestContext, id: Uuid) -> Result<StatusModelDetail> {
        require(&ctx.caller, Capability::Read)?;
        self.db
            .with_read(&ctx.cancel, |repos| status::model_detail(repos, id))
    }

    pub fn create_status_model(&self, ctx: &RequestContext, input: CreateStatusModel) -> Result<StatusModel> {
        require(&ctx.caller, Capability::ManageConfig)?;
        let model = self.db.with_transaction(&ctx.cancel, |repos| {
            status::create_model(repos, input.entity_type, &input.name, input.description.clone())
        })?;
        tracing::info!(entity_type = %model.entity_type, model = %model.name, "status model created");
        Ok(model)
    }

    pub fn add_status(&self, ctx: &RequestContext, model_id: Uuid, input: AddStatus) -> Result<Status> {
        require(&ctx.caller, Capability::ManageConfig)?;
        let new = NewStatus {
            name: input.name,
            description: input.description,
            color: input.color,
            sort_order: input.sort_order,
            is_initial: input.is_initial,
            is_final: input.is_final,
        };
        self.db
            .with_transaction(&ctx.cancel, |repos| status::add_status(repos, model_id, new))
    }

    pub fn add_transition(
        &self,
        ctx: &RequestContext,
        model_id: Uuid,
        input: AddTransition,
    ) -> Result<StatusTransition> {
        require(&ctx.caller, Capability::ManageConfig)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            status::add_transition(repos, model_id, &input.from, &input.to, input.name.clone())
        })
    }

    /// Makes the model its entity type's default; the old default is cleared atomically
    pub fn set_default_status_model(&self, ctx: &RequestContext, model_id: Uuid) -> Result<StatusModel> {
        require(&ctx.caller, Capability::ManageConfig)?;
        self.db
            .with_transaction(&ctx.cancel, |repos| status::set_default_model(repos, model_id))
    }

    pub fn delete_status_model(&self, ctx: &RequestContext, model_id: Uuid) -> Result<()> {
        require(&ctx.caller, Capability::ManageConfig)?;
        self.db
            .with_transaction(&ctx.cancel, |repos| status::delete_model(repos, model_id))
    }
}

/// Loads a catalog entry by UUID or name
fn find_type<T: CatalogType>(repos: &Repos<'_>, input: &str) -> Result<T> {
    let input = input.trim();
    let found = match Uuid::parse_str(input) {
        Ok(id) => repos.of::<T>().find_by_id(id)?,
        Err(_) => T::find_by_name(repos, input)?,
    };
    found.ok_or_else(|| Error::not_found(T::NAME, input))
}
