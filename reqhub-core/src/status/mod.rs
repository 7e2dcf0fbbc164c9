//! Status engine
//!
//! Entities carry their status as a plain string column; the engine is
//! consulted only to validate a transition, to pick the initial status on
//! create, and to advertise the permissible next states. Every check runs
//! against the entity type's default [`StatusModel`].

mod normalize;

pub use normalize::{canonical_status, parse_requirement_status, parse_workflow_status};

use uuid::Uuid;

use crate::db::repos::StatusRepository;
use crate::db::Repos;
use crate::error::{Error, Result, ValidationError};
use crate::models::{
    self, canonical_status_names, EntityType, Status, StatusModel, StatusModelDetail,
    StatusTransition,
};

/// Transition checks against the default status models
pub struct StatusEngine<'c> {
    store: StatusRepository<'c>,
}

impl<'c> StatusEngine<'c> {
    pub fn new(repos: &Repos<'c>) -> Self {
        Self {
            store: repos.status_models(),
        }
    }

    /// The default model for `entity_type`
    pub fn default_model(&self, entity_type: EntityType) -> Result<StatusModel> {
        self.store.default_model(entity_type)?.ok_or_else(|| {
            Error::Internal(format!("no default status model for {}", entity_type))
        })
    }

    fn status_named(&self, model: &StatusModel, name: &str) -> Result<Status> {
        match self.store.find_status(model.id, name)? {
            Some(status) => Ok(status),
            None => {
                let valid: Vec<String> = self
                    .store
                    .list_statuses(model.id)?
                    .into_iter()
                    .map(|s| s.name)
                    .collect();
                Err(ValidationError::new(
                    "INVALID_STATUS",
                    format!("'{}' is not a status of model '{}'", name, model.name),
                )
                .field("status")
                .valid_values(valid)
                .into())
            }
        }
    }

    /// Statuses reachable in one step from `current`
    pub fn allowed_transitions(&self, entity_type: EntityType, current: &str) -> Result<Vec<String>> {
        let model = self.default_model(entity_type)?;
        let from = self.status_named(&model, current)?;
        Ok(self
            .store
            .targets_from(model.id, from.id)?
            .into_iter()
            .map(|s| s.name)
            .collect())
    }

    /// Succeeds iff the default model has an edge `current -> proposed`
    pub fn validate_transition(
        &self,
        entity_type: EntityType,
        current: &str,
        proposed: &str,
    ) -> Result<()> {
        let model = self.default_model(entity_type)?;
        let from = self.status_named(&model, current)?;
        let to = self.status_named(&model, proposed)?;
        if self.store.has_transition(model.id, from.id, to.id)? {
            return Ok(());
        }
        let valid: Vec<String> = self
            .store
            .targets_from(model.id, from.id)?
            .into_iter()
            .map(|s| s.name)
            .collect();
        Err(ValidationError::new(
            "INVALID_STATUS_TRANSITION",
            format!("cannot move {} from '{}' to '{}'", entity_type, current, proposed),
        )
        .field("status")
        .valid_values(valid)
        .into())
    }

    /// The status a new entity starts in
    ///
    /// A supplied status must equal the model's initial status.
    pub fn initial_status(&self, entity_type: EntityType, requested: Option<&str>) -> Result<String> {
        let model = self.default_model(entity_type)?;
        let initial = self.store.initial_status(model.id)?.ok_or_else(|| {
            Error::Internal(format!("status model '{}' has no initial status", model.name))
        })?;
        match requested {
            None => Ok(initial.name),
            Some(name) if name == initial.name => Ok(initial.name),
            Some(name) => Err(ValidationError::new(
                "INVALID_INITIAL_STATUS",
                format!("new {} must start in '{}', not '{}'", entity_type, initial.name, name),
            )
            .field("status")
            .valid_values([initial.name])
            .into()),
        }
    }
}

/// A default model that lacks canonical statuses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDrift {
    pub entity_type: EntityType,
    pub missing: Vec<String>,
}

/// Checks every default model against the canonical status names
///
/// Each drift is logged; the list is returned for callers that want to
/// refuse to start.
pub fn verify_canonical(repos: &Repos<'_>) -> Result<Vec<ModelDrift>> {
    let store = repos.status_models();
    let mut drift = Vec::new();
    for entity_type in EntityType::ALL {
        let Some(model) = store.default_model(entity_type)? else {
            tracing::warn!(%entity_type, "no default status model");
            drift.push(ModelDrift {
                entity_type,
                missing: canonical_status_names(entity_type).iter().map(|s| s.to_string()).collect(),
            });
            continue;
        };
        let present: Vec<String> = store.list_statuses(model.id)?.into_iter().map(|s| s.name).collect();
        let missing: Vec<String> = canonical_status_names(entity_type)
            .iter()
            .filter(|name| !present.iter().any(|p| p == *name))
            .map(|s| s.to_string())
            .collect();
        if !missing.is_empty() {
            tracing::warn!(%entity_type, model = %model.name, ?missing, "status model drift");
            drift.push(ModelDrift {
                entity_type,
                missing,
            });
        }
    }
    Ok(drift)
}

// =========================================================================
// Model administration
// =========================================================================

pub fn model_detail(repos: &Repos<'_>, id: Uuid) -> Result<StatusModelDetail> {
    let store = repos.status_models();
    let model = store.get_model(id)?;
    Ok(StatusModelDetail {
        statuses: store.list_statuses(model.id)?,
        transitions: store.list_transitions(model.id)?,
        model,
    })
}

/// Creates a non-default model for `entity_type`
pub fn create_model(
    repos: &Repos<'_>,
    entity_type: EntityType,
    name: &str,
    description: Option<String>,
) -> Result<StatusModel> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("REQUIRED", "status model name is required"));
    }
    let now = models::now();
    let model = StatusModel {
        id: Uuid::new_v4(),
        entity_type,
        name: name.to_string(),
        description,
        is_default: false,
        created_at: now,
        updated_at: now,
    };
    repos.status_models().insert_model(&model)?;
    Ok(model)
}

pub struct NewStatus {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub sort_order: i64,
    pub is_initial: bool,
    pub is_final: bool,
}

pub fn add_status(repos: &Repos<'_>, model_id: Uuid, input: NewStatus) -> Result<Status> {
    let store = repos.status_models();
    store.get_model(model_id)?;
    let name = input.name.trim();
    if name.is_empty() {
        return Err(Error::validation("REQUIRED", "status name is required"));
    }
    if input.is_initial && store.initial_status(model_id)?.is_some() {
        return Err(Error::conflict("status model already has an initial status"));
    }
    let status = Status {
        id: Uuid::new_v4(),
        status_model_id: model_id,
        name: name.to_string(),
        description: input.description,
        color: input.color,
        sort_order: input.sort_order,
        is_initial: input.is_initial,
        is_final: input.is_final,
        created_at: models::now(),
    };
    store.insert_status(&status)?;
    Ok(status)
}

/// Adds the edge `from -> to`; both must be statuses of `model_id`
pub fn add_transition(
    repos: &Repos<'_>,
    model_id: Uuid,
    from: &str,
    to: &str,
    name: Option<String>,
) -> Result<StatusTransition> {
    let store = repos.status_models();
    let model = store.get_model(model_id)?;
    let lookup = |status: &str| -> Result<Status> {
        store
            .find_status(model.id, status)?
            .ok_or_else(|| Error::not_found("status", format!("{} in model '{}'", status, model.name)))
    };
    let from = lookup(from)?;
    let to = lookup(to)?;
    if from.id == to.id {
        return Err(Error::validation("SELF_TRANSITION", "a status cannot transition to itself"));
    }
    let transition = StatusTransition {
        id: Uuid::new_v4(),
        status_model_id: model.id,
        from_status_id: from.id,
        to_status_id: to.id,
        name,
        created_at: models::now(),
    };
    store.insert_transition(&transition)?;
    Ok(transition)
}

/// Makes `model_id` the default of its entity type, clearing the previous one
pub fn set_default_model(repos: &Repos<'_>, model_id: Uuid) -> Result<StatusModel> {
    let store = repos.status_models();
    let model = store.get_model(model_id)?;
    if store.initial_status(model.id)?.is_none() {
        return Err(Error::validation(
            "NO_INITIAL_STATUS",
            "a default status model needs an initial status",
        ));
    }
    let model = store.set_default(model.id)?;
    tracing::info!(entity_type = %model.entity_type, model = %model.name, "default status model changed");
    Ok(model)
}

pub fn delete_model(repos: &Repos<'_>, model_id: Uuid) -> Result<()> {
    let store = repos.status_models();
    let model = store.get_model(model_id)?;
    if model.is_default {
        return Err(Error::conflict("the default status model cannot be deleted"));
    }
    store.delete_model(model.id)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Cancellation;
    use crate::db::seed::seed_all;
    use crate::db::test_support::test_db;

    #[test]
    fn test_requirement_transitions() {
        let t = test_db();
        let result: Result<()> = t.db.with_transaction(&Cancellation::new(), |repos| {
            seed_all(repos)?;
            let engine = StatusEngine::new(repos);
            engine.validate_transition(EntityType::Requirement, "Draft", "Active")?;

            let err = engine
                .validate_transition(EntityType::Requirement, "Draft", "Obsolete")
                .unwrap_err();
            let v = err.as_validation().unwrap();
            assert_eq!(v.code, "INVALID_STATUS_TRANSITION");
            assert_eq!(v.valid_values.as_deref(), Some(&["Active".to_string()][..]));

            let mut next = engine.allowed_transitions(EntityType::Requirement, "Active")?;
            next.sort();
            assert_eq!(next, ["Draft", "Obsolete"]);
            Ok(())
        });
        result.unwrap();
    }

    #[test]
    fn test_unknown_status_in_model() {
        let t = test_db();
        let result: Result<()> = t.db.with_transaction(&Cancellation::new(), |repos| {
            seed_all(repos)?;
            let err = StatusEngine::new(repos)
                .validate_transition(EntityType::Epic, "Draft", "Shipped")
                .unwrap_err();
            assert_eq!(err.as_validation().unwrap().code, "INVALID_STATUS");
            Ok(())
        });
        result.unwrap();
    }

    #[test]
    fn test_initial_status() {
        let t = test_db();
        let result: Result<()> = t.db.with_transaction(&Cancellation::new(), |repos| {
            seed_all(repos)?;
            let engine = StatusEngine::new(repos);
            assert_eq!(engine.initial_status(EntityType::Epic, None)?, "Backlog");
            assert_eq!(engine.initial_status(EntityType::Requirement, Some("Draft"))?, "Draft");
            let err = engine
                .initial_status(EntityType::Requirement, Some("Active"))
                .unwrap_err();
            assert_eq!(err.as_validation().unwrap().code, "INVALID_INITIAL_STATUS");
            Ok(())
        });
        result.unwrap();
    }

    #[test]
    fn test_switching_default_model() {
        let t = test_db();
        let result: Result<()> = t.db.with_transaction(&Cancellation::new(), |repos| {
            seed_all(repos)?;
            let strict = create_model(repos, EntityType::Requirement, "Strict", None)?;
            for (i, name) in ["Draft", "Active", "Obsolete"].iter().enumerate() {
                add_status(
                    repos,
                    strict.id,
                    NewStatus {
                        name: name.to_string(),
                        description: None,
                        color: None,
                        sort_order: i as i64,
                        is_initial: i == 0,
                        is_final: i == 2,
                    },
                )?;
            }
            add_transition(repos, strict.id, "Draft", "Active", None)?;

            set_default_model(repos, strict.id)?;
            let models = repos.status_models().list_models(Some(EntityType::Requirement))?;
            assert_eq!(models.iter().filter(|m| m.is_default).count(), 1);
            assert!(verify_canonical(repos)?.is_empty());

            let err = StatusEngine::new(repos)
                .validate_transition(EntityType::Requirement, "Active", "Obsolete")
                .unwrap_err();
            assert!(err.as_validation().unwrap().valid_values.as_ref().unwrap().is_empty());

            assert!(matches!(delete_model(repos, strict.id), Err(Error::Conflict { .. })));
            Ok(())
        });
        result.unwrap();
    }

    #[test]
    fn test_verify_canonical_reports_missing_models() {
        let t = test_db();
        let result: Result<()> = t.db.with_transaction(&Cancellation::new(), |repos| {
            let drift = verify_canonical(repos)?;
            assert_eq!(drift.len(), EntityType::ALL.len());
            seed_all(repos)?;
            assert!(verify_canonical(repos)?.is_empty());
            Ok(())
        });
        result.unwrap();
    }
}
