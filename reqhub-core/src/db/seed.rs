//! Default rows every fresh database needs
//!
//! Each seeder only inserts what is missing, so running them on every
//! startup is safe.

use uuid::Uuid;

use super::error::RepoResult;
use super::Repos;
use crate::models::{
    self, EntityType, RelationshipType, RequirementType, Status, StatusModel, StatusTransition,
};

/// Requirement types created on first start
pub const DEFAULT_REQUIREMENT_TYPES: &[(&str, &str)] = &[
    ("Functional", "Behaviour the system must exhibit"),
    ("Non-Functional", "Quality attributes and constraints"),
    ("Technical", "Implementation or platform constraints"),
    ("Business", "Business rules and goals"),
    ("Interface", "External interfaces and integrations"),
    ("Performance", "Throughput, latency and capacity targets"),
    ("Security", "Confidentiality, integrity and access control"),
    ("Usability", "User experience and accessibility"),
];

/// Relationship types created on first start
pub const DEFAULT_RELATIONSHIP_TYPES: &[(&str, &str)] = &[
    ("depends_on", "Source cannot be completed before target"),
    ("blocks", "Source prevents progress on target"),
    ("relates_to", "Loose association"),
    ("conflicts_with", "Source and target cannot both hold"),
    ("derives_from", "Source was derived from target"),
    ("implements", "Source realises target"),
];

/// A seeded status model: statuses (name, is_initial, is_final) and edges
struct DefaultModel {
    entity_type: EntityType,
    name: &'static str,
    statuses: &'static [(&'static str, bool, bool)],
    transitions: &'static [(&'static str, &'static str)],
}

const WORKFLOW_STATUSES: &[(&str, bool, bool)] = &[
    ("Backlog", true, false),
    ("Draft", false, false),
    ("In Progress", false, false),
    ("Done", false, true),
    ("Cancelled", false, true),
];

const WORKFLOW_TRANSITIONS: &[(&str, &str)] = &[
    ("Backlog", "Draft"),
    ("Backlog", "Cancelled"),
    ("Draft", "In Progress"),
    ("Draft", "Backlog"),
    ("Draft", "Cancelled"),
    ("In Progress", "Done"),
    ("In Progress", "Draft"),
    ("In Progress", "Cancelled"),
    ("Done", "In Progress"),
    ("Cancelled", "Backlog"),
];

const DEFAULT_MODELS: &[DefaultModel] = &[
    DefaultModel {
        entity_type: EntityType::Epic,
        name: "Default Epic Workflow",
        statuses: WORKFLOW_STATUSES,
        transitions: WORKFLOW_TRANSITIONS,
    },
    DefaultModel {
        entity_type: EntityType::UserStory,
        name: "Default User Story Workflow",
        statuses: WORKFLOW_STATUSES,
        transitions: WORKFLOW_TRANSITIONS,
    },
    DefaultModel {
        entity_type: EntityType::AcceptanceCriteria,
        name: "Default Acceptance Criteria Workflow",
        statuses: &[
            ("Draft", true, false),
            ("Verified", false, true),
            ("Rejected", false, true),
        ],
        transitions: &[
            ("Draft", "Verified"),
            ("Draft", "Rejected"),
            ("Verified", "Draft"),
            ("Rejected", "Draft"),
        ],
    },
    DefaultModel {
        entity_type: EntityType::Requirement,
        name: "Default Requirement Workflow",
        statuses: &[
            ("Draft", true, false),
            ("Active", false, false),
            ("Obsolete", false, true),
        ],
        transitions: &[
            ("Draft", "Active"),
            ("Active", "Obsolete"),
            ("Active", "Draft"),
            ("Obsolete", "Active"),
        ],
    },
];

/// What a seeding pass inserted
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub requirement_types: usize,
    pub relationship_types: usize,
    pub status_models: usize,
}

impl SeedReport {
    pub fn is_empty(&self) -> bool {
        self.requirement_types == 0 && self.relationship_types == 0 && self.status_models == 0
    }
}

/// Seeds every default that is missing
pub fn seed_all(repos: &Repos<'_>) -> RepoResult<SeedReport> {
    let report = SeedReport {
        requirement_types: seed_requirement_types(repos)?,
        relationship_types: seed_relationship_types(repos)?,
        status_models: seed_status_models(repos)?,
    };
    if !report.is_empty() {
        tracing::info!(
            requirement_types = report.requirement_types,
            relationship_types = report.relationship_types,
            status_models = report.status_models,
            "seeded defaults"
        );
    }
    Ok(report)
}

pub fn seed_requirement_types(repos: &Repos<'_>) -> RepoResult<usize> {
    let types = repos.requirement_types();
    let mut inserted = 0;
    for (name, description) in DEFAULT_REQUIREMENT_TYPES {
        if types.find_by_name(name)?.is_some() {
            continue;
        }
        let now = models::now();
        types.insert(&RequirementType {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: Some(description.to_string()),
            created_at: now,
            updated_at: now,
        })?;
        inserted += 1;
    }
    Ok(inserted)
}

pub fn seed_relationship_types(repos: &Repos<'_>) -> RepoResult<usize> {
    let types = repos.relationship_types();
    let mut inserted = 0;
    for (name, description) in DEFAULT_RELATIONSHIP_TYPES {
        if types.find_by_name(name)?.is_some() {
            continue;
        }
        let now = models::now();
        types.insert(&RelationshipType {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: Some(description.to_string()),
            created_at: now,
            updated_at: now,
        })?;
        inserted += 1;
    }
    Ok(inserted)
}

/// Creates the default model for every entity type that has none
pub fn seed_status_models(repos: &Repos<'_>) -> RepoResult<usize> {
    let store = repos.status_models();
    let mut inserted = 0;
    for spec in DEFAULT_MODELS {
        if store.default_model(spec.entity_type)?.is_some() {
            continue;
        }
        let now = models::now();
        let model = StatusModel {
            id: Uuid::new_v4(),
            entity_type: spec.entity_type,
            name: spec.name.to_string(),
            description: None,
            is_default: true,
            created_at: now,
            updated_at: now,
        };
        store.insert_model(&model)?;

        let mut ids = Vec::with_capacity(spec.statuses.len());
        for (order, (name, is_initial, is_final)) in spec.statuses.iter().enumerate() {
            let status = Status {
                id: Uuid::new_v4(),
                status_model_id: model.id,
                name: name.to_string(),
                description: None,
                color: None,
                sort_order: order as i64,
                is_initial: *is_initial,
                is_final: *is_final,
                created_at: now,
            };
            store.insert_status(&status)?;
            ids.push((*name, status.id));
        }

        let id_of = |name: &str| ids.iter().find(|(n, _)| *n == name).map(|(_, id)| *id);
        for (from, to) in spec.transitions {
            let (Some(from_status_id), Some(to_status_id)) = (id_of(from), id_of(to)) else {
                continue;
            };
            store.insert_transition(&StatusTransition {
                id: Uuid::new_v4(),
                status_model_id: model.id,
                from_status_id,
                to_status_id,
                name: None,
                created_at: now,
            })?;
        }
        inserted += 1;
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Cancellation;
    use crate::db::test_support::test_db;
    use crate::db::RepoError;

    #[test]
    fn test_seed_all_is_idempotent() {
        let t = test_db();
        let result: Result<(), RepoError> = t.db.with_transaction(&Cancellation::new(), |repos| {
            let first = seed_all(repos)?;
            assert_eq!(first.requirement_types, DEFAULT_REQUIREMENT_TYPES.len());
            assert_eq!(first.relationship_types, DEFAULT_RELATIONSHIP_TYPES.len());
            assert_eq!(first.status_models, EntityType::ALL.len());

            let second = seed_all(repos)?;
            assert!(second.is_empty());
            Ok(())
        });
        result.unwrap();
    }

    #[test]
    fn test_seeded_requirement_model_has_expected_edges() {
        let t = test_db();
        let result: Result<(), RepoError> = t.db.with_transaction(&Cancellation::new(), |repos| {
            seed_all(repos)?;
            let store = repos.status_models();
            let model = store.default_model(EntityType::Requirement)?.unwrap();
            let draft = store.find_status(model.id, "Draft")?.unwrap();
            assert!(draft.is_initial);
            let targets: Vec<String> = store
                .targets_from(model.id, draft.id)?
                .into_iter()
                .map(|s| s.name)
                .collect();
            assert_eq!(targets, ["Active"]);
            assert_eq!(store.initial_status(model.id)?.unwrap().name, "Draft");
            Ok(())
        });
        result.unwrap();
    }
}
