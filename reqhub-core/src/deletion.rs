//! Dependency-aware deletion of planning entities
//!
//! [`validate_deletion`] lists the direct dependents of a root entity.
//! [`delete`] either refuses when any exist or, when forced, sweeps the
//! whole subtree. It runs inside the caller's transaction, so a failure
//! at any step leaves nothing deleted.
//!
//! Sweep order: relationships, comments, requirements, acceptance
//! criteria, user stories, epic.

use serde::Serialize;
use uuid::Uuid;

use crate::db::{Referenced, Repos};
use crate::error::{Error, Result};
use crate::models::{AcceptanceCriteria, EntityType, Requirement, RequirementRelationship, UserStory};

/// A dependent entity as shown in a report
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DependentRef {
    pub id: Uuid,
    pub reference_id: String,
    pub title: String,
}

impl DependentRef {
    fn story(s: &UserStory) -> Self {
        Self {
            id: s.id,
            reference_id: s.reference_id().to_string(),
            title: s.title.clone(),
        }
    }

    fn requirement(r: &Requirement) -> Self {
        Self {
            id: r.id,
            reference_id: r.reference_id().to_string(),
            title: r.title.clone(),
        }
    }

    fn criteria(ac: &AcceptanceCriteria) -> Self {
        Self {
            id: ac.id,
            reference_id: ac.reference_id().to_string(),
            title: ac.description.chars().take(80).collect(),
        }
    }
}

/// A relationship edge as shown in a report
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RelationshipRef {
    pub id: Uuid,
    pub source_requirement_id: Uuid,
    pub target_requirement_id: Uuid,
    pub relationship_type_id: Uuid,
}

impl From<&RequirementRelationship> for RelationshipRef {
    fn from(r: &RequirementRelationship) -> Self {
        Self {
            id: r.id,
            source_requirement_id: r.source_requirement_id,
            target_requirement_id: r.target_requirement_id,
            relationship_type_id: r.relationship_type_id,
        }
    }
}

/// Direct dependents of a deletion root, grouped by kind
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DependencyReport {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub reference_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub user_stories: Vec<DependentRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub acceptance_criteria: Vec<DependentRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<DependentRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<RelationshipRef>,
}

impl DependencyReport {
    fn empty(entity_type: EntityType, entity_id: Uuid, reference_id: &str) -> Self {
        Self {
            entity_type,
            entity_id,
            reference_id: reference_id.to_string(),
            user_stories: Vec::new(),
            acceptance_criteria: Vec::new(),
            requirements: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn has_dependents(&self) -> bool {
        !(self.user_stories.is_empty()
            && self.acceptance_criteria.is_empty()
            && self.requirements.is_empty()
            && self.relationships.is_empty())
    }
}

/// Rows removed per kind; zero counts are omitted when serialized
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct DeletedCounts {
    #[serde(skip_serializing_if = "is_zero")]
    pub epics: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub user_stories: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub acceptance_criteria: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub requirements: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub relationships: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub comments: u64,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl DeletedCounts {
    pub fn total(&self) -> u64 {
        self.epics
            + self.user_stories
            + self.acceptance_criteria
            + self.requirements
            + self.relationships
            + self.comments
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DeletionResult {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub reference_id: String,
    pub deleted: DeletedCounts,
}

/// Enumerates the direct dependents of `id`
pub fn validate_deletion(repos: &Repos<'_>, entity_type: EntityType, id: Uuid) -> Result<DependencyReport> {
    match entity_type {
        EntityType::Epic => {
            let epic = repos.epics().get_by_id(id)?;
            let mut report = DependencyReport::empty(entity_type, epic.id, epic.reference_id());
            report.user_stories = repos
                .user_stories()
                .list_by_epic(epic.id)?
                .iter()
                .map(DependentRef::story)
                .collect();
            Ok(report)
        }
        EntityType::UserStory => {
            let story = repos.user_stories().get_by_id(id)?;
            let mut report = DependencyReport::empty(entity_type, story.id, story.reference_id());
            report.acceptance_criteria = repos
                .acceptance_criteria()
                .list_by_user_story(story.id)?
                .iter()
                .map(DependentRef::criteria)
                .collect();
            let requirements = repos.requirements().list_by_user_story(story.id)?;
            let requirement_ids: Vec<Uuid> = requirements.iter().map(|r| r.id).collect();
            report.requirements = requirements.iter().map(DependentRef::requirement).collect();
            report.relationships = repos
                .relationships()
                .list_touching(&requirement_ids)?
                .iter()
                .map(RelationshipRef::from)
                .collect();
            Ok(report)
        }
        EntityType::AcceptanceCriteria => {
            let ac = repos.acceptance_criteria().get_by_id(id)?;
            let mut report = DependencyReport::empty(entity_type, ac.id, ac.reference_id());
            report.requirements = repos
                .requirements()
                .list_by_acceptance_criteria(ac.id)?
                .iter()
                .map(DependentRef::requirement)
                .collect();
            Ok(report)
        }
        EntityType::Requirement => {
            let requirement = repos.requirements().get_by_id(id)?;
            let mut report =
                DependencyReport::empty(entity_type, requirement.id, requirement.reference_id());
            report.relationships = repos
                .relationships()
                .list_touching(&[requirement.id])?
                .iter()
                .map(RelationshipRef::from)
                .collect();
            Ok(report)
        }
    }
}

/// The entities a forced delete of a root removes
#[derive(Default)]
struct Subtree {
    epics: Vec<Uuid>,
    user_stories: Vec<Uuid>,
    acceptance_criteria: Vec<Uuid>,
    requirements: Vec<Uuid>,
}

fn collect_subtree(repos: &Repos<'_>, entity_type: EntityType, id: Uuid) -> Result<Subtree> {
    let mut tree = Subtree::default();
    match entity_type {
        EntityType::Epic => {
            tree.epics.push(id);
            tree.user_stories = repos.user_stories().ids_by_epic(id)?;
        }
        EntityType::UserStory => tree.user_stories.push(id),
        EntityType::AcceptanceCriteria => tree.acceptance_criteria.push(id),
        EntityType::Requirement => tree.requirements.push(id),
    }
    for story_id in &tree.user_stories {
        tree.acceptance_criteria.extend(
            repos
                .acceptance_criteria()
                .list_by_user_story(*story_id)?
                .into_iter()
                .map(|ac| ac.id),
        );
    }
    tree.requirements
        .extend(repos.requirements().ids_by_user_stories(&tree.user_stories)?);
    Ok(tree)
}

/// Deletes `id`; refuses with a Conflict when dependents exist and `force` is off
pub fn delete(repos: &Repos<'_>, entity_type: EntityType, id: Uuid, force: bool) -> Result<DeletionResult> {
    let report = validate_deletion(repos, entity_type, id)?;
    if report.has_dependents() && !force {
        return Err(Error::Conflict {
            message: format!(
                "{} {} has dependents; delete with force to remove them",
                entity_type, report.reference_id
            ),
            details: serde_json::to_value(&report).ok(),
        });
    }

    let tree = collect_subtree(repos, entity_type, id)?;
    let mut deleted = DeletedCounts::default();

    deleted.relationships = repos.relationships().delete_touching(&tree.requirements)?;

    let comments = repos.comments();
    deleted.comments += comments.delete_for_entities(EntityType::Epic, &tree.epics)?;
    deleted.comments += comments.delete_for_entities(EntityType::UserStory, &tree.user_stories)?;
    deleted.comments +=
        comments.delete_for_entities(EntityType::AcceptanceCriteria, &tree.acceptance_criteria)?;
    deleted.comments += comments.delete_for_entities(EntityType::Requirement, &tree.requirements)?;

    for req_id in &tree.requirements {
        repos.requirements().delete(*req_id)?;
        deleted.requirements += 1;
    }
    for ac_id in &tree.acceptance_criteria {
        repos.acceptance_criteria().delete(*ac_id)?;
        deleted.acceptance_criteria += 1;
    }
    for story_id in &tree.user_stories {
        repos.user_stories().delete(*story_id)?;
        deleted.user_stories += 1;
    }
    for epic_id in &tree.epics {
        repos.epics().delete(*epic_id)?;
        deleted.epics += 1;
    }

    if force && report.has_dependents() {
        tracing::info!(
            %entity_type,
            reference_id = %report.reference_id,
            total = deleted.total(),
            "forced delete"
        );
    }

    Ok(DeletionResult {
        entity_type,
        entity_id: report.entity_id,
        reference_id: report.reference_id,
        deleted,
    })
}
