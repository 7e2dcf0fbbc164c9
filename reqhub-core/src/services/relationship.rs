use serde::Deserialize;
use uuid::Uuid;

use super::resolve;
use crate::auth::{require, Capability};
use crate::context::RequestContext;
use crate::db::{Database, Repos};
use crate::error::{Error, Result, ValidationError};
use crate::models::{self, RelationshipType, Requirement, RequirementRelationship};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRelationship {
    /// UUID or `REQ-n`
    pub source_requirement_id: String,
    /// UUID or `REQ-n`
    pub target_requirement_id: String,
    /// Relationship type UUID or name (`depends_on`, `blocks`, ...)
    #[serde(alias = "relationship_type")]
    pub relationship_type_id: String,
}

/// Finds a relationship type by UUID or case-insensitive name
pub(crate) fn resolve_relationship_type(repos: &Repos<'_>, input: &str) -> Result<RelationshipType> {
    let input = input.trim();
    let found = match Uuid::parse_str(input) {
        Ok(id) => repos.relationship_types().find_by_id(id)?,
        Err(_) => repos.relationship_types().find_by_name(input)?,
    };
    match found {
        Some(found) => Ok(found),
        None => {
            let names: Vec<String> = repos
                .relationship_types()
                .select("ORDER BY name ASC", [])?
                .into_iter()
                .map(|t| t.name)
                .collect();
            Err(ValidationError::new(
                "INVALID_RELATIONSHIP_TYPE",
                format!("unknown relationship type '{}'", input),
            )
            .field("relationship_type_id")
            .valid_values(names)
            .into())
        }
    }
}

pub struct RelationshipService<'a> {
    db: &'a Database,
}

impl<'a> RelationshipService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Creates a directed edge; self-loops and duplicate triples conflict
    pub fn create(&self, ctx: &RequestContext, input: CreateRelationship) -> Result<RequirementRelationship> {
        require(&ctx.caller, Capability::WriteDomain)?;
        let relationship = self.db.with_transaction(&ctx.cancel, |repos| {
            let source: Requirement = resolve(repos, "source_requirement_id", &input.source_requirement_id)?;
            let target: Requirement = resolve(repos, "target_requirement_id", &input.target_requirement_id)?;
            if source.id == target.id {
                return Err(Error::conflict(format!(
                    "{} cannot be related to itself",
                    source.reference_id
                )));
            }
            let kind = resolve_relationship_type(repos, &input.relationship_type_id)?;
            let relationships = repos.relationships();
            if relationships.find_triple(source.id, target.id, kind.id)?.is_some() {
                return Err(Error::conflict(format!(
                    "{} already {} {}",
                    source.reference_id, kind.name, target.reference_id
                )));
            }
            let relationship = RequirementRelationship {
                id: Uuid::new_v4(),
                source_requirement_id: source.id,
                target_requirement_id: target.id,
                relationship_type_id: kind.id,
                created_by: ctx.user_id(),
                created_at: models::now(),
            };
            match relationships.create(&relationship) {
                Ok(created) => Ok(created),
                // Lost a race with an identical insert
                Err(err) if err.is_duplicate_of("relationship_type_id") => Err(Error::conflict(format!(
                    "{} already {} {}",
                    source.reference_id, kind.name, target.reference_id
                ))),
                Err(err) => Err(err.into()),
            }
        })?;
        tracing::debug!(id = %relationship.id, "relationship created");
        Ok(relationship)
    }

    pub fn get(&self, ctx: &RequestContext, id: Uuid) -> Result<RequirementRelationship> {
        require(&ctx.caller, Capability::Read)?;
        self.db
            .with_read(&ctx.cancel, |repos| Ok(repos.relationships().get_by_id(id)?))
    }

    pub fn delete(&self, ctx: &RequestContext, id: Uuid) -> Result<()> {
        require(&ctx.caller, Capability::WriteDomain)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let relationships = repos.relationships();
            relationships.get_by_id(id)?;
            Ok(relationships.delete(id)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::epic::{CreateEpic, EpicService};
    use crate::services::requirement::{CreateRequirement, RequirementService};
    use crate::services::test_support::{fixture, Fixture};
    use crate::services::user_story::{CreateUserStory, UserStoryService};

    fn with_requirements(f: &Fixture, n: usize) {
        let ctx = f.user_ctx();
        EpicService::new(&f.t.db)
            .create(&ctx, CreateEpic { title: "Auth".into(), ..CreateEpic::default() })
            .unwrap();
        UserStoryService::new(&f.t.db)
            .create(&ctx, CreateUserStory { epic_id: "EP-1".into(), title: "Login".into(), ..CreateUserStory::default() })
            .unwrap();
        for i in 0..n {
            RequirementService::new(&f.t.db)
                .create(
                    &ctx,
                    CreateRequirement {
                        user_story_id: "US-1".into(),
                        type_id: "Functional".into(),
                        title: format!("R{i}"),
                        ..CreateRequirement::default()
                    },
                )
                .unwrap();
        }
    }

    fn edge(source: &str, target: &str, kind: &str) -> CreateRelationship {
        CreateRelationship {
            source_requirement_id: source.into(),
            target_requirement_id: target.into(),
            relationship_type_id: kind.into(),
        }
    }

    #[test]
    fn test_relationship_rules() {
        let f = fixture();
        with_requirements(&f, 2);
        let ctx = f.user_ctx();
        let service = RelationshipService::new(&f.t.db);

        let created = service.create(&ctx, edge("REQ-1", "REQ-2", "depends_on")).unwrap();
        assert_eq!(created.created_by, f.user.id);

        assert!(matches!(
            service.create(&ctx, edge("REQ-1", "req-1", "blocks")),
            Err(Error::Conflict { .. })
        ));
        assert!(matches!(
            service.create(&ctx, edge("REQ-1", "REQ-2", "Depends_On")),
            Err(Error::Conflict { .. })
        ));
        assert!(matches!(
            service.create(&ctx, edge("REQ-1", "REQ-9", "blocks")),
            Err(Error::NotFound(_))
        ));
        // Same endpoints, different type
        service.create(&ctx, edge("REQ-1", "REQ-2", "blocks")).unwrap();
        // Reverse direction is a different edge
        service.create(&ctx, edge("REQ-2", "REQ-1", "depends_on")).unwrap();
    }

    #[test]
    fn test_list_directions_and_delete() {
        let f = fixture();
        with_requirements(&f, 3);
        let ctx = f.user_ctx();
        let service = RelationshipService::new(&f.t.db);
        let out = service.create(&ctx, edge("REQ-1", "REQ-2", "relates_to")).unwrap();
        service.create(&ctx, edge("REQ-3", "REQ-1", "blocks")).unwrap();

        let views = RequirementService::new(&f.t.db).list_relationships(&ctx, "REQ-1").unwrap();
        let directions: Vec<_> = views.iter().map(|v| (v.direction, v.relationship_type.as_str())).collect();
        assert_eq!(directions, vec![("outbound", "relates_to"), ("inbound", "blocks")]);

        service.delete(&ctx, out.id).unwrap();
        assert!(matches!(service.delete(&ctx, out.id), Err(Error::NotFound(_))));
        assert_eq!(
            RequirementService::new(&f.t.db).list_relationships(&ctx, "REQ-1").unwrap().len(),
            1
        );
    }

    #[test]
    fn test_unknown_type() {
        let f = fixture();
        with_requirements(&f, 2);
        let err = RelationshipService::new(&f.t.db)
            .create(&f.user_ctx(), edge("REQ-1", "REQ-2", "loves"))
            .unwrap_err();
        assert_eq!(err.as_validation().unwrap().code, "INVALID_RELATIONSHIP_TYPE");
    }
}
