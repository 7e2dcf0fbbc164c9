use rusqlite::types::Value;
use rusqlite::{params, Row};
use serde::Serialize;
use uuid::Uuid;

use crate::db::error::RepoResult;
use crate::db::repository::Repository;
use crate::db::traits::{get_ts, get_uuid, ts_value, uuid_value, Entity};
use crate::models::RequirementRelationship;

impl Entity for RequirementRelationship {
    const TABLE: &'static str = "requirement_relationships";
    const NAME: &'static str = "relationship";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "source_requirement_id",
        "target_requirement_id",
        "relationship_type_id",
        "created_by",
        "created_at",
    ];
    const FILTER_COLUMNS: &'static [&'static str] = &[
        "source_requirement_id",
        "target_requirement_id",
        "relationship_type_id",
        "created_by",
    ];

    fn id(&self) -> Uuid {
        self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: get_uuid(row, 0)?,
            source_requirement_id: get_uuid(row, 1)?,
            target_requirement_id: get_uuid(row, 2)?,
            relationship_type_id: get_uuid(row, 3)?,
            created_by: get_uuid(row, 4)?,
            created_at: get_ts(row, 5)?,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            uuid_value(self.id),
            uuid_value(self.source_requirement_id),
            uuid_value(self.target_requirement_id),
            uuid_value(self.relationship_type_id),
            uuid_value(self.created_by),
            ts_value(&self.created_at),
        ]
    }
}

/// A relationship seen from one of its endpoints
#[derive(Debug, Clone, Serialize)]
pub struct RelationshipView {
    #[serde(flatten)]
    pub relationship: RequirementRelationship,
    pub relationship_type: String,
    /// `outbound` when the viewed requirement is the source
    pub direction: &'static str,
}

impl<'c> Repository<'c, RequirementRelationship> {
    pub fn find_triple(
        &self,
        source: Uuid,
        target: Uuid,
        relationship_type_id: Uuid,
    ) -> RepoResult<Option<RequirementRelationship>> {
        self.select_one(
            "WHERE source_requirement_id = ?1 AND target_requirement_id = ?2
               AND relationship_type_id = ?3",
            params![uuid_value(source), uuid_value(target), uuid_value(relationship_type_id)],
        )
    }

    /// Inbound and outbound edges of a requirement
    pub fn list_for_requirement(&self, requirement_id: Uuid) -> RepoResult<Vec<RelationshipView>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT r.id, r.source_requirement_id, r.target_requirement_id, r.relationship_type_id,
                    r.created_by, r.created_at, t.name
               FROM requirement_relationships r
               JOIN relationship_types t ON t.id = r.relationship_type_id
              WHERE r.source_requirement_id = ?1 OR r.target_requirement_id = ?1
              ORDER BY r.created_at ASC, r.rowid ASC",
        )?;
        let rows = stmt.query_map(params![uuid_value(requirement_id)], |row| {
            let relationship = RequirementRelationship::from_row(row)?;
            let relationship_type: String = row.get(6)?;
            Ok((relationship, relationship_type))
        })?;

        let mut views = Vec::new();
        for row in rows {
            let (relationship, relationship_type) = row?;
            let direction = if relationship.source_requirement_id == requirement_id {
                "outbound"
            } else {
                "inbound"
            };
            views.push(RelationshipView {
                relationship,
                relationship_type,
                direction,
            });
        }
        Ok(views)
    }

    /// Every edge touching any of `requirement_ids`, each listed once
    pub fn list_touching(&self, requirement_ids: &[Uuid]) -> RepoResult<Vec<RequirementRelationship>> {
        let mut seen = std::collections::HashSet::new();
        let mut edges = Vec::new();
        for id in requirement_ids {
            let found = self.select(
                "WHERE source_requirement_id = ?1 OR target_requirement_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
                params![uuid_value(*id)],
            )?;
            for edge in found {
                if seen.insert(edge.id) {
                    edges.push(edge);
                }
            }
        }
        Ok(edges)
    }

    /// Deletes every edge touching `requirement_ids`, returning the count
    pub fn delete_touching(&self, requirement_ids: &[Uuid]) -> RepoResult<u64> {
        let mut deleted = 0u64;
        let mut stmt = self.conn().prepare_cached(
            "DELETE FROM requirement_relationships
              WHERE source_requirement_id = ?1 OR target_requirement_id = ?1",
        )?;
        for id in requirement_ids {
            deleted += stmt.execute(params![uuid_value(*id)])? as u64;
        }
        Ok(deleted)
    }
}
