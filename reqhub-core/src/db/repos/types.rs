use rusqlite::types::Value;
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::db::error::RepoResult;
use crate::db::repository::Repository;
use crate::db::traits::{get_ts, get_uuid, opt_text_value, ts_value, uuid_value, Entity};
use crate::models::{RelationshipType, RequirementType};

const TYPE_COLUMNS: &[&str] = &["id", "name", "description", "created_at", "updated_at"];

impl Entity for RequirementType {
    const TABLE: &'static str = "requirement_types";
    const NAME: &'static str = "requirement type";
    const COLUMNS: &'static [&'static str] = TYPE_COLUMNS;
    const FILTER_COLUMNS: &'static [&'static str] = &["name"];
    const ORDER_COLUMNS: &'static [&'static str] = &["created_at", "name"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: get_uuid(row, 0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            created_at: get_ts(row, 3)?,
            updated_at: get_ts(row, 4)?,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            uuid_value(self.id),
            Value::Text(self.name.clone()),
            opt_text_value(&self.description),
            ts_value(&self.created_at),
            ts_value(&self.updated_at),
        ]
    }
}

impl Entity for RelationshipType {
    const TABLE: &'static str = "relationship_types";
    const NAME: &'static str = "relationship type";
    const COLUMNS: &'static [&'static str] = TYPE_COLUMNS;
    const FILTER_COLUMNS: &'static [&'static str] = &["name"];
    const ORDER_COLUMNS: &'static [&'static str] = &["created_at", "name"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: get_uuid(row, 0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            created_at: get_ts(row, 3)?,
            updated_at: get_ts(row, 4)?,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            uuid_value(self.id),
            Value::Text(self.name.clone()),
            opt_text_value(&self.description),
            ts_value(&self.created_at),
            ts_value(&self.updated_at),
        ]
    }
}

impl<'c> Repository<'c, RequirementType> {
    /// Case-insensitive name lookup
    pub fn find_by_name(&self, name: &str) -> RepoResult<Option<RequirementType>> {
        let tail = format!("WHERE {}", self.dialect().case_insensitive_eq("name", "?1"));
        self.select_one(&tail, params![name])
    }

    pub fn is_in_use(&self, id: Uuid) -> RepoResult<bool> {
        Ok(self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM requirements WHERE type_id = ?1)",
            params![uuid_value(id)],
            |row| row.get(0),
        )?)
    }
}

impl<'c> Repository<'c, RelationshipType> {
    /// Case-insensitive name lookup
    pub fn find_by_name(&self, name: &str) -> RepoResult<Option<RelationshipType>> {
        let tail = format!("WHERE {}", self.dialect().case_insensitive_eq("name", "?1"));
        self.select_one(&tail, params![name])
    }

    pub fn is_in_use(&self, id: Uuid) -> RepoResult<bool> {
        Ok(self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM requirement_relationships WHERE relationship_type_id = ?1)",
            params![uuid_value(id)],
            |row| row.get(0),
        )?)
    }
}
