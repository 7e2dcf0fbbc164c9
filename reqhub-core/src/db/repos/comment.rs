use rusqlite::types::Value;
use rusqlite::{params, Row};
use uuid::Uuid;

use super::get_entity_type;
use crate::db::error::RepoResult;
use crate::db::repository::Repository;
use crate::db::traits::{get_opt_uuid, get_ts, get_uuid, opt_uuid_value, ts_value, uuid_value, Entity};
use crate::models::{Comment, EntityType, InlineAnchor};

impl Entity for Comment {
    const TABLE: &'static str = "comments";
    const NAME: &'static str = "comment";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "entity_type",
        "entity_id",
        "author_id",
        "parent_comment_id",
        "content",
        "is_resolved",
        "linked_text",
        "text_position_start",
        "text_position_end",
        "created_at",
        "updated_at",
    ];
    const FILTER_COLUMNS: &'static [&'static str] = &[
        "entity_type",
        "entity_id",
        "author_id",
        "parent_comment_id",
        "is_resolved",
    ];
    const IMMUTABLE_COLUMNS: &'static [&'static str] = &[
        "id",
        "entity_type",
        "entity_id",
        "author_id",
        "parent_comment_id",
        "created_at",
    ];

    fn id(&self) -> Uuid {
        self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let linked_text: Option<String> = row.get(7)?;
        let start: Option<i64> = row.get(8)?;
        let end: Option<i64> = row.get(9)?;
        let anchor = match (linked_text, start, end) {
            (Some(linked_text), Some(text_position_start), Some(text_position_end)) => {
                Some(InlineAnchor {
                    linked_text,
                    text_position_start,
                    text_position_end,
                })
            }
            _ => None,
        };
        Ok(Self {
            id: get_uuid(row, 0)?,
            entity_type: get_entity_type(row, 1)?,
            entity_id: get_uuid(row, 2)?,
            author_id: get_uuid(row, 3)?,
            parent_comment_id: get_opt_uuid(row, 4)?,
            content: row.get(5)?,
            is_resolved: row.get(6)?,
            anchor,
            created_at: get_ts(row, 10)?,
            updated_at: get_ts(row, 11)?,
        })
    }

    fn values(&self) -> Vec<Value> {
        let (linked_text, start, end) = match &self.anchor {
            Some(a) => (
                Value::Text(a.linked_text.clone()),
                Value::Integer(a.text_position_start),
                Value::Integer(a.text_position_end),
            ),
            None => (Value::Null, Value::Null, Value::Null),
        };
        vec![
            uuid_value(self.id),
            Value::Text(self.entity_type.as_str().to_string()),
            uuid_value(self.entity_id),
            uuid_value(self.author_id),
            opt_uuid_value(self.parent_comment_id),
            Value::Text(self.content.clone()),
            Value::Integer(i64::from(self.is_resolved)),
            linked_text,
            start,
            end,
            ts_value(&self.created_at),
            ts_value(&self.updated_at),
        ]
    }
}

impl<'c> Repository<'c, Comment> {
    /// Every comment on an entity, roots and replies, oldest first
    pub fn list_for_entity(&self, entity_type: EntityType, entity_id: Uuid) -> RepoResult<Vec<Comment>> {
        self.select(
            "WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY created_at ASC, rowid ASC",
            params![entity_type.as_str(), uuid_value(entity_id)],
        )
    }

    pub fn list_roots(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> RepoResult<Vec<Comment>> {
        self.select(
            "WHERE entity_type = ?1 AND entity_id = ?2 AND parent_comment_id IS NULL
             ORDER BY created_at ASC, rowid ASC LIMIT ?3 OFFSET ?4",
            params![entity_type.as_str(), uuid_value(entity_id), limit, offset],
        )
    }

    pub fn list_replies(&self, parent_id: Uuid, limit: u32, offset: u32) -> RepoResult<Vec<Comment>> {
        self.select(
            "WHERE parent_comment_id = ?1 ORDER BY created_at ASC, rowid ASC LIMIT ?2 OFFSET ?3",
            params![uuid_value(parent_id), limit, offset],
        )
    }

    pub fn list_inline(&self, entity_type: EntityType, entity_id: Uuid) -> RepoResult<Vec<Comment>> {
        self.select(
            "WHERE entity_type = ?1 AND entity_id = ?2 AND linked_text IS NOT NULL
             ORDER BY created_at ASC, rowid ASC",
            params![entity_type.as_str(), uuid_value(entity_id)],
        )
    }

    pub fn count_for_entities(&self, entity_type: EntityType, ids: &[Uuid]) -> RepoResult<u64> {
        let mut stmt = self
            .conn()
            .prepare_cached("SELECT COUNT(*) FROM comments WHERE entity_type = ?1 AND entity_id = ?2")?;
        let mut total = 0u64;
        for id in ids {
            let n: i64 = stmt.query_row(params![entity_type.as_str(), uuid_value(*id)], |row| row.get(0))?;
            total += n.max(0) as u64;
        }
        Ok(total)
    }

    /// Deletes all comments on the given entities, returning how many went
    pub fn delete_for_entities(&self, entity_type: EntityType, ids: &[Uuid]) -> RepoResult<u64> {
        // Counted up front: replies removed by the parent cascade do not
        // show up in the statement's change count.
        let total = self.count_for_entities(entity_type, ids)?;
        let mut stmt = self
            .conn()
            .prepare_cached("DELETE FROM comments WHERE entity_type = ?1 AND entity_id = ?2")?;
        for id in ids {
            stmt.execute(params![entity_type.as_str(), uuid_value(*id)])?;
        }
        Ok(total)
    }
}
