use rusqlite::types::Value;
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::db::error::RepoResult;
use crate::db::repository::Repository;
use crate::db::traits::{
    get_reference, get_ts, get_uuid, opt_text_value, reference_value, timestamp, ts_value,
    uuid_value, Entity, Referenced,
};
use crate::models::{Prompt, ReferencePrefix};

impl Entity for Prompt {
    const TABLE: &'static str = "prompts";
    const NAME: &'static str = "prompt";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "reference_id",
        "name",
        "title",
        "description",
        "content",
        "creator_id",
        "is_active",
        "created_at",
        "updated_at",
    ];
    const FILTER_COLUMNS: &'static [&'static str] = &["name", "creator_id", "is_active"];
    const ORDER_COLUMNS: &'static [&'static str] =
        &["created_at", "updated_at", "name", "title", "reference_id"];
    const IMMUTABLE_COLUMNS: &'static [&'static str] =
        &["id", "reference_id", "creator_id", "is_active", "created_at"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: get_uuid(row, 0)?,
            reference_id: get_reference(row, 1)?,
            name: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            content: row.get(5)?,
            creator_id: get_uuid(row, 6)?,
            is_active: row.get(7)?,
            created_at: get_ts(row, 8)?,
            updated_at: get_ts(row, 9)?,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            uuid_value(self.id),
            reference_value(&self.reference_id),
            Value::Text(self.name.clone()),
            Value::Text(self.title.clone()),
            opt_text_value(&self.description),
            Value::Text(self.content.clone()),
            uuid_value(self.creator_id),
            Value::Integer(i64::from(self.is_active)),
            ts_value(&self.created_at),
            ts_value(&self.updated_at),
        ]
    }
}

impl Referenced for Prompt {
    const PREFIX: ReferencePrefix = ReferencePrefix::Prompt;

    fn reference_id(&self) -> &str {
        &self.reference_id
    }

    fn set_reference_id(&mut self, reference_id: String) {
        self.reference_id = reference_id;
    }
}

impl<'c> Repository<'c, Prompt> {
    pub fn find_by_name(&self, name: &str) -> RepoResult<Option<Prompt>> {
        self.select_one("WHERE name = ?1", params![name])
    }

    pub fn find_active(&self) -> RepoResult<Option<Prompt>> {
        self.select_one("WHERE is_active = 1", [])
    }

    /// Clears every active flag, then sets it on `id`
    ///
    /// Must run inside a transaction; the partial unique index rejects a
    /// second active row if the order is reversed.
    pub fn activate(&self, id: Uuid) -> RepoResult<()> {
        let now = timestamp(&crate::models::now());
        self.conn().execute(
            "UPDATE prompts SET is_active = 0, updated_at = ?1 WHERE is_active = 1 AND id <> ?2",
            params![now, uuid_value(id)],
        )?;
        let changed = self.conn().execute(
            "UPDATE prompts SET is_active = 1, updated_at = ?1 WHERE id = ?2",
            params![now, uuid_value(id)],
        )?;
        if changed == 0 {
            return Err(crate::db::RepoError::not_found(Prompt::NAME, id));
        }
        Ok(())
    }
}
