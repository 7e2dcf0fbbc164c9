use rusqlite::types::Value;
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::db::error::RepoResult;
use crate::db::repository::Repository;
use crate::db::traits::{
    get_reference, get_ts, get_uuid, opt_text_value, reference_value, timestamp, ts_value,
    uuid_value, Entity, Referenced,
};
use crate::models::{ReferencePrefix, SteeringDocument};

impl Entity for SteeringDocument {
    const TABLE: &'static str = "steering_documents";
    const NAME: &'static str = "steering document";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "reference_id",
        "title",
        "description",
        "creator_id",
        "created_at",
        "updated_at",
    ];
    const FILTER_COLUMNS: &'static [&'static str] = &["creator_id"];
    const ORDER_COLUMNS: &'static [&'static str] =
        &["created_at", "updated_at", "title", "reference_id"];
    const IMMUTABLE_COLUMNS: &'static [&'static str] =
        &["id", "reference_id", "creator_id", "created_at"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: get_uuid(row, 0)?,
            reference_id: get_reference(row, 1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            creator_id: get_uuid(row, 4)?,
            created_at: get_ts(row, 5)?,
            updated_at: get_ts(row, 6)?,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            uuid_value(self.id),
            reference_value(&self.reference_id),
            Value::Text(self.title.clone()),
            opt_text_value(&self.description),
            uuid_value(self.creator_id),
            ts_value(&self.created_at),
            ts_value(&self.updated_at),
        ]
    }
}

impl Referenced for SteeringDocument {
    const PREFIX: ReferencePrefix = ReferencePrefix::SteeringDocument;

    fn reference_id(&self) -> &str {
        &self.reference_id
    }

    fn set_reference_id(&mut self, reference_id: String) {
        self.reference_id = reference_id;
    }
}

impl<'c> Repository<'c, SteeringDocument> {
    /// Documents linked to an epic, in link order
    pub fn list_for_epic(&self, epic_id: Uuid) -> RepoResult<Vec<SteeringDocument>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT d.id, d.reference_id, d.title, d.description, d.creator_id, d.created_at, d.updated_at
               FROM steering_documents d
               JOIN epic_steering_documents l ON l.steering_document_id = d.id
              WHERE l.epic_id = ?1
              ORDER BY d.created_at ASC, d.rowid ASC",
        )?;
        let rows = stmt.query_map(params![uuid_value(epic_id)], SteeringDocument::from_row)?;
        let mut docs = Vec::new();
        for row in rows {
            docs.push(row?);
        }
        Ok(docs)
    }

    pub fn is_linked(&self, epic_id: Uuid, document_id: Uuid) -> RepoResult<bool> {
        Ok(self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM epic_steering_documents
                            WHERE epic_id = ?1 AND steering_document_id = ?2)",
            params![uuid_value(epic_id), uuid_value(document_id)],
            |row| row.get(0),
        )?)
    }

    /// Inserts the join row; a repeated pair surfaces as `DuplicateKey`
    pub fn link(&self, epic_id: Uuid, document_id: Uuid) -> RepoResult<()> {
        self.conn()
            .prepare_cached(
                "INSERT INTO epic_steering_documents (epic_id, steering_document_id, created_at)
                 VALUES (?1, ?2, ?3)",
            )?
            .execute(params![
                uuid_value(epic_id),
                uuid_value(document_id),
                timestamp(&crate::models::now())
            ])?;
        Ok(())
    }

    /// Removes the join row, returning whether one existed
    pub fn unlink(&self, epic_id: Uuid, document_id: Uuid) -> RepoResult<bool> {
        let removed = self
            .conn()
            .prepare_cached(
                "DELETE FROM epic_steering_documents WHERE epic_id = ?1 AND steering_document_id = ?2",
            )?
            .execute(params![uuid_value(epic_id), uuid_value(document_id)])?;
        Ok(removed > 0)
    }
}
