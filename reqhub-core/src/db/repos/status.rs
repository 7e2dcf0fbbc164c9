//! Status models, their statuses and transitions

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::get_entity_type;
use crate::db::error::{RepoError, RepoResult};
use crate::db::traits::{get_ts, get_uuid, timestamp, uuid_value};
use crate::models::{EntityType, Status, StatusModel, StatusTransition};

const MODEL_COLUMNS: &str = "id, entity_type, name, description, is_default, created_at, updated_at";
const STATUS_COLUMNS: &str =
    "id, status_model_id, name, description, color, sort_order, is_initial, is_final, created_at";
const TRANSITION_COLUMNS: &str = "id, status_model_id, from_status_id, to_status_id, name, created_at";

fn model_from_row(row: &Row<'_>) -> rusqlite::Result<StatusModel> {
    Ok(StatusModel {
        id: get_uuid(row, 0)?,
        entity_type: get_entity_type(row, 1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        is_default: row.get(4)?,
        created_at: get_ts(row, 5)?,
        updated_at: get_ts(row, 6)?,
    })
}

fn status_from_row(row: &Row<'_>) -> rusqlite::Result<Status> {
    Ok(Status {
        id: get_uuid(row, 0)?,
        status_model_id: get_uuid(row, 1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        color: row.get(4)?,
        sort_order: row.get(5)?,
        is_initial: row.get(6)?,
        is_final: row.get(7)?,
        created_at: get_ts(row, 8)?,
    })
}

fn transition_from_row(row: &Row<'_>) -> rusqlite::Result<StatusTransition> {
    Ok(StatusTransition {
        id: get_uuid(row, 0)?,
        status_model_id: get_uuid(row, 1)?,
        from_status_id: get_uuid(row, 2)?,
        to_status_id: get_uuid(row, 3)?,
        name: row.get(4)?,
        created_at: get_ts(row, 5)?,
    })
}

pub struct StatusRepository<'c> {
    conn: &'c Connection,
}

impl<'c> StatusRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn list_models(&self, entity_type: Option<EntityType>) -> RepoResult<Vec<StatusModel>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {} FROM status_models
              WHERE (?1 IS NULL OR entity_type = ?1)
              ORDER BY entity_type ASC, is_default DESC, name ASC",
            MODEL_COLUMNS
        ))?;
        let rows = stmt.query_map(params![entity_type.map(|t| t.as_str())], model_from_row)?;
        let mut models = Vec::new();
        for row in rows {
            models.push(row?);
        }
        Ok(models)
    }

    pub fn get_model(&self, id: Uuid) -> RepoResult<StatusModel> {
        self.conn
            .prepare_cached(&format!("SELECT {} FROM status_models WHERE id = ?1", MODEL_COLUMNS))?
            .query_row(params![uuid_value(id)], model_from_row)
            .optional()?
            .ok_or_else(|| RepoError::not_found("status model", id))
    }

    pub fn default_model(&self, entity_type: EntityType) -> RepoResult<Option<StatusModel>> {
        Ok(self
            .conn
            .prepare_cached(&format!(
                "SELECT {} FROM status_models WHERE entity_type = ?1 AND is_default = 1",
                MODEL_COLUMNS
            ))?
            .query_row(params![entity_type.as_str()], model_from_row)
            .optional()?)
    }

    pub fn insert_model(&self, model: &StatusModel) -> RepoResult<()> {
        self.conn
            .prepare_cached(&format!(
                "INSERT INTO status_models ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                MODEL_COLUMNS
            ))?
            .execute(params![
                uuid_value(model.id),
                model.entity_type.as_str(),
                model.name,
                model.description,
                model.is_default,
                timestamp(&model.created_at),
                timestamp(&model.updated_at),
            ])?;
        Ok(())
    }

    /// Makes `id` the only default model of its entity type
    pub fn set_default(&self, id: Uuid) -> RepoResult<StatusModel> {
        let model = self.get_model(id)?;
        let now = timestamp(&crate::models::now());
        self.conn.execute(
            "UPDATE status_models SET is_default = 0, updated_at = ?1
              WHERE entity_type = ?2 AND is_default = 1 AND id <> ?3",
            params![now, model.entity_type.as_str(), uuid_value(id)],
        )?;
        self.conn.execute(
            "UPDATE status_models SET is_default = 1, updated_at = ?1 WHERE id = ?2",
            params![now, uuid_value(id)],
        )?;
        self.get_model(id)
    }

    pub fn delete_model(&self, id: Uuid) -> RepoResult<()> {
        let removed = self
            .conn
            .execute("DELETE FROM status_models WHERE id = ?1", params![uuid_value(id)])?;
        if removed == 0 {
            return Err(RepoError::not_found("status model", id));
        }
        Ok(())
    }

    pub fn list_statuses(&self, model_id: Uuid) -> RepoResult<Vec<Status>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {} FROM statuses WHERE status_model_id = ?1 ORDER BY sort_order ASC, name ASC",
            STATUS_COLUMNS
        ))?;
        let rows = stmt.query_map(params![uuid_value(model_id)], status_from_row)?;
        let mut statuses = Vec::new();
        for row in rows {
            statuses.push(row?);
        }
        Ok(statuses)
    }

    pub fn find_status(&self, model_id: Uuid, name: &str) -> RepoResult<Option<Status>> {
        Ok(self
            .conn
            .prepare_cached(&format!(
                "SELECT {} FROM statuses WHERE status_model_id = ?1 AND name = ?2",
                STATUS_COLUMNS
            ))?
            .query_row(params![uuid_value(model_id), name], status_from_row)
            .optional()?)
    }

    pub fn initial_status(&self, model_id: Uuid) -> RepoResult<Option<Status>> {
        Ok(self
            .conn
            .prepare_cached(&format!(
                "SELECT {} FROM statuses WHERE status_model_id = ?1 AND is_initial = 1
                  ORDER BY sort_order ASC LIMIT 1",
                STATUS_COLUMNS
            ))?
            .query_row(params![uuid_value(model_id)], status_from_row)
            .optional()?)
    }

    pub fn insert_status(&self, status: &Status) -> RepoResult<()> {
        self.conn
            .prepare_cached(&format!(
                "INSERT INTO statuses ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                STATUS_COLUMNS
            ))?
            .execute(params![
                uuid_value(status.id),
                uuid_value(status.status_model_id),
                status.name,
                status.description,
                status.color,
                status.sort_order,
                status.is_initial,
                status.is_final,
                timestamp(&status.created_at),
            ])?;
        Ok(())
    }

    pub fn list_transitions(&self, model_id: Uuid) -> RepoResult<Vec<StatusTransition>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {} FROM status_transitions WHERE status_model_id = ?1 ORDER BY created_at ASC, rowid ASC",
            TRANSITION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![uuid_value(model_id)], transition_from_row)?;
        let mut transitions = Vec::new();
        for row in rows {
            transitions.push(row?);
        }
        Ok(transitions)
    }

    pub fn insert_transition(&self, transition: &StatusTransition) -> RepoResult<()> {
        self.conn
            .prepare_cached(&format!(
                "INSERT INTO status_transitions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                TRANSITION_COLUMNS
            ))?
            .execute(params![
                uuid_value(transition.id),
                uuid_value(transition.status_model_id),
                uuid_value(transition.from_status_id),
                uuid_value(transition.to_status_id),
                transition.name,
                timestamp(&transition.created_at),
            ])?;
        Ok(())
    }

    pub fn has_transition(&self, model_id: Uuid, from: Uuid, to: Uuid) -> RepoResult<bool> {
        Ok(self.conn.prepare_cached(
            "SELECT EXISTS(SELECT 1 FROM status_transitions
                            WHERE status_model_id = ?1 AND from_status_id = ?2 AND to_status_id = ?3)",
        )?
        .query_row(
            params![uuid_value(model_id), uuid_value(from), uuid_value(to)],
            |row| row.get(0),
        )?)
    }

    /// Statuses reachable in one step from `from`, in model order
    pub fn targets_from(&self, model_id: Uuid, from: Uuid) -> RepoResult<Vec<Status>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT s.id, s.status_model_id, s.name, s.description, s.color, s.sort_order,
                    s.is_initial, s.is_final, s.created_at
               FROM status_transitions t
               JOIN statuses s ON s.id = t.to_status_id
              WHERE t.status_model_id = ?1 AND t.from_status_id = ?2
              ORDER BY s.sort_order ASC, s.name ASC",
        )?;
        let rows = stmt.query_map(params![uuid_value(model_id), uuid_value(from)], status_from_row)?;
        let mut statuses = Vec::new();
        for row in rows {
            statuses.push(row?);
        }
        Ok(statuses)
    }

    pub fn get_status(&self, id: Uuid) -> RepoResult<Status> {
        self.conn
            .prepare_cached(&format!("SELECT {} FROM statuses WHERE id = ?1", STATUS_COLUMNS))?
            .query_row(params![uuid_value(id)], status_from_row)
            .optional()?
            .ok_or_else(|| RepoError::not_found("status", id))
    }
}
