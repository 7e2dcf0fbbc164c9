use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::db::error::RepoResult;
use crate::db::repository::Repository;
use crate::db::traits::{
    get_opt_ts, get_ts, get_uuid, opt_ts_value, parse_failure, timestamp, ts_value, uuid_value,
    Entity,
};
use crate::models::PersonalAccessToken;

impl Entity for PersonalAccessToken {
    const TABLE: &'static str = "personal_access_tokens";
    const NAME: &'static str = "personal access token";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "user_id",
        "name",
        "token_hash",
        "prefix",
        "scopes",
        "expires_at",
        "last_used_at",
        "created_at",
    ];
    const FILTER_COLUMNS: &'static [&'static str] = &["user_id", "name", "prefix"];
    const ORDER_COLUMNS: &'static [&'static str] = &["created_at", "name", "last_used_at"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let scopes: String = row.get(5)?;
        let scopes: Vec<String> =
            serde_json::from_str(&scopes).map_err(|e| parse_failure(5, e.to_string()))?;
        Ok(Self {
            id: get_uuid(row, 0)?,
            user_id: get_uuid(row, 1)?,
            name: row.get(2)?,
            token_hash: row.get(3)?,
            prefix: row.get(4)?,
            scopes,
            expires_at: get_opt_ts(row, 6)?,
            last_used_at: get_opt_ts(row, 7)?,
            created_at: get_ts(row, 8)?,
        })
    }

    fn values(&self) -> Vec<Value> {
        // A Vec<String> always serializes
        let scopes = serde_json::to_string(&self.scopes).unwrap_or_else(|_| "[]".to_string());
        vec![
            uuid_value(self.id),
            uuid_value(self.user_id),
            Value::Text(self.name.clone()),
            Value::Text(self.token_hash.clone()),
            Value::Text(self.prefix.clone()),
            Value::Text(scopes),
            opt_ts_value(&self.expires_at),
            opt_ts_value(&self.last_used_at),
            ts_value(&self.created_at),
        ]
    }
}

impl<'c> Repository<'c, PersonalAccessToken> {
    pub fn list_by_user(&self, user_id: Uuid) -> RepoResult<Vec<PersonalAccessToken>> {
        self.select(
            "WHERE user_id = ?1 ORDER BY created_at ASC, rowid ASC",
            params![uuid_value(user_id)],
        )
    }

    /// Every token issued under a scheme prefix
    pub fn list_by_prefix(&self, prefix: &str) -> RepoResult<Vec<PersonalAccessToken>> {
        self.select("WHERE prefix = ?1", params![prefix])
    }

    pub fn find_by_user_and_name(
        &self,
        user_id: Uuid,
        name: &str,
    ) -> RepoResult<Option<PersonalAccessToken>> {
        self.select_one(
            "WHERE user_id = ?1 AND name = ?2",
            params![uuid_value(user_id), name],
        )
    }

    pub fn touch(&self, id: Uuid, at: DateTime<Utc>) -> RepoResult<()> {
        self.conn()
            .prepare_cached("UPDATE personal_access_tokens SET last_used_at = ?1 WHERE id = ?2")?
            .execute(params![timestamp(&at), uuid_value(id)])?;
        Ok(())
    }

    pub fn delete_expired(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let removed = self.conn().execute(
            "DELETE FROM personal_access_tokens WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![timestamp(&now)],
        )?;
        Ok(removed as u64)
    }
}
