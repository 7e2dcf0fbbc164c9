//! Refresh tokens and sessions
//!
//! Both are looked up by the SHA-256 of the presented secret, so they are
//! kept out of the generic repository (no listing, no updates).

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::error::RepoResult;
use crate::db::traits::{get_opt_ts, get_ts, get_uuid, timestamp, uuid_value};
use crate::models::{RefreshToken, Session};

pub struct CredentialRepository<'c> {
    conn: &'c Connection,
}

fn refresh_from_row(row: &Row<'_>) -> rusqlite::Result<RefreshToken> {
    Ok(RefreshToken {
        id: get_uuid(row, 0)?,
        user_id: get_uuid(row, 1)?,
        token_hash: row.get(2)?,
        expires_at: get_ts(row, 3)?,
        last_used_at: get_opt_ts(row, 4)?,
        created_at: get_ts(row, 5)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: get_uuid(row, 0)?,
        user_id: get_uuid(row, 1)?,
        token_hash: row.get(2)?,
        expires_at: get_ts(row, 3)?,
        created_at: get_ts(row, 4)?,
    })
}

impl<'c> CredentialRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    // =====================================================================
    // Refresh tokens
    // =====================================================================

    pub fn insert_refresh(&self, token: &RefreshToken) -> RepoResult<()> {
        self.conn
            .prepare_cached(
                "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, last_used_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?
            .execute(params![
                uuid_value(token.id),
                uuid_value(token.user_id),
                token.token_hash,
                timestamp(&token.expires_at),
                token.last_used_at.as_ref().map(timestamp),
                timestamp(&token.created_at),
            ])?;
        Ok(())
    }

    pub fn find_refresh_by_hash(&self, token_hash: &str) -> RepoResult<Option<RefreshToken>> {
        Ok(self
            .conn
            .prepare_cached(
                "SELECT id, user_id, token_hash, expires_at, last_used_at, created_at
                   FROM refresh_tokens WHERE token_hash = ?1",
            )?
            .query_row(params![token_hash], refresh_from_row)
            .optional()?)
    }

    pub fn delete_refresh(&self, id: Uuid) -> RepoResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM refresh_tokens WHERE id = ?1", params![uuid_value(id)])?;
        Ok(removed > 0)
    }

    pub fn delete_refresh_by_user(&self, user_id: Uuid) -> RepoResult<u64> {
        let removed = self.conn.execute(
            "DELETE FROM refresh_tokens WHERE user_id = ?1",
            params![uuid_value(user_id)],
        )?;
        Ok(removed as u64)
    }

    pub fn delete_expired_refresh(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let removed = self.conn.execute(
            "DELETE FROM refresh_tokens WHERE expires_at <= ?1",
            params![timestamp(&now)],
        )?;
        Ok(removed as u64)
    }

    // =====================================================================
    // Sessions
    // =====================================================================

    pub fn insert_session(&self, session: &Session) -> RepoResult<()> {
        self.conn
            .prepare_cached(
                "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?
            .execute(params![
                uuid_value(session.id),
                uuid_value(session.user_id),
                session.token_hash,
                timestamp(&session.expires_at),
                timestamp(&session.created_at),
            ])?;
        Ok(())
    }

    pub fn find_session_by_hash(&self, token_hash: &str) -> RepoResult<Option<Session>> {
        Ok(self
            .conn
            .prepare_cached(
                "SELECT id, user_id, token_hash, expires_at, created_at
                   FROM sessions WHERE token_hash = ?1",
            )?
            .query_row(params![token_hash], session_from_row)
            .optional()?)
    }

    pub fn delete_sessions_by_user(&self, user_id: Uuid) -> RepoResult<u64> {
        let removed = self.conn.execute(
            "DELETE FROM sessions WHERE user_id = ?1",
            params![uuid_value(user_id)],
        )?;
        Ok(removed as u64)
    }

    pub fn delete_expired_sessions(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let removed = self.conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![timestamp(&now)],
        )?;
        Ok(removed as u64)
    }
}
