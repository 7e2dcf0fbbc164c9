//! Generic typed CRUD over any [`Entity`]
//!
//! A `Repository` borrows a connection (usually a transaction) for its
//! lifetime, so it cannot outlive the scope that produced it.

use std::marker::PhantomData;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Params};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::dialect::Dialect;
use super::error::{RepoError, RepoResult};
use super::traits::{uuid_value, Direction, Entity, Filter, FilterOp, ListOptions, Referenced};

/// Maximum numbered attempts before falling back to a random suffix
pub const MAX_REFERENCE_ATTEMPTS: u32 = 10;

/// How `reference_id` values are allocated on insert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceIdStrategy {
    /// The `trg_*_reference_id` triggers fill empty references
    #[default]
    Trigger,
    /// The repository computes the next number and retries on collision
    Application,
}

pub struct Repository<'c, E> {
    conn: &'c Connection,
    dialect: Dialect,
    strategy: ReferenceIdStrategy,
    _entity: PhantomData<E>,
}

impl<'c, E: Entity> Repository<'c, E> {
    pub fn new(conn: &'c Connection, dialect: Dialect, strategy: ReferenceIdStrategy) -> Self {
        Self {
            conn,
            dialect,
            strategy,
            _entity: PhantomData,
        }
    }

    pub fn conn(&self) -> &'c Connection {
        self.conn
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// A repository for another entity on the same connection
    pub fn sibling<F: Entity>(&self) -> Repository<'c, F> {
        Repository::new(self.conn, self.dialect, self.strategy)
    }

    fn select_sql() -> String {
        format!("SELECT {} FROM {}", E::COLUMNS.join(", "), E::TABLE)
    }

    /// Runs `SELECT <columns> FROM <table> <tail>` and maps every row
    pub fn select(&self, tail: &str, params: impl Params) -> RepoResult<Vec<E>> {
        let sql = format!("{} {}", Self::select_sql(), tail);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params, E::from_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    /// Like [`Repository::select`] but returns at most one row
    pub fn select_one(&self, tail: &str, params: impl Params) -> RepoResult<Option<E>> {
        let sql = format!("{} {} LIMIT 1", Self::select_sql(), tail);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        Ok(stmt.query_row(params, E::from_row).optional()?)
    }

    /// Inserts `entity` as-is
    pub fn insert(&self, entity: &E) -> RepoResult<()> {
        let placeholders: Vec<String> = (1..=E::COLUMNS.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            E::TABLE,
            E::COLUMNS.join(", "),
            placeholders.join(", ")
        );
        self.conn
            .prepare_cached(&sql)?
            .execute(params_from_iter(entity.values()))?;
        Ok(())
    }

    /// Inserts `entity` and returns the stored row (trigger-filled columns included)
    pub fn create(&self, entity: &E) -> RepoResult<E> {
        self.insert(entity)?;
        self.get_by_id(entity.id())
    }

    pub fn find_by_id(&self, id: Uuid) -> RepoResult<Option<E>> {
        self.select_one("WHERE id = ?1", params![uuid_value(id)])
    }

    pub fn get_by_id(&self, id: Uuid) -> RepoResult<E> {
        self.find_by_id(id)?
            .ok_or_else(|| RepoError::not_found(E::NAME, id))
    }

    /// Rewrites every mutable column of the stored row
    pub fn update(&self, entity: &E) -> RepoResult<()> {
        let mut assignments = Vec::new();
        let mut values = Vec::new();
        for (column, value) in E::COLUMNS.iter().zip(entity.values()) {
            if E::IMMUTABLE_COLUMNS.contains(column) {
                continue;
            }
            values.push(value);
            assignments.push(format!("{} = ?{}", column, values.len()));
        }
        values.push(uuid_value(entity.id()));
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            E::TABLE,
            assignments.join(", "),
            values.len()
        );
        let changed = self
            .conn
            .prepare_cached(&sql)?
            .execute(params_from_iter(values))?;
        if changed == 0 {
            return Err(RepoError::not_found(E::NAME, entity.id()));
        }
        Ok(())
    }

    pub fn delete(&self, id: Uuid) -> RepoResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", E::TABLE);
        let changed = self
            .conn
            .prepare_cached(&sql)?
            .execute(params![uuid_value(id)])?;
        if changed == 0 {
            return Err(RepoError::not_found(E::NAME, id));
        }
        Ok(())
    }

    pub fn exists(&self, id: Uuid) -> RepoResult<bool> {
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", E::TABLE);
        Ok(self
            .conn
            .prepare_cached(&sql)?
            .query_row(params![uuid_value(id)], |row| row.get(0))?)
    }

    fn where_clause(filters: &[Filter]) -> RepoResult<(String, Vec<Value>)> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        for filter in filters {
            if filter.column != "id" && !E::FILTER_COLUMNS.contains(&filter.column.as_str()) {
                return Err(RepoError::InvalidQuery(format!(
                    "cannot filter {} by '{}'",
                    E::TABLE,
                    filter.column
                )));
            }
            match filter.op {
                FilterOp::Eq => {
                    values.push(filter.value.clone());
                    clauses.push(format!("{} = ?{}", filter.column, values.len()));
                }
                FilterOp::IsNull => clauses.push(format!("{} IS NULL", filter.column)),
                FilterOp::IsNotNull => clauses.push(format!("{} IS NOT NULL", filter.column)),
            }
        }
        if clauses.is_empty() {
            Ok((String::new(), values))
        } else {
            Ok((format!("WHERE {}", clauses.join(" AND ")), values))
        }
    }

    /// Lists rows matching `options`; unknown filter/order columns are rejected
    pub fn list(&self, options: &ListOptions) -> RepoResult<Vec<E>> {
        let (mut tail, values) = Self::where_clause(&options.filters)?;

        match &options.order_by {
            Some(order) => {
                if !E::ORDER_COLUMNS.contains(&order.column.as_str()) {
                    return Err(RepoError::InvalidQuery(format!(
                        "cannot order {} by '{}'",
                        E::TABLE,
                        order.column
                    )));
                }
                let dir = match order.direction {
                    Direction::Asc => "ASC",
                    Direction::Desc => "DESC",
                };
                tail.push_str(&format!(" ORDER BY {} {}, rowid ASC", order.column, dir));
            }
            None => tail.push_str(" ORDER BY created_at ASC, rowid ASC"),
        }

        match (options.limit, options.offset) {
            (Some(limit), offset) => {
                tail.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset.unwrap_or(0)))
            }
            (None, Some(offset)) if offset > 0 => {
                tail.push_str(&format!(" LIMIT -1 OFFSET {}", offset))
            }
            _ => {}
        }

        self.select(&tail, params_from_iter(values))
    }

    pub fn count(&self, filters: &[Filter]) -> RepoResult<u64> {
        let (tail, values) = Self::where_clause(filters)?;
        let sql = format!("SELECT COUNT(*) FROM {} {}", E::TABLE, tail);
        let count: i64 = self
            .conn
            .prepare_cached(&sql)?
            .query_row(params_from_iter(values), |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

/// `{prefix}-{8 hex digits}` with at least one A-F digit
///
/// A purely numeric suffix would be read as a counter value by
/// `highest_reference_number` and the counter trigger.
fn fallback_reference(prefix: &str, seed: u32) -> String {
    let mut suffix = format!("{:08X}", seed);
    if suffix.bytes().all(|b| b.is_ascii_digit()) {
        let lead = b'A' + (suffix.as_bytes()[0] - b'0') % 6;
        suffix.replace_range(0..1, &char::from(lead).to_string());
    }
    format!("{}-{}", prefix, suffix)
}

impl<'c, E: Referenced> Repository<'c, E> {
    pub fn get_by_reference_id(&self, reference_id: &str) -> RepoResult<E> {
        self.select_one("WHERE reference_id = ?1", params![reference_id])?
            .ok_or_else(|| RepoError::not_found(E::NAME, reference_id))
    }

    pub fn get_by_reference_id_case_insensitive(&self, reference_id: &str) -> RepoResult<E> {
        let tail = format!("WHERE {}", self.dialect.case_insensitive_eq("reference_id", "?1"));
        self.select_one(&tail, params![reference_id])?
            .ok_or_else(|| RepoError::not_found(E::NAME, reference_id))
    }

    pub fn exists_by_reference_id(&self, reference_id: &str) -> RepoResult<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE reference_id = ?1)",
            E::TABLE
        );
        Ok(self
            .conn
            .prepare_cached(&sql)?
            .query_row(params![reference_id], |row| row.get(0))?)
    }

    /// Inserts `entity`, allocating a reference ID when it has none
    pub fn create_with_reference(&self, entity: &E) -> RepoResult<E> {
        if !entity.reference_id().is_empty() || self.strategy == ReferenceIdStrategy::Trigger {
            return self.create(entity);
        }

        let prefix = E::PREFIX;
        let base = self.highest_reference_number()?;
        let mut candidate = entity.clone();

        for attempt in 0..MAX_REFERENCE_ATTEMPTS {
            let number = base + 1 + u64::from(attempt);
            candidate.set_reference_id(prefix.format(number));
            match self.insert(&candidate) {
                Ok(()) => {
                    self.advance_counter(number)?;
                    return self.get_by_id(candidate.id());
                }
                Err(err) if err.is_duplicate_of("reference_id") => {
                    tracing::debug!(
                        table = E::TABLE,
                        attempt,
                        reference_id = candidate.reference_id(),
                        "reference id taken, retrying"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        let fallback = fallback_reference(prefix.as_str(), rand::random::<u32>());
        tracing::debug!(table = E::TABLE, reference_id = %fallback, "using random reference suffix");
        candidate.set_reference_id(fallback);
        self.create(&candidate)
    }

    /// Highest numeric suffix seen in the table or the counter
    fn highest_reference_number(&self) -> RepoResult<u64> {
        let prefix = E::PREFIX.as_str();
        let start = prefix.len() as i64 + 2;
        let sql = format!(
            "SELECT COALESCE(MAX(CAST(SUBSTR(reference_id, ?1) AS INTEGER)), 0) FROM {}
              WHERE reference_id LIKE ?2
                AND SUBSTR(reference_id, ?1) <> ''
                AND SUBSTR(reference_id, ?1) NOT GLOB '*[^0-9]*'",
            E::TABLE
        );
        let from_rows: i64 = self
            .conn
            .prepare_cached(&sql)?
            .query_row(params![start, format!("{}-%", prefix)], |row| row.get(0))?;
        let from_counter: Option<i64> = self
            .conn
            .prepare_cached("SELECT last_value FROM reference_counters WHERE prefix = ?1")?
            .query_row(params![prefix], |row| row.get(0))
            .optional()?;
        Ok(from_rows.max(from_counter.unwrap_or(0)).max(0) as u64)
    }

    fn advance_counter(&self, number: u64) -> RepoResult<()> {
        self.conn
            .prepare_cached(
                "INSERT INTO reference_counters (prefix, last_value) VALUES (?1, ?2)
                 ON CONFLICT(prefix) DO UPDATE SET last_value = MAX(last_value, excluded.last_value)",
            )?
            .execute(params![E::PREFIX.as_str(), number as i64])?;
        Ok(())
    }
}
