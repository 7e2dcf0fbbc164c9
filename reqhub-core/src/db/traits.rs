//! Row mapping traits and the generic list/filter vocabulary
//!
//! Every persisted record implements [`Entity`]; records that carry a
//! human-readable reference ID also implement [`Referenced`].

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::Row;
use uuid::Uuid;

use crate::models::ReferencePrefix;

/// A record stored in a single table
///
/// `COLUMNS[0]` must be `id`. [`Entity::values`] yields one value per
/// column, in the same order.
pub trait Entity: Sized + Clone {
    const TABLE: &'static str;
    /// Human name used in not-found messages
    const NAME: &'static str;
    const COLUMNS: &'static [&'static str];
    /// Columns callers may filter on
    const FILTER_COLUMNS: &'static [&'static str] = &[];
    /// Columns callers may order by
    const ORDER_COLUMNS: &'static [&'static str] = &["created_at"];
    /// Columns never rewritten by `update`
    const IMMUTABLE_COLUMNS: &'static [&'static str] = &["id", "created_at"];

    fn id(&self) -> Uuid;
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
    fn values(&self) -> Vec<Value>;
}

/// An entity with a `reference_id` column allocated per prefix
pub trait Referenced: Entity {
    const PREFIX: ReferencePrefix;

    fn reference_id(&self) -> &str;
    fn set_reference_id(&mut self, reference_id: String);
}

/// Comparison used by a [`Filter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    IsNull,
    IsNotNull,
}

/// A column predicate; the column must be whitelisted by the entity
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self {
            column: column.to_string(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn uuid(column: &str, id: Uuid) -> Self {
        Self::eq(column, uuid_value(id))
    }

    pub fn is_null(column: &str) -> Self {
        Self {
            column: column.to_string(),
            op: FilterOp::IsNull,
            value: Value::Null,
        }
    }

    pub fn is_not_null(column: &str) -> Self {
        Self {
            column: column.to_string(),
            op: FilterOp::IsNotNull,
            value: Value::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            direction: Direction::Desc,
        }
    }

    /// Parses `column` or `column:desc` / `-column`
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        if let Some(column) = spec.strip_prefix('-') {
            return Self::desc(column);
        }
        match spec.split_once(':') {
            Some((column, dir)) if dir.eq_ignore_ascii_case("desc") => Self::desc(column),
            Some((column, _)) => Self::asc(column),
            None => Self::asc(spec),
        }
    }
}

/// Filters, ordering and pagination for `Repository::list`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListOptions {
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn page(mut self, limit: u32, offset: u32) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }
}

// =========================================================================
// Value conversion helpers
// =========================================================================

pub fn uuid_value(id: Uuid) -> Value {
    Value::Text(id.hyphenated().to_string())
}

pub fn opt_uuid_value(id: Option<Uuid>) -> Value {
    id.map(uuid_value).unwrap_or(Value::Null)
}

pub fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn ts_value(ts: &DateTime<Utc>) -> Value {
    Value::Text(timestamp(ts))
}

pub fn opt_ts_value(ts: &Option<DateTime<Utc>>) -> Value {
    ts.as_ref().map(ts_value).unwrap_or(Value::Null)
}

pub fn opt_text_value(s: &Option<String>) -> Value {
    s.clone().map(Value::Text).unwrap_or(Value::Null)
}

/// Reference IDs are stored NULL until allocated
pub fn reference_value(reference_id: &str) -> Value {
    if reference_id.is_empty() {
        Value::Null
    } else {
        Value::Text(reference_id.to_string())
    }
}

fn conversion_error(idx: usize, ty: Type, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

pub fn get_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| conversion_error(idx, Type::Text, e))
}

pub fn get_opt_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| Uuid::parse_str(&s).map_err(|e| conversion_error(idx, Type::Text, e)))
        .transpose()
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

pub fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_timestamp(&s).map_err(|e| conversion_error(idx, Type::Text, e))
}

pub fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| parse_timestamp(&s).map_err(|e| conversion_error(idx, Type::Text, e)))
        .transpose()
}

pub fn get_reference(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    let s: Option<String> = row.get(idx)?;
    Ok(s.unwrap_or_default())
}

/// Parses a text column with `FromStr`, surfacing failures as conversion errors
pub fn get_parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let s: String = row.get(idx)?;
    s.parse::<T>()
        .map_err(|e| conversion_error(idx, Type::Text, ParseFailure(e)))
}

/// Wraps a `String` parse failure as an error type
#[derive(Debug)]
pub struct ParseFailure(pub String);

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseFailure {}

pub fn parse_failure(idx: usize, message: String) -> rusqlite::Error {
    conversion_error(idx, Type::Text, ParseFailure(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_by_parse() {
        assert_eq!(OrderBy::parse("title"), OrderBy::asc("title"));
        assert_eq!(OrderBy::parse("-created_at"), OrderBy::desc("created_at"));
        assert_eq!(OrderBy::parse("priority:DESC"), OrderBy::desc("priority"));
        assert_eq!(OrderBy::parse("priority:asc"), OrderBy::asc("priority"));
    }

    #[test]
    fn test_timestamp_round_trip_keeps_micros() {
        let now = crate::models::now();
        let text = timestamp(&now);
        assert!(text.ends_with('Z'));
        assert_eq!(parse_timestamp(&text).unwrap(), now);
    }

    #[test]
    fn test_empty_reference_is_null() {
        assert_eq!(reference_value(""), Value::Null);
        assert_eq!(reference_value("EP-1"), Value::Text("EP-1".into()));
    }
}
