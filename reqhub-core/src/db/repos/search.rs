//! Global search over epics, user stories, acceptance criteria and requirements

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use serde::Serialize;
use uuid::Uuid;

use super::get_entity_type;
use crate::db::dialect::Dialect;
use crate::db::error::RepoResult;
use crate::db::traits::get_uuid;
use crate::models::EntityType;

/// One search result
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchHit {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub reference_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// bm25 score; lower is better. Zero for substring matches.
    pub rank: f64,
}

fn hit_from_row(row: &Row<'_>) -> rusqlite::Result<SearchHit> {
    let description: Option<String> = row.get(4)?;
    Ok(SearchHit {
        entity_type: get_entity_type(row, 0)?,
        entity_id: get_uuid(row, 1)?,
        reference_id: row.get(2)?,
        title: row.get(3)?,
        description: description.filter(|d| !d.is_empty()),
        rank: row.get(5)?,
    })
}

/// Table, title expression and reference column per entity type
fn source(entity_type: EntityType) -> (&'static str, &'static str) {
    match entity_type {
        EntityType::Epic => ("epics", "title"),
        EntityType::UserStory => ("user_stories", "title"),
        EntityType::AcceptanceCriteria => ("acceptance_criteria", "''"),
        EntityType::Requirement => ("requirements", "title"),
    }
}

/// Turns free text into an FTS5 query: every term quoted, prefix-matched
pub fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|term| term.trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '_'))
        .filter(|term| !term.is_empty())
        .map(|term| format!("\"{}\"*", term.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

/// Escapes `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern
pub fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

pub struct SearchRepository<'c> {
    conn: &'c Connection,
    dialect: Dialect,
}

impl<'c> SearchRepository<'c> {
    pub fn new(conn: &'c Connection, dialect: Dialect) -> Self {
        Self { conn, dialect }
    }

    /// Ranked FTS5 match; `Ok(None)` when the query has no searchable terms
    pub fn full_text(
        &self,
        query: &str,
        types: &[EntityType],
        limit: u32,
        offset: u32,
    ) -> RepoResult<Option<Vec<SearchHit>>> {
        let Some(fts) = fts_query(query) else {
            return Ok(None);
        };
        if types.is_empty() {
            return Ok(Some(Vec::new()));
        }
        let mut values = vec![Value::Text(fts)];
        let mut placeholders = Vec::new();
        for t in types {
            values.push(Value::Text(t.as_str().to_string()));
            placeholders.push(format!("?{}", values.len()));
        }
        let sql = format!(
            "SELECT entity_type, entity_id, reference_id, title, description, bm25(search_index) AS rank
               FROM search_index
              WHERE search_index MATCH ?1 AND entity_type IN ({})
              ORDER BY rank ASC, reference_id ASC
              LIMIT {} OFFSET {}",
            placeholders.join(", "),
            limit,
            offset
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), hit_from_row)?;
        let mut hits = Vec::new();
        for row in rows {
            hits.push(row?);
        }
        Ok(Some(hits))
    }

    /// Case-insensitive substring match on title, description and reference
    pub fn substring(
        &self,
        query: &str,
        types: &[EntityType],
        limit: u32,
        offset: u32,
    ) -> RepoResult<Vec<SearchHit>> {
        if types.is_empty() {
            return Ok(Vec::new());
        }
        let pattern = Value::Text(like_pattern(query.trim()));
        let mut selects = Vec::new();
        for t in types {
            let (table, title) = source(*t);
            let matches: Vec<String> = [title, "COALESCE(description, '')", "COALESCE(reference_id, '')"]
                .iter()
                .filter(|col| **col != "''")
                .map(|col| format!("{} ESCAPE '\\'", self.dialect.case_insensitive_like(col, "?1")))
                .collect();
            selects.push(format!(
                "SELECT '{}' AS entity_type, id, COALESCE(reference_id, '') AS reference_id, {} AS title,
                        description, 0.0 AS rank, created_at
                   FROM {} WHERE {}",
                t.as_str(),
                title,
                table,
                matches.join(" OR ")
            ));
        }
        let sql = format!(
            "SELECT entity_type, id, reference_id, title, description, rank FROM ({})
              ORDER BY created_at ASC LIMIT {} OFFSET {}",
            selects.join(" UNION ALL "),
            limit,
            offset
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter([pattern]), hit_from_row)?;
        let mut hits = Vec::new();
        for row in rows {
            hits.push(row?);
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fts_query_quotes_terms() {
        assert_eq!(fts_query("Login page").unwrap(), "\"Login\"* \"page\"*");
        assert_eq!(fts_query("say \"hi\"").unwrap(), "\"say\"* \"hi\"*");
        assert_eq!(fts_query("REQ-1").unwrap(), "\"REQ-1\"*");
        assert!(fts_query("  ?? ").is_none());
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
