//! SQL dialect selection from the configured DSN

use std::fmt;

/// The SQL dialect of the configured database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    /// Case-insensitive equality between `column` and the placeholder `param`
    pub fn case_insensitive_eq(&self, column: &str, param: &str) -> String {
        match self {
            Dialect::Postgres => format!("{} ILIKE {}", column, param),
            Dialect::Sqlite => format!("LOWER({}) = LOWER({})", column, param),
        }
    }

    /// Case-insensitive substring match; `param` must carry the `%` wildcards
    pub fn case_insensitive_like(&self, column: &str, param: &str) -> String {
        match self {
            Dialect::Postgres => format!("{} ILIKE {}", column, param),
            Dialect::Sqlite => format!("LOWER({}) LIKE LOWER({})", column, param),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Sqlite => write!(f, "SQLite"),
            Dialect::Postgres => write!(f, "PostgreSQL"),
        }
    }
}

/// Where a DSN points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DsnTarget {
    /// A SQLite database file
    SqliteFile(String),
    /// A private in-memory SQLite database
    SqliteMemory,
    /// A PostgreSQL server
    Postgres(String),
}

impl DsnTarget {
    /// Parses `sqlite://path`, `sqlite::memory:`, `postgres://...` or a bare path
    pub fn parse(dsn: &str) -> Result<Self, String> {
        let dsn = dsn.trim();
        if dsn.is_empty() {
            return Err("database DSN must not be empty".to_string());
        }
        if dsn == "sqlite::memory:" || dsn == ":memory:" {
            return Ok(DsnTarget::SqliteMemory);
        }
        if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
            return Ok(DsnTarget::Postgres(dsn.to_string()));
        }
        if let Some(path) = dsn.strip_prefix("sqlite://") {
            if path.is_empty() {
                return Err("sqlite DSN has no path".to_string());
            }
            return Ok(DsnTarget::SqliteFile(path.to_string()));
        }
        if dsn.contains("://") {
            return Err(format!("unsupported database scheme in '{}'", dsn));
        }
        Ok(DsnTarget::SqliteFile(dsn.to_string()))
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            DsnTarget::Postgres(_) => Dialect::Postgres,
            _ => Dialect::Sqlite,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_fragments() {
        assert_eq!(
            Dialect::Sqlite.case_insensitive_eq("reference_id", "?1"),
            "LOWER(reference_id) = LOWER(?1)"
        );
        assert_eq!(
            Dialect::Postgres.case_insensitive_eq("reference_id", "$1"),
            "reference_id ILIKE $1"
        );
        assert_eq!(
            Dialect::Sqlite.case_insensitive_like("title", "?2"),
            "LOWER(title) LIKE LOWER(?2)"
        );
    }

    #[test]
    fn test_dsn_parsing() {
        assert_eq!(
            DsnTarget::parse("sqlite://data/reqhub.db").unwrap(),
            DsnTarget::SqliteFile("data/reqhub.db".into())
        );
        assert_eq!(DsnTarget::parse("sqlite::memory:").unwrap(), DsnTarget::SqliteMemory);
        assert_eq!(
            DsnTarget::parse("reqhub.db").unwrap(),
            DsnTarget::SqliteFile("reqhub.db".into())
        );
        let pg = DsnTarget::parse("postgres://u:p@localhost/db").unwrap();
        assert_eq!(pg.dialect(), Dialect::Postgres);
        assert!(DsnTarget::parse("mysql://x").is_err());
        assert!(DsnTarget::parse("sqlite://").is_err());
        assert!(DsnTarget::parse("  ").is_err());
    }
}
