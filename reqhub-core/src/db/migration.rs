//! Schema migrations, versioned through `PRAGMA user_version`

use rusqlite::{types::Type, Connection};

use crate::models::ReferencePrefix;

/// Latest schema version understood by this binary
pub const LATEST_SCHEMA_VERSION: u32 = 1;

/// Tables whose `reference_id` is allocated by trigger
pub const REFERENCED_TABLES: &[(&str, ReferencePrefix)] = &[
    ("epics", ReferencePrefix::Epic),
    ("user_stories", ReferencePrefix::UserStory),
    ("acceptance_criteria", ReferencePrefix::AcceptanceCriteria),
    ("requirements", ReferencePrefix::Requirement),
    ("steering_documents", ReferencePrefix::SteeringDocument),
    ("prompts", ReferencePrefix::Prompt),
];

/// Tables mirrored into `search_index`: (table, entity type, title expression)
const SEARCHABLE_TABLES: &[(&str, &str, &str)] = &[
    ("epics", "epic", "title"),
    ("user_stories", "user_story", "title"),
    ("acceptance_criteria", "acceptance_criteria", "''"),
    ("requirements", "requirement", "title"),
];

/// Read `PRAGMA user_version` as a `u32`
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(error))
    })
}

/// Apply all pending migrations in ascending order
///
/// Each migration only runs when its version is above `user_version`, and
/// the DDL itself uses `IF NOT EXISTS`.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let mut current = current_schema_version(conn)?;

    for version in 1..=LATEST_SCHEMA_VERSION {
        if version <= current {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(&migration_sql(version))?;
        tx.pragma_update(None, "user_version", i64::from(version))?;
        tx.commit()?;
        tracing::info!(version, "applied schema migration");
        current = version;
    }

    Ok(current)
}

fn migration_sql(version: u32) -> String {
    match version {
        1 => {
            let mut sql = String::from(include_str!("schema.sql"));
            for (table, prefix) in REFERENCED_TABLES {
                sql.push_str(&reference_trigger_sql(table, *prefix));
            }
            for (table, entity_type, title) in SEARCHABLE_TABLES {
                sql.push_str(&search_trigger_sql(table, entity_type, title));
            }
            sql
        }
        _ => String::new(),
    }
}

/// Triggers that fill an empty `reference_id` from the per-prefix counter
/// and advance the counter past explicitly supplied numeric references
fn reference_trigger_sql(table: &str, prefix: ReferencePrefix) -> String {
    let p = prefix.as_str();
    let start = p.len() + 2;
    format!(
        "
INSERT OR IGNORE INTO reference_counters (prefix, last_value) VALUES ('{p}', 0);
CREATE TRIGGER IF NOT EXISTS trg_{table}_reference_id
AFTER INSERT ON {table}
WHEN NEW.reference_id IS NULL OR NEW.reference_id = ''
BEGIN
    UPDATE reference_counters SET last_value = last_value + 1 WHERE prefix = '{p}';
    UPDATE {table}
       SET reference_id = '{p}-' || (SELECT last_value FROM reference_counters WHERE prefix = '{p}')
     WHERE id = NEW.id;
END;
CREATE TRIGGER IF NOT EXISTS trg_{table}_reference_counter
AFTER INSERT ON {table}
WHEN NEW.reference_id LIKE '{p}-%' AND SUBSTR(NEW.reference_id, {start}) <> ''
     AND SUBSTR(NEW.reference_id, {start}) NOT GLOB '*[^0-9]*'
BEGIN
    UPDATE reference_counters
       SET last_value = MAX(last_value, CAST(SUBSTR(NEW.reference_id, {start}) AS INTEGER))
     WHERE prefix = '{p}';
END;
"
    )
}

/// Triggers keeping `search_index` in step with `table`
///
/// Insert and update both re-derive the index row from the stored row, so
/// the result is the same whichever AFTER INSERT trigger fires first.
fn search_trigger_sql(table: &str, entity_type: &str, title: &str) -> String {
    let reindex = format!(
        "DELETE FROM search_index WHERE entity_id = NEW.id;
    INSERT INTO search_index (entity_type, entity_id, reference_id, title, description)
    SELECT '{entity_type}', id, COALESCE(reference_id, ''), {title}, COALESCE(description, '')
      FROM {table} WHERE id = NEW.id;"
    );
    format!(
        "
CREATE TRIGGER IF NOT EXISTS trg_{table}_search_insert
AFTER INSERT ON {table}
BEGIN
    {reindex}
END;
CREATE TRIGGER IF NOT EXISTS trg_{table}_search_update
AFTER UPDATE ON {table}
BEGIN
    DELETE FROM search_index WHERE entity_id = OLD.id;
    {reindex}
END;
CREATE TRIGGER IF NOT EXISTS trg_{table}_search_delete
AFTER DELETE ON {table}
BEGIN
    DELETE FROM search_index WHERE entity_id = OLD.id;
END;
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn sqlite_object_exists(conn: &Connection, object_type: &str, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2)",
            params![object_type, name],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_migrate_empty_db_to_latest() {
        let mut conn = Connection::open_in_memory().unwrap();
        let version = migrate(&mut conn).unwrap();
        assert_eq!(version, LATEST_SCHEMA_VERSION);
        assert_eq!(current_schema_version(&conn).unwrap(), LATEST_SCHEMA_VERSION);

        for table in ["users", "epics", "requirements", "comments", "status_models"] {
            assert!(sqlite_object_exists(&conn, "table", table), "missing {table}");
        }
        assert!(sqlite_object_exists(&conn, "trigger", "trg_requirements_reference_id"));
        assert!(sqlite_object_exists(&conn, "trigger", "trg_epics_search_update"));
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        assert_eq!(migrate(&mut conn).unwrap(), LATEST_SCHEMA_VERSION);

        let counters: i64 = conn
            .query_row("SELECT COUNT(*) FROM reference_counters", [], |r| r.get(0))
            .unwrap();
        assert_eq!(counters, REFERENCED_TABLES.len() as i64);
    }
}
