//! Persistence layer for reqhub
//!
//! A [`Database`] owns an r2d2 pool of SQLite connections. All work runs
//! inside [`Database::with_transaction`] (or [`Database::with_read`]), which
//! hands the closure a [`Repos`] bound to that one transaction.

mod dialect;
mod error;
pub mod migration;
pub mod repos;
mod repository;
pub mod seed;
mod traits;

pub use dialect::{Dialect, DsnTarget};
pub use error::{classify, RepoError, RepoResult};
pub use repository::{ReferenceIdStrategy, Repository, MAX_REFERENCE_ATTEMPTS};
pub use traits::{
    get_opt_ts, get_opt_uuid, get_parsed, get_reference, get_ts, get_uuid, opt_text_value,
    opt_ts_value, opt_uuid_value, parse_failure, reference_value, timestamp, ts_value, uuid_value,
    Direction, Entity, Filter, FilterOp, ListOptions, OrderBy, Referenced,
};

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::config::DatabaseConfig;
use crate::context::Cancellation;
use crate::models::{
    AcceptanceCriteria, Comment, Epic, PersonalAccessToken, Prompt, RelationshipType, Requirement,
    RequirementRelationship, RequirementType, SteeringDocument, User, UserStory,
};

/// Number of SQLite VM instructions between cancellation checks
const PROGRESS_INTERVAL: i32 = 1_000;

pub type SqlitePool = Pool<SqliteConnectionManager>;

/// Applies the per-connection pragmas every pooled connection needs
pub fn configure_connection(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

/// Shared handle to the connection pool
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    dialect: Dialect,
    strategy: ReferenceIdStrategy,
}

impl Database {
    /// Opens the pool described by `config` and migrates the schema
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let target = DsnTarget::parse(&config.dsn)
            .map_err(anyhow::Error::msg)
            .context("Invalid database DSN")?;
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);

        let (manager, max_size) = match &target {
            DsnTarget::Postgres(_) => {
                bail!("PostgreSQL DSNs are not supported by this build; use sqlite://<path>")
            }
            DsnTarget::SqliteMemory => (SqliteConnectionManager::memory(), 1),
            DsnTarget::SqliteFile(path) => {
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).with_context(|| {
                            format!("Failed to create database directory {}", parent.display())
                        })?;
                    }
                }
                (SqliteConnectionManager::file(path), config.pool_size)
            }
        };
        let manager = manager.with_init(move |conn| configure_connection(conn, busy_timeout));

        let pool = Pool::builder()
            .max_size(max_size)
            .build(manager)
            .context("Failed to build connection pool")?;

        let mut conn = pool.get().context("Failed to get a pooled connection")?;
        let version = migration::migrate(&mut conn).context("Failed to migrate schema")?;
        tracing::debug!(dsn = %config.dsn, version, pool_size = max_size, "database opened");

        Ok(Self {
            pool,
            dialect: target.dialect(),
            strategy: config.reference_ids,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn reference_strategy(&self) -> ReferenceIdStrategy {
        self.strategy
    }

    /// Checks a raw connection out of the pool
    pub fn connection(&self) -> RepoResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Runs `f` inside a `BEGIN IMMEDIATE` transaction
    ///
    /// Commits when `f` returns `Ok`; rolls back on `Err`, on panic, or when
    /// `cancel` is raised mid-statement.
    pub fn with_transaction<T, E, F>(&self, cancel: &Cancellation, f: F) -> Result<T, E>
    where
        F: FnOnce(&Repos<'_>) -> Result<T, E>,
        E: From<RepoError>,
    {
        self.run(cancel, TransactionBehavior::Immediate, f)
    }

    /// Runs `f` inside a deferred (read) transaction
    pub fn with_read<T, E, F>(&self, cancel: &Cancellation, f: F) -> Result<T, E>
    where
        F: FnOnce(&Repos<'_>) -> Result<T, E>,
        E: From<RepoError>,
    {
        self.run(cancel, TransactionBehavior::Deferred, f)
    }

    fn run<T, E, F>(&self, cancel: &Cancellation, behavior: TransactionBehavior, f: F) -> Result<T, E>
    where
        F: FnOnce(&Repos<'_>) -> Result<T, E>,
        E: From<RepoError>,
    {
        if cancel.is_cancelled() {
            return Err(RepoError::Cancelled.into());
        }
        let conn = self.pool.get().map_err(RepoError::from)?;
        let _interrupt = InterruptGuard::install(&conn, cancel);
        let tx = Transaction::new_unchecked(&conn, behavior).map_err(RepoError::from)?;

        let result = {
            let repos = Repos::new(&tx, self.dialect, self.strategy);
            f(&repos)
        };

        match result {
            Ok(value) => {
                tx.commit().map_err(RepoError::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback() {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// Installs a progress handler for the guard's lifetime
struct InterruptGuard<'c> {
    conn: &'c Connection,
}

impl<'c> InterruptGuard<'c> {
    fn install(conn: &'c Connection, cancel: &Cancellation) -> Self {
        let cancel = cancel.clone();
        conn.progress_handler(PROGRESS_INTERVAL, Some(move || cancel.is_cancelled()));
        Self { conn }
    }
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
    }
}

/// Repositories bound to a single transaction
pub struct Repos<'c> {
    conn: &'c Connection,
    dialect: Dialect,
    strategy: ReferenceIdStrategy,
}

impl<'c> Repos<'c> {
    pub fn new(conn: &'c Connection, dialect: Dialect, strategy: ReferenceIdStrategy) -> Self {
        Self {
            conn,
            dialect,
            strategy,
        }
    }

    pub fn conn(&self) -> &'c Connection {
        self.conn
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// A repository for any entity type
    pub fn of<E: Entity>(&self) -> Repository<'c, E> {
        Repository::new(self.conn, self.dialect, self.strategy)
    }

    pub fn users(&self) -> Repository<'c, User> {
        self.of()
    }

    pub fn epics(&self) -> Repository<'c, Epic> {
        self.of()
    }

    pub fn user_stories(&self) -> Repository<'c, UserStory> {
        self.of()
    }

    pub fn acceptance_criteria(&self) -> Repository<'c, AcceptanceCriteria> {
        self.of()
    }

    pub fn requirements(&self) -> Repository<'c, Requirement> {
        self.of()
    }

    pub fn requirement_types(&self) -> Repository<'c, RequirementType> {
        self.of()
    }

    pub fn relationship_types(&self) -> Repository<'c, RelationshipType> {
        self.of()
    }

    pub fn relationships(&self) -> Repository<'c, RequirementRelationship> {
        self.of()
    }

    pub fn comments(&self) -> Repository<'c, Comment> {
        self.of()
    }

    pub fn steering_documents(&self) -> Repository<'c, SteeringDocument> {
        self.of()
    }

    pub fn prompts(&self) -> Repository<'c, Prompt> {
        self.of()
    }

    pub fn tokens(&self) -> Repository<'c, PersonalAccessToken> {
        self.of()
    }

    pub fn credentials(&self) -> repos::CredentialRepository<'c> {
        repos::CredentialRepository::new(self.conn)
    }

    pub fn status_models(&self) -> repos::StatusRepository<'c> {
        repos::StatusRepository::new(self.conn)
    }

    pub fn search(&self) -> repos::SearchRepository<'c> {
        repos::SearchRepository::new(self.conn, self.dialect)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// A migrated database in a temporary directory
    pub struct TestDb {
        pub db: Database,
        _dir: TempDir,
    }

    pub fn test_db_with(strategy: ReferenceIdStrategy) -> TestDb {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            dsn: format!("sqlite://{}", dir.path().join("test.db").display()),
            pool_size: 4,
            busy_timeout_ms: 5_000,
            reference_ids: strategy,
        };
        TestDb {
            db: Database::open(&config).unwrap(),
            _dir: dir,
        }
    }

    pub fn test_db() -> TestDb {
        test_db_with(ReferenceIdStrategy::Trigger)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::test_db;
    use super::*;

    #[test]
    fn test_open_configures_connections() {
        let t = test_db();
        let conn = t.db.connection().unwrap();
        let fk: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
        let mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_ascii_lowercase(), "wal");
    }

    #[test]
    fn test_postgres_dsn_is_rejected() {
        let config = DatabaseConfig {
            dsn: "postgres://localhost/reqhub".into(),
            ..DatabaseConfig::default()
        };
        let err = Database::open(&config).err().unwrap();
        assert!(err.to_string().contains("PostgreSQL"));
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let t = test_db();
        let cancel = Cancellation::new();
        let result: RepoResult<()> = t.db.with_transaction(&cancel, |repos| {
            repos
                .conn()
                .execute("INSERT INTO reference_counters (prefix, last_value) VALUES ('ZZ', 1)", [])?;
            Err(RepoError::InvalidQuery("abort".into()))
        });
        assert!(result.is_err());

        let count: i64 = t
            .db
            .connection()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM reference_counters WHERE prefix = 'ZZ'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_transaction_rolls_back_on_panic() {
        let t = test_db();
        let db = t.db.clone();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: RepoResult<()> = db.with_transaction(&Cancellation::new(), |repos| {
                repos
                    .conn()
                    .execute("INSERT INTO reference_counters (prefix, last_value) VALUES ('PP', 1)", [])?;
                panic!("boom");
            });
        }));
        assert!(outcome.is_err());

        let count: i64 = t
            .db
            .connection()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM reference_counters WHERE prefix = 'PP'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_cancelled_before_start() {
        let t = test_db();
        let cancel = Cancellation::new();
        cancel.cancel();
        let result: RepoResult<()> = t.db.with_read(&cancel, |_| Ok(()));
        assert!(matches!(result, Err(RepoError::Cancelled)));
    }

    #[test]
    fn test_cancellation_interrupts_running_statement() {
        let t = test_db();
        let cancel = Cancellation::new();
        let trigger = cancel.clone();
        let result: RepoResult<i64> = t.db.with_read(&cancel, |repos| {
            trigger.cancel();
            let n = repos.conn().query_row(
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 10000000)
                 SELECT COUNT(*) FROM c",
                [],
                |row| row.get(0),
            )?;
            Ok(n)
        });
        assert!(matches!(result, Err(RepoError::Cancelled)), "{result:?}");
    }
}
