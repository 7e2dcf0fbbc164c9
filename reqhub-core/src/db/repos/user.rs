use rusqlite::types::Value;
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::db::error::RepoResult;
use crate::db::repository::Repository;
use crate::db::traits::{get_parsed, get_ts, get_uuid, ts_value, uuid_value, Entity};
use crate::models::User;

impl Entity for User {
    const TABLE: &'static str = "users";
    const NAME: &'static str = "user";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "username",
        "email",
        "password_hash",
        "role",
        "created_at",
        "updated_at",
    ];
    const FILTER_COLUMNS: &'static [&'static str] = &["role", "username", "email"];
    const ORDER_COLUMNS: &'static [&'static str] = &["created_at", "username", "email"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: get_uuid(row, 0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            role: get_parsed(row, 4)?,
            created_at: get_ts(row, 5)?,
            updated_at: get_ts(row, 6)?,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            uuid_value(self.id),
            Value::Text(self.username.clone()),
            Value::Text(self.email.clone()),
            Value::Text(self.password_hash.clone()),
            Value::Text(self.role.as_str().to_string()),
            ts_value(&self.created_at),
            ts_value(&self.updated_at),
        ]
    }
}

/// Tables and columns that pin a user row in place
const USER_REFERENCES: &[(&str, &str)] = &[
    ("epics", "creator_id"),
    ("epics", "assignee_id"),
    ("user_stories", "creator_id"),
    ("user_stories", "assignee_id"),
    ("acceptance_criteria", "author_id"),
    ("requirements", "creator_id"),
    ("requirements", "assignee_id"),
    ("requirement_relationships", "created_by"),
    ("comments", "author_id"),
    ("steering_documents", "creator_id"),
    ("prompts", "creator_id"),
];

impl<'c> Repository<'c, User> {
    pub fn find_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        self.select_one("WHERE username = ?1", params![username])
    }

    pub fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let tail = format!("WHERE {}", self.dialect().case_insensitive_eq("email", "?1"));
        self.select_one(&tail, params![email])
    }

    /// Where the user is still referenced as creator, assignee or author
    pub fn references(&self, user_id: Uuid) -> RepoResult<Vec<String>> {
        let mut found = Vec::new();
        for (table, column) in USER_REFERENCES {
            let sql = format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1)",
                table, column
            );
            let referenced: bool = self
                .conn()
                .prepare_cached(&sql)?
                .query_row(params![uuid_value(user_id)], |row| row.get(0))?;
            if referenced {
                found.push(format!("{}.{}", table, column));
            }
        }
        Ok(found)
    }

    pub fn count_admins(&self) -> RepoResult<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM users WHERE role = 'administrator'",
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use crate::context::Cancellation;
    use crate::db::test_support::test_db;
    use crate::db::RepoError;
    use crate::models::{Role, User};

    #[test]
    fn test_user_crud_and_unique_username() {
        let t = test_db();
        let result: Result<(), RepoError> = t.db.with_transaction(&Cancellation::new(), |repos| {
            let users = repos.users();
            let alice = User::new("alice".into(), "Alice@Example.com".into(), "h".into(), Role::User);
            users.create(&alice)?;
            assert_eq!(users.find_by_username("alice")?.unwrap().id, alice.id);
            assert_eq!(users.find_by_email("alice@example.com")?.unwrap().id, alice.id);
            assert!(users.references(alice.id)?.is_empty());

            let dup = User::new("alice".into(), "other@example.com".into(), "h".into(), Role::User);
            let err = users.create(&dup).unwrap_err();
            assert!(err.is_duplicate_of("users.username"), "{err:?}");
            Ok(())
        });
        result.unwrap();
    }
}
