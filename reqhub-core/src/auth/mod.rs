//! Authentication: passwords, sessions, refresh tokens and personal access tokens
//!
//! [`AuthService`] turns a presented credential into a [`Caller`]. Role and
//! scope checks live in [`roles`] and run inside each domain service.

pub mod password;
pub mod pat;
pub mod roles;
pub mod session;
pub mod tokens;
mod touch;

pub use password::Kdf;
pub use pat::{CreatePat, IssuedToken};
pub use roles::{require, Capability};
pub use session::{LoginTokens, SweepReport};
pub use touch::TouchQueue;

use crate::config::AuthConfig;
use crate::context::{Caller, Cancellation};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{Role, User};

pub struct AuthService {
    db: Database,
    kdf: Kdf,
    config: AuthConfig,
    touch: TouchQueue,
}

impl AuthService {
    pub fn new(db: Database, config: &AuthConfig) -> Result<Self> {
        let kdf = Kdf::new(&config.kdf)?;
        Ok(Self::with_kdf(db, kdf, config))
    }

    pub fn with_kdf(db: Database, kdf: Kdf, config: &AuthConfig) -> Self {
        let touch = TouchQueue::start(db.clone());
        Self {
            db,
            kdf,
            config: config.clone(),
            touch,
        }
    }

    pub fn kdf(&self) -> &Kdf {
        &self.kdf
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Resolves a bearer credential, PAT or session token, to its caller
    pub fn authenticate(&self, cancel: &Cancellation, bearer: &str) -> Result<Caller> {
        let credential = bearer.trim();
        let credential = credential.strip_prefix("Bearer ").unwrap_or(credential).trim();
        if credential.is_empty() {
            return Err(Error::Unauthorized("missing credential".to_string()));
        }
        if credential.starts_with(&self.config.pat_prefix) {
            self.authenticate_pat(cancel, credential)
        } else {
            self.authenticate_session(cancel, credential)
        }
    }

    /// Waits for queued `last_used_at` writes
    pub fn flush_touches(&self) -> bool {
        self.touch.flush()
    }

    /// Creates the configured administrator when no administrator exists
    ///
    /// Returns the new user, or `None` when nothing was done.
    pub fn bootstrap_admin(&self, cancel: &Cancellation) -> Result<Option<User>> {
        let admin = &self.config.bootstrap_admin;
        let Some(password) = admin.password.as_deref() else {
            return Ok(None);
        };
        password::validate_password(password)?;

        let existing = self.db.with_read(cancel, |repos| -> Result<u64> {
            Ok(repos.users().count_admins()?)
        })?;
        if existing > 0 {
            return Ok(None);
        }

        let hash = self.kdf.hash(password)?;
        let created = self.db.with_transaction(cancel, |repos| -> Result<Option<User>> {
            if repos.users().count_admins()? > 0 {
                return Ok(None);
            }
            if repos.users().find_by_username(&admin.username)?.is_some() {
                return Err(Error::conflict(format!(
                    "cannot bootstrap administrator: username '{}' is taken",
                    admin.username
                )));
            }
            let user = User::new(
                admin.username.clone(),
                admin.email.clone(),
                hash,
                Role::Administrator,
            );
            Ok(Some(repos.users().create(&user)?))
        })?;

        if let Some(user) = &created {
            tracing::info!(username = %user.username, "bootstrapped administrator");
        }
        Ok(created)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BootstrapAdmin;
    use crate::db::test_support::test_db;

    #[test]
    fn test_bootstrap_admin_once() {
        let t = test_db();
        let mut config = AuthConfig::default();
        config.bootstrap_admin = BootstrapAdmin {
            password: Some("change-me-now".into()),
            ..BootstrapAdmin::default()
        };
        let auth = AuthService::with_kdf(t.db.clone(), password::test_kdf(), &config);
        let cancel = Cancellation::new();

        let admin = auth.bootstrap_admin(&cancel).unwrap().unwrap();
        assert_eq!(admin.role, Role::Administrator);
        assert!(auth.bootstrap_admin(&cancel).unwrap().is_none());

        let tokens = auth.login(&cancel, "admin", "change-me-now").unwrap();
        assert_eq!(tokens.user.id, admin.id);
    }

    #[test]
    fn test_bootstrap_without_password_is_noop() {
        let t = test_db();
        let auth = test_support::test_auth(&t.db);
        assert!(auth.bootstrap_admin(&Cancellation::new()).unwrap().is_none());
    }

    #[test]
    fn test_authenticate_dispatches_on_prefix() {
        let t = test_db();
        let auth = test_support::test_auth(&t.db);
        let cancel = Cancellation::new();
        test_support::create_user(&auth, &t.db, "alice", Role::User);

        let tokens = auth.login(&cancel, "alice", "password123").unwrap();
        let caller = auth
            .authenticate(&cancel, &format!("Bearer {}", tokens.session_token))
            .unwrap();
        assert_eq!(caller.username, "alice");
        assert!(caller.scopes.is_none());

        assert!(matches!(
            auth.authenticate(&cancel, "  "),
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            auth.authenticate(&cancel, "mcp_pat_nothing-here-at-all"),
            Err(Error::Unauthorized(_))
        ));
    }
}
