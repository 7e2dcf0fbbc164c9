//! Password login, refresh rotation, logout and the expiry sweep

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::tokens::{generate_secret, hash_secret};
use super::AuthService;
use crate::context::{Caller, Cancellation};
use crate::db::Repos;
use crate::error::{Error, Result};
use crate::models::{self, RefreshToken, Session, User};

/// Credentials handed out at login and on refresh
#[derive(Debug, Clone, Serialize)]
pub struct LoginTokens {
    pub user: User,
    pub session_token: String,
    pub session_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Rows removed by [`AuthService::sweep_expired`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub sessions: u64,
    pub refresh_tokens: u64,
    pub personal_access_tokens: u64,
}

fn invalid_login() -> Error {
    Error::Unauthorized("invalid username or password".to_string())
}

fn ttl(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1_000))
}

impl AuthService {
    pub fn login(&self, cancel: &Cancellation, username: &str, password: &str) -> Result<LoginTokens> {
        let user = self.db.with_read(cancel, |repos| -> Result<Option<User>> {
            Ok(repos.users().find_by_username(username.trim())?)
        })?;

        // Verify outside any transaction; the KDF is the slow part
        let verified = match &user {
            Some(user) => self.kdf.verify(password, &user.password_hash),
            None => self.kdf.dummy_verify(password),
        };
        let user = match user {
            Some(user) if verified => user,
            _ => {
                tracing::debug!(username = %username.trim(), "login rejected");
                return Err(invalid_login());
            }
        };

        let tokens = self
            .db
            .with_transaction(cancel, |repos| self.issue(repos, user))?;
        tracing::info!(username = %tokens.user.username, "user logged in");
        Ok(tokens)
    }

    fn issue(&self, repos: &Repos<'_>, user: User) -> Result<LoginTokens> {
        let now = models::now();
        let session_token = generate_secret();
        let refresh_token = generate_secret();
        let session = Session {
            id: Uuid::new_v4(),
            user_id: user.id,
            token_hash: hash_secret(&session_token),
            expires_at: now + ttl(self.config.session_ttl_secs),
            created_at: now,
        };
        let refresh = RefreshToken {
            id: Uuid::new_v4(),
            user_id: user.id,
            token_hash: hash_secret(&refresh_token),
            expires_at: now + ttl(self.config.refresh_ttl_secs),
            last_used_at: None,
            created_at: now,
        };
        let credentials = repos.credentials();
        credentials.insert_session(&session)?;
        credentials.insert_refresh(&refresh)?;

        Ok(LoginTokens {
            user,
            session_token,
            session_expires_at: session.expires_at,
            refresh_token,
            refresh_expires_at: refresh.expires_at,
        })
    }

    /// Exchanges a refresh token for a new pair; the presented token is spent
    pub fn refresh(&self, cancel: &Cancellation, refresh_token: &str) -> Result<LoginTokens> {
        let unauthorized = || Error::Unauthorized("invalid refresh token".to_string());
        let hash = hash_secret(refresh_token.trim());
        self.db.with_transaction(cancel, |repos| {
            let credentials = repos.credentials();
            let stored = credentials
                .find_refresh_by_hash(&hash)?
                .ok_or_else(unauthorized)?;
            if stored.expires_at <= models::now() {
                return Err(Error::Unauthorized("refresh token expired".to_string()));
            }
            credentials.delete_refresh(stored.id)?;
            let user = repos
                .users()
                .find_by_id(stored.user_id)?
                .ok_or_else(unauthorized)?;
            self.issue(repos, user)
        })
    }

    /// Revokes every session and refresh token of `user_id`
    pub fn logout(&self, cancel: &Cancellation, user_id: Uuid) -> Result<u64> {
        let revoked = self.db.with_transaction(cancel, |repos| -> Result<u64> {
            let credentials = repos.credentials();
            Ok(credentials.delete_refresh_by_user(user_id)?
                + credentials.delete_sessions_by_user(user_id)?)
        })?;
        tracing::info!(%user_id, revoked, "user logged out");
        Ok(revoked)
    }

    pub fn authenticate_session(&self, cancel: &Cancellation, token: &str) -> Result<Caller> {
        let unauthorized = || Error::Unauthorized("invalid session token".to_string());
        let hash = hash_secret(token.trim());
        self.db.with_read(cancel, |repos| {
            let session = repos
                .credentials()
                .find_session_by_hash(&hash)?
                .ok_or_else(unauthorized)?;
            if session.expires_at <= models::now() {
                return Err(Error::Unauthorized("session expired".to_string()));
            }
            let user = repos
                .users()
                .find_by_id(session.user_id)?
                .ok_or_else(unauthorized)?;
            Ok(Caller::from_user(&user))
        })
    }

    /// Deletes expired sessions, refresh tokens and personal access tokens
    pub fn sweep_expired(&self, cancel: &Cancellation) -> Result<SweepReport> {
        let now = models::now();
        let report = self.db.with_transaction(cancel, |repos| -> Result<SweepReport> {
            let credentials = repos.credentials();
            Ok(SweepReport {
                sessions: credentials.delete_expired_sessions(now)?,
                refresh_tokens: credentials.delete_expired_refresh(now)?,
                personal_access_tokens: repos.tokens().delete_expired(now)?,
            })
        })?;
        if report != SweepReport::default() {
            tracing::info!(
                sessions = report.sessions,
                refresh_tokens = report.refresh_tokens,
                personal_access_tokens = report.personal_access_tokens,
                "swept expired credentials"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_support::{create_user, test_auth};
    use crate::db::test_support::test_db;
    use crate::models::Role;

    #[test]
    fn test_login_rejects_bad_credentials() {
        let t = test_db();
        let auth = test_auth(&t.db);
        let cancel = Cancellation::new();
        create_user(&auth, &t.db, "bob", Role::User);

        assert!(matches!(
            auth.login(&cancel, "bob", "wrong-password"),
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            auth.login(&cancel, "nobody", "password123"),
            Err(Error::Unauthorized(_))
        ));
        auth.login(&cancel, " bob ", "password123").unwrap();
    }

    #[test]
    fn test_refresh_rotates() {
        let t = test_db();
        let auth = test_auth(&t.db);
        let cancel = Cancellation::new();
        create_user(&auth, &t.db, "carol", Role::User);

        let first = auth.login(&cancel, "carol", "password123").unwrap();
        let second = auth.refresh(&cancel, &first.refresh_token).unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        assert!(matches!(
            auth.refresh(&cancel, &first.refresh_token),
            Err(Error::Unauthorized(_))
        ));
        auth.refresh(&cancel, &second.refresh_token).unwrap();
    }

    #[test]
    fn test_logout_revokes_everything() {
        let t = test_db();
        let auth = test_auth(&t.db);
        let cancel = Cancellation::new();
        let user = create_user(&auth, &t.db, "dave", Role::User);

        let tokens = auth.login(&cancel, "dave", "password123").unwrap();
        auth.authenticate_session(&cancel, &tokens.session_token).unwrap();

        assert_eq!(auth.logout(&cancel, user.id).unwrap(), 2);
        assert!(auth.authenticate_session(&cancel, &tokens.session_token).is_err());
        assert!(auth.refresh(&cancel, &tokens.refresh_token).is_err());
    }

    #[test]
    fn test_sweep_removes_expired_rows() {
        let t = test_db();
        let auth = test_auth(&t.db);
        let cancel = Cancellation::new();
        let user = create_user(&auth, &t.db, "erin", Role::User);

        let past = models::now() - Duration::hours(1);
        let inserted: Result<()> = t.db.with_transaction(&cancel, |repos| {
            repos.credentials().insert_session(&Session {
                id: Uuid::new_v4(),
                user_id: user.id,
                token_hash: hash_secret("old-session"),
                expires_at: past,
                created_at: past,
            })?;
            repos.credentials().insert_refresh(&RefreshToken {
                id: Uuid::new_v4(),
                user_id: user.id,
                token_hash: hash_secret("old-refresh"),
                expires_at: past,
                last_used_at: None,
                created_at: past,
            })?;
            Ok(())
        });
        inserted.unwrap();
        auth.login(&cancel, "erin", "password123").unwrap();

        let report = auth.sweep_expired(&cancel).unwrap();
        assert_eq!(report.sessions, 1);
        assert_eq!(report.refresh_tokens, 1);
        assert_eq!(auth.sweep_expired(&cancel).unwrap(), SweepReport::default());
    }
}
