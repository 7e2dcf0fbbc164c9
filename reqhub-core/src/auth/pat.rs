//! Personal access tokens
//!
//! Plaintext form is `{pat_prefix}{secret}`. The stored `prefix` column
//! holds only the scheme prefix; the secret survives solely as its SHA-256
//! digest, and authentication compares the presented digest against every
//! token issued under the scheme.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::roles::{self, Capability};
use super::tokens::{digests_match, generate_secret, hash_secret};
use super::AuthService;
use crate::context::{Caller, Cancellation, RequestContext};
use crate::error::{Error, Result, ValidationError};
use crate::models::{self, PersonalAccessToken, User};

const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePat {
    pub name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// A freshly created token; the plaintext is never retrievable again
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    #[serde(flatten)]
    pub token: PersonalAccessToken,
    pub plaintext: String,
}

fn invalid_token() -> Error {
    Error::Unauthorized("invalid personal access token".to_string())
}

impl AuthService {
    pub fn create_pat(&self, ctx: &RequestContext, input: CreatePat) -> Result<IssuedToken> {
        let name = input.name.trim().to_string();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(ValidationError::new(
                "INVALID_NAME",
                format!("token name must be 1 to {} characters", MAX_NAME_LEN),
            )
            .field("name")
            .into());
        }
        roles::validate_scopes(&input.scopes)?;
        let now = models::now();
        if matches!(input.expires_at, Some(at) if at <= now) {
            return Err(ValidationError::new("INVALID_EXPIRY", "expires_at must be in the future")
                .field("expires_at")
                .into());
        }

        let secret = generate_secret();
        let token = PersonalAccessToken {
            id: Uuid::new_v4(),
            user_id: ctx.user_id(),
            name,
            token_hash: hash_secret(&secret),
            prefix: self.config.pat_prefix.clone(),
            scopes: input.scopes,
            expires_at: input.expires_at,
            last_used_at: None,
            created_at: now,
        };

        let token = self.db.with_transaction(&ctx.cancel, |repos| {
            let tokens = repos.tokens();
            if tokens.find_by_user_and_name(token.user_id, &token.name)?.is_some() {
                return Err(Error::conflict(format!(
                    "a token named '{}' already exists",
                    token.name
                )));
            }
            Ok(tokens.create(&token)?)
        })?;

        tracing::info!(user = %ctx.caller.username, name = %token.name, "personal access token issued");
        Ok(IssuedToken {
            plaintext: format!("{}{}", self.config.pat_prefix, secret),
            token,
        })
    }

    /// Tokens owned by `user_id`, or by the caller when `None`
    pub fn list_pats(&self, ctx: &RequestContext, user_id: Option<Uuid>) -> Result<Vec<PersonalAccessToken>> {
        let owner = user_id.unwrap_or(ctx.user_id());
        if owner != ctx.user_id() {
            roles::require(&ctx.caller, Capability::ManageUsers)?;
        }
        self.db.with_read(&ctx.cancel, |repos| Ok(repos.tokens().list_by_user(owner)?))
    }

    pub fn get_pat(&self, ctx: &RequestContext, id: Uuid) -> Result<PersonalAccessToken> {
        let token = self
            .db
            .with_read(&ctx.cancel, |repos| -> Result<PersonalAccessToken> {
                Ok(repos.tokens().get_by_id(id)?)
            })?;
        if token.user_id != ctx.user_id() && !ctx.caller.is_admin() {
            return Err(Error::not_found("personal access token", id));
        }
        Ok(token)
    }

    /// Deletes a token; allowed for its owner and administrators
    pub fn revoke_pat(&self, ctx: &RequestContext, id: Uuid) -> Result<()> {
        let token = self.db.with_transaction(&ctx.cancel, |repos| {
            let tokens = repos.tokens();
            let token = tokens.get_by_id(id)?;
            if token.user_id != ctx.user_id() && !ctx.caller.is_admin() {
                return Err(Error::Forbidden(
                    "only the owner or an administrator may revoke a token".to_string(),
                ));
            }
            tokens.delete(id)?;
            Ok(token)
        })?;
        tracing::info!(user = %ctx.caller.username, name = %token.name, "personal access token revoked");
        Ok(())
    }

    /// Authenticates a presented `{prefix}{secret}` token
    pub fn authenticate_pat(&self, cancel: &Cancellation, presented: &str) -> Result<Caller> {
        let secret = presented
            .trim()
            .strip_prefix(&self.config.pat_prefix)
            .ok_or_else(invalid_token)?;
        if secret.is_empty() {
            return Err(invalid_token());
        }
        let presented_hash = hash_secret(secret);
        let now = models::now();

        let (token, user) = self.db.with_read(cancel, |repos| -> Result<(PersonalAccessToken, User)> {
            let mut found = None;
            // Every candidate is compared; no early exit on a match
            for candidate in repos.tokens().list_by_prefix(&self.config.pat_prefix)? {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                if digests_match(&candidate.token_hash, &presented_hash) && found.is_none() {
                    found = Some(candidate);
                }
            }
            let token = found.ok_or_else(invalid_token)?;
            if token.is_expired(now) {
                return Err(Error::Unauthorized("personal access token expired".to_string()));
            }
            let user = repos
                .users()
                .find_by_id(token.user_id)?
                .ok_or_else(invalid_token)?;
            Ok((token, user))
        })?;

        self.touch.touch(token.id, now);
        Ok(Caller::from_user(&user).with_scopes(token.scopes))
    }
}
