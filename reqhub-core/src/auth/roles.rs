//! Role capabilities, checked at the service boundary

use serde::Serialize;
use std::fmt;

use crate::context::Caller;
use crate::error::{Error, Result, ValidationError};
use crate::models::Role;

/// Scope granting every capability of the token owner's role
pub const WILDCARD_SCOPE: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Capability {
    ManageUsers,
    ManageConfig,
    ManagePrompts,
    WriteDomain,
    Comment,
    Read,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::ManageUsers,
        Capability::ManageConfig,
        Capability::ManagePrompts,
        Capability::WriteDomain,
        Capability::Comment,
        Capability::Read,
    ];

    /// Scope string naming this capability on a PAT
    pub fn scope(&self) -> &'static str {
        match self {
            Capability::ManageUsers => "users:manage",
            Capability::ManageConfig => "config:manage",
            Capability::ManagePrompts => "prompts:manage",
            Capability::WriteDomain => "domain:write",
            Capability::Comment => "comments:write",
            Capability::Read => "read",
        }
    }

    pub fn granted_to(&self, role: Role) -> bool {
        match role {
            Role::Administrator => true,
            Role::User => matches!(
                self,
                Capability::WriteDomain | Capability::Comment | Capability::Read
            ),
            Role::Commenter => matches!(self, Capability::Comment | Capability::Read),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scope())
    }
}

/// Fails with `Forbidden` unless the caller's role and token scopes allow `cap`
pub fn require(caller: &Caller, cap: Capability) -> Result<()> {
    if !cap.granted_to(caller.role) {
        return Err(Error::Forbidden(format!(
            "role {} lacks capability {}",
            caller.role, cap
        )));
    }
    if let Some(scopes) = &caller.scopes {
        let allowed = scopes.is_empty()
            || scopes
                .iter()
                .any(|s| s == WILDCARD_SCOPE || s == cap.scope());
        if !allowed {
            return Err(Error::Forbidden(format!("token scopes do not include {}", cap)));
        }
    }
    Ok(())
}

/// Rejects scope strings that name no capability
pub fn validate_scopes(scopes: &[String]) -> Result<()> {
    for scope in scopes {
        let known = scope == WILDCARD_SCOPE || Capability::ALL.iter().any(|c| c.scope() == scope);
        if !known {
            let valid = std::iter::once(WILDCARD_SCOPE).chain(Capability::ALL.iter().map(|c| c.scope()));
            return Err(ValidationError::new("INVALID_SCOPE", format!("unknown scope '{}'", scope))
                .field("scopes")
                .valid_values(valid)
                .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn caller(role: Role) -> Caller {
        Caller {
            user_id: Uuid::new_v4(),
            username: "u".into(),
            role,
            scopes: None,
        }
    }

    #[test]
    fn test_role_matrix() {
        assert!(require(&caller(Role::Administrator), Capability::ManageUsers).is_ok());
        assert!(require(&caller(Role::User), Capability::WriteDomain).is_ok());
        assert!(matches!(
            require(&caller(Role::User), Capability::ManagePrompts),
            Err(Error::Forbidden(_))
        ));
        assert!(require(&caller(Role::Commenter), Capability::Comment).is_ok());
        assert!(require(&caller(Role::Commenter), Capability::WriteDomain).is_err());
    }

    #[test]
    fn test_scopes_narrow_role() {
        let scoped = caller(Role::Administrator).with_scopes(vec!["read".into()]);
        assert!(require(&scoped, Capability::Read).is_ok());
        assert!(require(&scoped, Capability::ManageUsers).is_err());

        let full = caller(Role::User).with_scopes(vec![]);
        assert!(require(&full, Capability::WriteDomain).is_ok());

        let wildcard = caller(Role::Commenter).with_scopes(vec!["*".into()]);
        assert!(require(&wildcard, Capability::WriteDomain).is_err());
    }

    #[test]
    fn test_validate_scopes() {
        validate_scopes(&["read".into(), "*".into()]).unwrap();
        let err = validate_scopes(&["everything".into()]).unwrap_err();
        assert_eq!(err.as_validation().unwrap().code, "INVALID_SCOPE");
    }
}
