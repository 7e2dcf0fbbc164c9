//! Per-request caller identity and cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::models::{Role, User};

/// A cloneable cancellation flag shared between a request and its queries
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The authenticated principal behind a request
#[derive(Debug, Clone, PartialEq)]
pub struct Caller {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    /// PAT scopes; `None` for password sessions
    pub scopes: Option<Vec<String>>,
}

impl Caller {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role,
            scopes: None,
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = Some(scopes);
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Administrator
    }
}

/// What every service call receives from the façade
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub caller: Caller,
    pub cancel: Cancellation,
}

impl RequestContext {
    pub fn new(caller: Caller) -> Self {
        Self {
            caller,
            cancel: Cancellation::new(),
        }
    }

    pub fn with_cancellation(caller: Caller, cancel: Cancellation) -> Self {
        Self { caller, cancel }
    }

    pub fn user_id(&self) -> Uuid {
        self.caller.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_shared_between_clones() {
        let cancel = Cancellation::new();
        let clone = cancel.clone();
        assert!(!clone.is_cancelled());
        cancel.cancel();
        assert!(clone.is_cancelled());
    }
}
