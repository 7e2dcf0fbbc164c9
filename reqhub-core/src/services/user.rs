use serde::Deserialize;
use serde_json::json;

use super::{resolve_user, Page};
use crate::auth::password::validate_password;
use crate::auth::{require, Capability, Kdf};
use crate::context::RequestContext;
use crate::db::{Database, Filter, ListOptions, OrderBy, Repos};
use crate::error::{Error, Result, ValidationError};
use crate::models::{self, Role, User};

const MAX_USERNAME_LEN: usize = 50;
const MAX_EMAIL_LEN: usize = 254;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUser {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::User
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUser {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub page: Page,
}

fn validate_username(username: &str) -> Result<String> {
    let username = username.trim();
    let valid_chars = username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN || !valid_chars {
        return Err(ValidationError::new(
            "INVALID_USERNAME",
            format!(
                "username must be 1 to {} letters, digits, '.', '_' or '-'",
                MAX_USERNAME_LEN
            ),
        )
        .field("username")
        .into());
    }
    Ok(username.to_string())
}

fn validate_email(email: &str) -> Result<String> {
    let email = email.trim();
    let well_formed = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    };
    if !well_formed || email.len() > MAX_EMAIL_LEN {
        return Err(ValidationError::new("INVALID_EMAIL", "email address is not valid")
            .field("email")
            .into());
    }
    Ok(email.to_string())
}

/// Refuses to leave the system without an administrator
fn guard_last_admin(repos: &Repos<'_>, user: &User) -> Result<()> {
    if user.role == Role::Administrator && repos.users().count_admins()? <= 1 {
        return Err(Error::conflict("the last administrator cannot be removed or demoted"));
    }
    Ok(())
}

pub struct UserService<'a> {
    db: &'a Database,
    kdf: &'a Kdf,
}

impl<'a> UserService<'a> {
    pub fn new(db: &'a Database, kdf: &'a Kdf) -> Self {
        Self { db, kdf }
    }

    pub fn create(&self, ctx: &RequestContext, input: CreateUser) -> Result<User> {
        require(&ctx.caller, Capability::ManageUsers)?;
        let username = validate_username(&input.username)?;
        let email = validate_email(&input.email)?;
        validate_password(&input.password)?;
        let hash = self.kdf.hash(&input.password)?;

        let user = self.db.with_transaction(&ctx.cancel, |repos| {
            let users = repos.users();
            if users.find_by_username(&username)?.is_some() {
                return Err(Error::conflict(format!("username '{}' is taken", username)));
            }
            if users.find_by_email(&email)?.is_some() {
                return Err(Error::conflict(format!("email '{}' is already registered", email)));
            }
            Ok(users.create(&User::new(username, email, hash, input.role))?)
        })?;
        tracing::info!(username = %user.username, role = %user.role, by = %ctx.caller.username, "user created");
        Ok(user)
    }

    /// Looks a user up by UUID or username
    pub fn get(&self, ctx: &RequestContext, id: &str) -> Result<User> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| resolve_user(repos, id))
    }

    pub fn list(&self, ctx: &RequestContext, filter: &UserFilter) -> Result<Vec<User>> {
        require(&ctx.caller, Capability::Read)?;
        let mut options = ListOptions::new();
        if let Some(role) = filter.role {
            options = options.filter(Filter::eq("role", role.as_str().to_string()));
        }
        options = options
            .order_by(OrderBy::parse(filter.order_by.as_deref().unwrap_or("username")))
            .page(filter.page.limit(), filter.page.offset());
        self.db
            .with_read(&ctx.cancel, |repos| Ok(repos.users().list(&options)?))
    }

    /// Changes email and/or role; administrators only
    pub fn update(&self, ctx: &RequestContext, id: &str, input: UpdateUser) -> Result<User> {
        require(&ctx.caller, Capability::ManageUsers)?;
        let email = input.email.as_deref().map(validate_email).transpose()?;
        let user = self.db.with_transaction(&ctx.cancel, |repos| {
            let users = repos.users();
            let mut user = resolve_user(repos, id)?;
            if let Some(email) = email {
                if let Some(other) = users.find_by_email(&email)? {
                    if other.id != user.id {
                        return Err(Error::conflict(format!("email '{}' is already registered", email)));
                    }
                }
                user.email = email;
            }
            if let Some(role) = input.role {
                if role != Role::Administrator {
                    guard_last_admin(repos, &user)?;
                }
                user.role = role;
            }
            user.updated_at = models::now();
            users.update(&user)?;
            Ok(user)
        })?;
        tracing::info!(username = %user.username, role = %user.role, by = %ctx.caller.username, "user updated");
        Ok(user)
    }

    /// Changes the caller's own password after checking the current one
    pub fn change_password(&self, ctx: &RequestContext, current: &str, new: &str) -> Result<()> {
        validate_password(new)?;
        let user = self.db.with_read(&ctx.cancel, |repos| -> Result<User> {
            Ok(repos.users().get_by_id(ctx.user_id())?)
        })?;
        if !self.kdf.verify(current, &user.password_hash) {
            return Err(Error::Unauthorized("current password is incorrect".to_string()));
        }
        let hash = self.kdf.hash(new)?;
        self.db.with_transaction(&ctx.cancel, |repos| -> Result<()> {
            let mut user = repos.users().get_by_id(user.id)?;
            user.password_hash = hash;
            user.updated_at = models::now();
            repos.users().update(&user)?;
            Ok(())
        })?;
        tracing::info!(username = %user.username, "password changed");
        Ok(())
    }

    /// Deletes an unreferenced user; their tokens and sessions go too
    pub fn delete(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        require(&ctx.caller, Capability::ManageUsers)?;
        let user = self.db.with_transaction(&ctx.cancel, |repos| {
            let user = resolve_user(repos, id)?;
            let references = repos.users().references(user.id)?;
            if !references.is_empty() {
                return Err(Error::Conflict {
                    message: format!("user '{}' is still referenced", user.username),
                    details: Some(json!({ "referenced_by": references })),
                });
            }
            guard_last_admin(repos, &user)?;
            repos.users().delete(user.id)?;
            Ok(user)
        })?;
        tracing::info!(username = %user.username, by = %ctx.caller.username, "user deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::test_kdf;
    use crate::services::epic::{CreateEpic, EpicService};
    use crate::services::test_support::fixture;

    fn new_user(username: &str, role: Role) -> CreateUser {
        CreateUser {
            username: username.into(),
            email: format!("{username}@example.com"),
            password: "correct horse".into(),
            role,
        }
    }

    #[test]
    fn test_admin_creates_users() {
        let f = fixture();
        let kdf = test_kdf();
        let service = UserService::new(&f.t.db, &kdf);

        assert!(matches!(
            service.create(&f.user_ctx(), new_user("zed", Role::User)),
            Err(Error::Forbidden(_))
        ));
        let zed = service.create(&f.ctx(&f.admin), new_user("zed", Role::Commenter)).unwrap();
        assert!(kdf.verify("correct horse", &zed.password_hash));
        assert_eq!(service.get(&f.user_ctx(), "zed").unwrap().id, zed.id);

        assert!(matches!(
            service.create(&f.ctx(&f.admin), new_user("zed", Role::User)),
            Err(Error::Conflict { .. })
        ));
        let err = service
            .create(&f.ctx(&f.admin), CreateUser { password: "short".into(), ..new_user("amy", Role::User) })
            .unwrap_err();
        assert_eq!(err.as_validation().unwrap().code, "INVALID_PASSWORD");
        let err = service
            .create(&f.ctx(&f.admin), CreateUser { email: "nope".into(), ..new_user("amy", Role::User) })
            .unwrap_err();
        assert_eq!(err.as_validation().unwrap().code, "INVALID_EMAIL");
    }

    #[test]
    fn test_change_own_password() {
        let f = fixture();
        let kdf = test_kdf();
        let service = UserService::new(&f.t.db, &kdf);
        let zed = service.create(&f.ctx(&f.admin), new_user("zed", Role::User)).unwrap();
        let ctx = f.ctx(&zed);

        assert!(matches!(
            service.change_password(&ctx, "wrong one", "new password"),
            Err(Error::Unauthorized(_))
        ));
        service.change_password(&ctx, "correct horse", "battery staple").unwrap();
        let stored = service.get(&ctx, "zed").unwrap();
        assert!(kdf.verify("battery staple", &stored.password_hash));
    }

    #[test]
    fn test_delete_referenced_user_conflicts() {
        let f = fixture();
        let kdf = test_kdf();
        let service = UserService::new(&f.t.db, &kdf);
        EpicService::new(&f.t.db)
            .create(&f.user_ctx(), CreateEpic { title: "Auth".into(), ..CreateEpic::default() })
            .unwrap();

        match service.delete(&f.ctx(&f.admin), "uma") {
            Err(Error::Conflict { details: Some(details), .. }) => {
                assert_eq!(details["referenced_by"][0], "epics.creator_id");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        service.delete(&f.ctx(&f.admin), "cleo").unwrap();
        assert!(matches!(service.get(&f.user_ctx(), "cleo"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_last_admin_is_protected() {
        let f = fixture();
        let kdf = test_kdf();
        let service = UserService::new(&f.t.db, &kdf);
        let admin = f.ctx(&f.admin);

        assert!(matches!(
            service.update(&admin, "root", UpdateUser { role: Some(Role::User), ..UpdateUser::default() }),
            Err(Error::Conflict { .. })
        ));
        assert!(matches!(service.delete(&admin, "root"), Err(Error::Conflict { .. })));

        let promoted = service
            .update(&admin, "uma", UpdateUser { role: Some(Role::Administrator), ..UpdateUser::default() })
            .unwrap();
        assert_eq!(promoted.role, Role::Administrator);
        service
            .update(&admin, "root", UpdateUser { role: Some(Role::User), email: Some("root@corp.example".into()) })
            .unwrap();
    }

    #[test]
    fn test_list_by_role() {
        let f = fixture();
        let kdf = test_kdf();
        let service = UserService::new(&f.t.db, &kdf);
        let filter = UserFilter { role: Some(Role::Commenter), ..UserFilter::default() };
        let found = service.list(&f.user_ctx(), &filter).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].username, "cleo");
        assert_eq!(service.list(&f.user_ctx(), &UserFilter::default()).unwrap().len(), 3);
    }
}
