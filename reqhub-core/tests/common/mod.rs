#![allow(dead_code)]

use tempfile::TempDir;

use reqhub_core::config::{BootstrapAdmin, KdfConfig};
use reqhub_core::services::epic::CreateEpic;
use reqhub_core::services::user::CreateUser;
use reqhub_core::{Caller, Cancellation, Config, Hub, RequestContext, Role};

pub const ADMIN_PASSWORD: &str = "admin-password";
pub const USER_PASSWORD: &str = "user-password";

pub struct TestHub {
    pub hub: Hub,
    pub admin: RequestContext,
    _dir: TempDir,
}

impl TestHub {
    /// Creates a user with [`USER_PASSWORD`] and returns a context acting as them
    pub fn add_user(&self, username: &str, role: Role) -> RequestContext {
        let user = self
            .hub
            .users()
            .create(
                &self.admin,
                CreateUser {
                    username: username.into(),
                    email: format!("{username}@example.com"),
                    password: USER_PASSWORD.into(),
                    role,
                },
            )
            .unwrap();
        RequestContext::new(Caller::from_user(&user))
    }

    pub fn epic(&self, ctx: &RequestContext, title: &str) -> reqhub_core::Epic {
        self.hub
            .epics()
            .create(ctx, CreateEpic { title: title.into(), ..CreateEpic::default() })
            .unwrap()
    }
}

pub fn hub() -> TestHub {
    hub_with(|_| {})
}

/// On-disk hub with cheap KDF parameters and a bootstrapped `admin`
pub fn hub_with(configure: impl FnOnce(&mut Config)) -> TestHub {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.database.dsn = format!("sqlite://{}", dir.path().join("reqhub.db").display());
    config.auth.kdf = KdfConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    };
    config.auth.bootstrap_admin = BootstrapAdmin {
        password: Some(ADMIN_PASSWORD.into()),
        ..BootstrapAdmin::default()
    };
    configure(&mut config);

    let (hub, report) = Hub::open(config).unwrap();
    assert!(report.drift.is_empty());
    let tokens = hub
        .auth()
        .login(&Cancellation::new(), "admin", ADMIN_PASSWORD)
        .unwrap();
    let admin = RequestContext::new(Caller::from_user(&tokens.user));
    TestHub {
        hub,
        admin,
        _dir: dir,
    }
}
