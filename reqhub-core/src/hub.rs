//! Process-wide handle: configuration, pool and auth, plus service accessors

use anyhow::{Context, Result};

use crate::auth::{AuthService, Kdf};
use crate::config::Config;
use crate::context::Cancellation;
use crate::db::seed::{seed_all, SeedReport};
use crate::db::Database;
use crate::services::{
    AcceptanceCriteriaService, AdminService, CommentService, EpicService, PromptService,
    RelationshipService, RequirementService, SearchService, SteeringService, UserService,
    UserStoryService,
};
use crate::status::{verify_canonical, ModelDrift};

/// What [`Hub::open`] did on the way up
#[derive(Debug, Default)]
pub struct StartupReport {
    pub seeded: SeedReport,
    pub drift: Vec<ModelDrift>,
    pub bootstrapped_admin: Option<String>,
}

pub struct Hub {
    config: Config,
    db: Database,
    auth: AuthService,
}

impl Hub {
    /// Validates `config`, opens and migrates the database, seeds defaults,
    /// checks status models and bootstraps the administrator
    pub fn open(config: Config) -> Result<(Self, StartupReport)> {
        config.validate()?;
        let db = Database::open(&config.database)?;
        let auth = AuthService::new(db.clone(), &config.auth).context("Invalid KDF parameters")?;
        Self::start(config, db, auth)
    }

    /// Like [`Hub::open`] with a caller-supplied KDF
    pub fn open_with_kdf(config: Config, kdf: Kdf) -> Result<(Self, StartupReport)> {
        config.validate()?;
        let db = Database::open(&config.database)?;
        let auth = AuthService::with_kdf(db.clone(), kdf, &config.auth);
        Self::start(config, db, auth)
    }

    fn start(config: Config, db: Database, auth: AuthService) -> Result<(Self, StartupReport)> {
        let cancel = Cancellation::new();
        let (seeded, drift) = db
            .with_transaction(&cancel, |repos| -> crate::error::Result<_> {
                let seeded = seed_all(repos)?;
                let drift = verify_canonical(repos)?;
                Ok((seeded, drift))
            })
            .context("Failed to seed defaults")?;
        let admin = auth
            .bootstrap_admin(&cancel)
            .context("Failed to bootstrap administrator")?;

        tracing::info!(dsn = %config.database.dsn, "reqhub ready");
        let report = StartupReport {
            seeded,
            drift,
            bootstrapped_admin: admin.map(|user| user.username),
        };
        Ok((Self { config, db, auth }, report))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn epics(&self) -> EpicService<'_> {
        EpicService::new(&self.db)
    }

    pub fn user_stories(&self) -> UserStoryService<'_> {
        UserStoryService::new(&self.db)
    }

    pub fn acceptance_criteria(&self) -> AcceptanceCriteriaService<'_> {
        AcceptanceCriteriaService::new(&self.db)
    }

    pub fn requirements(&self) -> RequirementService<'_> {
        RequirementService::new(&self.db)
    }

    pub fn relationships(&self) -> RelationshipService<'_> {
        RelationshipService::new(&self.db)
    }

    pub fn comments(&self) -> CommentService<'_> {
        CommentService::new(&self.db)
    }

    pub fn steering(&self) -> SteeringService<'_> {
        SteeringService::new(&self.db)
    }

    pub fn prompts(&self) -> PromptService<'_> {
        PromptService::new(&self.db)
    }

    pub fn search(&self) -> SearchService<'_> {
        SearchService::new(&self.db, &self.config.search)
    }

    pub fn users(&self) -> UserService<'_> {
        UserService::new(&self.db, self.auth.kdf())
    }

    pub fn admin(&self) -> AdminService<'_> {
        AdminService::new(&self.db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::test_kdf;
    use crate::config::BootstrapAdmin;
    use crate::context::{Caller, RequestContext};
    use crate::services::epic::CreateEpic;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.database.dsn = format!("sqlite://{}", dir.path().join("hub.db").display());
        config.auth.bootstrap_admin = BootstrapAdmin {
            password: Some("change-me-now".into()),
            ..BootstrapAdmin::default()
        };
        config
    }

    #[test]
    fn test_open_seeds_and_bootstraps_once() {
        let dir = TempDir::new().unwrap();
        let (hub, report) = Hub::open_with_kdf(config(&dir), test_kdf()).unwrap();
        assert!(report.seeded.requirement_types > 0);
        assert!(report.drift.is_empty());
        assert_eq!(report.bootstrapped_admin.as_deref(), Some("admin"));
        drop(hub);

        let (hub, report) = Hub::open_with_kdf(config(&dir), test_kdf()).unwrap();
        assert!(report.seeded.is_empty());
        assert!(report.bootstrapped_admin.is_none());

        let tokens = hub.auth().login(&Cancellation::new(), "admin", "change-me-now").unwrap();
        let ctx = RequestContext::new(Caller::from_user(&tokens.user));
        let epic = hub
            .epics()
            .create(&ctx, CreateEpic { title: "Onboarding".into(), ..CreateEpic::default() })
            .unwrap();
        assert_eq!(epic.reference_id, "EP-1");
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.database.pool_size = 0;
        assert!(Hub::open_with_kdf(config, test_kdf()).is_err());
    }
}
