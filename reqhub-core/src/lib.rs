pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod deletion;
pub mod error;
pub mod hub;
pub mod models;
pub mod services;
pub mod status;
pub mod tools;

// Re-export commonly used types
pub use auth::{AuthService, Capability, IssuedToken, Kdf, LoginTokens, SweepReport};
pub use config::{AuthConfig, Config, DatabaseConfig, SearchConfig};
pub use context::{Caller, Cancellation, RequestContext};
pub use db::{Database, ReferenceIdStrategy, RepoError};
pub use deletion::{DeletedCounts, DeletionResult, DependencyReport};
pub use error::{Error, ErrorKind, ErrorResponse, Result, ValidationError};
pub use hub::{Hub, StartupReport};
pub use models::{
    AcceptanceCriteria, Comment, EntityType, Epic, Priority, Prompt, RelationshipType, Requirement,
    RequirementRelationship, RequirementStatus, RequirementType, Role, SteeringDocument, User,
    UserStory, WorkflowStatus,
};
pub use services::Page;
pub use tools::{catalog, find_tool, Tool};
