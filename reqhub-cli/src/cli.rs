use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use reqhub_core::{EntityType, Role};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Operator tooling for the reqhub requirements service")]
pub struct Cli {
    /// Path to the YAML config file (defaults to $REQHUB_CONFIG, then the user config dir)
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Act as this user (username); defaults to the bootstrap administrator
    #[clap(long = "as", global = true)]
    pub as_user: Option<String>,

    /// Authenticate with a personal access token instead of --as
    #[clap(long, global = true, env = "REQHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Print JSON instead of tables
    #[clap(long, global = true)]
    pub json: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create or migrate the schema and seed default types and status models
    Init,

    /// Create the first administrator if none exists
    BootstrapAdmin {
        #[clap(long)]
        username: Option<String>,

        #[clap(long)]
        email: Option<String>,
    },

    /// Manage users
    #[clap(subcommand)]
    User(UserCommand),

    /// Manage personal access tokens
    #[clap(subcommand)]
    Token(TokenCommand),

    /// Remove expired sessions, refresh tokens and personal access tokens
    Sweep,

    /// Search epics, user stories, acceptance criteria and requirements
    Search {
        query: String,

        /// Restrict to these entity kinds
        #[clap(long = "type", value_enum)]
        types: Vec<Kind>,

        #[clap(long)]
        limit: Option<u32>,

        #[clap(long)]
        offset: Option<u32>,
    },

    /// Show what deleting an entity would take with it
    Deps {
        #[clap(value_enum)]
        kind: Kind,

        /// UUID or reference ID (EP-1, US-3, ...)
        id: String,
    },

    /// Delete an epic, user story, acceptance criterion or requirement
    Delete {
        #[clap(value_enum)]
        kind: Kind,

        /// UUID or reference ID
        id: String,

        /// Delete dependents too
        #[clap(long)]
        force: bool,

        /// Skip the confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },

    /// Export an epic with its stories, criteria and requirements as JSON
    Export {
        /// Epic UUID or reference ID
        epic: String,

        /// Write to this file instead of stdout
        #[clap(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// List the agent tool catalog, or show one tool's input schema
    Tools {
        name: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Create a user (prompts for missing fields)
    Add {
        #[clap(long)]
        username: Option<String>,

        #[clap(long)]
        email: Option<String>,

        #[clap(long, value_enum)]
        role: Option<RoleArg>,
    },

    /// List users
    List {
        #[clap(long, value_enum)]
        role: Option<RoleArg>,
    },

    /// Show a user by UUID or username
    Show { user: String },

    /// Change a user's email or role
    Edit {
        user: String,

        #[clap(long)]
        email: Option<String>,

        #[clap(long, value_enum)]
        role: Option<RoleArg>,
    },

    /// Change the acting user's own password
    Passwd,

    /// Delete a user that nothing references
    Del {
        user: String,

        #[clap(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum TokenCommand {
    /// Issue a token for the acting user; the secret is shown once
    Create {
        #[clap(long)]
        name: String,

        /// Restrict the token (e.g. read, write, comment); repeatable
        #[clap(long = "scope")]
        scopes: Vec<String>,

        /// Lifetime in days
        #[clap(long)]
        days: Option<u32>,
    },

    /// List tokens (administrators may pass --user)
    List {
        #[clap(long)]
        user: Option<String>,
    },

    /// Revoke a token by UUID
    Revoke { id: String },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Epic,
    Story,
    Criteria,
    Requirement,
}

impl From<Kind> for EntityType {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Epic => EntityType::Epic,
            Kind::Story => EntityType::UserStory,
            Kind::Criteria => EntityType::AcceptanceCriteria,
            Kind::Requirement => EntityType::Requirement,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleArg {
    Admin,
    User,
    Commenter,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Admin => Role::Administrator,
            RoleArg::User => Role::User,
            RoleArg::Commenter => Role::Commenter,
        }
    }
}
