mod cli;
mod prompts;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Parser;
use colored::Colorize;
use serde::Serialize;
use std::env;
use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use reqhub_core::auth::CreatePat;
use reqhub_core::services::search::SearchQuery;
use reqhub_core::services::user::{CreateUser, UpdateUser, UserFilter};
use reqhub_core::{
    Caller, Cancellation, Config, DependencyReport, DeletionResult, EntityType, Hub, RequestContext,
    StartupReport, User,
};

use crate::cli::{Cli, Command, Kind, TokenCommand, UserCommand};

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match &cli.command {
        Command::Init => {
            let (_hub, report) = Hub::open(config)?;
            print_startup(&report);
        }
        Command::BootstrapAdmin { username, email } => {
            bootstrap_admin(config, username.clone(), email.clone())?;
        }
        command => {
            let (hub, _) = Hub::open(config)?;
            let ctx = operator_context(&hub, &cli)?;
            run(&hub, &ctx, &cli, command)?;
            hub.auth().flush_touches();
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("REQHUB_LOG").unwrap_or_else(|_| EnvFilter::new("reqhub=info,warn"));
    let format = env::var("REQHUB_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// The caller every command runs as: a PAT holder, or a named local user
fn operator_context(hub: &Hub, cli: &Cli) -> Result<RequestContext> {
    let cancel = Cancellation::new();
    if let Some(token) = &cli.token {
        let caller = hub
            .auth()
            .authenticate(&cancel, token)
            .context("Token rejected")?;
        return Ok(RequestContext::with_cancellation(caller, cancel));
    }

    let username = cli
        .as_user
        .clone()
        .unwrap_or_else(|| hub.config().auth.bootstrap_admin.username.clone());
    let user = hub
        .db()
        .with_read(&cancel, |repos| -> reqhub_core::Result<Option<User>> {
            Ok(repos.users().find_by_username(&username)?)
        })?
        .with_context(|| {
            format!(
                "No user named '{}'. Run `reqhub bootstrap-admin` or pass --as",
                username
            )
        })?;
    Ok(RequestContext::with_cancellation(Caller::from_user(&user), cancel))
}

fn run(hub: &Hub, ctx: &RequestContext, cli: &Cli, command: &Command) -> Result<()> {
    match command {
        Command::Init | Command::BootstrapAdmin { .. } => unreachable!("handled before opening a context"),
        Command::User(user_cmd) => handle_user_command(hub, ctx, cli.json, user_cmd),
        Command::Token(token_cmd) => handle_token_command(hub, ctx, cli.json, token_cmd),
        Command::Sweep => {
            let report = hub.auth().sweep_expired(&ctx.cancel)?;
            if cli.json {
                return print_json(&report);
            }
            println!(
                "{} {} sessions, {} refresh tokens, {} personal access tokens",
                "Removed".green(),
                report.sessions,
                report.refresh_tokens,
                report.personal_access_tokens
            );
            Ok(())
        }
        Command::Search {
            query,
            types,
            limit,
            offset,
        } => {
            let input = SearchQuery {
                query: query.clone(),
                entity_types: (!types.is_empty())
                    .then(|| types.iter().map(|k| EntityType::from(*k)).collect()),
                limit: *limit,
                offset: *offset,
            };
            let hits = hub.search().search(ctx, &input)?;
            if cli.json {
                return print_json(&hits);
            }
            if hits.is_empty() {
                println!("No matches.");
            }
            for hit in hits {
                println!(
                    "{:<10} {:<20} {}",
                    hit.reference_id.green(),
                    hit.entity_type.to_string().blue(),
                    hit.title
                );
            }
            Ok(())
        }
        Command::Deps { kind, id } => {
            let report = dependency_report(hub, ctx, *kind, id)?;
            if cli.json {
                return print_json(&report);
            }
            print_report(&report);
            Ok(())
        }
        Command::Delete {
            kind,
            id,
            force,
            yes,
        } => {
            if !yes {
                let report = dependency_report(hub, ctx, *kind, id)?;
                print_report(&report);
                let question = if *force && report.has_dependents() {
                    format!("Delete {} and everything listed above?", report.reference_id)
                } else {
                    format!("Delete {}?", report.reference_id)
                };
                if !prompts::confirm(&question)? {
                    println!("Cancelled.");
                    return Ok(());
                }
            }
            let result = delete_entity(hub, ctx, *kind, id, *force)?;
            if cli.json {
                return print_json(&result);
            }
            println!(
                "{} {} ({} rows)",
                "Deleted".green(),
                result.reference_id,
                result.deleted.total()
            );
            Ok(())
        }
        Command::Export { epic, output } => {
            let hierarchy = hub.epics().complete_hierarchy(ctx, epic)?;
            let content = serde_json::to_string_pretty(&hierarchy)?;
            match output {
                Some(path) => {
                    fs::write(path, content)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("{} {}", "Exported to".green(), path.display());
                }
                None => println!("{}", content),
            }
            Ok(())
        }
        Command::Tools { name } => {
            match name {
                Some(name) => {
                    let tool = reqhub_core::find_tool(name)?;
                    print_json(tool)?;
                }
                None if cli.json => print_json(&reqhub_core::catalog())?,
                None => {
                    for tool in reqhub_core::catalog() {
                        println!("{:<30} {}", tool.name.green(), tool.title);
                    }
                }
            }
            Ok(())
        }
    }
}

fn dependency_report(hub: &Hub, ctx: &RequestContext, kind: Kind, id: &str) -> Result<DependencyReport> {
    let report = match kind {
        Kind::Epic => hub.epics().validate_deletion(ctx, id)?,
        Kind::Story => hub.user_stories().validate_deletion(ctx, id)?,
        Kind::Criteria => hub.acceptance_criteria().validate_deletion(ctx, id)?,
        Kind::Requirement => hub.requirements().validate_deletion(ctx, id)?,
    };
    Ok(report)
}

fn delete_entity(hub: &Hub, ctx: &RequestContext, kind: Kind, id: &str, force: bool) -> Result<DeletionResult> {
    let result = match kind {
        Kind::Epic => hub.epics().delete(ctx, id, force)?,
        Kind::Story => hub.user_stories().delete(ctx, id, force)?,
        Kind::Criteria => hub.acceptance_criteria().delete(ctx, id, force)?,
        Kind::Requirement => hub.requirements().delete(ctx, id, force)?,
    };
    Ok(result)
}

fn print_report(report: &DependencyReport) {
    println!("{}: {} ({})", "Entity".blue(), report.reference_id, report.entity_type);
    if !report.has_dependents() {
        println!("No dependents.");
        return;
    }
    let sections = [
        ("User stories", &report.user_stories),
        ("Acceptance criteria", &report.acceptance_criteria),
        ("Requirements", &report.requirements),
    ];
    for (label, entries) in sections {
        if entries.is_empty() {
            continue;
        }
        println!("{}:", label.blue());
        for entry in entries {
            println!("  {:<10} {}", entry.reference_id, entry.title);
        }
    }
    if !report.relationships.is_empty() {
        println!("{}: {}", "Relationships".blue(), report.relationships.len());
    }
}

fn print_startup(report: &StartupReport) {
    let seeded = &report.seeded;
    if seeded.is_empty() {
        println!("{}", "Schema up to date; defaults already present.".green());
    } else {
        println!(
            "{} {} requirement types, {} relationship types, {} status models",
            "Seeded".green(),
            seeded.requirement_types,
            seeded.relationship_types,
            seeded.status_models
        );
    }
    for drift in &report.drift {
        println!(
            "{} {} status model is missing: {}",
            "Warning:".yellow(),
            drift.entity_type,
            drift.missing.join(", ")
        );
    }
    if let Some(admin) = &report.bootstrapped_admin {
        println!("{} {}", "Created administrator".green(), admin);
    }
}

fn bootstrap_admin(mut config: Config, username: Option<String>, email: Option<String>) -> Result<()> {
    let admin = &mut config.auth.bootstrap_admin;
    if let Some(username) = username {
        admin.username = username;
    }
    if let Some(email) = email {
        admin.email = email;
    }
    if admin.password.is_none() {
        admin.password = Some(prompts::prompt_new_password("Administrator password:")?);
    }
    let (_hub, report) = Hub::open(config)?;
    match report.bootstrapped_admin {
        Some(name) => println!("{} {}", "Created administrator".green(), name),
        None => println!("An administrator already exists; nothing to do."),
    }
    Ok(())
}

fn handle_user_command(hub: &Hub, ctx: &RequestContext, json: bool, cmd: &UserCommand) -> Result<()> {
    let users = hub.users();
    match cmd {
        UserCommand::Add {
            username,
            email,
            role,
        } => {
            let (username, email, role) =
                prompts::prompt_user_fields(username.clone(), email.clone(), role.map(Into::into))?;
            let password = prompts::prompt_new_password("Password:")?;
            let user = users.create(
                ctx,
                CreateUser {
                    username,
                    email,
                    password,
                    role,
                },
            )?;
            if json {
                return print_json(&user);
            }
            println!("{} {} ({})", "User created:".green(), user.username, user.id);
        }
        UserCommand::List { role } => {
            let filter = UserFilter {
                role: role.map(Into::into),
                ..UserFilter::default()
            };
            let found = users.list(ctx, &filter)?;
            if json {
                return print_json(&found);
            }
            for user in found {
                println!(
                    "{:<36} {:<20} {:<14} {}",
                    user.id,
                    user.username.green(),
                    user.role,
                    user.email
                );
            }
        }
        UserCommand::Show { user } => {
            let user = users.get(ctx, user)?;
            if json {
                return print_json(&user);
            }
            println!("{}: {}", "ID".blue(), user.id);
            println!("{}: {}", "Username".blue(), user.username);
            println!("{}: {}", "Email".blue(), user.email);
            println!("{}: {}", "Role".blue(), user.role);
            println!("{}: {}", "Created".blue(), user.created_at);
            println!("{}: {}", "Modified".blue(), user.updated_at);
        }
        UserCommand::Edit { user, email, role } => {
            let updated = users.update(
                ctx,
                user,
                UpdateUser {
                    email: email.clone(),
                    role: role.map(Into::into),
                },
            )?;
            if json {
                return print_json(&updated);
            }
            println!("{} {}", "User updated:".green(), updated.username);
        }
        UserCommand::Passwd => {
            let current = prompts::prompt_current_password()?;
            let new = prompts::prompt_new_password("New password:")?;
            users.change_password(ctx, &current, &new)?;
            println!("{}", "Password changed.".green());
        }
        UserCommand::Del { user, yes } => {
            if !yes && !prompts::confirm(&format!("Delete user '{}'?", user))? {
                println!("Cancelled.");
                return Ok(());
            }
            users.delete(ctx, user)?;
            println!("{} {}", "User deleted:".green(), user);
        }
    }
    Ok(())
}

fn handle_token_command(hub: &Hub, ctx: &RequestContext, json: bool, cmd: &TokenCommand) -> Result<()> {
    let auth = hub.auth();
    match cmd {
        TokenCommand::Create { name, scopes, days } => {
            let issued = auth.create_pat(
                ctx,
                CreatePat {
                    name: name.clone(),
                    scopes: scopes.clone(),
                    expires_at: days.map(|d| Utc::now() + Duration::days(i64::from(d))),
                },
            )?;
            if json {
                return print_json(&issued);
            }
            println!("{} {} ({})", "Token created:".green(), issued.token.name, issued.token.id);
            println!("{}", "Copy it now; it will not be shown again:".yellow());
            println!("{}", issued.plaintext);
        }
        TokenCommand::List { user } => {
            let owner = match user {
                Some(user) => Some(hub.users().get(ctx, user)?.id),
                None => None,
            };
            let tokens = auth.list_pats(ctx, owner)?;
            if json {
                return print_json(&tokens);
            }
            for token in tokens {
                let expires = token
                    .expires_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                let scopes = if token.scopes.is_empty() {
                    "all".to_string()
                } else {
                    token.scopes.join(",")
                };
                println!(
                    "{:<36} {:<24} {:<16} expires {}",
                    token.id,
                    token.name.green(),
                    scopes,
                    expires
                );
            }
        }
        TokenCommand::Revoke { id } => {
            let id = Uuid::parse_str(id.trim()).context("Token id must be a UUID")?;
            auth.revoke_pat(ctx, id)?;
            println!("{} {}", "Token revoked:".green(), id);
        }
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
