use anyhow::Result;
use inquire::validator::Validation;
use inquire::{Confirm, Password, PasswordDisplayMode, Select, Text};

use reqhub_core::auth::password::MIN_PASSWORD_LEN;
use reqhub_core::Role;

/// Prompts for a new password twice
pub fn prompt_new_password(label: &str) -> Result<String> {
    let password = Password::new(label)
        .with_display_mode(PasswordDisplayMode::Masked)
        .with_custom_confirmation_message("Repeat password:")
        .with_custom_confirmation_error_message("The passwords don't match.")
        .with_validator(|input: &str| {
            if input.chars().count() < MIN_PASSWORD_LEN {
                Ok(Validation::Invalid(
                    format!("At least {} characters", MIN_PASSWORD_LEN).into(),
                ))
            } else {
                Ok(Validation::Valid)
            }
        })
        .prompt()?;
    Ok(password)
}

pub fn prompt_current_password() -> Result<String> {
    Ok(Password::new("Current password:")
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Masked)
        .prompt()?)
}

/// Fills in whatever the command line left out
pub fn prompt_user_fields(
    username: Option<String>,
    email: Option<String>,
    role: Option<Role>,
) -> Result<(String, String, Role)> {
    let username = match username {
        Some(u) => u,
        None => Text::new("Username:").prompt()?,
    };
    let email = match email {
        Some(e) => e,
        None => Text::new("Email:")
            .with_default(&format!("{}@localhost", username))
            .prompt()?,
    };
    let role = match role {
        Some(r) => r,
        None => {
            let options = vec![Role::User, Role::Commenter, Role::Administrator];
            Select::new("Role:", options).prompt()?
        }
    };
    Ok((username, email, role))
}

pub fn confirm(message: &str) -> Result<bool> {
    Ok(Confirm::new(message).with_default(false).prompt()?)
}
