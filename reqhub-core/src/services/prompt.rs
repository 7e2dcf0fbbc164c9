use serde::Deserialize;
use uuid::Uuid;

use super::{resolve, validate_body, validate_description, validate_title, Page};
use crate::auth::{require, Capability};
use crate::context::RequestContext;
use crate::db::{Database, ListOptions, OrderBy};
use crate::error::{Error, Result, ValidationError};
use crate::models::{self, Prompt};

const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePrompt {
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePrompt {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::new(
            "INVALID_NAME",
            format!("prompt name must be 1 to {} characters", MAX_NAME_LEN),
        )
        .field("name")
        .into());
    }
    Ok(name.to_string())
}

fn name_taken(name: &str) -> Error {
    Error::conflict(format!("a prompt named '{}' already exists", name))
}

pub struct PromptService<'a> {
    db: &'a Database,
}

impl<'a> PromptService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(&self, ctx: &RequestContext, input: CreatePrompt) -> Result<Prompt> {
        require(&ctx.caller, Capability::ManagePrompts)?;
        let now = models::now();
        let prompt = Prompt {
            id: Uuid::new_v4(),
            reference_id: String::new(),
            name: validate_name(&input.name)?,
            title: validate_title("title", &input.title)?,
            description: validate_description("description", input.description)?,
            content: validate_body("content", &input.content)?,
            creator_id: ctx.user_id(),
            is_active: false,
            created_at: now,
            updated_at: now,
        };
        let prompt = self.db.with_transaction(&ctx.cancel, |repos| {
            let prompts = repos.prompts();
            if prompts.find_by_name(&prompt.name)?.is_some() {
                return Err(name_taken(&prompt.name));
            }
            Ok(prompts.create_with_reference(&prompt)?)
        })?;
        tracing::info!(reference_id = %prompt.reference_id, name = %prompt.name, "prompt created");
        Ok(prompt)
    }

    pub fn get(&self, ctx: &RequestContext, id: &str) -> Result<Prompt> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| resolve(repos, "id", id))
    }

    pub fn update(&self, ctx: &RequestContext, id: &str, input: UpdatePrompt) -> Result<Prompt> {
        require(&ctx.caller, Capability::ManagePrompts)?;
        self.db.with_transaction(&ctx.cancel, |repos| {
            let prompts = repos.prompts();
            let mut prompt: Prompt = resolve(repos, "id", id)?;
            if let Some(name) = &input.name {
                let name = validate_name(name)?;
                if name != prompt.name {
                    if prompts.find_by_name(&name)?.is_some() {
                        return Err(name_taken(&name));
                    }
                    prompt.name = name;
                }
            }
            if let Some(title) = &input.title {
                prompt.title = validate_title("title", title)?;
            }
            if input.description.is_some() {
                prompt.description = validate_description("description", input.description.clone())?;
            }
            if let Some(content) = &input.content {
                prompt.content = validate_body("content", content)?;
            }
            prompt.updated_at = models::now();
            prompts.update(&prompt)?;
            Ok(prompt)
        })
    }

    pub fn delete(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        require(&ctx.caller, Capability::ManagePrompts)?;
        let prompt = self.db.with_transaction(&ctx.cancel, |repos| -> Result<Prompt> {
            let prompt: Prompt = resolve(repos, "id", id)?;
            repos.prompts().delete(prompt.id)?;
            Ok(prompt)
        })?;
        tracing::info!(reference_id = %prompt.reference_id, "prompt deleted");
        Ok(())
    }

    pub fn list(&self, ctx: &RequestContext, page: Page) -> Result<Vec<Prompt>> {
        require(&ctx.caller, Capability::Read)?;
        let options = ListOptions::new()
            .order_by(OrderBy::asc("created_at"))
            .page(page.limit(), page.offset());
        self.db
            .with_read(&ctx.cancel, |repos| Ok(repos.prompts().list(&options)?))
    }

    /// Makes `id` the only active prompt
    pub fn activate(&self, ctx: &RequestContext, id: &str) -> Result<Prompt> {
        require(&ctx.caller, Capability::ManagePrompts)?;
        let prompt = self.db.with_transaction(&ctx.cancel, |repos| -> Result<Prompt> {
            let prompt: Prompt = resolve(repos, "id", id)?;
            repos.prompts().activate(prompt.id)?;
            Ok(repos.prompts().get_by_id(prompt.id)?)
        })?;
        tracing::info!(reference_id = %prompt.reference_id, name = %prompt.name, "prompt activated");
        Ok(prompt)
    }

    pub fn get_active(&self, ctx: &RequestContext) -> Result<Prompt> {
        require(&ctx.caller, Capability::Read)?;
        self.db.with_read(&ctx.cancel, |repos| {
            repos
                .prompts()
                .find_active()?
                .ok_or_else(|| Error::NotFound("no prompt is active".to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::fixture;

    fn prompt(name: &str) -> CreatePrompt {
        CreatePrompt {
            name: name.into(),
            title: format!("{name} prompt"),
            description: None,
            content: "You are a requirements analyst.".into(),
        }
    }

    #[test]
    fn test_only_admin_manages_prompts() {
        let f = fixture();
        let service = PromptService::new(&f.t.db);
        assert!(matches!(service.create(&f.user_ctx(), prompt("p1")), Err(Error::Forbidden(_))));
        let created = service.create(&f.ctx(&f.admin), prompt("p1")).unwrap();
        assert_eq!(created.reference_id, "PROMPT-1");
        assert!(!created.is_active);
        assert_eq!(service.get(&f.user_ctx(), "prompt-1").unwrap().id, created.id);
    }

    #[test]
    fn test_activation_is_exclusive() {
        let f = fixture();
        let admin = f.ctx(&f.admin);
        let service = PromptService::new(&f.t.db);
        service.create(&admin, prompt("p1")).unwrap();
        let p2 = service.create(&admin, prompt("p2")).unwrap();

        assert!(matches!(service.get_active(&admin), Err(Error::NotFound(_))));
        service.activate(&admin, "PROMPT-1").unwrap();
        service.activate(&admin, "PROMPT-2").unwrap();

        let active: Vec<_> = service
            .list(&admin, Page::default())
            .unwrap()
            .into_iter()
            .filter(|p| p.is_active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, p2.id);
        assert_eq!(service.get_active(&f.user_ctx()).unwrap().id, p2.id);
    }

    #[test]
    fn test_update_keeps_active_flag_and_rejects_taken_name() {
        let f = fixture();
        let admin = f.ctx(&f.admin);
        let service = PromptService::new(&f.t.db);
        service.create(&admin, prompt("p1")).unwrap();
        service.create(&admin, prompt("p2")).unwrap();
        service.activate(&admin, "PROMPT-1").unwrap();

        let updated = service
            .update(&admin, "PROMPT-1", UpdatePrompt { content: Some("Be terse.".into()), ..UpdatePrompt::default() })
            .unwrap();
        assert!(updated.is_active);
        assert!(matches!(
            service.update(&admin, "PROMPT-1", UpdatePrompt { name: Some("p2".into()), ..UpdatePrompt::default() }),
            Err(Error::Conflict { .. })
        ));
        assert!(matches!(service.create(&admin, prompt("p2")), Err(Error::Conflict { .. })));

        service.delete(&admin, "PROMPT-2").unwrap();
        assert_eq!(service.list(&admin, Page::default()).unwrap().len(), 1);
    }
}
