use std::collections::HashSet;

use serde::Deserialize;

use super::Page;
use crate::auth::{require, Capability};
use crate::config::SearchConfig;
use crate::context::RequestContext;
use crate::db::repos::SearchHit;
use crate::db::{Database, RepoError, Repos};
use crate::error::{Result, ValidationError};
use crate::models::EntityType;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchQuery {
    pub query: String,
    /// Defaults to every entity type
    #[serde(default)]
    pub entity_types: Option<Vec<EntityType>>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

impl SearchQuery {
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            ..Self::default()
        }
    }

    pub fn of_types(mut self, types: &[EntityType]) -> Self {
        self.entity_types = Some(types.to_vec());
        self
    }
}

pub struct SearchService<'a> {
    db: &'a Database,
    config: &'a SearchConfig,
}

impl<'a> SearchService<'a> {
    pub fn new(db: &'a Database, config: &'a SearchConfig) -> Self {
        Self { db, config }
    }

    /// Ranked full-text search, falling back to substring matching
    pub fn search(&self, ctx: &RequestContext, input: &SearchQuery) -> Result<Vec<SearchHit>> {
        require(&ctx.caller, Capability::Read)?;
        let query = input.query.trim();
        if query.is_empty() {
            return Err(ValidationError::new("REQUIRED", "query is required")
                .field("query")
                .into());
        }
        let mut types: Vec<EntityType> = match &input.entity_types {
            Some(types) if !types.is_empty() => types.clone(),
            _ => EntityType::ALL.to_vec(),
        };
        let mut seen = HashSet::new();
        types.retain(|t| seen.insert(*t));
        let page = Page {
            limit: input.limit,
            offset: input.offset,
        };
        let limit = page.limit_within(self.config.max_limit);
        let offset = page.offset();

        self.db.with_read(&ctx.cancel, |repos| -> Result<Vec<SearchHit>> {
            if self.config.full_text {
                if let Some(hits) = self.full_text(repos, query, &types, limit, offset)? {
                    return Ok(hits);
                }
            }
            Ok(repos.search().substring(query, &types, limit, offset)?)
        })
    }

    /// Requirements only
    pub fn search_requirements(&self, ctx: &RequestContext, query: &str, page: Page) -> Result<Vec<SearchHit>> {
        let input = SearchQuery {
            query: query.to_string(),
            entity_types: Some(vec![EntityType::Requirement]),
            limit: page.limit,
            offset: page.offset,
        };
        self.search(ctx, &input)
    }

    /// `None` when the substring path should answer instead
    fn full_text(
        &self,
        repos: &Repos<'_>,
        query: &str,
        types: &[EntityType],
        limit: u32,
        offset: u32,
    ) -> Result<Option<Vec<SearchHit>>> {
        match repos.search().full_text(query, types, limit, offset) {
            Ok(hits) => Ok(hits),
            Err(RepoError::Cancelled) => Err(RepoError::Cancelled.into()),
            Err(err) => {
                tracing::debug!(error = %err, query, "full-text search failed, using substring match");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::epic::{CreateEpic, EpicService};
    use crate::services::requirement::{CreateRequirement, RequirementService};
    use crate::services::test_support::{fixture, Fixture};
    use crate::services::user_story::{CreateUserStory, UserStoryService};

    fn setup(f: &Fixture) {
        let ctx = f.user_ctx();
        EpicService::new(&f.t.db)
            .create(&ctx, CreateEpic { title: "Auth".into(), ..CreateEpic::default() })
            .unwrap();
        UserStoryService::new(&f.t.db)
            .create(&ctx, CreateUserStory { epic_id: "EP-1".into(), title: "Login".into(), ..CreateUserStory::default() })
            .unwrap();
        RequirementService::new(&f.t.db)
            .create(
                &ctx,
                CreateRequirement {
                    user_story_id: "US-1".into(),
                    type_id: "Functional".into(),
                    title: "Login rate limiting".into(),
                    description: Some("Lock out after 5 failed attempts".into()),
                    ..CreateRequirement::default()
                },
            )
            .unwrap();
    }

    fn refs(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.reference_id.as_str()).collect()
    }

    #[test]
    fn test_search_defaults_to_all_types() {
        let f = fixture();
        setup(&f);
        let config = SearchConfig::default();
        let service = SearchService::new(&f.t.db, &config);
        let hits = service.search(&f.user_ctx(), &SearchQuery::new("Login")).unwrap();
        assert!(refs(&hits).contains(&"US-1"), "{hits:?}");
        assert!(refs(&hits).contains(&"REQ-1"), "{hits:?}");
    }

    #[test]
    fn test_search_restricted_to_requirements() {
        let f = fixture();
        setup(&f);
        let config = SearchConfig::default();
        let service = SearchService::new(&f.t.db, &config);
        let hits = service
            .search(&f.user_ctx(), &SearchQuery::new("login").of_types(&[EntityType::Requirement]))
            .unwrap();
        assert_eq!(refs(&hits), vec!["REQ-1"]);
        assert!(hits.iter().all(|h| h.entity_type == EntityType::Requirement));
    }

    #[test]
    fn test_substring_fallback() {
        let f = fixture();
        setup(&f);
        let config = SearchConfig {
            full_text: false,
            ..SearchConfig::default()
        };
        let service = SearchService::new(&f.t.db, &config);
        let hits = service.search(&f.user_ctx(), &SearchQuery::new("ATE LIM")).unwrap();
        assert_eq!(refs(&hits), vec!["REQ-1"]);
        let hits = service.search(&f.user_ctx(), &SearchQuery::new("us-1")).unwrap();
        assert_eq!(refs(&hits), vec!["US-1"]);
    }

    #[test]
    fn test_repeated_types_return_each_hit_once() {
        let f = fixture();
        setup(&f);
        let types = [EntityType::Epic, EntityType::Requirement, EntityType::Epic];
        for full_text in [false, true] {
            let config = SearchConfig { full_text, ..SearchConfig::default() };
            let service = SearchService::new(&f.t.db, &config);
            let hits = service
                .search(&f.user_ctx(), &SearchQuery::new("Auth").of_types(&types))
                .unwrap();
            assert_eq!(refs(&hits), vec!["EP-1"], "full_text={full_text}");
        }
    }

    #[test]
    fn test_empty_query_and_limit_clamp() {
        let f = fixture();
        setup(&f);
        let config = SearchConfig { max_limit: 1, ..SearchConfig::default() };
        let service = SearchService::new(&f.t.db, &config);
        assert!(service.search(&f.user_ctx(), &SearchQuery::new("  ")).is_err());
        let hits = service
            .search(&f.user_ctx(), &SearchQuery { limit: Some(500), ..SearchQuery::new("Login") })
            .unwrap();
        assert_eq!(hits.len(), 1);
    }
}
