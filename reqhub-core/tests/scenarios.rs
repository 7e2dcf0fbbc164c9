//! End-to-end flows through the service layer

mod common;

use common::TestHub;
use reqhub_core::auth::CreatePat;
use reqhub_core::models::Includes;
use reqhub_core::services::acceptance_criteria::CreateAcceptanceCriteria;
use reqhub_core::services::epic::CreateEpic;
use reqhub_core::services::prompt::CreatePrompt;
use reqhub_core::services::requirement::CreateRequirement;
use reqhub_core::services::search::SearchQuery;
use reqhub_core::services::user_story::CreateUserStory;
use reqhub_core::{
    EntityType, Error, Page, Priority, RequestContext, RequirementStatus, Role,
};

/// Builds EP-1 / US-1 / AC-1 / REQ-1 as a regular user
fn build_hierarchy(t: &TestHub) -> RequestContext {
    let ctx = t.add_user("uma", Role::User);
    let hub = &t.hub;

    let epic = hub
        .epics()
        .create(
            &ctx,
            CreateEpic {
                title: "Auth".into(),
                priority: Some(2),
                ..CreateEpic::default()
            },
        )
        .unwrap();
    assert_eq!(epic.reference_id, "EP-1");
    assert_eq!(epic.priority, Priority::High);

    let story = hub
        .user_stories()
        .create(
            &ctx,
            CreateUserStory {
                epic_id: "EP-1".into(),
                title: "Login".into(),
                priority: Some(3),
                ..CreateUserStory::default()
            },
        )
        .unwrap();
    assert_eq!(story.reference_id, "US-1");
    assert_eq!(story.epic_id, epic.id);

    let ac = hub
        .acceptance_criteria()
        .create(
            &ctx,
            CreateAcceptanceCriteria {
                user_story_id: "US-1".into(),
                description: "WHEN valid credentials are submitted THEN a session is issued".into(),
            },
        )
        .unwrap();
    assert_eq!(ac.reference_id, "AC-1");

    let requirement = hub
        .requirements()
        .create(
            &ctx,
            CreateRequirement {
                user_story_id: "US-1".into(),
                type_id: "Functional".into(),
                title: "Password login".into(),
                acceptance_criteria_id: Some("AC-1".into()),
                ..CreateRequirement::default()
            },
        )
        .unwrap();
    assert_eq!(requirement.reference_id, "REQ-1");
    assert_eq!(requirement.acceptance_criteria_id, Some(ac.id));
    assert_eq!(requirement.status, RequirementStatus::Draft);
    ctx
}

#[test]
fn test_create_hierarchy_assigns_references() {
    let t = common::hub();
    let ctx = build_hierarchy(&t);

    let detail = t
        .hub
        .requirements()
        .get(&ctx, "req-1", &Includes::parse_csv("type,creator"))
        .unwrap();
    assert_eq!(detail.requirement_type.unwrap().name, "Functional");
    assert_eq!(detail.creator.unwrap().username, "uma");
}

#[test]
fn test_requirement_status_transitions() {
    let t = common::hub();
    let ctx = build_hierarchy(&t);
    let requirements = t.hub.requirements();

    let err = requirements.change_status(&ctx, "REQ-1", "Done").unwrap_err();
    assert_eq!(err.kind().code(), "VALIDATION");
    assert_eq!(
        err.as_validation().unwrap().valid_values.clone().unwrap(),
        vec!["Active".to_string()]
    );

    let active = requirements.change_status(&ctx, "REQ-1", "Active").unwrap();
    assert_eq!(active.status, RequirementStatus::Active);
}

#[test]
fn test_epic_deletion_needs_force() {
    let t = common::hub();
    let ctx = build_hierarchy(&t);
    let epics = t.hub.epics();

    let report = epics.validate_deletion(&ctx, "EP-1").unwrap();
    let stories: Vec<&str> = report.user_stories.iter().map(|s| s.reference_id.as_str()).collect();
    assert_eq!(stories, ["US-1"]);

    match epics.delete(&ctx, "EP-1", false) {
        Err(Error::Conflict { details: Some(details), .. }) => {
            assert_eq!(details["user_stories"][0]["reference_id"], "US-1");
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    let result = epics.delete(&ctx, "EP-1", true).unwrap();
    let deleted = serde_json::to_value(result.deleted).unwrap();
    assert_eq!(
        deleted,
        serde_json::json!({
            "epics": 1,
            "user_stories": 1,
            "acceptance_criteria": 1,
            "requirements": 1
        })
    );
    assert!(matches!(
        epics.get(&ctx, "EP-1", &Includes::none()),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn test_personal_access_token_lifecycle() {
    let t = common::hub();
    let ctx = t.add_user("ci-owner", Role::User);
    let auth = t.hub.auth();

    let issued = auth
        .create_pat(&ctx, CreatePat { name: "ci".into(), ..CreatePat::default() })
        .unwrap();
    assert!(issued.plaintext.starts_with("mcp_pat_"));

    let caller = auth.authenticate(&ctx.cancel, &issued.plaintext).unwrap();
    assert_eq!(caller.user_id, ctx.user_id());

    auth.revoke_pat(&ctx, issued.token.id).unwrap();
    assert!(matches!(
        auth.authenticate(&ctx.cancel, &issued.plaintext),
        Err(Error::Unauthorized(_))
    ));
    assert_eq!(
        auth.authenticate(&ctx.cancel, &issued.plaintext).unwrap_err().kind().http_status(),
        401
    );
}

#[test]
fn test_activating_prompt_deactivates_previous() {
    let t = common::hub();
    let prompts = t.hub.prompts();
    for name in ["p1", "p2"] {
        prompts
            .create(
                &t.admin,
                CreatePrompt {
                    name: name.into(),
                    title: name.to_uppercase(),
                    description: None,
                    content: "Review the requirement for ambiguity.".into(),
                },
            )
            .unwrap();
    }
    prompts.activate(&t.admin, "PROMPT-1").unwrap();
    let p2 = prompts.activate(&t.admin, "PROMPT-2").unwrap();

    let listed = prompts.list(&t.admin, Page::default()).unwrap();
    let active: Vec<_> = listed.iter().filter(|p| p.is_active).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, p2.id);
}

#[test]
fn test_global_search() {
    let t = common::hub();
    let ctx = build_hierarchy(&t);
    let search = t.hub.search();

    let hits = search.search(&ctx, &SearchQuery::new("Login")).unwrap();
    assert!(hits.iter().any(|h| h.reference_id == "US-1"), "{hits:?}");

    let hits = search
        .search(&ctx, &SearchQuery::new("login").of_types(&[EntityType::Requirement]))
        .unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.entity_type == EntityType::Requirement));
}
