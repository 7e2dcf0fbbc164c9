//! Tool catalog for programmatic agents
//!
//! Every tool carries a JSON Schema for its input. The catalog is built
//! once and shared; adapters look tools up by name.

use std::sync::OnceLock;

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::models::{MAX_DESCRIPTION_LEN, MAX_TITLE_LEN};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Tool {
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl Tool {
    fn new(name: &'static str, title: &'static str, description: &'static str, input_schema: Value) -> Self {
        Self {
            name,
            title,
            description,
            input_schema,
        }
    }

    /// Names listed under the schema's `required`
    pub fn required(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

pub fn catalog() -> &'static [Tool] {
    static CATALOG: OnceLock<Vec<Tool>> = OnceLock::new();
    CATALOG.get_or_init(build_catalog)
}

pub fn find_tool(name: &str) -> Result<&'static Tool> {
    catalog()
        .iter()
        .find(|tool| tool.name == name)
        .ok_or_else(|| Error::not_found("tool", name))
}

// =========================================================================
// Schema fragments
// =========================================================================

const WORKFLOW_STATUSES: [&str; 5] = ["Backlog", "Draft", "In Progress", "Done", "Cancelled"];
const REQUIREMENT_STATUSES: [&str; 3] = ["Draft", "Active", "Obsolete"];

fn title() -> Value {
    json!({ "type": "string", "minLength": 1, "maxLength": MAX_TITLE_LEN })
}

fn description() -> Value {
    json!({ "type": "string", "maxLength": MAX_DESCRIPTION_LEN })
}

fn priority() -> Value {
    json!({
        "type": "integer",
        "minimum": 1,
        "maximum": 4,
        "description": "1 critical, 2 high, 3 medium, 4 low"
    })
}

fn statuses(values: &[&str]) -> Value {
    json!({ "type": "string", "enum": values })
}

fn uuid() -> Value {
    json!({ "type": "string", "format": "uuid" })
}

/// UUID or a reference ID such as `EP-12` (prefix matched case-insensitively)
fn id_or_reference(prefix: &str) -> Value {
    let pattern: String = prefix
        .chars()
        .map(|c| format!("[{}{}]", c.to_ascii_uppercase(), c.to_ascii_lowercase()))
        .collect();
    json!({
        "anyOf": [
            uuid(),
            { "type": "string", "pattern": format!("^{}-[0-9]+$", pattern) }
        ]
    })
}

fn object(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

fn pagination() -> (Value, Value) {
    (
        json!({ "type": "integer", "minimum": 1, "maximum": 100 }),
        json!({ "type": "integer", "minimum": 0 }),
    )
}

fn build_catalog() -> Vec<Tool> {
    let (limit, offset) = pagination();
    let mut tools = vec![
        // Epics and user stories
        Tool::new(
            "create_epic",
            "Create epic",
            "Create a new epic. Its reference ID (EP-n) is assigned automatically.",
            object(
                json!({
                    "title": title(),
                    "description": description(),
                    "priority": priority(),
                    "status": statuses(&WORKFLOW_STATUSES),
                    "assignee_id": uuid(),
                }),
                &["title"],
            ),
        ),
        Tool::new(
            "update_epic",
            "Update epic",
            "Update an epic's fields. Status changes must follow the epic workflow.",
            object(
                json!({
                    "epic_id": id_or_reference("EP"),
                    "title": title(),
                    "description": description(),
                    "priority": priority(),
                    "status": statuses(&WORKFLOW_STATUSES),
                    "assignee_id": { "type": "string", "description": "User UUID; empty string unassigns" },
                }),
                &["epic_id"],
            ),
        ),
        Tool::new(
            "create_user_story",
            "Create user story",
            "Create a user story under an epic.",
            object(
                json!({
                    "epic_id": id_or_reference("EP"),
                    "title": title(),
                    "description": description(),
                    "priority": priority(),
                    "status": statuses(&WORKFLOW_STATUSES),
                    "assignee_id": uuid(),
                }),
                &["epic_id", "title"],
            ),
        ),
        Tool::new(
            "update_user_story",
            "Update user story",
            "Update a user story's fields. Status changes must follow the user story workflow.",
            object(
                json!({
                    "user_story_id": id_or_reference("US"),
                    "title": title(),
                    "description": description(),
                    "priority": priority(),
                    "status": statuses(&WORKFLOW_STATUSES),
                    "assignee_id": { "type": "string", "description": "User UUID; empty string unassigns" },
                }),
                &["user_story_id"],
            ),
        ),
        Tool::new(
            "create_acceptance_criteria",
            "Create acceptance criteria",
            "Add an acceptance criterion to a user story.",
            object(
                json!({
                    "user_story_id": id_or_reference("US"),
                    "description": { "type": "string", "minLength": 1, "maxLength": MAX_DESCRIPTION_LEN },
                }),
                &["user_story_id", "description"],
            ),
        ),
        // Requirements
        Tool::new(
            "create_requirement",
            "Create requirement",
            "Create a requirement under a user story, optionally linked to one of its acceptance criteria.",
            object(
                json!({
                    "user_story_id": id_or_reference("US"),
                    "type_id": { "type": "string", "description": "Requirement type UUID or name" },
                    "title": title(),
                    "description": description(),
                    "priority": priority(),
                    "status": statuses(&REQUIREMENT_STATUSES),
                    "acceptance_criteria_id": id_or_reference("AC"),
                    "assignee_id": uuid(),
                }),
                &["user_story_id", "type_id", "title"],
            ),
        ),
        Tool::new(
            "update_requirement",
            "Update requirement",
            "Update a requirement's fields. Status changes must follow the requirement workflow.",
            object(
                json!({
                    "requirement_id": id_or_reference("REQ"),
                    "title": title(),
                    "description": description(),
                    "priority": priority(),
                    "status": statuses(&REQUIREMENT_STATUSES),
                    "type_id": { "type": "string" },
                    "acceptance_criteria_id": { "type": "string", "description": "AC id; empty string unlinks" },
                    "assignee_id": { "type": "string", "description": "User UUID; empty string unassigns" },
                }),
                &["requirement_id"],
            ),
        ),
        Tool::new(
            "create_relationship",
            "Create relationship",
            "Create a typed, directed relationship between two distinct requirements.",
            object(
                json!({
                    "source_requirement_id": id_or_reference("REQ"),
                    "target_requirement_id": id_or_reference("REQ"),
                    "relationship_type": {
                        "type": "string",
                        "description": "Relationship type UUID or name, e.g. depends_on"
                    },
                }),
                &["source_requirement_id", "target_requirement_id", "relationship_type"],
            ),
        ),
        // Search
        Tool::new(
            "search_global",
            "Search everything",
            "Full-text search across epics, user stories, acceptance criteria and requirements.",
            object(
                json!({
                    "query": { "type": "string", "minLength": 1 },
                    "entity_types": {
                        "type": "array",
                        "items": {
                            "type": "string",
                            "enum": ["epic", "user_story", "acceptance_criteria", "requirement"]
                        }
                    },
                    "limit": limit.clone(),
                    "offset": offset.clone(),
                }),
                &["query"],
            ),
        ),
        Tool::new(
            "search_requirements",
            "Search requirements",
            "Full-text search restricted to requirements.",
            object(
                json!({
                    "query": { "type": "string", "minLength": 1 },
                    "limit": limit.clone(),
                    "offset": offset.clone(),
                }),
                &["query"],
            ),
        ),
    ];

    tools.extend(steering_tools(&limit, &offset));
    tools.extend(prompt_tools(&limit, &offset));
    tools
}

fn steering_tools(limit: &Value, offset: &Value) -> Vec<Tool> {
    vec![
        Tool::new(
            "list_steering_documents",
            "List steering documents",
            "List steering documents, optionally by creator.",
            object(
                json!({
                    "creator_id": uuid(),
                    "order_by": { "type": "string" },
                    "limit": limit,
                    "offset": offset,
                }),
                &[],
            ),
        ),
        Tool::new(
            "create_steering_document",
            "Create steering document",
            "Create a steering document (STD-n).",
            object(json!({ "title": title(), "description": description() }), &["title"]),
        ),
        Tool::new(
            "get_steering_document",
            "Get steering document",
            "Fetch a steering document by UUID or reference ID.",
            object(json!({ "steering_document_id": id_or_reference("STD") }), &["steering_document_id"]),
        ),
        Tool::new(
            "update_steering_document",
            "Update steering document",
            "Update a steering document's title or description.",
            object(
                json!({
                    "steering_document_id": id_or_reference("STD"),
                    "title": title(),
                    "description": description(),
                }),
                &["steering_document_id"],
            ),
        ),
        Tool::new(
            "link_steering_to_epic",
            "Link steering document",
            "Link a steering document to an epic.",
            object(
                json!({
                    "epic_id": id_or_reference("EP"),
                    "steering_document_id": id_or_reference("STD"),
                }),
                &["epic_id", "steering_document_id"],
            ),
        ),
        Tool::new(
            "unlink_steering_from_epic",
            "Unlink steering document",
            "Remove the link between a steering document and an epic.",
            object(
                json!({
                    "epic_id": id_or_reference("EP"),
                    "steering_document_id": id_or_reference("STD"),
                }),
                &["epic_id", "steering_document_id"],
            ),
        ),
        Tool::new(
            "get_epic_steering_documents",
            "Epic steering documents",
            "List the steering documents linked to an epic.",
            object(json!({ "epic_id": id_or_reference("EP") }), &["epic_id"]),
        ),
    ]
}

fn prompt_tools(limit: &Value, offset: &Value) -> Vec<Tool> {
    let name = json!({ "type": "string", "minLength": 1, "maxLength": 100 });
    let content = json!({ "type": "string", "minLength": 1, "maxLength": MAX_DESCRIPTION_LEN });
    vec![
        Tool::new(
            "create_prompt",
            "Create prompt",
            "Create an inactive prompt (PROMPT-n). Administrators only.",
            object(
                json!({
                    "name": name,
                    "title": title(),
                    "description": description(),
                    "content": content,
                }),
                &["name", "title", "content"],
            ),
        ),
        Tool::new(
            "update_prompt",
            "Update prompt",
            "Update a prompt's fields. The active flag is left unchanged. Administrators only.",
            object(
                json!({
                    "prompt_id": id_or_reference("PROMPT"),
                    "name": name,
                    "title": title(),
                    "description": description(),
                    "content": content,
                }),
                &["prompt_id"],
            ),
        ),
        Tool::new(
            "delete_prompt",
            "Delete prompt",
            "Delete a prompt. Administrators only.",
            object(json!({ "prompt_id": id_or_reference("PROMPT") }), &["prompt_id"]),
        ),
        Tool::new(
            "activate_prompt",
            "Activate prompt",
            "Make a prompt the single active prompt. Administrators only.",
            object(json!({ "prompt_id": id_or_reference("PROMPT") }), &["prompt_id"]),
        ),
        Tool::new(
            "list_prompts",
            "List prompts",
            "List prompts in creation order.",
            object(json!({ "limit": limit, "offset": offset }), &[]),
        ),
        Tool::new(
            "get_active_prompt",
            "Get active prompt",
            "Return the active prompt, if any.",
            object(json!({}), &[]),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_has_every_tool_once() {
        let names: HashSet<&str> = catalog().iter().map(|t| t.name).collect();
        assert_eq!(names.len(), 23);
        assert_eq!(catalog().len(), 23);
        for name in ["create_epic", "link_steering_to_epic", "get_active_prompt", "create_acceptance_criteria"] {
            assert!(names.contains(name), "{name}");
        }
    }

    #[test]
    fn test_find_tool() {
        let tool = find_tool("create_requirement").unwrap();
        assert_eq!(tool.required(), ["user_story_id", "type_id", "title"]);
        assert!(matches!(find_tool("drop_database"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_schema_constraints() {
        let epic = find_tool("create_epic").unwrap();
        let props = &epic.input_schema["properties"];
        assert_eq!(props["title"]["maxLength"], 500);
        assert_eq!(props["description"]["maxLength"], 50000);
        assert_eq!(props["priority"]["maximum"], 4);
        assert_eq!(props["status"]["enum"][2], "In Progress");

        let update = find_tool("update_requirement").unwrap();
        let id = &update.input_schema["properties"]["requirement_id"]["anyOf"];
        assert_eq!(id[0]["format"], "uuid");
        assert_eq!(id[1]["pattern"], "^[Rr][Ee][Qq]-[0-9]+$");
    }

    #[test]
    fn test_serializes_with_input_schema_key() {
        let value = serde_json::to_value(find_tool("list_prompts").unwrap()).unwrap();
        assert!(value.get("inputSchema").is_some());
        assert_eq!(value["name"], "list_prompts");
    }
}
