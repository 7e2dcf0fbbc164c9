//! Caller-supplied status strings to canonical values

use crate::error::ValidationError;
use crate::models::{canonical_status_names, EntityType, RequirementStatus, WorkflowStatus};

/// Folds case, separators and the `canceled` spelling into one key
fn fold(input: &str) -> String {
    let key: String = input
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect();
    if key == "canceled" {
        "cancelled".to_string()
    } else {
        key
    }
}

fn invalid(entity_type: EntityType, input: &str) -> ValidationError {
    ValidationError::new(
        "INVALID_STATUS",
        format!("'{}' is not a valid {} status", input.trim(), entity_type),
    )
    .field("status")
    .valid_values(canonical_status_names(entity_type).iter().copied())
}

/// Canonical status name for `entity_type`, or a validation error listing valid values
pub fn canonical_status(entity_type: EntityType, input: &str) -> Result<&'static str, ValidationError> {
    let key = fold(input);
    canonical_status_names(entity_type)
        .iter()
        .copied()
        .find(|name| fold(name) == key)
        .ok_or_else(|| invalid(entity_type, input))
}

pub fn parse_workflow_status(
    entity_type: EntityType,
    input: &str,
) -> Result<WorkflowStatus, ValidationError> {
    let name = canonical_status(entity_type, input)?;
    WorkflowStatus::from_canonical(name).ok_or_else(|| invalid(entity_type, input))
}

pub fn parse_requirement_status(input: &str) -> Result<RequirementStatus, ValidationError> {
    let name = canonical_status(EntityType::Requirement, input)?;
    RequirementStatus::from_canonical(name).ok_or_else(|| invalid(EntityType::Requirement, input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_in_progress_variants() {
        for input in ["in progress", "InProgress", "in_progress", "IN-PROGRESS", " In Progress "] {
            assert_eq!(
                parse_workflow_status(EntityType::Epic, input).unwrap(),
                WorkflowStatus::InProgress,
                "{input}"
            );
        }
    }

    #[test]
    fn test_cancelled_spellings() {
        assert_eq!(
            parse_workflow_status(EntityType::UserStory, "Canceled").unwrap(),
            WorkflowStatus::Cancelled
        );
        assert_eq!(
            parse_workflow_status(EntityType::UserStory, "cancelled").unwrap(),
            WorkflowStatus::Cancelled
        );
    }

    #[test]
    fn test_unknown_status_lists_valid_values() {
        let err = parse_requirement_status("Done").unwrap_err();
        assert_eq!(err.code, "INVALID_STATUS");
        assert_eq!(
            err.valid_values.unwrap(),
            vec!["Draft".to_string(), "Active".into(), "Obsolete".into()]
        );
        assert!(parse_workflow_status(EntityType::Epic, "Active").is_err());
    }

    fn scramble(name: &'static str) -> impl Strategy<Value = String> {
        proptest::collection::vec(any::<bool>(), name.len()).prop_map(move |upper| {
            name.chars()
                .zip(upper)
                .map(|(c, up)| match (c, up) {
                    (' ', true) => '_',
                    (c, true) => c.to_ascii_uppercase(),
                    (c, false) => c.to_ascii_lowercase(),
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn test_any_casing_normalizes(
            (name, input) in prop::sample::select(canonical_status_names(EntityType::Epic).to_vec())
                .prop_flat_map(|name| (Just(name), scramble(name)))
        ) {
            prop_assert_eq!(canonical_status(EntityType::Epic, &input).unwrap(), name);
        }

        #[test]
        fn test_normalization_is_idempotent(input in "[A-Za-z _-]{0,16}") {
            if let Ok(name) = canonical_status(EntityType::Requirement, &input) {
                prop_assert_eq!(canonical_status(EntityType::Requirement, name).unwrap(), name);
            }
        }
    }
}
