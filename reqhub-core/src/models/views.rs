//! Eager-loaded views of the planning entities
//!
//! `Includes` is parsed from caller-supplied tokens; unknown tokens are
//! ignored. The complete epic hierarchy has a fixed shape and is not
//! driven by includes.

use serde::Serialize;
use std::collections::HashSet;

use super::comment::Comment;
use super::planning::{
    AcceptanceCriteria, Epic, Requirement, RequirementType, SteeringDocument, UserStory,
};
use super::user::User;

/// An eager-load token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Include {
    Creator,
    Assignee,
    UserStories,
    AcceptanceCriteria,
    Requirements,
    Comments,
    Type,
    Epic,
}

impl Include {
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "creator" => Some(Include::Creator),
            "assignee" => Some(Include::Assignee),
            "user_stories" => Some(Include::UserStories),
            "acceptance_criteria" => Some(Include::AcceptanceCriteria),
            "requirements" => Some(Include::Requirements),
            "comments" => Some(Include::Comments),
            "type" => Some(Include::Type),
            "epic" => Some(Include::Epic),
            _ => None,
        }
    }
}

/// A whitelisted set of eager-load tokens
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Includes(HashSet<Include>);

impl Includes {
    pub fn none() -> Self {
        Self::default()
    }

    /// Parses tokens, silently dropping anything outside the whitelist
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Self {
        Self(tokens.iter().filter_map(|t| Include::parse(t.as_ref())).collect())
    }

    /// Parses a comma-separated token list (`?include=creator,comments`)
    pub fn parse_csv(csv: &str) -> Self {
        let tokens: Vec<&str> = csv.split(',').collect();
        Self::parse(&tokens)
    }

    pub fn of(items: &[Include]) -> Self {
        Self(items.iter().copied().collect())
    }

    pub fn contains(&self, include: Include) -> bool {
        self.0.contains(&include)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EpicDetail {
    #[serde(flatten)]
    pub epic: Epic,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_stories: Option<Vec<UserStory>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<Comment>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStoryDetail {
    #[serde(flatten)]
    pub user_story: UserStory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epic: Option<Epic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria: Option<Vec<AcceptanceCriteria>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Vec<Requirement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<Comment>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptanceCriteriaDetail {
    #[serde(flatten)]
    pub acceptance_criteria: AcceptanceCriteria,
    /// The author, loaded by the `creator` token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Vec<Requirement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<Comment>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequirementDetail {
    #[serde(flatten)]
    pub requirement: Requirement,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<User>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub requirement_type: Option<RequirementType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria: Option<AcceptanceCriteria>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<Comment>>,
}

/// A requirement with its type always loaded
#[derive(Debug, Clone, Serialize)]
pub struct RequirementWithType {
    #[serde(flatten)]
    pub requirement: Requirement,
    #[serde(rename = "type")]
    pub requirement_type: RequirementType,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStoryHierarchy {
    #[serde(flatten)]
    pub user_story: UserStory,
    pub requirements: Vec<RequirementWithType>,
    pub acceptance_criteria: Vec<AcceptanceCriteria>,
}

/// The complete, fixed-shape hierarchy below an epic
#[derive(Debug, Clone, Serialize)]
pub struct EpicHierarchy {
    #[serde(flatten)]
    pub epic: Epic,
    pub steering_documents: Vec<SteeringDocument>,
    pub user_stories: Vec<UserStoryHierarchy>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_include_tokens_are_ignored() {
        let includes = Includes::parse(&["creator", "bogus", "COMMENTS", ""]);
        assert!(includes.contains(Include::Creator));
        assert!(includes.contains(Include::Comments));
        assert!(!includes.contains(Include::Assignee));
        assert_eq!(includes, Includes::of(&[Include::Creator, Include::Comments]));
    }

    #[test]
    fn test_parse_csv() {
        let includes = Includes::parse_csv("type, epic,,nope");
        assert!(includes.contains(Include::Type));
        assert!(includes.contains(Include::Epic));
        assert!(!includes.is_empty());
        assert!(Includes::parse_csv("nope").is_empty());
    }
}
