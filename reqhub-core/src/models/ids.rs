//! Identifiers shared by every entity: entity kinds, reference-ID
//! prefixes, and the parsing rules for "UUID or reference" inputs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The entity kinds that carry comments, status models and search entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Epic,
    UserStory,
    AcceptanceCriteria,
    Requirement,
}

impl EntityType {
    /// All entity types, in hierarchy order
    pub const ALL: [EntityType; 4] = [
        EntityType::Epic,
        EntityType::UserStory,
        EntityType::AcceptanceCriteria,
        EntityType::Requirement,
    ];

    /// Stable storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Epic => "epic",
            EntityType::UserStory => "user_story",
            EntityType::AcceptanceCriteria => "acceptance_criteria",
            EntityType::Requirement => "requirement",
        }
    }

    /// The reference prefix used by this entity type
    pub fn prefix(&self) -> ReferencePrefix {
        match self {
            EntityType::Epic => ReferencePrefix::Epic,
            EntityType::UserStory => ReferencePrefix::UserStory,
            EntityType::AcceptanceCriteria => ReferencePrefix::AcceptanceCriteria,
            EntityType::Requirement => ReferencePrefix::Requirement,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "epic" | "epics" => Ok(EntityType::Epic),
            "user_story" | "user_stories" | "userstory" => Ok(EntityType::UserStory),
            "acceptance_criteria" | "acceptance_criterion" | "acceptancecriteria" => {
                Ok(EntityType::AcceptanceCriteria)
            }
            "requirement" | "requirements" => Ok(EntityType::Requirement),
            other => Err(format!("unknown entity type '{}'", other)),
        }
    }
}

/// Prefixes of human-readable reference IDs (`EP-42`, `REQ-7`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferencePrefix {
    #[serde(rename = "EP")]
    Epic,
    #[serde(rename = "US")]
    UserStory,
    #[serde(rename = "AC")]
    AcceptanceCriteria,
    #[serde(rename = "REQ")]
    Requirement,
    #[serde(rename = "STD")]
    SteeringDocument,
    #[serde(rename = "PROMPT")]
    Prompt,
}

impl ReferencePrefix {
    pub const ALL: [ReferencePrefix; 6] = [
        ReferencePrefix::Epic,
        ReferencePrefix::UserStory,
        ReferencePrefix::AcceptanceCriteria,
        ReferencePrefix::Requirement,
        ReferencePrefix::SteeringDocument,
        ReferencePrefix::Prompt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferencePrefix::Epic => "EP",
            ReferencePrefix::UserStory => "US",
            ReferencePrefix::AcceptanceCriteria => "AC",
            ReferencePrefix::Requirement => "REQ",
            ReferencePrefix::SteeringDocument => "STD",
            ReferencePrefix::Prompt => "PROMPT",
        }
    }

    /// Formats a reference ID with a numeric suffix
    pub fn format(&self, number: u64) -> String {
        format!("{}-{}", self.as_str(), number)
    }

    fn from_upper(s: &str) -> Option<Self> {
        ReferencePrefix::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

impl fmt::Display for ReferencePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed reference ID in canonical (uppercase) form
///
/// The grammar is `^(EP|US|AC|REQ|STD|PROMPT)-\d+$`, matched
/// case-insensitively. Allocation under heavy contention may fall back to
/// an 8-hex-digit suffix; [`ReferenceId::parse_lenient`] accepts those too.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceId {
    prefix: ReferencePrefix,
    suffix: String,
}

impl ReferenceId {
    /// Parses a strict reference ID (numeric suffix only)
    pub fn parse(input: &str) -> Option<Self> {
        let parsed = Self::parse_lenient(input)?;
        if parsed.suffix.chars().all(|c| c.is_ascii_digit()) {
            Some(parsed)
        } else {
            None
        }
    }

    /// Parses a reference ID whose suffix may also be hexadecimal
    pub fn parse_lenient(input: &str) -> Option<Self> {
        let (prefix, suffix) = input.trim().split_once('-')?;
        let prefix = ReferencePrefix::from_upper(&prefix.to_ascii_uppercase())?;
        if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self {
            prefix,
            suffix: suffix.to_ascii_uppercase(),
        })
    }

    pub fn prefix(&self) -> ReferencePrefix {
        self.prefix
    }

    /// Numeric suffix, if the reference was densely allocated
    pub fn number(&self) -> Option<u64> {
        if self.suffix.chars().all(|c| c.is_ascii_digit()) {
            self.suffix.parse().ok()
        } else {
            None
        }
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.prefix.as_str(), self.suffix)
    }
}

/// An identifier supplied by a caller: either a UUID or a reference ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdOrRef {
    Id(Uuid),
    /// The raw reference text, as typed by the caller
    Reference(String),
}

impl IdOrRef {
    /// Classifies caller input, checking the reference prefix when present
    pub fn parse(input: &str, expected: ReferencePrefix) -> Result<Self, String> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err("identifier must not be empty".to_string());
        }
        if let Ok(id) = Uuid::parse_str(trimmed) {
            return Ok(IdOrRef::Id(id));
        }
        match ReferenceId::parse_lenient(trimmed) {
            Some(reference) if reference.prefix() == expected => {
                Ok(IdOrRef::Reference(trimmed.to_string()))
            }
            Some(reference) => Err(format!(
                "expected a {} reference, got {}",
                expected.as_str(),
                reference
            )),
            None => Err(format!(
                "'{}' is neither a UUID nor a {}-<n> reference",
                trimmed,
                expected.as_str()
            )),
        }
    }
}

/// Priority levels, ordinal 1 (Critical) through 4 (Low)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    Critical = 1,
    High = 2,
    Medium = 3,
    Low = 4,
}

impl Priority {
    pub fn as_i64(&self) -> i64 {
        *self as i64
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Priority::Critical),
            2 => Ok(Priority::High),
            3 => Ok(Priority::Medium),
            4 => Ok(Priority::Low),
            other => Err(format!("priority must be between 1 and 4, got {}", other)),
        }
    }
}

impl TryFrom<i64> for Priority {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| format!("priority must be between 1 and 4, got {}", value))
            .and_then(Priority::try_from)
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> u8 {
        p as u8
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Critical => write!(f, "Critical"),
            Priority::High => write!(f, "High"),
            Priority::Medium => write!(f, "Medium"),
            Priority::Low => write!(f, "Low"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_id_canonicalizes_case() {
        let r = ReferenceId::parse("req-12").unwrap();
        assert_eq!(r.to_string(), "REQ-12");
        assert_eq!(r.prefix(), ReferencePrefix::Requirement);
        assert_eq!(r.number(), Some(12));

        let r = ReferenceId::parse("Prompt-3").unwrap();
        assert_eq!(r.to_string(), "PROMPT-3");
    }

    #[test]
    fn test_reference_id_rejects_bad_grammar() {
        assert!(ReferenceId::parse("XX-1").is_none());
        assert!(ReferenceId::parse("EP-").is_none());
        assert!(ReferenceId::parse("EP1").is_none());
        assert!(ReferenceId::parse("EP-1a").is_none());
        assert!(ReferenceId::parse_lenient("REQ-1a2b3c4d").is_some());
    }

    #[test]
    fn test_id_or_ref_checks_prefix() {
        let id = Uuid::new_v4();
        assert_eq!(
            IdOrRef::parse(&id.to_string(), ReferencePrefix::Epic).unwrap(),
            IdOrRef::Id(id)
        );
        assert_eq!(
            IdOrRef::parse("ep-1", ReferencePrefix::Epic).unwrap(),
            IdOrRef::Reference("ep-1".to_string())
        );
        let err = IdOrRef::parse("US-1", ReferencePrefix::Epic).unwrap_err();
        assert!(err.contains("expected a EP reference"));
        assert!(IdOrRef::parse("", ReferencePrefix::Epic).is_err());
    }

    #[test]
    fn test_priority_bounds() {
        assert_eq!(Priority::try_from(1u8).unwrap(), Priority::Critical);
        assert_eq!(Priority::try_from(4u8).unwrap(), Priority::Low);
        assert!(Priority::try_from(0u8).is_err());
        assert!(Priority::try_from(5u8).is_err());

        let p: Priority = serde_json::from_str("2").unwrap();
        assert_eq!(p, Priority::High);
        assert_eq!(serde_json::to_string(&Priority::Low).unwrap(), "4");
        assert!(serde_json::from_str::<Priority>("9").is_err());
    }

    #[test]
    fn test_entity_type_parse() {
        assert_eq!("user-story".parse::<EntityType>().unwrap(), EntityType::UserStory);
        assert_eq!("Requirement".parse::<EntityType>().unwrap(), EntityType::Requirement);
        assert!("task".parse::<EntityType>().is_err());
    }
}
