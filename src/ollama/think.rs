//! Thinking switch for reasoning models: either on/off or an effort level.
//!
//! On the wire the option is a raw JSON boolean (`"think": true`) or a raw string
//! (`"think": "high"`), never an object.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const ALLOWED_LEVELS: [&str; 3] = ["low", "medium", "high"];

/// A validated thinking effort level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ThinkLevel(String);

impl ThinkLevel {
    pub fn new(level: impl Into<String>) -> Result<Self> {
        let level = level.into();
        if !ALLOWED_LEVELS.contains(&level.as_str()) {
            return Err(Error::validation_with_context(
                format!("think level must be one of {:?}, got: {}", ALLOWED_LEVELS, level),
                ErrorContext::new().with_field_path("think"),
            ));
        }
        Ok(Self(level))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ThinkLevel {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ThinkLevel> for String {
    fn from(level: ThinkLevel) -> Self {
        level.0
    }
}

impl fmt::Display for ThinkLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThinkOption {
    Bool(bool),
    Level(ThinkLevel),
}

impl ThinkOption {
    pub const ENABLED: ThinkOption = ThinkOption::Bool(true);
    pub const DISABLED: ThinkOption = ThinkOption::Bool(false);

    pub fn low() -> Self {
        ThinkOption::Level(ThinkLevel("low".to_string()))
    }

    pub fn medium() -> Self {
        ThinkOption::Level(ThinkLevel("medium".to_string()))
    }

    pub fn high() -> Self {
        ThinkOption::Level(ThinkLevel("high".to_string()))
    }

    pub fn level(level: impl Into<String>) -> Result<Self> {
        Ok(ThinkOption::Level(ThinkLevel::new(level)?))
    }

    /// Parse a user-supplied value: empty means unset, `true`/`false` toggle thinking and
    /// anything else must be a level.
    pub fn parse(value: &str) -> Result<Option<Self>> {
        let value = value.trim();
        match value {
            "" => Ok(None),
            "true" => Ok(Some(ThinkOption::ENABLED)),
            "false" => Ok(Some(ThinkOption::DISABLED)),
            level => ThinkOption::level(level).map(Some),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, ThinkOption::Bool(false))
    }
}

impl From<bool> for ThinkOption {
    fn from(enabled: bool) -> Self {
        ThinkOption::Bool(enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_as_raw_values() {
        assert_eq!(serde_json::to_value(ThinkOption::ENABLED).unwrap(), json!(true));
        assert_eq!(serde_json::to_value(ThinkOption::high()).unwrap(), json!("high"));
    }

    #[test]
    fn test_deserializes_and_validates() {
        let think: ThinkOption = serde_json::from_value(json!("medium")).unwrap();
        assert_eq!(think, ThinkOption::medium());
        let think: ThinkOption = serde_json::from_value(json!(false)).unwrap();
        assert_eq!(think, ThinkOption::DISABLED);
        assert!(serde_json::from_value::<ThinkOption>(json!("extreme")).is_err());
    }

    #[test]
    fn test_invalid_level_is_validation_error() {
        assert!(ThinkLevel::new("invalid").unwrap_err().is_validation());
    }

    #[test]
    fn test_parse() {
        assert_eq!(ThinkOption::parse("").unwrap(), None);
        assert_eq!(ThinkOption::parse("true").unwrap(), Some(ThinkOption::ENABLED));
        assert_eq!(ThinkOption::parse(" low ").unwrap(), Some(ThinkOption::low()));
        assert!(ThinkOption::parse("max").is_err());
    }
}
