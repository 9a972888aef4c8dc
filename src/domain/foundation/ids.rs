//! Identifier newtypes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ValidationError;

/// Firebase Auth uid. Keys both the `users` row and the `users/{uid}` document,
/// so it must be usable as a single document path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::empty_field("user_id"));
        }
        let problem = if trimmed.len() != id.len() {
            Some("leading or trailing whitespace")
        } else if id.contains('/') {
            Some("'/' would split the document path")
        } else if id == "." || id == ".." {
            Some("reserved path segment")
        } else {
            None
        };
        match problem {
            Some(reason) => Err(ValidationError::invalid_format("user_id", reason)),
            None => Ok(Self(id)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl FromStr for UserId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key of a parked webhook event in the dead-letter queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeadLetterId(Uuid);

impl DeadLetterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DeadLetterId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for DeadLetterId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for DeadLetterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn firebase_uid_is_accepted() {
        let id = UserId::new("kZ3x9QwErTy12345abcdEFGH").unwrap();
        assert_eq!(id.as_str(), "kZ3x9QwErTy12345abcdEFGH");
        assert_eq!(id.to_string(), "kZ3x9QwErTy12345abcdEFGH");
    }

    #[test]
    fn blank_uid_is_an_empty_field() {
        for raw in ["", "   "] {
            assert!(matches!(
                UserId::new(raw),
                Err(ValidationError::EmptyField { ref field }) if field == "user_id"
            ));
        }
    }

    #[test]
    fn uid_that_breaks_the_document_path_is_rejected() {
        for raw in [" uid-1", "abc/def", "..", "."] {
            assert!(
                matches!(UserId::new(raw), Err(ValidationError::InvalidFormat { .. })),
                "{:?} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn deserializing_a_uid_validates_it() {
        let ok: UserId = serde_json::from_str("\"uid-1\"").unwrap();
        assert_eq!(ok.as_str(), "uid-1");
        assert_eq!(serde_json::to_string(&ok).unwrap(), "\"uid-1\"");

        assert!(serde_json::from_str::<UserId>("\"a/b\"").is_err());
    }

    #[test]
    fn dead_letter_ids_are_random_uuids() {
        assert_ne!(DeadLetterId::new(), DeadLetterId::new());

        let raw = "550e8400-e29b-41d4-a716-446655440000";
        let id: DeadLetterId = raw.parse().unwrap();
        assert_eq!(id.to_string(), raw);
        assert!("not-a-uuid".parse::<DeadLetterId>().is_err());
    }
}
