//! Subject key validation and handling.

use std::borrow::Borrow;
use std::fmt;

use crate::error::{Result, WindowgateError};

/// The identifier a quota is tracked under, usually an authenticated user's
/// opaque ID.
///
/// Construction rejects empty and whitespace-only identifiers. The value is
/// otherwise kept verbatim, so `"User1"` and `"user1"` are different subjects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubjectKey(String);

impl SubjectKey {
    /// Validate and wrap a subject identifier.
    pub fn new(subject: &str) -> Result<Self> {
        if subject.trim().is_empty() {
            return Err(WindowgateError::InvalidArgument(
                "subject must not be empty".to_string(),
            ));
        }
        Ok(Self(subject.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SubjectKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_subject_key_creation() {
        let key = SubjectKey::new("user_42").unwrap();
        assert_eq!(key.as_str(), "user_42");
        assert_eq!(key.to_string(), "user_42");
    }

    #[test]
    fn test_subject_key_rejects_blank() {
        assert!(matches!(
            SubjectKey::new(""),
            Err(WindowgateError::InvalidArgument(_))
        ));
        assert!(matches!(
            SubjectKey::new("   "),
            Err(WindowgateError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_subject_key_is_case_sensitive() {
        let a = SubjectKey::new("User1").unwrap();
        let b = SubjectKey::new("user1").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_subject_key_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(SubjectKey::new("u1").unwrap(), 1);
        assert_eq!(map.get("u1"), Some(&1));
    }
}
