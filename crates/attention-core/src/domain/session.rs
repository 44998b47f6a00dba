//! Session identity.
//!
//! Ordinary course sessions and diagnostic-test sessions live in separate
//! identifier spaces on the backend. [`SessionRef`] carries the space in the
//! type so the two can never collide in a map and an event can never name both.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reference to either a course session or a diagnostic-test session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SessionRef {
    /// Ordinary course-viewing session.
    Course(i64),
    /// Diagnostic (D2R) test session.
    Diagnostic(i64),
}

/// Violations of the "exactly one session id" contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionRefError {
    /// Neither `session_id` nor `diagnostic_session_id` was supplied.
    #[error("one of session_id or diagnostic_session_id is required")]
    Missing,
    /// Both ids were supplied.
    #[error("session_id and diagnostic_session_id are mutually exclusive")]
    Ambiguous,
}

impl SessionRef {
    /// Builds a reference from the two optional wire fields.
    ///
    /// # Errors
    ///
    /// Returns [`SessionRefError`] unless exactly one id is set.
    pub const fn from_parts(
        session_id: Option<i64>,
        diagnostic_session_id: Option<i64>,
    ) -> Result<Self, SessionRefError> {
        match (session_id, diagnostic_session_id) {
            (Some(id), None) => Ok(Self::Course(id)),
            (None, Some(id)) => Ok(Self::Diagnostic(id)),
            (None, None) => Err(SessionRefError::Missing),
            (Some(_), Some(_)) => Err(SessionRefError::Ambiguous),
        }
    }

    /// Raw identifier within its space.
    #[must_use]
    pub const fn id(self) -> i64 {
        match self {
            Self::Course(id) | Self::Diagnostic(id) => id,
        }
    }

    /// Returns `true` for diagnostic-test sessions.
    #[must_use]
    pub const fn is_diagnostic(self) -> bool {
        matches!(self, Self::Diagnostic(_))
    }

    /// Backend collection that ingests events for this kind of session.
    #[must_use]
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::Course(_) => "attention-events",
            Self::Diagnostic(_) => "d2r-attention-events",
        }
    }

    /// Wire fields `(session_id, diagnostic_session_id)`.
    #[must_use]
    pub const fn to_parts(self) -> (Option<i64>, Option<i64>) {
        match self {
            Self::Course(id) => (Some(id), None),
            Self::Diagnostic(id) => (None, Some(id)),
        }
    }
}

impl fmt::Display for SessionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Course(id) => write!(f, "course-{id}"),
            Self::Diagnostic(id) => write!(f, "diagnostic-{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_from_parts_exactly_one() {
        assert_eq!(SessionRef::from_parts(Some(3), None), Ok(SessionRef::Course(3)));
        assert_eq!(
            SessionRef::from_parts(None, Some(3)),
            Ok(SessionRef::Diagnostic(3))
        );
    }

    #[test]
    fn test_from_parts_rejects_neither_and_both() {
        assert_eq!(
            SessionRef::from_parts(None, None),
            Err(SessionRefError::Missing)
        );
        assert_eq!(
            SessionRef::from_parts(Some(1), Some(2)),
            Err(SessionRefError::Ambiguous)
        );
    }

    #[test]
    fn test_id_spaces_do_not_collide() {
        let keys: HashSet<_> = [SessionRef::Course(7), SessionRef::Diagnostic(7)]
            .into_iter()
            .collect();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_endpoint_and_display() {
        assert_eq!(SessionRef::Course(1).endpoint(), "attention-events");
        assert_eq!(SessionRef::Diagnostic(1).endpoint(), "d2r-attention-events");
        assert_eq!(SessionRef::Diagnostic(42).to_string(), "diagnostic-42");
    }
}
