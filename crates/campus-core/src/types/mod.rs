//! # Core Type Definitions
//!
//! Shared vocabulary for the campus data layer:
//! - Error taxonomy (`CampusError`)
//! - User roles (`Role`)
//! - The authorized caller of a workflow (`Actor`)
//!
//! Every fallible operation in this crate returns `CampusResult<T>`.
//! Workflows hand back either a sanitized payload or exactly one typed
//! failure; nothing is reported through an ambiguous empty value.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// ROLES
// =============================================================================

/// Role of a campus account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Student,
    Faculty,
    Admin,
    MessStaff,
    PlacementOfficer,
}

impl Role {
    /// Stable lowercase name, identical to the serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Faculty => "faculty",
            Self::Admin => "admin",
            Self::MessStaff => "mess-staff",
            Self::PlacementOfficer => "placement-officer",
        }
    }

    /// All roles, in declaration order.
    pub const ALL: [Role; 5] = [
        Self::Student,
        Self::Faculty,
        Self::Admin,
        Self::MessStaff,
        Self::PlacementOfficer,
    ];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = CampusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s.trim())
            .ok_or_else(|| CampusError::Validation(format!("unknown role '{}'", s)))
    }
}

// =============================================================================
// ACTOR
// =============================================================================

/// An authenticated caller.
///
/// Only the identity workflow can mint an `Actor` (from a validated session),
/// so holding one is proof that authorization already happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    user_id: String,
    role: Role,
}

impl Actor {
    pub(crate) fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    /// Actor used by background maintenance for its audit entries.
    pub(crate) fn system() -> Self {
        Self::new("system", Role::Admin)
    }

    /// The acting user's id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The acting user's role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether the actor is an administrator.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fail with `PermissionDenied` unless the actor holds one of `roles`.
    pub(crate) fn require_any(&self, roles: &[Role], operation: &str) -> CampusResult<()> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(CampusError::PermissionDenied(format!(
                "{} requires one of [{}], actor is {}",
                operation,
                roles
                    .iter()
                    .map(|r| r.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                self.role
            )))
        }
    }

    /// Fail with `PermissionDenied` unless the actor is an administrator.
    pub(crate) fn require_admin(&self, operation: &str) -> CampusResult<()> {
        self.require_any(&[Role::Admin], operation)
    }

    /// Allow the user themselves, or anyone holding one of `roles`.
    pub(crate) fn require_self_or(
        &self,
        user_id: &str,
        roles: &[Role],
        operation: &str,
    ) -> CampusResult<()> {
        if self.user_id == user_id {
            Ok(())
        } else {
            self.require_any(roles, operation)
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the campus data layer.
///
/// - No silent failures
/// - Precondition failures are typed, one variant per condition
/// - The store never panics; I/O faults surface as `Storage`
#[derive(Debug, Error)]
pub enum CampusError {
    /// Missing or malformed input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A workflow-level duplicate (username, email, ...).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A write collided with another record on a unique index.
    #[error("Unique constraint violated: {collection}.{index}")]
    UniqueConstraintViolation { collection: String, index: String },

    /// A referenced record does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Credentials or session did not verify.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The account exists but has been deactivated.
    #[error("Account is deactivated")]
    Deactivated,

    /// The actor is authenticated but lacks the required role.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The opportunity's application deadline has elapsed.
    #[error("Deadline passed for opportunity {0}")]
    DeadlinePassed(u64),

    /// The target (menu, opportunity, ...) is not accepting actions.
    #[error("{0} is not active")]
    Inactive(String),

    /// The student already holds a booking for this menu.
    #[error("Student {student_id} already booked {menu_id}")]
    DuplicateBooking { menu_id: String, student_id: String },

    /// The student already applied to this opportunity.
    #[error("Student {student_id} already applied to opportunity {opportunity_id}")]
    DuplicateApplication {
        student_id: String,
        opportunity_id: u64,
    },

    /// An I/O or engine fault in the underlying store.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A record or snapshot could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CampusError {
    pub(crate) fn not_found(entity: &'static str, key: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Whether this is a unique-index rejection on `index`.
    #[must_use]
    pub fn is_unique_violation_on(&self, index: &str) -> bool {
        matches!(self, Self::UniqueConstraintViolation { index: i, .. } if i == index)
    }
}

/// Result alias used throughout the crate.
pub type CampusResult<T> = Result<T, CampusError>;

/// Map any displayable engine error into `CampusError::Storage`.
pub(crate) fn storage_error(e: impl fmt::Display) -> CampusError {
    CampusError::Storage(e.to_string())
}

/// Map any displayable codec error into `CampusError::Serialization`.
pub(crate) fn serialization_error(e: impl fmt::Display) -> CampusError {
    CampusError::Serialization(e.to_string())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in Role::ALL {
            let parsed: Role = role.as_str().parse().expect("parse");
            assert_eq!(parsed, role);
        }
        assert!("janitor".parse::<Role>().is_err());
    }

    #[test]
    fn role_serializes_kebab_case() {
        let json = serde_json::to_string(&Role::MessStaff).expect("serialize");
        assert_eq!(json, "\"mess-staff\"");
    }

    #[test]
    fn actor_role_checks() {
        let student = Actor::new("s1", Role::Student);
        assert!(student.require_admin("import").is_err());
        assert!(student.require_self_or("s1", &[Role::Admin], "read").is_ok());
        assert!(student.require_self_or("s2", &[Role::Admin], "read").is_err());

        let admin = Actor::new("a1", Role::Admin);
        assert!(admin.require_admin("import").is_ok());
        assert!(admin.is_admin());
    }

    #[test]
    fn unique_violation_matches_index() {
        let err = CampusError::UniqueConstraintViolation {
            collection: "users".to_string(),
            index: "username".to_string(),
        };
        assert!(err.is_unique_violation_on("username"));
        assert!(!err.is_unique_violation_on("email"));
    }
}
