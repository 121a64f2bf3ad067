//! # Collection Schemas
//!
//! The static catalogue of collections: key kind and secondary indexes.
//!
//! Index fields name top-level fields of the stored JSON document. A
//! multi-field index is composite and only matches complete tuples.

/// How a collection's primary key is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Monotonic `u64` allocated by the store when the record has none.
    Generated,
    /// String chosen by the caller (for example `2024-03-01_lunch`).
    Supplied,
}

/// A secondary index over one or more record fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDef {
    pub name: &'static str,
    pub fields: &'static [&'static str],
    pub unique: bool,
}

impl IndexDef {
    const fn new(name: &'static str, fields: &'static [&'static str]) -> Self {
        Self {
            name,
            fields,
            unique: false,
        }
    }

    const fn unique(name: &'static str, fields: &'static [&'static str]) -> Self {
        Self {
            name,
            fields,
            unique: true,
        }
    }

    /// Whether the index spans more than one field.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        self.fields.len() > 1
    }
}

/// Shape of one named collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionSchema {
    pub name: &'static str,
    pub key_kind: KeyKind,
    pub indexes: &'static [IndexDef],
    /// Layout version that introduced the collection.
    pub since_version: u64,
}

impl CollectionSchema {
    /// Look up an index by name.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&'static IndexDef> {
        self.indexes.iter().find(|idx| idx.name == name)
    }
}

// =============================================================================
// COLLECTION NAMES
// =============================================================================

pub const USERS: &str = "users";
pub const ATTENDANCE: &str = "attendance";
pub const MESS_MENUS: &str = "mess_menus";
pub const MESS_BOOKINGS: &str = "mess_bookings";
pub const MESS_FEEDBACK: &str = "mess_feedback";
pub const CAREER_OPPORTUNITIES: &str = "career_opportunities";
pub const CAREER_APPLICATIONS: &str = "career_applications";
pub const RESULTS: &str = "results";
pub const ALERTS: &str = "alerts";
pub const ACTIVITY_LOG: &str = "activity_log";

// =============================================================================
// CATALOGUE
// =============================================================================

/// Every collection, in import order: referenced collections come before the
/// collections that reference them.
pub const SCHEMAS: &[CollectionSchema] = &[
    CollectionSchema {
        name: USERS,
        key_kind: KeyKind::Supplied,
        indexes: &[
            IndexDef::unique("username", &["username"]),
            IndexDef::unique("email", &["email"]),
            IndexDef::new("role", &["role"]),
            IndexDef::new("department", &["department"]),
        ],
        since_version: 1,
    },
    CollectionSchema {
        name: ATTENDANCE,
        key_kind: KeyKind::Generated,
        indexes: &[
            IndexDef::new("student_id", &["student_id"]),
            IndexDef::new("date", &["date"]),
            IndexDef::new("subject", &["subject"]),
            IndexDef::new("student_date", &["student_id", "date"]),
            IndexDef::new("student_subject", &["student_id", "subject"]),
            IndexDef::new("marked_by", &["marked_by"]),
        ],
        since_version: 1,
    },
    CollectionSchema {
        name: MESS_MENUS,
        key_kind: KeyKind::Supplied,
        indexes: &[
            IndexDef::new("date", &["date"]),
            IndexDef::new("meal_type", &["meal_type"]),
        ],
        since_version: 1,
    },
    CollectionSchema {
        name: MESS_BOOKINGS,
        key_kind: KeyKind::Generated,
        indexes: &[
            IndexDef::new("menu_id", &["menu_id"]),
            IndexDef::new("student_id", &["student_id"]),
            IndexDef::unique("menu_student", &["menu_id", "student_id"]),
        ],
        since_version: 1,
    },
    CollectionSchema {
        name: MESS_FEEDBACK,
        key_kind: KeyKind::Generated,
        indexes: &[
            IndexDef::new("menu_id", &["menu_id"]),
            IndexDef::new("student_id", &["student_id"]),
        ],
        since_version: 1,
    },
    CollectionSchema {
        name: CAREER_OPPORTUNITIES,
        key_kind: KeyKind::Generated,
        indexes: &[
            IndexDef::new("type", &["type"]),
            IndexDef::new("status", &["status"]),
        ],
        since_version: 1,
    },
    CollectionSchema {
        name: CAREER_APPLICATIONS,
        key_kind: KeyKind::Generated,
        indexes: &[
            IndexDef::new("student_id", &["student_id"]),
            IndexDef::new("opportunity_id", &["opportunity_id"]),
            IndexDef::new("status", &["status"]),
            IndexDef::unique("student_opportunity", &["student_id", "opportunity_id"]),
        ],
        since_version: 1,
    },
    CollectionSchema {
        name: RESULTS,
        key_kind: KeyKind::Supplied,
        indexes: &[
            IndexDef::new("student_id", &["student_id"]),
            IndexDef::new("semester", &["semester"]),
        ],
        since_version: 1,
    },
    CollectionSchema {
        name: ALERTS,
        key_kind: KeyKind::Generated,
        indexes: &[
            IndexDef::new("priority", &["priority"]),
            IndexDef::new("is_active", &["is_active"]),
        ],
        since_version: 1,
    },
    CollectionSchema {
        name: ACTIVITY_LOG,
        key_kind: KeyKind::Generated,
        indexes: &[
            IndexDef::new("user_id", &["user_id"]),
            IndexDef::new("action", &["action"]),
        ],
        since_version: 1,
    },
];

/// Look up a collection by name.
#[must_use]
pub fn schema(name: &str) -> Option<&'static CollectionSchema> {
    SCHEMAS.iter().find(|s| s.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::SCHEMA_VERSION;
    use std::collections::BTreeSet;

    #[test]
    fn collection_names_unique() {
        let names: BTreeSet<_> = SCHEMAS.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), SCHEMAS.len());
    }

    #[test]
    fn index_names_unique_per_collection() {
        for schema in SCHEMAS {
            let names: BTreeSet<_> = schema.indexes.iter().map(|i| i.name).collect();
            assert_eq!(names.len(), schema.indexes.len(), "{}", schema.name);
        }
    }

    #[test]
    fn no_collection_from_the_future() {
        assert!(SCHEMAS.iter().all(|s| s.since_version <= SCHEMA_VERSION));
    }

    #[test]
    fn composite_indexes_detected() {
        let bookings = schema(MESS_BOOKINGS).expect("bookings");
        let idx = bookings.index("menu_student").expect("index");
        assert!(idx.is_composite());
        assert!(idx.unique);
        assert!(schema("nope").is_none());
    }
}
