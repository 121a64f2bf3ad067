//! # Storage Module
//!
//! The Collection Store: named collections of JSON records, primary keys,
//! secondary (optionally unique, optionally composite) indexes, and the
//! query descriptors used to scan them.

mod index;
mod redb_store;
pub mod schema;

pub use index::{Document, IndexValue, Key};
pub use redb_store::Store;
pub(crate) use redb_store::WriteMode;

use crate::primitives::KEY_MAX;
use crate::{CampusError, CampusResult};
use schema::CollectionSchema;

/// Which records a scan visits.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Filter {
    /// Every record in the collection.
    #[default]
    All,
    /// Records whose index value equals `value` exactly.
    Eq {
        index: &'static str,
        value: IndexValue,
    },
    /// Records whose index value lies within the inclusive bounds.
    Range {
        index: &'static str,
        from: Option<IndexValue>,
        to: Option<IndexValue>,
    },
}

impl Filter {
    pub fn eq(index: &'static str, value: impl Into<IndexValue>) -> Self {
        Self::Eq {
            index,
            value: value.into(),
        }
    }

    pub fn range(index: &'static str, from: Option<IndexValue>, to: Option<IndexValue>) -> Self {
        Self::Range { index, from, to }
    }

    /// Resolve to an index scan, or `None` for a full-collection scan.
    pub(crate) fn scan(&self, schema: &CollectionSchema) -> CampusResult<Option<IndexScan>> {
        let (index, from, to) = match self {
            Self::All => return Ok(None),
            Self::Eq { index, value } => {
                let encoded = value.encode();
                (*index, encoded.clone(), encoded)
            }
            Self::Range { index, from, to } => (
                *index,
                from.as_ref().map(IndexValue::encode).unwrap_or_default(),
                to.as_ref()
                    .map(IndexValue::encode)
                    .unwrap_or_else(|| KEY_MAX.to_string()),
            ),
        };
        if schema.index(index).is_none() {
            return Err(CampusError::Validation(format!(
                "collection '{}' has no index '{}'",
                schema.name, index
            )));
        }
        Ok(Some(IndexScan { index, from, to }))
    }
}

/// A resolved index scan: inclusive encoded bounds on one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IndexScan {
    pub index: &'static str,
    pub from: String,
    pub to: String,
}

/// Result ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Ascending primary key (insertion order for generated keys).
    #[default]
    KeyAsc,
    /// Descending primary key (newest first for generated keys).
    KeyDesc,
    /// Ascending index value, then primary key. Same as `KeyAsc` for `All`.
    Index,
}

/// A scan: filter, ordering, and optional limit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Query {
    pub filter: Filter,
    pub order: Order,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
