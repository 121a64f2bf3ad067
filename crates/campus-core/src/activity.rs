//! # Activity Log
//!
//! Append-only audit journal. Every mutating workflow writes one entry.
//! Recording never fails the caller: a failed write is logged and dropped.
//! Retention is bounded by `trim`, run from maintenance.

use crate::campus::Campus;
use crate::query::Record;
use crate::storage::schema::ACTIVITY_LOG;
use crate::storage::{Filter, Key, Order, Query};
use crate::{Actor, CampusResult, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    #[serde(default)]
    pub id: u64,
    pub user_id: String,
    pub action: String,
    #[serde(default)]
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Record for ActivityEntry {
    const COLLECTION: &'static str = ACTIVITY_LOG;
    const ENTITY: &'static str = "ActivityEntry";
}

#[derive(Debug, Clone, Copy)]
pub struct ActivityLog<'c> {
    campus: &'c Campus,
}

impl Campus {
    pub fn activity(&self) -> ActivityLog<'_> {
        ActivityLog { campus: self }
    }
}

impl ActivityLog<'_> {
    /// Append an entry; returns whether it was written. Failures are
    /// logged, never returned.
    pub fn record(&self, user_id: &str, action: &str, details: Option<String>) -> bool {
        let entry = ActivityEntry {
            id: 0,
            user_id: user_id.to_string(),
            action: action.to_string(),
            details,
            timestamp: self.campus.now(),
        };
        if let Err(e) = self.campus.store.collection::<ActivityEntry>().put(&entry) {
            tracing::warn!(
                event = "activity_write_failed",
                user_id = %user_id,
                action = %action,
                error = %e
            );
            return false;
        }
        true
    }

    /// Newest entries first (admin only).
    pub fn recent(&self, actor: &Actor, limit: usize) -> CampusResult<Vec<ActivityEntry>> {
        actor.require_admin("activity.recent")?;
        self.campus
            .store
            .collection::<ActivityEntry>()
            .query(&Query::all().order(Order::KeyDesc).limit(limit))
    }

    /// A user's entries, newest first (self or admin).
    pub fn for_user(
        &self,
        actor: &Actor,
        user_id: &str,
        limit: usize,
    ) -> CampusResult<Vec<ActivityEntry>> {
        actor.require_self_or(user_id, &[Role::Admin], "activity.for_user")?;
        self.entries_for(user_id, Some(limit))
    }

    pub(crate) fn entries_for(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> CampusResult<Vec<ActivityEntry>> {
        let mut query = Query::new(Filter::eq("user_id", user_id)).order(Order::KeyDesc);
        query.limit = limit;
        self.campus.store.collection::<ActivityEntry>().query(&query)
    }

    /// Number of entries held.
    pub fn count(&self) -> CampusResult<usize> {
        self.campus.store.collection::<ActivityEntry>().count()
    }

    /// Delete the oldest entries beyond `cap`; returns how many were removed.
    pub fn trim(&self, cap: usize) -> CampusResult<usize> {
        let log = self.campus.store.collection::<ActivityEntry>();
        let held = log.count()?;
        if held <= cap {
            return Ok(0);
        }
        let oldest = log.query(&Query::all().order(Order::KeyAsc).limit(held - cap))?;
        let keys: Vec<Key> = oldest.iter().map(|e| Key::Int(e.id)).collect();
        let removed = self.campus.store.delete_many(ACTIVITY_LOG, &keys)?;
        tracing::info!(event = "activity_trimmed", removed, cap);
        Ok(removed)
    }
}
