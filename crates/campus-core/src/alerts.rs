//! # Alerts
//!
//! Campus notices with a priority and an expiry.
//!
//! An alert is *active* iff `is_active` is set and `expires_at` lies in the
//! future. Readers apply that rule directly, so an expired alert disappears
//! from `get_active` even before the sweep flips its flag. The sweep never
//! deletes and is idempotent.

use crate::campus::Campus;
use crate::primitives::MAX_TEXT_LENGTH;
use crate::query::{Collection, Record};
use crate::storage::Filter;
use crate::storage::schema::ALERTS;
use crate::{Actor, CampusError, CampusResult, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

const PUBLISHERS: &[Role] = &[
    Role::Admin,
    Role::Faculty,
    Role::MessStaff,
    Role::PlacementOfficer,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Sort rank: high first.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampusAlert {
    #[serde(default)]
    pub id: u64,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    #[serde(default)]
    pub category: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    #[serde(default)]
    pub views: u64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Record for CampusAlert {
    const COLLECTION: &'static str = ALERTS;
    const ENTITY: &'static str = "CampusAlert";
}

impl CampusAlert {
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAlert {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Option<String>,
    /// Defaults to now + the configured alert lifetime.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
pub struct AlertService<'c> {
    campus: &'c Campus,
}

impl Campus {
    pub fn alerts(&self) -> AlertService<'_> {
        AlertService { campus: self }
    }
}

impl AlertService<'_> {
    fn alerts(&self) -> Collection<'_, CampusAlert> {
        self.campus.store.collection::<CampusAlert>()
    }

    pub fn create_alert(&self, actor: &Actor, input: NewAlert) -> CampusResult<CampusAlert> {
        actor.require_any(PUBLISHERS, "create_alert")?;
        let title = input.title.trim();
        let message = input.message.trim();
        if title.is_empty() || message.is_empty() {
            return Err(CampusError::Validation(
                "title and message are required".to_string(),
            ));
        }
        if message.len() > MAX_TEXT_LENGTH {
            return Err(CampusError::Validation("message too long".to_string()));
        }
        let now = self.campus.now();
        let expires_at = input
            .expires_at
            .unwrap_or_else(|| now + self.campus.config.alert_default_ttl());
        if expires_at <= now {
            return Err(CampusError::Validation(
                "expiry must be in the future".to_string(),
            ));
        }

        let alert = self.alerts().save(&CampusAlert {
            id: 0,
            title: title.to_string(),
            message: message.to_string(),
            priority: input.priority,
            category: input.category,
            expires_at,
            is_active: true,
            views: 0,
            created_by: actor.user_id().to_string(),
            created_at: now,
        })?;
        tracing::info!(event = "alert_created", alert_id = alert.id, priority = alert.priority.as_str());
        self.campus.activity().record(
            actor.user_id(),
            "alert_created",
            Some(format!("id={}", alert.id)),
        );
        Ok(alert)
    }

    /// Live alerts, high priority first, newest first within a priority.
    pub fn get_active(&self, priority: Option<Priority>) -> CampusResult<Vec<CampusAlert>> {
        let now = self.campus.now();
        let mut live: Vec<_> = self
            .alerts()
            .find(Filter::eq("is_active", true))?
            .into_iter()
            .filter(|a| a.is_live(now))
            .filter(|a| priority.is_none_or(|p| a.priority == p))
            .collect();
        live.sort_by_key(|a| (a.priority.rank(), Reverse(a.created_at), Reverse(a.id)));
        Ok(live)
    }

    /// Every alert, newest first (publishers only).
    pub fn list_all(&self, actor: &Actor) -> CampusResult<Vec<CampusAlert>> {
        actor.require_any(PUBLISHERS, "list_alerts")?;
        let mut all = self.alerts().all()?;
        all.reverse();
        Ok(all)
    }

    /// Count a view of a live alert.
    pub fn record_view(&self, id: u64) -> CampusResult<CampusAlert> {
        let mut alert = self.alerts().require(id)?;
        if !alert.is_live(self.campus.now()) {
            return Err(CampusError::Inactive(format!("alert {}", id)));
        }
        alert.views += 1;
        self.alerts().put(&alert)?;
        Ok(alert)
    }

    /// Take an alert down before its expiry.
    pub fn deactivate(&self, actor: &Actor, id: u64) -> CampusResult<CampusAlert> {
        actor.require_any(PUBLISHERS, "deactivate_alert")?;
        let mut alert = self.alerts().require(id)?;
        alert.is_active = false;
        self.alerts().put(&alert)?;
        self.campus.activity().record(
            actor.user_id(),
            "alert_deactivated",
            Some(format!("id={}", id)),
        );
        Ok(alert)
    }

    pub fn delete_alert(&self, actor: &Actor, id: u64) -> CampusResult<()> {
        actor.require_admin("delete_alert")?;
        if !self.alerts().delete(id)? {
            return Err(CampusError::not_found(CampusAlert::ENTITY, id));
        }
        self.campus.activity().record(
            actor.user_id(),
            "alert_deleted",
            Some(format!("id={}", id)),
        );
        Ok(())
    }

    /// Flip `is_active` off for every expired alert. Returns how many were
    /// flipped; a second run with no new expiries returns 0.
    pub fn sweep_expired(&self) -> CampusResult<usize> {
        let now = self.campus.now();
        let mut flipped = 0;
        for mut alert in self.alerts().find(Filter::eq("is_active", true))? {
            if alert.expires_at <= now {
                alert.is_active = false;
                self.alerts().put(&alert)?;
                flipped += 1;
            }
        }
        if flipped > 0 {
            tracing::info!(event = "alerts_expired", count = flipped);
        }
        Ok(flipped)
    }

    pub(crate) fn counts(&self) -> CampusResult<(usize, usize)> {
        let now = self.campus.now();
        let all = self.alerts().all()?;
        let live = all.iter().filter(|a| a.is_live(now)).count();
        Ok((all.len(), live))
    }
}
