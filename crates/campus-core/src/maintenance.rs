//! # Maintenance
//!
//! One background pass: expire alerts, trim the activity log, reconcile the
//! denormalized counters and purge expired sessions. Every step runs even
//! when an earlier one fails; failures are collected in the report.
//!
//! The core only defines the pass. Scheduling belongs to the host (the
//! `campus maintain` command runs it on a fixed interval).

use crate::campus::Campus;
use crate::{Actor, CampusResult};
use serde::Serialize;

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub alerts_expired: usize,
    pub log_entries_trimmed: usize,
    pub menus_reconciled: usize,
    pub opportunities_reconciled: usize,
    pub sessions_purged: usize,
    /// `step: error` for every step that failed.
    pub errors: Vec<String>,
}

impl MaintenanceReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn step(&mut self, name: &str, result: CampusResult<usize>) -> usize {
        match result {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(event = "maintenance_step_failed", step = name, error = %e);
                self.errors.push(format!("{}: {}", name, e));
                0
            }
        }
    }
}

impl Campus {
    /// Run every maintenance step once.
    pub fn run_maintenance(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        report.alerts_expired = report.step("alerts", self.alerts().sweep_expired());
        report.menus_reconciled = report.step("menus", self.mess().reconcile_counts());
        report.opportunities_reconciled =
            report.step("opportunities", self.career().reconcile_applicant_counts());
        report.sessions_purged = self.sessions.purge_expired(self.now());

        let changed = report.alerts_expired
            + report.menus_reconciled
            + report.opportunities_reconciled
            + report.sessions_purged;
        if changed > 0 || !report.is_clean() {
            self.activity().record(
                Actor::system().user_id(),
                "maintenance",
                Some(format!(
                    "alerts={} menus={} opportunities={} sessions={} errors={}",
                    report.alerts_expired,
                    report.menus_reconciled,
                    report.opportunities_reconciled,
                    report.sessions_purged,
                    report.errors.len()
                )),
            );
        }
        // Trim last so the pass's own entry counts against the cap.
        report.log_entries_trimmed =
            report.step("activity_log", self.activity().trim(self.config.activity_log_cap));

        tracing::info!(
            event = "maintenance_pass",
            alerts_expired = report.alerts_expired,
            log_trimmed = report.log_entries_trimmed,
            menus = report.menus_reconciled,
            opportunities = report.opportunities_reconciled,
            sessions = report.sessions_purged,
            errors = report.errors.len()
        );
        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Role;
    use crate::alerts::{NewAlert, Priority};
    use crate::campus::test_support::{actor, campus, start_time};
    use crate::config::CampusConfig;
    use crate::storage::Store;
    use chrono::Duration;
    use std::sync::Arc;

    #[test]
    fn pass_expires_alerts_and_purges_sessions() {
        let (campus, clock) = campus();
        let (admin, _) = actor(&campus, "root", Role::Admin);
        campus
            .alerts()
            .create_alert(
                &admin,
                NewAlert {
                    title: "exam".to_string(),
                    message: "hall 3".to_string(),
                    priority: Priority::High,
                    expires_at: Some(start_time() + Duration::hours(1)),
                    ..NewAlert::default()
                },
            )
            .unwrap();

        clock.advance(Duration::hours(25));
        let report = campus.run_maintenance();
        assert!(report.is_clean());
        assert_eq!(report.alerts_expired, 1);
        assert_eq!(report.sessions_purged, 1);

        let again = campus.run_maintenance();
        assert_eq!(again.alerts_expired, 0);
        assert_eq!(again.sessions_purged, 0);
    }

    #[test]
    fn pass_trims_log_to_cap() {
        let clock = Arc::new(crate::clock::ManualClock::new(start_time()));
        let config = CampusConfig {
            password_cost: 4,
            activity_log_cap: 3,
            ..CampusConfig::default()
        };
        let campus =
            Campus::with_store(Arc::new(Store::in_memory().unwrap()), config, clock).unwrap();
        for i in 0..10 {
            campus.activity().record("u1", "tick", Some(i.to_string()));
        }
        let report = campus.run_maintenance();
        assert_eq!(report.log_entries_trimmed, 7);
        assert_eq!(campus.activity().count().unwrap(), 3);
    }
}
