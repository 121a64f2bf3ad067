//! # Stats
//!
//! Read-only rollups across every workflow. Nothing here is stored; each
//! call counts the backing collections at read time.

use crate::attendance::AttendanceStats;
use crate::campus::Campus;
use crate::career::OpportunityStatus;
use crate::identity::User;
use crate::storage::Filter;
use crate::storage::schema::{
    ATTENDANCE, CAREER_APPLICATIONS, CAREER_OPPORTUNITIES, MESS_BOOKINGS, MESS_FEEDBACK,
    MESS_MENUS, RESULTS,
};
use crate::{Actor, CampusResult, Role};
use serde::Serialize;
use std::collections::BTreeMap;

/// Whole-store rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemStats {
    pub users_total: usize,
    pub users_active: usize,
    pub users_by_role: BTreeMap<String, usize>,
    pub attendance_records: usize,
    pub menus: usize,
    pub bookings: usize,
    pub feedback: usize,
    pub opportunities_total: usize,
    pub opportunities_active: usize,
    pub applications: usize,
    pub result_records: usize,
    pub alerts_total: usize,
    pub alerts_active: usize,
    pub log_entries: usize,
}

/// One user's footprint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStats {
    pub user_id: String,
    pub attendance: AttendanceStats,
    pub bookings: usize,
    pub feedback: usize,
    pub applications: usize,
    pub cgpa: f64,
    pub activity: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct StatsService<'c> {
    campus: &'c Campus,
}

impl Campus {
    pub fn stats(&self) -> StatsService<'_> {
        StatsService { campus: self }
    }
}

impl StatsService<'_> {
    /// System-wide counts (admin only).
    pub fn system_stats(&self, actor: &Actor) -> CampusResult<SystemStats> {
        actor.require_admin("system_stats")?;
        let store = &self.campus.store;
        let count = |collection: &str| store.count(collection, &Filter::All);

        let users = store.collection::<User>().all()?;
        let mut users_by_role: BTreeMap<String, usize> = Role::ALL
            .iter()
            .map(|role| (role.as_str().to_string(), 0))
            .collect();
        for user in &users {
            *users_by_role.entry(user.role.as_str().to_string()).or_default() += 1;
        }
        let (alerts_total, alerts_active) = self.campus.alerts().counts()?;

        Ok(SystemStats {
            users_total: users.len(),
            users_active: users.iter().filter(|u| u.is_active).count(),
            users_by_role,
            attendance_records: count(ATTENDANCE)?,
            menus: count(MESS_MENUS)?,
            bookings: count(MESS_BOOKINGS)?,
            feedback: count(MESS_FEEDBACK)?,
            opportunities_total: count(CAREER_OPPORTUNITIES)?,
            opportunities_active: store.count(
                CAREER_OPPORTUNITIES,
                &Filter::eq("status", OpportunityStatus::Active.as_str()),
            )?,
            applications: count(CAREER_APPLICATIONS)?,
            result_records: count(RESULTS)?,
            alerts_total,
            alerts_active,
            log_entries: self.campus.activity().count()?,
        })
    }

    /// Per-user rollup (self, faculty or admin).
    pub fn user_stats(&self, actor: &Actor, user_id: &str) -> CampusResult<UserStats> {
        actor.require_self_or(user_id, &[Role::Faculty, Role::Admin], "user_stats")?;
        self.campus.identity().get_user(actor, user_id)?;
        Ok(UserStats {
            user_id: user_id.to_string(),
            attendance: self.campus.attendance().stats_for(user_id)?,
            bookings: self.campus.mess().booking_count_for(user_id)?,
            feedback: self.campus.mess().feedback_count_for(user_id)?,
            applications: self.campus.career().application_count_for(user_id)?,
            cgpa: self.campus.results().results_for(user_id)?.cgpa,
            activity: self.campus.activity().entries_for(user_id, None)?.len(),
        })
    }
}
