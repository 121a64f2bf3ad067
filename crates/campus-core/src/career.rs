//! # Career
//!
//! Opportunity postings and student applications.
//!
//! An application is unique per (student, opportunity), enforced by the
//! store's composite unique index. The opportunity's `applicants` counter is
//! refreshed from the applications collection *after* the application
//! insert: an interrupted sequence can leave the counter behind (repaired by
//! `reconcile_applicant_counts`) but never ahead.
//!
//! Applications reference opportunities weakly. Deleting an opportunity
//! leaves its applications in place and readers tolerate the dangling id.

use crate::campus::Campus;
use crate::primitives::MAX_TEXT_LENGTH;
use crate::query::{Collection, Record};
use crate::storage::schema::{CAREER_APPLICATIONS, CAREER_OPPORTUNITIES};
use crate::storage::{Filter, IndexValue};
use crate::{Actor, CampusError, CampusResult, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const RECRUITERS: &[Role] = &[Role::Admin, Role::PlacementOfficer, Role::Faculty];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityStatus {
    #[default]
    Active,
    Closed,
}

impl OpportunityStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    #[default]
    Pending,
    Shortlisted,
    Accepted,
    Rejected,
    Withdrawn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CareerOpportunity {
    #[serde(default)]
    pub id: u64,
    pub title: String,
    pub company: String,
    /// job, internship, workshop, ...
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    pub status: OpportunityStatus,
    /// Empty means open to every department.
    #[serde(default)]
    pub eligible_departments: Vec<String>,
    #[serde(default)]
    pub applicants: usize,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Record for CareerOpportunity {
    const COLLECTION: &'static str = CAREER_OPPORTUNITIES;
    const ENTITY: &'static str = "CareerOpportunity";
}

impl CareerOpportunity {
    fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|deadline| deadline < now)
    }

    fn open_to(&self, department: &str) -> bool {
        self.eligible_departments.is_empty()
            || self
                .eligible_departments
                .iter()
                .any(|d| d.eq_ignore_ascii_case(department))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentApplication {
    #[serde(default)]
    pub id: u64,
    pub student_id: String,
    pub opportunity_id: u64,
    pub status: ApplicationStatus,
    pub applied_date: DateTime<Utc>,
    #[serde(default)]
    pub cover_letter: Option<String>,
    #[serde(default)]
    pub reviewed_by: Option<String>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub review_notes: Option<String>,
}

impl Record for StudentApplication {
    const COLLECTION: &'static str = CAREER_APPLICATIONS;
    const ENTITY: &'static str = "StudentApplication";
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewOpportunity {
    pub title: String,
    pub company: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub eligible_departments: Vec<String>,
}

/// Fields an update may change; `None` leaves a field as is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpportunityUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub eligible_departments: Option<Vec<String>>,
    #[serde(default)]
    pub status: Option<OpportunityStatus>,
}

/// Listing filters; all optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpportunityFilter {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: Option<OpportunityStatus>,
    #[serde(default)]
    pub department: Option<String>,
}

/// Input for `apply`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationInput {
    pub student_id: String,
    #[serde(default)]
    pub cover_letter: Option<String>,
}

/// An application with its opportunity, if that still exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationView {
    pub application: StudentApplication,
    pub opportunity: Option<CareerOpportunity>,
}

fn check_text(field: &str, value: Option<&String>) -> CampusResult<()> {
    if value.is_some_and(|v| v.len() > MAX_TEXT_LENGTH) {
        return Err(CampusError::Validation(format!("{} too long", field)));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct CareerService<'c> {
    campus: &'c Campus,
}

impl Campus {
    pub fn career(&self) -> CareerService<'_> {
        CareerService { campus: self }
    }
}

impl CareerService<'_> {
    fn opportunities(&self) -> Collection<'_, CareerOpportunity> {
        self.campus.store.collection::<CareerOpportunity>()
    }

    fn applications(&self) -> Collection<'_, StudentApplication> {
        self.campus.store.collection::<StudentApplication>()
    }

    /// Live (non-withdrawn) applications to `opportunity_id`.
    fn live_applicants(&self, opportunity_id: u64) -> CampusResult<usize> {
        Ok(self
            .applications()
            .find(Filter::eq("opportunity_id", opportunity_id))?
            .iter()
            .filter(|a| a.status != ApplicationStatus::Withdrawn)
            .count())
    }

    /// Store a fresh applicant count. Runs after the primary write; a failure
    /// leaves the counter low until the next reconciliation.
    fn refresh_applicants(&self, opportunity_id: u64) {
        let result = self.opportunities().get(opportunity_id).and_then(|found| {
            let Some(mut opportunity) = found else {
                return Ok(());
            };
            opportunity.applicants = self.live_applicants(opportunity_id)?;
            self.opportunities().put(&opportunity).map(|_| ())
        });
        if let Err(e) = result {
            tracing::warn!(
                event = "applicant_count_stale",
                opportunity_id,
                error = %e
            );
        }
    }

    // =========================================================================
    // OPPORTUNITIES
    // =========================================================================

    pub fn create_opportunity(
        &self,
        actor: &Actor,
        input: NewOpportunity,
    ) -> CampusResult<CareerOpportunity> {
        actor.require_any(RECRUITERS, "create_opportunity")?;
        let title = input.title.trim();
        let company = input.company.trim();
        let kind = input.kind.trim().to_lowercase();
        if title.is_empty() || company.is_empty() || kind.is_empty() {
            return Err(CampusError::Validation(
                "title, company and type are required".to_string(),
            ));
        }
        check_text("description", input.description.as_ref())?;

        let opportunity = self.opportunities().save(&CareerOpportunity {
            id: 0,
            title: title.to_string(),
            company: company.to_string(),
            kind,
            description: input.description,
            deadline: input.deadline,
            status: OpportunityStatus::Active,
            eligible_departments: input.eligible_departments,
            applicants: 0,
            created_by: actor.user_id().to_string(),
            created_at: self.campus.now(),
        })?;
        tracing::info!(event = "opportunity_created", opportunity_id = opportunity.id);
        self.campus.activity().record(
            actor.user_id(),
            "opportunity_created",
            Some(format!("id={}", opportunity.id)),
        );
        Ok(opportunity)
    }

    pub fn get_opportunity(&self, id: u64) -> CampusResult<Option<CareerOpportunity>> {
        self.opportunities().get(id)
    }

    /// Visible postings: matching `filter`, deadline not passed, soonest
    /// deadline first and open-ended postings last.
    pub fn list_opportunities(
        &self,
        filter: &OpportunityFilter,
    ) -> CampusResult<Vec<CareerOpportunity>> {
        let now = self.campus.now();
        let candidates = match (&filter.kind, filter.status) {
            (Some(kind), _) => self
                .opportunities()
                .find(Filter::eq("type", kind.trim().to_lowercase()))?,
            (None, Some(status)) => self
                .opportunities()
                .find(Filter::eq("status", status.as_str()))?,
            (None, None) => self.opportunities().all()?,
        };
        let mut visible: Vec<_> = candidates
            .into_iter()
            .filter(|o| filter.status.is_none_or(|s| o.status == s))
            .filter(|o| filter.department.as_deref().is_none_or(|d| o.open_to(d)))
            .filter(|o| !o.deadline_passed(now))
            .collect();
        visible.sort_by_key(|o| (o.deadline.is_none(), o.deadline, o.id));
        Ok(visible)
    }

    pub fn update_opportunity(
        &self,
        actor: &Actor,
        id: u64,
        update: OpportunityUpdate,
    ) -> CampusResult<CareerOpportunity> {
        actor.require_any(RECRUITERS, "update_opportunity")?;
        check_text("description", update.description.as_ref())?;
        let mut opportunity = self.opportunities().require(id)?;
        if let Some(title) = update.title {
            opportunity.title = title;
        }
        if let Some(company) = update.company {
            opportunity.company = company;
        }
        if let Some(kind) = update.kind {
            opportunity.kind = kind.trim().to_lowercase();
        }
        if update.description.is_some() {
            opportunity.description = update.description;
        }
        if update.deadline.is_some() {
            opportunity.deadline = update.deadline;
        }
        if let Some(departments) = update.eligible_departments {
            opportunity.eligible_departments = departments;
        }
        if let Some(status) = update.status {
            opportunity.status = status;
        }
        self.opportunities().put(&opportunity)?;
        self.campus.activity().record(
            actor.user_id(),
            "opportunity_updated",
            Some(format!("id={}", id)),
        );
        Ok(opportunity)
    }

    /// Stop accepting applications.
    pub fn close_opportunity(&self, actor: &Actor, id: u64) -> CampusResult<CareerOpportunity> {
        self.update_opportunity(
            actor,
            id,
            OpportunityUpdate {
                status: Some(OpportunityStatus::Closed),
                ..OpportunityUpdate::default()
            },
        )
    }

    /// Delete a posting. Applications referencing it are kept.
    pub fn delete_opportunity(&self, actor: &Actor, id: u64) -> CampusResult<()> {
        actor.require_any(RECRUITERS, "delete_opportunity")?;
        if !self.opportunities().delete(id)? {
            return Err(CampusError::not_found(CareerOpportunity::ENTITY, id));
        }
        self.campus.activity().record(
            actor.user_id(),
            "opportunity_deleted",
            Some(format!("id={}", id)),
        );
        Ok(())
    }

    // =========================================================================
    // APPLICATIONS
    // =========================================================================

    /// Apply to an opportunity.
    pub fn apply(
        &self,
        actor: &Actor,
        opportunity_id: u64,
        input: ApplicationInput,
    ) -> CampusResult<StudentApplication> {
        let student_id = input.student_id.trim().to_string();
        if student_id.is_empty() {
            return Err(CampusError::Validation("student_id is required".to_string()));
        }
        actor.require_self_or(&student_id, &[Role::Admin], "apply")?;
        check_text("cover_letter", input.cover_letter.as_ref())?;

        let opportunity = self.opportunities().require(opportunity_id)?;
        let now = self.campus.now();
        if opportunity.deadline_passed(now) {
            return Err(CampusError::DeadlinePassed(opportunity_id));
        }
        if opportunity.status == OpportunityStatus::Closed {
            return Err(CampusError::Inactive(format!("opportunity {}", opportunity_id)));
        }

        let duplicate = || CampusError::DuplicateApplication {
            student_id: student_id.clone(),
            opportunity_id,
        };
        let pair = Filter::eq(
            "student_opportunity",
            IndexValue::tuple([
                IndexValue::from(student_id.as_str()),
                IndexValue::from(opportunity_id),
            ]),
        );
        if self.applications().count_where(pair)? > 0 {
            return Err(duplicate());
        }

        let application = self
            .applications()
            .save(&StudentApplication {
                id: 0,
                student_id: student_id.clone(),
                opportunity_id,
                status: ApplicationStatus::Pending,
                applied_date: now,
                cover_letter: input.cover_letter,
                reviewed_by: None,
                reviewed_at: None,
                review_notes: None,
            })
            .map_err(|e| {
                if e.is_unique_violation_on("student_opportunity") {
                    duplicate()
                } else {
                    e
                }
            })?;
        self.refresh_applicants(opportunity_id);

        self.campus.activity().record(
            actor.user_id(),
            "application_submitted",
            Some(format!("opportunity={} application={}", opportunity_id, application.id)),
        );
        Ok(application)
    }

    /// Review an application.
    pub fn update_application_status(
        &self,
        actor: &Actor,
        application_id: u64,
        status: ApplicationStatus,
        notes: Option<String>,
    ) -> CampusResult<StudentApplication> {
        actor.require_any(RECRUITERS, "update_application_status")?;
        if status == ApplicationStatus::Withdrawn {
            return Err(CampusError::Validation(
                "only the applicant can withdraw".to_string(),
            ));
        }
        check_text("review_notes", notes.as_ref())?;
        let mut application = self.applications().require(application_id)?;
        let was_withdrawn = application.status == ApplicationStatus::Withdrawn;
        application.status = status;
        application.reviewed_by = Some(actor.user_id().to_string());
        application.reviewed_at = Some(self.campus.now());
        if notes.is_some() {
            application.review_notes = notes;
        }
        self.applications().put(&application)?;
        if was_withdrawn {
            // Reinstated: it counts as a live applicant again.
            self.refresh_applicants(application.opportunity_id);
        }
        self.campus.activity().record(
            actor.user_id(),
            "application_reviewed",
            Some(format!("application={} status={:?}", application_id, status)),
        );
        Ok(application)
    }

    /// Withdraw one's own application.
    pub fn withdraw(&self, actor: &Actor, application_id: u64) -> CampusResult<StudentApplication> {
        let mut application = self.applications().require(application_id)?;
        actor.require_self_or(&application.student_id, &[Role::Admin], "withdraw")?;
        application.status = ApplicationStatus::Withdrawn;
        self.applications().put(&application)?;
        self.refresh_applicants(application.opportunity_id);
        self.campus.activity().record(
            actor.user_id(),
            "application_withdrawn",
            Some(format!("application={}", application_id)),
        );
        Ok(application)
    }

    /// A student's applications with their opportunities (when they exist).
    pub fn applications_for_student(
        &self,
        actor: &Actor,
        student_id: &str,
    ) -> CampusResult<Vec<ApplicationView>> {
        actor.require_self_or(student_id, RECRUITERS, "applications_for_student")?;
        self.views_for(student_id)
    }

    pub(crate) fn views_for(&self, student_id: &str) -> CampusResult<Vec<ApplicationView>> {
        self.applications()
            .find(Filter::eq("student_id", student_id))?
            .into_iter()
            .map(|application| {
                let opportunity = self.opportunities().get(application.opportunity_id)?;
                Ok(ApplicationView {
                    application,
                    opportunity,
                })
            })
            .collect()
    }

    pub fn applications_for_opportunity(
        &self,
        actor: &Actor,
        opportunity_id: u64,
    ) -> CampusResult<Vec<StudentApplication>> {
        actor.require_any(RECRUITERS, "applications_for_opportunity")?;
        self.applications()
            .find(Filter::eq("opportunity_id", opportunity_id))
    }

    /// Rewrite every counter that disagrees with the applications
    /// collection. Returns how many opportunities were corrected.
    pub fn reconcile_applicant_counts(&self) -> CampusResult<usize> {
        let mut corrected = 0;
        for mut opportunity in self.opportunities().all()? {
            let actual = self.live_applicants(opportunity.id)?;
            if actual != opportunity.applicants {
                tracing::info!(
                    event = "applicant_count_reconciled",
                    opportunity_id = opportunity.id,
                    stored = opportunity.applicants,
                    actual
                );
                opportunity.applicants = actual;
                self.opportunities().put(&opportunity)?;
                corrected += 1;
            }
        }
        Ok(corrected)
    }

    pub(crate) fn application_count_for(&self, student_id: &str) -> CampusResult<usize> {
        self.applications()
            .count_where(Filter::eq("student_id", student_id))
    }
}

// =============================================================================
// TESTS
// =============================================================================
