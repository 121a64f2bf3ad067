//! # Results
//!
//! Per-student, per-semester result records and grade-point averages.
//!
//! SGPA is stored with the record (computed when not supplied). CGPA is
//! never stored: `get_results` derives it from every subject of every
//! semester on each read.

use crate::campus::Campus;
use crate::primitives::MAX_SUBJECT_CREDITS;
use crate::query::{Collection, Record};
use crate::storage::Filter;
use crate::storage::schema::RESULTS;
use crate::{Actor, CampusError, CampusResult, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const PUBLISHERS: &[Role] = &[Role::Faculty, Role::Admin];

/// Grade point of a letter grade. Unknown grades score 0.
#[must_use]
pub fn grade_point(grade: &str) -> f64 {
    match grade.trim().to_ascii_uppercase().as_str() {
        "A+" => 10.0,
        "A" => 9.0,
        "B+" => 8.0,
        "B" => 7.0,
        "C+" => 6.0,
        "C" => 5.0,
        "D" => 4.0,
        _ => 0.0,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Σ(grade point × credits) / Σ credits, rounded to two decimals.
/// Zero total credits gives 0.0.
#[must_use]
pub fn grade_point_average<'a>(subjects: impl IntoIterator<Item = &'a SubjectResult>) -> f64 {
    let (weighted, credits) = subjects
        .into_iter()
        .fold((0.0, 0.0), |(weighted, credits), subject| {
            let c = f64::from(subject.credits);
            (weighted + grade_point(&subject.grade) * c, credits + c)
        });
    if credits == 0.0 {
        0.0
    } else {
        round2(weighted / credits)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectResult {
    pub name: String,
    pub grade: String,
    pub credits: u32,
}

impl SubjectResult {
    pub fn new(name: impl Into<String>, grade: impl Into<String>, credits: u32) -> Self {
        Self {
            name: name.into(),
            grade: grade.into(),
            credits,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// `{student_id}_{semester}`
    pub id: String,
    pub student_id: String,
    pub semester: u32,
    pub subjects: Vec<SubjectResult>,
    pub sgpa: f64,
    pub published_by: String,
    pub published_at: DateTime<Utc>,
}

impl Record for ResultRecord {
    const COLLECTION: &'static str = RESULTS;
    const ENTITY: &'static str = "ResultRecord";
}

/// Key of a student's result record for `semester`.
#[must_use]
pub fn result_id(student_id: &str, semester: u32) -> String {
    format!("{}_{}", student_id, semester)
}

/// All of a student's semesters plus the derived CGPA.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentResults {
    pub student_id: String,
    /// Ordered by semester.
    pub semesters: Vec<ResultRecord>,
    pub cgpa: f64,
    pub total_credits: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct ResultsService<'c> {
    campus: &'c Campus,
}

impl Campus {
    pub fn results(&self) -> ResultsService<'_> {
        ResultsService { campus: self }
    }
}

impl ResultsService<'_> {
    fn records(&self) -> Collection<'_, ResultRecord> {
        self.campus.store.collection::<ResultRecord>()
    }

    /// Publish (or replace) a semester's results.
    pub fn save_results(
        &self,
        actor: &Actor,
        student_id: &str,
        semester: u32,
        subjects: Vec<SubjectResult>,
        sgpa: Option<f64>,
    ) -> CampusResult<ResultRecord> {
        actor.require_any(PUBLISHERS, "save_results")?;
        let student_id = student_id.trim();
        if student_id.is_empty() || semester == 0 {
            return Err(CampusError::Validation(
                "student_id and a semester >= 1 are required".to_string(),
            ));
        }
        if subjects.iter().any(|s| s.name.trim().is_empty()) {
            return Err(CampusError::Validation("subject name is required".to_string()));
        }
        if let Some(subject) = subjects.iter().find(|s| s.credits > MAX_SUBJECT_CREDITS) {
            return Err(CampusError::Validation(format!(
                "{} credits for '{}' exceeds {}",
                subject.credits, subject.name, MAX_SUBJECT_CREDITS
            )));
        }
        if let Some(value) = sgpa
            && !(0.0..=10.0).contains(&value)
        {
            return Err(CampusError::Validation(format!("sgpa {} out of range", value)));
        }

        let record = ResultRecord {
            id: result_id(student_id, semester),
            student_id: student_id.to_string(),
            semester,
            sgpa: sgpa.map(round2).unwrap_or_else(|| grade_point_average(&subjects)),
            subjects,
            published_by: actor.user_id().to_string(),
            published_at: self.campus.now(),
        };
        self.records().put(&record)?;
        tracing::info!(event = "results_saved", record_id = %record.id, sgpa = record.sgpa);
        self.campus.activity().record(
            actor.user_id(),
            "results_saved",
            Some(format!("record={}", record.id)),
        );
        Ok(record)
    }

    /// Every semester of a student, with CGPA over all subjects.
    pub fn get_results(&self, actor: &Actor, student_id: &str) -> CampusResult<StudentResults> {
        actor.require_self_or(student_id, PUBLISHERS, "get_results")?;
        self.results_for(student_id)
    }

    pub(crate) fn results_for(&self, student_id: &str) -> CampusResult<StudentResults> {
        let mut semesters = self.records().find(Filter::eq("student_id", student_id))?;
        semesters.sort_by_key(|r| r.semester);
        let subjects: Vec<&SubjectResult> =
            semesters.iter().flat_map(|r| r.subjects.iter()).collect();
        Ok(StudentResults {
            student_id: student_id.to_string(),
            cgpa: grade_point_average(subjects.iter().copied()),
            total_credits: subjects.iter().map(|s| u64::from(s.credits)).sum(),
            semesters,
        })
    }

    /// One semester's record.
    pub fn get_semester(
        &self,
        actor: &Actor,
        student_id: &str,
        semester: u32,
    ) -> CampusResult<Option<ResultRecord>> {
        actor.require_self_or(student_id, PUBLISHERS, "get_semester")?;
        self.records().get(result_id(student_id, semester))
    }

    pub fn delete_results(&self, actor: &Actor, student_id: &str, semester: u32) -> CampusResult<()> {
        actor.require_admin("delete_results")?;
        let id = result_id(student_id, semester);
        if !self.records().delete(id.as_str())? {
            return Err(CampusError::not_found(ResultRecord::ENTITY, id));
        }
        self.campus.activity().record(
            actor.user_id(),
            "results_deleted",
            Some(format!("record={}", id)),
        );
        Ok(())
    }
}
