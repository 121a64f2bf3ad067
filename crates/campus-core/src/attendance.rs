//! # Attendance
//!
//! Attendance marks, per-student statistics and listings.
//!
//! Marking always appends: two marks for the same student, date and subject
//! are two class periods, not a conflict. Once logged, student, date,
//! subject, timestamp and marker are immutable; edits only change status,
//! semester or branch and stamp `updated_by` / `updated_at`.

use crate::campus::Campus;
use crate::query::Record;
use crate::storage::schema::ATTENDANCE;
use crate::storage::{Filter, IndexValue, Order, Query};
use crate::{Actor, CampusError, CampusResult, Role};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

const MARKERS: &[Role] = &[Role::Faculty, Role::Admin];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    #[default]
    Present,
    Absent,
    Late,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(default)]
    pub id: u64,
    pub student_id: String,
    pub date: NaiveDate,
    pub subject: String,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub semester: Option<u32>,
    #[serde(default)]
    pub branch: Option<String>,
    pub marked_by: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub updated_by: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record for AttendanceRecord {
    const COLLECTION: &'static str = ATTENDANCE;
    const ENTITY: &'static str = "AttendanceRecord";
}

/// Input for `mark`. Date defaults to today, status to present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAttendance {
    pub student_id: String,
    pub subject: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub status: Option<AttendanceStatus>,
    #[serde(default)]
    pub semester: Option<u32>,
    #[serde(default)]
    pub branch: Option<String>,
}

/// Mutable fields of a mark.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttendanceUpdate {
    #[serde(default)]
    pub status: Option<AttendanceStatus>,
    #[serde(default)]
    pub semester: Option<u32>,
    #[serde(default)]
    pub branch: Option<String>,
}

/// Per-student rollup. All zero when the student has no marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttendanceStats {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    /// round(present / total * 100)
    pub percentage: u32,
}

impl AttendanceStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AttendanceRecord>) -> Self {
        let mut stats = Self::default();
        for record in records {
            stats.total += 1;
            match record.status {
                AttendanceStatus::Present => stats.present += 1,
                AttendanceStatus::Absent => stats.absent += 1,
                AttendanceStatus::Late => stats.late += 1,
            }
        }
        if stats.total > 0 {
            stats.percentage = (stats.present as f64 / stats.total as f64 * 100.0).round() as u32;
        }
        stats
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AttendanceService<'c> {
    campus: &'c Campus,
}

impl Campus {
    pub fn attendance(&self) -> AttendanceService<'_> {
        AttendanceService { campus: self }
    }
}

impl AttendanceService<'_> {
    fn records(&self) -> crate::query::Collection<'_, AttendanceRecord> {
        self.campus.store.collection::<AttendanceRecord>()
    }

    /// Append a mark.
    pub fn mark(&self, actor: &Actor, input: NewAttendance) -> CampusResult<AttendanceRecord> {
        actor.require_any(MARKERS, "mark_attendance")?;
        let student_id = input.student_id.trim();
        let subject = input.subject.trim();
        if student_id.is_empty() || subject.is_empty() {
            return Err(CampusError::Validation(
                "student_id and subject are required".to_string(),
            ));
        }

        let record = AttendanceRecord {
            id: 0,
            student_id: student_id.to_string(),
            date: input.date.unwrap_or_else(|| self.campus.today()),
            subject: subject.to_string(),
            status: input.status.unwrap_or_default(),
            semester: input.semester,
            branch: input.branch,
            marked_by: actor.user_id().to_string(),
            timestamp: self.campus.now(),
            updated_by: None,
            updated_at: None,
        };
        let saved = self.records().save(&record)?;
        self.campus.activity().record(
            actor.user_id(),
            "attendance_marked",
            Some(format!("id={} student={}", saved.id, saved.student_id)),
        );
        Ok(saved)
    }

    /// Change the mutable fields of a mark.
    pub fn update(
        &self,
        actor: &Actor,
        id: u64,
        update: AttendanceUpdate,
    ) -> CampusResult<AttendanceRecord> {
        actor.require_any(MARKERS, "update_attendance")?;
        let mut record = self.records().require(id)?;
        if let Some(status) = update.status {
            record.status = status;
        }
        if update.semester.is_some() {
            record.semester = update.semester;
        }
        if update.branch.is_some() {
            record.branch = update.branch;
        }
        record.updated_by = Some(actor.user_id().to_string());
        record.updated_at = Some(self.campus.now());
        self.records().put(&record)?;
        self.campus.activity().record(
            actor.user_id(),
            "attendance_updated",
            Some(format!("id={}", id)),
        );
        Ok(record)
    }

    pub fn delete(&self, actor: &Actor, id: u64) -> CampusResult<()> {
        actor.require_any(MARKERS, "delete_attendance")?;
        if !self.records().delete(id)? {
            return Err(CampusError::not_found(AttendanceRecord::ENTITY, id));
        }
        self.campus.activity().record(
            actor.user_id(),
            "attendance_deleted",
            Some(format!("id={}", id)),
        );
        Ok(())
    }

    /// Statistics for one student (self, faculty or admin).
    pub fn stats(&self, actor: &Actor, student_id: &str) -> CampusResult<AttendanceStats> {
        actor.require_self_or(student_id, MARKERS, "attendance_stats")?;
        self.stats_for(student_id)
    }

    pub(crate) fn stats_for(&self, student_id: &str) -> CampusResult<AttendanceStats> {
        let records = self.records().find(Filter::eq("student_id", student_id))?;
        Ok(AttendanceStats::from_records(&records))
    }

    /// A student's marks, oldest first, optionally for one subject.
    pub fn for_student(
        &self,
        actor: &Actor,
        student_id: &str,
        subject: Option<&str>,
    ) -> CampusResult<Vec<AttendanceRecord>> {
        actor.require_self_or(student_id, MARKERS, "attendance_for_student")?;
        let filter = match subject {
            Some(subject) => Filter::eq("student_subject", IndexValue::tuple([student_id, subject])),
            None => Filter::eq("student_id", student_id),
        };
        self.records().find(filter)
    }

    /// Every mark on `date`.
    pub fn for_date(&self, actor: &Actor, date: NaiveDate) -> CampusResult<Vec<AttendanceRecord>> {
        actor.require_any(MARKERS, "attendance_for_date")?;
        self.records().find(Filter::eq("date", date.to_string()))
    }

    /// A student's marks with `from <= date <= to`, in date order.
    pub fn for_student_between(
        &self,
        actor: &Actor,
        student_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> CampusResult<Vec<AttendanceRecord>> {
        actor.require_self_or(student_id, MARKERS, "attendance_between")?;
        if from > to {
            return Err(CampusError::Validation(format!(
                "empty date range {}..{}",
                from, to
            )));
        }
        let query = Query::new(Filter::range(
            "student_date",
            Some(IndexValue::tuple([student_id.to_string(), from.to_string()])),
            Some(IndexValue::tuple([student_id.to_string(), to.to_string()])),
        ))
        .order(Order::Index);
        self.records().query(&query)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::campus::test_support::{actor, campus};

    fn mark(student: &str, date: Option<&str>, status: AttendanceStatus) -> NewAttendance {
        NewAttendance {
            student_id: student.to_string(),
            subject: "math".to_string(),
            date: date.map(|d| d.parse().unwrap()),
            status: Some(status),
            ..NewAttendance::default()
        }
    }

    #[test]
    fn mark_defaults_to_today_and_present() {
        let (campus, _) = campus();
        let (prof, _) = actor(&campus, "prof", Role::Faculty);
        let record = campus
            .attendance()
            .mark(
                &prof,
                NewAttendance {
                    student_id: "s1".to_string(),
                    subject: "math".to_string(),
                    ..NewAttendance::default()
                },
            )
            .unwrap();
        assert_eq!(record.date, campus.today());
        assert_eq!(record.status, AttendanceStatus::Present);
        assert_eq!(record.marked_by, "prof");
    }

    #[test]
    fn duplicates_are_separate_periods() {
        let (campus, _) = campus();
        let (prof, _) = actor(&campus, "prof", Role::Faculty);
        let service = campus.attendance();
        let a = service.mark(&prof, mark("s1", Some("2024-03-01"), AttendanceStatus::Present)).unwrap();
        let b = service.mark(&prof, mark("s1", Some("2024-03-01"), AttendanceStatus::Present)).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(service.stats_for("s1").unwrap().total, 2);
    }

    #[test]
    fn stats_percentage() {
        let (campus, _) = campus();
        let (prof, _) = actor(&campus, "prof", Role::Faculty);
        let service = campus.attendance();
        for status in [
            AttendanceStatus::Present,
            AttendanceStatus::Present,
            AttendanceStatus::Absent,
            AttendanceStatus::Late,
            AttendanceStatus::Present,
            AttendanceStatus::Absent,
        ] {
            service.mark(&prof, mark("s1", None, status)).unwrap();
        }
        let stats = service.stats(&prof, "s1").unwrap();
        assert_eq!(stats.total, 6);
        assert_eq!(stats.present, 3);
        assert_eq!(stats.absent, 2);
        assert_eq!(stats.late, 1);
        assert_eq!(stats.percentage, 50);

        assert_eq!(service.stats(&prof, "nobody").unwrap(), AttendanceStats::default());
    }

    #[test]
    fn update_stamps_editor_and_keeps_identity() {
        let (campus, clock) = campus();
        let (prof, _) = actor(&campus, "prof", Role::Faculty);
        let (admin, _) = actor(&campus, "root", Role::Admin);
        let service = campus.attendance();
        let original = service.mark(&prof, mark("s1", Some("2024-03-01"), AttendanceStatus::Absent)).unwrap();

        clock.advance(chrono::Duration::hours(2));
        let updated = service
            .update(
                &admin,
                original.id,
                AttendanceUpdate {
                    status: Some(AttendanceStatus::Late),
                    ..AttendanceUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.status, AttendanceStatus::Late);
        assert_eq!(updated.marked_by, "prof");
        assert_eq!(updated.timestamp, original.timestamp);
        assert_eq!(updated.updated_by.as_deref(), Some("root"));
        assert_eq!(updated.updated_at, Some(campus.now()));
    }

    #[test]
    fn missing_targets_not_found() {
        let (campus, _) = campus();
        let (prof, _) = actor(&campus, "prof", Role::Faculty);
        let service = campus.attendance();
        assert!(matches!(
            service.update(&prof, 42, AttendanceUpdate::default()),
            Err(CampusError::NotFound { .. })
        ));
        assert!(matches!(
            service.delete(&prof, 42),
            Err(CampusError::NotFound { .. })
        ));
    }

    #[test]
    fn students_cannot_mark() {
        let (campus, _) = campus();
        let (student, _) = actor(&campus, "s1", Role::Student);
        let result = campus
            .attendance()
            .mark(&student, mark("s1", None, AttendanceStatus::Present));
        assert!(matches!(result, Err(CampusError::PermissionDenied(_))));
        assert!(campus.attendance().stats(&student, "s1").is_ok());
        assert!(campus.attendance().stats(&student, "s2").is_err());
    }

    #[test]
    fn listings() {
        let (campus, _) = campus();
        let (prof, _) = actor(&campus, "prof", Role::Faculty);
        let service = campus.attendance();
        for date in ["2024-03-05", "2024-03-01", "2024-03-09"] {
            service.mark(&prof, mark("s1", Some(date), AttendanceStatus::Present)).unwrap();
        }
        service
            .mark(
                &prof,
                NewAttendance {
                    subject: "physics".to_string(),
                    ..mark("s1", Some("2024-03-05"), AttendanceStatus::Absent)
                },
            )
            .unwrap();
        service.mark(&prof, mark("s2", Some("2024-03-05"), AttendanceStatus::Present)).unwrap();

        assert_eq!(service.for_student(&prof, "s1", None).unwrap().len(), 4);
        assert_eq!(service.for_student(&prof, "s1", Some("physics")).unwrap().len(), 1);
        let day = "2024-03-05".parse().unwrap();
        assert_eq!(service.for_date(&prof, day).unwrap().len(), 3);

        let between: Vec<_> = service
            .for_student_between(
                &prof,
                "s1",
                "2024-03-01".parse().unwrap(),
                "2024-03-05".parse().unwrap(),
            )
            .unwrap()
            .into_iter()
            .map(|r| r.date.to_string())
            .collect();
        assert_eq!(between, vec!["2024-03-01", "2024-03-05", "2024-03-05"]);
        assert_eq!(service.stats_for("s2").unwrap().total, 1);
    }
}
