use chrono::NaiveDateTime;
use serde::Serialize;

use crate::engagement::EngagementStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EnrollmentStatus {
    NotStarted,
    InProgress,
    Complete,
    Expired,
}

impl EnrollmentStatus {
    /// LMS status codes: 0 not started, 1 in progress, 2 and 3 complete, 4 expired.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => EnrollmentStatus::InProgress,
            2 | 3 => EnrollmentStatus::Complete,
            4 => EnrollmentStatus::Expired,
            _ => EnrollmentStatus::NotStarted,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EnrollmentStatus::NotStarted => "Not Started",
            EnrollmentStatus::InProgress => "In Progress",
            EnrollmentStatus::Complete => "Complete",
            EnrollmentStatus::Expired => "Expired",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Enrollment {
    pub id: Option<String>,
    pub course_id: Option<String>,
    pub course_name: String,
    pub progress: f64,
    pub time_spent_minutes: i64,
    pub status: EnrollmentStatus,
    pub date_started: Option<NaiveDateTime>,
    pub date_edited: Option<NaiveDateTime>,
    pub date_completed: Option<NaiveDateTime>,
    pub date_added: Option<NaiveDateTime>,
    pub date_accessed: Option<NaiveDateTime>,
    pub score: Option<f64>,
}

impl Enrollment {
    pub fn new(course_name: &str, progress: f64, time_spent_minutes: i64) -> Self {
        Self {
            id: None,
            course_id: None,
            course_name: course_name.to_string(),
            progress,
            time_spent_minutes,
            status: EnrollmentStatus::NotStarted,
            date_started: None,
            date_edited: None,
            date_completed: None,
            date_added: None,
            date_accessed: None,
            score: None,
        }
    }

    /// Every populated timestamp on this enrollment.
    pub fn activity_dates(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        [
            self.date_started,
            self.date_edited,
            self.date_accessed,
            self.date_completed,
            self.date_added,
        ]
        .into_iter()
        .flatten()
    }

    /// Ordering key for "most recent attempt": completed, then edited, started, added.
    pub fn most_recent_activity(&self) -> Option<NaiveDateTime> {
        self.date_completed
            .or(self.date_edited)
            .or(self.date_started)
            .or(self.date_added)
    }

    /// Exam score when the LMS reports one, otherwise the progress percentage.
    pub fn effective_score(&self) -> f64 {
        self.score.unwrap_or(self.progress)
    }

    pub fn is_complete(&self) -> bool {
        self.status == EnrollmentStatus::Complete
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRecord {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub username: String,
    pub department_id: String,
    pub last_login: Option<NaiveDateTime>,
    pub enrollments: Vec<Enrollment>,
}

impl StudentRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedProgress {
    /// Index into the student's enrollment list.
    pub primary_enrollment: Option<usize>,
    pub display_course_name: String,
    pub overall_progress_pct: f64,
    pub total_time_minutes: i64,
    pub exam_prep_minutes: i64,
    pub primary_status: EnrollmentStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentSummary {
    pub student_id: String,
    pub full_name: String,
    pub email: String,
    pub department_id: String,
    pub progress: AggregatedProgress,
    pub engagement: EngagementStatus,
}
