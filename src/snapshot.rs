use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classify::{classify, CourseTag};
use crate::error::StoreError;
use crate::gaps::build_timeline;
use crate::models::{normalize_email, Enrollment};
use crate::readiness::{assess, ReadinessStatus};

/// Point-in-time study metrics for one student, written once per sync.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudySnapshot {
    pub email: String,
    pub taken_at: DateTime<Utc>,
    pub total_time_min: i64,
    pub prelicense_progress: f64,
    pub exam_prep_progress: f64,
    /// Most recent first.
    pub practice_scores: Vec<f64>,
    pub consecutive_passing: i32,
    pub readiness: ReadinessStatus,
    pub criteria_met: i32,
    pub study_gap_count: i32,
    pub total_gap_days: i64,
    pub largest_gap_days: i64,
    pub life_video_min: i64,
    pub health_video_min: i64,
    pub state_law_min: i64,
    pub state_law_completions: i32,
}

#[derive(Default)]
struct Tally {
    minutes: i64,
    progress: Vec<f64>,
}

impl Tally {
    fn add(&mut self, enrollment: &Enrollment) {
        self.minutes += enrollment.time_spent_minutes;
        self.progress.push(enrollment.progress);
    }

    fn mean_progress(&self) -> f64 {
        if self.progress.is_empty() {
            return 0.0;
        }
        let mean = self.progress.iter().sum::<f64>() / self.progress.len() as f64;
        (mean * 10.0).round() / 10.0
    }
}

pub fn compute_snapshot(
    email: &str,
    enrollments: &[Enrollment],
    course_type: Option<&str>,
    days_until_exam: Option<i64>,
    taken_at: DateTime<Utc>,
) -> StudySnapshot {
    let mut prelicensing = Tally::default();
    let mut exam_prep = Tally::default();
    let mut life_video_min = 0;
    let mut health_video_min = 0;
    let mut state_law = Tally::default();
    let mut state_law_completions = 0;

    for enrollment in enrollments {
        let tags = classify(&enrollment.course_name);
        if tags.contains(&CourseTag::PrelicensingMain) || tags.contains(&CourseTag::PrelicensingModule) {
            prelicensing.add(enrollment);
        }
        if tags.contains(&CourseTag::ExamPrep) {
            exam_prep.add(enrollment);
        }
        if tags.contains(&CourseTag::StateLaw) {
            state_law.add(enrollment);
            if enrollment.is_complete() {
                state_law_completions += 1;
            }
        }
        if tags.contains(&CourseTag::VideoLife) {
            life_video_min += enrollment.time_spent_minutes;
        }
        if tags.contains(&CourseTag::VideoHealth) {
            health_video_min += enrollment.time_spent_minutes;
        }
    }

    let assessment = assess(enrollments, course_type, days_until_exam);
    let timeline = build_timeline(enrollments);

    StudySnapshot {
        email: normalize_email(email),
        taken_at,
        total_time_min: prelicensing.minutes + exam_prep.minutes,
        prelicense_progress: prelicensing.mean_progress(),
        exam_prep_progress: exam_prep.mean_progress(),
        consecutive_passing: assessment.practice.consecutive_passing as i32,
        practice_scores: assessment.practice.scores.clone(),
        readiness: assessment.status,
        criteria_met: assessment.criteria_met() as i32,
        study_gap_count: timeline.gap_count as i32,
        total_gap_days: timeline.total_gap_days,
        largest_gap_days: timeline.largest_gap_days,
        life_video_min,
        health_video_min,
        state_law_min: state_law.minutes,
        state_law_completions,
    }
}

/// Durable history of study snapshots.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn write_snapshots(&self, snapshots: &[StudySnapshot]) -> Result<u64, StoreError>;

    /// Snapshots for one email, newest first.
    async fn read_history(&self, email: &str, limit: i64) -> Result<Vec<StudySnapshot>, StoreError>;

    /// Deletes snapshots older than `days`; returns how many were removed.
    async fn prune_older_than(&self, days: i64) -> Result<u64, StoreError>;
}
