use chrono::NaiveDateTime;
use serde::Serialize;

use crate::models::{AggregatedProgress, EnrollmentStatus, StudentRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngagementStatus {
    Complete,
    Active,
    Warning,
    ReEngage,
    Abandoned,
    CourseExpired,
}

impl EngagementStatus {
    pub fn priority(&self) -> u8 {
        match self {
            EngagementStatus::Complete => 0,
            EngagementStatus::Active => 1,
            EngagementStatus::Warning => 2,
            EngagementStatus::ReEngage => 3,
            EngagementStatus::Abandoned => 4,
            EngagementStatus::CourseExpired => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementStatus::Complete => "COMPLETE",
            EngagementStatus::Active => "ACTIVE",
            EngagementStatus::Warning => "WARNING",
            EngagementStatus::ReEngage => "RE-ENGAGE",
            EngagementStatus::Abandoned => "ABANDONED",
            EngagementStatus::CourseExpired => "COURSE EXPIRED",
        }
    }
}

pub fn status_from_last_login(last_login: Option<NaiveDateTime>, now: NaiveDateTime) -> EngagementStatus {
    let Some(last_login) = last_login else {
        return EngagementStatus::Abandoned;
    };

    let days = (now - last_login).num_seconds() as f64 / 86_400.0;
    if days <= 1.0 {
        EngagementStatus::Active
    } else if days <= 3.0 {
        EngagementStatus::Warning
    } else if days <= 7.0 {
        EngagementStatus::ReEngage
    } else {
        EngagementStatus::Abandoned
    }
}

/// Completion wins over expiry, which wins over login recency.
pub fn engagement_status(
    student: &StudentRecord,
    progress: &AggregatedProgress,
    now: NaiveDateTime,
) -> EngagementStatus {
    if progress.overall_progress_pct >= 100.0 {
        EngagementStatus::Complete
    } else if progress.primary_status == EnrollmentStatus::Expired {
        EngagementStatus::CourseExpired
    } else {
        status_from_last_login(student.last_login, now)
    }
}
