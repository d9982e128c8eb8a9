use crate::classify::{classify, CourseTag};
use crate::models::{AggregatedProgress, Enrollment, EnrollmentStatus};

const NO_COURSE: &str = "No Course";
const PRELICENSE_FALLBACK_NAME: &str = "Pre-License Course";

/// Enrollment indices grouped by role in the curriculum.
#[derive(Debug, Default, PartialEq)]
pub struct EnrollmentPartition {
    pub main_prelicensing: Option<usize>,
    pub chapters: Vec<usize>,
    pub exam_prep: Vec<usize>,
    pub first_other_in_progress: Option<usize>,
}

pub fn partition(enrollments: &[Enrollment]) -> EnrollmentPartition {
    let mut parts = EnrollmentPartition::default();

    for (index, enrollment) in enrollments.iter().enumerate() {
        let tags = classify(&enrollment.course_name);

        if tags.contains(&CourseTag::PrelicensingMain) {
            if parts.main_prelicensing.is_some() {
                tracing::debug!(
                    course = %enrollment.course_name,
                    "Multiple main pre-licensing enrollments, keeping the last"
                );
            }
            parts.main_prelicensing = Some(index);
        } else if tags.contains(&CourseTag::PrelicensingModule) {
            parts.chapters.push(index);
        } else if tags.contains(&CourseTag::ExamPrep) {
            parts.exam_prep.push(index);
        } else if enrollment.status != EnrollmentStatus::Complete
            && parts.first_other_in_progress.is_none()
        {
            parts.first_other_in_progress = Some(index);
        }
    }

    parts
}

/// Rolls a student's enrollments into the single summary shown per student.
pub fn aggregate(enrollments: &[Enrollment]) -> AggregatedProgress {
    let exam_prep_minutes = enrollments
        .iter()
        .filter(|e| classify(&e.course_name).contains(&CourseTag::ExamPrep))
        .map(|e| e.time_spent_minutes)
        .sum();

    if enrollments.is_empty() {
        return AggregatedProgress {
            primary_enrollment: None,
            display_course_name: NO_COURSE.to_string(),
            overall_progress_pct: 0.0,
            total_time_minutes: 0,
            exam_prep_minutes,
            primary_status: EnrollmentStatus::NotStarted,
        };
    }

    let parts = partition(enrollments);

    if let Some(main) = parts.main_prelicensing {
        let enrollment = &enrollments[main];
        let display_course_name = if enrollment.course_name.is_empty() {
            PRELICENSE_FALLBACK_NAME.to_string()
        } else {
            enrollment.course_name.clone()
        };
        return AggregatedProgress {
            primary_enrollment: Some(main),
            display_course_name,
            overall_progress_pct: enrollment.progress,
            total_time_minutes: enrollment.time_spent_minutes,
            exam_prep_minutes,
            primary_status: enrollment.status,
        };
    }

    if let Some(&first_chapter) = parts.chapters.first() {
        let chapters: Vec<&Enrollment> = parts.chapters.iter().map(|&i| &enrollments[i]).collect();
        let mean = chapters.iter().map(|e| e.progress).sum::<f64>() / chapters.len() as f64;
        return AggregatedProgress {
            primary_enrollment: Some(first_chapter),
            display_course_name: PRELICENSE_FALLBACK_NAME.to_string(),
            overall_progress_pct: mean,
            total_time_minutes: chapters.iter().map(|e| e.time_spent_minutes).sum(),
            exam_prep_minutes,
            primary_status: enrollments[first_chapter].status,
        };
    }

    let primary = parts
        .exam_prep
        .first()
        .copied()
        .or(parts.first_other_in_progress)
        .unwrap_or(0);
    let enrollment = &enrollments[primary];
    let display_course_name = if enrollment.course_name.is_empty() {
        NO_COURSE.to_string()
    } else {
        enrollment.course_name.clone()
    };

    AggregatedProgress {
        primary_enrollment: Some(primary),
        display_course_name,
        overall_progress_pct: enrollment.progress,
        total_time_minutes: enrollment.time_spent_minutes,
        exam_prep_minutes,
        primary_status: enrollment.status,
    }
}
