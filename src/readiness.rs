//! Exam readiness scoring.
//!
//! Four independent criteria are evaluated over the full enrollment set:
//! practice exam streak, time in the pre-licensing course, state law
//! completion and video coverage. The aggregate is GREEN when all four are
//! met, YELLOW for two or three, RED otherwise. An exam two days out or less
//! with anything unmet is RED.

use std::cmp::Reverse;

use serde::Serialize;

use crate::classify::{classify, CourseTag};
use crate::models::Enrollment;

const PASSING_SCORE: f64 = 80.0;
const REQUIRED_STREAK: usize = 3;
const LIFE_AND_HEALTH_HOURS: f64 = 30.0;
const SINGLE_LINE_HOURS: f64 = 20.0;
const STATE_LAW_HOURS: f64 = 1.5;
const VIDEO_MINUTES: i64 = 30;
const FINAL_STRETCH_DAYS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ReadinessStatus {
    Green,
    Yellow,
    Red,
}

impl ReadinessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessStatus::Green => "GREEN",
            ReadinessStatus::Yellow => "YELLOW",
            ReadinessStatus::Red => "RED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriterionResult {
    pub met: bool,
    pub label: &'static str,
    pub requirement: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PracticeSummary {
    /// Scores ordered most recent first.
    pub scores: Vec<f64>,
    pub consecutive_passing: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadinessAssessment {
    pub status: ReadinessStatus,
    pub practice_exams: CriterionResult,
    pub time_in_course: CriterionResult,
    pub state_laws: CriterionResult,
    pub videos: CriterionResult,
    pub practice: PracticeSummary,
}

impl ReadinessAssessment {
    pub fn criteria(&self) -> [&CriterionResult; 4] {
        [
            &self.practice_exams,
            &self.time_in_course,
            &self.state_laws,
            &self.videos,
        ]
    }

    pub fn criteria_met(&self) -> usize {
        self.criteria().iter().filter(|c| c.met).count()
    }
}

/// Content lines an exam covers, derived from the roster's course string.
/// An unknown course type requires both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentLines {
    pub life: bool,
    pub health: bool,
}

impl ContentLines {
    pub fn from_course_type(course_type: Option<&str>) -> Self {
        match course_type.map(str::trim).filter(|value| !value.is_empty()) {
            None => ContentLines { life: true, health: true },
            Some(course_type) => {
                let lower = course_type.to_lowercase();
                ContentLines {
                    life: lower.contains("life"),
                    health: lower.contains("health"),
                }
            }
        }
    }

    fn required_hours(&self) -> f64 {
        if self.life && self.health {
            LIFE_AND_HEALTH_HOURS
        } else {
            SINGLE_LINE_HOURS
        }
    }
}

fn minutes_tagged(enrollments: &[Enrollment], tag: CourseTag) -> i64 {
    enrollments
        .iter()
        .filter(|e| classify(&e.course_name).contains(&tag))
        .map(|e| e.time_spent_minutes)
        .sum()
}

pub fn practice_summary(enrollments: &[Enrollment]) -> PracticeSummary {
    let mut practice: Vec<&Enrollment> = enrollments
        .iter()
        .filter(|e| classify(&e.course_name).contains(&CourseTag::PracticeExam))
        .collect();
    // Stable sort: undated attempts sink to the end in input order.
    practice.sort_by_key(|e| Reverse(e.most_recent_activity()));

    let scores: Vec<f64> = practice.iter().map(|e| e.effective_score()).collect();
    let consecutive_passing = scores
        .iter()
        .take_while(|score| **score >= PASSING_SCORE)
        .count();

    PracticeSummary {
        scores,
        consecutive_passing,
    }
}

fn practice_criterion(practice: &PracticeSummary) -> CriterionResult {
    let recent: Vec<String> = practice
        .scores
        .iter()
        .take(5)
        .map(|score| format!("{score:.0}"))
        .collect();

    CriterionResult {
        met: practice.consecutive_passing >= REQUIRED_STREAK,
        label: "Practice Exams",
        requirement: format!("{REQUIRED_STREAK} consecutive scores >= {PASSING_SCORE:.0}%"),
        detail: format!(
            "{} consecutive passing of {} attempts (recent: {})",
            practice.consecutive_passing,
            practice.scores.len(),
            if recent.is_empty() {
                "none".to_string()
            } else {
                recent.join(", ")
            }
        ),
    }
}

fn time_criterion(enrollments: &[Enrollment], lines: ContentLines) -> CriterionResult {
    let minutes = minutes_tagged(enrollments, CourseTag::PrelicensingMain)
        + minutes_tagged(enrollments, CourseTag::PrelicensingModule);
    let hours = minutes as f64 / 60.0;
    let required = lines.required_hours();

    CriterionResult {
        met: hours >= required,
        label: "Time in Course",
        requirement: format!(">= {required:.0} hours"),
        detail: format!("{hours:.1} hours logged"),
    }
}

fn state_law_criterion(enrollments: &[Enrollment]) -> CriterionResult {
    let laws: Vec<&Enrollment> = enrollments
        .iter()
        .filter(|e| classify(&e.course_name).contains(&CourseTag::StateLaw))
        .collect();
    let completions = laws.iter().filter(|e| e.is_complete()).count();
    let hours = laws.iter().map(|e| e.time_spent_minutes).sum::<i64>() as f64 / 60.0;

    CriterionResult {
        met: completions >= 1 && hours >= STATE_LAW_HOURS,
        label: "State Laws",
        requirement: format!(">= 1 completion AND >= {STATE_LAW_HOURS} hours"),
        detail: format!(
            "{completions} completed of {} courses, {hours:.1} hours",
            laws.len()
        ),
    }
}

fn video_criterion(enrollments: &[Enrollment], lines: ContentLines) -> CriterionResult {
    let mut met = true;
    let mut detail = Vec::new();

    if lines.life {
        let minutes = minutes_tagged(enrollments, CourseTag::VideoLife);
        met &= minutes >= VIDEO_MINUTES;
        detail.push(format!("life {minutes} min"));
    }
    if lines.health {
        let minutes = minutes_tagged(enrollments, CourseTag::VideoHealth);
        met &= minutes >= VIDEO_MINUTES;
        detail.push(format!("health {minutes} min"));
    }

    CriterionResult {
        met,
        label: "Videos",
        requirement: format!("{VIDEO_MINUTES}+ min per required type"),
        detail: if detail.is_empty() {
            "no video line required".to_string()
        } else {
            detail.join(", ")
        },
    }
}

fn overall_status(criteria_met: usize, days_until_exam: Option<i64>) -> ReadinessStatus {
    match criteria_met {
        4 => ReadinessStatus::Green,
        2 | 3 if days_until_exam.is_some_and(|days| days <= FINAL_STRETCH_DAYS) => {
            ReadinessStatus::Red
        }
        2 | 3 => ReadinessStatus::Yellow,
        _ => ReadinessStatus::Red,
    }
}

pub fn assess(
    enrollments: &[Enrollment],
    course_type: Option<&str>,
    days_until_exam: Option<i64>,
) -> ReadinessAssessment {
    let lines = ContentLines::from_course_type(course_type);
    let practice = practice_summary(enrollments);

    let mut assessment = ReadinessAssessment {
        status: ReadinessStatus::Red,
        practice_exams: practice_criterion(&practice),
        time_in_course: time_criterion(enrollments, lines),
        state_laws: state_law_criterion(enrollments),
        videos: video_criterion(enrollments, lines),
        practice,
    };
    assessment.status = overall_status(assessment.criteria_met(), days_until_exam);
    assessment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EnrollmentStatus;
    use chrono::NaiveDate;

    fn practice_attempt(day: u32, score: f64) -> Enrollment {
        let mut e = Enrollment::new("Life Practice Exam", score, 60);
        e.date_completed = NaiveDate::from_ymd_opt(2026, 3, day)
            .and_then(|d| d.and_hms_opt(12, 0, 0));
        e
    }

    fn completed(name: &str, minutes: i64) -> Enrollment {
        let mut e = Enrollment::new(name, 100.0, minutes);
        e.status = EnrollmentStatus::Complete;
        e
    }

    fn ready_student() -> Vec<Enrollment> {
        vec![
            Enrollment::new("Life & Health Pre-License Course", 100.0, 31 * 60),
            practice_attempt(10, 92.0),
            practice_attempt(9, 88.0),
            practice_attempt(8, 84.0),
            completed("Alabama State Law", 95),
            Enrollment::new("Life Video Series", 100.0, 45),
            Enrollment::new("Health Video Series", 100.0, 40),
        ]
    }

    #[test]
    fn practice_streak_breaks_on_first_failure() {
        let summary = practice_summary(&[
            practice_attempt(8, 65.0),
            practice_attempt(10, 92.0),
            practice_attempt(9, 88.0),
        ]);
        assert_eq!(summary.scores, vec![92.0, 88.0, 65.0]);
        assert_eq!(summary.consecutive_passing, 2);
        assert!(!practice_criterion(&summary).met);

        let summary = practice_summary(&[
            practice_attempt(10, 92.0),
            practice_attempt(9, 88.0),
            practice_attempt(8, 84.0),
        ]);
        assert_eq!(summary.consecutive_passing, 3);
        assert!(practice_criterion(&summary).met);
    }

    #[test]
    fn explicit_score_overrides_progress() {
        let mut attempt = practice_attempt(10, 100.0);
        attempt.score = Some(70.0);
        let summary = practice_summary(&[attempt]);
        assert_eq!(summary.scores, vec![70.0]);
        assert_eq!(summary.consecutive_passing, 0);
    }

    #[test]
    fn all_criteria_met_is_green() {
        let assessment = assess(&ready_student(), Some("Life & Health"), Some(1));
        assert_eq!(assessment.criteria_met(), 4);
        assert_eq!(assessment.status, ReadinessStatus::Green);
    }

    #[test]
    fn time_requirement_depends_on_course_type() {
        let enrollments = vec![
            Enrollment::new("Life Pre-License Course", 50.0, 20 * 60),
            Enrollment::new("Chapter 1", 100.0, 5 * 60),
        ];
        assert!(assess(&enrollments, Some("Life"), None).time_in_course.met);
        assert!(!assess(&enrollments, Some("Life & Health"), None).time_in_course.met);
        assert!(!assess(&enrollments, None, None).time_in_course.met);
    }

    #[test]
    fn state_laws_need_completion_and_hours() {
        let short = vec![completed("State Law", 60)];
        assert!(!assess(&short, None, None).state_laws.met);

        let incomplete = vec![Enrollment::new("State Law", 50.0, 120)];
        assert!(!assess(&incomplete, None, None).state_laws.met);

        let split = vec![completed("State Law Part 1", 45), Enrollment::new("State Specific Rules", 30.0, 60)];
        assert!(assess(&split, None, None).state_laws.met);
    }

    #[test]
    fn videos_require_every_needed_line() {
        let life_only = vec![Enrollment::new("Life Video Series", 100.0, 45)];
        assert!(assess(&life_only, Some("Life"), None).videos.met);
        assert!(!assess(&life_only, Some("Life & Health"), None).videos.met);
        assert!(!assess(&life_only, Some("Health"), None).videos.met);
        assert!(assess(&[], Some("Property & Casualty"), None).videos.met);
    }

    #[test]
    fn partial_readiness_turns_red_close_to_exam() {
        let mut enrollments = ready_student();
        enrollments.retain(|e| !e.course_name.contains("Video"));

        let assessment = assess(&enrollments, Some("Life & Health"), Some(10));
        assert_eq!(assessment.criteria_met(), 3);
        assert_eq!(assessment.status, ReadinessStatus::Yellow);

        let assessment = assess(&enrollments, Some("Life & Health"), Some(2));
        assert_eq!(assessment.status, ReadinessStatus::Red);

        let assessment = assess(&enrollments, Some("Life & Health"), None);
        assert_eq!(assessment.status, ReadinessStatus::Yellow);
    }

    #[test]
    fn one_or_fewer_criteria_is_red() {
        let assessment = assess(&[Enrollment::new("Life Video Series", 10.0, 45)], Some("Life"), None);
        assert_eq!(assessment.criteria_met(), 1);
        assert_eq!(assessment.status, ReadinessStatus::Red);
    }

    #[test]
    fn assessment_is_deterministic() {
        let enrollments = ready_student();
        assert_eq!(
            assess(&enrollments, Some("Life"), Some(5)),
            assess(&enrollments, Some("Life"), Some(5))
        );
    }
}
