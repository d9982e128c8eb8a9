use std::collections::BTreeSet;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum CourseTag {
    PrelicensingMain,
    PrelicensingModule,
    ExamPrep,
    PracticeExam,
    StateLaw,
    VideoLife,
    VideoHealth,
}

pub type TagSet = BTreeSet<CourseTag>;

const PRELICENSING_MARKERS: &[&str] = &["pre-licens", "prelicens", "pre licens"];
const MODULE_MARKERS: &[&str] = &["module", "chapter", "lesson", "unit"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Tags a course name using the course catalogue's naming convention.
///
/// Matching is case-insensitive substring search. Tags are independent, so a
/// name such as "Life Video Law Review" carries both `StateLaw` and
/// `VideoLife`. A practice exam is never also exam prep.
pub fn classify(course_name: &str) -> TagSet {
    let name = course_name.to_lowercase();
    let mut tags = TagSet::new();

    let practice = name.contains("practice");
    if practice {
        tags.insert(CourseTag::PracticeExam);
    }

    let module = contains_any(&name, MODULE_MARKERS);
    if contains_any(&name, PRELICENSING_MARKERS) && !module {
        tags.insert(CourseTag::PrelicensingMain);
    } else if module {
        tags.insert(CourseTag::PrelicensingModule);
    }

    if !practice && (name.contains("prep") || name.contains("study")) {
        tags.insert(CourseTag::ExamPrep);
    }

    if name.contains("law") || name.contains("specific") {
        tags.insert(CourseTag::StateLaw);
    }

    if name.contains("video") {
        if name.contains("life") {
            tags.insert(CourseTag::VideoLife);
        }
        if name.contains("health") {
            tags.insert(CourseTag::VideoHealth);
        }
    }

    tags
}
