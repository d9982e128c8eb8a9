use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::Enrollment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PeriodKind {
    Study,
    Gap,
}

/// An inclusive run of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub kind: PeriodKind,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: i64,
}

impl Period {
    fn new(kind: PeriodKind, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            kind,
            start,
            end,
            days: (end - start).num_days() + 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GapTimeline {
    pub periods: Vec<Period>,
    pub gap_count: usize,
    pub total_gap_days: i64,
    pub largest_gap_days: i64,
    pub last_gap_date: Option<NaiveDate>,
    pub study_dates_count: usize,
}

pub fn study_dates(enrollments: &[Enrollment]) -> BTreeSet<NaiveDate> {
    enrollments
        .iter()
        .flat_map(Enrollment::activity_dates)
        .map(|timestamp| timestamp.date())
        .collect()
}

/// Splits the span between a student's first and last recorded activity into
/// alternating study and gap periods.
///
/// Consecutive activity dates more than one day apart open a gap covering the
/// days strictly between them. The periods tile `[first, last]` exactly.
pub fn build_timeline(enrollments: &[Enrollment]) -> GapTimeline {
    let dates = study_dates(enrollments);
    let study_dates_count = dates.len();
    if study_dates_count < 2 {
        return GapTimeline {
            study_dates_count,
            ..GapTimeline::default()
        };
    }

    let dates: Vec<NaiveDate> = dates.into_iter().collect();
    let mut periods = Vec::new();
    let mut study_start = dates[0];

    for pair in dates.windows(2) {
        let (prev, curr) = (pair[0], pair[1]);
        if (curr - prev).num_days() > 1 {
            periods.push(Period::new(PeriodKind::Study, study_start, prev));
            periods.push(Period::new(
                PeriodKind::Gap,
                prev + chrono::Duration::days(1),
                curr - chrono::Duration::days(1),
            ));
            study_start = curr;
        }
    }
    periods.push(Period::new(PeriodKind::Study, study_start, dates[dates.len() - 1]));

    let gaps: Vec<&Period> = periods
        .iter()
        .filter(|p| p.kind == PeriodKind::Gap)
        .collect();

    GapTimeline {
        gap_count: gaps.len(),
        total_gap_days: gaps.iter().map(|p| p.days).sum(),
        largest_gap_days: gaps.iter().map(|p| p.days).max().unwrap_or(0),
        last_gap_date: gaps.last().map(|p| p.start),
        study_dates_count,
        periods,
    }
}
