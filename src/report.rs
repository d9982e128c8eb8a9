use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::cache::CacheEntry;
use crate::engagement::EngagementStatus;
use crate::format::{format_progress, format_time_spent};
use crate::gaps::{build_timeline, GapTimeline};
use crate::identity::{Pseudonymizer, Reconciled};
use crate::models::StudentSummary;
use crate::readiness::{assess, ReadinessAssessment, ReadinessStatus};
use crate::roster::RosterEntry;

#[derive(Debug, Clone, PartialEq)]
pub struct StatusCount {
    pub label: &'static str,
    pub count: usize,
}

/// One student's line in the report, with exam context when the roster has it.
#[derive(Debug, Clone)]
pub struct ReadinessRow<'a> {
    pub summary: &'a StudentSummary,
    pub roster: Option<&'a RosterEntry>,
    pub readiness: ReadinessAssessment,
    pub timeline: GapTimeline,
}

pub fn readiness_rows<'a>(
    entry: &'a CacheEntry,
    roster: Option<&'a [Reconciled]>,
    today: NaiveDate,
) -> Vec<ReadinessRow<'a>> {
    let by_student: HashMap<&str, &RosterEntry> = roster
        .unwrap_or_default()
        .iter()
        .filter_map(|joined| joined.student().map(|s| (s.id.as_str(), joined.roster())))
        .collect();

    entry
        .aggregated
        .iter()
        .filter_map(|summary| {
            let record = entry.record(&summary.student_id)?;
            let roster = by_student.get(summary.student_id.as_str()).copied();
            let readiness = assess(
                &record.enrollments,
                roster.and_then(RosterEntry::course_type),
                roster.and_then(|r| r.days_until_exam(today)),
            );
            Some(ReadinessRow {
                summary,
                roster,
                readiness,
                timeline: build_timeline(&record.enrollments),
            })
        })
        .collect()
}

pub fn summarize_engagement(summaries: &[StudentSummary]) -> Vec<StatusCount> {
    let mut counts: Vec<(EngagementStatus, usize)> = Vec::new();
    for summary in summaries {
        match counts.iter_mut().find(|(status, _)| *status == summary.engagement) {
            Some((_, count)) => *count += 1,
            None => counts.push((summary.engagement, 1)),
        }
    }

    counts.sort_by_key(|(status, _)| status.priority());
    counts
        .into_iter()
        .map(|(status, count)| StatusCount {
            label: status.as_str(),
            count,
        })
        .collect()
}

pub fn summarize_readiness(rows: &[ReadinessRow<'_>]) -> Vec<StatusCount> {
    [ReadinessStatus::Green, ReadinessStatus::Yellow, ReadinessStatus::Red]
        .into_iter()
        .map(|status| StatusCount {
            label: status.as_str(),
            count: rows.iter().filter(|row| row.readiness.status == status).count(),
        })
        .collect()
}

fn needs_attention(status: EngagementStatus) -> bool {
    matches!(
        status,
        EngagementStatus::Warning
            | EngagementStatus::ReEngage
            | EngagementStatus::Abandoned
            | EngagementStatus::CourseExpired
    )
}

pub fn build_report(
    entry: &CacheEntry,
    department_name: &str,
    roster: Option<&[Reconciled]>,
    today: NaiveDate,
    pseudonyms: &dyn Pseudonymizer,
) -> String {
    let rows = readiness_rows(entry, roster, today);
    let mut output = String::new();

    let _ = writeln!(output, "# Enrollment Readiness Report");
    let _ = writeln!(
        output,
        "Department {} ({}), {} students, data fetched {}",
        department_name,
        entry.department_id,
        entry.aggregated.len(),
        entry.fetched_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Engagement Mix");

    let engagement = summarize_engagement(&entry.aggregated);
    if engagement.is_empty() {
        let _ = writeln!(output, "No students enrolled in this department.");
    } else {
        for status in engagement.iter() {
            let _ = writeln!(output, "- {}: {} students", status.label, status.count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Readiness Mix");

    if rows.is_empty() {
        let _ = writeln!(output, "No students to assess.");
    } else {
        for status in summarize_readiness(&rows).iter() {
            let _ = writeln!(output, "- {}: {} students", status.label, status.count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students Needing Attention");

    let attention: Vec<&ReadinessRow<'_>> = rows
        .iter()
        .filter(|row| needs_attention(row.summary.engagement))
        .collect();
    if attention.is_empty() {
        let _ = writeln!(output, "Everyone is on track.");
    } else {
        for row in attention.iter().rev().take(10) {
            let summary = row.summary;
            let exam = row
                .roster
                .and_then(|r| r.exam_date)
                .map(|date| format!(", exam {date}"))
                .unwrap_or_default();
            let _ = writeln!(
                output,
                "- {} ({}) {}: {} in {} ({}), {} logged, readiness {} ({}/4){}",
                pseudonyms.name(&summary.email, &summary.full_name),
                pseudonyms.email(&summary.email),
                summary.engagement.as_str(),
                format_progress(summary.progress.overall_progress_pct).display,
                summary.progress.display_course_name,
                summary.progress.primary_status.label(),
                format_time_spent(summary.progress.total_time_minutes),
                row.readiness.status.as_str(),
                row.readiness.criteria_met(),
                exam
            );
        }
    }

    let mut gaps: Vec<&ReadinessRow<'_>> = rows
        .iter()
        .filter(|row| row.timeline.gap_count > 0)
        .collect();
    gaps.sort_by(|a, b| b.timeline.largest_gap_days.cmp(&a.timeline.largest_gap_days));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Largest Study Gaps");

    if gaps.is_empty() {
        let _ = writeln!(output, "No study gaps recorded.");
    } else {
        for row in gaps.iter().take(5) {
            let _ = writeln!(
                output,
                "- {}: {} days (total {} across {} gaps, last began {})",
                pseudonyms.name(&row.summary.email, &row.summary.full_name),
                row.timeline.largest_gap_days,
                row.timeline.total_gap_days,
                row.timeline.gap_count,
                row.timeline
                    .last_gap_date
                    .map(|date| date.to_string())
                    .unwrap_or_default()
            );
        }
    }

    if let Some(roster) = roster {
        let unmatched: Vec<&Reconciled> = roster.iter().filter(|joined| !joined.is_matched()).collect();
        let _ = writeln!(output);
        let _ = writeln!(output, "## Unmatched Roster Entries");

        if unmatched.is_empty() {
            let _ = writeln!(output, "Every roster entry matched an LMS account.");
        } else {
            for joined in unmatched {
                let roster = joined.roster();
                let _ = writeln!(
                    output,
                    "- {} ({}) exam {}",
                    roster.name,
                    roster.email,
                    if roster.exam_date_raw.is_empty() {
                        "not scheduled"
                    } else {
                        roster.exam_date_raw.as_str()
                    }
                );
            }
        }
    }

    output
}
