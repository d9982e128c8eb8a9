use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::normalize_email;

const EXAM_DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%m/%d/%y", "%B %d, %Y", "%b %d, %Y"];

/// One row of the exam-scheduling roster. Only the email joins against the
/// LMS; everything else is carried for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterEntry {
    pub email: String,
    pub name: String,
    pub phone: String,
    pub exam_date: Option<NaiveDate>,
    pub exam_date_raw: String,
    pub exam_time: String,
    pub state: String,
    pub course: String,
    pub agency_owner: String,
    pub pass_fail: String,
}

impl RosterEntry {
    pub fn new(email: &str, name: &str) -> Self {
        Self {
            email: normalize_email(email),
            name: name.trim().to_string(),
            phone: String::new(),
            exam_date: None,
            exam_date_raw: String::new(),
            exam_time: String::new(),
            state: String::new(),
            course: String::new(),
            agency_owner: String::new(),
            pass_fail: String::new(),
        }
    }

    pub fn days_until_exam(&self, today: NaiveDate) -> Option<i64> {
        self.exam_date.map(|date| (date - today).num_days())
    }

    pub fn course_type(&self) -> Option<&str> {
        Some(self.course.as_str()).filter(|course| !course.trim().is_empty())
    }
}

pub fn parse_exam_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    EXAM_DATE_FORMATS
        .iter()
        .filter_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        // `%Y` happily reads "26" as year 26; let `%y` handle two-digit years.
        .find(|date| date.year() >= 1900)
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Student Name", default)]
    name: String,
    #[serde(rename = "Email", default)]
    email: String,
    #[serde(rename = "Phone", default)]
    phone: String,
    #[serde(rename = "Exam Date", default)]
    exam_date: String,
    #[serde(rename = "Exam Time", default)]
    exam_time: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Course", default)]
    course: String,
    #[serde(rename = "Agency Owner", default)]
    agency_owner: String,
    #[serde(rename = "Pass/Fail", default)]
    pass_fail: String,
}

impl From<CsvRow> for RosterEntry {
    fn from(row: CsvRow) -> Self {
        let exam_date_raw = row.exam_date.trim().to_string();
        Self {
            email: normalize_email(&row.email),
            name: row.name.trim().to_string(),
            phone: row.phone.trim().to_string(),
            exam_date: parse_exam_date(&exam_date_raw),
            exam_date_raw,
            exam_time: row.exam_time.trim().to_string(),
            state: row.state.trim().to_string(),
            course: row.course.trim().to_string(),
            agency_owner: row.agency_owner.trim().to_string(),
            pass_fail: row.pass_fail.trim().to_string(),
        }
    }
}

/// Reads a roster CSV export. Rows without an email are skipped and a
/// repeated email keeps its last row.
pub fn read_roster<R: Read>(reader: R) -> anyhow::Result<Vec<RosterEntry>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let mut order: Vec<String> = Vec::new();
    let mut latest: HashMap<String, RosterEntry> = HashMap::new();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid roster row {}", line + 2))?;
        let entry = RosterEntry::from(row);
        if entry.email.is_empty() {
            continue;
        }
        if !latest.contains_key(&entry.email) {
            order.push(entry.email.clone());
        }
        latest.insert(entry.email.clone(), entry);
    }

    let entries: Vec<RosterEntry> = order
        .into_iter()
        .filter_map(|email| latest.remove(&email))
        .collect();
    tracing::info!(entries = entries.len(), "Parsed roster");
    Ok(entries)
}

pub fn load_roster(path: &Path) -> anyhow::Result<Vec<RosterEntry>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open roster {}", path.display()))?;
    read_roster(file)
}
