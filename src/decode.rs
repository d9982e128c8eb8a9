//! Normalizes LMS payloads into canonical records.
//!
//! The LMS returns the same field under camelCase or PascalCase depending on
//! endpoint and tenant version. Every lookup goes through [`field`], which
//! takes the first populated spelling, so nothing downstream ever sees the
//! raw casing.

use serde_json::{Map, Value};

use crate::error::LmsError;
use crate::format::{minutes_from_value, optional_number, parse_lms_datetime, progress_from_value};
use crate::models::{normalize_email, Enrollment, EnrollmentStatus, StudentRecord};

const COURSE_NAME: &[&str] = &["courseName", "CourseName"];
const PROGRESS: &[&str] = &["progress", "Progress"];
const TIME_SPENT: &[&str] = &["timeSpent", "TimeSpent", "ActiveTime", "activeTime"];
const STATUS: &[&str] = &["status", "Status"];
const SCORE: &[&str] = &["score", "Score"];
const DATE_STARTED: &[&str] = &["dateStarted", "DateStarted"];
const DATE_EDITED: &[&str] = &["dateEdited", "DateEdited"];
const DATE_COMPLETED: &[&str] = &["dateCompleted", "DateCompleted"];
const DATE_ADDED: &[&str] = &["dateAdded", "DateAdded"];
const DATE_ACCESSED: &[&str] = &["accessDate", "AccessDate"];
const LAST_LOGIN: &[&str] = &[
    "lastLoginDate",
    "LastLoginDate",
    "dateLastAccessed",
    "DateLastAccessed",
];

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Number(number) => number.as_f64() == Some(0.0),
        _ => false,
    }
}

/// First populated value among `keys`.
fn field<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|value| !is_blank(value))
}

/// First non-null value among `keys`. Zero is a real value here.
fn present<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|value| !value.is_null())
}

fn text(object: &Map<String, Value>, keys: &[&str]) -> String {
    match field(object, keys) {
        Some(Value::String(value)) => value.trim().to_string(),
        Some(Value::Number(value)) => value.to_string(),
        _ => String::new(),
    }
}

fn optional_text(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    Some(text(object, keys)).filter(|value| !value.is_empty())
}

fn date(object: &Map<String, Value>, keys: &[&str]) -> Option<chrono::NaiveDateTime> {
    match field(object, keys) {
        Some(Value::String(value)) => parse_lms_datetime(value),
        _ => None,
    }
}

fn status(object: &Map<String, Value>) -> EnrollmentStatus {
    let code = match field(object, STATUS) {
        Some(Value::Number(number)) => number.as_i64().unwrap_or(0),
        Some(Value::String(value)) => value.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    };
    EnrollmentStatus::from_code(code)
}

pub fn decode_enrollment(raw: &Value) -> Result<Enrollment, LmsError> {
    let object = raw
        .as_object()
        .ok_or_else(|| LmsError::Decode("enrollment is not an object".to_string()))?;

    Ok(Enrollment {
        id: optional_text(object, &["id", "Id"]),
        course_id: optional_text(object, &["courseId", "CourseId"]),
        course_name: text(object, COURSE_NAME),
        progress: field(object, PROGRESS).map(progress_from_value).unwrap_or(0.0),
        time_spent_minutes: field(object, TIME_SPENT).map(minutes_from_value).unwrap_or(0),
        status: status(object),
        date_started: date(object, DATE_STARTED),
        date_edited: date(object, DATE_EDITED),
        date_completed: date(object, DATE_COMPLETED),
        date_added: date(object, DATE_ADDED),
        date_accessed: date(object, DATE_ACCESSED),
        score: present(object, SCORE).and_then(optional_number),
    })
}

/// Decodes an enrollment listing, which is either a bare array or wrapped
/// under `enrollments`/`Enrollments`. Malformed entries are dropped.
pub fn decode_enrollments(raw: &Value) -> Vec<Enrollment> {
    let items = match raw {
        Value::Array(items) => items.as_slice(),
        Value::Object(object) => match field(object, &["enrollments", "Enrollments"]) {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
        _ => &[],
    };

    items
        .iter()
        .filter_map(|item| match decode_enrollment(item) {
            Ok(enrollment) => Some(enrollment),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed enrollment");
                None
            }
        })
        .collect()
}

/// A user without enrollments; those are fetched separately.
pub fn decode_user(raw: &Value) -> Result<StudentRecord, LmsError> {
    let object = raw
        .as_object()
        .ok_or_else(|| LmsError::Decode("user is not an object".to_string()))?;

    let id = text(object, &["id", "Id"]);
    if id.is_empty() {
        return Err(LmsError::Decode("user has no id".to_string()));
    }

    Ok(StudentRecord {
        id,
        first_name: text(object, &["firstName", "FirstName"]),
        last_name: text(object, &["lastName", "LastName"]),
        email: normalize_email(&text(object, &["emailAddress", "EmailAddress"])),
        username: text(object, &["username", "Username"]),
        department_id: text(object, &["departmentId", "DepartmentId"]),
        last_login: date(object, LAST_LOGIN),
        enrollments: Vec::new(),
    })
}

/// Users from one listing page: a bare array or `{ "users": [...] }`.
pub fn decode_user_page(raw: &Value) -> Result<Vec<Value>, LmsError> {
    match raw {
        Value::Array(items) => Ok(items.clone()),
        Value::Object(object) => match object.get("users").or_else(|| object.get("Users")) {
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(_) | None => Err(LmsError::Decode(
                "user listing has no users array".to_string(),
            )),
        },
        _ => Err(LmsError::Decode("unexpected user listing format".to_string())),
    }
}

pub fn decode_department_name(raw: &Value) -> String {
    raw.as_object()
        .map(|object| text(object, &["name", "Name"]))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "Unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_both_casing_conventions_identically() {
        let camel = json!({
            "id": "e1",
            "courseName": "Alabama Life Pre-license Course",
            "progress": 40,
            "timeSpent": "08:20:00",
            "status": 1,
            "dateStarted": "2026-01-02T08:00:00Z",
        });
        let pascal = json!({
            "Id": "e1",
            "CourseName": "Alabama Life Pre-license Course",
            "Progress": "40",
            "ActiveTime": 500,
            "Status": "1",
            "DateStarted": "2026-01-02T08:00:00",
        });

        let a = decode_enrollment(&camel).unwrap();
        let b = decode_enrollment(&pascal).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.time_spent_minutes, 500);
        assert_eq!(a.progress, 40.0);
        assert_eq!(a.status, EnrollmentStatus::InProgress);
    }

    #[test]
    fn zero_time_falls_through_to_alternate_spelling() {
        let raw = json!({"courseName": "Chapter 2", "timeSpent": 0, "activeTime": "00:45:10"});
        assert_eq!(decode_enrollment(&raw).unwrap().time_spent_minutes, 45);
    }

    #[test]
    fn malformed_fields_default_instead_of_failing() {
        let raw = json!({
            "courseName": "Practice Exam",
            "progress": {"value": 3},
            "timeSpent": "later",
            "status": "done",
            "dateCompleted": "not a date",
            "score": "n/a",
        });
        let enrollment = decode_enrollment(&raw).unwrap();
        assert_eq!(enrollment.progress, 0.0);
        assert_eq!(enrollment.time_spent_minutes, 0);
        assert_eq!(enrollment.status, EnrollmentStatus::NotStarted);
        assert_eq!(enrollment.date_completed, None);
        assert_eq!(enrollment.score, None);
    }

    #[test]
    fn enrollment_listing_accepts_wrapped_and_bare_forms() {
        let bare = json!([{"courseName": "A"}, "garbage", {"courseName": "B"}]);
        assert_eq!(decode_enrollments(&bare).len(), 2);

        let wrapped = json!({"Enrollments": [{"CourseName": "A"}]});
        assert_eq!(decode_enrollments(&wrapped)[0].course_name, "A");

        assert!(decode_enrollments(&json!({"unexpected": true})).is_empty());
    }

    #[test]
    fn users_require_an_id_and_normalize_email() {
        let user = decode_user(&json!({
            "Id": "u-1",
            "FirstName": "Avery",
            "LastName": "Lee",
            "EmailAddress": " Avery.Lee@Example.com ",
            "DepartmentId": "d-1",
            "LastLoginDate": "2026-01-04T12:00:00Z",
        }))
        .unwrap();
        assert_eq!(user.email, "avery.lee@example.com");
        assert_eq!(user.full_name(), "Avery Lee");
        assert!(user.last_login.is_some());

        assert!(matches!(
            decode_user(&json!({"firstName": "NoId"})),
            Err(LmsError::Decode(_))
        ));
    }

    #[test]
    fn user_pages_reject_unknown_shapes() {
        assert_eq!(decode_user_page(&json!([{"id": "1"}])).unwrap().len(), 1);
        assert_eq!(decode_user_page(&json!({"users": []})).unwrap().len(), 0);
        assert!(decode_user_page(&json!("oops")).is_err());
    }

    #[test]
    fn department_name_falls_back_to_unknown() {
        assert_eq!(decode_department_name(&json!({"Name": "Birmingham"})), "Birmingham");
        assert_eq!(decode_department_name(&json!({})), "Unknown");
    }

    #[test]
    fn zero_score_is_kept_not_treated_as_missing() {
        let failed = decode_enrollment(&json!({
            "courseName": "Life Practice Exam",
            "progress": 100,
            "score": 0,
            "status": 2,
        }))
        .unwrap();
        assert_eq!(failed.score, Some(0.0));
        assert_eq!(failed.effective_score(), 0.0);

        let unscored = decode_enrollment(&json!({"CourseName": "Life Practice Exam", "Score": null, "Progress": 85}))
            .unwrap();
        assert_eq!(unscored.score, None);

        let attempts = vec![failed.clone(), failed.clone(), failed];
        let summary = crate::readiness::practice_summary(&attempts);
        assert_eq!(summary.scores, vec![0.0, 0.0, 0.0]);
        assert_eq!(summary.consecutive_passing, 0);
    }
}
