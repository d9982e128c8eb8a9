use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cache::DepartmentLoader;
use crate::error::{LmsError, SyncError};
use crate::fetcher::fetch_all;
use crate::lms::LmsSource;
use crate::models::{normalize_email, StudentRecord};

pub const DEFAULT_MAX_CONCURRENCY: usize = 50;

/// Fills student records with their enrollments using bounded fan-out.
pub struct EnrollmentSync<S> {
    source: S,
    max_concurrency: usize,
    cancel: CancellationToken,
}

impl<S: LmsSource> EnrollmentSync<S> {
    pub fn new(source: S, max_concurrency: usize) -> Self {
        Self {
            source,
            max_concurrency,
            cancel: CancellationToken::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Cancels every batch currently running through this syncer.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn with_enrollments(&self, students: Vec<StudentRecord>) -> Result<Vec<StudentRecord>, SyncError> {
        let source = &self.source;
        fetch_all(students, self.max_concurrency, &self.cancel, |mut student| async move {
            student.enrollments = source.fetch_enrollments(&student.id).await?;
            Ok::<_, LmsError>(student)
        })
        .await
    }

    /// Looks up roster emails individually, then loads enrollments for the
    /// students that were found. Unknown emails are simply absent.
    pub async fn load_by_emails(&self, emails: &[String]) -> Result<Vec<StudentRecord>, SyncError> {
        let mut unique: Vec<String> = emails.iter().map(|e| normalize_email(e)).collect();
        unique.sort();
        unique.dedup();
        unique.retain(|email| !email.is_empty());

        let source = &self.source;
        let students = fetch_all(unique.clone(), self.max_concurrency, &self.cancel, |email| async move {
            source.find_user_by_email(&email).await
        })
        .await?;

        tracing::info!(
            requested = unique.len(),
            found = students.len(),
            "Roster email lookup complete"
        );
        self.with_enrollments(students).await
    }
}

#[async_trait]
impl<S: LmsSource> DepartmentLoader for EnrollmentSync<S> {
    async fn load_department(&self, department_id: &str) -> Result<Vec<StudentRecord>, SyncError> {
        let students = self
            .source
            .list_department_users(department_id)
            .await
            .map_err(|e| SyncError::department(department_id, e))?;

        tracing::info!(
            department_id = %department_id,
            students = students.len(),
            "Loading enrollments"
        );
        self.with_enrollments(students).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Enrollment;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeLms {
        departments: HashMap<String, Result<Vec<&'static str>, u16>>,
        expired_user: Option<&'static str>,
    }

    fn user(id: &str) -> StudentRecord {
        StudentRecord {
            id: id.to_string(),
            first_name: "Test".to_string(),
            last_name: id.to_string(),
            email: format!("{id}@example.com"),
            username: id.to_string(),
            department_id: "d1".to_string(),
            last_login: None,
            enrollments: Vec::new(),
        }
    }

    #[async_trait]
    impl LmsSource for FakeLms {
        async fn list_department_users(&self, department_id: &str) -> Result<Vec<StudentRecord>, LmsError> {
            match self.departments.get(department_id) {
                Some(Ok(ids)) => Ok(ids.iter().map(|id| user(id)).collect()),
                Some(Err(401)) => Err(LmsError::AuthExpired),
                Some(Err(status)) => Err(LmsError::Api { status: *status, body: String::new() }),
                None => Err(LmsError::NotFound(department_id.to_string())),
            }
        }

        async fn fetch_enrollments(&self, user_id: &str) -> Result<Vec<Enrollment>, LmsError> {
            if self.expired_user == Some(user_id) {
                return Err(LmsError::AuthExpired);
            }
            if user_id == "ghost" {
                return Err(LmsError::NotFound(user_id.to_string()));
            }
            Ok(vec![Enrollment::new("Life Pre-License Course", 50.0, 120)])
        }

        async fn find_user_by_email(&self, email: &str) -> Result<StudentRecord, LmsError> {
            match email.split('@').next() {
                Some(id) if id.starts_with("known") => Ok(user(id)),
                _ => Err(LmsError::NotFound(email.to_string())),
            }
        }

        async fn department_name(&self, _department_id: &str) -> Result<String, LmsError> {
            Ok("Test Department".to_string())
        }
    }

    fn fake(departments: &[(&str, Result<Vec<&'static str>, u16>)]) -> FakeLms {
        FakeLms {
            departments: departments
                .iter()
                .map(|(id, users)| (id.to_string(), users.clone()))
                .collect(),
            expired_user: None,
        }
    }

    #[tokio::test]
    async fn department_load_attaches_enrollments_and_drops_missing() {
        let sync = EnrollmentSync::new(fake(&[("d1", Ok(vec!["u1", "ghost", "u2"]))]), 2);
        let mut students = sync.load_department("d1").await.unwrap();
        students.sort_by(|a, b| a.id.cmp(&b.id));

        assert_eq!(students.len(), 2);
        assert!(students.iter().all(|s| s.enrollments.len() == 1));
    }

    #[tokio::test]
    async fn empty_department_is_ok_but_failed_listing_is_error() {
        let sync = EnrollmentSync::new(fake(&[("empty", Ok(vec![])), ("down", Err(503))]), 4);

        assert!(sync.load_department("empty").await.unwrap().is_empty());
        assert!(matches!(
            sync.load_department("down").await,
            Err(SyncError::DepartmentUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn auth_expiry_during_listing_or_enrichment_is_fatal() {
        let sync = EnrollmentSync::new(fake(&[("d1", Err(401))]), 4);
        assert!(matches!(sync.load_department("d1").await, Err(SyncError::AuthExpired)));

        let mut lms = fake(&[("d1", Ok(vec!["u1", "u2", "u3", "u4"]))]);
        lms.expired_user = Some("u3");
        let sync = EnrollmentSync::new(lms, 2);
        assert!(matches!(sync.load_department("d1").await, Err(SyncError::AuthExpired)));
    }

    #[tokio::test]
    async fn roster_emails_are_normalized_and_deduplicated() {
        let sync = EnrollmentSync::new(FakeLms::default(), 4);
        let emails = vec![
            "Known1@Example.com".to_string(),
            " known1@example.com".to_string(),
            "known2@example.com".to_string(),
            "stranger@example.com".to_string(),
            "   ".to_string(),
        ];
        let mut students = sync.load_by_emails(&emails).await.unwrap();
        students.sort_by(|a, b| a.id.cmp(&b.id));

        let ids: Vec<&str> = students.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["known1", "known2"]);
    }

    #[tokio::test]
    async fn shutdown_cancels_later_batches() {
        let sync = EnrollmentSync::new(fake(&[("d1", Ok(vec!["u1"]))]), 4);
        sync.shutdown();
        assert!(matches!(sync.load_department("d1").await, Err(SyncError::Cancelled)));
    }
}
