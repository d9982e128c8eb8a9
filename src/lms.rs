//! LMS REST client.
//!
//! Connections are pooled by a single `reqwest::Client`. Server errors
//! (500/502/503/504) and connection failures are retried with exponential
//! backoff; 4xx responses are returned immediately so upstream rate limits are
//! not hammered.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde_json::Value;

use crate::decode::{decode_department_name, decode_enrollments, decode_user, decode_user_page};
use crate::error::LmsError;
use crate::models::{Enrollment, StudentRecord};

const USER_PAGE_SIZE: usize = 500;
const ENROLLMENT_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub api_key: String,
    pub token: String,
    pub timeout: Duration,
    pub listing_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub max_idle_connections: usize,
}

impl ClientSettings {
    pub fn new(base_url: &str, api_key: &str, token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            token: token.to_string(),
            timeout: Duration::from_secs(30),
            listing_timeout: Duration::from_secs(120),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
            max_idle_connections: 50,
        }
    }
}

/// Read-side operations the engine needs from the LMS.
#[async_trait]
pub trait LmsSource: Send + Sync {
    /// Every user in a department (and its sub-departments), without enrollments.
    async fn list_department_users(&self, department_id: &str) -> Result<Vec<StudentRecord>, LmsError>;

    async fn fetch_enrollments(&self, user_id: &str) -> Result<Vec<Enrollment>, LmsError>;

    async fn find_user_by_email(&self, email: &str) -> Result<StudentRecord, LmsError>;

    async fn department_name(&self, department_id: &str) -> Result<String, LmsError>;
}

pub struct LmsClient {
    http: reqwest::Client,
    settings: ClientSettings,
}

impl LmsClient {
    pub fn new(settings: ClientSettings) -> Result<Self, LmsError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .pool_max_idle_per_host(settings.max_idle_connections)
            .build()
            .map_err(|e| LmsError::Network(e.to_string()))?;

        Ok(Self { http, settings })
    }

    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<Value, LmsError> {
        let url = format!("{}/{}", self.settings.base_url, path);
        let mut attempt = 0u32;

        loop {
            let sent = self
                .http
                .get(&url)
                .query(query)
                .header("x-api-key", &self.settings.api_key)
                .header(AUTHORIZATION, &self.settings.token)
                .header(ACCEPT, "application/json")
                .timeout(timeout)
                .send()
                .await;

            let retry_reason = match sent {
                Ok(response) => {
                    let status = response.status().as_u16();
                    match status {
                        401 => return Err(LmsError::AuthExpired),
                        404 => return Err(LmsError::NotFound(path.to_string())),
                        _ if response.status().is_success() => {
                            return response
                                .json::<Value>()
                                .await
                                .map_err(|e| LmsError::Decode(e.to_string()));
                        }
                        _ if LmsError::is_retryable_status(status)
                            && attempt < self.settings.max_retries =>
                        {
                            format!("status {status}")
                        }
                        _ => {
                            let body = response.text().await.unwrap_or_default();
                            return Err(LmsError::Api { status, body });
                        }
                    }
                }
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < self.settings.max_retries => {
                    e.to_string()
                }
                Err(e) => return Err(LmsError::Network(e.to_string())),
            };

            let delay = backoff_delay(self.settings.retry_backoff, attempt);
            attempt += 1;
            tracing::warn!(
                url = %url,
                attempt,
                reason = %retry_reason,
                delay_ms = delay.as_millis() as u64,
                "Retrying LMS request"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// `base * 2^attempt`, saturating instead of overflowing for large attempt counts.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

fn odata_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[async_trait]
impl LmsSource for LmsClient {
    async fn list_department_users(&self, department_id: &str) -> Result<Vec<StudentRecord>, LmsError> {
        let filter = format!("departmentId eq guid'{}'", odata_literal(department_id));
        let mut users = Vec::new();
        let mut offset = 0usize;

        tracing::info!(department_id = %department_id, "Fetching department users");

        loop {
            let query = [
                ("_filter", filter.clone()),
                ("_limit", USER_PAGE_SIZE.to_string()),
                ("_offset", offset.to_string()),
            ];
            let page = self
                .get_json("users", &query, self.settings.listing_timeout)
                .await?;
            let items = decode_user_page(&page)?;
            let page_len = items.len();

            for item in &items {
                match decode_user(item) {
                    Ok(user) => users.push(user),
                    Err(e) => tracing::warn!(error = %e, "Skipping malformed user"),
                }
            }

            tracing::debug!(
                department_id = %department_id,
                offset,
                page_len,
                total = users.len(),
                "Fetched user page"
            );

            if page_len < USER_PAGE_SIZE {
                break;
            }
            offset += USER_PAGE_SIZE;
        }

        tracing::info!(
            department_id = %department_id,
            count = users.len(),
            "Department listing complete"
        );
        Ok(users)
    }

    async fn fetch_enrollments(&self, user_id: &str) -> Result<Vec<Enrollment>, LmsError> {
        let path = format!("users/{user_id}/enrollments");
        let query = [("_limit", ENROLLMENT_LIMIT.to_string())];
        let body = self.get_json(&path, &query, self.settings.timeout).await?;
        Ok(decode_enrollments(&body))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<StudentRecord, LmsError> {
        let query = [
            ("_filter", format!("emailAddress eq '{}'", odata_literal(email))),
            ("_limit", "1".to_string()),
        ];
        let body = self.get_json("users", &query, self.settings.timeout).await?;
        let first = decode_user_page(&body)?
            .into_iter()
            .next()
            .ok_or_else(|| LmsError::NotFound(email.to_string()))?;
        decode_user(&first)
    }

    async fn department_name(&self, department_id: &str) -> Result<String, LmsError> {
        let path = format!("Departments/{department_id}");
        let body = self.get_json(&path, &[], self.settings.timeout).await?;
        Ok(decode_department_name(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_strip_trailing_slash() {
        let settings = ClientSettings::new("https://lms.example.com/", "key", "token");
        assert_eq!(settings.base_url, "https://lms.example.com");
        assert_eq!(settings.max_retries, 2);
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 0), base);
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(base, 40), base.saturating_mul(u32::MAX));
        assert_eq!(backoff_delay(Duration::MAX, 3), Duration::MAX);
    }

    #[test]
    fn odata_literals_escape_quotes() {
        assert_eq!(odata_literal("o'brien@example.com"), "o''brien@example.com");
    }

    #[test]
    fn client_builds_from_settings() {
        let client = LmsClient::new(ClientSettings::new("http://127.0.0.1:1", "key", "token"));
        assert!(client.is_ok());
    }
}
