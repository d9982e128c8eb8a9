//! Per-department TTL cache over the full fetch-and-aggregate pipeline.
//!
//! Entries are immutable `Arc<CacheEntry>` values swapped in whole, so a
//! reader holds either the previous snapshot or the new one. Concurrent
//! misses for the same department are serialized behind a per-department
//! lock and the later callers reuse the refresh the first one performed.
//! Each department carries a generation that `invalidate` bumps; a load that
//! started under an older generation is returned to its caller but never
//! cached.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::engagement::engagement_status;
use crate::error::SyncError;
use crate::models::{StudentRecord, StudentSummary};
use crate::progress::aggregate;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Produces the full, enrollment-populated roster of one department.
#[async_trait]
pub trait DepartmentLoader: Send + Sync {
    async fn load_department(&self, department_id: &str) -> Result<Vec<StudentRecord>, SyncError>;
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub department_id: String,
    pub raw_records: Vec<StudentRecord>,
    pub aggregated: Vec<StudentSummary>,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn build(department_id: &str, raw_records: Vec<StudentRecord>, fetched_at: DateTime<Utc>) -> Self {
        let now = fetched_at.naive_utc();
        let mut aggregated: Vec<StudentSummary> = raw_records
            .iter()
            .map(|student| {
                let progress = aggregate(&student.enrollments);
                let engagement = engagement_status(student, &progress, now);
                StudentSummary {
                    student_id: student.id.clone(),
                    full_name: student.full_name(),
                    email: student.email.clone(),
                    department_id: student.department_id.clone(),
                    progress,
                    engagement,
                }
            })
            .collect();

        aggregated.sort_by(|a, b| {
            a.engagement
                .priority()
                .cmp(&b.engagement.priority())
                .then(
                    b.progress
                        .overall_progress_pct
                        .total_cmp(&a.progress.overall_progress_pct),
                )
        });

        Self {
            department_id: department_id.to_string(),
            raw_records,
            aggregated,
            fetched_at,
        }
    }

    pub fn record(&self, student_id: &str) -> Option<&StudentRecord> {
        self.raw_records
            .iter()
            .find(|record| record.id.eq_ignore_ascii_case(student_id))
    }
}

#[derive(Default)]
struct Slots {
    entries: HashMap<String, Arc<CacheEntry>>,
    generations: HashMap<String, u64>,
}

impl Slots {
    fn generation(&self, department_id: &str) -> u64 {
        self.generations.get(department_id).copied().unwrap_or(0)
    }
}

pub struct DepartmentCache<L> {
    loader: L,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    slots: RwLock<Slots>,
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<L: DepartmentLoader> DepartmentCache<L> {
    pub fn new(loader: L, ttl: Duration) -> Self {
        Self::with_clock(loader, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(loader: L, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            loader,
            clock,
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()),
            slots: RwLock::new(Slots::default()),
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    async fn fresh_entry(&self, department_id: &str) -> Option<Arc<CacheEntry>> {
        let slots = self.slots.read().await;
        let entry = slots.entries.get(department_id)?;
        let age = self.clock.now() - entry.fetched_at;
        (age < self.ttl).then(|| entry.clone())
    }

    async fn refresh_lock(&self, department_id: &str) -> Arc<Mutex<()>> {
        self.refresh_locks
            .lock()
            .await
            .entry(department_id.to_string())
            .or_default()
            .clone()
    }

    /// Returns the cached entry if younger than the TTL, refetching otherwise.
    pub async fn get(&self, department_id: &str) -> Result<Arc<CacheEntry>, SyncError> {
        if let Some(entry) = self.fresh_entry(department_id).await {
            tracing::debug!(department_id = %department_id, "Serving cached department");
            return Ok(entry);
        }

        let lock = self.refresh_lock(department_id).await;
        let _guard = lock.lock().await;

        if let Some(entry) = self.fresh_entry(department_id).await {
            tracing::debug!(department_id = %department_id, "Reusing concurrent refresh");
            return Ok(entry);
        }

        self.load(department_id).await
    }

    /// Refetches regardless of the current entry's age.
    pub async fn refresh(&self, department_id: &str) -> Result<Arc<CacheEntry>, SyncError> {
        let lock = self.refresh_lock(department_id).await;
        let _guard = lock.lock().await;
        self.load(department_id).await
    }

    async fn load(&self, department_id: &str) -> Result<Arc<CacheEntry>, SyncError> {
        let generation = self.slots.read().await.generation(department_id);

        tracing::info!(department_id = %department_id, "Fetching fresh department data");
        let records = self.loader.load_department(department_id).await?;
        let entry = Arc::new(CacheEntry::build(department_id, records, self.clock.now()));

        let mut slots = self.slots.write().await;
        if slots.generation(department_id) != generation {
            tracing::info!(
                department_id = %department_id,
                "Department invalidated during fetch, result not cached"
            );
            return Ok(entry);
        }
        slots.entries.insert(department_id.to_string(), entry.clone());
        drop(slots);

        tracing::info!(
            department_id = %department_id,
            students = entry.raw_records.len(),
            "Department cache updated"
        );
        Ok(entry)
    }

    pub async fn invalidate(&self, department_id: &str) -> bool {
        let mut slots = self.slots.write().await;
        *slots.generations.entry(department_id.to_string()).or_default() += 1;
        let removed = slots.entries.remove(department_id).is_some();
        drop(slots);
        if removed {
            tracing::info!(department_id = %department_id, "Invalidated department cache");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engagement::EngagementStatus;
    use crate::error::LmsError;
    use crate::models::Enrollment;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct ManualClock(StdMutex<DateTime<Utc>>);

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self(StdMutex::new(Utc::now())))
        }

        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += chrono::Duration::from_std(by).unwrap();
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    #[derive(Default)]
    struct CountingLoader {
        calls: AtomicUsize,
        fail: bool,
        delay: Option<Duration>,
    }

    fn student(id: &str, progress: f64) -> StudentRecord {
        StudentRecord {
            id: id.to_string(),
            first_name: "Kiara".to_string(),
            last_name: id.to_string(),
            email: format!("{id}@example.com"),
            username: id.to_string(),
            department_id: "dept-1".to_string(),
            last_login: None,
            enrollments: vec![Enrollment::new("Life Pre-License Course", progress, 60)],
        }
    }

    #[async_trait]
    impl DepartmentLoader for CountingLoader {
        async fn load_department(&self, department_id: &str) -> Result<Vec<StudentRecord>, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(SyncError::department(
                    department_id,
                    LmsError::Api { status: 500, body: "down".to_string() },
                ));
            }
            Ok(vec![student("a", 20.0), student("b", 100.0), student("c", 60.0)])
        }
    }

    #[tokio::test]
    async fn second_get_within_ttl_fetches_once() {
        let clock = ManualClock::new();
        let cache = DepartmentCache::with_clock(CountingLoader::default(), DEFAULT_TTL, clock.clone());

        let first = cache.get("dept-1").await.unwrap();
        clock.advance(Duration::from_secs(120));
        let second = cache.get("dept-1").await.unwrap();

        assert_eq!(cache.loader().calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn expired_entry_is_refetched() {
        let clock = ManualClock::new();
        let cache = DepartmentCache::with_clock(CountingLoader::default(), DEFAULT_TTL, clock.clone());

        cache.get("dept-1").await.unwrap();
        clock.advance(DEFAULT_TTL);
        cache.get("dept-1").await.unwrap();

        assert_eq!(cache.loader().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let clock = ManualClock::new();
        let cache = DepartmentCache::with_clock(CountingLoader::default(), DEFAULT_TTL, clock);

        cache.get("dept-1").await.unwrap();
        assert!(cache.invalidate("dept-1").await);
        assert!(!cache.invalidate("dept-1").await);
        cache.get("dept-1").await.unwrap();

        assert_eq!(cache.loader().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refresh_ignores_freshness() {
        let cache = DepartmentCache::new(CountingLoader::default(), DEFAULT_TTL);
        cache.get("dept-1").await.unwrap();
        cache.refresh("dept-1").await.unwrap();
        assert_eq!(cache.loader().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_fetch() {
        let loader = CountingLoader {
            delay: Some(Duration::from_millis(30)),
            ..CountingLoader::default()
        };
        let cache = Arc::new(DepartmentCache::new(loader, DEFAULT_TTL));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get("dept-1").await.map(|e| e.raw_records.len()) })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 3);
        }

        assert_eq!(cache.loader().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_load_is_an_error_not_an_empty_entry() {
        let loader = CountingLoader {
            fail: true,
            ..CountingLoader::default()
        };
        let cache = DepartmentCache::new(loader, DEFAULT_TTL);

        let result = cache.get("dept-1").await;
        assert!(matches!(result, Err(SyncError::DepartmentUnavailable { .. })));
        assert!(!cache.invalidate("dept-1").await);
    }

    #[tokio::test]
    async fn invalidate_during_fetch_is_not_undone() {
        let loader = CountingLoader {
            delay: Some(Duration::from_millis(50)),
            ..CountingLoader::default()
        };
        let cache = Arc::new(DepartmentCache::new(loader, DEFAULT_TTL));

        let in_flight = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get("dept-1").await.map(|e| e.raw_records.len()) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate("dept-1").await;

        assert_eq!(in_flight.await.unwrap().unwrap(), 3);
        cache.get("dept-1").await.unwrap();
        assert_eq!(cache.loader().calls.load(Ordering::SeqCst), 2);

        cache.get("dept-1").await.unwrap();
        assert_eq!(cache.loader().calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn entries_sort_by_engagement_then_progress() {
        let entry = CacheEntry::build(
            "dept-1",
            vec![student("a", 20.0), student("b", 100.0), student("c", 60.0)],
            Utc::now(),
        );
        let order: Vec<&str> = entry.aggregated.iter().map(|s| s.student_id.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        assert_eq!(entry.aggregated[0].engagement, EngagementStatus::Complete);
        assert!(entry.record("B").is_some());
    }
}
