use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::normalize_email;
use crate::readiness::ReadinessStatus;
use crate::snapshot::{SnapshotSink, StudySnapshot};

pub async fn init_db(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn readiness_from_text(value: &str) -> ReadinessStatus {
    match value {
        "GREEN" => ReadinessStatus::Green,
        "YELLOW" => ReadinessStatus::Yellow,
        _ => ReadinessStatus::Red,
    }
}

fn snapshot_from_row(row: &PgRow) -> Result<StudySnapshot, sqlx::Error> {
    let readiness: String = row.try_get("readiness")?;
    Ok(StudySnapshot {
        email: row.try_get("email")?,
        taken_at: row.try_get("taken_at")?,
        total_time_min: row.try_get("total_time_min")?,
        prelicense_progress: row.try_get("prelicense_progress")?,
        exam_prep_progress: row.try_get("exam_prep_progress")?,
        practice_scores: row.try_get("practice_scores")?,
        consecutive_passing: row.try_get("consecutive_passing")?,
        readiness: readiness_from_text(&readiness),
        criteria_met: row.try_get("criteria_met")?,
        study_gap_count: row.try_get("study_gap_count")?,
        total_gap_days: row.try_get("total_gap_days")?,
        largest_gap_days: row.try_get("largest_gap_days")?,
        life_video_min: row.try_get("life_video_min")?,
        health_video_min: row.try_get("health_video_min")?,
        state_law_min: row.try_get("state_law_min")?,
        state_law_completions: row.try_get("state_law_completions")?,
    })
}

/// Snapshot history kept in Postgres.
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotSink for PgSnapshotStore {
    async fn write_snapshots(&self, snapshots: &[StudySnapshot]) -> Result<u64, StoreError> {
        if snapshots.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for snapshot in snapshots {
            let result = sqlx::query(
                r#"
                INSERT INTO enrollment_readiness.study_snapshots
                (id, email, taken_at, total_time_min, prelicense_progress, exam_prep_progress,
                 practice_scores, consecutive_passing, readiness, criteria_met,
                 study_gap_count, total_gap_days, largest_gap_days,
                 life_video_min, health_video_min, state_law_min, state_law_completions)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&snapshot.email)
            .bind(snapshot.taken_at)
            .bind(snapshot.total_time_min)
            .bind(snapshot.prelicense_progress)
            .bind(snapshot.exam_prep_progress)
            .bind(&snapshot.practice_scores)
            .bind(snapshot.consecutive_passing)
            .bind(snapshot.readiness.as_str())
            .bind(snapshot.criteria_met)
            .bind(snapshot.study_gap_count)
            .bind(snapshot.total_gap_days)
            .bind(snapshot.largest_gap_days)
            .bind(snapshot.life_video_min)
            .bind(snapshot.health_video_min)
            .bind(snapshot.state_law_min)
            .bind(snapshot.state_law_completions)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;
        tracing::info!(snapshots = inserted, "Saved study snapshots");
        Ok(inserted)
    }

    async fn read_history(&self, email: &str, limit: i64) -> Result<Vec<StudySnapshot>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM enrollment_readiness.study_snapshots
            WHERE email = $1
            ORDER BY taken_at DESC
            LIMIT $2
            "#,
        )
        .bind(normalize_email(email))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut history = Vec::with_capacity(rows.len());
        for row in rows {
            history.push(snapshot_from_row(&row)?);
        }
        Ok(history)
    }

    async fn prune_older_than(&self, days: i64) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let deleted = sqlx::query("DELETE FROM enrollment_readiness.study_snapshots WHERE taken_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted > 0 {
            tracing::info!(deleted, days, "Pruned old snapshots");
        }
        Ok(deleted)
    }
}
