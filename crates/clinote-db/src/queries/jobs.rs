// crates/clinote-db/src/queries/jobs.rs
//! Job record persistence. The in-process registry in `clinote-server` is
//! authoritative for scheduling; this table is the durable record queried
//! by `GET /jobs` and `GET /jobs/{id}`.

use chrono::{NaiveDateTime, Utc};
use clinote_core::model::{Job, JobKind, JobProgressCounters, JobState};

use crate::{Database, DbResult};

fn kind_to_str(kind: JobKind) -> &'static str {
    match kind {
        JobKind::Upload => "upload",
        JobKind::Extraction => "extraction",
    }
}

fn kind_from_str(s: &str) -> JobKind {
    match s {
        "extraction" => JobKind::Extraction,
        _ => JobKind::Upload,
    }
}

fn state_to_str(state: JobState) -> &'static str {
    match state {
        JobState::Queued => "queued",
        JobState::Running => "running",
        JobState::Completed => "completed",
        JobState::Failed => "failed",
        JobState::Cancelled => "cancelled",
    }
}

fn state_from_str(s: &str) -> JobState {
    match s {
        "running" => JobState::Running,
        "completed" => JobState::Completed,
        "failed" => JobState::Failed,
        "cancelled" => JobState::Cancelled,
        _ => JobState::Queued,
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    tenant_id: String,
    kind: String,
    state: String,
    started_at: Option<String>,
    ended_at: Option<String>,
    processed: i64,
    total: i64,
    rate_per_sec: f64,
    eta_sec: Option<f64>,
    percentage: f64,
    error: Option<String>,
}

fn parse_dt(s: &Option<String>) -> Option<NaiveDateTime> {
    s.as_deref()
        .and_then(|v| NaiveDateTime::parse_from_str(v, "%Y-%m-%dT%H:%M:%S%.f").ok())
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Job {
            id: row.id,
            tenant_id: row.tenant_id,
            kind: kind_from_str(&row.kind),
            state: state_from_str(&row.state),
            started_at: parse_dt(&row.started_at),
            ended_at: parse_dt(&row.ended_at),
            progress: JobProgressCounters {
                processed: row.processed as u64,
                total: row.total as u64,
                rate_per_sec: row.rate_per_sec,
                eta_sec: row.eta_sec,
                percentage: row.percentage,
            },
            error: row.error,
        }
    }
}

impl Database {
    pub async fn upsert_job(&self, job: &Job) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, tenant_id, kind, state, started_at, ended_at,
                processed, total, rate_per_sec, eta_sec, percentage, error, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                started_at = COALESCE(jobs.started_at, excluded.started_at),
                ended_at = excluded.ended_at,
                processed = excluded.processed,
                total = excluded.total,
                rate_per_sec = excluded.rate_per_sec,
                eta_sec = excluded.eta_sec,
                percentage = excluded.percentage,
                error = excluded.error
            "#,
        )
        .bind(&job.id)
        .bind(&job.tenant_id)
        .bind(kind_to_str(job.kind))
        .bind(state_to_str(job.state))
        .bind(job.started_at.map(|d| d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
        .bind(job.ended_at.map(|d| d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
        .bind(job.progress.processed as i64)
        .bind(job.progress.total as i64)
        .bind(job.progress.rate_per_sec)
        .bind(job.progress.eta_sec)
        .bind(job.progress.percentage)
        .bind(&job.error)
        .bind(Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_job(&self, job_id: &str) -> DbResult<Option<Job>> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = ?1")
            .bind(job_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(Job::from))
    }

    /// All jobs for a tenant, most recently started first.
    pub async fn list_jobs_by_tenant(&self, tenant_id: &str) -> DbResult<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            "SELECT * FROM jobs WHERE tenant_id = ?1 ORDER BY created_at DESC",
        )
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Job::from).collect())
    }

    /// Deletes completed/failed/cancelled jobs older than `max_age_hours`.
    pub async fn purge_old_jobs(&self, max_age_hours: i64) -> DbResult<u64> {
        let cutoff = Utc::now().naive_utc() - chrono::Duration::hours(max_age_hours);
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE state IN ('completed', 'failed', 'cancelled')
            AND ended_at IS NOT NULL
            AND ended_at < ?1
            "#,
        )
        .bind(cutoff.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str, tenant: &str) -> Job {
        Job {
            id: id.into(),
            tenant_id: tenant.into(),
            kind: JobKind::Upload,
            state: JobState::Queued,
            started_at: None,
            ended_at: None,
            progress: JobProgressCounters::default(),
            error: None,
        }
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let db = Database::new_in_memory().await.unwrap();
        db.upsert_job(&job("J1", "t1")).await.unwrap();
        let fetched = db.get_job("J1").await.unwrap().unwrap();
        assert_eq!(fetched.state, JobState::Queued);
    }

    #[tokio::test]
    async fn list_jobs_by_tenant_orders_most_recent_first() {
        let db = Database::new_in_memory().await.unwrap();
        db.upsert_job(&job("J1", "t1")).await.unwrap();
        db.upsert_job(&job("J2", "t1")).await.unwrap();
        let jobs = db.list_jobs_by_tenant("t1").await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, "J2");
    }
}
