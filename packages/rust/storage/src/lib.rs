//! libSQL storage layer for reconstruction jobs.
//!
//! The [`Storage`] struct wraps a local libSQL database holding two relations:
//! `jobs` (one row per reconstruction request) and `chunks` (one row per
//! decomposition unit, unique on `(job_id, chunk_index)`).
//!
//! **Write rules:**
//! - Planning fields are written once by [`Storage::insert_job`] and never updated.
//! - Status changes go through [`Storage::transition_job`], which checks the
//!   state machine and only applies if the row still holds the expected status.
//! - A worker must hold the job's claim ([`Storage::claim_job`]) while driving it,
//!   extending it with [`Storage::renew_claim`] as it goes.

mod migrations;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database, params};
use recast_shared::{
    Chunk, ChunkBounds, ChunkStatus, Delta, Job, JobId, JobStatus, LengthPlan, NewChunk,
    RecastError, Result, Skeleton, StitchReport,
};
use uuid::Uuid;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// Immutable inputs of a job plus its derived plan, as handed to [`Storage::insert_job`].
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: JobId,
    pub owner: String,
    pub input_text: String,
    pub custom_instructions: String,
    pub requested_words: Option<u32>,
    pub plan: LengthPlan,
}

/// One line of `recast list`.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub id: String,
    pub owner: String,
    pub status: JobStatus,
    pub length_mode: String,
    pub chunk_count: u32,
    pub total_input_words: u32,
    pub target_mid_words: u32,
    pub final_word_count: Option<u32>,
    pub created_at: String,
}

/// Output side of a chunk attempt.
#[derive(Debug, Clone, Copy)]
pub struct ChunkOutput<'a> {
    pub text: &'a str,
    pub words: u32,
    pub delta: &'a Delta,
    pub retry_count: u32,
}

/// Final assembly written when a job completes.
#[derive(Debug, Clone, Copy)]
pub struct FinalOutput<'a> {
    pub text: &'a str,
    pub word_count: u32,
    pub report: Option<&'a StitchReport>,
    pub under_target_chunks: u32,
}

const JOB_COLUMNS: &str = "id, owner, input_text, custom_instructions, requested_words,
    total_input_words, target_min_words, target_mid_words, target_max_words, length_ratio,
    length_mode, chunk_count, chunk_target_words, skeleton_json, status, current_chunk,
    final_output, final_word_count, stitch_report_json, under_target_chunks, last_error,
    created_at, updated_at";

const CHUNK_COLUMNS: &str = "id, job_id, chunk_index, input_text, input_words, target_words,
    min_words, max_words, output_text, actual_words, delta_json, retry_count, under_target,
    status, error_message, created_at, updated_at";

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RecastError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(RecastError::storage)?;

        let conn = db.connect().map_err(RecastError::storage)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode (for `status` / `list` / `export`).
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(RecastError::storage)?;

        let conn = db.connect().map_err(RecastError::storage)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await?;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        RecastError::Storage(format!("migration v{} failed: {e}", migration.version))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    ///
    /// Only a missing `schema_migrations` table means version 0; any other
    /// read failure is reported.
    async fn get_schema_version(&self) -> Result<u32> {
        let mut tables = self
            .conn
            .query(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations'",
                params![],
            )
            .await
            .map_err(RecastError::storage)?;
        if tables.next().await.map_err(RecastError::storage)?.is_none() {
            return Ok(0);
        }

        let mut rows = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await
            .map_err(|e| RecastError::Storage(format!("could not read schema version: {e}")))?;
        let row = rows.next().await.map_err(RecastError::storage)?;
        Ok(row.and_then(|row| get_opt_u32(&row, 0)).unwrap_or(0))
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(RecastError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Job operations
    // -----------------------------------------------------------------------

    /// Insert a new job in `pending` status.
    pub async fn insert_job(&self, job: &NewJob) -> Result<()> {
        self.check_writable()?;
        let now = timestamp(Utc::now());
        let plan = &job.plan;
        self.conn
            .execute(
                "INSERT INTO jobs (id, owner, input_text, custom_instructions, requested_words,
                    total_input_words, target_min_words, target_mid_words, target_max_words,
                    length_ratio, length_mode, chunk_count, chunk_target_words, status,
                    current_chunk, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 0, ?15, ?15)",
                params![
                    job.id.to_string(),
                    job.owner.as_str(),
                    job.input_text.as_str(),
                    job.custom_instructions.as_str(),
                    job.requested_words.map(i64::from),
                    i64::from(plan.total_input_words),
                    i64::from(plan.target_min_words),
                    i64::from(plan.target_mid_words),
                    i64::from(plan.target_max_words),
                    plan.length_ratio,
                    plan.length_mode.as_str(),
                    i64::from(plan.chunk_count),
                    i64::from(plan.chunk_target_words),
                    JobStatus::Pending.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(RecastError::storage)?;
        Ok(())
    }

    /// Get a job by ID.
    pub async fn get_job(&self, id: &JobId) -> Result<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id.to_string()])
            .await
            .map_err(RecastError::storage)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_job(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(RecastError::storage(e)),
        }
    }

    /// Get a job by ID, failing with [`RecastError::JobNotFound`] if absent.
    pub async fn require_job(&self, id: &JobId) -> Result<Job> {
        self.get_job(id).await?.ok_or_else(|| RecastError::JobNotFound {
            job_id: id.to_string(),
        })
    }

    /// List all jobs, newest first.
    pub async fn list_jobs(&self) -> Result<Vec<JobSummary>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, owner, status, length_mode, chunk_count, total_input_words,
                        target_mid_words, final_word_count, created_at
                 FROM jobs ORDER BY created_at DESC, id DESC",
                params![],
            )
            .await
            .map_err(RecastError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(RecastError::storage)? {
            let status: String = row.get(2).map_err(RecastError::storage)?;
            results.push(JobSummary {
                id: row.get(0).map_err(RecastError::storage)?,
                owner: row.get(1).map_err(RecastError::storage)?,
                status: status.parse()?,
                length_mode: row.get(3).map_err(RecastError::storage)?,
                chunk_count: get_u32(&row, 4)?,
                total_input_words: get_u32(&row, 5)?,
                target_mid_words: get_u32(&row, 6)?,
                final_word_count: get_opt_u32(&row, 7),
                created_at: row.get(8).map_err(RecastError::storage)?,
            });
        }
        Ok(results)
    }

    /// Move a job from `from` to `to`.
    ///
    /// Rejected if the state machine forbids the move, or if the stored status
    /// is no longer `from` (someone else advanced the job).
    pub async fn transition_job(&self, id: &JobId, from: JobStatus, to: JobStatus) -> Result<()> {
        self.check_writable()?;
        from.transition(to)?;
        let now = timestamp(Utc::now());
        let changed = self
            .conn
            .execute(
                "UPDATE jobs SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
                params![to.as_str(), now.as_str(), id.to_string(), from.as_str()],
            )
            .await
            .map_err(RecastError::storage)?;

        if changed == 0 {
            return Err(self.stale_status_error(id, from, to).await);
        }
        tracing::info!(job_id = %id, %from, %to, "job transition");
        Ok(())
    }

    async fn stale_status_error(&self, id: &JobId, from: JobStatus, to: JobStatus) -> RecastError {
        match self.get_job(id).await {
            Ok(Some(job)) => RecastError::InvalidTransition {
                from: job.status.as_str().into(),
                to: format!("{to} (expected to leave {from})"),
            },
            Ok(None) => RecastError::JobNotFound {
                job_id: id.to_string(),
            },
            Err(e) => e,
        }
    }

    /// Persist the job's skeleton (extracted or default).
    pub async fn save_skeleton(&self, id: &JobId, skeleton: &Skeleton) -> Result<()> {
        self.check_writable()?;
        let json = serde_json::to_string(skeleton).map_err(RecastError::storage)?;
        let now = timestamp(Utc::now());
        self.conn
            .execute(
                "UPDATE jobs SET skeleton_json = ?1, updated_at = ?2 WHERE id = ?3",
                params![json, now.as_str(), id.to_string()],
            )
            .await
            .map_err(RecastError::storage)?;
        Ok(())
    }

    /// Record which chunk the worker is on.
    pub async fn set_current_chunk(&self, id: &JobId, index: u32) -> Result<()> {
        self.check_writable()?;
        let now = timestamp(Utc::now());
        self.conn
            .execute(
                "UPDATE jobs SET current_chunk = ?1, updated_at = ?2 WHERE id = ?3",
                params![i64::from(index), now.as_str(), id.to_string()],
            )
            .await
            .map_err(RecastError::storage)?;
        Ok(())
    }

    /// Record (or clear, with `None`) the error that aborted the last run.
    pub async fn record_job_error(&self, id: &JobId, error: Option<&str>) -> Result<()> {
        self.check_writable()?;
        let now = timestamp(Utc::now());
        self.conn
            .execute(
                "UPDATE jobs SET last_error = ?1, updated_at = ?2 WHERE id = ?3",
                params![error, now.as_str(), id.to_string()],
            )
            .await
            .map_err(RecastError::storage)?;
        Ok(())
    }

    /// Write the final document and move the job from `stitching` to `complete`.
    pub async fn finish_job(&self, id: &JobId, output: FinalOutput<'_>) -> Result<()> {
        self.check_writable()?;
        let from = JobStatus::Stitching;
        let to = from.transition(JobStatus::Complete)?;
        let report_json = output
            .report
            .map(serde_json::to_string)
            .transpose()
            .map_err(RecastError::storage)?;
        let now = timestamp(Utc::now());
        let changed = self
            .conn
            .execute(
                "UPDATE jobs SET final_output = ?1, final_word_count = ?2, stitch_report_json = ?3,
                    under_target_chunks = ?4, last_error = NULL, status = ?5, updated_at = ?6
                 WHERE id = ?7 AND status = ?8",
                params![
                    output.text,
                    i64::from(output.word_count),
                    report_json,
                    i64::from(output.under_target_chunks),
                    to.as_str(),
                    now.as_str(),
                    id.to_string(),
                    from.as_str(),
                ],
            )
            .await
            .map_err(RecastError::storage)?;

        if changed == 0 {
            return Err(self.stale_status_error(id, from, to).await);
        }
        tracing::info!(job_id = %id, %from, %to, "job transition");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Claim operations
    // -----------------------------------------------------------------------

    /// Take (or renew) the exclusive lease on a job for `worker`.
    ///
    /// Succeeds when the job is unclaimed, already held by `worker`, or held
    /// by a lease that has expired.
    pub async fn claim_job(&self, id: &JobId, worker: &str, lease: Duration) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now();
        let now_ms = now.timestamp_millis();
        let lease_ms = i64::try_from(lease.as_millis()).unwrap_or(i64::MAX);
        let expires_ms = now_ms.saturating_add(lease_ms);
        let changed = self
            .conn
            .execute(
                "UPDATE jobs SET claim_owner = ?1, claim_expires_at = ?2, updated_at = ?3
                 WHERE id = ?4
                   AND (claim_owner IS NULL OR claim_owner = ?1 OR claim_expires_at < ?5)",
                params![worker, expires_ms, timestamp(now), id.to_string(), now_ms],
            )
            .await
            .map_err(RecastError::storage)?;

        if changed == 1 {
            tracing::debug!(job_id = %id, worker, "job claimed");
            return Ok(());
        }
        Err(self.claim_conflict(id).await)
    }

    /// Extend `worker`'s existing lease on a job.
    ///
    /// Unlike [`Storage::claim_job`] this never takes over a claim: it fails
    /// with [`RecastError::JobClaimed`] once another worker holds the job,
    /// even if this worker's own lease simply lapsed.
    pub async fn renew_claim(&self, id: &JobId, worker: &str, lease: Duration) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now();
        let lease_ms = i64::try_from(lease.as_millis()).unwrap_or(i64::MAX);
        let expires_ms = now.timestamp_millis().saturating_add(lease_ms);
        let changed = self
            .conn
            .execute(
                "UPDATE jobs SET claim_expires_at = ?1, updated_at = ?2
                 WHERE id = ?3 AND claim_owner = ?4",
                params![expires_ms, timestamp(now), id.to_string(), worker],
            )
            .await
            .map_err(RecastError::storage)?;

        if changed == 1 {
            tracing::trace!(job_id = %id, worker, "claim renewed");
            return Ok(());
        }
        Err(self.claim_conflict(id).await)
    }

    /// The error to report when a claim update matched no row.
    async fn claim_conflict(&self, id: &JobId) -> RecastError {
        let mut rows = match self
            .conn
            .query(
                "SELECT claim_owner FROM jobs WHERE id = ?1",
                params![id.to_string()],
            )
            .await
        {
            Ok(rows) => rows,
            Err(e) => return RecastError::storage(e),
        };
        match rows.next().await {
            Ok(Some(row)) => RecastError::JobClaimed {
                job_id: id.to_string(),
                owner: row.get::<String>(0).unwrap_or_default(),
            },
            Ok(None) => RecastError::JobNotFound {
                job_id: id.to_string(),
            },
            Err(e) => RecastError::storage(e),
        }
    }

    /// Drop `worker`'s lease on a job. A lease held by someone else is left alone.
    pub async fn release_job(&self, id: &JobId, worker: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "UPDATE jobs SET claim_owner = NULL, claim_expires_at = NULL
                 WHERE id = ?1 AND claim_owner = ?2",
                params![id.to_string(), worker],
            )
            .await
            .map_err(RecastError::storage)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Chunk operations
    // -----------------------------------------------------------------------

    /// Create chunk rows for a job. Indices that already exist are left
    /// untouched, so calling this twice never duplicates or resets a chunk.
    /// Returns the number of rows actually inserted.
    pub async fn insert_chunks(&self, job_id: &JobId, chunks: &[NewChunk]) -> Result<u64> {
        self.check_writable()?;
        let now = timestamp(Utc::now());
        let tx = self.conn.transaction().await.map_err(RecastError::storage)?;
        let mut inserted = 0;
        for chunk in chunks {
            inserted += tx
                .execute(
                    "INSERT INTO chunks (id, job_id, chunk_index, input_text, input_words,
                        target_words, min_words, max_words, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                     ON CONFLICT(job_id, chunk_index) DO NOTHING",
                    params![
                        Uuid::now_v7().to_string(),
                        job_id.to_string(),
                        i64::from(chunk.index),
                        chunk.input_text.as_str(),
                        i64::from(chunk.input_words),
                        i64::from(chunk.bounds.target_words),
                        i64::from(chunk.bounds.min_words),
                        i64::from(chunk.bounds.max_words),
                        ChunkStatus::Pending.as_str(),
                        now.as_str(),
                    ],
                )
                .await
                .map_err(RecastError::storage)?;
        }
        tx.commit().await.map_err(RecastError::storage)?;
        Ok(inserted)
    }

    /// All chunks of a job in index order.
    pub async fn list_chunks(&self, job_id: &JobId) -> Result<Vec<Chunk>> {
        let sql = format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE job_id = ?1 ORDER BY chunk_index");
        let mut rows = self
            .conn
            .query(&sql, params![job_id.to_string()])
            .await
            .map_err(RecastError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(RecastError::storage)? {
            results.push(row_to_chunk(&row)?);
        }
        Ok(results)
    }

    /// Persist an intermediate attempt; the chunk stays `pending`.
    pub async fn record_chunk_attempt(&self, chunk_id: &str, output: ChunkOutput<'_>) -> Result<()> {
        self.write_chunk_output(chunk_id, output, ChunkStatus::Pending, false)
            .await
    }

    /// Persist the accepted output and mark the chunk `complete`.
    pub async fn complete_chunk(
        &self,
        chunk_id: &str,
        output: ChunkOutput<'_>,
        under_target: bool,
    ) -> Result<()> {
        self.write_chunk_output(chunk_id, output, ChunkStatus::Complete, under_target)
            .await
    }

    async fn write_chunk_output(
        &self,
        chunk_id: &str,
        output: ChunkOutput<'_>,
        status: ChunkStatus,
        under_target: bool,
    ) -> Result<()> {
        self.check_writable()?;
        let delta_json = serde_json::to_string(output.delta).map_err(RecastError::storage)?;
        let now = timestamp(Utc::now());
        self.conn
            .execute(
                "UPDATE chunks SET output_text = ?1, actual_words = ?2, delta_json = ?3,
                    retry_count = ?4, under_target = ?5, status = ?6, error_message = NULL,
                    updated_at = ?7
                 WHERE id = ?8",
                params![
                    output.text,
                    i64::from(output.words),
                    delta_json,
                    i64::from(output.retry_count),
                    i64::from(under_target),
                    status.as_str(),
                    now.as_str(),
                    chunk_id,
                ],
            )
            .await
            .map_err(RecastError::storage)?;
        Ok(())
    }

    /// Mark a chunk `failed` with the error that stopped it.
    pub async fn fail_chunk(&self, chunk_id: &str, error: &str) -> Result<()> {
        self.check_writable()?;
        let now = timestamp(Utc::now());
        self.conn
            .execute(
                "UPDATE chunks SET status = ?1, error_message = ?2, updated_at = ?3 WHERE id = ?4",
                params![ChunkStatus::Failed.as_str(), error, now.as_str(), chunk_id],
            )
            .await
            .map_err(RecastError::storage)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RecastError::Storage(format!("invalid date: {e}")))
}

fn get_u32(row: &libsql::Row, idx: i32) -> Result<u32> {
    let value: i64 = row.get(idx).map_err(RecastError::storage)?;
    u32::try_from(value).map_err(|_| RecastError::Storage(format!("column {idx} out of range: {value}")))
}

fn get_opt_u32(row: &libsql::Row, idx: i32) -> Option<u32> {
    row.get::<i64>(idx).ok().and_then(|v| u32::try_from(v).ok())
}

fn get_json<T: serde::de::DeserializeOwned>(row: &libsql::Row, idx: i32) -> Result<Option<T>> {
    match row.get::<String>(idx).ok() {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| RecastError::Storage(format!("corrupt JSON in column {idx}: {e}"))),
        None => Ok(None),
    }
}

/// Convert a database row (selected with `JOB_COLUMNS`) to a [`Job`].
fn row_to_job(row: &libsql::Row) -> Result<Job> {
    let id: String = row.get(0).map_err(RecastError::storage)?;
    let mode: String = row.get(10).map_err(RecastError::storage)?;
    let status: String = row.get(14).map_err(RecastError::storage)?;
    let created: String = row.get(21).map_err(RecastError::storage)?;
    let updated: String = row.get(22).map_err(RecastError::storage)?;

    Ok(Job {
        id: id
            .parse()
            .map_err(|e| RecastError::Storage(format!("invalid job id '{id}': {e}")))?,
        owner: row.get(1).map_err(RecastError::storage)?,
        input_text: row.get(2).map_err(RecastError::storage)?,
        custom_instructions: row.get(3).map_err(RecastError::storage)?,
        requested_words: get_opt_u32(row, 4),
        plan: LengthPlan {
            total_input_words: get_u32(row, 5)?,
            target_min_words: get_u32(row, 6)?,
            target_mid_words: get_u32(row, 7)?,
            target_max_words: get_u32(row, 8)?,
            length_ratio: row.get(9).map_err(RecastError::storage)?,
            length_mode: mode.parse()?,
            chunk_count: get_u32(row, 11)?,
            chunk_target_words: get_u32(row, 12)?,
        },
        skeleton: get_json(row, 13)?,
        status: status.parse()?,
        current_chunk: get_u32(row, 15)?,
        final_output: row.get::<String>(16).ok(),
        final_word_count: get_opt_u32(row, 17),
        stitch_report: get_json(row, 18)?,
        under_target_chunks: get_opt_u32(row, 19),
        last_error: row.get::<String>(20).ok(),
        created_at: parse_timestamp(&created)?,
        updated_at: parse_timestamp(&updated)?,
    })
}

/// Convert a database row (selected with `CHUNK_COLUMNS`) to a [`Chunk`].
fn row_to_chunk(row: &libsql::Row) -> Result<Chunk> {
    let job_id: String = row.get(1).map_err(RecastError::storage)?;
    let status: String = row.get(13).map_err(RecastError::storage)?;
    let created: String = row.get(15).map_err(RecastError::storage)?;
    let updated: String = row.get(16).map_err(RecastError::storage)?;

    Ok(Chunk {
        id: row.get(0).map_err(RecastError::storage)?,
        job_id: job_id
            .parse()
            .map_err(|e| RecastError::Storage(format!("invalid job id '{job_id}': {e}")))?,
        index: get_u32(row, 2)?,
        input_text: row.get(3).map_err(RecastError::storage)?,
        input_words: get_u32(row, 4)?,
        bounds: ChunkBounds {
            target_words: get_u32(row, 5)?,
            min_words: get_u32(row, 6)?,
            max_words: get_u32(row, 7)?,
        },
        output_text: row.get::<String>(8).ok(),
        actual_words: get_u32(row, 9)?,
        delta: get_json(row, 10)?,
        retry_count: get_u32(row, 11)?,
        under_target: row.get::<i64>(12).map_err(RecastError::storage)? != 0,
        status: status.parse()?,
        error_message: row.get::<String>(14).ok(),
        created_at: parse_timestamp(&created)?,
        updated_at: parse_timestamp(&updated)?,
    })
}
