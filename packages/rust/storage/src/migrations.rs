//! SQL migration definitions for the Recast job database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: jobs, chunks",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Reconstruction jobs
CREATE TABLE IF NOT EXISTS jobs (
    id                  TEXT PRIMARY KEY,
    owner               TEXT NOT NULL,
    input_text          TEXT NOT NULL,
    custom_instructions TEXT NOT NULL DEFAULT '',
    requested_words     INTEGER,
    total_input_words   INTEGER NOT NULL,
    target_min_words    INTEGER NOT NULL,
    target_mid_words    INTEGER NOT NULL,
    target_max_words    INTEGER NOT NULL,
    length_ratio        REAL NOT NULL,
    length_mode         TEXT NOT NULL,
    chunk_count         INTEGER NOT NULL,
    chunk_target_words  INTEGER NOT NULL,
    skeleton_json       TEXT,
    status              TEXT NOT NULL,
    current_chunk       INTEGER NOT NULL DEFAULT 0,
    final_output        TEXT,
    final_word_count    INTEGER,
    stitch_report_json  TEXT,
    under_target_chunks INTEGER,
    last_error          TEXT,
    claim_owner         TEXT,
    claim_expires_at    INTEGER,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);

-- One row per decomposition unit of a job
CREATE TABLE IF NOT EXISTS chunks (
    id            TEXT PRIMARY KEY,
    job_id        TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    chunk_index   INTEGER NOT NULL,
    input_text    TEXT NOT NULL,
    input_words   INTEGER NOT NULL,
    target_words  INTEGER NOT NULL,
    min_words     INTEGER NOT NULL,
    max_words     INTEGER NOT NULL,
    output_text   TEXT,
    actual_words  INTEGER NOT NULL DEFAULT 0,
    delta_json    TEXT,
    retry_count   INTEGER NOT NULL DEFAULT 0,
    under_target  INTEGER NOT NULL DEFAULT 0,
    status        TEXT NOT NULL DEFAULT 'pending',
    error_message TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    UNIQUE(job_id, chunk_index)
);

CREATE INDEX IF NOT EXISTS idx_chunks_job_id ON chunks(job_id);

INSERT OR IGNORE INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
