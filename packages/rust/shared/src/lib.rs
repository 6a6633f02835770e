//! Shared types, error model, and configuration for Recast.
//!
//! This crate is the foundation depended on by all other Recast crates.
//! It provides:
//! - [`RecastError`]: the unified error type
//! - Domain types ([`Job`], [`Chunk`], [`Skeleton`], [`Delta`], [`JobStatus`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, OracleConfig, PipelineConfig, PipelineSettings, api_key,
    config_dir, config_file_path, init_config, load_config, load_config_from, resolve_db_path,
    validate_api_key,
};
pub use error::{RecastError, Result};
pub use types::{
    Chunk, ChunkBounds, ChunkStatus, CommitmentLedger, Delta, Job, JobId, JobStatus, LengthMode,
    LengthPlan, NewChunk, Skeleton, SkeletonPlan, StitchReport, word_count,
};
