//! Document reconstruction pipeline for Recast.
//!
//! A long document is planned ([`planner`]), segmented ([`segmenter`]),
//! given a shared structural plan ([`skeleton`]), regenerated chunk by chunk
//! against that plan, and stitched back together. [`pipeline::Orchestrator`]
//! drives a job through those steps and can resume it after any failure.

pub mod context;
pub mod pipeline;
pub mod planner;
pub mod prompts;
pub mod response;
pub mod sections;
pub mod segmenter;
pub mod skeleton;
pub mod stitcher;

mod processor;

pub use pipeline::{JobOutcome, JobRequest, Orchestrator, ProgressReporter, SilentProgress};
pub use tokio_util::sync::CancellationToken;
