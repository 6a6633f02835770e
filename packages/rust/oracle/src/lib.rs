//! The text-generation oracle the reconstruction pipeline talks to.
//!
//! The pipeline treats generation as an opaque, unreliable service: given a
//! system instruction and a user instruction it returns text that may be
//! truncated, wrapped in stray prose, or missing entirely. Everything that
//! copes with that lives in `recast-core`; this crate only moves bytes.
//!
//! - [`Oracle`]: the interface the pipeline is generic over
//! - [`OpenRouterOracle`]: OpenAI-compatible `chat/completions` client
//! - [`ScriptedOracle`]: canned replies plus a call log, for tests

mod openrouter;
mod scripted;

use std::future::Future;

use recast_shared::Result;

pub use openrouter::{OpenRouterOracle, OpenRouterOptions};
pub use scripted::{Reply, ScriptedOracle};

/// One generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRequest {
    pub system: String,
    pub user: String,
    /// Upper bound on generated tokens.
    pub max_output_units: u32,
}

impl OracleRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>, max_output_units: u32) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_output_units,
        }
    }
}

/// A text-generation service.
///
/// Failures to reach the service are returned as [`recast_shared::RecastError::Oracle`];
/// malformed-but-delivered text is returned as `Ok` for the caller to cope with.
pub trait Oracle: Send + Sync {
    fn generate(&self, request: &OracleRequest) -> impl Future<Output = Result<String>> + Send;

    /// Model identifier, for logs.
    fn model_id(&self) -> &str;
}
