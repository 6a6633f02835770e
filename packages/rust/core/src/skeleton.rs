//! Skeleton extraction: the structural plan every chunk is written against.
//!
//! Extraction never fails on a bad response. An unparseable or empty plan is a
//! visible [`SkeletonParse::Failed`] branch that resolves to [`Skeleton::Default`].
//! Only an unreachable oracle or a storage error propagates.

use std::collections::HashSet;

use recast_oracle::{Oracle, OracleRequest};
use recast_shared::{Job, Result, Skeleton, SkeletonPlan};
use recast_storage::Storage;
use tracing::{info, instrument, warn};

use crate::prompts::{SKELETON_MAX_OUTPUT_UNITS, SKELETON_SYSTEM, skeleton_prompt};
use crate::response::extract_json_object;
use crate::segmenter::head_words;

/// Result of parsing a skeleton response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkeletonParse {
    Parsed(SkeletonPlan),
    Failed { reason: String },
}

impl SkeletonParse {
    pub fn into_skeleton(self) -> Skeleton {
        match self {
            Self::Parsed(plan) => Skeleton::Extracted(plan),
            Self::Failed { .. } => Skeleton::Default,
        }
    }
}

/// Parse an oracle response into a skeleton plan.
pub fn parse_skeleton(raw: &str) -> SkeletonParse {
    let Some(json) = extract_json_object(raw) else {
        return SkeletonParse::Failed {
            reason: "no JSON object in response".into(),
        };
    };

    let mut plan: SkeletonPlan = match serde_json::from_str(json) {
        Ok(plan) => plan,
        Err(e) => {
            return SkeletonParse::Failed {
                reason: format!("invalid skeleton JSON: {e}"),
            };
        }
    };

    let mut seen = HashSet::new();
    plan.outline = plan
        .outline
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty() && seen.insert(item.to_lowercase()))
        .collect();

    if plan.outline.is_empty() {
        return SkeletonParse::Failed {
            reason: "outline is empty".into(),
        };
    }
    SkeletonParse::Parsed(plan)
}

/// Ask the oracle for the job's skeleton and persist whatever results.
#[instrument(skip_all, fields(job_id = %job.id))]
pub async fn extract_skeleton<O: Oracle>(
    oracle: &O,
    storage: &Storage,
    job: &Job,
    word_limit: usize,
) -> Result<Skeleton> {
    let document = head_words(&job.input_text, word_limit);
    let request = OracleRequest::new(
        SKELETON_SYSTEM,
        skeleton_prompt(document, &job.custom_instructions),
        SKELETON_MAX_OUTPUT_UNITS,
    );
    let raw = oracle.generate(&request).await?;

    let skeleton = match parse_skeleton(&raw) {
        SkeletonParse::Failed { reason } => {
            warn!(%reason, "skeleton unusable, falling back to default plan");
            Skeleton::Default
        }
        parsed => {
            let skeleton = parsed.into_skeleton();
            info!(sections = skeleton.plan().outline.len(), "skeleton extracted");
            skeleton
        }
    };

    storage.save_skeleton(&job.id, &skeleton).await?;
    Ok(skeleton)
}
