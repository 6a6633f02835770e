//! Core domain types for Recast reconstruction jobs.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{RecastError, Result};

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for job identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new time-sortable job identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a reconstruction job.
///
/// The only legal moves are one step forward along the chain, or re-entering
/// an in-progress state (a crash mid-step leaves the job there and resume
/// starts the step over).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    ExtractingSkeleton,
    SkeletonComplete,
    ChunksCreated,
    ProcessingChunks,
    ChunksComplete,
    Stitching,
    Complete,
}

impl JobStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ExtractingSkeleton => "extracting_skeleton",
            Self::SkeletonComplete => "skeleton_complete",
            Self::ChunksCreated => "chunks_created",
            Self::ProcessingChunks => "processing_chunks",
            Self::ChunksComplete => "chunks_complete",
            Self::Stitching => "stitching",
            Self::Complete => "complete",
        }
    }

    /// The state that follows this one, if any.
    pub fn successor(&self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::ExtractingSkeleton),
            Self::ExtractingSkeleton => Some(Self::SkeletonComplete),
            Self::SkeletonComplete => Some(Self::ChunksCreated),
            Self::ChunksCreated => Some(Self::ProcessingChunks),
            Self::ProcessingChunks => Some(Self::ChunksComplete),
            Self::ChunksComplete => Some(Self::Stitching),
            Self::Stitching => Some(Self::Complete),
            Self::Complete => None,
        }
    }

    /// States that represent a step underway rather than a step finished.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            Self::ExtractingSkeleton | Self::ProcessingChunks | Self::Stitching
        )
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        self.successor() == Some(next) || (*self == next && self.is_in_progress())
    }

    /// Validate a transition, returning the new state.
    pub fn transition(self, next: JobStatus) -> Result<JobStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(RecastError::InvalidTransition {
                from: self.as_str().into(),
                to: next.as_str().into(),
            })
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = RecastError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "pending" => Self::Pending,
            "extracting_skeleton" => Self::ExtractingSkeleton,
            "skeleton_complete" => Self::SkeletonComplete,
            "chunks_created" => Self::ChunksCreated,
            "processing_chunks" => Self::ProcessingChunks,
            "chunks_complete" => Self::ChunksComplete,
            "stitching" => Self::Stitching,
            "complete" => Self::Complete,
            other => return Err(RecastError::parse(format!("unknown job status '{other}'"))),
        })
    }
}

// ---------------------------------------------------------------------------
// ChunkStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Pending,
    Complete,
    Failed,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkStatus {
    type Err = RecastError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "pending" => Self::Pending,
            "complete" => Self::Complete,
            "failed" => Self::Failed,
            other => return Err(RecastError::parse(format!("unknown chunk status '{other}'"))),
        })
    }
}

// ---------------------------------------------------------------------------
// Length planning
// ---------------------------------------------------------------------------

/// Compression/expansion regime selected from the target/input ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthMode {
    HeavyCompression,
    ModerateCompression,
    Maintain,
    ModerateExpansion,
    HeavyExpansion,
}

impl LengthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HeavyCompression => "heavy_compression",
            Self::ModerateCompression => "moderate_compression",
            Self::Maintain => "maintain",
            Self::ModerateExpansion => "moderate_expansion",
            Self::HeavyExpansion => "heavy_expansion",
        }
    }
}

impl fmt::Display for LengthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LengthMode {
    type Err = RecastError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "heavy_compression" => Self::HeavyCompression,
            "moderate_compression" => Self::ModerateCompression,
            "maintain" => Self::Maintain,
            "moderate_expansion" => Self::ModerateExpansion,
            "heavy_expansion" => Self::HeavyExpansion,
            other => return Err(RecastError::parse(format!("unknown length mode '{other}'"))),
        })
    }
}

/// Planning fields derived once at job creation and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LengthPlan {
    pub total_input_words: u32,
    pub target_min_words: u32,
    pub target_mid_words: u32,
    pub target_max_words: u32,
    pub length_ratio: f64,
    pub length_mode: LengthMode,
    pub chunk_count: u32,
    pub chunk_target_words: u32,
}

/// Word bounds for one chunk: the per-chunk target with a ±20% band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkBounds {
    pub target_words: u32,
    pub min_words: u32,
    pub max_words: u32,
}

impl ChunkBounds {
    pub fn from_target(target_words: u32) -> Self {
        let t = u64::from(target_words);
        Self {
            target_words,
            min_words: (t * 4 / 5) as u32,
            max_words: (t * 6).div_ceil(5) as u32,
        }
    }
}

// ---------------------------------------------------------------------------
// Skeleton
// ---------------------------------------------------------------------------

/// Assertions, rejections, and background assumptions the whole document must honor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentLedger {
    #[serde(default, deserialize_with = "lenient_strings")]
    pub asserts: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub rejects: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub assumes: Vec<String>,
}

/// The structural plan shared by every chunk of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkeletonPlan {
    #[serde(default, deserialize_with = "lenient_strings")]
    pub outline: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub thesis: String,
    #[serde(default, deserialize_with = "lenient_map")]
    pub key_terms: BTreeMap<String, String>,
    #[serde(default)]
    pub commitment_ledger: CommitmentLedger,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub entities: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub audience_parameters: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub rigor_level: String,
}

static DEFAULT_SKELETON: LazyLock<SkeletonPlan> = LazyLock::new(|| SkeletonPlan {
    outline: vec![
        "Introduction: frame the central question and why it matters".into(),
        "Background: the context and key concepts the argument relies on".into(),
        "Core argument: the main claims and the evidence for them".into(),
        "Complications: objections, limits, and responses".into(),
        "Conclusion: synthesis and implications".into(),
    ],
    thesis: "The document develops and defends its central argument.".into(),
    key_terms: BTreeMap::new(),
    commitment_ledger: CommitmentLedger::default(),
    entities: Vec::new(),
    audience_parameters: "General educated readers".into(),
    rigor_level: "moderate".into(),
});

/// A job's skeleton: either the oracle's plan or the fixed safe default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "plan", rename_all = "snake_case")]
pub enum Skeleton {
    Extracted(SkeletonPlan),
    Default,
}

impl Skeleton {
    pub fn plan(&self) -> &SkeletonPlan {
        match self {
            Self::Extracted(plan) => plan,
            Self::Default => &DEFAULT_SKELETON,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

// ---------------------------------------------------------------------------
// Delta / stitch report
// ---------------------------------------------------------------------------

/// Per-chunk side-effect record, consumed only by the stitcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delta {
    #[serde(default, deserialize_with = "lenient_strings")]
    pub new_claims: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub terms_used: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub conflicts_detected: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub topics_covered: Vec<String>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.new_claims.is_empty()
            && self.terms_used.is_empty()
            && self.conflicts_detected.is_empty()
            && self.topics_covered.is_empty()
    }
}

/// Cross-chunk coherence report produced at stitch time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StitchReport {
    #[serde(default, deserialize_with = "lenient_strings")]
    pub conflicts: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub redundancies: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub gaps: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub terminology_drift: Vec<String>,
}

impl StitchReport {
    pub fn issue_count(&self) -> usize {
        self.conflicts.len() + self.redundancies.len() + self.gaps.len() + self.terminology_drift.len()
    }
}

// Oracle JSON is loosely typed: lists sometimes hold objects, strings sometimes
// arrive as numbers or null. Anything that is not a string is rendered as
// compact JSON instead of failing the whole document.

fn render_value(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<String, D::Error> {
    let value = serde_json::Value::deserialize(de)?;
    Ok(render_value(value).unwrap_or_default())
}

fn lenient_strings<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<Vec<String>, D::Error> {
    let value = serde_json::Value::deserialize(de)?;
    Ok(match value {
        serde_json::Value::Array(items) => items.into_iter().filter_map(render_value).collect(),
        other => render_value(other).into_iter().collect(),
    })
}

fn lenient_map<'de, D: Deserializer<'de>>(
    de: D,
) -> std::result::Result<BTreeMap<String, String>, D::Error> {
    let value = serde_json::Value::deserialize(de)?;
    Ok(match value {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| (k, render_value(v).unwrap_or_default()))
            .collect(),
        _ => BTreeMap::new(),
    })
}

// ---------------------------------------------------------------------------
// Job / Chunk records
// ---------------------------------------------------------------------------

/// One reconstruction request and its persisted lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner: String,
    pub input_text: String,
    pub custom_instructions: String,
    /// The caller's explicit target, if any (`None` means "same length").
    pub requested_words: Option<u32>,
    pub plan: LengthPlan,
    pub status: JobStatus,
    pub current_chunk: u32,
    pub skeleton: Option<Skeleton>,
    pub final_output: Option<String>,
    pub final_word_count: Option<u32>,
    pub stitch_report: Option<StitchReport>,
    pub under_target_chunks: Option<u32>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One word-bounded unit of a job's decomposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub job_id: JobId,
    pub index: u32,
    pub input_text: String,
    pub input_words: u32,
    pub bounds: ChunkBounds,
    pub output_text: Option<String>,
    pub actual_words: u32,
    pub delta: Option<Delta>,
    pub retry_count: u32,
    /// Set when the retry budget ran out below `bounds.min_words`.
    pub under_target: bool,
    pub status: ChunkStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input side of a chunk, as handed to storage at creation time.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub index: u32,
    pub input_text: String,
    pub input_words: u32,
    pub bounds: ChunkBounds,
}

/// Whitespace-token word count used everywhere a length is measured.
pub fn word_count(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_roundtrip() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().expect("parse JobId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn status_chain_only_moves_forward() {
        let mut status = JobStatus::Pending;
        let mut steps = 0;
        while let Some(next) = status.successor() {
            status = status.transition(next).expect("forward step");
            steps += 1;
        }
        assert_eq!(status, JobStatus::Complete);
        assert_eq!(steps, 7);

        assert!(JobStatus::Pending.transition(JobStatus::Complete).is_err());
        assert!(JobStatus::Stitching.transition(JobStatus::ProcessingChunks).is_err());
        assert!(JobStatus::Complete.transition(JobStatus::Complete).is_err());
    }

    #[test]
    fn in_progress_states_can_be_reentered() {
        assert!(JobStatus::ExtractingSkeleton.can_transition_to(JobStatus::ExtractingSkeleton));
        assert!(JobStatus::ProcessingChunks.can_transition_to(JobStatus::ProcessingChunks));
        assert!(JobStatus::Stitching.can_transition_to(JobStatus::Stitching));
        assert!(!JobStatus::SkeletonComplete.can_transition_to(JobStatus::SkeletonComplete));
    }

    #[test]
    fn status_strings_roundtrip() {
        let mut status = JobStatus::Pending;
        loop {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
            match status.successor() {
                Some(next) => status = next,
                None => break,
            }
        }
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn chunk_bounds_band() {
        let b = ChunkBounds::from_target(5000);
        assert_eq!(b.min_words, 4000);
        assert_eq!(b.max_words, 6000);

        let b = ChunkBounds::from_target(7);
        assert_eq!(b.min_words, 5); // floor(5.6)
        assert_eq!(b.max_words, 9); // ceil(8.4)
    }

    #[test]
    fn default_skeleton_has_five_sections() {
        let skeleton = Skeleton::Default;
        assert!(skeleton.is_default());
        assert_eq!(skeleton.plan().outline.len(), 5);
        assert!(!skeleton.plan().thesis.is_empty());
    }

    #[test]
    fn skeleton_serializes_with_kind_tag() {
        let json = serde_json::to_string(&Skeleton::Default).unwrap();
        assert_eq!(json, r#"{"kind":"default"}"#);

        let extracted = Skeleton::Extracted(SkeletonPlan {
            outline: vec!["one".into()],
            thesis: "t".into(),
            ..Default::default()
        });
        let json = serde_json::to_string(&extracted).unwrap();
        assert!(json.contains(r#""kind":"extracted""#));
        let back: Skeleton = serde_json::from_str(&json).unwrap();
        assert_eq!(back, extracted);
    }

    #[test]
    fn delta_accepts_loose_oracle_json() {
        let json = r#"{"newClaims":["a",{"claim":"b"}],"termsUsed":"virtue","topicsCovered":null}"#;
        let delta: Delta = serde_json::from_str(json).unwrap();
        assert_eq!(delta.new_claims, vec!["a".to_string(), r#"{"claim":"b"}"#.to_string()]);
        assert_eq!(delta.terms_used, vec!["virtue".to_string()]);
        assert!(delta.topics_covered.is_empty());
        assert!(delta.conflicts_detected.is_empty());
    }

    #[test]
    fn word_count_splits_on_any_whitespace() {
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("  one\ttwo\n\nthree  "), 3);
    }
}
