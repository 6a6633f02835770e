//! Prompt construction for every oracle call the pipeline makes.
//!
//! Prompts are plain strings assembled from the job's persisted state, so a
//! resumed job sends exactly what an uninterrupted one would have.

use std::fmt::Write as _;

use recast_shared::{Delta, LengthMode, SkeletonPlan};

use crate::context::RunningContext;

pub const SKELETON_MAX_OUTPUT_UNITS: u32 = 4096;
pub const STITCH_MAX_OUTPUT_UNITS: u32 = 4096;

/// Output bound for a chunk (and its retries): twice the word target, clamped.
pub fn chunk_max_output_units(target_words: u32) -> u32 {
    target_words.saturating_mul(2).clamp(1024, 16_384)
}

// ---------------------------------------------------------------------------
// Skeleton
// ---------------------------------------------------------------------------

pub const SKELETON_SYSTEM: &str = "You are a structural editor. You read a document and \
produce a plan for rewriting it. Respond with a single JSON object and nothing else.";

pub fn skeleton_prompt(document: &str, custom_instructions: &str) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Analyze the document below and return a JSON object with exactly these fields:");
    prompt.push_str(
        r#"{
  "outline": ["10 to 25 section descriptions, each building on the previous, none repeating another"],
  "thesis": "the document's central claim in one or two sentences",
  "keyTerms": {"term": "the definition the document relies on"},
  "commitmentLedger": {"asserts": [], "rejects": [], "assumes": []},
  "entities": ["people, works, organisations, places the document depends on"],
  "audienceParameters": "who the document is written for",
  "rigorLevel": "informal | moderate | rigorous"
}
"#,
    );
    push_instructions(&mut prompt, custom_instructions);
    let _ = write!(prompt, "\nDOCUMENT:\n{document}\n");
    prompt
}

// ---------------------------------------------------------------------------
// Chunks
// ---------------------------------------------------------------------------

pub const CHUNK_SYSTEM: &str = "You rewrite one section of a longer document so that it fits \
a shared plan. Stay consistent with the thesis, the key terms, and the commitments you are \
given. Reply in exactly two parts: a line containing [CONTENT] followed by the rewritten \
prose, then a line containing [DELTA] followed by one JSON object of the form \
{\"newClaims\": [], \"termsUsed\": [], \"conflictsDetected\": [], \"topicsCovered\": []}.";

/// Rewrite guidance injected into every chunk prompt of a job.
pub fn length_guidance(mode: LengthMode) -> &'static str {
    match mode {
        LengthMode::HeavyCompression => {
            "Compress aggressively. Keep only the central claims and the evidence they \
             cannot stand without. Drop examples, asides, and repetition."
        }
        LengthMode::ModerateCompression => {
            "Tighten the text. Merge overlapping points and trim secondary examples while \
             keeping every distinct argument."
        }
        LengthMode::Maintain => {
            "Keep roughly the original length. Improve clarity and flow without adding or \
             removing substance."
        }
        LengthMode::ModerateExpansion => {
            "Expand the text. Develop each point further with explanation, examples, and \
             connections to the rest of the argument."
        }
        LengthMode::HeavyExpansion => {
            "Expand substantially. Treat each point as a subsection: add context, worked \
             examples, counterarguments, and their resolution. Never pad or repeat."
        }
    }
}

/// Everything a chunk prompt is built from.
pub struct ChunkPrompt<'a> {
    pub plan: &'a SkeletonPlan,
    pub sections: &'a [String],
    pub context: &'a RunningContext,
    pub mode: LengthMode,
    pub custom_instructions: &'a str,
    pub chunk_index: u32,
    pub chunk_count: u32,
    pub target_words: u32,
    pub min_words: u32,
    pub max_words: u32,
    pub source: &'a str,
}

pub fn chunk_prompt(input: &ChunkPrompt<'_>) -> String {
    let mut prompt = String::new();
    push_plan(&mut prompt, input.plan);

    let _ = writeln!(
        prompt,
        "\nYou are writing part {} of {}.",
        input.chunk_index + 1,
        input.chunk_count
    );
    if input.sections.is_empty() {
        prompt.push_str("No outline sections are assigned to this part; continue the argument where the previous part left off.\n");
    } else {
        prompt.push_str("Sections this part must cover:\n");
        for section in input.sections {
            let _ = writeln!(prompt, "- {section}");
        }
    }

    if let Some(summary) = input.context.previous_summary() {
        let _ = write!(prompt, "\nThe previous part ended with:\n\"\"\"\n{summary}\n\"\"\"\n");
    }
    if !input.context.topics_covered().is_empty() {
        prompt.push_str("\nTopics already covered. Do NOT repeat these:\n");
        for topic in input.context.topics_covered() {
            let _ = writeln!(prompt, "- {topic}");
        }
    }

    let _ = write!(
        prompt,
        "\nLength: about {} words (at least {}, at most {}).\n{}\n",
        input.target_words,
        input.min_words,
        input.max_words,
        length_guidance(input.mode)
    );
    push_instructions(&mut prompt, input.custom_instructions);
    let _ = write!(prompt, "\nSOURCE TEXT FOR THIS PART:\n{}\n", input.source);
    prompt
}

/// Retry prompt that shows the oracle its own too-short output.
pub fn expansion_prompt(base: &ChunkPrompt<'_>, previous_output: &str, previous_words: u32) -> String {
    let mut prompt = chunk_prompt(base);
    let _ = write!(
        prompt,
        "\nYOUR PREVIOUS ATTEMPT was {previous_words} words, below the minimum of {}:\n\"\"\"\n{previous_output}\n\"\"\"\n\
         Rewrite it to at least {} words. Add substance: deeper explanation, concrete examples, \
         and implications of each claim. Do not pad, repeat sentences, or restate the outline.\n",
        base.min_words, base.target_words
    );
    prompt
}

// ---------------------------------------------------------------------------
// Stitch
// ---------------------------------------------------------------------------

pub const STITCH_SYSTEM: &str = "You audit a document that was written in parts. Report \
problems only; do not rewrite anything. Respond with a single JSON object and nothing else.";

/// One chunk as the stitcher presents it.
pub struct StitchPart<'a> {
    pub index: u32,
    pub summary: &'a str,
    pub delta: &'a Delta,
}

pub fn stitch_prompt(plan: &SkeletonPlan, parts: &[StitchPart<'_>]) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "THESIS: {}", plan.thesis);
    prompt.push_str("OUTLINE:\n");
    for (i, section) in plan.outline.iter().enumerate() {
        let _ = writeln!(prompt, "{}. {section}", i + 1);
    }

    prompt.push_str("\nPARTS:\n");
    for part in parts {
        let delta = serde_json::to_string(part.delta).unwrap_or_else(|_| "{}".to_string());
        let _ = write!(
            prompt,
            "--- Part {} ---\nSummary: {}\nDelta: {delta}\n",
            part.index + 1,
            part.summary
        );
    }

    prompt.push_str(
        "\nCompare the parts against each other and against the outline. Return:\n\
         {\"conflicts\": [], \"redundancies\": [], \"gaps\": [], \"terminologyDrift\": []}\n\
         conflicts: claims in one part contradicted by another. redundancies: points made \
         in more than one part. gaps: outline sections no part covered. terminologyDrift: \
         key terms used with shifting meanings.\n",
    );
    prompt
}

// ---------------------------------------------------------------------------
// Shared pieces
// ---------------------------------------------------------------------------

fn push_plan(prompt: &mut String, plan: &SkeletonPlan) {
    let _ = writeln!(prompt, "THESIS: {}", plan.thesis);
    if !plan.key_terms.is_empty() {
        prompt.push_str("KEY TERMS (use consistently):\n");
        for (term, meaning) in &plan.key_terms {
            let _ = writeln!(prompt, "- {term}: {meaning}");
        }
    }

    let ledger = &plan.commitment_ledger;
    for (label, items) in [
        ("The document ASSERTS", &ledger.asserts),
        ("The document REJECTS", &ledger.rejects),
        ("The document ASSUMES", &ledger.assumes),
    ] {
        if !items.is_empty() {
            let _ = writeln!(prompt, "{label}:");
            for item in items {
                let _ = writeln!(prompt, "- {item}");
            }
        }
    }

    if !plan.audience_parameters.is_empty() {
        let _ = writeln!(prompt, "AUDIENCE: {}", plan.audience_parameters);
    }
    if !plan.rigor_level.is_empty() {
        let _ = writeln!(prompt, "RIGOR: {}", plan.rigor_level);
    }
}

fn push_instructions(prompt: &mut String, custom_instructions: &str) {
    let instructions = custom_instructions.trim();
    if !instructions.is_empty() {
        let _ = write!(prompt, "\nADDITIONAL INSTRUCTIONS:\n{instructions}\n");
    }
}
