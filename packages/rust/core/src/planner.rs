//! Length planning: target word bounds, length mode, and chunk count.
//!
//! Everything here is computed once when a job is created and stored on the
//! job row; nothing downstream recomputes it.

use recast_shared::{LengthMode, LengthPlan, RecastError, Result};

/// Default words per segment, and divisor of the chunk count.
pub const DEFAULT_SEGMENT_WORDS: u32 = 500;

/// Classify a target/input ratio. Intervals are half-open on the right and
/// checked in ascending order.
pub fn classify_mode(ratio: f64) -> LengthMode {
    if ratio < 0.5 {
        LengthMode::HeavyCompression
    } else if ratio < 0.8 {
        LengthMode::ModerateCompression
    } else if ratio < 1.2 {
        LengthMode::Maintain
    } else if ratio < 1.8 {
        LengthMode::ModerateExpansion
    } else {
        LengthMode::HeavyExpansion
    }
}

/// `max(1, ceil(input_words / segment_words))`.
pub fn chunk_count(input_words: u32, segment_words: u32) -> u32 {
    input_words.div_ceil(segment_words.max(1)).max(1)
}

/// Build the job's length plan.
///
/// `requested_words` defaults to `input_words`, i.e. a same-length rewrite.
pub fn plan_length(
    input_words: u32,
    requested_words: Option<u32>,
    segment_words: u32,
) -> Result<LengthPlan> {
    if input_words == 0 {
        return Err(RecastError::validation("input document has no words"));
    }
    if requested_words == Some(0) {
        return Err(RecastError::validation("target word count must be positive"));
    }

    let mid = requested_words.unwrap_or(input_words);
    let mid64 = u64::from(mid);
    let target_min_words = (mid64 * 9 / 10) as u32;
    let target_max_words = u32::try_from((mid64 * 11).div_ceil(10))
        .map_err(|_| RecastError::validation(format!("target word count {mid} is too large")))?;

    let length_ratio = f64::from(mid) / f64::from(input_words);
    let chunk_count = chunk_count(input_words, segment_words);

    Ok(LengthPlan {
        total_input_words: input_words,
        target_min_words,
        target_mid_words: mid,
        target_max_words,
        length_ratio,
        length_mode: classify_mode(length_ratio),
        chunk_count,
        chunk_target_words: mid.div_ceil(chunk_count),
    })
}
