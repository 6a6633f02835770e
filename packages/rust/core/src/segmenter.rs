//! Splits a source document into word-bounded segments.
//!
//! Segmentation is line-based: lines accumulate into the running segment until
//! the next line would push it past the word budget. Paragraph breaks inside
//! a segment are kept as-is.
//!
//! The planner fixes the chunk count from the total word count, so after
//! segmenting, [`reconcile`] forces the physical segments to that count.

use recast_shared::{ChunkBounds, LengthPlan, NewChunk, word_count};

/// Split `text` into segments of at most `budget` words, except where a single
/// line alone exceeds the budget. Always returns at least one segment.
pub fn segment(text: &str, budget: u32) -> Vec<String> {
    let budget = budget.max(1);
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_words = 0u32;

    for line in text.lines() {
        let words = word_count(line);
        if current_words > 0 && current_words + words > budget {
            segments.push(current.trim().to_string());
            current.clear();
            current_words = 0;
        }
        current.push_str(line);
        current.push('\n');
        current_words += words;
    }

    if current_words > 0 {
        segments.push(current.trim().to_string());
    }
    if segments.is_empty() {
        segments.push(text.trim().to_string());
    }
    segments
}

/// Merge or split segments until there are exactly `count` of them.
///
/// Too many: merge the adjacent pair with the smallest combined word count.
/// Too few: split the longest segment at its word midpoint.
/// Word order is preserved and no word is dropped or duplicated.
pub fn reconcile(mut segments: Vec<String>, count: usize) -> Vec<String> {
    let count = count.max(1);
    segments.retain(|s| !s.trim().is_empty());
    if segments.is_empty() {
        return segments;
    }

    while segments.len() > count {
        let i = (0..segments.len() - 1)
            .min_by_key(|&i| word_count(&segments[i]) + word_count(&segments[i + 1]))
            .unwrap_or(0);
        let next = segments.remove(i + 1);
        let merged = format!("{}\n\n{}", segments[i], next);
        segments[i] = merged;
    }

    while segments.len() < count {
        let Some((i, words)) = segments
            .iter()
            .map(|s| word_count(s))
            .enumerate()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        else {
            break;
        };
        if words < 2 {
            break;
        }
        let (head, tail) = {
            let (h, t) = split_at_word(&segments[i], (words / 2) as usize);
            (h.to_string(), t.to_string())
        };
        segments[i] = head;
        segments.insert(i + 1, tail);
    }

    segments
}

/// Segment the job's input and build one [`NewChunk`] per planned chunk.
pub fn build_chunks(text: &str, plan: &LengthPlan, budget: u32) -> Vec<NewChunk> {
    let segments = reconcile(segment(text, budget), plan.chunk_count as usize);
    if segments.len() != plan.chunk_count as usize {
        tracing::warn!(
            planned = plan.chunk_count,
            actual = segments.len(),
            "segment count differs from plan"
        );
    }
    let bounds = ChunkBounds::from_target(plan.chunk_target_words);

    segments
        .into_iter()
        .enumerate()
        .map(|(index, input_text)| NewChunk {
            index: index as u32,
            input_words: word_count(&input_text),
            input_text,
            bounds,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Word-position helpers
// ---------------------------------------------------------------------------

/// Byte offsets where each whitespace-delimited word starts.
fn word_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut in_word = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            in_word = false;
        } else if !in_word {
            starts.push(i);
            in_word = true;
        }
    }
    starts
}

/// Split before word number `n` (zero-based), trimming both halves.
pub(crate) fn split_at_word(text: &str, n: usize) -> (&str, &str) {
    match word_starts(text).get(n) {
        Some(&at) => (text[..at].trim(), text[at..].trim()),
        None => (text.trim(), ""),
    }
}

/// The first `n` words of `text`, with original spacing.
pub(crate) fn head_words(text: &str, n: usize) -> &str {
    split_at_word(text, n).0
}

/// The last `n` words of `text`, with original spacing.
pub(crate) fn tail_words(text: &str, n: usize) -> &str {
    let starts = word_starts(text);
    if starts.len() <= n {
        return text.trim();
    }
    text[starts[starts.len() - n]..].trim()
}
