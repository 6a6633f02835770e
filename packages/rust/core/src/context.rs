//! Context carried from one chunk to the next.

use recast_shared::Delta;

use crate::segmenter::tail_words;

/// Words of the previous chunk's output carried forward as its summary.
pub const SUMMARY_WORDS: usize = 150;

/// Immutable per-step context; [`RunningContext::advance`] yields the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunningContext {
    previous_summary: Option<String>,
    topics_covered: Vec<String>,
}

impl RunningContext {
    /// Context after a chunk produced `output` and `delta`.
    ///
    /// Topics accumulate in first-seen order, compared case-insensitively.
    pub fn advance(&self, output: &str, delta: &Delta) -> Self {
        let mut topics_covered = self.topics_covered.clone();
        for topic in &delta.topics_covered {
            let topic = topic.trim();
            if topic.is_empty() {
                continue;
            }
            let seen = topics_covered.iter().any(|t| t.eq_ignore_ascii_case(topic));
            if !seen {
                topics_covered.push(topic.to_string());
            }
        }

        let summary = tail_words(output, SUMMARY_WORDS);
        Self {
            previous_summary: (!summary.is_empty()).then(|| summary.to_string()),
            topics_covered,
        }
    }

    pub fn previous_summary(&self) -> Option<&str> {
        self.previous_summary.as_deref()
    }

    pub fn topics_covered(&self) -> &[String] {
        &self.topics_covered
    }
}
