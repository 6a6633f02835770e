//! Sequential chunk generation with a bounded expansion-retry policy.

use recast_oracle::{Oracle, OracleRequest};
use recast_shared::{Chunk, ChunkStatus, Delta, Job, JobId, RecastError, Result, word_count};
use recast_storage::ChunkOutput;
use tracing::{debug, instrument, warn};

use crate::context::RunningContext;
use crate::pipeline::JobRun;
use crate::prompts::{CHUNK_SYSTEM, ChunkPrompt, chunk_max_output_units, chunk_prompt, expansion_prompt};
use crate::response::{ChunkResponse, DeltaOutcome, parse_chunk_response};
use crate::sections::assign_sections;

/// What a finished chunk hands to the next one.
#[derive(Debug)]
struct ChunkOutcome {
    text: String,
    words: u32,
    delta: Delta,
    under_target: bool,
}

/// Generate every chunk that is not yet `complete`, in index order.
///
/// Complete chunks are skipped but still folded into the running context, so
/// a resumed job builds the same prompts an uninterrupted one would.
#[instrument(skip_all, fields(job_id = %job.id, chunks = job.plan.chunk_count))]
pub(crate) async fn process_chunks<O: Oracle>(run: &JobRun<'_, O>, job: &Job) -> Result<()> {
    let skeleton = job
        .skeleton
        .as_ref()
        .ok_or_else(|| RecastError::Storage(format!("job {} reached chunk processing without a skeleton", job.id)))?;
    let plan = skeleton.plan();

    let chunks = run.storage.list_chunks(&job.id).await?;
    if chunks.len() != job.plan.chunk_count as usize {
        return Err(RecastError::Storage(format!(
            "job {} has {} chunks but planned {}",
            job.id,
            chunks.len(),
            job.plan.chunk_count
        )));
    }

    let sections = assign_sections(&plan.outline, job.plan.chunk_count);
    let mut context = RunningContext::default();
    let mut generated_any = false;

    for (chunk, sections) in chunks.iter().zip(&sections) {
        if chunk.status == ChunkStatus::Complete {
            debug!(index = chunk.index, "chunk already complete");
            let delta = chunk.delta.clone().unwrap_or_default();
            context = context.advance(chunk.output_text.as_deref().unwrap_or_default(), &delta);
            continue;
        }

        if generated_any {
            tokio::time::sleep(run.config.chunk_delay).await;
        }
        run.check_cancelled(&job.id, chunk.index)?;
        run.renew_claim(&job.id).await?;

        run.storage.set_current_chunk(&job.id, chunk.index).await?;
        run.progress.chunk_started(chunk.index, job.plan.chunk_count);

        let prompt = ChunkPrompt {
            plan,
            sections,
            context: &context,
            mode: job.plan.length_mode,
            custom_instructions: &job.custom_instructions,
            chunk_index: chunk.index,
            chunk_count: job.plan.chunk_count,
            target_words: chunk.bounds.target_words,
            min_words: chunk.bounds.min_words,
            max_words: chunk.bounds.max_words,
            source: &chunk.input_text,
        };

        let outcome = match process_chunk(run, &job.id, chunk, &prompt).await {
            Ok(outcome) => outcome,
            Err(e @ (RecastError::Cancelled { .. } | RecastError::JobClaimed { .. })) => return Err(e),
            Err(e) => {
                if let Err(write_err) = run.storage.fail_chunk(&chunk.id, &e.to_string()).await {
                    warn!(index = chunk.index, error = %write_err, "could not mark chunk failed");
                }
                return Err(e);
            }
        };

        run.progress
            .chunk_finished(chunk.index, outcome.words, outcome.under_target);
        context = context.advance(&outcome.text, &outcome.delta);
        generated_any = true;
    }

    Ok(())
}

/// One chunk: a first attempt plus up to `max_retries` expansion retries.
///
/// A retry only replaces the kept attempt when it is longer. Running out of
/// retries below the minimum is accepted and flagged, never an error.
#[instrument(skip_all, fields(index = chunk.index, min_words = chunk.bounds.min_words))]
async fn process_chunk<O: Oracle>(
    run: &JobRun<'_, O>,
    job_id: &JobId,
    chunk: &Chunk,
    prompt: &ChunkPrompt<'_>,
) -> Result<ChunkOutcome> {
    let max_units = chunk_max_output_units(chunk.bounds.target_words);
    let request = OracleRequest::new(CHUNK_SYSTEM, chunk_prompt(prompt), max_units);
    let mut best = parse_response(&run.oracle.generate(&request).await?);
    let mut best_words = word_count(&best.content);
    let mut retries = 0u32;

    while best_words < chunk.bounds.min_words && retries < run.config.max_retries {
        run.storage
            .record_chunk_attempt(
                &chunk.id,
                ChunkOutput {
                    text: &best.content,
                    words: best_words,
                    delta: &best.delta,
                    retry_count: retries,
                },
            )
            .await?;
        run.check_cancelled(job_id, chunk.index)?;
        tokio::time::sleep(run.config.retry_delay).await;
        run.renew_claim(job_id).await?;

        retries += 1;
        run.progress.chunk_retry(chunk.index, retries);
        debug!(attempt = retries, words = best_words, "below minimum, retrying with expansion prompt");

        let request = OracleRequest::new(
            CHUNK_SYSTEM,
            expansion_prompt(prompt, &best.content, best_words),
            max_units,
        );
        let candidate = parse_response(&run.oracle.generate(&request).await?);
        let words = word_count(&candidate.content);
        if words > best_words {
            best = candidate;
            best_words = words;
        } else {
            debug!(words, kept = best_words, "retry was not longer, keeping earlier attempt");
        }
    }

    let under_target = best_words < chunk.bounds.min_words;
    if under_target {
        warn!(words = best_words, retries, "chunk still under minimum after retries");
    }

    run.storage
        .complete_chunk(
            &chunk.id,
            ChunkOutput {
                text: &best.content,
                words: best_words,
                delta: &best.delta,
                retry_count: retries,
            },
            under_target,
        )
        .await?;

    Ok(ChunkOutcome {
        text: best.content,
        words: best_words,
        delta: best.delta,
        under_target,
    })
}

fn parse_response(raw: &str) -> ChunkResponse {
    let parsed = parse_chunk_response(raw);
    match &parsed.delta_outcome {
        DeltaOutcome::Parsed => {}
        DeltaOutcome::Missing => warn!("chunk response had no delta, using an empty one"),
        DeltaOutcome::Malformed(e) => warn!(error = %e, "chunk delta was malformed, using an empty one"),
    }
    parsed
}
