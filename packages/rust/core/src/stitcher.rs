//! Final assembly and the cross-chunk coherence report.

use recast_oracle::{Oracle, OracleRequest};
use recast_shared::{Chunk, ChunkStatus, Delta, Job, RecastError, Result, StitchReport, word_count};
use recast_storage::FinalOutput;
use tracing::{info, instrument};

use crate::pipeline::JobRun;
use crate::prompts::{STITCH_MAX_OUTPUT_UNITS, STITCH_SYSTEM, StitchPart, stitch_prompt};
use crate::response::parse_stitch_report;
use crate::segmenter::head_words;

/// Words of each chunk shown to the oracle when asking for the report.
const PART_SUMMARY_WORDS: usize = 80;

/// Join chunk outputs in index order with blank-line separators.
pub fn assemble(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .filter_map(|c| c.output_text.as_deref())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Assemble the final document, request the coherence report, and complete the job.
#[instrument(skip_all, fields(job_id = %job.id))]
pub(crate) async fn stitch<O: Oracle>(run: &JobRun<'_, O>, job: &Job) -> Result<()> {
    let chunks = run.storage.list_chunks(&job.id).await?;
    if let Some(chunk) = chunks.iter().find(|c| c.status != ChunkStatus::Complete) {
        return Err(RecastError::validation(format!(
            "cannot stitch job {}: chunk {} is {}",
            job.id, chunk.index, chunk.status
        )));
    }

    let final_text = assemble(&chunks);
    let final_words = word_count(&final_text);
    let under_target = chunks.iter().filter(|c| c.under_target).count() as u32;

    let report = request_report(run, job, &chunks).await?;

    run.storage
        .finish_job(
            &job.id,
            FinalOutput {
                text: &final_text,
                word_count: final_words,
                report: report.as_ref(),
                under_target_chunks: under_target,
            },
        )
        .await?;

    info!(
        words = final_words,
        target = job.plan.target_mid_words,
        under_target,
        issues = report.as_ref().map_or(0, StitchReport::issue_count),
        "job stitched"
    );
    Ok(())
}

async fn request_report<O: Oracle>(
    run: &JobRun<'_, O>,
    job: &Job,
    chunks: &[Chunk],
) -> Result<Option<StitchReport>> {
    let plan = job.skeleton.as_ref().map(|s| s.plan().clone()).unwrap_or_default();
    let empty = Delta::default();
    let parts: Vec<StitchPart<'_>> = chunks
        .iter()
        .map(|c| StitchPart {
            index: c.index,
            summary: head_words(c.output_text.as_deref().unwrap_or_default(), PART_SUMMARY_WORDS),
            delta: c.delta.as_ref().unwrap_or(&empty),
        })
        .collect();

    let request = OracleRequest::new(
        STITCH_SYSTEM,
        stitch_prompt(&plan, &parts),
        STITCH_MAX_OUTPUT_UNITS,
    );
    let raw = run.oracle.generate(&request).await?;
    Ok(parse_stitch_report(&raw))
}
