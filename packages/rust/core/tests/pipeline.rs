//! End-to-end pipeline tests against a scripted oracle and a temp database.

use std::path::PathBuf;
use std::time::Duration;

use recast_core::prompts::{CHUNK_SYSTEM, SKELETON_SYSTEM, STITCH_SYSTEM};
use recast_core::segmenter::build_chunks;
use recast_core::{
    CancellationToken, JobOutcome, JobRequest, Orchestrator, ProgressReporter, SilentProgress,
};
use recast_oracle::{OracleRequest, ScriptedOracle};
use recast_shared::{
    ChunkStatus, Delta, JobId, JobStatus, LengthMode, PipelineConfig, RecastError, Skeleton,
    word_count,
};
use recast_storage::{ChunkOutput, Storage};
use uuid::Uuid;

const SKELETON_JSON: &str = r#"{
  "outline": ["Origins", "Mechanism", "Evidence", "Objections"],
  "thesis": "The mechanism explains the evidence.",
  "keyTerms": {"mechanism": "the causal process under discussion"},
  "commitmentLedger": {"asserts": ["the mechanism is real"], "rejects": [], "assumes": []},
  "entities": [],
  "audienceParameters": "students",
  "rigorLevel": "moderate"
}"#;

const REPORT_JSON: &str = r#"{"conflicts": ["part 1 and 2 disagree on dates"], "redundancies": [], "gaps": [], "terminologyDrift": []}"#;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn temp_db() -> PathBuf {
    std::env::temp_dir().join(format!("recast_test_{}.db", Uuid::now_v7()))
}

async fn orchestrator(path: &PathBuf, oracle: ScriptedOracle) -> Orchestrator<ScriptedOracle> {
    let storage = Storage::open(path).await.expect("open storage");
    Orchestrator::new(storage, oracle, PipelineConfig::without_delays())
}

/// `paragraphs` single-line paragraphs of `words_each` words, blank-line separated.
fn document(paragraphs: usize, words_each: usize) -> String {
    (0..paragraphs)
        .map(|p| {
            (0..words_each)
                .map(|w| format!("p{p}w{w}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn chunk_reply(words: usize, topic: &str) -> String {
    let body = (0..words).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
    format!("[CONTENT]\n{body}\n[DELTA]\n{{\"newClaims\": [], \"topicsCovered\": [\"{topic}\"]}}")
}

/// Oracle that answers every call by kind, with fixed-length chunk output.
fn responder(chunk_words: usize) -> ScriptedOracle {
    ScriptedOracle::with_responder(move |req: &OracleRequest| {
        Ok(if req.system == SKELETON_SYSTEM {
            SKELETON_JSON.to_string()
        } else if req.system == CHUNK_SYSTEM {
            chunk_reply(chunk_words, "general")
        } else {
            REPORT_JSON.to_string()
        })
    })
}

fn request(text: String, target_words: Option<u32>) -> JobRequest {
    JobRequest {
        input_text: text,
        custom_instructions: String::new(),
        target_words,
        owner: "tester".into(),
    }
}

fn calls_with_system(oracle: &ScriptedOracle, system: &str) -> Vec<OracleRequest> {
    oracle
        .calls()
        .into_iter()
        .filter(|c| c.system == system)
        .collect()
}

/// Persist each transition in `path`, in order.
async fn walk(storage: &Storage, job_id: &JobId, path: &[JobStatus]) {
    for pair in path.windows(2) {
        storage
            .transition_job(job_id, pair[0], pair[1])
            .await
            .expect("transition");
    }
}

/// Cancels the token once chunk `index` is finished.
struct CancelAfter {
    index: u32,
    token: CancellationToken,
}

impl ProgressReporter for CancelAfter {
    fn phase(&self, _name: &str) {}
    fn chunk_started(&self, _index: u32, _total: u32) {}
    fn chunk_retry(&self, _index: u32, _attempt: u32) {}
    fn chunk_finished(&self, index: u32, _words: u32, _under_target: bool) {
        if index == self.index {
            self.token.cancel();
        }
    }
    fn done(&self, _outcome: &JobOutcome) {}
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn same_length_rewrite_of_1000_words() {
    let path = temp_db();
    let orch = orchestrator(&path, responder(500)).await;

    let outcome = orch
        .run(&request(document(20, 50), None), &SilentProgress, &CancellationToken::new())
        .await
        .expect("run");

    assert_eq!(outcome.length_mode, LengthMode::Maintain);
    assert_eq!(outcome.chunk_count, 2);
    assert_eq!(outcome.target_mid_words, 1000);
    assert_eq!(outcome.final_word_count, 1000);
    assert_eq!(outcome.under_target_chunks, 0);
    assert!(!outcome.default_skeleton);
    assert_eq!(outcome.stitch_report.as_ref().map(|r| r.conflicts.len()), Some(1));

    let job = orch.storage().require_job(&outcome.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(job.plan.chunk_target_words, 500);
    assert_eq!(job.plan.length_ratio, 1.0);

    let chunks = orch.storage().list_chunks(&outcome.job_id).await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|c| c.status == ChunkStatus::Complete));
    let sum: u32 = chunks.iter().map(|c| c.actual_words).sum();
    assert_eq!(sum, outcome.final_word_count);
    assert_eq!(word_count(&outcome.final_output), sum);

    // skeleton + 2 chunks + stitch report
    assert_eq!(orch.oracle().call_count(), 4);
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn heavy_expansion_stops_after_three_retries() {
    let path = temp_db();
    let orch = orchestrator(&path, responder(100)).await;

    let outcome = orch
        .run(&request(document(10, 50), Some(5000)), &SilentProgress, &CancellationToken::new())
        .await
        .expect("run");

    assert_eq!(outcome.length_mode, LengthMode::HeavyExpansion);
    assert_eq!(outcome.chunk_count, 1);
    assert_eq!(outcome.under_target_chunks, 1);

    let chunks = orch.storage().list_chunks(&outcome.job_id).await.unwrap();
    let chunk = &chunks[0];
    assert_eq!(chunk.bounds.min_words, 4000);
    assert_eq!(chunk.status, ChunkStatus::Complete);
    assert_eq!(chunk.retry_count, 3);
    assert!(chunk.under_target);
    assert_eq!(chunk.actual_words, 100);

    let chunk_calls = calls_with_system(orch.oracle(), CHUNK_SYSTEM);
    assert_eq!(chunk_calls.len(), 4);
    assert!(!chunk_calls[0].user.contains("YOUR PREVIOUS ATTEMPT"));
    assert!(chunk_calls[1..].iter().all(|c| c.user.contains("YOUR PREVIOUS ATTEMPT")));
    assert!(chunk_calls.iter().all(|c| c.max_output_units == 10_000));
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn retry_stops_once_minimum_is_reached() {
    let path = temp_db();
    let oracle = ScriptedOracle::new();
    oracle
        .push_text(SKELETON_JSON)
        .push_text(chunk_reply(100, "a"))
        .push_text(chunk_reply(4200, "a"))
        .push_text(REPORT_JSON);
    let orch = orchestrator(&path, oracle).await;

    let outcome = orch
        .run(&request(document(10, 50), Some(5000)), &SilentProgress, &CancellationToken::new())
        .await
        .expect("run");

    let chunks = orch.storage().list_chunks(&outcome.job_id).await.unwrap();
    assert_eq!(chunks[0].retry_count, 1);
    assert_eq!(chunks[0].actual_words, 4200);
    assert!(!chunks[0].under_target);
    assert_eq!(outcome.under_target_chunks, 0);
    assert_eq!(orch.oracle().call_count(), 4);
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn shorter_retry_never_replaces_longer_attempt() {
    let path = temp_db();
    let oracle = ScriptedOracle::new();
    oracle
        .push_text(SKELETON_JSON)
        .push_text(chunk_reply(300, "a"))
        .push_text(chunk_reply(200, "a"))
        .push_text(chunk_reply(250, "a"))
        .push_text(chunk_reply(100, "a"))
        .push_text(REPORT_JSON);
    let orch = orchestrator(&path, oracle).await;

    let outcome = orch
        .run(&request(document(10, 50), Some(5000)), &SilentProgress, &CancellationToken::new())
        .await
        .expect("run");

    let chunks = orch.storage().list_chunks(&outcome.job_id).await.unwrap();
    assert_eq!(chunks[0].actual_words, 300);
    assert_eq!(chunks[0].retry_count, 3);
    assert_eq!(outcome.final_word_count, 300);
    let _ = std::fs::remove_file(&path);
}

// ---------------------------------------------------------------------------
// Resume
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resume_of_complete_job_changes_nothing() {
    let path = temp_db();
    let orch = orchestrator(&path, responder(500)).await;
    let first = orch
        .run(&request(document(20, 50), None), &SilentProgress, &CancellationToken::new())
        .await
        .expect("run");

    let job_before = orch.storage().require_job(&first.job_id).await.unwrap();
    let chunks_before = orch.storage().list_chunks(&first.job_id).await.unwrap();
    let calls_before = orch.oracle().call_count();

    let again = orch
        .resume(&first.job_id, &SilentProgress, &CancellationToken::new())
        .await
        .expect("resume");

    assert_eq!(again.final_output, first.final_output);
    assert_eq!(again.final_word_count, first.final_word_count);
    assert_eq!(orch.oracle().call_count(), calls_before);

    let job_after = orch.storage().require_job(&first.job_id).await.unwrap();
    let chunks_after = orch.storage().list_chunks(&first.job_id).await.unwrap();
    assert_eq!(
        serde_json::to_value(&job_before).unwrap(),
        serde_json::to_value(&job_after).unwrap()
    );
    assert_eq!(
        serde_json::to_value(&chunks_before).unwrap(),
        serde_json::to_value(&chunks_after).unwrap()
    );
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn oracle_failure_leaves_resumable_progress() {
    let path = temp_db();
    let oracle = ScriptedOracle::new();
    oracle
        .push_text(SKELETON_JSON)
        .push_text(chunk_reply(500, "origins"))
        .push_text(chunk_reply(500, "mechanism"))
        .push_failure("service unavailable");
    let orch = orchestrator(&path, oracle).await;

    let err = orch
        .run(&request(document(30, 50), None), &SilentProgress, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RecastError::Oracle(_)));

    let jobs = orch.storage().list_jobs().await.unwrap();
    let job_id: JobId = jobs[0].id.parse().unwrap();
    let job = orch.storage().require_job(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::ProcessingChunks);
    assert_eq!(job.current_chunk, 2);
    assert!(job.last_error.as_deref().unwrap_or_default().contains("service unavailable"));

    let chunks = orch.storage().list_chunks(&job_id).await.unwrap();
    let statuses: Vec<_> = chunks.iter().map(|c| c.status).collect();
    assert_eq!(
        statuses,
        vec![ChunkStatus::Complete, ChunkStatus::Complete, ChunkStatus::Failed]
    );
    assert!(chunks[2].error_message.is_some());
    drop(orch);

    let orch = orchestrator(&path, responder(500)).await;
    let outcome = orch
        .resume(&job_id, &SilentProgress, &CancellationToken::new())
        .await
        .expect("resume");

    let calls = orch.oracle().calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].system, CHUNK_SYSTEM);
    assert!(calls[0].user.contains("part 3 of 3"));
    assert!(calls[0].user.contains("- origins"));
    assert!(calls[0].user.contains("- mechanism"));
    assert_eq!(calls[1].system, STITCH_SYSTEM);

    assert_eq!(outcome.final_word_count, 1500);
    let job = orch.storage().require_job(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert!(job.last_error.is_none());
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn cancellation_stops_before_next_chunk() {
    let path = temp_db();
    let orch = orchestrator(&path, responder(500)).await;
    let token = CancellationToken::new();
    let progress = CancelAfter {
        index: 1,
        token: token.clone(),
    };

    let err = orch
        .run(&request(document(30, 50), None), &progress, &token)
        .await
        .unwrap_err();
    let (job_id, next_chunk) = match err {
        RecastError::Cancelled { job_id, next_chunk } => (job_id, next_chunk),
        other => panic!("expected cancellation, got {other}"),
    };
    assert_eq!(next_chunk, 2);
    assert_eq!(orch.oracle().call_count(), 3);

    let job_id: JobId = job_id.parse().unwrap();
    let job = orch.storage().require_job(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::ProcessingChunks);
    assert!(job.last_error.is_none());
    let chunks = orch.storage().list_chunks(&job_id).await.unwrap();
    let statuses: Vec<_> = chunks.iter().map(|c| c.status).collect();
    assert_eq!(
        statuses,
        vec![ChunkStatus::Complete, ChunkStatus::Complete, ChunkStatus::Pending]
    );
    drop(orch);

    // A different worker can pick it up, so the claim was released.
    let orch = orchestrator(&path, responder(500))
        .await
        .with_worker_id("second-worker");
    let outcome = orch
        .resume(&job_id, &SilentProgress, &CancellationToken::new())
        .await
        .expect("resume");

    let chunk_calls = calls_with_system(orch.oracle(), CHUNK_SYSTEM);
    assert_eq!(chunk_calls.len(), 1);
    assert!(chunk_calls[0].user.contains("part 3 of 3"));
    assert_eq!(orch.oracle().call_count(), 2);
    assert_eq!(outcome.final_word_count, 1500);
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn claimed_job_is_rejected() {
    let path = temp_db();
    let orch = orchestrator(&path, responder(500)).await;
    let job = orch
        .create_job(&request(document(20, 50), None))
        .await
        .expect("create");
    orch.storage()
        .claim_job(&job.id, "someone-else", Duration::from_secs(900))
        .await
        .expect("foreign claim");

    let err = orch
        .resume(&job.id, &SilentProgress, &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        RecastError::JobClaimed { owner, .. } => assert_eq!(owner, "someone-else"),
        other => panic!("expected JobClaimed, got {other}"),
    }
    assert_eq!(orch.oracle().call_count(), 0);
    let job = orch.storage().require_job(&job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn lapsed_claim_taken_over_stops_the_run() {
    let path = temp_db();
    let storage = Storage::open(&path).await.expect("open storage");
    let config = PipelineConfig {
        chunk_delay: Duration::from_millis(800),
        claim_lease: Duration::from_millis(50),
        ..PipelineConfig::without_delays()
    };
    let orch = Orchestrator::new(storage, responder(500), config).with_worker_id("worker-a");
    let job = orch
        .create_job(&request(document(30, 50), None))
        .await
        .expect("create");
    let rival = Storage::open(&path).await.expect("open rival storage");

    // Worker A finishes chunk 0 and sleeps past its lease; B takes over meanwhile.
    let cancel = CancellationToken::new();
    let (a_result, b_result) = tokio::join!(
        orch.resume(&job.id, &SilentProgress, &cancel),
        async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            rival
                .claim_job(&job.id, "worker-b", Duration::from_secs(900))
                .await
        }
    );

    b_result.expect("lapsed lease is taken over");
    match a_result.unwrap_err() {
        RecastError::JobClaimed { owner, .. } => assert_eq!(owner, "worker-b"),
        other => panic!("expected JobClaimed, got {other}"),
    }
    assert_eq!(calls_with_system(orch.oracle(), CHUNK_SYSTEM).len(), 1);

    let job = orch.storage().require_job(&job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::ProcessingChunks);
    assert!(job.last_error.is_none());
    let statuses: Vec<_> = orch
        .storage()
        .list_chunks(&job.id)
        .await
        .unwrap()
        .iter()
        .map(|c| c.status)
        .collect();
    assert_eq!(
        statuses,
        vec![ChunkStatus::Complete, ChunkStatus::Pending, ChunkStatus::Pending]
    );
    // B still holds the job.
    assert!(
        orch.storage()
            .claim_job(&job.id, "worker-a", Duration::from_secs(60))
            .await
            .is_err()
    );
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn resume_of_unknown_job_is_not_found() {
    let path = temp_db();
    let orch = orchestrator(&path, responder(500)).await;
    let err = orch
        .resume(&JobId::new(), &SilentProgress, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RecastError::JobNotFound { .. }));
    let _ = std::fs::remove_file(&path);
}

// ---------------------------------------------------------------------------
// Resuming from each persisted state
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resume_of_pending_job_extracts_skeleton_then_chunks() {
    let path = temp_db();
    let orch = orchestrator(&path, responder(500)).await;
    let job = orch
        .create_job(&request(document(20, 50), None))
        .await
        .expect("create");
    assert!(orch.storage().list_chunks(&job.id).await.unwrap().is_empty());

    let outcome = orch
        .resume(&job.id, &SilentProgress, &CancellationToken::new())
        .await
        .expect("resume");

    assert_eq!(calls_with_system(orch.oracle(), SKELETON_SYSTEM).len(), 1);
    assert_eq!(calls_with_system(orch.oracle(), CHUNK_SYSTEM).len(), 2);
    assert_eq!(orch.storage().list_chunks(&job.id).await.unwrap().len(), 2);
    assert!(!outcome.default_skeleton);
    assert_eq!(outcome.final_word_count, 1000);
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn resume_of_interrupted_skeleton_extraction() {
    let path = temp_db();
    let orch = orchestrator(&path, responder(500)).await;
    let job = orch
        .create_job(&request(document(20, 50), None))
        .await
        .expect("create");
    walk(
        orch.storage(),
        &job.id,
        &[JobStatus::Pending, JobStatus::ExtractingSkeleton],
    )
    .await;

    orch.resume(&job.id, &SilentProgress, &CancellationToken::new())
        .await
        .expect("resume");

    assert_eq!(calls_with_system(orch.oracle(), SKELETON_SYSTEM).len(), 1);
    let job = orch.storage().require_job(&job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert!(matches!(job.skeleton, Some(Skeleton::Extracted(_))));
    assert_eq!(orch.storage().list_chunks(&job.id).await.unwrap().len(), 2);
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn resume_after_chunks_inserted_does_not_duplicate_them() {
    let path = temp_db();
    let orch = orchestrator(&path, responder(500)).await;
    let job = orch
        .create_job(&request(document(20, 50), None))
        .await
        .expect("create");
    walk(
        orch.storage(),
        &job.id,
        &[JobStatus::Pending, JobStatus::ExtractingSkeleton],
    )
    .await;
    orch.storage()
        .save_skeleton(&job.id, &Skeleton::Default)
        .await
        .unwrap();
    walk(
        orch.storage(),
        &job.id,
        &[JobStatus::ExtractingSkeleton, JobStatus::SkeletonComplete],
    )
    .await;
    let segment_words = PipelineConfig::without_delays().segment_words;
    let chunks = build_chunks(&job.input_text, &job.plan, segment_words);
    assert_eq!(orch.storage().insert_chunks(&job.id, &chunks).await.unwrap(), 2);

    let outcome = orch
        .resume(&job.id, &SilentProgress, &CancellationToken::new())
        .await
        .expect("resume");

    assert!(calls_with_system(orch.oracle(), SKELETON_SYSTEM).is_empty());
    assert_eq!(calls_with_system(orch.oracle(), CHUNK_SYSTEM).len(), 2);
    let indices: Vec<_> = orch
        .storage()
        .list_chunks(&job.id)
        .await
        .unwrap()
        .iter()
        .map(|c| c.index)
        .collect();
    assert_eq!(indices, vec![0, 1]);
    assert!(outcome.default_skeleton);
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn resume_of_interrupted_stitch_makes_no_chunk_calls() {
    let path = temp_db();
    let orch = orchestrator(&path, responder(500)).await;
    let job = orch
        .create_job(&request(document(20, 50), None))
        .await
        .expect("create");
    let storage = orch.storage();
    walk(
        storage,
        &job.id,
        &[JobStatus::Pending, JobStatus::ExtractingSkeleton],
    )
    .await;
    storage.save_skeleton(&job.id, &Skeleton::Default).await.unwrap();
    walk(
        storage,
        &job.id,
        &[
            JobStatus::ExtractingSkeleton,
            JobStatus::SkeletonComplete,
            JobStatus::ChunksCreated,
            JobStatus::ProcessingChunks,
        ],
    )
    .await;
    let segment_words = PipelineConfig::without_delays().segment_words;
    storage
        .insert_chunks(&job.id, &build_chunks(&job.input_text, &job.plan, segment_words))
        .await
        .unwrap();
    let body = (0..500).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
    let delta = Delta::default();
    for chunk in storage.list_chunks(&job.id).await.unwrap() {
        storage
            .complete_chunk(
                &chunk.id,
                ChunkOutput {
                    text: &body,
                    words: 500,
                    delta: &delta,
                    retry_count: 0,
                },
                false,
            )
            .await
            .unwrap();
    }
    walk(
        storage,
        &job.id,
        &[
            JobStatus::ProcessingChunks,
            JobStatus::ChunksComplete,
            JobStatus::Stitching,
        ],
    )
    .await;

    let outcome = orch
        .resume(&job.id, &SilentProgress, &CancellationToken::new())
        .await
        .expect("resume");

    assert!(calls_with_system(orch.oracle(), CHUNK_SYSTEM).is_empty());
    assert_eq!(calls_with_system(orch.oracle(), STITCH_SYSTEM).len(), 1);
    assert_eq!(orch.oracle().call_count(), 1);
    assert_eq!(outcome.final_word_count, 1000);
    let job = orch.storage().require_job(&job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    let _ = std::fs::remove_file(&path);
}

// ---------------------------------------------------------------------------
// Degraded oracle output
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unusable_skeleton_falls_back_to_default() {
    let path = temp_db();
    let oracle = ScriptedOracle::with_responder(|req: &OracleRequest| {
        Ok(if req.system == SKELETON_SYSTEM {
            "I would rather describe the plan in prose.".to_string()
        } else if req.system == CHUNK_SYSTEM {
            chunk_reply(500, "general")
        } else {
            "Everything looks consistent to me.".to_string()
        })
    });
    let orch = orchestrator(&path, oracle).await;

    let outcome = orch
        .run(&request(document(20, 50), None), &SilentProgress, &CancellationToken::new())
        .await
        .expect("run");

    assert!(outcome.default_skeleton);
    assert!(outcome.stitch_report.is_none());
    let job = orch.storage().require_job(&outcome.job_id).await.unwrap();
    assert_eq!(job.skeleton, Some(Skeleton::Default));
    assert_eq!(job.status, JobStatus::Complete);

    let first_section = &Skeleton::Default.plan().outline[0];
    let chunk_calls = calls_with_system(orch.oracle(), CHUNK_SYSTEM);
    assert!(chunk_calls[0].user.contains(first_section.as_str()));
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn markerless_chunk_output_is_used_whole() {
    let path = temp_db();
    let oracle = ScriptedOracle::new();
    let prose = (0..450).map(|i| format!("x{i}")).collect::<Vec<_>>().join(" ");
    oracle
        .push_text(SKELETON_JSON)
        .push_text(prose.clone())
        .push_text(REPORT_JSON);
    let orch = orchestrator(&path, oracle).await;

    let outcome = orch
        .run(&request(document(10, 50), None), &SilentProgress, &CancellationToken::new())
        .await
        .expect("run");

    assert_eq!(outcome.final_output, prose);
    let chunks = orch.storage().list_chunks(&outcome.job_id).await.unwrap();
    assert_eq!(chunks[0].delta.as_ref().map(|d| d.is_empty()), Some(true));
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn unparseable_stitch_report_still_completes() {
    let path = temp_db();
    let oracle = ScriptedOracle::new();
    oracle
        .push_text(SKELETON_JSON)
        .push_text(chunk_reply(480, "origins"))
        .push_text("no report today");
    let orch = orchestrator(&path, oracle).await;

    let outcome = orch
        .run(&request(document(10, 50), None), &SilentProgress, &CancellationToken::new())
        .await
        .expect("run");

    assert!(outcome.stitch_report.is_none());
    assert_eq!(outcome.final_word_count, 480);
    let job = orch.storage().require_job(&outcome.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert!(job.stitch_report.is_none());
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn empty_document_is_rejected() {
    let path = temp_db();
    let orch = orchestrator(&path, responder(500)).await;
    let err = orch
        .run(&request("  \n\n ".into(), None), &SilentProgress, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RecastError::Validation { .. }));
    assert!(orch.storage().list_jobs().await.unwrap().is_empty());
    assert_eq!(orch.oracle().call_count(), 0);
    let _ = std::fs::remove_file(&path);
}
