//! End-to-end orchestrator flow tests against in-memory collaborators.
//!
//! These exercise the full accept -> reserve -> attempt -> settle path,
//! including fallback ordering, terminal short-circuits, exhaustion and
//! both operating modes. Provider behavior is scripted per test.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use chrono::{DateTime, Utc};
use gentask_ledger::{
    CreditLedger, InMemoryLedger, InMemoryTaskStore, LedgerError, LedgerResult, TaskStore,
};
use gentask_models::{
    FailureClass, GenerationKind, GenerationSpec, ImageSource, ReservationState, TaskId,
    TaskRecord, TaskState,
};
use gentask_orchestrator::{FallbackChains, Orchestrator, OrchestratorConfig, OrchestratorError};
use gentask_provider::{
    GenerationProvider, JobHandle, MediaUploader, PollStatus, ProviderError, ProviderResult,
    UploadError, UploadResult,
};

// ============================================================================
// Scripted collaborators
// ============================================================================

enum Script {
    /// Submit succeeds; report Running for `running_polls` polls, then
    /// Succeeded with `url` (and keep reporting it, like a real provider).
    SucceedAfter { running_polls: u32, url: &'static str },
    /// Submit fails with a terminal rejection.
    RejectOnSubmit(&'static str),
    /// Submit fails transiently.
    UnavailableOnSubmit(&'static str),
    /// Submit succeeds; the first poll reports a terminal failure.
    FailOnPoll {
        class: FailureClass,
        reason: &'static str,
    },
    /// First `fail_submits` submissions fail transiently, then succeed.
    FlakyThenSucceed { fail_submits: u32, url: &'static str },
}

struct StubProvider {
    name: &'static str,
    kinds: Vec<GenerationKind>,
    script: Script,
    submits: AtomicU32,
    polls: AtomicU32,
}

impl StubProvider {
    fn video(name: &'static str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            name,
            kinds: vec![GenerationKind::Video],
            script,
            submits: AtomicU32::new(0),
            polls: AtomicU32::new(0),
        })
    }

    fn submits(&self) -> u32 {
        self.submits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for StubProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn supports(&self, kind: GenerationKind) -> bool {
        self.kinds.contains(&kind)
    }

    async fn submit(&self, _spec: &GenerationSpec) -> ProviderResult<JobHandle> {
        let submit = self.submits.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::RejectOnSubmit(reason) => Err(ProviderError::rejected(*reason)),
            Script::UnavailableOnSubmit(reason) => Err(ProviderError::unavailable(*reason)),
            Script::FlakyThenSucceed { fail_submits, .. } if submit < *fail_submits => {
                Err(ProviderError::unavailable("connection reset"))
            }
            _ => Ok(JobHandle::new(self.name, format!("{}-job", self.name))),
        }
    }

    async fn poll(&self, _handle: &JobHandle) -> ProviderResult<PollStatus> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::SucceedAfter { running_polls, url } => {
                if poll < *running_polls {
                    Ok(PollStatus::Running)
                } else {
                    Ok(PollStatus::Succeeded {
                        result_url: url.to_string(),
                    })
                }
            }
            Script::FlakyThenSucceed { url, .. } => Ok(PollStatus::Succeeded {
                result_url: url.to_string(),
            }),
            Script::FailOnPoll { class, reason } => Ok(PollStatus::Failed {
                class: *class,
                reason: reason.to_string(),
            }),
            _ => Ok(PollStatus::Running),
        }
    }
}

struct StubUploader {
    calls: AtomicU32,
    fail: bool,
}

impl StubUploader {
    fn ok() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            fail: true,
        })
    }
}

#[async_trait]
impl MediaUploader for StubUploader {
    async fn upload(&self, _bytes: Vec<u8>, _mime_type: &str) -> UploadResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(UploadError::failed("asset host unreachable"))
        } else {
            Ok("https://assets.example.com/i/up.png".to_string())
        }
    }
}

/// Delegates to an in-memory store but fails one `update` call, counted
/// from 1, with a backend error.
struct FlakyStore {
    inner: InMemoryTaskStore,
    fail_update: u32,
    updates: AtomicU32,
}

impl FlakyStore {
    fn failing_update(call: u32) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryTaskStore::new(),
            fail_update: call,
            updates: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl TaskStore for FlakyStore {
    async fn create(&self, record: &TaskRecord) -> LedgerResult<()> {
        self.inner.create(record).await
    }

    async fn update(&self, record: &TaskRecord) -> LedgerResult<()> {
        let call = self.updates.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_update {
            return Err(LedgerError::store("backend write failed"));
        }
        self.inner.update(record).await
    }

    async fn get(&self, id: &TaskId) -> LedgerResult<Option<TaskRecord>> {
        self.inner.get(id).await
    }

    async fn list_active(&self) -> LedgerResult<Vec<TaskRecord>> {
        self.inner.list_active().await
    }

    async fn list_terminal(&self) -> LedgerResult<Vec<TaskRecord>> {
        self.inner.list_terminal().await
    }

    async fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> LedgerResult<usize> {
        self.inner.purge_terminal_before(cutoff).await
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    orchestrator: Arc<Orchestrator>,
    ledger: Arc<InMemoryLedger>,
    store: Arc<InMemoryTaskStore>,
}

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        poll_interval: Duration::from_millis(1),
        max_poll_attempts: 10,
        same_provider_retries: 1,
        ..Default::default()
    }
}

async fn harness(providers: Vec<Arc<StubProvider>>, credits: u32) -> Harness {
    harness_with(providers, credits, StubUploader::ok(), fast_config()).await
}

async fn harness_with(
    providers: Vec<Arc<StubProvider>>,
    credits: u32,
    uploader: Arc<StubUploader>,
    config: OrchestratorConfig,
) -> Harness {
    let mut chains = FallbackChains::new();
    for provider in providers {
        chains.register(provider);
    }

    let ledger = Arc::new(InMemoryLedger::new());
    ledger.credit("user-1", credits).await;
    let store = Arc::new(InMemoryTaskStore::new());

    let orchestrator = Arc::new(Orchestrator::new(
        chains,
        ledger.clone(),
        store.clone(),
        uploader,
        config,
    ));

    Harness {
        orchestrator,
        ledger,
        store,
    }
}

/// 5-second video: 10 credits at standard quality.
fn video_spec() -> GenerationSpec {
    GenerationSpec::new(GenerationKind::Video, "a cat surfing").with_duration_secs(5)
}

async fn balance(h: &Harness) -> u32 {
    h.ledger.balance("user-1").await.unwrap()
}

// ============================================================================
// Synchronous mode
// ============================================================================

#[tokio::test]
async fn test_success_confirms_debit() {
    let veyra = StubProvider::video(
        "veyra",
        Script::SucceedAfter {
            running_polls: 2,
            url: "https://cdn.veyra.ai/out.mp4",
        },
    );
    let h = harness(vec![veyra.clone()], 10).await;

    let success = h.orchestrator.generate("user-1", video_spec()).await.unwrap();
    assert_eq!(success.result_url, "https://cdn.veyra.ai/out.mp4");
    assert_eq!(success.provider_used, "veyra");

    // Debit confirmed, not refunded
    assert_eq!(balance(&h).await, 0);

    let record = h.store.get(&success.task_id).await.unwrap().unwrap();
    assert_eq!(record.state, TaskState::Succeeded);
    assert!(!record.credits_refunded);
    assert_eq!(record.attempts_tried(), 1);
}

#[tokio::test]
async fn test_fallback_follows_chain_order() {
    let veyra = StubProvider::video("veyra", Script::UnavailableOnSubmit("overloaded"));
    let pulsar = StubProvider::video(
        "pulsar",
        Script::SucceedAfter {
            running_polls: 0,
            url: "https://cdn.pulsar.dev/out.mp4",
        },
    );
    let h = harness(vec![veyra.clone(), pulsar.clone()], 10).await;

    let success = h.orchestrator.generate("user-1", video_spec()).await.unwrap();
    assert_eq!(success.provider_used, "pulsar");
    assert_eq!(veyra.submits(), 1);
    assert_eq!(pulsar.submits(), 1);

    // The successful run still costs its credits
    assert_eq!(balance(&h).await, 0);

    let record = h.store.get(&success.task_id).await.unwrap().unwrap();
    assert_eq!(record.attempts_tried(), 2);
    assert_eq!(record.attempts[0].provider, "veyra");
    assert_eq!(record.attempts[1].provider, "pulsar");
}

#[tokio::test]
async fn test_provider_hint_wins_over_chain_order() {
    let veyra = StubProvider::video(
        "veyra",
        Script::SucceedAfter {
            running_polls: 0,
            url: "https://cdn.veyra.ai/out.mp4",
        },
    );
    let pulsar = StubProvider::video(
        "pulsar",
        Script::SucceedAfter {
            running_polls: 0,
            url: "https://cdn.pulsar.dev/out.mp4",
        },
    );
    let h = harness(vec![veyra.clone(), pulsar.clone()], 10).await;

    let spec = video_spec().with_provider_hint("pulsar");
    let success = h.orchestrator.generate("user-1", spec).await.unwrap();

    assert_eq!(success.provider_used, "pulsar");
    assert_eq!(veyra.submits(), 0);
    assert_eq!(pulsar.submits(), 1);
}

#[tokio::test]
async fn test_rejection_short_circuits_chain_and_refunds() {
    let veyra = StubProvider::video("veyra", Script::RejectOnSubmit("content policy violation"));
    let pulsar = StubProvider::video(
        "pulsar",
        Script::SucceedAfter {
            running_polls: 0,
            url: "https://cdn.pulsar.dev/out.mp4",
        },
    );
    let h = harness(vec![veyra.clone(), pulsar.clone()], 10).await;

    let err = h
        .orchestrator
        .generate("user-1", video_spec())
        .await
        .unwrap_err();

    // A rejected request would be rejected everywhere; the chain stops
    let task_id = match err {
        OrchestratorError::GenerationFailed {
            task_id,
            class: FailureClass::Rejected,
            credits_refunded: true,
            ..
        } => task_id,
        other => panic!("expected rejected GenerationFailed, got {other:?}"),
    };
    assert_eq!(pulsar.submits(), 0);

    // Full refund
    assert_eq!(balance(&h).await, 10);

    let record = h.store.get(&task_id).await.unwrap().unwrap();
    assert_eq!(record.state, TaskState::Failed);
    assert!(record.credits_refunded);
}

#[tokio::test]
async fn test_exhaustion_refunds_and_reports() {
    let veyra = StubProvider::video("veyra", Script::UnavailableOnSubmit("overloaded"));
    let pulsar = StubProvider::video("pulsar", Script::UnavailableOnSubmit("maintenance"));
    let h = harness(vec![veyra.clone(), pulsar.clone()], 10).await;

    let err = h
        .orchestrator
        .generate("user-1", video_spec())
        .await
        .unwrap_err();

    let task_id = match err {
        OrchestratorError::Exhausted {
            task_id,
            credits_refunded: true,
            ..
        } => task_id,
        other => panic!("expected Exhausted, got {other:?}"),
    };

    // Chain plus one bounded retry of the last provider
    assert_eq!(veyra.submits(), 1);
    assert_eq!(pulsar.submits(), 2);

    assert_eq!(balance(&h).await, 10);

    let record = h.store.get(&task_id).await.unwrap().unwrap();
    assert_eq!(record.state, TaskState::Exhausted);
    assert_eq!(record.attempts_tried(), 3);
    assert!(record.credits_refunded);
}

#[tokio::test]
async fn test_flaky_provider_recovers_on_retry() {
    // Single provider, transient submit failure, then success on the
    // bounded same-provider retry. The run is billed like any success.
    let veyra = StubProvider::video(
        "veyra",
        Script::FlakyThenSucceed {
            fail_submits: 1,
            url: "https://cdn.veyra.ai/out.mp4",
        },
    );
    let h = harness(vec![veyra.clone()], 10).await;

    let success = h.orchestrator.generate("user-1", video_spec()).await.unwrap();
    assert_eq!(success.provider_used, "veyra");
    assert_eq!(veyra.submits(), 2);

    // Debited, not refunded
    assert_eq!(balance(&h).await, 0);

    let record = h.store.get(&success.task_id).await.unwrap().unwrap();
    assert_eq!(record.attempts_tried(), 2);
    assert!(!record.credits_refunded);
}

#[tokio::test]
async fn test_poll_failure_falls_back() {
    let veyra = StubProvider::video(
        "veyra",
        Script::FailOnPoll {
            class: FailureClass::Unavailable,
            reason: "render farm crashed",
        },
    );
    let pulsar = StubProvider::video(
        "pulsar",
        Script::SucceedAfter {
            running_polls: 0,
            url: "https://cdn.pulsar.dev/out.mp4",
        },
    );
    let h = harness(vec![veyra, pulsar], 10).await;

    let success = h.orchestrator.generate("user-1", video_spec()).await.unwrap();
    assert_eq!(success.provider_used, "pulsar");
    assert_eq!(balance(&h).await, 0);
}

#[tokio::test]
async fn test_insufficient_credits_makes_no_reservation() {
    let veyra = StubProvider::video(
        "veyra",
        Script::SucceedAfter {
            running_polls: 0,
            url: "https://cdn.veyra.ai/out.mp4",
        },
    );
    let h = harness(vec![veyra.clone()], 3).await;

    let err = h
        .orchestrator
        .generate("user-1", video_spec())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::InsufficientCredits {
            needed: 10,
            available: 3
        }
    ));
    assert_eq!(balance(&h).await, 3);
    assert_eq!(veyra.submits(), 0);
    assert!(h.store.list_active().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_failure_precedes_reservation() {
    let veyra = StubProvider::video(
        "veyra",
        Script::SucceedAfter {
            running_polls: 0,
            url: "https://cdn.veyra.ai/out.mp4",
        },
    );
    let uploader = StubUploader::failing();
    let h = harness_with(vec![veyra.clone()], 10, uploader.clone(), fast_config()).await;

    let spec = video_spec().with_image(ImageSource::Inline {
        data: "aGVsbG8=".into(),
        mime_type: "image/png".into(),
    });
    let err = h.orchestrator.generate("user-1", spec).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::UploadFailed(_)));
    assert_eq!(err.credits_statement(), "no credits were charged");
    // No reservation, no provider call, no record
    assert_eq!(balance(&h).await, 10);
    assert_eq!(veyra.submits(), 0);
    assert!(h.store.list_active().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unsupported_kind_is_rejected_before_reservation() {
    let veyra = StubProvider::video(
        "veyra",
        Script::SucceedAfter {
            running_polls: 0,
            url: "https://cdn.veyra.ai/out.mp4",
        },
    );
    let h = harness(vec![veyra], 10).await;

    let spec = GenerationSpec::new(GenerationKind::Voice, "read this aloud");
    let err = h.orchestrator.generate("user-1", spec).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::NoProvider(_)));
    assert_eq!(balance(&h).await, 10);
}

#[tokio::test]
async fn test_store_error_mid_run_still_refunds() {
    // A store write failure during an attempt must not strand the
    // reservation on a non-terminal record until the next restart; the
    // run closes the record and refunds on its way out.
    let veyra = StubProvider::video(
        "veyra",
        Script::SucceedAfter {
            running_polls: 0,
            url: "https://cdn.veyra.ai/out.mp4",
        },
    );
    let mut chains = FallbackChains::new();
    chains.register(veyra);

    let ledger = Arc::new(InMemoryLedger::new());
    ledger.credit("user-1", 10).await;
    // First update is the attempt-started persist inside the run
    let store = FlakyStore::failing_update(1);

    let orchestrator = Orchestrator::new(
        chains,
        ledger.clone(),
        store.clone(),
        StubUploader::ok(),
        fast_config(),
    );

    let err = orchestrator
        .generate("user-1", video_spec())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Ledger(_)));

    // Refund landed immediately, no recovery sweep needed
    assert_eq!(ledger.balance("user-1").await.unwrap(), 10);

    // The record is terminal and flagged refunded, not stuck mid-run
    assert!(store.list_active().await.unwrap().is_empty());
    let terminal = store.list_terminal().await.unwrap();
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].state, TaskState::Failed);
    assert!(terminal[0].credits_refunded);
}

// ============================================================================
// Fire-and-forget mode
// ============================================================================

async fn wait_terminal(h: &Harness, id: &gentask_models::TaskId) -> gentask_orchestrator::TaskStatus {
    for _ in 0..500 {
        let status = h.orchestrator.status(id).await.unwrap();
        if status.state.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("task never reached a terminal state");
}

#[tokio::test]
async fn test_detached_task_completes_and_is_pollable() {
    let veyra = StubProvider::video(
        "veyra",
        Script::SucceedAfter {
            running_polls: 2,
            url: "https://cdn.veyra.ai/out.mp4",
        },
    );
    let h = harness(vec![veyra], 10).await;

    let task_id = h
        .orchestrator
        .generate_detached("user-1", video_spec())
        .await
        .unwrap();

    // The id resolves immediately, before the run finishes
    let status = h.orchestrator.status(&task_id).await.unwrap();
    assert_eq!(status.task_id, task_id);

    let status = wait_terminal(&h, &task_id).await;
    assert_eq!(status.state, TaskState::Succeeded);
    assert_eq!(status.result_url.as_deref(), Some("https://cdn.veyra.ai/out.mp4"));
    assert_eq!(balance(&h).await, 0);
}

#[tokio::test]
async fn test_detached_task_failure_refunds() {
    let veyra = StubProvider::video("veyra", Script::RejectOnSubmit("nsfw prompt"));
    let h = harness(vec![veyra], 10).await;

    let task_id = h
        .orchestrator
        .generate_detached("user-1", video_spec())
        .await
        .unwrap();

    let status = wait_terminal(&h, &task_id).await;
    assert_eq!(status.state, TaskState::Failed);
    assert!(status.credits_refunded);
    assert!(status.error.is_some());
    assert_eq!(balance(&h).await, 10);
}

#[tokio::test]
async fn test_detached_insufficient_credits_surfaces_immediately() {
    let veyra = StubProvider::video(
        "veyra",
        Script::SucceedAfter {
            running_polls: 0,
            url: "https://cdn.veyra.ai/out.mp4",
        },
    );
    let h = harness(vec![veyra], 3).await;

    let err = h
        .orchestrator
        .generate_detached("user-1", video_spec())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::InsufficientCredits { .. }));
}

#[tokio::test]
async fn test_status_of_unknown_task() {
    let h = harness(vec![], 0).await;
    let err = h
        .orchestrator
        .status(&gentask_models::TaskId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::TaskNotFound(_)));
}

// ============================================================================
// Recovery
// ============================================================================

#[tokio::test]
async fn test_recover_resumes_live_attempt() {
    let veyra = StubProvider::video(
        "veyra",
        Script::SucceedAfter {
            running_polls: 0,
            url: "https://cdn.veyra.ai/out.mp4",
        },
    );
    let h = harness(vec![veyra], 10).await;

    // A record left mid-poll by a previous process
    let reservation_id = h.ledger.reserve("user-1", 10, "video").await.unwrap();
    let mut record = TaskRecord::new("user-1", video_spec(), reservation_id.clone());
    record.begin_attempt("veyra");
    record.attempt_submitted("veyra-job");
    h.store.create(&record).await.unwrap();

    let resumed = h.orchestrator.recover().await.unwrap();
    assert_eq!(resumed, 1);

    let status = wait_terminal(&h, &record.id).await;
    assert_eq!(status.state, TaskState::Succeeded);
    assert_eq!(
        h.ledger.get_reservation(&reservation_id).await.unwrap().state,
        ReservationState::Confirmed
    );
}

#[tokio::test]
async fn test_recover_settles_stuck_terminal_records() {
    let h = harness_with(
        vec![],
        20,
        StubUploader::ok(),
        OrchestratorConfig {
            reconcile_grace: Duration::ZERO,
            ..fast_config()
        },
    )
    .await;

    // Succeeded but the confirm never landed
    let confirmed_res = h.ledger.reserve("user-1", 10, "video").await.unwrap();
    let mut succeeded = TaskRecord::new("user-1", video_spec(), confirmed_res.clone());
    succeeded.begin_attempt("veyra");
    succeeded.attempt_submitted("veyra-job");
    succeeded.complete("https://cdn.veyra.ai/out.mp4");
    h.store.create(&succeeded).await.unwrap();

    // Failed but the refund never landed
    let refunded_res = h.ledger.reserve("user-1", 10, "video").await.unwrap();
    let mut failed = TaskRecord::new("user-1", video_spec(), refunded_res.clone());
    failed.fail("provider gave up");
    h.store.create(&failed).await.unwrap();

    h.orchestrator.recover().await.unwrap();

    assert_eq!(
        h.ledger.get_reservation(&confirmed_res).await.unwrap().state,
        ReservationState::Confirmed
    );
    assert_eq!(
        h.ledger.get_reservation(&refunded_res).await.unwrap().state,
        ReservationState::Refunded
    );
    // Only the refunded reservation returns credits
    assert_eq!(balance(&h).await, 10);

    // The refund flag is persisted for later status reads
    let stored = h.store.get(&failed.id).await.unwrap().unwrap();
    assert!(stored.credits_refunded);
}

#[tokio::test]
async fn test_purge_expired_drops_only_old_terminal_records() {
    let h = harness_with(
        vec![],
        0,
        StubUploader::ok(),
        OrchestratorConfig {
            retention_window: Duration::from_secs(60),
            ..fast_config()
        },
    )
    .await;

    let mut old = TaskRecord::new(
        "user-1",
        video_spec(),
        gentask_models::ReservationId::new(),
    );
    old.complete("https://cdn.veyra.ai/old.mp4");
    old.updated_at = chrono::Utc::now() - chrono::Duration::hours(1);
    h.store.create(&old).await.unwrap();

    let mut fresh = TaskRecord::new(
        "user-1",
        video_spec(),
        gentask_models::ReservationId::new(),
    );
    fresh.complete("https://cdn.veyra.ai/fresh.mp4");
    h.store.create(&fresh).await.unwrap();

    let purged = h.orchestrator.purge_expired().await.unwrap();
    assert_eq!(purged, 1);
    assert!(h.store.get(&old.id).await.unwrap().is_none());
    assert!(h.store.get(&fresh.id).await.unwrap().is_some());
}
