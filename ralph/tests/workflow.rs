//! End-to-end workflow tests over a scripted agent backend

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;

use ralph::backend::{AgentBackend, BackendError, SpawnRequest, SpawnResult, StreamOutcome};
use ralph::bridge::StreamingEventBridge;
use ralph::executor::{
    ExecutorConfig, InterruptFlag, PhaseExecutor, WorkflowResult, PHASE_DECOMPOSITION,
    PHASE_IMPLEMENTATION, PHASE_REVIEW,
};
use ralph::phase::PhaseStatus;
use ralph::session::{SessionStore, TaskBoard, TASKS_FILE};
use ralph::task::{Task, TaskStatus};
use ralph::ui::{NullUi, UiSink};

const TWO_TASK_PLAN: &str = r##"Here is the decomposition:

[
  {"id": "#1", "content": "build the parser", "activeForm": "Building the parser", "blockedBy": []},
  {"id": "#2", "content": "wire the parser into the CLI", "activeForm": "Wiring the CLI", "blockedBy": ["#1"]}
]
"##;

const ACCEPT_VERDICT: &str = r#"{ "findings": [], "overall_correctness": "patch is correct",
  "overall_explanation": "both tasks verified", "overall_confidence_score": 0.95 }"#;

const REJECT_VERDICT: &str = r#"{ "findings": ["CLI flag is not registered"],
  "overall_correctness": "not correct yet",
  "overall_explanation": "the parser never reaches the CLI", "overall_confidence_score": 0.8 }"#;

/// Backend with scripted plan, per-prompt worker behavior, and a queue of
/// reviewer verdicts (the last one repeats once the queue drains).
struct MockBackend {
    plan: String,
    fail_workers_containing: Option<String>,
    reviewer_verdicts: Mutex<VecDeque<String>>,
    work_delay: Duration,
    worker_spawns: AtomicUsize,
    reviewer_spawns: AtomicUsize,
}

impl MockBackend {
    fn new(plan: &str, verdicts: &[&str]) -> Self {
        Self {
            plan: plan.to_string(),
            fail_workers_containing: None,
            reviewer_verdicts: Mutex::new(verdicts.iter().map(|s| s.to_string()).collect()),
            work_delay: Duration::from_millis(2),
            worker_spawns: AtomicUsize::new(0),
            reviewer_spawns: AtomicUsize::new(0),
        }
    }

    fn failing_workers_on(mut self, needle: &str) -> Self {
        self.fail_workers_containing = Some(needle.to_string());
        self
    }
}

#[async_trait]
impl AgentBackend for MockBackend {
    async fn stream_and_wait(&self, _prompt: &str) -> Result<StreamOutcome, BackendError> {
        tokio::time::sleep(self.work_delay).await;
        Ok(StreamOutcome::complete(self.plan.clone()))
    }

    async fn spawn_subagent(&self, request: SpawnRequest) -> Result<SpawnResult, BackendError> {
        tokio::time::sleep(self.work_delay).await;
        if request.name == "reviewer" {
            self.reviewer_spawns.fetch_add(1, Ordering::SeqCst);
            let mut verdicts = self.reviewer_verdicts.lock().unwrap();
            let output = if verdicts.len() > 1 {
                verdicts.pop_front().unwrap()
            } else {
                verdicts.front().cloned().unwrap_or_default()
            };
            return Ok(SpawnResult {
                success: true,
                output,
            });
        }

        self.worker_spawns.fetch_add(1, Ordering::SeqCst);
        let fail = self
            .fail_workers_containing
            .as_deref()
            .map(|needle| request.prompt.contains(needle))
            .unwrap_or(false);
        Ok(SpawnResult {
            success: !fail,
            output: if fail {
                "could not complete the task".to_string()
            } else {
                "task implemented".to_string()
            },
        })
    }
}

struct Harness {
    executor: PhaseExecutor,
    board: TaskBoard,
    store: SessionStore,
    _root: tempfile::TempDir,
}

fn harness(backend: Arc<MockBackend>, ui: Arc<dyn UiSink>, max_iterations: u32) -> Harness {
    let root = tempdir().unwrap();
    let store = SessionStore::create(root.path()).unwrap();
    let board = TaskBoard::open(store.clone()).unwrap();
    let (bridge, _handles) = StreamingEventBridge::new(Duration::from_millis(1));
    let executor = PhaseExecutor::new(
        backend,
        bridge,
        board.clone(),
        ui,
        ExecutorConfig {
            max_iterations,
            feature_list: None,
        },
        InterruptFlag::new(),
    );
    Harness {
        executor,
        board,
        store,
        _root: root,
    }
}

fn phases_named<'a>(result: &'a WorkflowResult, name: &str) -> Vec<&'a ralph::phase::Phase> {
    result
        .workflow_phases
        .iter()
        .filter(|p| p.phase_name == name)
        .collect()
}

#[tokio::test]
async fn full_run_completes_both_tasks_and_persists() {
    let backend = Arc::new(MockBackend::new(TWO_TASK_PLAN, &[ACCEPT_VERDICT]));
    let h = harness(backend.clone(), Arc::new(NullUi), 3);

    let result = h.executor.run("build a parser and wire it up").await;
    assert!(result.success);

    // All three phases present, completed, each with at least one event.
    for name in [PHASE_DECOMPOSITION, PHASE_IMPLEMENTATION, PHASE_REVIEW] {
        let matching = phases_named(&result, name);
        assert!(!matching.is_empty(), "missing phase {name}");
        for phase in matching {
            assert_eq!(phase.status, PhaseStatus::Completed, "phase {name}");
            assert!(!phase.events.is_empty(), "phase {name} has no events");
        }
    }

    // Timestamps are consistent on every phase.
    for phase in &result.workflow_phases {
        let completed = phase.completed_at.expect("phase not finalized");
        assert!(phase.started_at <= completed);
        assert_eq!(
            phase.duration_ms.unwrap(),
            (completed - phase.started_at).num_milliseconds()
        );
        for pair in phase.events.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    // The dependent task ran in a second dispatch pass.
    assert_eq!(backend.worker_spawns.load(Ordering::SeqCst), 2);

    // tasks.json carries both tasks as completed.
    let raw = std::fs::read_to_string(h.store.session_dir().join(TASKS_FILE)).unwrap();
    let persisted: Vec<Task> = serde_json::from_str(&raw).unwrap();
    assert_eq!(persisted.len(), 2);
    assert!(persisted
        .iter()
        .all(|t| t.status == TaskStatus::Completed));
    assert_eq!(persisted[0].id, Some("#1".to_string()));
}

/// UI sink that burns well over the phases' true work time on every
/// callback.
struct SlowUi;

impl UiSink for SlowUi {
    fn set_todo_items(&self, _tasks: &[Task]) {
        std::thread::sleep(Duration::from_millis(150));
    }
    fn phase_update(&self, _phase: &ralph::phase::Phase) {
        std::thread::sleep(Duration::from_millis(150));
    }
}

#[tokio::test]
async fn slow_ui_callbacks_do_not_inflate_phase_durations() {
    let backend = Arc::new(MockBackend::new(TWO_TASK_PLAN, &[ACCEPT_VERDICT]));
    let h = harness(backend, Arc::new(SlowUi), 3);

    let result = h.executor.run("timing isolation").await;
    assert!(result.success);

    // True async work per phase is a few milliseconds; the 150ms sink runs
    // strictly outside each timed window.
    for phase in &result.workflow_phases {
        let duration = phase.duration_ms.unwrap();
        assert!(
            duration < 150,
            "phase {} duration {}ms includes UI time",
            phase.phase_name,
            duration
        );
    }
}

#[tokio::test]
async fn rejection_triggers_exactly_one_more_implementation_pass() {
    let backend = Arc::new(MockBackend::new(
        TWO_TASK_PLAN,
        &[REJECT_VERDICT, ACCEPT_VERDICT],
    ));
    let h = harness(backend.clone(), Arc::new(NullUi), 5);

    let result = h.executor.run("iterate until accepted").await;
    assert!(result.success);

    assert_eq!(phases_named(&result, PHASE_IMPLEMENTATION).len(), 2);
    assert_eq!(phases_named(&result, PHASE_REVIEW).len(), 2);
    assert_eq!(backend.reviewer_spawns.load(Ordering::SeqCst), 2);

    // The retry pass worked the appended correction task.
    let tasks = h.board.snapshot();
    let correction = tasks
        .iter()
        .find(|t| t.id == Some("#r1".to_string()))
        .expect("correction task missing");
    assert_eq!(correction.status, TaskStatus::Completed);
    assert!(correction.content.contains("CLI flag is not registered"));
}

#[tokio::test]
async fn retry_exhaustion_fails_the_final_phase() {
    let backend = Arc::new(MockBackend::new(TWO_TASK_PLAN, &[REJECT_VERDICT]));
    let h = harness(backend, Arc::new(NullUi), 2);

    let result = h.executor.run("never good enough").await;
    assert!(!result.success);

    let last = result.workflow_phases.last().unwrap();
    assert_eq!(last.phase_name, PHASE_REVIEW);
    assert_eq!(last.status, PhaseStatus::Failed);
    assert!(last.message.contains("exhausted"));
    assert_eq!(phases_named(&result, PHASE_IMPLEMENTATION).len(), 2);
}

#[tokio::test]
async fn unparsable_reviewer_output_is_rejection_not_acceptance() {
    let backend = Arc::new(MockBackend::new(
        TWO_TASK_PLAN,
        &["ship it, looks great!", ACCEPT_VERDICT],
    ));
    let h = harness(backend, Arc::new(NullUi), 5);

    let result = h.executor.run("free-form reviewer").await;
    assert!(result.success);
    // The prose verdict forced a second round.
    assert_eq!(phases_named(&result, PHASE_REVIEW).len(), 2);
}

#[tokio::test]
async fn worker_failure_does_not_abort_siblings() {
    let plan = r##"[
      {"id": "#1", "content": "task alpha", "blockedBy": []},
      {"id": "#2", "content": "task beta", "blockedBy": []}
    ]"##;
    let backend = Arc::new(MockBackend::new(plan, &[REJECT_VERDICT]).failing_workers_on("alpha"));
    let h = harness(backend, Arc::new(NullUi), 1);

    let result = h.executor.run("independent siblings").await;
    assert!(!result.success);

    // Both siblings were dispatched in the same pass; only alpha errored.
    let first_impl = phases_named(&result, PHASE_IMPLEMENTATION)[0];
    assert_eq!(first_impl.status, PhaseStatus::Completed);

    let tasks = h.store.load_tasks().unwrap();
    let alpha = tasks.iter().find(|t| t.content.contains("alpha")).unwrap();
    let beta = tasks.iter().find(|t| t.content.contains("beta")).unwrap();
    assert_eq!(alpha.status, TaskStatus::Error);
    assert_eq!(beta.status, TaskStatus::Completed);
}

#[tokio::test]
async fn unplannable_prompt_fails_decomposition() {
    let backend = Arc::new(MockBackend::new(
        "I cannot break this down into tasks.",
        &[ACCEPT_VERDICT],
    ));
    let h = harness(backend, Arc::new(NullUi), 3);

    let result = h.executor.run("garbled request").await;
    assert!(!result.success);
    assert_eq!(result.workflow_phases.len(), 1);
    assert_eq!(result.workflow_phases[0].status, PhaseStatus::Failed);
}

#[tokio::test]
async fn resumed_session_skips_the_planning_turn() {
    let backend = Arc::new(MockBackend::new(TWO_TASK_PLAN, &[ACCEPT_VERDICT]));

    let root = tempdir().unwrap();
    let store = SessionStore::create(root.path()).unwrap();
    let mut done = Task::new("already done").with_id("1");
    done.status = TaskStatus::Completed;
    store
        .persist_tasks(&[done, Task::new("still open").with_id("2")])
        .unwrap();

    let board = TaskBoard::open(store).unwrap();
    let (bridge, _handles) = StreamingEventBridge::new(Duration::from_millis(1));
    let executor = PhaseExecutor::new(
        backend,
        bridge,
        board.clone(),
        Arc::new(NullUi),
        ExecutorConfig::default(),
        InterruptFlag::new(),
    );

    let result = executor.run("").await;
    assert!(result.success);
    assert!(result.workflow_phases[0]
        .message
        .contains("resumed 2 tasks"));
    assert!(board
        .snapshot()
        .iter()
        .all(|t| t.status == TaskStatus::Completed));
}

#[tokio::test]
async fn interrupt_before_run_pauses_with_state_persisted() {
    let backend = Arc::new(MockBackend::new(TWO_TASK_PLAN, &[ACCEPT_VERDICT]));
    let root = tempdir().unwrap();
    let store = SessionStore::create(root.path()).unwrap();
    let board = TaskBoard::open(store.clone()).unwrap();
    let (bridge, _handles) = StreamingEventBridge::new(Duration::from_millis(1));
    let interrupt = InterruptFlag::new();
    let executor = PhaseExecutor::new(
        backend,
        bridge,
        board,
        Arc::new(NullUi),
        ExecutorConfig {
            max_iterations: 3,
            feature_list: None,
        },
        interrupt.clone(),
    );

    interrupt.set();
    let result = executor.run("interrupted early").await;
    assert!(!result.success);

    // The decomposed task list is on disk, ready for --resume.
    let tasks = store.load_tasks().unwrap();
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Pending));
}
