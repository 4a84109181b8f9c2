//! The phase state machine
//!
//! ```text
//! [start] -> TaskDecomposition -> Implementation -> CodeReview -> {
//!     verdict rejects -> Implementation (retry, bounded)
//!     verdict accepts -> Completion [terminal]
//! }
//! ```
//!
//! Each phase stamps `started_at` immediately before awaiting its core
//! work and `completed_at` immediately after the await resolves; every
//! synchronous callback the executor fires (task-list repaints, persistence
//! writes) runs outside that window, so phase durations reflect engine work
//! and nothing else.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;

use crate::backend::AgentBackend;
use crate::bridge::StreamingEventBridge;
use crate::coordinator::{AgentCoordinator, ReviewOutcome};
use crate::graph;
use crate::phase::{truncate_for_event, EventType, Phase, PhaseRecorder, PhaseStatus};
use crate::prompts;
use crate::session::TaskBoard;
use crate::task::Task;
use crate::ui::UiSink;
use crate::verdict::extract_balanced;

/// Phase labels
pub const PHASE_DECOMPOSITION: &str = "Task Decomposition";
pub const PHASE_IMPLEMENTATION: &str = "Implementation";
pub const PHASE_REVIEW: &str = "Code Review";

// ============================================================================
// Result & Config
// ============================================================================

/// Outcome of a full workflow run
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkflowResult {
    pub success: bool,
    #[serde(rename = "workflowPhases")]
    pub workflow_phases: Vec<Phase>,
}

/// Knobs for one workflow run
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    /// Implementation <-> Review retry cap; 0 means unbounded
    pub max_iterations: u32,
    /// Feature-list contents embedded in the planning prompt
    pub feature_list: Option<String>,
}

/// Cooperative interrupt flag shared with the signal handler
#[derive(Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Phase Executor
// ============================================================================

/// Drives the workflow state machine over one session
pub struct PhaseExecutor {
    backend: Arc<dyn AgentBackend>,
    coordinator: AgentCoordinator,
    bridge: StreamingEventBridge,
    board: TaskBoard,
    ui: Arc<dyn UiSink>,
    config: ExecutorConfig,
    interrupt: InterruptFlag,
}

impl PhaseExecutor {
    pub fn new(
        backend: Arc<dyn AgentBackend>,
        bridge: StreamingEventBridge,
        board: TaskBoard,
        ui: Arc<dyn UiSink>,
        config: ExecutorConfig,
        interrupt: InterruptFlag,
    ) -> Self {
        let coordinator = AgentCoordinator::new(backend.clone(), bridge.clone());
        Self {
            backend,
            coordinator,
            bridge,
            board,
            ui,
            config,
            interrupt,
        }
    }

    /// Run the workflow to completion, retry exhaustion, or interrupt.
    pub async fn run(&self, user_prompt: &str) -> WorkflowResult {
        tracing::info!(session = %self.board.session_id(), "starting workflow run");
        let mut phases: Vec<Phase> = Vec::new();

        let decomposition = self.decomposition_phase(user_prompt).await;
        let planned = decomposition.status == PhaseStatus::Completed;
        phases.push(decomposition);
        self.persist_phases(&phases);
        if !planned || self.interrupt.is_set() {
            return self.conclude(false, phases);
        }

        let mut correction: Option<String> = None;
        let mut iteration = 0u32;
        loop {
            iteration += 1;

            let implementation = self.implementation_phase(correction.take()).await;
            phases.push(implementation);
            self.persist_phases(&phases);
            if self.interrupt.is_set() {
                return self.conclude(false, phases);
            }

            let (mut review, outcome) = self.review_phase().await;
            if outcome.approves() {
                phases.push(review);
                self.persist_phases(&phases);
                return self.conclude(true, phases);
            }

            let exhausted =
                self.config.max_iterations != 0 && iteration >= self.config.max_iterations;
            if exhausted {
                review.fail(format!(
                    "review rejected the work product and the retry budget of {} \
                     iterations is exhausted",
                    self.config.max_iterations
                ));
                phases.push(review);
                self.persist_phases(&phases);
                return self.conclude(false, phases);
            }

            correction = Some(outcome.correction_text());
            self.board
                .reopen_for_retry(iteration, correction.as_deref().unwrap_or_default());
            self.ui.set_todo_items(&self.board.snapshot());
            phases.push(review);
            self.persist_phases(&phases);

            if self.interrupt.is_set() {
                return self.conclude(false, phases);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Task Decomposition
    // ------------------------------------------------------------------------

    async fn decomposition_phase(&self, user_prompt: &str) -> Phase {
        let recorder = PhaseRecorder::new();

        // A resumed session already carries its task list; reopening is
        // engine-local work with no planning turn.
        if !self.board.is_empty() {
            let mut phase = Phase::start(PHASE_DECOMPOSITION);
            let count = self.board.snapshot().len();
            recorder.record(
                EventType::Progress,
                format!("resumed session with {count} persisted tasks"),
            );
            phase.finish(
                PhaseStatus::Completed,
                format!("resumed {count} tasks from the session"),
                recorder.take_events(),
            );
            self.ui.set_todo_items(&self.board.snapshot());
            self.ui.phase_update(&phase);
            return phase;
        }

        let prompt = prompts::planner_prompt(user_prompt, self.config.feature_list.as_deref());
        self.bridge.turn_start();

        let mut phase = Phase::start(PHASE_DECOMPOSITION);
        recorder.record(
            EventType::Progress,
            "requesting task decomposition from the planning agent",
        );
        let outcome = self.backend.stream_and_wait(&prompt).await;

        let (status, message, tasks) = match outcome {
            Ok(stream) if stream.was_interrupted || stream.was_cancelled => {
                recorder.record(
                    EventType::Error,
                    "planning turn ended before producing a task list",
                );
                (
                    PhaseStatus::Failed,
                    "task decomposition was interrupted".to_string(),
                    None,
                )
            }
            Ok(stream) => {
                recorder.record(EventType::Text, truncate_for_event(&stream.content));
                match parse_task_array(&stream.content) {
                    Some(tasks) => {
                        recorder.record(
                            EventType::Progress,
                            format!("materialized {} tasks", tasks.len()),
                        );
                        (
                            PhaseStatus::Completed,
                            format!("decomposed the prompt into {} tasks", tasks.len()),
                            Some(tasks),
                        )
                    }
                    None => {
                        recorder.record(
                            EventType::Error,
                            "planning output did not contain a task array",
                        );
                        (
                            PhaseStatus::Failed,
                            "task decomposition produced no usable task list".to_string(),
                            None,
                        )
                    }
                }
            }
            Err(e) => {
                recorder.record(EventType::Error, format!("planning agent call failed: {e}"));
                (
                    PhaseStatus::Failed,
                    "the planning agent could not be reached".to_string(),
                    None,
                )
            }
        };

        // Core work is done; everything below is synchronous side effects.
        phase.finish(status, message, recorder.take_events());
        self.bridge.turn_end().await;

        if let Some(tasks) = tasks {
            // Sort once for display and persistence; readiness is re-queried
            // against live statuses as the run progresses.
            self.board.replace_all(graph::topological_order(&tasks));
        }
        self.ui.set_todo_items(&self.board.snapshot());
        self.ui.phase_update(&phase);
        phase
    }

    // ------------------------------------------------------------------------
    // Implementation
    // ------------------------------------------------------------------------

    async fn implementation_phase(&self, correction: Option<String>) -> Phase {
        let recorder = PhaseRecorder::new();

        let mut phase = Phase::start(PHASE_IMPLEMENTATION);
        let total = self.board.snapshot().len();
        recorder.record(
            EventType::Progress,
            format!("implementation pass over {total} tasks"),
        );

        let mut dispatched = 0usize;
        let mut paused = false;
        loop {
            if self.interrupt.is_set() {
                recorder.record(
                    EventType::Progress,
                    "interrupt received; pausing after in-flight work",
                );
                paused = true;
                break;
            }

            let snapshot = self.board.snapshot();
            let ready = graph::ready_indices(&snapshot);
            if ready.is_empty() {
                break;
            }

            // One spawn per ready task, fired together; the pass advances
            // only once every spawn in it has resolved.
            let spawns: Vec<_> = ready
                .iter()
                .map(|&index| {
                    let prompt = prompts::worker_prompt(&snapshot[index], correction.as_deref());
                    self.coordinator
                        .run_task(&self.board, index, prompt, &recorder)
                })
                .collect();
            join_all(spawns).await;
            dispatched += ready.len();
        }

        let (pending, _, completed, errored) = self.board.counts();
        let message = if paused {
            format!("implementation paused by interrupt after {dispatched} dispatched tasks")
        } else if pending > 0 {
            // Stall: the remaining pending set can never become ready.
            format!(
                "partial completion: {pending} tasks remain blocked by unresolvable or \
                 failed prerequisites ({completed} completed, {errored} errored)"
            )
        } else {
            format!("implemented {dispatched} tasks ({completed} completed, {errored} errored)")
        };
        phase.finish(PhaseStatus::Completed, message, recorder.take_events());

        self.ui.set_todo_items(&self.board.snapshot());
        self.ui.phase_update(&phase);
        phase
    }

    // ------------------------------------------------------------------------
    // Code Review
    // ------------------------------------------------------------------------

    async fn review_phase(&self) -> (Phase, ReviewOutcome) {
        let recorder = PhaseRecorder::new();
        let prompt = prompts::reviewer_prompt(&self.board.snapshot());

        let mut phase = Phase::start(PHASE_REVIEW);
        let outcome = self.coordinator.run_review(prompt, &recorder).await;

        let (status, message) = match &outcome {
            ReviewOutcome::Verdict(v) if v.approves() => (
                PhaseStatus::Completed,
                format!("review accepted the work product: {}", v.overall_correctness),
            ),
            ReviewOutcome::Verdict(v) => (
                PhaseStatus::Completed,
                format!("review rejected the work product with {} findings", v.findings.len()),
            ),
            ReviewOutcome::Unparsable => (
                PhaseStatus::Completed,
                "reviewer output was unparsable and was treated as a rejection".to_string(),
            ),
            ReviewOutcome::SpawnFailed => (
                PhaseStatus::Completed,
                "the reviewer could not be spawned; treated as a rejection".to_string(),
            ),
        };
        phase.finish(status, message, recorder.take_events());

        self.ui.phase_update(&phase);
        (phase, outcome)
    }

    // ------------------------------------------------------------------------
    // Shared plumbing
    // ------------------------------------------------------------------------

    fn conclude(&self, success: bool, phases: Vec<Phase>) -> WorkflowResult {
        self.persist_phases(&phases);
        tracing::info!(
            session = %self.board.session_id(),
            success,
            phases = phases.len(),
            "workflow run concluded"
        );
        WorkflowResult {
            success,
            workflow_phases: phases,
        }
    }

    fn persist_phases(&self, phases: &[Phase]) {
        if let Err(e) = self.board.store().persist_phases(phases) {
            tracing::warn!(error = %e, "failed to persist phase history; continuing");
        }
    }
}

/// Materialize a task array from free-form planning output.
///
/// Accepts a bare JSON array or one embedded in surrounding prose or code
/// fences. Returns None when no array parses.
fn parse_task_array(content: &str) -> Option<Vec<Task>> {
    let trimmed = content.trim();
    if trimmed.starts_with('[') {
        if let Ok(tasks) = serde_json::from_str::<Vec<Task>>(trimmed) {
            return Some(tasks);
        }
    }

    let embedded = extract_balanced(content, '[', ']')?;
    serde_json::from_str::<Vec<Task>>(embedded).ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;

    #[test]
    fn test_parse_task_array_bare() {
        let tasks = parse_task_array(
            r##"[{"id": "#1", "content": "first", "activeForm": "Doing first", "blockedBy": []}]"##,
        )
        .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Pending);
    }

    #[test]
    fn test_parse_task_array_embedded_in_prose() {
        let content = r#"Here is the plan:

```json
[
  {"id": "1", "content": "first"},
  {"id": "2", "content": "second", "blockedBy": ["1"]}
]
```

Two tasks total."#;
        let tasks = parse_task_array(content).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].blocked_by, vec!["1"]);
    }

    #[test]
    fn test_parse_task_array_rejects_non_arrays() {
        assert!(parse_task_array("no json here").is_none());
        assert!(parse_task_array(r#"{"id": "1", "content": "an object"}"#).is_none());
        assert!(parse_task_array("[1, 2, 3]").is_none());
    }

    #[test]
    fn test_interrupt_flag() {
        let flag = InterruptFlag::new();
        assert!(!flag.is_set());
        let shared = flag.clone();
        shared.set();
        assert!(flag.is_set());
    }

    #[test]
    fn test_workflow_result_wire_name() {
        let result = WorkflowResult {
            success: true,
            workflow_phases: Vec::new(),
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"workflowPhases\""));
    }
}
