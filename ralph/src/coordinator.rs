//! Sub-agent coordination
//!
//! The coordinator is the only component that crosses the agent boundary on
//! behalf of a task. It chooses the agent identity, brackets each spawn
//! with `agent_spawn`/`agent_complete` events, applies task status
//! transitions before appending the matching event, and converts a spawn
//! failure into an `error` event plus task `error` status. One failed task
//! never aborts siblings dispatched in the same pass.

use std::sync::Arc;

use crate::backend::{AgentBackend, SpawnRequest};
use crate::bridge::StreamingEventBridge;
use crate::phase::{truncate_for_event, EventType, PhaseRecorder};
use crate::session::TaskBoard;
use crate::task::TaskStatus;
use crate::verdict::{self, ReviewVerdict};

/// Agent identity for implementation spawns
pub const WORKER_AGENT: &str = "worker";
/// Agent identity for review spawns
pub const REVIEWER_AGENT: &str = "reviewer";

/// How a review round concluded
#[derive(Debug, Clone)]
pub enum ReviewOutcome {
    /// The reviewer returned a decodable verdict
    Verdict(ReviewVerdict),
    /// The reviewer ran but its output was not a verdict
    Unparsable,
    /// The reviewer could not be spawned or failed outright
    SpawnFailed,
}

impl ReviewOutcome {
    /// Only a decoded verdict can approve; every failure mode rejects.
    pub fn approves(&self) -> bool {
        matches!(self, ReviewOutcome::Verdict(v) if v.approves())
    }

    /// Correction input for the next implementation pass.
    pub fn correction_text(&self) -> String {
        match self {
            ReviewOutcome::Verdict(v) => {
                let mut text = v.findings_text();
                if !v.overall_explanation.is_empty() {
                    text.push('\n');
                    text.push_str(&v.overall_explanation);
                }
                if text.trim().is_empty() {
                    text = format!("Reviewer verdict: {}", v.overall_correctness);
                }
                text
            }
            ReviewOutcome::Unparsable => {
                "The previous review produced no usable verdict; re-verify the implementation \
                 end to end."
                    .to_string()
            }
            ReviewOutcome::SpawnFailed => {
                "The previous review could not be completed; re-verify the implementation \
                 end to end."
                    .to_string()
            }
        }
    }
}

/// Drives individual sub-agent spawns for the phase executor
pub struct AgentCoordinator {
    backend: Arc<dyn AgentBackend>,
    bridge: StreamingEventBridge,
}

impl AgentCoordinator {
    pub fn new(backend: Arc<dyn AgentBackend>, bridge: StreamingEventBridge) -> Self {
        Self { backend, bridge }
    }

    /// Run one ready task on a worker sub-agent.
    ///
    /// The task's status advances before the corresponding event is
    /// appended, so an event log read after the fact never shows a result
    /// for a task whose status has not moved yet.
    pub async fn run_task(
        &self,
        board: &TaskBoard,
        index: usize,
        prompt: String,
        recorder: &PhaseRecorder,
    ) -> bool {
        let label = board.label(index);

        board.set_status(index, TaskStatus::InProgress);
        recorder.record(
            EventType::AgentSpawn,
            format!("spawning {WORKER_AGENT} for {label}"),
        );
        let tool_id = self.bridge.tool_dispatched(&format!("{WORKER_AGENT} {label}"));
        self.bridge.tool_running(tool_id);

        match self
            .backend
            .spawn_subagent(SpawnRequest::new(WORKER_AGENT, prompt))
            .await
        {
            Ok(result) if result.success => {
                board.set_status(index, TaskStatus::Completed);
                recorder.record(
                    EventType::AgentComplete,
                    format!("{WORKER_AGENT} finished {label}"),
                );
                if !result.output.trim().is_empty() {
                    recorder.record(EventType::ToolResult, truncate_for_event(&result.output));
                }
                self.bridge.tool_finished(tool_id, true);
                true
            }
            Ok(result) => {
                board.set_status(index, TaskStatus::Error);
                recorder.record(
                    EventType::Error,
                    format!(
                        "{WORKER_AGENT} failed {label}: {}",
                        failure_summary(&result.output)
                    ),
                );
                self.bridge.tool_finished(tool_id, false);
                false
            }
            Err(e) => {
                board.set_status(index, TaskStatus::Error);
                recorder.record(
                    EventType::Error,
                    format!("{WORKER_AGENT} spawn for {label} failed: {e}"),
                );
                self.bridge.tool_finished(tool_id, false);
                false
            }
        }
    }

    /// Spawn the reviewer over the aggregate work product and decode its
    /// verdict. Malformed output is rejection, never acceptance.
    pub async fn run_review(&self, prompt: String, recorder: &PhaseRecorder) -> ReviewOutcome {
        recorder.record(
            EventType::AgentSpawn,
            format!("spawning {REVIEWER_AGENT} over the work product"),
        );
        let tool_id = self.bridge.tool_dispatched(REVIEWER_AGENT);
        self.bridge.tool_running(tool_id);

        match self
            .backend
            .spawn_subagent(SpawnRequest::new(REVIEWER_AGENT, prompt))
            .await
        {
            Ok(result) if result.success => {
                recorder.record(
                    EventType::AgentComplete,
                    format!("{REVIEWER_AGENT} returned a verdict"),
                );
                self.bridge.tool_finished(tool_id, true);
                match verdict::parse_verdict(&result.output) {
                    Ok(verdict) => {
                        recorder.record(
                            EventType::Text,
                            format!(
                                "review: {} findings, correctness \"{}\"",
                                verdict.findings.len(),
                                verdict.overall_correctness
                            ),
                        );
                        ReviewOutcome::Verdict(verdict)
                    }
                    Err(e) => {
                        recorder.record(
                            EventType::Error,
                            format!("unparsable reviewer output treated as rejection: {e}"),
                        );
                        ReviewOutcome::Unparsable
                    }
                }
            }
            Ok(result) => {
                recorder.record(
                    EventType::Error,
                    format!(
                        "{REVIEWER_AGENT} failed: {}",
                        failure_summary(&result.output)
                    ),
                );
                self.bridge.tool_finished(tool_id, false);
                ReviewOutcome::SpawnFailed
            }
            Err(e) => {
                recorder.record(EventType::Error, format!("{REVIEWER_AGENT} spawn failed: {e}"));
                self.bridge.tool_finished(tool_id, false);
                ReviewOutcome::SpawnFailed
            }
        }
    }
}

fn failure_summary(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        "no output".to_string()
    } else {
        truncate_for_event(trimmed)
    }
}

// ============================================================================
// Tests
// ============================================================================
