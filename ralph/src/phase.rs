//! Workflow phases and their event logs
//!
//! A phase's timestamps bound its *core async work* only. The executor
//! stamps `started_at` immediately before awaiting the work and
//! `completed_at` immediately after the await resolves, so synchronous side
//! effects fired around the boundary (UI repaints, persistence writes)
//! never inflate `duration_ms`.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Data Types
// ============================================================================

/// Status of a workflow phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Running,
    Completed,
    Failed,
}

/// Kind of an observable occurrence within a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ToolCall,
    ToolResult,
    Text,
    AgentSpawn,
    AgentComplete,
    Error,
    Progress,
}

/// A single observable occurrence within a phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// One stage of the workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    #[serde(rename = "phaseName")]
    pub phase_name: String,
    pub status: PhaseStatus,
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "completedAt")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(rename = "durationMs")]
    pub duration_ms: Option<i64>,
    pub events: Vec<Event>,
    pub message: String,
}

impl Phase {
    /// Open a running phase, stamping `started_at` now.
    ///
    /// Call this immediately before awaiting the phase's core work, after
    /// any synchronous setup.
    pub fn start(phase_name: impl Into<String>) -> Self {
        Self {
            phase_name: phase_name.into(),
            status: PhaseStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            events: Vec::new(),
            message: String::new(),
        }
    }

    /// Close the phase, stamping `completed_at` now.
    ///
    /// Call this immediately after the core work resolves, before any
    /// synchronous side effect runs. `duration_ms` is derived from the two
    /// timestamps so the pair is always consistent.
    pub fn finish(&mut self, status: PhaseStatus, message: impl Into<String>, events: Vec<Event>) {
        let completed = Utc::now().max(self.started_at);
        self.completed_at = Some(completed);
        self.duration_ms = Some((completed - self.started_at).num_milliseconds());
        self.status = status;
        self.events = events;
        let message = message.into();
        self.message = if message.is_empty() {
            format!("{} concluded", self.phase_name)
        } else {
            message
        };
    }

    /// Reclassify a concluded phase as failed, keeping its timestamps.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = PhaseStatus::Failed;
        self.message = message.into();
    }
}

// ============================================================================
// Phase Recorder
// ============================================================================

/// Shared append-only event log for the phase currently executing.
///
/// Clones share one buffer, so concurrently dispatched sub-agent spawns
/// within a pass all feed the same phase. Timestamps are clamped to be
/// monotonically non-decreasing in append order.
#[derive(Clone, Default)]
pub struct PhaseRecorder {
    inner: Arc<Mutex<RecorderInner>>,
}

#[derive(Default)]
struct RecorderInner {
    events: Vec<Event>,
    last: Option<DateTime<Utc>>,
}

impl PhaseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event. Empty content is replaced with a placeholder so
    /// the log never carries an empty payload.
    pub fn record(&self, event_type: EventType, content: impl Into<String>) {
        let mut content = content.into();
        if content.is_empty() {
            content = "(no content)".to_string();
        }

        let mut inner = self.inner.lock().unwrap();
        let mut timestamp = Utc::now();
        if let Some(last) = inner.last {
            if timestamp < last {
                timestamp = last;
            }
        }
        inner.last = Some(timestamp);
        inner.events.push(Event {
            event_type,
            content,
            timestamp,
        });
    }

    /// Drain the accumulated events for phase finalization.
    pub fn take_events(&self) -> Vec<Event> {
        std::mem::take(&mut self.inner.lock().unwrap().events)
    }

    /// Number of events recorded so far.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shorten free-form agent output for an event log entry.
pub fn truncate_for_event(text: &str) -> String {
    const MAX: usize = 200;
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(MAX - 1).collect();
        format!("{cut}…")
    }
}

// ============================================================================
// Tests
// ============================================================================
