//! Task records and identifier canonicalization
//!
//! Tasks are the unit of work scheduled by the workflow runner. Identifiers
//! arrive from planning-agent output in loose forms (`"1"`, `"#1"`, `"##1"`)
//! and are canonicalized to a single leading `#` before any graph
//! resolution. Blank identifiers canonicalize to "no id".

use serde::{Deserialize, Serialize};

// ============================================================================
// Status
// ============================================================================

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

impl TaskStatus {
    /// Terminal tasks are never revisited by the scheduler
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Pending
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Error => write!(f, "error"),
        }
    }
}

// ============================================================================
// Task
// ============================================================================

/// A unit of implementation work with a dependency list
///
/// Field names on the wire match the session file format: `activeForm`,
/// `blockedBy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Raw identifier as produced by the planning agent (may be unprefixed)
    #[serde(default)]
    pub id: Option<String>,

    /// Human-readable description of the work
    pub content: String,

    /// Lifecycle status
    #[serde(default)]
    pub status: TaskStatus,

    /// Present-tense description shown while the task runs
    #[serde(rename = "activeForm", default)]
    pub active_form: String,

    /// Raw ids of prerequisite tasks
    #[serde(rename = "blockedBy", default)]
    pub blocked_by: Vec<String>,
}

impl Task {
    /// Create a pending task with no id and no blockers
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: None,
            content: content.into(),
            status: TaskStatus::Pending,
            active_form: String::new(),
            blocked_by: Vec::new(),
        }
    }

    /// Set the raw id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the blocker list
    pub fn with_blockers(mut self, blockers: Vec<String>) -> Self {
        self.blocked_by = blockers;
        self
    }

    /// Canonical form of this task's id, if it has one
    pub fn normalized_id(&self) -> Option<String> {
        self.id.as_deref().and_then(normalize_id)
    }

    /// Canonical, deduplicated blocker list in original order
    pub fn normalized_blockers(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for raw in &self.blocked_by {
            if let Some(id) = normalize_id(raw) {
                if !seen.contains(&id) {
                    seen.push(id);
                }
            }
        }
        seen
    }

    /// Rewrite the raw id and blockers into canonical form.
    ///
    /// Applied once when a task list is materialized from agent output, so
    /// the persisted session file always carries `#`-prefixed ids.
    pub fn canonicalize(&mut self) {
        self.id = self.normalized_id();
        self.blocked_by = self.normalized_blockers();
    }

    /// Short label for event log entries: the id when present, otherwise a
    /// truncated slice of the content.
    pub fn label(&self) -> String {
        match self.normalized_id() {
            Some(id) => id,
            None => {
                let mut content: String = self.content.chars().take(40).collect();
                if content.len() < self.content.len() {
                    content.push('…');
                }
                format!("'{}'", content)
            }
        }
    }
}

// ============================================================================
// Id normalization
// ============================================================================

/// Canonicalize a raw task id.
///
/// Strips any leading `#` characters and re-prefixes a single `#`, so
/// `"1"`, `"#1"` and `"##1"` all normalize to `"#1"`. Empty or
/// whitespace-only input yields no id.
pub fn normalize_id(raw: &str) -> Option<String> {
    let body = raw.trim().trim_start_matches('#').trim();
    if body.is_empty() {
        None
    } else {
        Some(format!("#{body}"))
    }
}

// ============================================================================
// Tests
// ============================================================================
