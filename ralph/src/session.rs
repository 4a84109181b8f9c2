//! Durable session state
//!
//! A session is a directory named by its UUID under the sessions root. Task
//! state is written as whole-file JSON after every status transition; each
//! write lands in a temp file and is renamed into place, so a concurrent
//! reader only ever observes a complete array. A fresh session directory is
//! exclusively owned by the run that created it; `--resume` reopens an
//! existing directory rather than allocating a new one.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::phase::Phase;
use crate::task::{Task, TaskStatus};

/// Task list file inside the session directory
pub const TASKS_FILE: &str = "tasks.json";
/// Phase history file inside the session directory
pub const PHASES_FILE: &str = "phases.json";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("`{0}` is not a valid session id")]
    BadId(String),

    #[error("unknown session {id} (known sessions: {})", .known.join(", "))]
    NotFound { id: String, known: Vec<String> },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt session state: {0}")]
    Corrupt(#[from] serde_json::Error),
}

// ============================================================================
// Session Store
// ============================================================================

/// Handle to one session directory
#[derive(Debug, Clone)]
pub struct SessionStore {
    session_id: Uuid,
    session_dir: PathBuf,
}

impl SessionStore {
    /// Allocate a fresh session directory under `root`.
    pub fn create(root: &Path) -> Result<Self, SessionError> {
        let session_id = Uuid::new_v4();
        let session_dir = root.join(session_id.to_string());
        fs::create_dir_all(&session_dir)?;
        tracing::info!(session = %session_id, dir = %session_dir.display(), "created session");
        Ok(Self {
            session_id,
            session_dir,
        })
    }

    /// Reopen an existing session directory by id.
    pub fn resume(root: &Path, id: &str) -> Result<Self, SessionError> {
        let session_id =
            Uuid::parse_str(id.trim()).map_err(|_| SessionError::BadId(id.to_string()))?;
        let session_dir = root.join(session_id.to_string());
        if !session_dir.is_dir() {
            return Err(SessionError::NotFound {
                id: id.to_string(),
                known: list_sessions(root),
            });
        }
        tracing::info!(session = %session_id, "resumed session");
        Ok(Self {
            session_id,
            session_dir,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Write the full task list as a whole-file replacement.
    pub fn persist_tasks(&self, tasks: &[Task]) -> Result<(), SessionError> {
        let bytes = serde_json::to_vec_pretty(tasks)?;
        write_atomic(&self.session_dir.join(TASKS_FILE), &bytes)?;
        Ok(())
    }

    /// Load the last persisted task list; a missing file is an empty list.
    pub fn load_tasks(&self) -> Result<Vec<Task>, SessionError> {
        let path = self.session_dir.join(TASKS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the phase history as a whole-file replacement.
    pub fn persist_phases(&self, phases: &[Phase]) -> Result<(), SessionError> {
        let bytes = serde_json::to_vec_pretty(phases)?;
        write_atomic(&self.session_dir.join(PHASES_FILE), &bytes)?;
        Ok(())
    }

    /// Load the persisted phase history; a missing file is an empty list.
    pub fn load_phases(&self) -> Result<Vec<Phase>, SessionError> {
        let path = self.session_dir.join(PHASES_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Session ids present under `root`, sorted for stable error messages.
pub fn list_sessions(root: &Path) -> Vec<String> {
    let mut ids = Vec::new();
    let Ok(entries) = fs::read_dir(root) else {
        return ids;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        if let Some(name) = name.to_str() {
            if Uuid::parse_str(name).is_ok() && entry.path().is_dir() {
                ids.push(name.to_string());
            }
        }
    }
    ids.sort();
    ids
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
    }
    fs::rename(&tmp, path)
}

// ============================================================================
// Task Board
// ============================================================================

/// Shared, persistence-backed view of the session's task list.
///
/// Only the executor and coordinator mutate tasks; the UI layer receives
/// owned snapshots. Every status-changing operation persists the whole list
/// before releasing the lock, so writes are serialized and `tasks.json`
/// never reflects a half-updated array. Persistence failures are surfaced
/// as warnings and the in-memory workflow continues.
#[derive(Clone)]
pub struct TaskBoard {
    tasks: Arc<Mutex<Vec<Task>>>,
    store: SessionStore,
}

impl TaskBoard {
    /// Wrap a session store, loading any previously persisted tasks.
    pub fn open(store: SessionStore) -> Result<Self, SessionError> {
        let tasks = store.load_tasks()?;
        Ok(Self {
            tasks: Arc::new(Mutex::new(tasks)),
            store,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.store.session_id()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Owned snapshot of the current task list.
    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().unwrap().is_empty()
    }

    /// Replace the whole task list (decomposition output), canonicalizing
    /// ids, and persist.
    pub fn replace_all(&self, mut tasks: Vec<Task>) {
        for task in &mut tasks {
            task.canonicalize();
        }
        let mut guard = self.tasks.lock().unwrap();
        *guard = tasks;
        self.persist_locked(&guard);
    }

    /// Apply one status transition and persist before returning.
    pub fn set_status(&self, index: usize, status: TaskStatus) {
        let mut guard = self.tasks.lock().unwrap();
        let Some(task) = guard.get_mut(index) else {
            tracing::warn!(index, "status transition for unknown task index ignored");
            return;
        };
        task.status = status;
        self.persist_locked(&guard);
    }

    /// Event-log label for a task.
    pub fn label(&self, index: usize) -> String {
        self.tasks
            .lock()
            .unwrap()
            .get(index)
            .map(Task::label)
            .unwrap_or_else(|| format!("task[{index}]"))
    }

    /// Reset errored tasks to pending and append a correction task carrying
    /// the reviewer's findings, so the next implementation pass always has
    /// ready work.
    pub fn reopen_for_retry(&self, iteration: u32, findings: &str) {
        let mut guard = self.tasks.lock().unwrap();
        for task in guard.iter_mut() {
            if task.status == TaskStatus::Error {
                task.status = TaskStatus::Pending;
            }
        }
        let mut correction = Task::new(format!("Address review findings: {findings}"))
            .with_id(format!("r{iteration}"));
        correction.active_form = "Addressing review findings".to_string();
        correction.canonicalize();
        guard.push(correction);
        self.persist_locked(&guard);
    }

    /// Counts of (pending, in_progress, completed, error) tasks.
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        let guard = self.tasks.lock().unwrap();
        let mut counts = (0, 0, 0, 0);
        for task in guard.iter() {
            match task.status {
                TaskStatus::Pending => counts.0 += 1,
                TaskStatus::InProgress => counts.1 += 1,
                TaskStatus::Completed => counts.2 += 1,
                TaskStatus::Error => counts.3 += 1,
            }
        }
        counts
    }

    fn persist_locked(&self, tasks: &[Task]) {
        if let Err(e) = self.store.persist_tasks(tasks) {
            tracing::warn!(error = %e, "failed to persist task list; continuing in memory");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
