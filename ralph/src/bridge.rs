//! Bridge between the long-running orchestration and the interactive front end
//!
//! The engine may be busy for minutes at a time; the bridge keeps the front
//! end responsive by tracking turn lifecycle, live tool executions, a
//! human-in-the-loop question queue, and a FIFO queue for user input that
//! arrives mid-turn. State transitions live in [`BridgeState`] as plain
//! mutations with no I/O; [`StreamingEventBridge`] wraps them with the
//! outbound channels. There is no process-wide singleton: the bridge is a
//! value constructed at startup and handed to the engine.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::phase::Phase;
use crate::task::Task;

// ============================================================================
// Event Types
// ============================================================================

/// Status of a single tracked tool execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolState {
    Pending,
    Running,
    Completed,
    Error,
}

/// A tool invocation the engine is (or was) waiting on
#[derive(Debug, Clone, Serialize)]
pub struct ToolExecution {
    pub id: u64,
    pub label: String,
    pub state: ToolState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Events pushed to the front end.
///
/// Every payload is an owned snapshot; engine state never leaks to the UI
/// by reference.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    TurnStarted { at: DateTime<Utc> },
    TurnEnded,
    Text { content: String },
    TaskSnapshot { tasks: Vec<Task> },
    PhaseUpdate { phase: Phase },
    ToolStatus { execution: ToolExecution },
    QuestionSurfaced { id: u64, text: String },
}

/// What `submit_input` decided to do with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Dispatched immediately (engine was idle)
    Dispatched,
    /// Appended to the queue at this position (engine was streaming)
    Queued(usize),
}

struct PendingQuestion {
    id: u64,
    text: String,
    reply: oneshot::Sender<String>,
}

// ============================================================================
// Bridge State (pure transitions)
// ============================================================================

/// Engine-owned bridge state. All methods are synchronous mutations with
/// no side effects beyond their return values.
#[derive(Default)]
pub struct BridgeState {
    streaming: bool,
    turn_started_at: Option<DateTime<Utc>>,
    buffered: Vec<BridgeEvent>,
    tools: HashMap<u64, ToolExecution>,
    questions: VecDeque<PendingQuestion>,
    messages: VecDeque<String>,
    next_id: u64,
}

impl BridgeState {
    /// Force the streaming flag on. Idempotent: the turn-start timestamp is
    /// recorded once and never overwritten mid-turn. Returns whether this
    /// call actually opened the turn.
    pub fn begin_turn(&mut self, now: DateTime<Utc>) -> bool {
        self.streaming = true;
        if self.turn_started_at.is_none() {
            self.turn_started_at = Some(now);
            true
        } else {
            false
        }
    }

    /// End the turn. Returns the buffered events to flush, or `None` when
    /// the engine was not streaming; firing `turn.end` while idle must not
    /// trigger a spurious flush.
    pub fn end_turn(&mut self) -> Option<Vec<BridgeEvent>> {
        if !self.streaming {
            return None;
        }
        self.streaming = false;
        self.turn_started_at = None;
        Some(std::mem::take(&mut self.buffered))
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn turn_started_at(&self) -> Option<DateTime<Utc>> {
        self.turn_started_at
    }

    /// Route a display event: buffered while streaming, passed through for
    /// immediate delivery otherwise.
    pub fn route(&mut self, event: BridgeEvent) -> Option<BridgeEvent> {
        if self.streaming {
            self.buffered.push(event);
            None
        } else {
            Some(event)
        }
    }

    // ------------------------------------------------------------------------
    // Tool execution tracking
    // ------------------------------------------------------------------------

    pub fn tool_dispatched(&mut self, label: &str, now: DateTime<Utc>) -> ToolExecution {
        let id = self.next_id();
        let execution = ToolExecution {
            id,
            label: label.to_string(),
            state: ToolState::Pending,
            started_at: now,
            finished_at: None,
        };
        self.tools.insert(id, execution.clone());
        execution
    }

    pub fn tool_running(&mut self, id: u64) -> Option<ToolExecution> {
        let execution = self.tools.get_mut(&id)?;
        execution.state = ToolState::Running;
        Some(execution.clone())
    }

    pub fn tool_finished(&mut self, id: u64, ok: bool, now: DateTime<Utc>) -> Option<ToolExecution> {
        let execution = self.tools.get_mut(&id)?;
        execution.state = if ok {
            ToolState::Completed
        } else {
            ToolState::Error
        };
        execution.finished_at = Some(now);
        Some(execution.clone())
    }

    /// Live executions (pending or running), in dispatch order.
    pub fn in_flight(&self) -> Vec<ToolExecution> {
        let mut live: Vec<ToolExecution> = self
            .tools
            .values()
            .filter(|e| matches!(e.state, ToolState::Pending | ToolState::Running))
            .cloned()
            .collect();
        live.sort_by_key(|e| e.id);
        live
    }

    // ------------------------------------------------------------------------
    // Question queue
    // ------------------------------------------------------------------------

    /// Enqueue a question. Returns `(id, text)` when the question became the
    /// queue head and should be surfaced now.
    pub fn enqueue_question(
        &mut self,
        text: &str,
        reply: oneshot::Sender<String>,
    ) -> Option<(u64, String)> {
        let id = self.next_id();
        let became_head = self.questions.is_empty();
        self.questions.push_back(PendingQuestion {
            id,
            text: text.to_string(),
            reply,
        });
        became_head.then(|| (id, text.to_string()))
    }

    /// Answer the head question. Returns the next question to surface, if
    /// any. Answering with an empty queue is a no-op.
    pub fn answer_question(&mut self, answer: &str) -> Option<(u64, String)> {
        let head = self.questions.pop_front()?;
        // Receiver may be gone; the queue still advances.
        let _ = head.reply.send(answer.to_string());
        self.questions
            .front()
            .map(|next| (next.id, next.text.clone()))
    }

    /// The currently surfaced question, if any. Only the head is visible.
    pub fn current_question(&self) -> Option<(u64, &str)> {
        self.questions.front().map(|q| (q.id, q.text.as_str()))
    }

    // ------------------------------------------------------------------------
    // Message queue
    // ------------------------------------------------------------------------

    /// Accept user input: queued while streaming, dispatched when idle.
    pub fn submit_input(&mut self, text: &str) -> Submission {
        if self.streaming {
            self.messages.push_back(text.to_string());
            Submission::Queued(self.messages.len())
        } else {
            Submission::Dispatched
        }
    }

    pub fn pop_message(&mut self) -> Option<String> {
        self.messages.pop_front()
    }

    pub fn queued_messages(&self) -> usize {
        self.messages.len()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

// ============================================================================
// Streaming Event Bridge
// ============================================================================

/// Receiving ends handed to the front end
pub struct BridgeHandles {
    /// Display events
    pub events: mpsc::UnboundedReceiver<BridgeEvent>,
    /// User messages released from the queue for dispatch
    pub inputs: mpsc::UnboundedReceiver<String>,
}

/// Channel-backed wrapper around [`BridgeState`].
///
/// Clones share one state; lifecycle and tool-status events go out
/// immediately, while text/snapshot events batch during a turn and flush on
/// `turn_end`.
#[derive(Clone)]
pub struct StreamingEventBridge {
    state: Arc<Mutex<BridgeState>>,
    events_tx: mpsc::UnboundedSender<BridgeEvent>,
    inputs_tx: mpsc::UnboundedSender<String>,
    dispatch_delay: Duration,
}

impl StreamingEventBridge {
    pub fn new(dispatch_delay: Duration) -> (Self, BridgeHandles) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        (
            Self {
                state: Arc::new(Mutex::new(BridgeState::default())),
                events_tx,
                inputs_tx,
                dispatch_delay,
            },
            BridgeHandles {
                events: events_rx,
                inputs: inputs_rx,
            },
        )
    }

    /// Safety-net signal that the engine is actively streaming.
    pub fn turn_start(&self) {
        let opened = {
            let mut state = self.state.lock().unwrap();
            let now = Utc::now();
            state.begin_turn(now).then_some(now)
        };
        if let Some(at) = opened {
            self.send(BridgeEvent::TurnStarted { at });
        }
    }

    /// Close the turn: flush batched events and release queued user input,
    /// one message per fixed delay. A no-op when the engine was idle.
    pub async fn turn_end(&self) {
        let flushed = self.state.lock().unwrap().end_turn();
        let Some(events) = flushed else {
            return;
        };
        for event in events {
            self.send(event);
        }
        self.send(BridgeEvent::TurnEnded);
        self.drain_queued_inputs().await;
    }

    /// Dispatch queued messages in FIFO order, delaying before each so the
    /// released input does not visually collide with the just-finished turn.
    async fn drain_queued_inputs(&self) {
        loop {
            let message = self.state.lock().unwrap().pop_message();
            let Some(message) = message else {
                break;
            };
            tokio::time::sleep(self.dispatch_delay).await;
            let _ = self.inputs_tx.send(message);
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.state.lock().unwrap().is_streaming()
    }

    pub fn turn_started_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().unwrap().turn_started_at()
    }

    /// Publish a display event (batched while streaming).
    pub fn publish(&self, event: BridgeEvent) {
        let pass_through = self.state.lock().unwrap().route(event);
        if let Some(event) = pass_through {
            self.send(event);
        }
    }

    /// Accept user input from the front end.
    pub fn submit_input(&self, text: &str) -> Submission {
        let submission = self.state.lock().unwrap().submit_input(text);
        if submission == Submission::Dispatched {
            let _ = self.inputs_tx.send(text.to_string());
        }
        submission
    }

    // ------------------------------------------------------------------------
    // Tool execution tracking
    // ------------------------------------------------------------------------

    pub fn tool_dispatched(&self, label: &str) -> u64 {
        let execution = self
            .state
            .lock()
            .unwrap()
            .tool_dispatched(label, Utc::now());
        let id = execution.id;
        self.send(BridgeEvent::ToolStatus { execution });
        id
    }

    pub fn tool_running(&self, id: u64) {
        if let Some(execution) = self.state.lock().unwrap().tool_running(id) {
            self.send(BridgeEvent::ToolStatus { execution });
        }
    }

    pub fn tool_finished(&self, id: u64, ok: bool) {
        if let Some(execution) = self.state.lock().unwrap().tool_finished(id, ok, Utc::now()) {
            self.send(BridgeEvent::ToolStatus { execution });
        }
    }

    pub fn in_flight_tools(&self) -> Vec<ToolExecution> {
        self.state.lock().unwrap().in_flight()
    }

    // ------------------------------------------------------------------------
    // Human-in-the-loop questions
    // ------------------------------------------------------------------------

    /// Queue a question for the user; resolves with the answer.
    pub fn ask(&self, text: &str) -> oneshot::Receiver<String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let surfaced = self.state.lock().unwrap().enqueue_question(text, reply_tx);
        if let Some((id, text)) = surfaced {
            self.send(BridgeEvent::QuestionSurfaced { id, text });
        }
        reply_rx
    }

    /// Answer the currently surfaced question; the next pending question,
    /// if any, surfaces immediately without a fresh signal.
    pub fn answer(&self, answer: &str) {
        let next = self.state.lock().unwrap().answer_question(answer);
        if let Some((id, text)) = next {
            self.send(BridgeEvent::QuestionSurfaced { id, text });
        }
    }

    pub fn current_question(&self) -> Option<(u64, String)> {
        self.state
            .lock()
            .unwrap()
            .current_question()
            .map(|(id, text)| (id, text.to_string()))
    }

    fn send(&self, event: BridgeEvent) {
        // Receiver may have dropped in headless runs; that is fine.
        let _ = self.events_tx.send(event);
    }
}

// ============================================================================
// Tests
// ============================================================================
