//! Front-end boundary
//!
//! The engine never hands the UI a live reference into its state: every
//! update crosses this seam as an owned snapshot. Sinks are synchronous and
//! invoked strictly outside each phase's timed window, so a slow sink delays
//! display, never phase durations.

use crate::bridge::{BridgeEvent, StreamingEventBridge};
use crate::phase::Phase;
use crate::task::Task;

/// Synchronous sink for engine-side UI callbacks
pub trait UiSink: Send + Sync {
    /// Replace the displayed task list with a fresh snapshot.
    fn set_todo_items(&self, tasks: &[Task]);

    /// Surface a phase transition.
    fn phase_update(&self, phase: &Phase);
}

/// Sink that forwards snapshots through the bridge's event channel
pub struct ChannelUi {
    bridge: StreamingEventBridge,
}

impl ChannelUi {
    pub fn new(bridge: StreamingEventBridge) -> Self {
        Self { bridge }
    }
}

impl UiSink for ChannelUi {
    fn set_todo_items(&self, tasks: &[Task]) {
        self.bridge.publish(BridgeEvent::TaskSnapshot {
            tasks: tasks.to_vec(),
        });
    }

    fn phase_update(&self, phase: &Phase) {
        self.bridge.publish(BridgeEvent::PhaseUpdate {
            phase: phase.clone(),
        });
    }
}

/// Sink that drops everything (headless runs)
pub struct NullUi;

impl UiSink for NullUi {
    fn set_todo_items(&self, _tasks: &[Task]) {}
    fn phase_update(&self, _phase: &Phase) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_channel_ui_pushes_snapshots() {
        let (bridge, mut handles) = StreamingEventBridge::new(Duration::from_millis(1));
        let ui = ChannelUi::new(bridge);

        ui.set_todo_items(&[Task::new("snapshot me")]);

        match handles.events.try_recv().unwrap() {
            BridgeEvent::TaskSnapshot { tasks } => {
                assert_eq!(tasks.len(), 1);
                assert_eq!(tasks[0].content, "snapshot me");
            }
            other => panic!("expected TaskSnapshot, got {other:?}"),
        }
    }
}
