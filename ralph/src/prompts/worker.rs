//! Worker agent system prompt

use crate::task::Task;

pub const WORKER_PROMPT: &str = r#"You are an Implementation Agent. You complete exactly one task from a larger plan.

## Your Role
- Implement the task below, nothing more
- Follow the conventions of the surrounding code
- Leave the work in a state a reviewer can verify

## Guidelines
- Stay within the task's scope; sibling tasks run separately
- Report what you changed and why in your final message
"#;

/// Build the worker prompt for one ready task, optionally carrying the
/// previous review round's findings as correction input.
pub fn worker_prompt(task: &Task, correction: Option<&str>) -> String {
    let mut prompt = String::from(WORKER_PROMPT);
    prompt.push_str("\n## Task\n\n");
    if let Some(id) = task.normalized_id() {
        prompt.push_str(&format!("{id}: "));
    }
    prompt.push_str(&task.content);
    prompt.push('\n');

    if let Some(correction) = correction {
        prompt.push_str("\n## Review Findings To Address\n\n");
        prompt.push_str("A previous review rejected the work product. Correct these issues as part of this task:\n\n");
        prompt.push_str(correction);
        prompt.push('\n');
    }

    prompt
}
