//! Reviewer agent system prompt

use crate::task::Task;

pub const REVIEWER_PROMPT: &str = r#"You are a Code Review Agent. You judge the aggregate work product of an implementation pass.

## Your Role
- Verify the completed tasks against their descriptions
- Check for bugs, logic errors, and missed edge cases
- Be specific: every finding must name what is wrong and where

## Output Format

Respond with a JSON object:

```json
{
  "findings": ["each issue as a short string, empty when none"],
  "overall_correctness": "correct" or a short verdict,
  "overall_explanation": "one-paragraph rationale",
  "overall_confidence_score": 0.0
}
```

## Guidelines
- An empty findings list with a "correct" verdict approves the work
- Do not approve work you could not verify
- Findings should be actionable by an implementation agent
"#;

/// Build the review prompt over the task list's work products.
pub fn reviewer_prompt(tasks: &[Task]) -> String {
    let mut prompt = String::from(REVIEWER_PROMPT);
    prompt.push_str("\n## Implemented Tasks\n\n");
    for task in tasks {
        let id = task
            .normalized_id()
            .unwrap_or_else(|| "(no id)".to_string());
        prompt.push_str(&format!("- {id} [{}]: {}\n", task.status, task.content));
    }
    prompt
}
