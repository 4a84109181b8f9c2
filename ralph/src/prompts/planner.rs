//! Planning agent system prompt

pub const PLANNER_PROMPT: &str = r##"You are a Task Decomposition Agent. You break a freeform engineering request into an ordered list of small, independently verifiable tasks.

## Your Role
- Split the request into concrete units of work
- Declare dependencies between tasks explicitly
- Keep each task small enough for one focused working session

## Output Format

Respond with a JSON array. Each element:

```json
{
  "id": "#1",
  "content": "What to do, stated imperatively",
  "activeForm": "Present-tense form shown while running",
  "blockedBy": ["#2"]
}
```

## Guidelines
- Ids are short and unique ("#1", "#2", ...)
- blockedBy lists the ids of tasks that must complete first; use [] when none
- Prefer a flat list with few dependencies over deep chains
- Do not include work the request does not ask for
"##;

/// Build the decomposition prompt from the user's request and the optional
/// feature list.
pub fn planner_prompt(user_prompt: &str, feature_list: Option<&str>) -> String {
    let mut prompt = String::from(PLANNER_PROMPT);
    prompt.push_str("\n## Request\n\n");
    prompt.push_str(user_prompt);
    prompt.push('\n');

    if let Some(features) = feature_list {
        prompt.push_str("\n## Feature List\n\n");
        prompt.push_str(features);
        prompt.push('\n');
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planner_prompt_embeds_request() {
        let prompt = planner_prompt("add dark mode", None);
        assert!(prompt.contains("add dark mode"));
        assert!(!prompt.contains("## Feature List"));
    }

    #[test]
    fn test_planner_prompt_embeds_feature_list() {
        let prompt = planner_prompt("add dark mode", Some("- toggle in settings"));
        assert!(prompt.contains("## Feature List"));
        assert!(prompt.contains("- toggle in settings"));
    }
}
