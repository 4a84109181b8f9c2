//! Prompts for the workflow's agent identities
//!
//! Each agent has a system prompt defining its role and output format, plus
//! a builder that threads the run's context (user prompt, feature list,
//! task records, reviewer findings) into the final prompt text.

mod planner;
mod reviewer;
mod worker;

pub use planner::{planner_prompt, PLANNER_PROMPT};
pub use reviewer::{reviewer_prompt, REVIEWER_PROMPT};
pub use worker::{worker_prompt, WORKER_PROMPT};
