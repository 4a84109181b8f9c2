//! Dependency resolution and scheduling order for the task list
//!
//! Both operations here are pure and tolerant. Malformed graphs (duplicate
//! ids, dangling blocker references, cycles) degrade to a best-effort order
//! with the untouched tail appended in original relative order; they never
//! fail the whole batch.

use std::collections::{HashMap, VecDeque};

use crate::task::{Task, TaskStatus};

/// Map of uniquely-resolvable normalized id -> task index.
///
/// An id shared by more than one task resolves to nothing: neither holder
/// can be addressed unambiguously.
fn resolution_map(tasks: &[Task]) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for task in tasks {
        if let Some(id) = task.normalized_id() {
            *counts.entry(id).or_insert(0) += 1;
        }
    }

    let mut map = HashMap::new();
    for (index, task) in tasks.iter().enumerate() {
        if let Some(id) = task.normalized_id() {
            if counts.get(&id) == Some(&1) {
                map.insert(id, index);
            }
        }
    }
    map
}

/// Return tasks ordered so every task appears after all tasks in its
/// resolved blocker set.
///
/// A task is *unresolvable* when its own id is missing or duplicated, or
/// when any of its normalized blockers does not name a known task. Kahn's
/// algorithm runs over the resolvable subset only; everything excluded from
/// the pass (unresolvable tasks and cycle members, which never reach
/// indegree zero) is appended after the sorted prefix in original relative
/// order. Inputs of length <= 1 are returned unchanged.
pub fn topological_order(tasks: &[Task]) -> Vec<Task> {
    if tasks.len() <= 1 {
        return tasks.to_vec();
    }

    let by_id = resolution_map(tasks);
    let n = tasks.len();

    // Per-task resolved blocker indices; None marks the task unresolvable.
    let mut blockers: Vec<Option<Vec<usize>>> = Vec::with_capacity(n);
    for (index, task) in tasks.iter().enumerate() {
        let own = task.normalized_id().and_then(|id| by_id.get(&id).copied());
        if own != Some(index) {
            blockers.push(None);
            continue;
        }

        let mut resolved = Vec::new();
        let mut ok = true;
        for blocker in task.normalized_blockers() {
            match by_id.get(&blocker) {
                Some(&blocker_index) => resolved.push(blocker_index),
                None => {
                    ok = false;
                    break;
                }
            }
        }
        blockers.push(if ok { Some(resolved) } else { None });
    }

    // Kahn over the resolvable subset; edges run blocker -> dependent and
    // only count when both endpoints are in the subset.
    let mut indegree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (index, resolved) in blockers.iter().enumerate() {
        if let Some(resolved) = resolved {
            for &blocker_index in resolved {
                if blockers[blocker_index].is_some() {
                    indegree[index] += 1;
                    dependents[blocker_index].push(index);
                }
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..n)
        .filter(|&i| blockers[i].is_some() && indegree[i] == 0)
        .collect();
    let mut sorted = Vec::new();
    while let Some(index) = queue.pop_front() {
        sorted.push(index);
        for &dependent in &dependents[index] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    let mut placed = vec![false; n];
    for &index in &sorted {
        placed[index] = true;
    }

    let mut ordered: Vec<Task> = sorted.iter().map(|&i| tasks[i].clone()).collect();
    let excluded = n - ordered.len();
    for (index, task) in tasks.iter().enumerate() {
        if !placed[index] {
            ordered.push(task.clone());
        }
    }

    if excluded > 0 {
        tracing::debug!(
            excluded,
            total = n,
            "topological order degraded; unresolved tasks appended unsorted"
        );
    }

    ordered
}

/// Indices of tasks whose every prerequisite is satisfied.
///
/// A task is ready when it is pending and each of its normalized blockers
/// resolves to a completed task. A blocker that cannot be resolved (missing
/// or duplicated id) keeps its dependent out of the frontier.
pub fn ready_indices(tasks: &[Task]) -> Vec<usize> {
    let by_id = resolution_map(tasks);
    tasks
        .iter()
        .enumerate()
        .filter(|(_, task)| task.status == TaskStatus::Pending)
        .filter(|(_, task)| {
            task.normalized_blockers().iter().all(|blocker| {
                by_id
                    .get(blocker)
                    .map(|&i| tasks[i].status == TaskStatus::Completed)
                    .unwrap_or(false)
            })
        })
        .map(|(index, _)| index)
        .collect()
}

/// Ready tasks in original order; see [`ready_indices`].
pub fn ready_tasks(tasks: &[Task]) -> Vec<Task> {
    ready_indices(tasks)
        .into_iter()
        .map(|i| tasks[i].clone())
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
