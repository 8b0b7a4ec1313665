//! DAG validation for a `WorkflowDefinition` (spec §4.5): depth-first cycle
//! detection, same shape as the original's `WorkflowDefinition.validate`.

use std::collections::{HashMap, HashSet};

use ymera_types::{StepId, WorkflowDefinition, WorkflowStep};

use crate::error::WorkflowError;

pub fn validate_acyclic(definition: &WorkflowDefinition) -> Result<(), WorkflowError> {
    let steps: HashMap<&StepId, &WorkflowStep> = definition.steps.iter().map(|s| (&s.step_id, s)).collect();

    for step in &definition.steps {
        for dep in &step.dependencies {
            if !steps.contains_key(dep) {
                return Err(WorkflowError::InvalidDefinition(format!(
                    "step '{}' depends on unknown step '{}'",
                    step.step_id, dep
                )));
            }
        }
    }

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();

    for step in &definition.steps {
        if !visited.contains(&step.step_id) && has_cycle(&step.step_id, &steps, &mut visited, &mut rec_stack) {
            return Err(WorkflowError::InvalidDefinition(format!(
                "circular dependency detected in workflow '{}'",
                definition.workflow_id
            )));
        }
    }

    Ok(())
}

fn has_cycle<'a>(
    step_id: &'a StepId,
    steps: &HashMap<&'a StepId, &'a WorkflowStep>,
    visited: &mut HashSet<StepId>,
    rec_stack: &mut HashSet<StepId>,
) -> bool {
    visited.insert(step_id.clone());
    rec_stack.insert(step_id.clone());

    if let Some(step) = steps.get(step_id) {
        for dep in &step.dependencies {
            if !visited.contains(dep) {
                if has_cycle(dep, steps, visited, rec_stack) {
                    return true;
                }
            } else if rec_stack.contains(dep) {
                return true;
            }
        }
    }

    rec_stack.remove(step_id);
    false
}

/// Reverse topological order of completed steps, used for best-effort
/// rollback compensation (spec §4.5 `on_failure = ROLLBACK`).
pub fn reverse_topological_order(steps: &[WorkflowStep]) -> Vec<StepId> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let by_id: HashMap<&StepId, &WorkflowStep> = steps.iter().map(|s| (&s.step_id, s)).collect();

    fn visit<'a>(
        step_id: &'a StepId,
        by_id: &HashMap<&'a StepId, &'a WorkflowStep>,
        visited: &mut HashSet<StepId>,
        order: &mut Vec<StepId>,
    ) {
        if visited.contains(step_id) {
            return;
        }
        visited.insert(step_id.clone());
        if let Some(step) = by_id.get(step_id) {
            for dep in &step.dependencies {
                visit(dep, by_id, visited, order);
            }
        }
        order.push(step_id.clone());
    }

    for step in steps {
        visit(&step.step_id, &by_id, &mut visited, &mut order);
    }

    order.reverse();
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use ymera_types::{TaskPriority, WorkflowOnFailure};

    fn def(steps: Vec<WorkflowStep>) -> WorkflowDefinition {
        WorkflowDefinition {
            workflow_id: "wf".into(),
            steps,
            priority: TaskPriority::Normal,
            timeout_seconds: 60,
            on_failure: WorkflowOnFailure::Fail,
        }
    }

    #[test]
    fn accepts_a_diamond_dag() {
        let steps = vec![
            WorkflowStep::new("a", "cap"),
            WorkflowStep::new("b", "cap").depends_on("a"),
            WorkflowStep::new("c", "cap").depends_on("a"),
            WorkflowStep::new("d", "cap").depends_on("b").depends_on("c"),
        ];
        assert!(validate_acyclic(&def(steps)).is_ok());
    }

    #[test]
    fn rejects_a_direct_cycle() {
        let steps = vec![
            WorkflowStep::new("a", "cap").depends_on("b"),
            WorkflowStep::new("b", "cap").depends_on("a"),
        ];
        assert!(validate_acyclic(&def(steps)).is_err());
    }

    #[test]
    fn rejects_dependency_on_unknown_step() {
        let steps = vec![WorkflowStep::new("a", "cap").depends_on("ghost")];
        assert!(validate_acyclic(&def(steps)).is_err());
    }

    #[test]
    fn reverse_topo_order_visits_dependents_before_dependencies() {
        let steps = vec![
            WorkflowStep::new("a", "cap"),
            WorkflowStep::new("b", "cap").depends_on("a"),
            WorkflowStep::new("c", "cap").depends_on("b"),
        ];
        let order = reverse_topological_order(&steps);
        assert_eq!(order, vec!["c".to_string(), "b".to_string(), "a".to_string()]);
    }
}
