//! Dispatches a parsed `Commands` against a wired `Core`, producing the
//! exit code spec §6 specifies: 0 success, 1 operational failure, 2 input
//! error (a malformed id, not a collaborator rejecting a well-formed one).

use ymera_types::{AgentId, ExecutionId, TaskId};

use crate::cli::{AgentCommand, Commands, MigrateDirection, TaskCommand, WorkflowCommand};
use crate::facade::Core;

pub enum Outcome {
    Success(String),
    InputError(String),
    OperationError(String),
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Success(_) => 0,
            Outcome::OperationError(_) => 1,
            Outcome::InputError(_) => 2,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Outcome::Success(m) | Outcome::OperationError(m) | Outcome::InputError(m) => m,
        }
    }
}

fn parse_uuid_id<T, F: FnOnce(uuid::Uuid) -> T>(raw: &str, label: &str, wrap: F) -> Result<T, Outcome> {
    uuid::Uuid::parse_str(raw)
        .map(wrap)
        .map_err(|_| Outcome::InputError(format!("'{raw}' is not a valid {label} id")))
}

pub async fn dispatch(core: &Core, command: Commands) -> Outcome {
    match command {
        Commands::Migrate { direction } => migrate(direction),
        Commands::Agent { command } => agent(core, command).await,
        Commands::Task { command } => task(core, command),
        Commands::Workflow { command } => workflow(core, command).await,
    }
}

fn migrate(direction: MigrateDirection) -> Outcome {
    let verb = match direction {
        MigrateDirection::Up => "up",
        MigrateDirection::Down => "down",
    };
    Outcome::Success(format!(
        "no migrations to run: the in-process core keeps no relational schema (migrate {verb} is a no-op here)"
    ))
}

async fn agent(core: &Core, command: AgentCommand) -> Outcome {
    match command {
        AgentCommand::List => {
            let agents = core.registry.all();
            match serde_json::to_string_pretty(&agents) {
                Ok(json) => Outcome::Success(json),
                Err(e) => Outcome::OperationError(format!("failed to render agents: {e}")),
            }
        }
        AgentCommand::Inspect { id } => match core.registry.get(&AgentId::new(id.clone())) {
            Some(agent) => serde_json::to_string_pretty(&agent)
                .map(Outcome::Success)
                .unwrap_or_else(|e| Outcome::OperationError(format!("failed to render agent: {e}"))),
            None => Outcome::OperationError(format!("agent '{id}' not found")),
        },
        AgentCommand::Suspend { id } => {
            let agent_id = AgentId::new(id);
            match core.agent_manager.suspend(&agent_id, "cli suspend", "cli", None).await {
                Ok(agent) => Outcome::Success(format!("{} suspended (state={:?})", agent.agent_id, agent.state)),
                Err(e) => Outcome::OperationError(e.to_string()),
            }
        }
        AgentCommand::Activate { id } => {
            let agent_id = AgentId::new(id);
            match core.agent_manager.activate(&agent_id, "cli activate", "cli").await {
                Ok(agent) => Outcome::Success(format!("{} activated (state={:?})", agent.agent_id, agent.state)),
                Err(e) => Outcome::OperationError(e.to_string()),
            }
        }
    }
}

fn task(core: &Core, command: TaskCommand) -> Outcome {
    match command {
        TaskCommand::List => {
            let ids = core.orchestrator.active_task_ids();
            Outcome::Success(
                ids.iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
        }
        TaskCommand::Inspect { id } => {
            let task_id = match parse_uuid_id(&id, "task", TaskId::from) {
                Ok(id) => id,
                Err(outcome) => return outcome,
            };
            match core.get_task_result(&task_id) {
                Some(result) => serde_json::to_string_pretty(&result)
                    .map(Outcome::Success)
                    .unwrap_or_else(|e| Outcome::OperationError(format!("failed to render task: {e}"))),
                None => Outcome::OperationError(format!("task '{id}' has no result yet (still active or unknown)")),
            }
        }
        TaskCommand::Cancel { id } => {
            let task_id = match parse_uuid_id(&id, "task", TaskId::from) {
                Ok(id) => id,
                Err(outcome) => return outcome,
            };
            if core.cancel_task(task_id) {
                Outcome::Success(format!("task {id} cancelled"))
            } else {
                Outcome::OperationError(format!("task '{id}' could not be cancelled (not found or already terminal)"))
            }
        }
    }
}

async fn workflow(core: &Core, command: WorkflowCommand) -> Outcome {
    match command {
        WorkflowCommand::List => {
            let ids = core.workflow_engine.active_execution_ids();
            Outcome::Success(ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join("\n"))
        }
        WorkflowCommand::Inspect { id } => {
            let execution_id = match parse_uuid_id(&id, "workflow execution", ExecutionId::from) {
                Ok(id) => id,
                Err(outcome) => return outcome,
            };
            match core.workflow_engine.get_execution(&execution_id) {
                Some(execution) => serde_json::to_string_pretty(&execution)
                    .map(Outcome::Success)
                    .unwrap_or_else(|e| Outcome::OperationError(format!("failed to render workflow: {e}"))),
                None => Outcome::OperationError(format!("workflow execution '{id}' not found")),
            }
        }
        WorkflowCommand::Cancel { id } => {
            let execution_id = match parse_uuid_id(&id, "workflow execution", ExecutionId::from) {
                Ok(id) => id,
                Err(outcome) => return outcome,
            };
            if core.cancel_workflow(execution_id).await {
                Outcome::Success(format!("workflow execution {id} cancelled"))
            } else {
                Outcome::OperationError(format!("workflow execution '{id}' could not be cancelled (not found or already terminal)"))
            }
        }
    }
}
