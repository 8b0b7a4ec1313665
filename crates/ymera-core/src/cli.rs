//! Operational CLI surface (spec §6): `migrate`, `agent`, `task`,
//! `workflow`. Mirrors `cli/src/main.rs`'s `clap` derive structure, scoped
//! down to the subcommands the core itself owns — the HTTP surface and
//! waiver/provenance tooling the teacher's CLI also exposes are external
//! collaborators (spec §1), not reproduced here.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "ymera")]
#[command(about = "YMERA agent control plane: operational CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a configuration file layered over defaults and environment.
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Schema migration for the persisted-state layer. The core keeps no
    /// relational schema of its own (spec §1: migration tooling is an
    /// external collaborator) so these are reported as no-ops.
    Migrate {
        #[command(subcommand)]
        direction: MigrateDirection,
    },

    /// Agent lifecycle inspection and control.
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },

    /// Task inspection and cancellation.
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },

    /// Workflow execution inspection and cancellation.
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum MigrateDirection {
    Up,
    Down,
}

#[derive(Debug, Subcommand)]
pub enum AgentCommand {
    List,
    Inspect { id: String },
    Suspend { id: String },
    Activate { id: String },
}

#[derive(Debug, Subcommand)]
pub enum TaskCommand {
    List,
    Inspect { id: String },
    Cancel { id: String },
}

#[derive(Debug, Subcommand)]
pub enum WorkflowCommand {
    List,
    Inspect { id: String },
    Cancel { id: String },
}
