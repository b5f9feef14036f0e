//! CLI command definitions and subcommands — the thin external surface over
//! the core control loop. Grounded in the teacher's `clap::Parser`
//! structure: global args marked `global = true`, nested `Subcommand`
//! enums per entity, `#[command(hide = true)]` for internal commands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Obra — local orchestrator for multi-iteration, agent-driven engineering tasks.
#[derive(Parser)]
#[command(name = "obra", about = "Drives an external coding agent through audited, multi-iteration tasks", version)]
pub struct Cli {
    /// Path to an explicit config file, bypassing the project/user fallback chain.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Named configuration profile to layer on top of the base config.
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Dotted-path config overrides, e.g. `--set decision_engine.quality_proceed_threshold=0.75`.
    #[arg(long = "set", global = true, value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },
    Epic {
        #[command(subcommand)]
        command: EpicCommand,
    },
    Story {
        #[command(subcommand)]
        command: StoryCommand,
    },
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
    Milestone {
        #[command(subcommand)]
        command: MilestoneCommand,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Internal: re-enter an interrupted breakpoint with a resume message.
    #[command(hide = true)]
    Resume {
        task_id: String,
        message: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ProjectCommand {
    Create {
        name: String,
        #[arg(long = "working-dir")]
        working_dir: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
pub enum EpicCommand {
    Create {
        title: String,
        #[arg(long)]
        project: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value_t = 5)]
        priority: u8,
    },
    Execute {
        id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum StoryCommand {
    Create {
        title: String,
        #[arg(long)]
        epic: String,
        #[arg(long)]
        project: String,
        #[arg(long = "depends-on", value_delimiter = ',')]
        depends_on: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum TaskCommand {
    Create {
        title: String,
        #[arg(long)]
        project: String,
        #[arg(long)]
        story: Option<String>,
        #[arg(long = "depends-on", value_delimiter = ',')]
        depends_on: Vec<String>,
    },
    Execute {
        id: String,
        #[arg(long = "max-iterations", default_value_t = 10)]
        max_iterations: u32,
        #[arg(long)]
        stream: bool,
        #[arg(long)]
        interactive: bool,
    },
    Inject {
        id: String,
        #[arg(long = "to-impl")]
        to_impl: Option<String>,
        #[arg(long = "to-orch")]
        to_orch: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum MilestoneCommand {
    Create {
        name: String,
        #[arg(long)]
        project: String,
        #[arg(long, value_delimiter = ',')]
        epics: Vec<String>,
    },
    Check {
        id: String,
    },
    Achieve {
        id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    Show,
    Validate,
}

/// The process exit codes `task execute` reports on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Completed = 0,
    Escalated = 2,
    Failed = 3,
    Cancelled = 4,
    BlockedByDependency = 5,
}

impl From<crate::domain::TaskStatus> for ExitCode {
    fn from(status: crate::domain::TaskStatus) -> Self {
        use crate::domain::TaskStatus;
        match status {
            TaskStatus::Completed => ExitCode::Completed,
            TaskStatus::Escalated => ExitCode::Escalated,
            TaskStatus::Cancelled => ExitCode::Cancelled,
            TaskStatus::Blocked => ExitCode::BlockedByDependency,
            _ => ExitCode::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn exit_code_maps_completed_to_zero() {
        assert_eq!(ExitCode::from(crate::domain::TaskStatus::Completed) as i32, 0);
    }

    #[test]
    fn exit_code_maps_escalated_to_two() {
        assert_eq!(ExitCode::from(crate::domain::TaskStatus::Escalated) as i32, 2);
    }

    #[test]
    fn exit_code_maps_blocked_to_five() {
        assert_eq!(ExitCode::from(crate::domain::TaskStatus::Blocked) as i32, 5);
    }
}
