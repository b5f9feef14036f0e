//! Obra — CLI entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use obra_store::{Filter, IndexValue, Store};
use tracing::{debug, info};

use obra::agent::subprocess::SubprocessAgentDriver;
use obra::agent::{AgentConfig, AgentDriver};
use obra::cli::{Cli, Command, ConfigCommand, EpicCommand, ExitCode, MilestoneCommand, ProjectCommand, StoryCommand, TaskCommand};
use obra::decision::DecisionThresholds;
use obra::domain::{InjectedDirective, Milestone, Project, Task, TaskStatus, TaskType};
use obra::llm::cli::CliGateway;
use obra::llm::ollama::OllamaGateway;
use obra::llm::LlmGateway;
use obra::persistence::Persistence;
use obra::retry::RetryConfig;
use obra::session_manager::{ContextWindowConfig, SessionManager};
use obra::{Config, ControllerTaskRunner, EventBus, Orchestrator, TaskRunner};

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
    Ok(())
}

fn store_path(project_dir: &std::path::Path) -> PathBuf {
    project_dir.join(".obra").join("store.db")
}

fn build_llm_gateway(config: &Config) -> Arc<dyn LlmGateway> {
    match config.llm.kind.as_str() {
        "external-cli" => Arc::new(CliGateway::new(config.llm.api_url.clone(), Vec::new(), std::time::Duration::from_secs(60))),
        _ => Arc::new(OllamaGateway::new(config.llm.api_url.clone(), config.llm.model.clone())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    let project_dir = std::env::current_dir().context("resolving current directory")?;
    let overrides: Vec<(String, String)> = cli
        .set
        .iter()
        .filter_map(|kv| kv.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())))
        .collect();
    let config = Config::load(cli.config.as_deref(), &project_dir, cli.profile.as_deref(), &overrides)
        .context("loading configuration")?;

    let db_path = store_path(&project_dir);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("creating .obra directory")?;
    }
    let store = Store::open(&db_path).await.context("opening store")?;

    let exit_code = match cli.command {
        Command::Project { command } => cmd_project(&store, command).await?,
        Command::Epic { command } => cmd_epic(&store, &config, command).await?,
        Command::Story { command } => cmd_story(&store, command).await?,
        Command::Task { command } => cmd_task(&store, &config, command).await?,
        Command::Milestone { command } => cmd_milestone(&store, command).await?,
        Command::Config { command } => {
            cmd_config(&config, command)?;
            ExitCode::Completed
        }
        Command::Resume { task_id, message } => {
            info!(%task_id, %message, "main: resume requested (not yet wired to a paused session)");
            ExitCode::Completed
        }
    };

    std::process::exit(exit_code as i32);
}

async fn cmd_project(store: &Store, command: ProjectCommand) -> Result<ExitCode> {
    match command {
        ProjectCommand::Create { name, working_dir } => {
            let project = Project::new(name, working_dir, serde_json::Value::Null);
            store.put(&project).await.context("persisting project")?;
            println!("created project {}", project.id);
            Ok(ExitCode::Completed)
        }
    }
}

async fn cmd_epic(store: &Store, config: &Config, command: EpicCommand) -> Result<ExitCode> {
    match command {
        EpicCommand::Create { title, project, description, priority } => {
            let mut task = Task::new(&project, TaskType::Epic, title, description.unwrap_or_default(), priority);
            task.epic_id = Some(task.id.clone());
            store.put(&task).await.context("persisting epic")?;
            println!("created epic {}", task.id);
            Ok(ExitCode::Completed)
        }
        EpicCommand::Execute { id } => run_project_tasks(store, config, &id).await,
    }
}

async fn cmd_story(store: &Store, command: StoryCommand) -> Result<ExitCode> {
    match command {
        StoryCommand::Create { title, epic, project, depends_on } => {
            let mut task = Task::new(&project, TaskType::Story, title, "", 5);
            task.epic_id = Some(epic);
            task.depends_on = depends_on;
            store.put(&task).await.context("persisting story")?;
            println!("created story {}", task.id);
            Ok(ExitCode::Completed)
        }
    }
}

async fn cmd_task(store: &Store, config: &Config, command: TaskCommand) -> Result<ExitCode> {
    match command {
        TaskCommand::Create { title, project, story, depends_on } => {
            let mut task = Task::new(&project, TaskType::Task, title, "", 5);
            task.story_id = story;
            task.depends_on = depends_on;
            store.put(&task).await.context("persisting task")?;
            println!("created task {}", task.id);
            Ok(ExitCode::Completed)
        }
        TaskCommand::Execute { id, max_iterations, stream: _, interactive: _ } => {
            execute_single_task(store, config, &id, max_iterations).await
        }
        TaskCommand::Inject { id, to_impl, to_orch } => {
            let task: Task = store.require(&id).await.context("loading task")?;
            if to_impl.is_none() && to_orch.is_none() {
                println!("nothing to inject: pass --to-impl and/or --to-orch");
                return Ok(ExitCode::Completed);
            }
            if let Some(text) = to_impl {
                let directive = InjectedDirective::to_impl(&task.project_id, &task.id, text);
                store.put(&directive).await.context("persisting to-impl directive")?;
                info!(task_id = %id, directive_id = %directive.id, "main: to-impl directive captured");
            }
            if let Some(text) = to_orch {
                let directive = InjectedDirective::to_orch(&task.project_id, &task.id, text);
                store.put(&directive).await.context("persisting to-orch directive")?;
                info!(task_id = %id, directive_id = %directive.id, intent = ?directive.intent, "main: to-orch directive captured");
            }
            println!("directive queued for task {}", task.id);
            Ok(ExitCode::Completed)
        }
    }
}

async fn cmd_milestone(store: &Store, command: MilestoneCommand) -> Result<ExitCode> {
    match command {
        MilestoneCommand::Create { name, project, epics } => {
            let milestone = Milestone::new(project, name, epics);
            store.put(&milestone).await.context("persisting milestone")?;
            println!("created milestone {}", milestone.id);
            Ok(ExitCode::Completed)
        }
        MilestoneCommand::Check { id } | MilestoneCommand::Achieve { id } => {
            let mut milestone: Milestone = store.require(&id).await.context("loading milestone")?;
            let mut statuses = std::collections::HashMap::new();
            for epic_id in &milestone.required_epic_ids {
                if let Ok(task) = store.require::<Task>(epic_id).await {
                    statuses.insert(epic_id.clone(), task.status);
                }
            }
            milestone.evaluate(&statuses);
            store.put(&milestone).await.context("persisting milestone")?;
            println!("milestone {} achieved={}", milestone.id, milestone.achieved);
            Ok(ExitCode::Completed)
        }
    }
}

fn cmd_config(config: &Config, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            println!("{}", serde_yaml::to_string(config).context("serializing config")?);
        }
        ConfigCommand::Validate => {
            println!("configuration is valid");
        }
    }
    Ok(())
}

fn build_runner(store: Store, config: &Config, emitter: obra::EventEmitter) -> Arc<dyn TaskRunner> {
    let sessions = SessionManager::new(
        store.clone(),
        ContextWindowConfig {
            limit: config.session.context_window.limit,
            warning_threshold: config.session.context_window.warning_threshold,
            refresh_threshold: config.session.context_window.refresh_threshold,
            critical_threshold: config.session.context_window.critical_threshold,
        },
    );
    let thresholds = DecisionThresholds {
        quality_proceed_threshold: config.decision_engine.quality_proceed_threshold,
        quality_critical_threshold: config.decision_engine.quality_critical_threshold,
    };
    let retry_config = RetryConfig {
        max_retries: config.retry.max_retries,
        base_delay_ms: (config.retry.base_delay * 1000.0) as u64,
        max_delay_ms: (config.retry.max_delay * 1000.0) as u64,
        backoff_factor: config.retry.backoff_factor,
    };
    let controller = Arc::new(obra::controller::IterationController::new(
        store,
        sessions,
        emitter,
        thresholds,
        retry_config,
        config.session.context_window.limit,
    ));

    let agent_config = AgentConfig {
        command: config.agent.command.clone(),
        args: Vec::new(),
        working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        stability_window: std::time::Duration::from_millis(500),
        response_timeout: std::time::Duration::from_secs(config.agent.response_timeout),
    };
    let agent_factory: Arc<dyn Fn() -> Box<dyn AgentDriver> + Send + Sync> =
        Arc::new(|| Box::new(SubprocessAgentDriver::new(None)) as Box<dyn AgentDriver>);

    let llm = build_llm_gateway(config);
    Arc::new(ControllerTaskRunner { controller, agent_factory, agent_config: Some(agent_config), llm })
}

async fn execute_single_task(store: &Store, config: &Config, id: &str, max_iterations: u32) -> Result<ExitCode> {
    let task: Task = store.require(id).await.context("loading task")?;
    if task.status.is_terminal() {
        return Ok(ExitCode::from(task.status));
    }
    if task.status == TaskStatus::Blocked {
        return Ok(ExitCode::BlockedByDependency);
    }

    let bus = EventBus::new();
    let emitter = bus.emitter_for(&task.id);
    let runner = build_runner(store.clone(), config, emitter);
    let result = runner.run_task(task, max_iterations).await.context("running task")?;
    println!("task finished: status={:?} iterations={} quality={:.2}", result.status, result.iterations, result.quality);
    Ok(ExitCode::from(result.status))
}

async fn run_project_tasks(store: &Store, config: &Config, epic_id: &str) -> Result<ExitCode> {
    let epic: Task = store.require(epic_id).await.context("loading epic")?;
    let persistence = Persistence::new(store.clone());
    let bus = EventBus::new();
    let runner = build_runner(store.clone(), config, bus.emitter_for(&epic.project_id));
    let orchestrator = Orchestrator::new(store.clone(), runner, 4, config.task_dependencies.cascade_failures);

    orchestrator.recover_interrupted_tasks(&epic.project_id).await.context("recovering interrupted tasks")?;

    let mut worst = ExitCode::Completed;
    loop {
        let spawned = orchestrator.spawn_ready(&epic.project_id, config.orchestration.max_turns.default).await?;
        let finished = orchestrator.reap_completed().await;
        if spawned.is_empty() && finished.is_empty() {
            let remaining: Vec<Task> = store
                .query(&[Filter::eq("project_id", IndexValue::String(epic.project_id.clone()))])
                .await?;
            if remaining.iter().all(|t| t.status.is_terminal()) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(250)).await;
            continue;
        }
        for (task_id, result) in finished {
            match result {
                Ok(r) if r.status != TaskStatus::Completed => {
                    orchestrator.on_task_failed(&epic.project_id, &task_id).await?;
                    worst = ExitCode::from(r.status);
                }
                Err(_) => {
                    orchestrator.on_task_failed(&epic.project_id, &task_id).await?;
                    worst = ExitCode::Failed;
                }
                _ => {}
            }
        }
    }
    orchestrator.shutdown().await;

    let children = persistence.epic_children(epic_id).await?;
    if children.iter().any(|t| t.status == TaskStatus::Escalated) && worst as i32 == ExitCode::Completed as i32 {
        worst = ExitCode::Escalated;
    }
    debug!(epic_id, "run_project_tasks: finished");
    Ok(worst)
}
