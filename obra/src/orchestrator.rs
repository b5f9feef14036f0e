//! Multi-task Orchestrator: runs independent READY tasks concurrently,
//! single-threaded within each task, bounded by a semaphore. Grounded in
//! the teacher's `LoopManager` — same `Arc<Semaphore>` concurrency cap,
//! same `JoinHandle` task registry keyed by id, same crash-recovery scan on
//! startup and graceful-shutdown-with-timeout pattern.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use obra_store::Store;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::controller::{ControllerResult, IterationController};
use crate::domain::{Task, TaskStatus};
use crate::error::{ObraError, ObraResult};
use crate::persistence::Persistence;

/// Runs one task end-to-end; injected so the orchestrator stays agnostic to
/// how an agent/LLM pair is constructed (tests supply a mock pair, the CLI
/// wires up real ones).
#[async_trait::async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run_task(&self, task: Task, max_iterations: u32) -> ObraResult<ControllerResult>;
}

pub struct ControllerTaskRunner {
    pub controller: Arc<IterationController>,
    pub agent_factory: Arc<dyn Fn() -> Box<dyn crate::agent::AgentDriver> + Send + Sync>,
    pub agent_config: Option<crate::agent::AgentConfig>,
    pub llm: Arc<dyn crate::llm::LlmGateway>,
}

#[async_trait::async_trait]
impl TaskRunner for ControllerTaskRunner {
    async fn run_task(&self, task: Task, max_iterations: u32) -> ObraResult<ControllerResult> {
        let mut agent = (self.agent_factory)();
        if let Some(config) = &self.agent_config {
            agent
                .initialize(config.clone())
                .await
                .map_err(|e| ObraError::Transport { component: "agent_driver", source: Box::new(e) })?;
        }
        let result = self.controller.run(task, max_iterations, agent.as_mut(), self.llm.as_ref()).await;
        agent.shutdown().await;
        result
    }
}

pub struct Orchestrator {
    store: Store,
    persistence: Persistence,
    runner: Arc<dyn TaskRunner>,
    semaphore: Arc<Semaphore>,
    tasks: tokio::sync::Mutex<HashMap<String, JoinHandle<ObraResult<ControllerResult>>>>,
    shutdown_timeout: Duration,
    cascade_failures: bool,
}

impl Orchestrator {
    pub fn new(store: Store, runner: Arc<dyn TaskRunner>, max_concurrency: usize, cascade_failures: bool) -> Self {
        Self {
            persistence: Persistence::new(store.clone()),
            store,
            runner,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            tasks: tokio::sync::Mutex::new(HashMap::new()),
            shutdown_timeout: Duration::from_secs(30),
            cascade_failures,
        }
    }

    /// On startup, any task left IN_PROGRESS from a prior crash is returned
    /// to PENDING so the scheduler can re-offer it — there is no worker
    /// holding it anymore.
    pub async fn recover_interrupted_tasks(&self, project_id: &str) -> ObraResult<Vec<String>> {
        let tasks: Vec<Task> = self
            .store
            .query(&[obra_store::Filter::eq("project_id", obra_store::IndexValue::String(project_id.to_string()))])
            .await?;
        let mut recovered = Vec::new();
        for mut task in tasks.into_iter().filter(|t| t.status == TaskStatus::InProgress) {
            warn!(task_id = %task.id, "orchestrator: recovering task interrupted by crash");
            task.status = TaskStatus::Pending;
            task.touch();
            self.store.put(&task).await?;
            recovered.push(task.id);
        }
        Ok(recovered)
    }

    /// Spawns every currently-ready task in `project_id` that isn't already
    /// running, up to the concurrency cap (the semaphore enforces the cap;
    /// tasks beyond it simply await a permit inside their worker).
    pub async fn spawn_ready(&self, project_id: &str, max_iterations: u32) -> ObraResult<Vec<String>> {
        let ready = self.persistence.ready_tasks(project_id).await?;
        let mut spawned = Vec::new();
        let mut tasks = self.tasks.lock().await;
        for task in ready {
            if tasks.contains_key(&task.id) {
                continue;
            }
            let permit = self.semaphore.clone();
            let runner = self.runner.clone();
            let task_id = task.id.clone();
            let spawned_task_id = task_id.clone();

            let handle: JoinHandle<ObraResult<ControllerResult>> = tokio::spawn(async move {
                let _permit =
                    permit.acquire_owned().await.map_err(|_| ObraError::Cancellation { task_id: task_id.clone() })?;
                runner.run_task(task, max_iterations).await
            });
            spawned.push(spawned_task_id.clone());
            tasks.insert(spawned_task_id, handle);
        }
        Ok(spawned)
    }

    /// Applies cascade-block to every dependent of a terminally-failed task,
    /// called by the caller loop after observing an ESCALATED/FAILED result
    /// from `reap_completed`.
    pub async fn on_task_failed(&self, project_id: &str, task_id: &str) -> ObraResult<Vec<String>> {
        self.persistence.cascade_block(project_id, task_id, self.cascade_failures).await
    }

    /// Polls every tracked task handle, removing and returning those that
    /// have finished (mirrors the teacher's `reap_completed_tasks` poll).
    pub async fn reap_completed(&self) -> Vec<(String, ObraResult<ControllerResult>)> {
        let mut tasks = self.tasks.lock().await;
        let finished: Vec<String> = tasks.iter().filter(|(_, h)| h.is_finished()).map(|(id, _)| id.clone()).collect();
        let mut results = Vec::new();
        for id in finished {
            if let Some(handle) = tasks.remove(&id) {
                let result = match handle.await {
                    Ok(r) => r,
                    Err(join_err) => Err(ObraError::Cancellation { task_id: format!("{id} (join error: {join_err})") }),
                };
                results.push((id, result));
            }
        }
        results
    }

    pub async fn is_running(&self, task_id: &str) -> bool {
        self.tasks.lock().await.contains_key(task_id)
    }

    /// Graceful shutdown: waits up to `shutdown_timeout` for in-flight tasks
    /// to reach a natural stopping point, then aborts stragglers.
    pub async fn shutdown(&self) {
        let deadline = tokio::time::Instant::now() + self.shutdown_timeout;
        loop {
            let remaining = self.tasks.lock().await.len();
            if remaining == 0 || tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let mut tasks = self.tasks.lock().await;
        for (id, handle) in tasks.drain() {
            if !handle.is_finished() {
                warn!(task_id = %id, "orchestrator: aborting task past shutdown deadline");
                handle.abort();
            }
        }
        info!("orchestrator: shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recover_interrupted_tasks_resets_in_progress_to_pending() {
        let store = Store::open_in_memory().await.unwrap();
        let mut task = Task::new("p1", crate::domain::TaskType::Task, "A", "desc", 5);
        task.status = TaskStatus::InProgress;
        store.put(&task).await.unwrap();

        struct NoopRunner;
        #[async_trait::async_trait]
        impl TaskRunner for NoopRunner {
            async fn run_task(&self, _task: Task, _max_iterations: u32) -> ObraResult<ControllerResult> {
                unreachable!()
            }
        }

        let orchestrator = Orchestrator::new(store.clone(), Arc::new(NoopRunner), 2, true);
        let recovered = orchestrator.recover_interrupted_tasks("p1").await.unwrap();
        assert_eq!(recovered, vec![task.id.clone()]);

        let reloaded: Task = store.require(&task.id).await.unwrap();
        assert_eq!(reloaded.status, TaskStatus::Pending);
    }
}
