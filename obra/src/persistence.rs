//! Composite queries atop `obra_store::Store` — the facade every other
//! component uses instead of hand-rolling filters.

use obra_store::{Filter, IndexValue, Store};

use crate::domain::{InjectedDirective, Iteration, Session, Task, TaskStatus};
use crate::error::ObraResult;
use crate::scheduler::DependencyGraph;

pub struct Persistence {
    pub store: Store,
}

impl Persistence {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn ready_tasks(&self, project_id: &str) -> ObraResult<Vec<Task>> {
        let tasks: Vec<Task> = self
            .store
            .query(&[Filter::eq("project_id", IndexValue::String(project_id.to_string()))])
            .await?;
        let mut graph = DependencyGraph::new();
        for task in &tasks {
            graph.add_task(&task.id, task.status);
            if task.deleted {
                graph.set_deleted(&task.id, true);
            }
        }
        for task in &tasks {
            for dep in &task.depends_on {
                let _ = graph.add_dependency(&task.id, dep);
            }
        }
        let ready_ids: std::collections::HashSet<String> = graph.ready_set().into_iter().collect();
        Ok(tasks.into_iter().filter(|t| ready_ids.contains(&t.id)).collect())
    }

    pub async fn session_usage(&self, session_id: &str) -> ObraResult<u64> {
        let session: Option<Session> = self.store.get(session_id).await?;
        Ok(session.map(|s| s.cumulative_tokens).unwrap_or(0))
    }

    pub async fn latest_iteration(&self, task_id: &str) -> ObraResult<Option<Iteration>> {
        let iterations: Vec<Iteration> = self
            .store
            .query(&[Filter::eq("task_id", IndexValue::String(task_id.to_string()))])
            .await?;
        Ok(iterations.into_iter().max_by_key(|i| i.number))
    }

    pub async fn epic_children(&self, epic_id: &str) -> ObraResult<Vec<Task>> {
        Ok(self
            .store
            .query(&[Filter::eq("epic_id", IndexValue::String(epic_id.to_string()))])
            .await?)
    }

    pub async fn dependents_of(&self, project_id: &str, task_id: &str) -> ObraResult<Vec<Task>> {
        let tasks: Vec<Task> = self
            .store
            .query(&[Filter::eq("project_id", IndexValue::String(project_id.to_string()))])
            .await?;
        Ok(tasks.into_iter().filter(|t| t.depends_on.iter().any(|d| d == task_id)).collect())
    }

    /// Unapplied directives queued against `task_id`, oldest first — the
    /// per-`(project_id, task_id)` inbox `InjectedDirective` reads from.
    pub async fn pending_directives(&self, task_id: &str) -> ObraResult<Vec<InjectedDirective>> {
        let mut pending: Vec<InjectedDirective> = self
            .store
            .query(&[
                Filter::eq("task_id", IndexValue::String(task_id.to_string())),
                Filter::eq("applied", IndexValue::Bool(false)),
            ])
            .await?;
        pending.sort_by_key(|d| d.captured_at);
        Ok(pending)
    }

    /// Marks a directive consumed so it is not re-applied on the next iteration.
    pub async fn mark_directive_applied(&self, directive: &mut InjectedDirective) -> ObraResult<()> {
        directive.applied = true;
        directive.updated_at = obra_store::now_ms();
        self.store.put(directive).await?;
        Ok(())
    }

    /// Cascades a BLOCKED status onto every transitive dependent of a
    /// terminally-failed task, persisting each one.
    pub async fn cascade_block(&self, project_id: &str, failed_task_id: &str, cascade: bool) -> ObraResult<Vec<String>> {
        let tasks: Vec<Task> = self
            .store
            .query(&[Filter::eq("project_id", IndexValue::String(project_id.to_string()))])
            .await?;
        let mut graph = DependencyGraph::new();
        for task in &tasks {
            graph.add_task(&task.id, task.status);
        }
        for task in &tasks {
            for dep in &task.depends_on {
                let _ = graph.add_dependency(&task.id, dep);
            }
        }
        let affected = graph.on_fail(failed_task_id, cascade);
        for task in tasks.into_iter().filter(|t| affected.contains(&t.id)) {
            let mut task = task;
            task.status = TaskStatus::Blocked;
            task.blocked_by_failure_of = Some(failed_task_id.to_string());
            task.touch();
            self.store.put(&task).await?;
        }
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Task, TaskType};

    #[tokio::test]
    async fn ready_tasks_excludes_unsatisfied_dependencies() {
        let store = Store::open_in_memory().await.unwrap();
        let persistence = Persistence::new(store);

        let mut a = Task::new("p1", TaskType::Task, "A", "desc", 5);
        let mut b = Task::new("p1", TaskType::Task, "B", "desc", 5);
        b.depends_on.push(a.id.clone());
        persistence.store.put(&a).await.unwrap();
        persistence.store.put(&b).await.unwrap();

        let ready = persistence.ready_tasks("p1").await.unwrap();
        let ready_ids: Vec<&str> = ready.iter().map(|t| t.id.as_str()).collect();
        assert!(ready_ids.contains(&a.id.as_str()));
        assert!(!ready_ids.contains(&b.id.as_str()));

        a.status = TaskStatus::Completed;
        persistence.store.put(&a).await.unwrap();
        let ready = persistence.ready_tasks("p1").await.unwrap();
        let ready_ids: Vec<&str> = ready.iter().map(|t| t.id.as_str()).collect();
        assert!(ready_ids.contains(&b.id.as_str()));
    }

    #[tokio::test]
    async fn pending_directives_excludes_applied_and_sorts_oldest_first() {
        use crate::domain::InjectedDirective;

        let store = Store::open_in_memory().await.unwrap();
        let persistence = Persistence::new(store);

        let task = Task::new("p1", TaskType::Task, "A", "desc", 5);
        persistence.store.put(&task).await.unwrap();

        let mut first = InjectedDirective::to_impl("p1", &task.id, "use tabs");
        first.captured_at = 100;
        let mut second = InjectedDirective::to_orch("p1", &task.id, "accept this");
        second.captured_at = 200;
        let mut already_applied = InjectedDirective::to_impl("p1", &task.id, "stale");
        already_applied.applied = true;
        persistence.store.put(&first).await.unwrap();
        persistence.store.put(&second).await.unwrap();
        persistence.store.put(&already_applied).await.unwrap();

        let pending = persistence.pending_directives(&task.id).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, first.id);
        assert_eq!(pending[1].id, second.id);

        let mut directive = pending.into_iter().next().unwrap();
        persistence.mark_directive_applied(&mut directive).await.unwrap();
        let remaining = persistence.pending_directives(&task.id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, second.id);
    }

    #[tokio::test]
    async fn cascade_block_marks_transitive_dependents_blocked() {
        let store = Store::open_in_memory().await.unwrap();
        let persistence = Persistence::new(store);

        let a = Task::new("p1", TaskType::Task, "A", "desc", 5);
        let mut b = Task::new("p1", TaskType::Task, "B", "desc", 5);
        b.depends_on.push(a.id.clone());
        let mut c = Task::new("p1", TaskType::Task, "C", "desc", 5);
        c.depends_on.push(b.id.clone());
        persistence.store.put(&a).await.unwrap();
        persistence.store.put(&b).await.unwrap();
        persistence.store.put(&c).await.unwrap();

        persistence.cascade_block("p1", &a.id, true).await.unwrap();

        let b: Task = persistence.store.require(&b.id).await.unwrap();
        let c: Task = persistence.store.require(&c.id).await.unwrap();
        assert_eq!(b.status, TaskStatus::Blocked);
        assert_eq!(c.status, TaskStatus::Blocked);
    }
}
