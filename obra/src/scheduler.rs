//! Dependency Scheduler: topologically orders tasks, maintains the ready-set,
//! and propagates cascading blocks. Grounded in the cycle-detection and
//! topological-sort DFS the teacher runs over its own loop dependency graph
//! before scheduling a batch — generalized here from `Loop.deps` to
//! `Task.depends_on`.
//!
//! The scheduler does not execute anything; it only answers "what can run
//! now" and "what does completing/failing this unblock or block". Its
//! in-memory DAG is the source of truth for readiness; persistence keeps
//! `depends_on` as plain id lists, so there is no second copy of the graph
//! to drift.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::domain::TaskStatus;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("dependency cycle detected: {}", path.join(" -> "))]
pub struct DependencyCycleError {
    pub path: Vec<String>,
}

#[derive(Debug, Clone)]
struct Node {
    status: TaskStatus,
    deleted: bool,
    depends_on: HashSet<String>,
}

/// In-memory dependency graph for a single project. Guarded by a single
/// writer at the call site (the Orchestrator serializes mutations); reads
/// return owned snapshots so callers never hold a borrow across an await.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<String, Node>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, task_id: impl Into<String>, status: TaskStatus) {
        self.nodes.entry(task_id.into()).or_insert_with(|| Node {
            status,
            deleted: false,
            depends_on: HashSet::new(),
        });
    }

    pub fn set_status(&mut self, task_id: &str, status: TaskStatus) {
        if let Some(node) = self.nodes.get_mut(task_id) {
            node.status = status;
        }
    }

    pub fn set_deleted(&mut self, task_id: &str, deleted: bool) {
        if let Some(node) = self.nodes.get_mut(task_id) {
            node.deleted = deleted;
        }
    }

    /// Adds `from` depends-on `to`. All-or-nothing: rejects and leaves the
    /// graph unchanged if the edge would introduce a cycle.
    pub fn add_dependency(&mut self, from: &str, to: &str) -> Result<(), DependencyCycleError> {
        self.add_task(from, TaskStatus::Pending);
        self.add_task(to, TaskStatus::Pending);

        if let Some(path) = self.find_path(to, from) {
            let mut cycle = path;
            cycle.push(from.to_string());
            return Err(DependencyCycleError { path: cycle });
        }

        self.nodes.get_mut(from).unwrap().depends_on.insert(to.to_string());
        Ok(())
    }

    /// DFS reachability: is `to` reachable from `from` following depends_on edges?
    /// Returns the path if so (used both to detect the cycle and to report it).
    fn find_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut stack = vec![from.to_string()];
        let mut parent: HashMap<String, String> = HashMap::new();

        while let Some(current) = stack.pop() {
            if current == to {
                let mut path = vec![current.clone()];
                let mut cursor = current;
                while let Some(p) = parent.get(&cursor) {
                    path.push(p.clone());
                    cursor = p.clone();
                }
                path.reverse();
                return Some(path);
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                for dep in &node.depends_on {
                    if !visited.contains(dep) {
                        parent.entry(dep.clone()).or_insert_with(|| current.clone());
                        stack.push(dep.clone());
                    }
                }
            }
        }
        None
    }

    /// Exactly those tasks whose dependencies are all COMPLETED and which
    /// are not soft-deleted or BLOCKED.
    pub fn ready_set(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, node)| {
                !node.deleted
                    && node.status != TaskStatus::Blocked
                    && node.status != TaskStatus::InProgress
                    && !node.status.is_terminal()
                    && node.depends_on.iter().all(|dep| {
                        self.nodes.get(dep).map(|d| d.status == TaskStatus::Completed).unwrap_or(false)
                    })
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Every direct and transitive dependent of `task_id` (tasks that depend
    /// on it, directly or through a chain).
    pub fn transitive_dependents(&self, task_id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut frontier = vec![task_id.to_string()];
        let mut seen = HashSet::new();
        while let Some(current) = frontier.pop() {
            for (id, node) in &self.nodes {
                if node.depends_on.contains(&current) && seen.insert(id.clone()) {
                    out.push(id.clone());
                    frontier.push(id.clone());
                }
            }
        }
        out
    }

    pub fn direct_dependents(&self, task_id: &str) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.depends_on.contains(task_id))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Marks `task_id`'s dependents BLOCKED after a terminal failure.
    /// `cascade` selects transitive forward-closure vs. direct dependents only.
    pub fn on_fail(&mut self, task_id: &str, cascade: bool) -> Vec<String> {
        let affected = if cascade {
            self.transitive_dependents(task_id)
        } else {
            self.direct_dependents(task_id)
        };
        for id in &affected {
            self.set_status(id, TaskStatus::Blocked);
        }
        affected
    }

    /// Promotes any task whose dependencies are now all COMPLETED from
    /// PENDING to READY.
    pub fn on_complete(&mut self, task_id: &str) -> Vec<String> {
        self.set_status(task_id, TaskStatus::Completed);
        let ready = self.ready_set();
        let mut promoted = Vec::new();
        for id in ready {
            if let Some(node) = self.nodes.get_mut(&id) {
                if node.status == TaskStatus::Pending {
                    node.status = TaskStatus::Ready;
                    promoted.push(id);
                }
            }
        }
        promoted
    }

    /// A topological ordering of every non-deleted task. Errors if the graph
    /// somehow contains a cycle (should be unreachable given
    /// `add_dependency`'s guard, but kept total for defense at the seam).
    pub fn topo_order(&self) -> Result<Vec<String>, DependencyCycleError> {
        #[derive(PartialEq)]
        enum Mark {
            Temp,
            Done,
        }
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut order = Vec::new();

        fn visit<'a>(
            id: &'a str,
            nodes: &'a HashMap<String, Node>,
            marks: &mut HashMap<&'a str, Mark>,
            order: &mut Vec<String>,
            stack: &mut Vec<String>,
        ) -> Result<(), DependencyCycleError> {
            match marks.get(id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Temp) => {
                    let mut path = stack.clone();
                    path.push(id.to_string());
                    return Err(DependencyCycleError { path });
                }
                None => {}
            }
            marks.insert(id, Mark::Temp);
            stack.push(id.to_string());
            if let Some(node) = nodes.get(id) {
                for dep in &node.depends_on {
                    visit(dep, nodes, marks, order, stack)?;
                }
            }
            stack.pop();
            marks.insert(id, Mark::Done);
            order.push(id.to_string());
            Ok(())
        }

        let mut stack = Vec::new();
        for id in self.nodes.keys() {
            if !self.nodes.get(id.as_str()).map(|n| n.deleted).unwrap_or(true) {
                visit(id, &self.nodes, &mut marks, &mut order, &mut stack)?;
            }
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::{prop_assert, prop_assert_eq};

    #[test]
    fn ready_set_excludes_tasks_with_incomplete_deps() {
        let mut g = DependencyGraph::new();
        g.add_task("a", TaskStatus::Pending);
        g.add_task("b", TaskStatus::Pending);
        g.add_dependency("b", "a").unwrap();
        let ready = g.ready_set();
        assert!(ready.contains(&"a".to_string()));
        assert!(!ready.contains(&"b".to_string()));

        g.on_complete("a");
        let ready = g.ready_set();
        assert!(ready.contains(&"b".to_string()));
    }

    #[test]
    fn cycle_insertion_is_rejected_and_graph_unchanged() {
        let mut g = DependencyGraph::new();
        g.add_dependency("b", "a").unwrap();
        g.add_dependency("c", "b").unwrap();
        let before = g.nodes.get("a").unwrap().depends_on.clone();
        let err = g.add_dependency("a", "c").unwrap_err();
        assert!(err.path.len() >= 2);
        assert_eq!(g.nodes.get("a").unwrap().depends_on, before);
    }

    #[test]
    fn cascade_block_marks_transitive_dependents() {
        let mut g = DependencyGraph::new();
        g.add_dependency("b", "a").unwrap();
        g.add_dependency("c", "b").unwrap();
        let affected = g.on_fail("a", true);
        assert!(affected.contains(&"b".to_string()));
        assert!(affected.contains(&"c".to_string()));
        assert_eq!(g.nodes.get("b").unwrap().status, TaskStatus::Blocked);
        assert_eq!(g.nodes.get("c").unwrap().status, TaskStatus::Blocked);
    }

    #[test]
    fn direct_only_cascade_blocks_just_immediate_dependents() {
        let mut g = DependencyGraph::new();
        g.add_dependency("b", "a").unwrap();
        g.add_dependency("c", "b").unwrap();
        let affected = g.on_fail("a", false);
        assert_eq!(affected, vec!["b".to_string()]);
        assert_eq!(g.nodes.get("c").unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn topo_order_respects_dependencies() {
        let mut g = DependencyGraph::new();
        g.add_dependency("b", "a").unwrap();
        g.add_dependency("c", "b").unwrap();
        let order = g.topo_order().unwrap();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
    }

    proptest::proptest! {
        /// Feeding `add_dependency` an arbitrary sequence of edges over a
        /// small fixed node set never leaves a graph `topo_order` can't
        /// order: every edge that would close a cycle is rejected at
        /// insertion time, so the accepted subset is always a DAG.
        #[test]
        fn add_dependency_never_admits_a_cycle(edges in proptest::collection::vec((0..8u8, 0..8u8), 0..40)) {
            let mut g = DependencyGraph::new();
            for (from, to) in edges {
                if from == to {
                    continue;
                }
                let _ = g.add_dependency(&from.to_string(), &to.to_string());
            }
            prop_assert!(g.topo_order().is_ok());
        }

        /// Whatever `ready_set` returns must have every dependency already
        /// COMPLETED — the scheduler's core contract with the orchestrator.
        #[test]
        fn ready_set_always_has_satisfied_dependencies(
            edges in proptest::collection::vec((0..8u8, 0..8u8), 0..20),
            completed in proptest::collection::hash_set(0..8u8, 0..8),
        ) {
            let mut g = DependencyGraph::new();
            for (from, to) in &edges {
                if from == to {
                    continue;
                }
                let _ = g.add_dependency(&from.to_string(), &to.to_string());
            }
            for id in &completed {
                g.set_status(&id.to_string(), TaskStatus::Completed);
            }
            for id in g.ready_set() {
                let node = g.nodes.get(&id).unwrap();
                for dep in &node.depends_on {
                    prop_assert_eq!(g.nodes.get(dep).map(|d| d.status), Some(TaskStatus::Completed));
                }
            }
        }
    }
}
