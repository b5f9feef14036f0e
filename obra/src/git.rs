//! Post-task git hook: offered the task and the list of paths it touched,
//! may produce a commit. A commit failure is recorded on the task (via
//! `Task.git_commit_error`) but never rolls back an otherwise-successful
//! completion — git is an audit trail here, not a gate. Grounded in the
//! teacher's subprocess-driven git invocations in
//! `watcher::main_watcher::MainWatcher` (spawn `git`, capture stdout/stderr,
//! treat a non-zero exit as a recoverable condition rather than a panic).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::GitSettings;
use crate::domain::Task;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub committed: bool,
    pub sha: Option<String>,
    pub error: Option<String>,
}

pub struct GitHook {
    repo_root: PathBuf,
    settings: GitSettings,
}

impl GitHook {
    pub fn new(repo_root: PathBuf, settings: GitSettings) -> Self {
        Self { repo_root, settings }
    }

    /// Runs after a task iteration completes with a non-empty change set.
    /// Returns `Ok` regardless of whether the commit itself succeeded —
    /// failure is carried in `CommitOutcome::error`, not propagated as an
    /// `Err`, since the caller must not treat it as fatal to the task.
    pub async fn run(&self, task: &Task, changed_paths: &[PathBuf]) -> CommitOutcome {
        if !self.settings.enabled || !self.settings.auto_commit || changed_paths.is_empty() {
            return CommitOutcome { committed: false, sha: None, error: None };
        }

        if self.settings.branch_per_task {
            if let Err(e) = self.ensure_branch(task).await {
                warn!(task_id = %task.id, error = %e, "git_hook: failed to prepare branch, committing on current branch");
            }
        }

        match self.add_and_commit(task, changed_paths).await {
            Ok(sha) => CommitOutcome { committed: true, sha: Some(sha), error: None },
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "git_hook: commit failed");
                CommitOutcome { committed: false, sha: None, error: Some(e) }
            }
        }
    }

    async fn ensure_branch(&self, task: &Task) -> Result<(), String> {
        let branch = format!("{}{}", self.settings.branch_prefix, task.id);
        let output = self.git(&["checkout", "-B", &branch]).await?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        Ok(())
    }

    async fn add_and_commit(&self, task: &Task, changed_paths: &[PathBuf]) -> Result<String, String> {
        let mut add_args: Vec<String> = vec!["add".to_string()];
        add_args.extend(changed_paths.iter().map(|p| p.display().to_string()));
        let add_args: Vec<&str> = add_args.iter().map(String::as_str).collect();
        let added = self.git(&add_args).await?;
        if !added.status.success() {
            return Err(String::from_utf8_lossy(&added.stderr).trim().to_string());
        }

        let message = self.commit_message(task);
        let committed = self.git(&["commit", "-m", &message]).await?;
        if !committed.status.success() {
            let stderr = String::from_utf8_lossy(&committed.stderr).trim().to_string();
            if stderr.contains("nothing to commit") {
                return Err("nothing to commit".to_string());
            }
            return Err(stderr);
        }

        let rev = self.git(&["rev-parse", "HEAD"]).await?;
        Ok(String::from_utf8_lossy(&rev.stdout).trim().to_string())
    }

    fn commit_message(&self, task: &Task) -> String {
        match self.settings.commit_strategy.as_str() {
            "per-iteration" => format!("{}: iteration commit\n\ntask: {}", task.title, task.id),
            _ => format!("{}\n\ntask: {}", task.title, task.id),
        }
    }

    async fn git(&self, args: &[&str]) -> Result<std::process::Output, String> {
        debug!(?args, "git_hook: running git command");
        Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| format!("spawning git {args:?}: {e}"))
    }
}

pub fn working_directory_is_git_repo(path: &Path) -> bool {
    path.join(".git").exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskType;

    fn init_repo(dir: &Path) {
        std::process::Command::new("git").args(["init", "-q"]).current_dir(dir).status().unwrap();
        std::process::Command::new("git")
            .args(["config", "user.email", "obra@example.com"])
            .current_dir(dir)
            .status()
            .unwrap();
        std::process::Command::new("git").args(["config", "user.name", "obra"]).current_dir(dir).status().unwrap();
    }

    #[tokio::test]
    async fn disabled_settings_skip_commit() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let task = Task::new("p1", TaskType::Task, "A", "desc", 5);
        let hook = GitHook::new(dir.path().to_path_buf(), GitSettings { enabled: false, ..Default::default() });
        let outcome = hook.run(&task, &[PathBuf::from("a.rs")]).await;
        assert!(!outcome.committed);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn commits_changed_files_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        std::fs::write(dir.path().join("a.rs"), "fn main() {}").unwrap();

        let task = Task::new("p1", TaskType::Task, "A", "desc", 5);
        let settings = GitSettings { enabled: true, auto_commit: true, branch_per_task: false, ..Default::default() };
        let hook = GitHook::new(dir.path().to_path_buf(), settings);
        let outcome = hook.run(&task, &[PathBuf::from("a.rs")]).await;
        assert!(outcome.committed);
        assert!(outcome.sha.is_some());
    }
}
