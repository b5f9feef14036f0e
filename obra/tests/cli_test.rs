//! CLI-surface integration tests: shells out to the built `obra` binary via
//! `assert_cmd` against a temporary working directory, so each process gets
//! its own `.obra/store.db`. `HOME`/`XDG_CONFIG_HOME` are pointed at an empty
//! directory under the same tempdir so `Config::load`'s user-config fallback
//! never reads whatever happens to live under the invoking user's real home.

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;

fn obra_cmd(dir: &std::path::Path) -> Command {
    let home = dir.join("home");
    std::fs::create_dir_all(&home).unwrap();

    let mut cmd = Command::cargo_bin("obra").unwrap();
    cmd.current_dir(dir);
    cmd.env("HOME", &home);
    cmd.env("XDG_CONFIG_HOME", home.join(".config"));
    cmd
}

#[test]
fn project_create_prints_generated_id() {
    let dir = tempfile::tempdir().unwrap();

    obra_cmd(dir.path())
        .args(["project", "create", "demo", "--working-dir", "."])
        .assert()
        .success()
        .stdout(contains("created project"));
}

#[test]
fn task_create_then_inject_round_trips_through_the_store() {
    let dir = tempfile::tempdir().unwrap();

    let project_out = obra_cmd(dir.path())
        .args(["project", "create", "demo", "--working-dir", "."])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let project_stdout = String::from_utf8(project_out).unwrap();
    let project_id = project_stdout.trim().rsplit(' ').next().unwrap().to_string();

    let task_out = obra_cmd(dir.path())
        .args(["task", "create", "do the thing", "--project", &project_id])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let task_stdout = String::from_utf8(task_out).unwrap();
    let task_id = task_stdout.trim().rsplit(' ').next().unwrap().to_string();

    obra_cmd(dir.path())
        .args(["task", "inject", &task_id, "--to-impl", "prefer small diffs"])
        .assert()
        .success()
        .stdout(contains("directive queued"));
}

#[test]
fn task_inject_without_any_directive_text_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();

    let project_out = obra_cmd(dir.path())
        .args(["project", "create", "demo", "--working-dir", "."])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let project_id = String::from_utf8(project_out).unwrap().trim().rsplit(' ').next().unwrap().to_string();

    let task_out = obra_cmd(dir.path())
        .args(["task", "create", "do the thing", "--project", &project_id])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let task_id = String::from_utf8(task_out).unwrap().trim().rsplit(' ').next().unwrap().to_string();

    obra_cmd(dir.path())
        .args(["task", "inject", &task_id])
        .assert()
        .success()
        .stdout(contains("nothing to inject"));
}

#[test]
fn config_show_prints_yaml_with_default_llm_kind() {
    let dir = tempfile::tempdir().unwrap();

    obra_cmd(dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(contains("ollama"));
}

#[test]
fn task_execute_on_unknown_id_fails_with_nonzero_exit() {
    let dir = tempfile::tempdir().unwrap();

    obra_cmd(dir.path())
        .args(["task", "execute", "not-a-real-task-id"])
        .assert()
        .failure();
}
