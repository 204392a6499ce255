//! Exit status of the `ci-deploy` binary.

use std::process::{Command, Output};
use tempfile::TempDir;

fn run(dir: &TempDir, vars: &[(&str, &str)], args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ci-deploy"))
        .args(args)
        .current_dir(dir.path())
        .env_clear()
        .envs(vars.iter().copied())
        .output()
        .unwrap()
}

fn github(branch: &str) -> Vec<(&'static str, String)> {
    vec![
        ("GITHUB_ACTIONS", "true".to_string()),
        ("GITHUB_REF", format!("refs/heads/{}", branch)),
        ("GITHUB_REPOSITORY", "lief-project/LIEF".to_string()),
    ]
}

fn as_pairs<'a>(vars: &'a [(&'static str, String)]) -> Vec<(&'static str, &'a str)> {
    vars.iter().map(|(k, v)| (*k, v.as_str())).collect()
}

#[test]
fn test_skipped_branch_exits_zero() {
    let dir = TempDir::new().unwrap();
    let vars = github("feature/parser");

    let output = run(&dir, &as_pairs(&vars), &[]);

    assert_eq!(output.status.code(), Some(0));
    assert!(!dir.path().join("deploy-packages").exists());
}

#[test]
fn test_pull_request_exits_zero() {
    let dir = TempDir::new().unwrap();
    let mut vars = github("master");
    vars.push(("GITHUB_HEAD_REF", "fix/parser".to_string()));

    let output = run(&dir, &as_pairs(&vars), &[]);

    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_unknown_ci_exits_one() {
    let dir = TempDir::new().unwrap();

    let output = run(&dir, &[], &[]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Can't detect CI"), "stderr: {}", stderr);
}

#[test]
fn test_missing_secret_exits_one() {
    let dir = TempDir::new().unwrap();
    let vars = github("master");

    let output = run(&dir, &as_pairs(&vars), &["--dry-run"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("LIEF_AUTOMATIC_BUILDS_KEY"), "stderr: {}", stderr);
}

#[test]
fn test_dry_run_exits_zero() {
    let dir = TempDir::new().unwrap();
    let mut vars = github("devel");
    vars.push(("LIEF_AUTOMATIC_BUILDS_KEY", "00112233".to_string()));
    vars.push(("LIEF_AUTOMATIC_BUILDS_IV", "44556677".to_string()));
    let repo = dir.path().to_string_lossy().to_string();
    vars.push(("HOME", repo.clone()));

    let output = run(&dir, &as_pairs(&vars), &["--dry-run", "--repo-dir", &repo]);

    assert_eq!(output.status.code(), Some(0));
    assert!(!dir.path().join("deploy-packages").exists());
}
