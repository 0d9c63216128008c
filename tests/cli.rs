//! CLI smoke tests against a throwaway database.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn edthing(db_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_edthing"))
        .args(args)
        .env(
            "DATABASE_URL",
            format!("sqlite://{}", db_dir.join("data/edthing.sqlite").display()),
        )
        .env_remove("ED_API_TOKEN")
        .env_remove("ED_COURSE_ID")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run edthing")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_init_is_idempotent() {
    let tmp = TempDir::new().unwrap();

    let first = edthing(tmp.path(), &["init"]);
    assert!(first.status.success(), "init failed: {}", stderr(&first));
    assert!(stdout(&first).contains("Database initialized successfully"));
    assert!(tmp.path().join("data/edthing.sqlite").exists());

    let second = edthing(tmp.path(), &["init"]);
    assert!(second.status.success(), "second init failed: {}", stderr(&second));
}

#[test]
fn test_sync_requires_credentials() {
    let tmp = TempDir::new().unwrap();

    let output = edthing(tmp.path(), &["sync"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("ED_API_TOKEN"), "stderr: {}", err);
    assert!(err.contains("ED_COURSE_ID"), "stderr: {}", err);
}

#[test]
fn test_sync_rejects_bad_since() {
    let tmp = TempDir::new().unwrap();

    let output = edthing(tmp.path(), &["sync", "--since", "last tuesday"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("invalid timestamp"));
}

#[test]
fn test_stats_and_export_on_empty_db() {
    let tmp = TempDir::new().unwrap();
    assert!(edthing(tmp.path(), &["init"]).status.success());

    let stats = edthing(tmp.path(), &["stats"]);
    assert!(stats.status.success(), "stats failed: {}", stderr(&stats));
    assert!(stdout(&stats).contains("Posts:       0"));

    let export = edthing(tmp.path(), &["export"]);
    assert!(export.status.success(), "export failed: {}", stderr(&export));
    let json: serde_json::Value = serde_json::from_str(&stdout(&export)).unwrap();
    assert_eq!(json["posts"].as_array().unwrap().len(), 0);

    let out_file = tmp.path().join("out/posts.json");
    let export = edthing(
        tmp.path(),
        &["export", "--output", out_file.to_str().unwrap()],
    );
    assert!(export.status.success());
    assert!(out_file.exists());
}

#[test]
fn test_hide_and_cleanup() {
    let tmp = TempDir::new().unwrap();
    assert!(edthing(tmp.path(), &["init"]).status.success());

    let hide = edthing(tmp.path(), &["hide", "student", "5"]);
    assert!(hide.status.success(), "hide failed: {}", stderr(&hide));
    assert!(stdout(&hide).contains("Hidden student 5"));

    let unhide = edthing(tmp.path(), &["hide", "student", "5", "--unhide"]);
    assert!(unhide.status.success());
    assert!(stdout(&unhide).contains("Unhidden student 5"));

    let missing = edthing(tmp.path(), &["hide", "post", "404"]);
    assert!(!missing.status.success());
    assert!(stderr(&missing).contains("No stored post with id 404"));

    let cleanup = edthing(tmp.path(), &["cleanup", "--dry-run"]);
    assert!(cleanup.status.success(), "cleanup failed: {}", stderr(&cleanup));
    assert!(stdout(&cleanup).contains("All posts match the filter"));
}
