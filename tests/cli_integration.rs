//! Integration tests for the CLI
//!
//! Tests the apply, status, list and restore commands against a scratch workspace

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Helper to create a test workspace with a manifest
fn setup_test_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();

    fs::write(dir.path().join("package.json"), "{\"name\": \"web\"}\n").unwrap();

    fs::create_dir_all(dir.path().join("src/pages")).unwrap();
    fs::write(
        dir.path().join("src/pages/QAPage.tsx"),
        r#"import { useEffect } from 'react';

export default function QAPage({ topicId }: { topicId: string }) {
  useEffect(() => {
    fetchQuestions();
  }, [topicId]);
  return null;
}
"#,
    )
    .unwrap();

    let patches_dir = dir.path().join("patches");
    fs::create_dir(&patches_dir).unwrap();
    fs::write(
        patches_dir.join("qa.toml"),
        r#"[meta]
name = "qa-page"
description = "Test manifest"

[[targets]]
file = "src/pages/QAPage.tsx"

[[targets.rules]]
type = "literal"
search = "import { useEffect"
replace = "import { useEffect, useCallback"
unless_contains = ["useCallback"]

[[targets.rules]]
type = "literal"
search = "}, [topicId]);"
replace = "}, [topicId, fetchQuestions]);"

[[targets]]
file = "src/pages/Missing.tsx"

[[targets.rules]]
type = "literal"
search = "a"
replace = "b"
"#,
    )
    .unwrap();

    dir
}

/// Adds a second manifest that touches the same page after `qa.toml`
fn add_overlapping_manifest(workspace: &TempDir) {
    fs::write(
        workspace.path().join("patches/render.toml"),
        r#"[meta]
name = "render"

[[targets]]
file = "src/pages/QAPage.tsx"

[[targets.rules]]
type = "regex"
pattern = '''import\s+\{\s*([^}]*?)\s*\}\s+from'''
replace = "import { ${1}, useCallback } from"
scope = "first"
unless_contains = ["useCallback"]

[[targets.rules]]
type = "literal"
search = "return null;"
replace = "return <div />;"
"#,
    )
    .unwrap();
}

fn textpatch(workspace: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_textpatch"))
        .args(args)
        .arg("--workspace")
        .arg(workspace)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("TEXTPATCH_WORKSPACE")
        .output()
        .unwrap()
}

fn page(workspace: &TempDir) -> String {
    fs::read_to_string(workspace.path().join("src/pages/QAPage.tsx")).unwrap()
}

#[test]
fn test_apply_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_textpatch"))
        .args(["apply", "--help"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Apply patch manifests to a workspace"));
    assert!(stdout.contains("--dry-run"));
}

#[test]
fn test_apply_basic() {
    let workspace = setup_test_workspace();

    let output = textpatch(workspace.path(), &["apply"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    // Missing targets never change the exit code without --strict
    assert!(output.status.success());
    assert!(stdout.contains("Workspace:"));
    assert!(stdout.contains("Fixed src/pages/QAPage.tsx"));
    assert!(stdout.contains("File not found: src/pages/Missing.tsx"));
    assert!(stdout.contains("Summary:"));

    let content = page(&workspace);
    assert!(content.contains("import { useEffect, useCallback } from 'react';"));
    assert!(content.contains("}, [topicId, fetchQuestions]);"));
}

#[test]
fn test_apply_idempotent() {
    let workspace = setup_test_workspace();

    let _ = textpatch(workspace.path(), &["apply"]);
    let after_first = page(&workspace);

    let output = textpatch(workspace.path(), &["apply"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("No changes needed: src/pages/QAPage.tsx"));
    assert_eq!(page(&workspace), after_first);
}

#[test]
fn test_apply_dry_run() {
    let workspace = setup_test_workspace();
    let original = page(&workspace);

    let output = textpatch(workspace.path(), &["apply", "--dry-run"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("DRY RUN"));
    assert!(stdout.contains("Would fix src/pages/QAPage.tsx"));
    assert!(stdout.contains("+  }, [topicId, fetchQuestions]);"));
    assert_eq!(page(&workspace), original);
}

#[test]
fn test_apply_strict_fails_on_missing() {
    let workspace = setup_test_workspace();

    let output = textpatch(workspace.path(), &["apply", "--strict"]);

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_apply_json_report() {
    let workspace = setup_test_workspace();

    let output = textpatch(workspace.path(), &["apply", "--json"]);
    let reports: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();

    assert_eq!(reports[0]["name"], "qa-page");
    assert_eq!(reports[0]["summary"]["changed"], 1);
    assert_eq!(reports[0]["summary"]["missing"], 1);
    assert_eq!(reports[0]["entries"][0]["hits"], serde_json::json!([1, 1]));
}

#[test]
fn test_status_does_not_write() {
    let workspace = setup_test_workspace();
    let original = page(&workspace);

    let output = textpatch(workspace.path(), &["status"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("NEEDS PATCHING"));
    assert!(stdout.contains("PROBLEMS"));
    assert_eq!(page(&workspace), original);
}

#[test]
fn test_list() {
    let workspace = setup_test_workspace();

    let output = textpatch(workspace.path(), &["list"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("qa-page"));
    assert!(stdout.contains("src/pages/QAPage.tsx [2 rules: literal, literal]"));
}

#[test]
fn test_backup_and_restore() {
    let workspace = setup_test_workspace();
    let original = page(&workspace);

    let output = textpatch(workspace.path(), &["apply", "--backup"]);
    assert!(output.status.success());
    assert_ne!(page(&workspace), original);
    assert!(workspace.path().join("src/pages/QAPage.tsx.orig").exists());

    let output = textpatch(workspace.path(), &["restore"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("Restored src/pages/QAPage.tsx"));
    assert_eq!(page(&workspace), original);
    assert!(!workspace.path().join("src/pages/QAPage.tsx.orig").exists());
}

#[test]
fn test_invalid_manifest_exits_nonzero() {
    let workspace = setup_test_workspace();
    fs::write(
        workspace.path().join("patches/qa.toml"),
        "[[targets]]\nfile = \"\"\n",
    )
    .unwrap();

    let output = textpatch(workspace.path(), &["apply"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("invalid patch manifest"));
}

#[test]
fn test_dry_run_previews_manifests_in_sequence() {
    let workspace = setup_test_workspace();
    add_overlapping_manifest(&workspace);
    let original = page(&workspace);

    let output = textpatch(workspace.path(), &["apply", "--dry-run"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert_eq!(
        stdout
            .matches("+import { useEffect, useCallback } from 'react';")
            .count(),
        1
    );
    assert!(stdout.contains("+  return <div />;"));
    assert!(!stdout.contains("useCallback, useCallback"));
    assert_eq!(page(&workspace), original);
}

#[test]
fn test_backup_survives_overlapping_manifests() {
    let workspace = setup_test_workspace();
    add_overlapping_manifest(&workspace);
    let original = page(&workspace);

    let output = textpatch(workspace.path(), &["apply", "--backup"]);
    assert!(output.status.success());
    assert!(page(&workspace).contains("return <div />;"));

    let backup = workspace.path().join("src/pages/QAPage.tsx.orig");
    assert_eq!(fs::read_to_string(&backup).unwrap(), original);

    let output = textpatch(workspace.path(), &["restore"]);
    assert!(output.status.success());
    assert_eq!(page(&workspace), original);
    assert!(!backup.exists());
}
