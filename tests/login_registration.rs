//! Shipped login/registration rule sets against a generated screen file
//!
//! Runs the three rule files under patches/login-registration in order, the
//! way the CLI does for a directory, and checks the resulting screen source.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use text_patcher::config::{discover_rule_files, load_from_path};
use text_patcher::{run, EditRule, FileStore, Occurrence, RuleOutcome, RunMode, RunSummary};

const TARGET: &str = "lib/presentation/login_registration_screen/login_registration_screen.dart";

fn rules_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("patches/login-registration")
}

/// Lay out a mock Flutter project containing the unpatched screen.
fn setup_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join(TARGET);
    fs::create_dir_all(target.parent().unwrap()).unwrap();
    fs::copy(
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/login_registration_screen.dart"),
        &target,
    )
    .unwrap();
    dir
}

fn apply_all(project: &Path) -> Vec<RunSummary> {
    discover_rule_files(rules_dir())
        .unwrap()
        .into_iter()
        .map(|rule_file| {
            let rule_set = load_from_path(&rule_file).unwrap();
            let target = project.join(rule_set.meta.target.as_deref().unwrap());
            let mut store = FileStore::new(target);
            run(&mut store, &rule_set.patcher(None), RunMode::Write).unwrap()
        })
        .collect()
}

#[test]
fn test_rule_files_discovered_in_order() {
    let names: Vec<String> = discover_rule_files(rules_dir())
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec![
            "01-restructure-state-class.toml",
            "02-email-otp-auth.toml",
            "03-rewrite-build-method.toml",
        ]
    );
}

#[test]
fn test_rule_files_target_the_screen() {
    for rule_file in discover_rule_files(rules_dir()).unwrap() {
        let rule_set = load_from_path(&rule_file).unwrap();
        assert_eq!(rule_set.meta.target.as_deref(), Some(TARGET));
    }
}

#[test]
fn test_block_rules_replace_every_occurrence() {
    let rule_set = load_from_path(rules_dir().join("02-email-otp-auth.toml")).unwrap();
    let patcher = rule_set.patcher(None);
    assert_eq!(patcher.rules().len(), 3);
    for rule in patcher.rules() {
        match &rule.rule {
            EditRule::ReplaceBlock { occurrence, .. } => {
                assert_eq!(*occurrence, Occurrence::All, "rule {}", rule.id)
            }
            other => panic!("expected replace-block for {}, got {:?}", rule.id, other),
        }
    }
}

#[test]
fn test_full_sequence_rewrites_screen() {
    let project = setup_project();
    let summaries = apply_all(project.path());

    assert_eq!(summaries.len(), 3);
    for summary in &summaries {
        assert!(summary.written);
        for rule in &summary.report.rules {
            assert_eq!(rule.outcome, RuleOutcome::Applied, "rule {}", rule.id);
        }
    }

    let screen = fs::read_to_string(project.path().join(TARGET)).unwrap();

    // Class header split into widget + state.
    assert!(screen.contains("  const LoginRegistrationScreen({super.key});\n"));
    assert_eq!(screen.matches("class _LoginRegistrationScreenState").count(), 1);
    assert!(!screen.contains("super(key: key)"));

    // Password fields replaced by one-time code flow.
    assert!(!screen.contains("_passwordController"));
    assert!(!screen.contains("_confirmPasswordController"));
    assert!(screen.contains("final _otpController = TextEditingController();"));
    assert!(screen.contains("Future<void> _sendOtp() async {"));
    assert!(screen.contains("Future<void> _verifyOtp() async {"));

    // Build method replaced through to the end of the file.
    assert_eq!(screen.matches("Widget build(BuildContext context) {").count(), 1);
    assert!(screen.contains("Widget _buildSocialButton("));
    assert!(screen.ends_with("  }\n}\n"));

    // Imports above the class are untouched.
    assert!(screen.starts_with("import 'package:flutter/material.dart';\n"));
}

#[test]
fn test_full_sequence_is_idempotent() {
    let project = setup_project();
    apply_all(project.path());
    let once = fs::read_to_string(project.path().join(TARGET)).unwrap();

    let summaries = apply_all(project.path());
    let twice = fs::read_to_string(project.path().join(TARGET)).unwrap();

    assert_eq!(once, twice);
    for summary in &summaries {
        assert!(!summary.written);
        assert!(summary.report.is_unchanged());
        for rule in &summary.report.rules {
            assert_eq!(rule.outcome, RuleOutcome::AlreadyApplied, "rule {}", rule.id);
        }
    }
}

#[test]
fn test_build_rewrite_fails_without_marker() {
    let project = setup_project();
    let target = project.path().join(TARGET);
    let stripped = fs::read_to_string(&target)
        .unwrap()
        .replace("Widget build(BuildContext context)", "Widget render(BuildContext context)");
    fs::write(&target, &stripped).unwrap();

    let rule_set = load_from_path(rules_dir().join("03-rewrite-build-method.toml")).unwrap();
    let mut store = FileStore::new(&target);
    let err = run(&mut store, &rule_set.patcher(None), RunMode::Write).unwrap_err();

    assert!(err.to_string().contains("build-method-tail"));
    assert_eq!(fs::read_to_string(&target).unwrap(), stripped);
}
