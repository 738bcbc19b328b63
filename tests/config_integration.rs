//! Integration tests for rule files
//!
//! Tests parsing, validation, policy resolution and application through the
//! file-backed pipeline.

use std::fs;
use tempfile::TempDir;
use text_patcher::config::{load_from_path, load_from_str, ConfigError, Operation, ValidationIssue};
use text_patcher::{
    run, EditRule, FileStore, MatchPolicy, Occurrence, RuleOutcome, RunError, RunMode,
    UnterminatedPolicy,
};

/// Helper to create a temp dir with a target file
fn setup_workspace(content: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("screen.dart"), content).unwrap();
    dir
}

#[test]
fn test_load_rule_set_basic() {
    let toml = r#"
[meta]
name = "demo"
description = "Demo rule set"
target = "lib/screen.dart"
policy = "warn-and-skip"

[[rules]]
id = "rename"

[rules.operation]
type = "replace-block"
old = "foo"
new = "bar"
occurrence = "all"

[[rules]]
id = "header"
on_unterminated = "fail"

[rules.operation]
type = "line-scan"
start_marker = "class Foo"
end_marker = "int x"
replacement = '''
class Foo {
  Foo();
'''

[[rules]]
id = "tail"
on_missing = "strict"

[rules.operation]
type = "replace-tail"
marker = "// END"
tail = "// END\n"
"#;

    let rule_set = load_from_str(toml).expect("Failed to parse rule set");

    assert_eq!(rule_set.meta.name, "demo");
    assert_eq!(rule_set.meta.target.as_deref(), Some("lib/screen.dart"));
    assert_eq!(rule_set.meta.policy, Some(MatchPolicy::WarnAndSkip));
    assert_eq!(rule_set.rules.len(), 3);

    assert!(matches!(
        rule_set.rules[0].operation,
        Operation::ReplaceBlock {
            occurrence: Occurrence::All,
            ..
        }
    ));
    assert_eq!(
        rule_set.rules[1].on_unterminated,
        Some(UnterminatedPolicy::Fail)
    );
    assert_eq!(rule_set.rules[2].on_missing, Some(MatchPolicy::Strict));

    let patcher = rule_set.patcher(None);
    assert_eq!(
        patcher.rules()[1].rule,
        EditRule::line_scan("class Foo", "int x", ["class Foo {", "  Foo();"])
    );
    assert_eq!(patcher.rules()[1].on_unterminated, UnterminatedPolicy::Fail);
}

#[test]
fn test_validation_collects_all_issues() {
    let toml = r#"
[[rules]]
id = "dup"
on_unterminated = "fail"

[rules.operation]
type = "replace-block"
old = ""

[[rules]]
id = "dup"

[rules.operation]
type = "line-scan"
start_marker = "  "
end_marker = "END"
"#;

    let source = match load_from_str(toml) {
        Err(ConfigError::Validation { source, .. }) => source,
        other => panic!("expected validation error, got {other:?}"),
    };

    assert_eq!(source.issues.len(), 4);
    assert!(source.issues.iter().any(|i| matches!(
        i,
        ValidationIssue::MissingField {
            field: "operation.old",
            ..
        }
    )));
    assert!(source
        .issues
        .iter()
        .any(|i| matches!(i, ValidationIssue::DuplicateId(id) if id == "dup")));
    assert!(source.issues.iter().any(|i| matches!(
        i,
        ValidationIssue::MissingField {
            field: "operation.start_marker",
            ..
        }
    )));
    assert!(source
        .issues
        .iter()
        .any(|i| matches!(i, ValidationIssue::InvalidCombo { .. })));
}

#[test]
fn test_empty_rule_list_rejected() {
    let err = load_from_str("[meta]\nname = \"nothing\"\n").unwrap_err();
    assert!(err.to_string().contains("rule set contains no rules"));
}

#[test]
fn test_unknown_operation_type_rejected() {
    let toml = r#"
[[rules]]
id = "x"

[rules.operation]
type = "regex"
pattern = "a+"
"#;
    assert!(matches!(load_from_str(toml), Err(ConfigError::Toml { .. })));
}

#[test]
fn test_apply_rule_file_to_workspace() {
    let workspace = setup_workspace("int a = 1;\nint b = 2;\n");
    let rules = workspace.path().join("rules.toml");
    fs::write(
        &rules,
        r#"
[meta]
target = "screen.dart"

[[rules]]
id = "bump-a"

[rules.operation]
type = "replace-block"
old = "int a = 1;"
new = "int a = 10;"

[[rules]]
id = "missing"

[rules.operation]
type = "replace-block"
old = "int z = 0;"
new = "int z = 1;"
"#,
    )
    .unwrap();

    let rule_set = load_from_path(&rules).unwrap();
    let target = workspace
        .path()
        .join(rule_set.meta.target.as_deref().unwrap());
    let mut store = FileStore::new(&target);
    let summary = run(&mut store, &rule_set.patcher(None), RunMode::Write).unwrap();

    assert!(summary.written);
    assert_eq!(summary.report.rules[0].outcome, RuleOutcome::Applied);
    assert!(matches!(
        summary.report.rules[1].outcome,
        RuleOutcome::Skipped { .. }
    ));
    assert_eq!(
        fs::read_to_string(&target).unwrap(),
        "int a = 10;\nint b = 2;\n"
    );
}

#[test]
fn test_cli_policy_overrides_meta_policy() {
    let toml = r#"
[meta]
policy = "silent-skip"

[[rules]]
id = "missing"

[rules.operation]
type = "replace-block"
old = "absent"
new = "present"
"#;
    let rule_set = load_from_str(toml).unwrap();
    let workspace = setup_workspace("some text\n");
    let target = workspace.path().join("screen.dart");

    let summary = run(
        &mut FileStore::new(&target),
        &rule_set.patcher(None),
        RunMode::Write,
    )
    .unwrap();
    assert!(summary.report.is_unchanged());

    let err = run(
        &mut FileStore::new(&target),
        &rule_set.patcher(Some(MatchPolicy::Strict)),
        RunMode::Write,
    )
    .unwrap_err();
    assert!(matches!(err, RunError::Patch(_)));
    assert_eq!(fs::read_to_string(&target).unwrap(), "some text\n");
}

#[test]
fn test_strict_failure_leaves_file_untouched() {
    let original = "head\nbody\n";
    let workspace = setup_workspace(original);
    let target = workspace.path().join("screen.dart");
    let toml = r#"
[[rules]]
id = "edit-body"

[rules.operation]
type = "replace-block"
old = "body"
new = "BODY"

[[rules]]
id = "tail"

[rules.operation]
type = "replace-tail"
marker = "// build"
tail = "// build\n"
"#;
    let rule_set = load_from_str(toml).unwrap();
    let err = run(
        &mut FileStore::new(&target),
        &rule_set.patcher(None),
        RunMode::Write,
    )
    .unwrap_err();

    assert!(err.to_string().contains("'tail'"));
    assert_eq!(fs::read_to_string(&target).unwrap(), original);
}
