use crate::engine::{PatchRule, Patcher};
use crate::rule::{EditRule, MatchPolicy, Occurrence, UnterminatedPolicy};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct RuleSet {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

impl RuleSet {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.rules.is_empty() {
            issues.push(ValidationIssue::EmptyRuleList);
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            if rule.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    rule_id: None,
                    field: "id",
                });
            } else if !seen.insert(rule.id.as_str()) {
                issues.push(ValidationIssue::DuplicateId(rule.id.clone()));
            }

            match &rule.operation {
                Operation::ReplaceBlock { old, .. } => {
                    if old.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            rule_id: Some(rule.id.clone()),
                            field: "operation.old",
                        });
                    }
                }
                Operation::LineScan {
                    start_marker,
                    end_marker,
                    ..
                } => {
                    if start_marker.trim().is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            rule_id: Some(rule.id.clone()),
                            field: "operation.start_marker",
                        });
                    }
                    if end_marker.trim().is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            rule_id: Some(rule.id.clone()),
                            field: "operation.end_marker",
                        });
                    }
                }
                Operation::ReplaceTail { marker, .. } => {
                    if marker.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            rule_id: Some(rule.id.clone()),
                            field: "operation.marker",
                        });
                    }
                }
            }

            if rule.on_unterminated.is_some()
                && !matches!(rule.operation, Operation::LineScan { .. })
            {
                issues.push(ValidationIssue::InvalidCombo {
                    rule_id: Some(rule.id.clone()),
                    message: "on_unterminated only applies to line-scan rules".to_string(),
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Build the engine for this rule set.
    ///
    /// `policy` (typically from the command line) takes precedence over
    /// `meta.policy`; per-rule `on_missing` beats both.
    pub fn patcher(&self, policy: Option<MatchPolicy>) -> Patcher {
        let rules = self.rules.iter().map(RuleDefinition::to_patch_rule).collect();
        Patcher::new(rules).with_default_policy(policy.or(self.meta.policy))
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// File the rules edit, relative to the patch root unless absolute.
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub policy: Option<MatchPolicy>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuleDefinition {
    pub id: String,
    pub operation: Operation,
    #[serde(default)]
    pub on_missing: Option<MatchPolicy>,
    #[serde(default)]
    pub on_unterminated: Option<UnterminatedPolicy>,
}

impl RuleDefinition {
    pub fn to_patch_rule(&self) -> PatchRule {
        PatchRule {
            id: self.id.clone(),
            rule: self.operation.to_edit_rule(),
            on_missing: self.on_missing,
            on_unterminated: self.on_unterminated.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Operation {
    ReplaceBlock {
        old: String,
        #[serde(default)]
        new: String,
        #[serde(default)]
        occurrence: Occurrence,
    },
    LineScan {
        start_marker: String,
        end_marker: String,
        /// Block of lines emitted in place of the start marker line
        #[serde(default)]
        replacement: String,
    },
    ReplaceTail {
        marker: String,
        #[serde(default)]
        tail: String,
    },
}

impl Operation {
    pub fn to_edit_rule(&self) -> EditRule {
        match self {
            Operation::ReplaceBlock {
                old,
                new,
                occurrence,
            } => EditRule::ReplaceBlock {
                old: old.clone(),
                new: new.clone(),
                occurrence: *occurrence,
            },
            Operation::LineScan {
                start_marker,
                end_marker,
                replacement,
            } => EditRule::line_scan(
                start_marker.as_str(),
                end_marker.as_str(),
                replacement.lines(),
            ),
            Operation::ReplaceTail { marker, tail } => {
                EditRule::replace_tail(marker.as_str(), tail.as_str())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyRuleList,
    DuplicateId(String),
    MissingField {
        rule_id: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        rule_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyRuleList => write!(f, "rule set contains no rules"),
            ValidationIssue::DuplicateId(id) => write!(f, "rule id '{id}' is used more than once"),
            ValidationIssue::MissingField { rule_id, field } => match rule_id {
                Some(id) => write!(f, "rule '{id}' missing required field '{field}'"),
                None => write!(f, "rule missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo { rule_id, message } => match rule_id {
                Some(id) => write!(f, "rule '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid rule configuration: {message}"),
            },
        }
    }
}
