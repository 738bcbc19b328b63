//! Ordered application of patch rules to a document.
//!
//! The engine owns policy: each rule reports whether its anchor was found,
//! and the engine decides per rule whether a miss aborts the run, logs a
//! warning, or passes quietly.

use crate::document::{Document, Fingerprint};
use crate::rule::{Application, EditRule, MatchPolicy, RuleError, UnterminatedPolicy};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// A named edit rule with its call-site policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRule {
    pub id: String,
    pub rule: EditRule,
    /// Overrides the patcher and rule defaults when set.
    pub on_missing: Option<MatchPolicy>,
    pub on_unterminated: UnterminatedPolicy,
}

impl PatchRule {
    pub fn new(id: impl Into<String>, rule: EditRule) -> Self {
        Self {
            id: id.into(),
            rule,
            on_missing: None,
            on_unterminated: UnterminatedPolicy::default(),
        }
    }

    pub fn on_missing(mut self, policy: MatchPolicy) -> Self {
        self.on_missing = Some(policy);
        self
    }

    pub fn on_unterminated(mut self, policy: UnterminatedPolicy) -> Self {
        self.on_unterminated = policy;
        self
    }
}

/// What happened to a single rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RuleOutcome {
    /// Rule matched and changed the document
    Applied,
    /// Rule's result was already present
    AlreadyApplied,
    /// Anchor missing and the policy allowed skipping
    Skipped { reason: String },
}

impl fmt::Display for RuleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleOutcome::Applied => write!(f, "applied"),
            RuleOutcome::AlreadyApplied => write!(f, "already applied"),
            RuleOutcome::Skipped { reason } => write!(f, "skipped ({reason})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleReport {
    pub id: String,
    pub kind: &'static str,
    #[serde(flatten)]
    pub outcome: RuleOutcome,
}

/// Result of running every rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[must_use = "PatchReport carries the patched document"]
pub struct PatchReport {
    #[serde(skip)]
    pub document: Document,
    pub rules: Vec<RuleReport>,
    pub before: Fingerprint,
    pub after: Fingerprint,
}

impl PatchReport {
    /// True when no rule changed the text.
    pub fn is_unchanged(&self) -> bool {
        self.before == self.after
    }

    pub fn count(&self, pred: impl Fn(&RuleOutcome) -> bool) -> usize {
        self.rules.iter().filter(|r| pred(&r.outcome)).count()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("rule '{id}' ({kind}): {reason}")]
    MarkerNotFound {
        id: String,
        kind: &'static str,
        reason: String,
    },

    #[error("rule '{id}': {source}")]
    Rule {
        id: String,
        #[source]
        source: RuleError,
    },
}

impl PatchError {
    pub fn rule_id(&self) -> &str {
        match self {
            PatchError::MarkerNotFound { id, .. } | PatchError::Rule { id, .. } => id,
        }
    }
}

/// Applies an ordered list of rules.
#[derive(Debug, Clone, Default)]
pub struct Patcher {
    rules: Vec<PatchRule>,
    default_policy: Option<MatchPolicy>,
}

impl Patcher {
    pub fn new(rules: Vec<PatchRule>) -> Self {
        Self {
            rules,
            default_policy: None,
        }
    }

    /// Policy for rules without their own `on_missing`.
    pub fn with_default_policy(mut self, policy: Option<MatchPolicy>) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn rules(&self) -> &[PatchRule] {
        &self.rules
    }

    fn policy_for(&self, rule: &PatchRule) -> MatchPolicy {
        rule.on_missing
            .or(self.default_policy)
            .unwrap_or_else(|| rule.rule.default_policy())
    }

    /// Run every rule in order. Each rule sees the output of the previous one.
    ///
    /// A strict miss aborts the run with no document, so a partial result can
    /// never be persisted.
    pub fn apply(&self, document: Document) -> Result<PatchReport, PatchError> {
        let before = document.fingerprint();
        let mut current = document;
        let mut reports = Vec::with_capacity(self.rules.len());

        for rule in &self.rules {
            let span = tracing::debug_span!("rule", id = %rule.id, kind = rule.rule.kind());
            let _guard = span.enter();

            let application = rule
                .rule
                .apply(&current, rule.on_unterminated)
                .map_err(|source| PatchError::Rule {
                    id: rule.id.clone(),
                    source,
                })?;

            let outcome = match application {
                Application::Changed(next) => {
                    tracing::debug!(bytes = next.len(), "applied");
                    current = next;
                    RuleOutcome::Applied
                }
                Application::AlreadyApplied => {
                    tracing::debug!("already applied");
                    RuleOutcome::AlreadyApplied
                }
                // Under strict the replacement may be present by coincidence.
                Application::Missing(miss)
                    if miss.replacement_present
                        && self.policy_for(rule) != MatchPolicy::Strict =>
                {
                    tracing::debug!("anchor gone, replacement present");
                    RuleOutcome::AlreadyApplied
                }
                Application::Missing(miss) => {
                    let reason = miss.to_string();
                    match self.policy_for(rule) {
                        MatchPolicy::Strict => {
                            return Err(PatchError::MarkerNotFound {
                                id: rule.id.clone(),
                                kind: rule.rule.kind(),
                                reason,
                            });
                        }
                        MatchPolicy::WarnAndSkip => {
                            tracing::warn!(rule = %rule.id, "skipping: {reason}");
                        }
                        MatchPolicy::SilentSkip => {
                            tracing::debug!("skipping: {reason}");
                        }
                    }
                    RuleOutcome::Skipped { reason }
                }
            };

            reports.push(RuleReport {
                id: rule.id.clone(),
                kind: rule.rule.kind(),
                outcome,
            });
        }

        let after = current.fingerprint();
        Ok(PatchReport {
            document: current,
            rules: reports,
            before,
            after,
        })
    }
}
