use crate::document::Document;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Minimum similarity for a line to be reported as a near miss.
const NEAR_MISS_THRESHOLD: f64 = 0.6;

/// The three edit primitives.
///
/// Every rule is a pure function from one document to the next. Where the
/// rule's anchor is missing the outcome is reported as [`Application::Missing`]
/// and the caller decides, through a [`MatchPolicy`], whether that is fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditRule {
    /// Replace an exact block of text.
    ReplaceBlock {
        old: String,
        new: String,
        occurrence: Occurrence,
    },
    /// Replace the lines from a start marker up to (not including) an end
    /// marker. Markers are compared against the whitespace-trimmed line.
    LineScan {
        start_marker: String,
        end_marker: String,
        replacement: Vec<String>,
    },
    /// Drop everything from the first occurrence of `marker` onwards and
    /// append `tail`.
    ReplaceTail { marker: String, tail: String },
}

/// What to do when a rule's anchor cannot be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    /// Abort the whole run.
    Strict,
    /// Skip the rule and log a warning.
    WarnAndSkip,
    /// Skip the rule quietly.
    SilentSkip,
}

/// What a line scan does when its end marker never shows up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnterminatedPolicy {
    /// Keep the replacement block and drop every line after the start marker.
    #[default]
    DropRest,
    /// Treat it as an error.
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Occurrence {
    #[default]
    First,
    All,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("{rule} has an empty {field}")]
    EmptyMarker {
        rule: &'static str,
        field: &'static str,
    },

    #[error("end marker {end_marker:?} never found after start marker on line {start_line}")]
    Unterminated {
        start_line: usize,
        end_marker: String,
    },
}

/// Result of running one rule against a document.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Application should be checked for a missing anchor"]
pub enum Application {
    /// The rule matched and produced different text.
    Changed(Document),
    /// The rule's result is already present; the text is unchanged.
    AlreadyApplied,
    /// The rule's anchor is absent.
    Missing(Miss),
}

/// Description of an anchor that could not be located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Miss {
    /// First line of the anchor that was searched for.
    pub anchor: String,
    pub near: Option<NearMiss>,
    /// The rule's replacement text is already in the document.
    pub replacement_present: bool,
}

/// The document line most similar to a missing anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct NearMiss {
    /// 1-based line number.
    pub line: usize,
    pub text: String,
    pub similarity: f64,
}

impl Eq for NearMiss {}

impl fmt::Display for Miss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "anchor {:?} not found", self.anchor)?;
        if self.replacement_present {
            write!(f, " (replacement text already present)")?;
        }
        if let Some(near) = &self.near {
            write!(
                f,
                " (closest: line {} {:?}, {:.0}% similar)",
                near.line,
                near.text,
                near.similarity * 100.0
            )?;
        }
        Ok(())
    }
}

impl EditRule {
    pub fn replace_block(old: impl Into<String>, new: impl Into<String>) -> Self {
        EditRule::ReplaceBlock {
            old: old.into(),
            new: new.into(),
            occurrence: Occurrence::First,
        }
    }

    pub fn line_scan<S: Into<String>>(
        start_marker: impl Into<String>,
        end_marker: impl Into<String>,
        replacement: impl IntoIterator<Item = S>,
    ) -> Self {
        EditRule::LineScan {
            start_marker: start_marker.into(),
            end_marker: end_marker.into(),
            replacement: replacement.into_iter().map(Into::into).collect(),
        }
    }

    pub fn replace_tail(marker: impl Into<String>, tail: impl Into<String>) -> Self {
        EditRule::ReplaceTail {
            marker: marker.into(),
            tail: tail.into(),
        }
    }

    /// Kebab-case name used in rule files and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            EditRule::ReplaceBlock { .. } => "replace-block",
            EditRule::LineScan { .. } => "line-scan",
            EditRule::ReplaceTail { .. } => "replace-tail",
        }
    }

    /// Policy used when neither the rule nor the caller picks one.
    ///
    /// Block and line-scan rules skip silently; tail replacement is strict.
    pub fn default_policy(&self) -> MatchPolicy {
        match self {
            EditRule::ReplaceBlock { .. } | EditRule::LineScan { .. } => MatchPolicy::SilentSkip,
            EditRule::ReplaceTail { .. } => MatchPolicy::Strict,
        }
    }

    /// Apply this rule to `doc`, producing the next document.
    pub fn apply(
        &self,
        doc: &Document,
        unterminated: UnterminatedPolicy,
    ) -> Result<Application, RuleError> {
        match self {
            EditRule::ReplaceBlock {
                old,
                new,
                occurrence,
            } => replace_block(doc, old, new, *occurrence),
            EditRule::LineScan {
                start_marker,
                end_marker,
                replacement,
            } => line_scan(doc, start_marker, end_marker, replacement, unterminated),
            EditRule::ReplaceTail { marker, tail } => replace_tail(doc, marker, tail),
        }
    }
}

fn changed_or_applied(doc: &Document, text: String) -> Application {
    if text == doc.as_str() {
        Application::AlreadyApplied
    } else {
        Application::Changed(Document::from(text))
    }
}

fn replace_block(
    doc: &Document,
    old: &str,
    new: &str,
    occurrence: Occurrence,
) -> Result<Application, RuleError> {
    if old.is_empty() {
        return Err(RuleError::EmptyMarker {
            rule: "replace-block",
            field: "old",
        });
    }

    let content = doc.as_str();
    let Some(start) = content.find(old) else {
        let mut miss = miss_for(doc, old);
        miss.replacement_present = !new.is_empty() && content.contains(new);
        return Ok(Application::Missing(miss));
    };

    let text = match occurrence {
        Occurrence::First => {
            let mut text = String::with_capacity(content.len() + new.len());
            text.push_str(&content[..start]);
            text.push_str(new);
            text.push_str(&content[start + old.len()..]);
            text
        }
        Occurrence::All => content.replace(old, new),
    };

    Ok(changed_or_applied(doc, text))
}

fn line_scan(
    doc: &Document,
    start_marker: &str,
    end_marker: &str,
    replacement: &[String],
    unterminated: UnterminatedPolicy,
) -> Result<Application, RuleError> {
    if start_marker.trim().is_empty() {
        return Err(RuleError::EmptyMarker {
            rule: "line-scan",
            field: "start_marker",
        });
    }
    if end_marker.trim().is_empty() {
        return Err(RuleError::EmptyMarker {
            rule: "line-scan",
            field: "end_marker",
        });
    }

    let start_marker = start_marker.trim();
    let end_marker = end_marker.trim();
    let fallback_eol = doc.line_ending();

    let mut output = String::with_capacity(doc.len());
    let mut suppress = false;
    let mut open_line = None;

    for (idx, line) in doc.lines().enumerate() {
        let trimmed = line.trim();

        if suppress {
            if trimmed.starts_with(end_marker) {
                output.push_str(line);
                suppress = false;
            }
            continue;
        }

        if trimmed.starts_with(start_marker) {
            // Replacement lines take the start line's terminator.
            let eol = if line.ends_with("\r\n") {
                "\r\n"
            } else if line.ends_with('\n') {
                "\n"
            } else {
                fallback_eol
            };
            for replacement_line in replacement {
                output.push_str(replacement_line);
                output.push_str(eol);
            }
            suppress = true;
            open_line = Some(idx + 1);
            continue;
        }

        output.push_str(line);
    }

    let Some(start_line) = open_line else {
        return Ok(Application::Missing(miss_for(doc, start_marker)));
    };

    if suppress {
        match unterminated {
            UnterminatedPolicy::Fail => {
                return Err(RuleError::Unterminated {
                    start_line,
                    end_marker: end_marker.to_string(),
                });
            }
            UnterminatedPolicy::DropRest => {
                tracing::warn!(
                    start_line,
                    end_marker,
                    "end marker not found; dropped every line after the start marker"
                );
            }
        }
    }

    Ok(changed_or_applied(doc, output))
}

fn replace_tail(doc: &Document, marker: &str, tail: &str) -> Result<Application, RuleError> {
    if marker.is_empty() {
        return Err(RuleError::EmptyMarker {
            rule: "replace-tail",
            field: "marker",
        });
    }

    let content = doc.as_str();
    let Some(start) = content.find(marker) else {
        return Ok(Application::Missing(miss_for(doc, marker)));
    };

    let mut text = String::with_capacity(start + tail.len());
    text.push_str(&content[..start]);
    text.push_str(tail);
    Ok(changed_or_applied(doc, text))
}

/// Build a [`Miss`] for `anchor`, locating the most similar document line.
fn miss_for(doc: &Document, anchor: &str) -> Miss {
    let probe = anchor
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");

    let near = if probe.is_empty() {
        None
    } else {
        doc.lines()
            .enumerate()
            .map(|(idx, line)| (idx, line.trim()))
            .filter(|(_, line)| !line.is_empty())
            .map(|(idx, line)| (idx, line, strsim::normalized_levenshtein(probe, line)))
            .filter(|(_, _, score)| *score >= NEAR_MISS_THRESHOLD)
            .max_by(|a, b| a.2.total_cmp(&b.2))
            .map(|(idx, line, similarity)| NearMiss {
                line: idx + 1,
                text: line.to_string(),
                similarity,
            })
    };

    Miss {
        anchor: probe.to_string(),
        near,
        replacement_present: false,
    }
}
