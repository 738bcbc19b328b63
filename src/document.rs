//! In-memory text of a single target file.

use serde::Serialize;
use std::fmt;
use xxhash_rust::xxh3::xxh3_64;

/// Full contents of one target file at a point in time.
///
/// Rules never mutate a `Document` in place; each application produces a new
/// one that replaces the old.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    text: String,
}

/// xxh3 hash of a document's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(pub u64);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Build a document from bare lines, terminating every line with `\n`.
    pub fn from_lines<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut text = String::new();
        for line in lines {
            text.push_str(line.as_ref());
            text.push('\n');
        }
        Self { text }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Lines including their terminators. Concatenating them yields the
    /// original text exactly.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split_inclusive('\n')
    }

    /// Lines with terminators (`\n` or `\r\n`) stripped.
    pub fn bare_lines(&self) -> Vec<&str> {
        self.text.lines().collect()
    }

    /// Terminator used for newly emitted lines.
    pub fn line_ending(&self) -> &'static str {
        match self.text.find('\n') {
            Some(idx) if idx > 0 && self.text.as_bytes()[idx - 1] == b'\r' => "\r\n",
            _ => "\n",
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint(xxh3_64(self.text.as_bytes()))
    }
}

impl From<String> for Document {
    fn from(text: String) -> Self {
        Self { text }
    }
}

impl From<&str> for Document {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
