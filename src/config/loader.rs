use crate::config::schema::{RuleSet, ValidationError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read rule file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse rule file TOML{}: {source}", located(.path))]
    Toml {
        path: Option<PathBuf>,
        #[source]
        source: toml_edit::de::Error,
    },

    #[error("invalid rule file{}: {source}", located(.path))]
    Validation {
        path: Option<PathBuf>,
        #[source]
        source: ValidationError,
    },

    #[error("failed to scan {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("no .toml rule files found in {}", .0.display())]
    NoRuleFiles(PathBuf),
}

/// ` (path)` when the error has been tied to a file, empty otherwise.
fn located(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|path| format!(" ({})", path.display()))
        .unwrap_or_default()
}

impl ConfigError {
    /// Tie a parse or validation error to the file it came from.
    fn with_path(self, path: &Path) -> Self {
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path.to_path_buf()),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path.to_path_buf()),
                source,
            },
            other => other,
        }
    }
}

pub fn load_from_str(input: &str) -> Result<RuleSet, ConfigError> {
    let rule_set: RuleSet = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    rule_set
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(rule_set)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<RuleSet, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// Resolve a rule path into the files to apply, in order.
///
/// A file is returned as-is. A directory yields its `*.toml` files (not
/// recursive) sorted by name, so `01-...`, `02-...` run in sequence.
pub fn discover_rule_files(path: impl AsRef<Path>) -> Result<Vec<PathBuf>, ConfigError> {
    let path = path.as_ref();

    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file or directory"),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|source| ConfigError::Walk {
            path: path.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
        {
            files.push(entry.path().to_path_buf());
        }
    }

    if files.is_empty() {
        return Err(ConfigError::NoRuleFiles(path.to_path_buf()));
    }

    files.sort();
    Ok(files)
}
