//! Command safety classification
//!
//! Heuristic risk reduction only: commands matching a destructive pattern are
//! held back unless explicitly allowed, and absolute paths must stay inside
//! the scanned root.

use std::path::{Component, Path, PathBuf};

use regex::{Regex, RegexBuilder};
use thiserror::Error;
use tracing::debug;

use docproof_common::{ClassificationResult, CommandPolicy};

pub const DESTRUCTIVE_REASON: &str = "Skipped destructive command (requires --allow-destructive).";

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Invalid destructive pattern '{name}': {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },
}

/// Decides whether a command may run inside a trust boundary.
#[derive(Debug, Clone)]
pub struct CommandClassifier {
    patterns: Vec<(String, Regex)>,
    root: PathBuf,
    allow_destructive: bool,
}

impl CommandClassifier {
    /// Compile the policy's patterns case-insensitively.
    pub fn new(
        policy: &CommandPolicy,
        root: &Path,
        allow_destructive: bool,
    ) -> Result<Self, ClassifierError> {
        let patterns = policy
            .destructive_patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(&p.regex)
                    .case_insensitive(true)
                    .build()
                    .map(|re| (p.name.clone(), re))
                    .map_err(|source| ClassifierError::InvalidPattern {
                        name: p.name.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            root: resolve(root),
            allow_destructive,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn classify(&self, command: &str) -> ClassificationResult {
        if let Some(name) = self.destructive_match(command) {
            debug!("'{}' matches destructive pattern '{}'", command, name);
            return if self.allow_destructive {
                ClassificationResult::allow()
            } else {
                ClassificationResult::reject(DESTRUCTIVE_REASON)
            };
        }

        match self.escaping_path(command) {
            Some(token) => ClassificationResult::reject(format!(
                "Command references path outside root: {}",
                token
            )),
            None => ClassificationResult::allow(),
        }
    }

    /// Name of the first destructive pattern the command matches.
    pub fn destructive_match(&self, command: &str) -> Option<&str> {
        let command = command.trim();
        self.patterns
            .iter()
            .find(|(_, re)| re.is_match(command))
            .map(|(name, _)| name.as_str())
    }

    /// First absolute-path token that resolves outside the root.
    ///
    /// A command that cannot be tokenized has no tokens.
    pub fn escaping_path(&self, command: &str) -> Option<String> {
        let tokens = shell_words::split(command).unwrap_or_default();
        tokens
            .into_iter()
            .filter(|token| token.starts_with('/'))
            .find(|token| !resolve(Path::new(token)).starts_with(&self.root))
    }
}

/// Absolute, symlink-resolved form of `path`.
///
/// Missing trailing components are kept lexically on top of the deepest
/// existing ancestor.
fn resolve(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let normalized = normalize(&absolute);

    let mut existing = normalized.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return normalized,
        }
    }
}

/// Collapse `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
