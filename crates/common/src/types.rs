//! Core types for Docproof

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Instruction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionStatus {
    Pending,
    Info,
    Success,
    Failed,
    Skipped,
}

impl InstructionStatus {
    /// Whether no further transition is expected.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, InstructionStatus::Pending)
    }

    /// Whether this status makes the overall run fail.
    pub fn is_failure(&self) -> bool {
        matches!(self, InstructionStatus::Failed | InstructionStatus::Skipped)
    }
}

impl std::fmt::Display for InstructionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstructionStatus::Pending => write!(f, "pending"),
            InstructionStatus::Info => write!(f, "info"),
            InstructionStatus::Success => write!(f, "success"),
            InstructionStatus::Failed => write!(f, "failed"),
            InstructionStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// One extracted unit of documentation, optionally carrying a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub text: String,
    pub command: Option<String>,
    pub context: Option<String>,
    pub status: InstructionStatus,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

impl Instruction {
    /// Prose instruction. Never executes.
    pub fn prose(text: &str) -> Self {
        Self::new(text, None, None)
    }

    /// Placeholder for a document that could not be read.
    ///
    /// The one command-less instruction that is not `info`: it is `failed` so
    /// the run reports the document instead of passing it silently.
    pub fn unreadable(path: &Path, error: &dyn std::fmt::Display) -> Self {
        let mut instruction = Self::new(&format!("Read {}", path.display()), None, None);
        instruction.mark_failed(format!("Unable to read document: {}", error));
        instruction
    }

    /// Instruction carrying a command, pending execution.
    pub fn command(text: &str, command: &str, context: Option<&str>) -> Self {
        Self::new(text, Some(command), context)
    }

    fn new(text: &str, command: Option<&str>, context: Option<&str>) -> Self {
        let command = command
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from);
        let status = if command.is_some() {
            InstructionStatus::Pending
        } else {
            InstructionStatus::Info
        };

        Self {
            text: text.trim().to_string(),
            command,
            context: context.map(String::from),
            status,
            details: String::new(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn mark_success(&mut self, stdout: String, stderr: String) {
        self.status = InstructionStatus::Success;
        self.stdout = stdout;
        self.stderr = stderr;
    }

    pub fn mark_failed(&mut self, details: impl Into<String>) {
        self.status = InstructionStatus::Failed;
        self.details = details.into();
    }

    pub fn mark_skipped(&mut self, reason: impl Into<String>) {
        self.status = InstructionStatus::Skipped;
        self.details = reason.into();
    }
}

/// A README-like document and the instructions extracted from it, in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub path: PathBuf,
    pub instructions: Vec<Instruction>,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>, instructions: Vec<Instruction>) -> Self {
        Self {
            path: path.into(),
            instructions,
        }
    }

    /// Number of instructions per status, keyed by the status name.
    pub fn status_summary(&self) -> BTreeMap<String, usize> {
        let mut summary = BTreeMap::new();
        for instruction in &self.instructions {
            *summary.entry(instruction.status.to_string()).or_insert(0) += 1;
        }
        summary
    }

    pub fn has_failures(&self) -> bool {
        self.instructions.iter().any(|i| i.status.is_failure())
    }

    /// Directory the document lives in; commands run from here.
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Outcome of the command safety check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub allowed: bool,
    /// Set only when `allowed` is false.
    pub reason: Option<String>,
}

impl ClassificationResult {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Visual comparison status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStatus {
    NotRun,
    NoHtml,
    Error,
    Match,
    Mismatch,
}

impl PairStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, PairStatus::Error | PairStatus::Mismatch)
    }
}

impl Default for PairStatus {
    fn default() -> Self {
        Self::NotRun
    }
}

impl std::fmt::Display for PairStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PairStatus::NotRun => write!(f, "not_run"),
            PairStatus::NoHtml => write!(f, "no_html"),
            PairStatus::Error => write!(f, "error"),
            PairStatus::Match => write!(f, "match"),
            PairStatus::Mismatch => write!(f, "mismatch"),
        }
    }
}

/// A reference image paired with the HTML document it should depict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockupPair {
    pub mockup_path: PathBuf,
    pub html_path: Option<PathBuf>,
    pub status: PairStatus,
    /// 0.0 - 100.0
    pub match_percent: Option<f64>,
    pub screenshot_path: Option<PathBuf>,
    pub diff_image_path: Option<PathBuf>,
    #[serde(default)]
    pub details: String,
}

impl MockupPair {
    /// Unevaluated pair.
    pub fn new(mockup_path: impl Into<PathBuf>, html_path: Option<PathBuf>) -> Self {
        Self {
            mockup_path: mockup_path.into(),
            html_path,
            status: PairStatus::NotRun,
            match_percent: None,
            screenshot_path: None,
            diff_image_path: None,
            details: String::new(),
        }
    }

    /// Mockup with no HTML document to compare against.
    pub fn no_html(mockup_path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        Self {
            status: PairStatus::NoHtml,
            details: details.into(),
            ..Self::new(mockup_path, None)
        }
    }

    pub fn with_status(mut self, status: PairStatus, details: impl Into<String>) -> Self {
        self.status = status;
        self.details = details.into();
        self
    }
}

/// Aggregate result of one validation run. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub generated_at: DateTime<Utc>,
    pub root: PathBuf,
    pub documents: Vec<Document>,
    pub visual_results: Vec<MockupPair>,
    pub success: bool,
}

impl ValidationReport {
    pub fn assemble(
        root: impl Into<PathBuf>,
        documents: Vec<Document>,
        visual_results: Vec<MockupPair>,
    ) -> Self {
        let success = overall_success(&documents, &visual_results);
        Self {
            generated_at: Utc::now(),
            root: root.into(),
            documents,
            visual_results,
            success,
        }
    }

    /// Generation timestamp as `YYYY-MM-DDTHH:MM:SSZ`.
    pub fn generated_at_display(&self) -> String {
        self.generated_at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    pub fn instruction_count(&self) -> usize {
        self.documents.iter().map(|d| d.instructions.len()).sum()
    }
}

/// False if any instruction failed or was skipped, or any pair mismatched or errored.
pub fn overall_success(documents: &[Document], pairs: &[MockupPair]) -> bool {
    !documents.iter().any(Document::has_failures) && !pairs.iter().any(|p| p.status.is_failure())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prose_instruction_is_info() {
        let i = Instruction::prose("  Run the setup script ");
        assert_eq!(i.text, "Run the setup script");
        assert_eq!(i.status, InstructionStatus::Info);
        assert!(i.command.is_none());
        assert!(i.status.is_terminal());
    }

    #[test]
    fn test_unreadable_instruction_fails_without_command() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let instruction = Instruction::unreadable(Path::new("/r/README.md"), &err);
        assert!(instruction.command.is_none());
        assert_eq!(instruction.status, InstructionStatus::Failed);
        assert_eq!(instruction.text, "Read /r/README.md");
        assert_eq!(instruction.details, "Unable to read document: denied");

        let doc = Document::new("/r/README.md", vec![instruction]);
        assert!(doc.has_failures());
    }

    #[test]
    fn test_command_instruction_is_pending() {
        let i = Instruction::command("echo hi", " echo hi ", None);
        assert_eq!(i.command.as_deref(), Some("echo hi"));
        assert_eq!(i.status, InstructionStatus::Pending);
        assert!(!i.status.is_terminal());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&PairStatus::NoHtml).unwrap();
        assert_eq!(json, "\"no_html\"");
        let json = serde_json::to_string(&InstructionStatus::Skipped).unwrap();
        assert_eq!(json, "\"skipped\"");
        assert_eq!(PairStatus::NotRun.to_string(), "not_run");
    }

    #[test]
    fn test_status_summary_counts() {
        let mut failed = Instruction::command("false", "false", None);
        failed.mark_failed("Exit code 1.");
        let doc = Document::new(
            "/repo/README.md",
            vec![Instruction::prose("a"), Instruction::prose("b"), failed],
        );

        let summary = doc.status_summary();
        assert_eq!(summary.get("info"), Some(&2));
        assert_eq!(summary.get("failed"), Some(&1));
        assert!(doc.has_failures());
        assert_eq!(doc.directory(), Path::new("/repo"));
    }

    #[test]
    fn test_overall_success() {
        let mut ok = Instruction::command("true", "true", None);
        ok.mark_success(String::new(), String::new());
        let docs = vec![Document::new("/r/README", vec![ok])];

        assert!(overall_success(&docs, &[]));
        assert!(overall_success(&docs, &[MockupPair::new("/r/a.png", None)]));

        let mismatch = MockupPair::new("/r/a.png", None).with_status(PairStatus::Mismatch, "diff");
        assert!(!overall_success(&docs, &[mismatch]));

        let mut skipped = Instruction::command("sudo ls", "sudo ls", None);
        skipped.mark_skipped("destructive");
        let docs = vec![Document::new("/r/README", vec![skipped])];
        assert!(!overall_success(&docs, &[]));
    }

    #[test]
    fn test_report_timestamp_format() {
        let report = ValidationReport::assemble("/r", vec![], vec![]);
        let ts = report.generated_at_display();
        assert_eq!(ts.len(), 20);
        assert!(ts.ends_with('Z'));
        assert!(report.success);
    }
}
