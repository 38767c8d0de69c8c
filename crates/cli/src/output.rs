//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use docproof_common::{Document, InstructionStatus, MockupPair, PairStatus, ValidationReport};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Plain text format
    Plain,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

/// Render a list of items as a table, or as `header: value` blocks.
fn render_list<T: TableDisplay>(items: &[T], format: OutputFormat) -> String {
    match format {
        OutputFormat::Plain => items
            .iter()
            .map(|item| {
                T::headers()
                    .iter()
                    .zip(item.row())
                    .map(|(header, value)| format!("{}: {}", header, value))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect::<Vec<_>>()
            .join("\n---\n"),
        _ => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }

            table.to_string()
        }
    }
}

/// Print a list of items
pub fn print_list<T: TableDisplay>(items: &[T], format: OutputFormat, empty: &str) {
    if items.is_empty() {
        println!("{}", empty);
        return;
    }
    println!("{}", render_list(items, format));
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("⚠️  {}", message);
}

/// Per-document row of the run summary
#[derive(Debug, Serialize)]
pub struct DocumentRow {
    pub path: String,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub info: usize,
}

impl DocumentRow {
    fn from_document(document: &Document, root: &std::path::Path) -> Self {
        let count = |status: InstructionStatus| {
            document
                .instructions
                .iter()
                .filter(|i| i.status == status)
                .count()
        };
        Self {
            path: relative(&document.path, root),
            success: count(InstructionStatus::Success),
            failed: count(InstructionStatus::Failed),
            skipped: count(InstructionStatus::Skipped),
            info: count(InstructionStatus::Info),
        }
    }

    fn passed(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

impl TableDisplay for DocumentRow {
    fn headers() -> Vec<&'static str> {
        vec!["", "DOCUMENT", "SUCCESS", "FAILED", "SKIPPED", "INFO"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            if self.passed() {
                "✓".green().to_string()
            } else {
                "✗".red().to_string()
            },
            self.path.clone(),
            self.success.to_string(),
            self.failed.to_string(),
            self.skipped.to_string(),
            self.info.to_string(),
        ]
    }
}

/// Per-pair row of the run summary
#[derive(Debug, Serialize)]
pub struct PairRow {
    pub mockup: String,
    pub html: Option<String>,
    pub status: PairStatus,
    pub match_percent: Option<f64>,
    pub details: String,
}

impl PairRow {
    fn from_pair(pair: &MockupPair, root: &std::path::Path) -> Self {
        Self {
            mockup: relative(&pair.mockup_path, root),
            html: pair.html_path.as_ref().map(|p| relative(p, root)),
            status: pair.status,
            match_percent: pair.match_percent,
            details: pair.details.clone(),
        }
    }
}

impl TableDisplay for PairRow {
    fn headers() -> Vec<&'static str> {
        vec!["", "MOCKUP", "HTML", "MATCH %", "DETAILS"]
    }

    fn row(&self) -> Vec<String> {
        let marker = match self.status {
            PairStatus::Match => "✓".green(),
            PairStatus::Mismatch | PairStatus::Error => "✗".red(),
            PairStatus::NotRun | PairStatus::NoHtml => "-".yellow(),
        };
        vec![
            format!("{} {}", marker, self.status),
            self.mockup.clone(),
            self.html.clone().unwrap_or_else(|| "-".to_string()),
            self.match_percent
                .map(|p| format!("{:.2}", p))
                .unwrap_or_else(|| "-".to_string()),
            self.details.clone(),
        ]
    }
}

/// Machine-readable run summary for `--format json|yaml`
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub root: String,
    pub success: bool,
    pub report: String,
    pub json_report: String,
    pub documents: Vec<DocumentRow>,
    pub visual_results: Vec<PairRow>,
}

impl RunSummary {
    pub fn new(
        report: &ValidationReport,
        html_path: &std::path::Path,
        json_path: &std::path::Path,
    ) -> Self {
        Self {
            root: report.root.display().to_string(),
            success: report.success,
            report: html_path.display().to_string(),
            json_report: json_path.display().to_string(),
            documents: report
                .documents
                .iter()
                .map(|d| DocumentRow::from_document(d, &report.root))
                .collect(),
            visual_results: report
                .visual_results
                .iter()
                .map(|p| PairRow::from_pair(p, &report.root))
                .collect(),
        }
    }
}

/// Print the end-of-run summary in the requested format
pub fn print_summary(summary: &RunSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(summary).unwrap_or_default());
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(summary).unwrap_or_default());
        }
        OutputFormat::Table | OutputFormat::Plain => {
            println!("\n{}", "Documents".bold());
            print_list(&summary.documents, format, "No README files found.");
            println!("\n{}", "Visual checks".bold());
            print_list(&summary.visual_results, format, "No mockups detected.");
            println!();

            if summary.success {
                print_success(&format!("Validation passed. Report: {}", summary.report));
            } else {
                print_warning(&format!("Validation failed. Report: {}", summary.report));
            }
        }
    }
}

fn relative(path: &std::path::Path, root: &std::path::Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docproof_common::Instruction;
    use std::path::Path;

    fn sample_report() -> ValidationReport {
        let mut ok = Instruction::command("echo hi", "echo hi", None);
        ok.mark_success("hi\n".to_string(), String::new());
        let mut skipped = Instruction::command("sudo ls", "sudo ls", None);
        skipped.mark_skipped("Skipped destructive command (requires --allow-destructive).");

        let docs = vec![
            Document::new("/work/README.md", vec![Instruction::prose("Intro"), ok.clone()]),
            Document::new("/work/sub/README.md", vec![ok, skipped]),
        ];
        let pairs = vec![MockupPair::no_html(
            "/work/sub/home.png",
            "No HTML files found in directory for comparison.",
        )];
        ValidationReport::assemble("/work", docs, pairs)
    }

    #[test]
    fn test_summary_rows() {
        let report = sample_report();
        let summary = RunSummary::new(
            &report,
            Path::new("/work/logs/r.html"),
            Path::new("/work/logs/r.json"),
        );

        assert!(!summary.success);
        assert_eq!(summary.documents.len(), 2);
        assert_eq!(summary.documents[0].path, "README.md");
        assert_eq!(summary.documents[0].info, 1);
        assert!(summary.documents[0].passed());
        assert_eq!(summary.documents[1].skipped, 1);
        assert!(!summary.documents[1].passed());

        assert_eq!(summary.visual_results[0].mockup, "sub/home.png");
        assert_eq!(summary.visual_results[0].status, PairStatus::NoHtml);
        assert!(summary.visual_results[0].html.is_none());
    }

    #[test]
    fn test_plain_rendering() {
        colored::control::set_override(false);
        let report = sample_report();
        let summary = RunSummary::new(&report, Path::new("r.html"), Path::new("r.json"));

        let text = render_list(&summary.documents, OutputFormat::Plain);
        assert!(text.contains("DOCUMENT: README.md"));
        assert!(text.contains("SKIPPED: 1"));
        assert!(text.contains("\n---\n"));

        let text = render_list(&summary.visual_results, OutputFormat::Plain);
        assert!(text.contains("MATCH %: -"));
        assert!(text.contains("no_html"));
    }

    #[test]
    fn test_table_rendering() {
        let report = sample_report();
        let summary = RunSummary::new(&report, Path::new("r.html"), Path::new("r.json"));
        let table = render_list(&summary.documents, OutputFormat::Table);
        assert!(table.contains("DOCUMENT"));
        assert!(table.contains("sub/README.md"));
    }

    #[test]
    fn test_json_summary_shape() {
        let report = sample_report();
        let summary = RunSummary::new(&report, Path::new("r.html"), Path::new("r.json"));
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["visual_results"][0]["status"], "no_html");
        assert_eq!(value["documents"][1]["skipped"], 1);
    }
}
