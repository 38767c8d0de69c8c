//! HTML and JSON report writers

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::info;

use docproof_common::{Document, Instruction, MockupPair, ValidationReport};

const STYLE: &str = r#"
      body {
        font-family: Arial, sans-serif;
        margin: 2rem;
        background: #f4f6fb;
        color: #1c2333;
      }
      h1 {
        margin-top: 0;
      }
      table {
        width: 100%;
        border-collapse: collapse;
        margin-bottom: 2rem;
        background: #fff;
        box-shadow: 0 4px 12px rgba(0,0,0,0.05);
      }
      th, td {
        border: 1px solid #d8deeb;
        padding: 0.6rem 0.75rem;
        vertical-align: top;
        text-align: left;
      }
      th {
        background: #eef2fb;
      }
      details > pre {
        background: #121826;
        color: #e8ecf7;
        padding: 0.75rem;
        overflow-x: auto;
      }
      pre {
        white-space: pre-wrap;
      }
      .status-success { color: #1a7f37; }
      .status-failed, .status-mismatch, .status-error { color: #cf222e; }
      .status-skipped, .status-not_run, .status-no_html { color: #9a6700; }
      .visual-card {
        background: #fff;
        padding: 1rem;
        margin-bottom: 1.5rem;
        box-shadow: 0 4px 12px rgba(0,0,0,0.05);
      }
      .visual-card img {
        max-width: 100%;
        height: auto;
        margin-top: 0.75rem;
        border: 1px solid #d8deeb;
      }
"#;

/// Escape text for HTML element content and quoted attributes.
pub fn html_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

/// Render the report page. Image links are made relative to `report_dir`.
pub fn render_html(report: &ValidationReport, report_dir: &Path) -> String {
    let documents: String = report.documents.iter().map(document_section).collect();

    let visuals: String = report
        .visual_results
        .iter()
        .enumerate()
        .map(|(idx, pair)| visual_card(idx + 1, pair, report_dir))
        .collect();
    let visuals = if visuals.is_empty() {
        "<p>No mockups detected.</p>".to_string()
    } else {
        visuals
    };

    let overall = if report.success { "passed" } else { "failed" };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <title>Project Validation Report</title>
    <style>{style}</style>
  </head>
  <body>
    <h1>Validation Report</h1>
    <p><strong>Generated:</strong> {generated}</p>
    <p><strong>Root:</strong> {root}</p>
    <p><strong>Result:</strong> <span class="status-{overall_class}">{overall}</span></p>
    <section>
      <h2>README Execution</h2>
      {documents}
    </section>
    <section>
      <h2>Visual Regression Checks</h2>
      {visuals}
    </section>
  </body>
</html>
"#,
        style = STYLE,
        generated = html_escape(&report.generated_at_display()),
        root = html_escape(&report.root.display().to_string()),
        overall_class = if report.success { "success" } else { "failed" },
        overall = overall,
        documents = documents,
        visuals = visuals,
    )
}

fn document_section(document: &Document) -> String {
    let summary = serde_json::to_string_pretty(&document.status_summary()).unwrap_or_default();

    let mut rows = String::new();
    for (idx, instruction) in document.instructions.iter().enumerate() {
        let _ = write!(
            rows,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td class=\"status-{status}\">{status}</td><td>{}{}</td></tr>",
            idx + 1,
            html_escape(&instruction.text),
            html_escape(instruction.command.as_deref().unwrap_or("")),
            html_escape(&instruction.details),
            output_block(instruction),
            status = html_escape(&instruction.status.to_string()),
        );
    }

    format!(
        "<h2>{path}</h2>\
         <details open><summary>Instruction Status Summary</summary><pre>{summary}</pre></details>\
         <table>\
         <thead><tr><th>#</th><th>Instruction</th><th>Command</th><th>Status</th><th>Notes</th></tr></thead>\
         <tbody>{rows}</tbody>\
         </table>",
        path = html_escape(&document.path.display().to_string()),
        summary = html_escape(&summary),
        rows = rows,
    )
}

fn output_block(instruction: &Instruction) -> String {
    let mut combined = String::new();
    if !instruction.stdout.is_empty() {
        combined.push_str("<strong>stdout</strong>\n");
        combined.push_str(&html_escape(&instruction.stdout));
    }
    if !instruction.stderr.is_empty() {
        if !combined.is_empty() {
            combined.push_str("\n\n");
        }
        combined.push_str("<strong>stderr</strong>\n");
        combined.push_str(&html_escape(&instruction.stderr));
    }

    if combined.is_empty() {
        String::new()
    } else {
        format!(
            "<details><summary>Command Output</summary><pre>{}</pre></details>",
            combined
        )
    }
}

fn visual_card(idx: usize, pair: &MockupPair, report_dir: &Path) -> String {
    let html_page = pair
        .html_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let match_percent = pair
        .match_percent
        .map(|p| format!("{:.2}", p))
        .unwrap_or_default();

    let image = |path: &Option<PathBuf>, alt: &str| {
        path.as_ref()
            .map(|p| {
                format!(
                    "<img src=\"{}\" alt=\"{}\">",
                    html_escape(&relative_src(p, report_dir)),
                    alt
                )
            })
            .unwrap_or_default()
    };

    format!(
        "<div class='visual-card'>\
         <h3>#{idx} &ndash; <span class=\"status-{status}\">{status}</span></h3>\
         <ul>\
         <li><strong>Mockup:</strong> {mockup}</li>\
         <li><strong>HTML:</strong> {html}</li>\
         <li><strong>Match %:</strong> {percent}</li>\
         <li><strong>Details:</strong> {details}</li>\
         </ul>\
         {screenshot}{diff}\
         </div>",
        idx = idx,
        status = html_escape(&pair.status.to_string()),
        mockup = html_escape(&pair.mockup_path.display().to_string()),
        html = html_escape(&html_page),
        percent = html_escape(&match_percent),
        details = html_escape(&pair.details),
        screenshot = image(&pair.screenshot_path, "Screenshot"),
        diff = image(&pair.diff_image_path, "Diff"),
    )
}

/// `path` relative to the report directory when it lives below it.
fn relative_src(path: &Path, report_dir: &Path) -> String {
    let relative = path.strip_prefix(report_dir).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Location of the JSON report for the HTML report at `html_path`.
///
/// `<dir>/<stem>.json`, or `<dir>/<stem>.data.json` when the HTML report
/// itself already ends in `.json`.
pub fn json_report_path(html_path: &Path) -> PathBuf {
    let candidate = html_path.with_extension("json");
    if candidate != html_path {
        return candidate;
    }
    let stem = html_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "validation_report".to_string());
    html_path.with_file_name(format!("{}.data.json", stem))
}

/// Write the HTML report to `path` and the JSON report beside it.
///
/// Returns the JSON report's path.
pub fn write_reports(report: &ValidationReport, path: &Path) -> std::io::Result<PathBuf> {
    let report_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&report_dir)?;

    std::fs::write(path, render_html(report, &report_dir))?;
    info!("Report written to {}", path.display());

    let json_path = json_report_path(path);
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(&json_path, json)?;
    info!("JSON report written to {}", json_path.display());

    Ok(json_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docproof_common::PairStatus;

    fn sample_report(dir: &Path) -> ValidationReport {
        let mut ok = Instruction::command("echo <b>", "echo <b>", None);
        ok.mark_success("<b>\n".to_string(), String::new());
        let mut failed = Instruction::command("false", "false", None);
        failed.mark_failed("Exit code 1.");

        let document = Document::new(
            dir.join("README.md"),
            vec![Instruction::prose("Tom & Jerry's \"setup\""), ok, failed],
        );

        let assets = dir.join("logs").join("assets");
        let mut pair = MockupPair::new(dir.join("home.png"), Some(dir.join("home.html")))
            .with_status(PairStatus::Mismatch, "Visual diff exceeds tolerance (0.2000 > 0.0050).");
        pair.match_percent = Some(80.0);
        pair.screenshot_path = Some(assets.join("home_render.png"));
        pair.diff_image_path = Some(assets.join("home_diff.png"));

        ValidationReport::assemble(dir, vec![document], vec![pair])
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(
            html_escape(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#x27;Jerry&#x27;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_render_html_escapes_and_links_assets() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample_report(dir.path());
        let html = render_html(&report, &dir.path().join("logs"));

        assert!(html.contains("Tom &amp; Jerry&#x27;s &quot;setup&quot;"));
        assert!(html.contains("<td>echo &lt;b&gt;</td>"));
        assert!(html.contains("<strong>stdout</strong>\n&lt;b&gt;"));
        assert!(!html.contains("<b>\n"));
        assert!(html.contains("src=\"assets/home_render.png\""));
        assert!(html.contains("src=\"assets/home_diff.png\""));
        assert!(html.contains("<li><strong>Match %:</strong> 80.00</li>"));
        assert!(html.contains("&quot;failed&quot;: 1"));
        assert!(html.contains(&report.generated_at_display()));
        assert!(!html.contains("No mockups detected."));
    }

    #[test]
    fn test_render_html_without_mockups() {
        let report = ValidationReport::assemble("/r", vec![], vec![]);
        let html = render_html(&report, Path::new("/r/logs"));
        assert!(html.contains("<p>No mockups detected.</p>"));
        assert!(html.contains("passed"));
    }

    #[test]
    fn test_json_report_path() {
        assert_eq!(
            json_report_path(Path::new("/r/logs/validation_report.html")),
            PathBuf::from("/r/logs/validation_report.json")
        );
        assert_eq!(
            json_report_path(Path::new("/r/out/summary")),
            PathBuf::from("/r/out/summary.json")
        );
        assert_eq!(
            json_report_path(Path::new("/r/out/validation_report.json")),
            PathBuf::from("/r/out/validation_report.data.json")
        );
    }

    #[test]
    fn test_html_report_named_json_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample_report(dir.path());
        let html_path = dir.path().join("validation_report.json");

        let json_path = write_reports(&report, &html_path).unwrap();
        assert_ne!(json_path, html_path);
        assert!(std::fs::read_to_string(&html_path)
            .unwrap()
            .starts_with("<!DOCTYPE html>"));
        let parsed: ValidationReport =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(parsed.documents.len(), 1);
    }

    #[test]
    fn test_write_reports() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample_report(dir.path());
        let html_path = dir.path().join("out").join("report.html");

        let json_path = write_reports(&report, &html_path).unwrap();
        assert!(html_path.exists());
        assert_eq!(json_path, dir.path().join("out").join("report.json"));

        let parsed: ValidationReport =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.documents[0].instructions.len(), 3);
        assert_eq!(parsed.visual_results[0].status, PairStatus::Mismatch);
    }
}
