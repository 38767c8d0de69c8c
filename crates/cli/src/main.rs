//! Docproof CLI - Main Entry Point
//!
//! Executes the commands documented in README files under a root directory,
//! compares design mockups against their rendered HTML, and writes an HTML
//! and JSON report.
//!
//! Exit codes: `0` everything passed, `1` invalid root or setup failure,
//! `2` at least one instruction or visual check did not pass.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::debug;

mod output;

use docproof_common::{default_config_path, ValidatorConfig};
use docproof_runner::{validate_root, write_reports, Validator};

/// Docproof - README instruction and mockup validator
#[derive(Parser)]
#[command(name = "docproof")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory to scan for README files and mockups
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// HTML report location (default: <root>/logs/validation_report.html)
    #[arg(long)]
    report: Option<PathBuf>,

    /// Run commands that match destructive patterns
    #[arg(long)]
    allow_destructive: bool,

    /// Skip screenshot and mockup comparisons
    #[arg(long)]
    skip_visual: bool,

    /// Allowed normalized pixel difference (default 0.005)
    #[arg(long)]
    visual_tolerance: Option<f64>,

    /// Per-command timeout in seconds (default 600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Configuration file (default: <root>/docproof.toml)
    #[arg(long, env = "DOCPROOF_CONFIG")]
    config: Option<PathBuf>,

    /// Output format for the run summary
    #[arg(long, default_value = "table")]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    /// Layer command-line overrides on top of the file configuration.
    fn apply(&self, mut config: ValidatorConfig, root: PathBuf) -> ValidatorConfig {
        config.root = root;
        if let Some(report) = &self.report {
            config.report = Some(report.clone());
        }
        if self.allow_destructive {
            config.allow_destructive = true;
        }
        if self.skip_visual {
            config.skip_visual = true;
        }
        if let Some(tolerance) = self.visual_tolerance {
            config.visual_tolerance = tolerance;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        config
    }
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let root = match validate_root(&cli.root) {
        Ok(root) => root,
        Err(e) => {
            output::print_error(&e.to_string());
            std::process::exit(1);
        }
    };

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| default_config_path(&root));
    let config = ValidatorConfig::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    let config = cli.apply(config, root);
    debug!("Effective configuration: {:?}", config);

    let validator = Validator::new(config).context("Failed to initialize validator")?;
    let report_path = validator.config().report_path();

    let report = validator.run().await;

    let json_path = write_reports(&report, &report_path)
        .with_context(|| format!("Failed to write report to {}", report_path.display()))?;

    let summary = output::RunSummary::new(&report, &report_path, &json_path);
    output::print_summary(&summary, cli.format);

    if !report.success {
        std::process::exit(2);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overrides_apply_over_file_values() {
        let cli = Cli::parse_from([
            "docproof",
            "--root",
            "/work",
            "--allow-destructive",
            "--visual-tolerance",
            "0.02",
            "--timeout",
            "30",
        ]);
        let file = ValidatorConfig {
            skip_visual: true,
            timeout_secs: 90,
            ..Default::default()
        };

        let config = cli.apply(file, PathBuf::from("/work"));
        assert_eq!(config.root, PathBuf::from("/work"));
        assert!(config.allow_destructive);
        assert!(config.skip_visual);
        assert_eq!(config.visual_tolerance, 0.02);
        assert_eq!(config.timeout_secs, 30);
        assert!(config.report.is_none());
    }

    #[test]
    fn test_defaults_keep_file_values() {
        let cli = Cli::parse_from(["docproof"]);
        assert_eq!(cli.root, PathBuf::from("."));

        let config = cli.apply(ValidatorConfig::default(), PathBuf::from("/r"));
        assert_eq!(config.visual_tolerance, 0.005);
        assert_eq!(config.timeout_secs, 600);
        assert_eq!(
            config.report_path(),
            PathBuf::from("/r/logs/validation_report.html")
        );
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(Cli::try_parse_from(["docproof", "--timeout", "0"]).is_err());
    }
}
