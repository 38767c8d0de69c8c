//! Validator configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Name of the optional configuration file looked up in the scan root.
pub const CONFIG_FILE_NAME: &str = "docproof.toml";

/// Top-level validator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Repository root to scan
    pub root: PathBuf,

    /// HTML report location (None = `<root>/logs/validation_report.html`)
    pub report: Option<PathBuf>,

    /// Permit commands that match destructive patterns
    pub allow_destructive: bool,

    /// Skip screenshot and mockup comparisons
    pub skip_visual: bool,

    /// Allowed normalized pixel difference before flagging a mismatch
    pub visual_tolerance: f64,

    /// Per-command timeout in seconds
    pub timeout_secs: u64,

    /// Environment variable exported to commands with the scan root
    pub root_env_var: String,

    /// Command classification and execution policy
    pub policy: CommandPolicy,

    /// Renderer configuration
    pub visual: VisualSettings,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            report: None,
            allow_destructive: false,
            skip_visual: false,
            visual_tolerance: 0.005,
            timeout_secs: 600,
            root_env_var: "PROJECT_ROOT".to_string(),
            policy: CommandPolicy::default(),
            visual: VisualSettings::default(),
        }
    }
}

/// A named destructive-action pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestructivePattern {
    pub name: String,
    pub regex: String,
}

impl DestructivePattern {
    pub fn new(name: &str, regex: &str) -> Self {
        Self {
            name: name.to_string(),
            regex: regex.to_string(),
        }
    }
}

/// Immutable policy data handed to the classifier and executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandPolicy {
    /// Matched case-insensitively against the whole command
    pub destructive_patterns: Vec<DestructivePattern>,

    /// Any of these substrings routes the command through the shell
    pub shell_meta_chars: Vec<String>,

    /// Shell program and arguments; the command string is appended
    pub shell: Vec<String>,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self {
            destructive_patterns: vec![
                DestructivePattern::new("rm", r"\brm\b"),
                DestructivePattern::new("mkfs", r"\bmkfs\b"),
                DestructivePattern::new("dd", r"\bdd\b"),
                DestructivePattern::new("shutdown", r"\bshutdown\b"),
                DestructivePattern::new("reboot", r"\breboot\b"),
                DestructivePattern::new("poweroff", r"\bpoweroff\b"),
                DestructivePattern::new("init 0", r"\binit\s+0\b"),
                DestructivePattern::new("git reset --hard", r"\bgit\s+reset\s+--hard\b"),
                DestructivePattern::new("git clean", r"\bgit\s+clean\b"),
                DestructivePattern::new("sudo", r"\bsudo\b"),
            ],
            shell_meta_chars: ["|", "&", ";", ">", "<", "*", "$(", "`", "||", "&&"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            shell: vec!["bash".to_string(), "-lc".to_string()],
        }
    }
}

/// Renderer and comparison settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualSettings {
    /// Browser engines tried in order; the first that launches wins
    pub engines: Vec<String>,

    /// Navigation timeout in milliseconds
    pub navigation_timeout_ms: u64,

    /// Delay after the load event before the screenshot
    pub settle_delay_ms: u64,

    /// Node.js executable used to drive Playwright
    pub node_binary: String,

    /// Extra module search path for the `playwright` package
    pub node_path: Option<PathBuf>,

    /// Scale factor applied to difference pixels in the persisted diff image
    pub diff_amplification: u8,
}

impl Default for VisualSettings {
    fn default() -> Self {
        Self {
            engines: vec![
                "chromium".to_string(),
                "webkit".to_string(),
                "firefox".to_string(),
            ],
            navigation_timeout_ms: 60_000,
            settle_delay_ms: 1_500,
            node_binary: "node".to_string(),
            node_path: None,
            diff_amplification: 4,
        }
    }
}

impl ValidatorConfig {
    /// Load configuration from file, falling back to defaults when it is absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            tracing::debug!("Loaded configuration from {}", path.display());
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolved HTML report path
    pub fn report_path(&self) -> PathBuf {
        self.report
            .clone()
            .unwrap_or_else(|| self.root.join("logs").join("validation_report.html"))
    }

    /// Directory for screenshots and diff images
    pub fn assets_dir(&self) -> PathBuf {
        let report = self.report_path();
        report
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("assets")
    }

    /// Tolerance clamped to be non-negative
    pub fn effective_tolerance(&self) -> f64 {
        self.visual_tolerance.max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ValidatorConfig::default();
        assert_eq!(config.visual_tolerance, 0.005);
        assert_eq!(config.timeout_secs, 600);
        assert!(!config.allow_destructive);
        assert!(!config.skip_visual);
        assert_eq!(config.policy.destructive_patterns.len(), 10);
        assert_eq!(config.policy.shell, vec!["bash", "-lc"]);
        assert_eq!(config.visual.engines, vec!["chromium", "webkit", "firefox"]);
    }

    #[test]
    fn test_report_and_assets_paths() {
        let config = ValidatorConfig {
            root: PathBuf::from("/work"),
            ..Default::default()
        };
        assert_eq!(
            config.report_path(),
            PathBuf::from("/work/logs/validation_report.html")
        );
        assert_eq!(config.assets_dir(), PathBuf::from("/work/logs/assets"));

        let config = ValidatorConfig {
            report: Some(PathBuf::from("/tmp/out/report.html")),
            ..config
        };
        assert_eq!(config.assets_dir(), PathBuf::from("/tmp/out/assets"));
    }

    #[test]
    fn test_negative_tolerance_clamped() {
        let config = ValidatorConfig {
            visual_tolerance: -1.0,
            ..Default::default()
        };
        assert_eq!(config.effective_tolerance(), 0.0);
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ValidatorConfig::load(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config, ValidatorConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"
timeout_secs = 30

[visual]
engines = ["firefox"]
settle_delay_ms = 0
"#,
        )
        .unwrap();

        let config = ValidatorConfig::load(&path).unwrap();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.visual.engines, vec!["firefox"]);
        assert_eq!(config.visual.settle_delay_ms, 0);
        assert_eq!(config.visual.navigation_timeout_ms, 60_000);
        assert_eq!(config.policy, CommandPolicy::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let config = ValidatorConfig {
            allow_destructive: true,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(ValidatorConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "timeout_secs = \"soon\"").unwrap();
        let err = ValidatorConfig::load(&path).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }
}
