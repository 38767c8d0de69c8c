//! Validation run orchestration
//!
//! Discovers README documents, runs their commands, compares mockups once per
//! directory and assembles the [`ValidationReport`]. Everything runs
//! sequentially: commands have working-directory side effects and the
//! renderer session is a single shared resource.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use docproof_common::{
    Document, Error, Instruction, MockupPair, PairStatus, Result, ValidationReport, ValidatorConfig,
};
use docproof_visual::{pair_mockups, VisualComparator};

use crate::classifier::{ClassifierError, CommandClassifier};
use crate::executor::CommandExecutor;
use crate::extractor::InstructionExtractor;

pub const SKIPPED_VISUAL_DETAILS: &str = "Visual comparison skipped (--skip-visual).";

/// Whether a file name looks like a README (`README`, `readme.md`, `ReadMe.rst`, ...).
pub fn is_readme_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower == "readme" || lower.starts_with("readme.")
}

/// README-like files under `root`, sorted by path.
pub fn discover_documents(root: &Path) -> Vec<PathBuf> {
    let mut documents: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable path: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| is_readme_name(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.into_path())
        .collect();
    documents.sort();
    documents
}

/// Canonical scan root, or the reason it is unusable.
pub fn validate_root(root: &Path) -> Result<PathBuf> {
    if !root.exists() {
        return Err(Error::root_missing(root));
    }
    if !root.is_dir() {
        return Err(Error::root_not_dir(root));
    }
    Ok(root.canonicalize()?)
}

/// Drives one validation run.
pub struct Validator {
    config: ValidatorConfig,
    root: PathBuf,
    extractor: InstructionExtractor,
    classifier: CommandClassifier,
    executor: CommandExecutor,
    comparator: Option<VisualComparator>,
    visited_dirs: HashSet<PathBuf>,
}

impl Validator {
    /// Validate the root and compile the command policy.
    pub fn new(config: ValidatorConfig) -> Result<Self> {
        let root = validate_root(&config.root)?;
        let classifier = CommandClassifier::new(&config.policy, &root, config.allow_destructive)
            .map_err(|e: ClassifierError| Error::Internal(e.to_string()))?;
        let executor = CommandExecutor::new(&config.policy, config.timeout_secs)
            .with_env(config.root_env_var.clone(), root.clone().into_os_string());

        Ok(Self {
            config: ValidatorConfig {
                root: root.clone(),
                ..config
            },
            root,
            extractor: InstructionExtractor::new(),
            classifier,
            executor,
            comparator: None,
            visited_dirs: HashSet::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Process every document, then tear the renderer down.
    pub async fn run(mut self) -> ValidationReport {
        let (documents, visual_results) = self.process_all().await;
        self.shutdown().await;

        let report = ValidationReport::assemble(self.root.clone(), documents, visual_results);
        info!(
            "Validated {} document(s), {} instruction(s), {} mockup(s): {}",
            report.documents.len(),
            report.instruction_count(),
            report.visual_results.len(),
            if report.success { "passed" } else { "failed" }
        );
        report
    }

    async fn process_all(&mut self) -> (Vec<Document>, Vec<MockupPair>) {
        let paths = discover_documents(&self.root);
        if paths.is_empty() {
            warn!("No README files found under {}", self.root.display());
        }

        let mut documents = Vec::with_capacity(paths.len());
        let mut visual_results = Vec::new();

        for path in paths {
            let document = self.process_document(&path).await;
            let directory = document.directory().to_path_buf();
            documents.push(document);

            if self.visited_dirs.insert(directory.clone()) {
                visual_results.extend(self.process_directory(&directory).await);
            }
        }

        (documents, visual_results)
    }

    /// Extract, classify and execute the instructions of one document.
    pub async fn process_document(&mut self, path: &Path) -> Document {
        info!("Processing {}", path.display());

        let instructions = match self.extractor.extract_file(path) {
            Ok(instructions) => instructions,
            Err(e) => {
                error!("Unable to read {}: {}", path.display(), e);
                vec![Instruction::unreadable(path, &e)]
            }
        };

        let mut document = Document::new(path, instructions);
        let cwd = document.directory().to_path_buf();
        for instruction in document.instructions.iter_mut() {
            self.execute_instruction(instruction, &cwd).await;
        }

        debug!("{}: {:?}", path.display(), document.status_summary());
        document
    }

    async fn execute_instruction(&self, instruction: &mut Instruction, cwd: &Path) {
        let command = match instruction.command.clone() {
            Some(command) => command,
            None => return,
        };

        let verdict = self.classifier.classify(&command);
        if !verdict.allowed {
            let reason = verdict.reason.unwrap_or_default();
            warn!("Skipping '{}': {}", command, reason);
            instruction.mark_skipped(reason);
            return;
        }

        match self.executor.run(&command, cwd).await {
            Ok(outcome) if outcome.success() => {
                debug!("'{}' succeeded", command);
                instruction.mark_success(outcome.stdout, outcome.stderr);
            }
            Ok(outcome) => {
                warn!("'{}' exited with {}", command, outcome.exit_code);
                instruction.stdout = outcome.stdout;
                instruction.stderr = outcome.stderr;
                instruction.mark_failed(format!("Exit code {}.", outcome.exit_code));
            }
            Err(e) => {
                warn!("'{}' failed: {}", command, e);
                instruction.mark_failed(e.to_string());
            }
        }
    }

    /// Pair and compare the mockups of one directory.
    pub async fn process_directory(&mut self, directory: &Path) -> Vec<MockupPair> {
        let skeletons = match pair_mockups(directory) {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!("Unable to list mockups in {}: {}", directory.display(), e);
                return Vec::new();
            }
        };

        let mut results = Vec::with_capacity(skeletons.len());
        for pair in skeletons {
            let html = match (&pair.html_path, pair.status) {
                (Some(html), PairStatus::NotRun) => html.clone(),
                _ => {
                    results.push(pair);
                    continue;
                }
            };

            if self.config.skip_visual {
                results.push(pair.with_status(PairStatus::NotRun, SKIPPED_VISUAL_DETAILS));
                continue;
            }

            self.ensure_comparator().await;
            let result = match self.comparator.as_mut() {
                Some(comparator) => comparator.compare(&html, &pair.mockup_path).await,
                None => pair.with_status(PairStatus::NotRun, "Visual comparator unavailable."),
            };
            results.push(result);
        }

        results
    }

    /// Start the comparator on first use.
    async fn ensure_comparator(&mut self) {
        if self.comparator.is_some() {
            return;
        }
        let comparator = VisualComparator::start(
            self.config.visual.clone(),
            self.config.assets_dir(),
            self.root.clone(),
            self.config.effective_tolerance(),
        )
        .await;
        if let Some(engine) = comparator.engine() {
            info!("Visual comparison using {}", engine);
        }
        self.comparator = Some(comparator);
    }

    /// Release the renderer session. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        if let Some(comparator) = self.comparator.take() {
            comparator.shutdown().await;
        }
    }
}
