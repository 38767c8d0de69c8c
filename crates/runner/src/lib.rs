//! Docproof runner
//!
//! Executes the commands documented in README files and checks mockups:
//!
//! ```text
//! Validator::run
//!   ├── discover_documents(root)
//!   ├── per document: InstructionExtractor → CommandClassifier → CommandExecutor
//!   ├── per directory (once): pair_mockups → VisualComparator::compare
//!   └── ValidationReport::assemble → report::write_reports
//! ```

pub mod classifier;
pub mod executor;
pub mod extractor;
pub mod orchestrator;
pub mod report;

pub use classifier::{ClassifierError, CommandClassifier};
pub use executor::{CommandExecutor, CommandOutcome, ExecutionError};
pub use extractor::{CommandHeuristic, DefaultHeuristic, InstructionExtractor};
pub use orchestrator::{discover_documents, validate_root, Validator};
pub use report::{json_report_path, write_reports};
