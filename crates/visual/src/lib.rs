//! Docproof visual checks
//!
//! Pairs reference mockups with the HTML documents beside them and compares a
//! Playwright screenshot of each document against its mockup.
//!
//! ```text
//! directory ──► matcher::pair_mockups ──► [MockupPair { not_run | no_html }]
//!                                              │
//!                      VisualComparator::compare(html, mockup)
//!                        ├── RendererSession::screenshot  (node + playwright)
//!                        └── evaluate_images               (image + sha2)
//! ```

pub mod error;
pub mod matcher;
pub mod playwright;
pub mod visual;

pub use error::{VisualError, VisualResult};
pub use matcher::{match_html, pair_mockups};
pub use playwright::RendererSession;
pub use visual::{evaluate_images, Capability, Comparison, VisualComparator};
