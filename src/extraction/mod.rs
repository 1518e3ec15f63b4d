//! Config-driven extraction engine.
//!
//! Everything here except the generator is synchronous and pure: pages are
//! parsed per call and no state is shared between calls.

pub mod candidate;
pub mod extractor;
pub mod generator;
pub mod jsonld;
pub mod matcher;
pub mod path;
pub mod prompt;
pub mod rules;
pub mod scoring;

pub use extractor::{ExtractedData, ExtractionResult, extract};
pub use generator::RulesetGenerator;
pub use matcher::{find_all, find_best};
pub use rules::ExtractionConfig;
pub use scoring::{CompletionState, ScoringResult};
