//! biodigest-common — Shared types, errors, and configuration used across all biodigest crates.

pub mod error;
pub mod paper;
pub mod config;
pub mod sandbox;

// Re-export commonly used types
pub use error::{DigestError, Result};
pub use paper::{ClassifierVerdict, Enrichment, HeuristicAnnotation, Paper, PaperLinks, Placement, SourceKind};
pub use config::{default_buckets, BucketDef, BoostTerms, RulesConfig, SelectionConfig};
