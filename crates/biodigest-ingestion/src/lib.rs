//! biodigest-ingestion — From raw source records to a deduplicated paper batch.
//! - Raw per-source record variants (arXiv, PubMed, bioRxiv/medRxiv)
//! - Canonical identity resolution
//! - Normalisation into the shared `Paper` shape
//! - Batch and history deduplication
//! - Code/dataset link extraction
//! - Fetch and enrichment collaborator contracts

pub mod sources;
pub mod dedup;
pub mod enrichment;
pub mod identity;
pub mod links;
pub mod models;
pub mod normalise;
