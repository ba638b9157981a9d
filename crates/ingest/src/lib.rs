//! # Trialmap Ingest
//!
//! Orchestrates the mapping core for whole documents and campaigns.
//!
//! ## Pipeline
//!
//! ```text
//! ParsedDocument
//!     │  (per-version lock held for the whole run)
//!     ├──> AnchorExtractor ──> ZoneClassifier
//!     ├──> Chunker + heading blocks
//!     ├──> embeddings (assist or deterministic, one batch)
//!     ├──> HeadingClusterer ──> TopicScorer ──> topic evidence
//!     ├──> SectionMapper (+ assist suggestions for empty sections)
//!     ├──> AnchorAligner (when a prior version is stored)
//!     ├──> FactExtractor
//!     ├──> ArtifactStore::replace_version (overrides preserved)
//!     └──> QualityGate ──> IngestionRun (recorded)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trialmap_ingest::{IngestConfig, IngestRequest, Ingestor, MemoryStore};
//! use trialmap_protocol::{ContentNode, DocumentType, Language, ParsedDocument};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ingestor = Ingestor::new(IngestConfig::builtin()?, Arc::new(MemoryStore::new()))?;
//!     let doc = ParsedDocument::new("P-1:v1", DocumentType::Protocol, Language::En)
//!         .node(ContentNode::heading(1, "Adverse Events", &["Adverse Events"]));
//!     let run = ingestor.ingest(IngestRequest::new(doc)).await;
//!
//!     println!("{} anchors, verdict {:?}", run.metrics.anchors, run.quality.verdict);
//!     Ok(())
//! }
//! ```

mod campaign;
mod config;
mod error;
mod facts;
mod limits;
mod lock;
mod pipeline;
mod quality;
mod store;

pub use campaign::{Campaign, CampaignReport};
pub use config::{IngestConfig, PipelineSettings};
pub use error::{IngestError, Result};
pub use facts::{missing_required, FactExtractor, FactRule, FactRules};
pub use limits::{
    campaign_concurrency_from_env, campaign_concurrency_snapshot, parse_campaign_concurrency,
    CampaignConcurrencySnapshot, CAMPAIGN_CONCURRENCY_ENV, DEFAULT_CAMPAIGN_CONCURRENCY,
    MAX_CAMPAIGN_CONCURRENCY,
};
pub use lock::{VersionGuard, VersionLocks};
pub use pipeline::{IngestRequest, Ingestor};
pub use quality::{schedule_density, QualityGate, QualityInputs, QualityThresholds};
pub use store::{ArtifactStore, DocumentArtifacts, MemoryStore, StoredSections};
