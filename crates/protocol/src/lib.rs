//! # Trialmap Protocol
//!
//! Data model shared by every stage of the ingestion core: the parsed document
//! handed over by the upstream parser, the anchors/chunks/blocks derived from it,
//! topic and section mappings, cross-version alignment and the run record.

use anyhow::Result;
use serde::Serialize;

mod anchor;
mod document;
mod mapping;
mod run;
mod zone;

pub use anchor::{
    Anchor, Chunk, ClusterStats, ContentKind, FootnoteRef, HeadingBlock, HeadingCluster,
    TableRef, PATH_SEPARATOR,
};
pub use document::{ContentNode, DocumentType, Language, NodeKind, ParsedDocument};
pub use mapping::{
    AlignmentReport, AnchorMatch, CandidateScore, DiffStatus, ExtractedFact, FactValue,
    GateOutcome, MappedBy, MatchMethod, QcCheck, QcReport, ScoreBreakdown, SectionMap,
    SectionStatus, TopicAssignment, TopicEvidence, TopicExplanation,
};
pub use run::{
    IngestionRun, QualityFlag, QualityMetrics, QualityReport, QualityVerdict, RunMetrics,
    RunStatus,
};
pub use zone::Zone;

/// Version of the serialized artifact layout.
pub const ARTIFACT_SCHEMA_VERSION: u32 = 1;

pub fn serialize_json_pretty<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(Into::into)
}
