use crate::{Language, Zone};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Individual signal contributions for one (block, topic) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScoreBreakdown {
    pub heading_match: f32,
    pub keyword_match: f32,
    pub embedding_similarity: f32,
    pub zone_prior: f32,
    pub cluster_prior: f32,
    pub neighbor_bonus: f32,
    pub total: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CandidateScore {
    /// 1-based rank among all candidates for the block.
    pub rank: u32,
    pub topic_key: String,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TopicExplanation {
    pub components: ScoreBreakdown,
    pub top_candidates: Vec<CandidateScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TopicAssignment {
    pub doc_version_id: String,
    pub heading_block_id: String,
    pub topic_key: String,
    pub confidence: f32,
    pub explanation: TopicExplanation,
}

/// Read-optimized rollup of assignments per (topic, zone, language).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TopicEvidence {
    pub doc_version_id: String,
    pub topic_key: String,
    pub zone: Zone,
    pub language: Language,
    pub anchor_ids: Vec<String>,
    pub chunk_ids: Vec<String>,
    pub heading_block_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Mapped,
    NeedsReview,
    Overridden,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MappedBy {
    System,
    User { user_id: String },
}

/// Outcome of the deterministic QC gate for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    Mapped,
    NeedsReview,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QcCheck {
    pub name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct QcReport {
    pub checks: Vec<QcCheck>,
}

impl QcReport {
    #[must_use]
    pub fn failed(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name.as_str())
            .collect()
    }

    #[must_use]
    pub fn passed(&self, name: &str) -> Option<bool> {
        self.checks.iter().find(|c| c.name == name).map(|c| c.passed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SectionMap {
    pub doc_version_id: String,
    pub section: Zone,
    pub anchor_ids: Vec<String>,
    pub chunk_ids: Vec<String>,
    pub confidence: f32,
    pub status: SectionStatus,
    pub mapped_by: MappedBy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading_block_id: Option<String>,
    #[serde(default)]
    pub qc: QcReport,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl SectionMap {
    /// Downstream consumers may cite only mapped or human-overridden sections.
    #[must_use]
    pub const fn is_citable(&self) -> bool {
        matches!(
            self.status,
            SectionStatus::Mapped | SectionStatus::Overridden
        )
    }

    #[must_use]
    pub const fn is_overridden(&self) -> bool {
        matches!(self.status, SectionStatus::Overridden)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Exact,
    Fuzzy,
    Embedding,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    Unchanged,
    Changed,
}

/// Correspondence between an anchor of the previous version and one of the current.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnchorMatch {
    pub prev_anchor_id: String,
    pub curr_anchor_id: String,
    pub method: MatchMethod,
    pub similarity: f32,
    pub status: DiffStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AlignmentReport {
    pub prev_doc_version_id: String,
    pub curr_doc_version_id: String,
    pub matches: Vec<AnchorMatch>,
    pub added: Vec<String>,
    pub deleted: Vec<String>,
}

impl AlignmentReport {
    #[must_use]
    pub fn changed_count(&self) -> usize {
        self.matches
            .iter()
            .filter(|m| m.status == DiffStatus::Changed)
            .count()
    }
}

/// A fact pulled out of the document, with every distinct value observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedFact {
    pub key: String,
    pub values: Vec<FactValue>,
    pub conflicting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FactValue {
    pub value: String,
    pub anchor_ids: Vec<String>,
}
