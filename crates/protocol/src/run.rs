use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QualityVerdict {
    #[default]
    Ok,
    NeedsReview,
}

/// Named threshold breaches raised by the quality gate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    HighUnknownZoneRatio,
    SoaMissing,
    SoaSparse,
    LowSectionCoverage,
    MissingRequiredFacts,
    ConflictingFacts,
    TooFewAnchors,
    TooFewHeadings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QualityMetrics {
    pub anchor_count: usize,
    pub heading_count: usize,
    pub unknown_zone_ratio: f32,
    pub soa_found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soa_density: Option<f32>,
    pub mapped_sections: usize,
    pub expected_sections: usize,
    pub section_coverage: f32,
    pub missing_required_facts: Vec<String>,
    pub conflicting_facts: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QualityReport {
    pub verdict: QualityVerdict,
    pub flags: Vec<QualityFlag>,
    pub metrics: QualityMetrics,
}

impl QualityReport {
    #[must_use]
    pub fn has_flag(&self, flag: QualityFlag) -> bool {
        self.flags.contains(&flag)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunMetrics {
    pub anchors: usize,
    pub chunks: usize,
    pub heading_blocks: usize,
    pub clusters: usize,
    pub assigned_blocks: usize,
    pub unassigned_blocks: usize,
    pub mapped_sections: usize,
    pub needs_review_sections: usize,
    pub rejected_candidates: usize,
    pub skipped_overridden_sections: usize,
    pub anchor_matches: usize,
    pub anchors_added: usize,
    pub anchors_deleted: usize,
    pub facts: usize,
    /// Time spent waiting for another ingest of the same version.
    #[serde(default)]
    pub lock_wait_ms: u64,
}

/// Audit record of one ingestion attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IngestionRun {
    pub run_id: String,
    pub doc_version_id: String,
    pub status: RunStatus,
    pub started_unix_ms: u64,
    pub duration_ms: u64,
    pub metrics: RunMetrics,
    pub quality: QualityReport,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    pub config_hash: String,
}

impl IngestionRun {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    #[must_use]
    pub fn needs_review(&self) -> bool {
        self.quality.verdict == QualityVerdict::NeedsReview
    }
}
