use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use trialmap_protocol::{
    Anchor, ContentKind, DocumentType, ExtractedFact, QualityFlag, QualityMetrics, QualityReport,
    QualityVerdict, SectionMap, Zone,
};

/// Independent thresholds; each breach raises its own flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QualityThresholds {
    pub max_unknown_zone_ratio: f32,
    pub min_soa_density: f32,
    pub min_section_coverage: f32,
    pub min_anchors: usize,
    pub min_headings: usize,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            max_unknown_zone_ratio: 0.4,
            min_soa_density: 0.3,
            min_section_coverage: 0.5,
            min_anchors: 5,
            min_headings: 3,
        }
    }
}

pub struct QualityInputs<'a> {
    pub document_type: DocumentType,
    pub anchors: &'a [Anchor],
    pub section_maps: &'a [SectionMap],
    pub facts: &'a [ExtractedFact],
    pub missing_required_facts: Vec<String>,
}

fn soa_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:visit|screening|baseline|follow-up)\b|визит|скрининг")
            .expect("schedule header regex is valid")
    })
}

/// Density of the best schedule-of-activities table, `None` when no table qualifies.
///
/// A table qualifies when it sits in the procedures zone or its header row names
/// visits. Density is the share of filled cells in the body matrix (header row and
/// label column excluded).
#[must_use]
pub fn schedule_density(anchors: &[Anchor]) -> Option<f32> {
    let mut filled: HashMap<u32, usize> = HashMap::new();
    for anchor in anchors.iter().filter(|a| a.kind == ContentKind::TableCell) {
        if let Some(cell) = anchor.table {
            if cell.row >= 1 && cell.col >= 1 {
                *filled.entry(cell.table_index).or_default() += 1;
            }
        }
    }

    anchors
        .iter()
        .filter(|a| a.kind == ContentKind::Table)
        .filter(|a| {
            a.zone == Zone::Procedures
                || a.text.lines().next().is_some_and(|h| soa_header_re().is_match(h))
        })
        .filter_map(|a| a.table)
        .map(|table| {
            let body = table.rows.saturating_sub(1) as usize * table.cols.saturating_sub(1) as usize;
            if body == 0 {
                return 0.0;
            }
            let count = filled.get(&table.table_index).copied().unwrap_or(0);
            (count as f32 / body as f32).min(1.0)
        })
        .max_by(f32::total_cmp)
}

#[derive(Debug, Clone, Default)]
pub struct QualityGate {
    thresholds: QualityThresholds,
}

impl QualityGate {
    #[must_use]
    pub const fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    /// Evaluate a finished version. Never fails: breaches only downgrade the verdict.
    #[must_use]
    pub fn evaluate(&self, inputs: &QualityInputs<'_>) -> QualityReport {
        let t = &self.thresholds;
        let anchor_count = inputs.anchors.len();
        let heading_count = inputs.anchors.iter().filter(|a| a.is_heading()).count();
        let unknown = inputs
            .anchors
            .iter()
            .filter(|a| a.zone == Zone::Unknown)
            .count();
        let unknown_zone_ratio = if anchor_count == 0 {
            1.0
        } else {
            unknown as f32 / anchor_count as f32
        };

        let soa_density = schedule_density(inputs.anchors);
        let mapped: HashSet<Zone> = inputs
            .section_maps
            .iter()
            .filter(|m| m.is_citable())
            .map(|m| m.section)
            .collect();
        let expected_sections = Zone::ALL.len();
        let section_coverage = mapped.len() as f32 / expected_sections as f32;
        let conflicting_facts: Vec<String> = inputs
            .facts
            .iter()
            .filter(|f| f.conflicting)
            .map(|f| f.key.clone())
            .collect();

        let mut flags = Vec::new();
        if anchor_count < t.min_anchors {
            flags.push(QualityFlag::TooFewAnchors);
        }
        if heading_count < t.min_headings {
            flags.push(QualityFlag::TooFewHeadings);
        }
        if unknown_zone_ratio > t.max_unknown_zone_ratio {
            flags.push(QualityFlag::HighUnknownZoneRatio);
        }
        match soa_density {
            None if inputs.document_type == DocumentType::Protocol => {
                flags.push(QualityFlag::SoaMissing);
            }
            Some(density) if density < t.min_soa_density => flags.push(QualityFlag::SoaSparse),
            _ => {}
        }
        if section_coverage < t.min_section_coverage {
            flags.push(QualityFlag::LowSectionCoverage);
        }
        if !inputs.missing_required_facts.is_empty() {
            flags.push(QualityFlag::MissingRequiredFacts);
        }
        if !conflicting_facts.is_empty() {
            flags.push(QualityFlag::ConflictingFacts);
        }
        flags.sort();

        let verdict = if flags.is_empty() {
            QualityVerdict::Ok
        } else {
            log::info!("quality gate raised {flags:?}");
            QualityVerdict::NeedsReview
        };

        QualityReport {
            verdict,
            flags,
            metrics: QualityMetrics {
                anchor_count,
                heading_count,
                unknown_zone_ratio,
                soa_found: soa_density.is_some(),
                soa_density,
                mapped_sections: mapped.len(),
                expected_sections,
                section_coverage,
                missing_required_facts: inputs.missing_required_facts.clone(),
                conflicting_facts,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use trialmap_anchors::AnchorExtractor;
    use trialmap_protocol::{ContentNode, Language, MappedBy, ParsedDocument, QcReport, SectionStatus};

    fn cells(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| (*c).to_string()).collect())
            .collect()
    }

    fn anchors_with_table(rows: Vec<Vec<String>>) -> Vec<Anchor> {
        let doc = ParsedDocument::new("P:v1", DocumentType::Protocol, Language::En)
            .node(ContentNode::heading(1, "Schedule of Activities", &["SoA"]))
            .node(ContentNode::table(rows, &["SoA"]));
        AnchorExtractor::new().extract(&doc).unwrap()
    }

    fn section(zone: Zone, status: SectionStatus) -> SectionMap {
        SectionMap {
            doc_version_id: "P:v1".into(),
            section: zone,
            anchor_ids: vec![],
            chunk_ids: vec![],
            confidence: 0.9,
            status,
            mapped_by: MappedBy::System,
            heading_block_id: None,
            qc: QcReport::default(),
            notes: vec![],
        }
    }

    #[test]
    fn schedule_density_counts_body_cells_only() {
        let anchors = anchors_with_table(cells(&[
            &["Procedure", "Screening", "Visit 1", "Visit 2"],
            &["ECG", "X", "", "X"],
            &["Vitals", "X", "X", "X"],
        ]));
        // 5 filled of a 2x3 body.
        let density = schedule_density(&anchors).unwrap();
        assert!((density - 5.0 / 6.0).abs() < 1e-6);
    }

    #[test]
    fn tables_without_visit_headers_are_not_schedules() {
        let anchors = anchors_with_table(cells(&[&["Drug", "Dose"], &["A", "10 mg"]]));
        assert_eq!(schedule_density(&anchors), None);
    }

    #[test]
    fn breaches_raise_flags_and_force_review() {
        let anchors = anchors_with_table(cells(&[
            &["Assessment", "Visit 1", "Visit 2", "Visit 3"],
            &["ECG", "X", "", ""],
            &["Labs", "", "", ""],
        ]));
        let report = QualityGate::default().evaluate(&QualityInputs {
            document_type: DocumentType::Protocol,
            anchors: &anchors,
            section_maps: &[section(Zone::Procedures, SectionStatus::NeedsReview)],
            facts: &[],
            missing_required_facts: vec!["phase".into()],
        });
        assert_eq!(report.verdict, QualityVerdict::NeedsReview);
        assert!(report.has_flag(QualityFlag::SoaSparse));
        assert!(report.has_flag(QualityFlag::MissingRequiredFacts));
        assert!(report.has_flag(QualityFlag::TooFewHeadings));
        assert!(report.has_flag(QualityFlag::LowSectionCoverage));
        assert!(!report.has_flag(QualityFlag::SoaMissing));
        assert_eq!(report.metrics.mapped_sections, 0);
    }

    #[test]
    fn soa_is_only_expected_in_protocols() {
        let anchors = anchors_with_table(cells(&[&["Drug", "Dose"], &["A", "10 mg"]]));
        let gate = QualityGate::default();
        let mut inputs = QualityInputs {
            document_type: DocumentType::Protocol,
            anchors: &anchors,
            section_maps: &[],
            facts: &[],
            missing_required_facts: vec![],
        };
        assert!(gate.evaluate(&inputs).has_flag(QualityFlag::SoaMissing));
        inputs.document_type = DocumentType::Csr;
        assert!(!gate.evaluate(&inputs).has_flag(QualityFlag::SoaMissing));
    }

    #[test]
    fn a_clean_document_passes() {
        let maps: Vec<SectionMap> = Zone::ALL
            .iter()
            .take(6)
            .map(|z| section(*z, SectionStatus::Mapped))
            .collect();
        let gate = QualityGate::new(QualityThresholds {
            min_anchors: 1,
            min_headings: 1,
            max_unknown_zone_ratio: 1.0,
            ..QualityThresholds::default()
        });
        let anchors = anchors_with_table(cells(&[
            &["Procedure", "Screening", "Visit 1"],
            &["ECG", "X", "X"],
        ]));
        let report = gate.evaluate(&QualityInputs {
            document_type: DocumentType::Protocol,
            anchors: &anchors,
            section_maps: &maps,
            facts: &[],
            missing_required_facts: vec![],
        });
        assert_eq!(report.flags, vec![]);
        assert_eq!(report.verdict, QualityVerdict::Ok);
        assert_eq!(report.metrics.section_coverage, 0.5);
    }
}
