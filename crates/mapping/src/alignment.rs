use crate::error::{MappingError, Result};
use crate::text::token_dice;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use trialmap_embeddings::{cosine_similarity, Embedder};
use trialmap_protocol::{
    AlignmentReport, Anchor, AnchorMatch, ContentKind, DiffStatus, MatchMethod,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlignmentConfig {
    /// Minimum token Dice similarity for the fuzzy pass.
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f32,
    /// Minimum cosine similarity for the embedding pass.
    #[serde(default = "default_embedding_threshold")]
    pub embedding_threshold: f32,
    /// Minimum blended score for the hybrid pass.
    #[serde(default = "default_hybrid_threshold")]
    pub hybrid_threshold: f32,
    /// Weight of the text similarity in the hybrid score; the embedding gets the rest.
    #[serde(default = "default_hybrid_text_weight")]
    pub hybrid_text_weight: f32,
}

const fn default_fuzzy_threshold() -> f32 {
    0.85
}
const fn default_embedding_threshold() -> f32 {
    0.92
}
const fn default_hybrid_threshold() -> f32 {
    0.75
}
const fn default_hybrid_text_weight() -> f32 {
    0.5
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: default_fuzzy_threshold(),
            embedding_threshold: default_embedding_threshold(),
            hybrid_threshold: default_hybrid_threshold(),
            hybrid_text_weight: default_hybrid_text_weight(),
        }
    }
}

impl AlignmentConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        for (name, value) in [
            ("fuzzy_threshold", self.fuzzy_threshold),
            ("embedding_threshold", self.embedding_threshold),
            ("hybrid_threshold", self.hybrid_threshold),
            ("hybrid_text_weight", self.hybrid_text_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} must be within [0, 1], got {value}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Pair {
    prev: usize,
    curr: usize,
    score: f32,
    distance: f32,
}

/// Same-kind anchors of both versions, with their relative positions.
struct KindGroup {
    prev: Vec<usize>,
    curr: Vec<usize>,
}

struct PassState<'a> {
    prev: &'a [Anchor],
    curr: &'a [Anchor],
    prev_pos: Vec<f32>,
    curr_pos: Vec<f32>,
    prev_taken: Vec<bool>,
    curr_taken: Vec<bool>,
    matches: Vec<AnchorMatch>,
}

impl PassState<'_> {
    /// Greedy one-to-one assignment by score desc, position distance asc, indices asc.
    fn assign(&mut self, mut pairs: Vec<Pair>, method: MatchMethod) -> usize {
        pairs.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.distance.total_cmp(&b.distance))
                .then_with(|| a.prev.cmp(&b.prev))
                .then_with(|| a.curr.cmp(&b.curr))
        });
        let mut assigned = 0;
        for pair in pairs {
            if self.prev_taken[pair.prev] || self.curr_taken[pair.curr] {
                continue;
            }
            self.prev_taken[pair.prev] = true;
            self.curr_taken[pair.curr] = true;
            let (prev, curr) = (&self.prev[pair.prev], &self.curr[pair.curr]);
            self.matches.push(AnchorMatch {
                prev_anchor_id: prev.anchor_id.clone(),
                curr_anchor_id: curr.anchor_id.clone(),
                method,
                similarity: pair.score,
                status: if prev.content_hash == curr.content_hash {
                    DiffStatus::Unchanged
                } else {
                    DiffStatus::Changed
                },
            });
            assigned += 1;
        }
        assigned
    }

    fn open_pairs<F>(&self, group: &KindGroup, mut score: F) -> Vec<Pair>
    where
        F: FnMut(usize, usize) -> Option<f32>,
    {
        let mut pairs = Vec::new();
        for &p in group.prev.iter().filter(|&&p| !self.prev_taken[p]) {
            for &c in group.curr.iter().filter(|&&c| !self.curr_taken[c]) {
                if let Some(value) = score(p, c) {
                    pairs.push(Pair {
                        prev: p,
                        curr: c,
                        score: value,
                        distance: (self.prev_pos[p] - self.curr_pos[c]).abs(),
                    });
                }
            }
        }
        pairs
    }
}

/// Matches anchors of a previous document version to the current one.
#[derive(Debug, Clone)]
pub struct AnchorAligner {
    config: AlignmentConfig,
}

impl AnchorAligner {
    pub fn new(config: AlignmentConfig) -> Result<Self> {
        config.validate().map_err(MappingError::InvalidConfig)?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &AlignmentConfig {
        &self.config
    }

    /// Four passes over same-kind anchors: exact hash, token Dice, embedding cosine,
    /// hybrid. Each pass only sees anchors the earlier passes left unmatched, so an
    /// exact match always wins.
    pub fn align(
        &self,
        prev: &[Anchor],
        curr: &[Anchor],
        embedder: &dyn Embedder,
    ) -> Result<AlignmentReport> {
        let mut groups: BTreeMap<ContentKind, KindGroup> = BTreeMap::new();
        for (idx, anchor) in prev.iter().enumerate() {
            groups
                .entry(anchor.kind)
                .or_insert_with(|| KindGroup {
                    prev: Vec::new(),
                    curr: Vec::new(),
                })
                .prev
                .push(idx);
        }
        for (idx, anchor) in curr.iter().enumerate() {
            groups
                .entry(anchor.kind)
                .or_insert_with(|| KindGroup {
                    prev: Vec::new(),
                    curr: Vec::new(),
                })
                .curr
                .push(idx);
        }

        let mut state = PassState {
            prev,
            curr,
            prev_pos: relative_positions(prev.len(), groups.values().map(|g| g.prev.as_slice())),
            curr_pos: relative_positions(curr.len(), groups.values().map(|g| g.curr.as_slice())),
            prev_taken: vec![false; prev.len()],
            curr_taken: vec![false; curr.len()],
            matches: Vec::new(),
        };

        for group in groups.values() {
            let pairs = state.open_pairs(group, |p, c| {
                (prev[p].content_hash == curr[c].content_hash).then_some(1.0)
            });
            state.assign(pairs, MatchMethod::Exact);
        }

        let fuzzy = self.config.fuzzy_threshold;
        for group in groups.values() {
            let pairs = state.open_pairs(group, |p, c| {
                let dice = token_dice(&prev[p].normalized_text, &curr[c].normalized_text);
                (dice >= fuzzy).then_some(dice)
            });
            state.assign(pairs, MatchMethod::Fuzzy);
        }

        let prev_vectors = self.embed_open(prev, &state.prev_taken, embedder)?;
        let curr_vectors = self.embed_open(curr, &state.curr_taken, embedder)?;
        let cosine = |p: usize, c: usize| -> f32 {
            match (&prev_vectors[p], &curr_vectors[c]) {
                (Some(a), Some(b)) => cosine_similarity(a, b),
                _ => 0.0,
            }
        };

        let embedding = self.config.embedding_threshold;
        for group in groups.values() {
            let pairs = state.open_pairs(group, |p, c| {
                let sim = cosine(p, c);
                (sim >= embedding).then_some(sim)
            });
            state.assign(pairs, MatchMethod::Embedding);
        }

        let text_weight = self.config.hybrid_text_weight;
        let hybrid = self.config.hybrid_threshold;
        for group in groups.values() {
            let pairs = state.open_pairs(group, |p, c| {
                let text = token_dice(&prev[p].normalized_text, &curr[c].normalized_text);
                let score = text_weight * text + (1.0 - text_weight) * cosine(p, c).max(0.0);
                (score >= hybrid).then_some(score)
            });
            state.assign(pairs, MatchMethod::Hybrid);
        }

        let PassState {
            prev_taken,
            curr_taken,
            mut matches,
            ..
        } = state;
        let curr_index: BTreeMap<&str, usize> = curr
            .iter()
            .enumerate()
            .map(|(idx, a)| (a.anchor_id.as_str(), idx))
            .collect();
        matches.sort_by_key(|m| curr_index.get(m.curr_anchor_id.as_str()).copied());

        let report = AlignmentReport {
            prev_doc_version_id: prev
                .first()
                .map(|a| a.doc_version_id.clone())
                .unwrap_or_default(),
            curr_doc_version_id: curr
                .first()
                .map(|a| a.doc_version_id.clone())
                .unwrap_or_default(),
            matches,
            added: curr
                .iter()
                .zip(&curr_taken)
                .filter(|(_, taken)| !**taken)
                .map(|(a, _)| a.anchor_id.clone())
                .collect(),
            deleted: prev
                .iter()
                .zip(&prev_taken)
                .filter(|(_, taken)| !**taken)
                .map(|(a, _)| a.anchor_id.clone())
                .collect(),
        };
        log::debug!(
            "aligned {} -> {}: {} matches ({} changed), {} added, {} deleted",
            report.prev_doc_version_id,
            report.curr_doc_version_id,
            report.matches.len(),
            report.changed_count(),
            report.added.len(),
            report.deleted.len()
        );
        Ok(report)
    }

    /// Embeddings for anchors no text pass could match; `None` for the rest.
    fn embed_open(
        &self,
        anchors: &[Anchor],
        taken: &[bool],
        embedder: &dyn Embedder,
    ) -> Result<Vec<Option<Vec<f32>>>> {
        let open: Vec<usize> = (0..anchors.len()).filter(|&i| !taken[i]).collect();
        let texts: Vec<&str> = open
            .iter()
            .map(|&i| anchors[i].normalized_text.as_str())
            .collect();
        let vectors = embedder.embed_batch(&texts);

        let mut out = vec![None; anchors.len()];
        for (idx, vector) in open.into_iter().zip(vectors) {
            if vector.len() != embedder.dimension() {
                return Err(MappingError::DimensionMismatch {
                    subject: format!("anchor {}", anchors[idx].anchor_id),
                    expected: embedder.dimension(),
                    actual: vector.len(),
                });
            }
            out[idx] = Some(vector);
        }
        Ok(out)
    }
}

/// Position of each anchor among its same-kind peers, scaled to [0, 1].
fn relative_positions<'a>(len: usize, groups: impl Iterator<Item = &'a [usize]>) -> Vec<f32> {
    let mut positions = vec![0.0; len];
    for members in groups {
        let span = members.len().saturating_sub(1).max(1);
        for (rank, &idx) in members.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let relative = rank as f32 / span as f32;
            positions[idx] = relative;
        }
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use trialmap_anchors::AnchorExtractor;
    use trialmap_embeddings::HashingEmbedder;
    use trialmap_protocol::{ContentNode, DocumentType, Language, ParsedDocument};

    fn aligner() -> AnchorAligner {
        AnchorAligner::new(AlignmentConfig::default()).unwrap()
    }

    fn extract(doc: &ParsedDocument) -> Vec<Anchor> {
        AnchorExtractor::new().extract(doc).unwrap()
    }

    fn objectives(version: &str, number: &str) -> ParsedDocument {
        let heading = format!("{number}. Objectives");
        ParsedDocument::new(version, DocumentType::Protocol, Language::En)
            .node(ContentNode::heading(1, heading.clone(), &[heading.as_str()]))
            .node(ContentNode::paragraph(
                "The primary objective is to evaluate efficacy.",
                &[heading.as_str()],
            ))
            .node(ContentNode::list_item(
                "Assess safety and tolerability.",
                &[heading.as_str()],
            ))
    }

    #[test]
    fn renumbered_section_aligns_exactly() {
        let prev = extract(&objectives("P:v1", "4"));
        let curr = extract(&objectives("P:v2", "5"));
        let report = aligner()
            .align(&prev, &curr, &HashingEmbedder::default())
            .unwrap();

        assert_eq!(report.matches.len(), 3);
        assert!(report
            .matches
            .iter()
            .all(|m| m.method == MatchMethod::Exact && m.status == DiffStatus::Unchanged));
        assert!(report.added.is_empty());
        assert!(report.deleted.is_empty());
        assert_eq!(report.prev_doc_version_id, "P:v1");
        assert_eq!(report.curr_doc_version_id, "P:v2");
    }

    #[test]
    fn exact_match_beats_closer_fuzzy_candidate() {
        let prev = extract(
            &ParsedDocument::new("P:v1", DocumentType::Protocol, Language::En)
                .node(ContentNode::paragraph(
                    "Subjects will attend eight clinic visits in total.",
                    &["6"],
                ))
                .node(ContentNode::paragraph("Visits occur every four weeks.", &["6"])),
        );
        let curr = extract(
            &ParsedDocument::new("P:v2", DocumentType::Protocol, Language::En)
                .node(ContentNode::paragraph("Visits occur every four weeks.", &["6"]))
                .node(ContentNode::paragraph(
                    "Subjects will attend nine clinic visits in total.",
                    &["6"],
                )),
        );
        let report = aligner()
            .align(&prev, &curr, &HashingEmbedder::default())
            .unwrap();

        let exact = report
            .matches
            .iter()
            .find(|m| m.method == MatchMethod::Exact)
            .unwrap();
        assert_eq!(exact.prev_anchor_id, prev[1].anchor_id);
        assert_eq!(exact.curr_anchor_id, curr[0].anchor_id);

        let changed = report
            .matches
            .iter()
            .find(|m| m.status == DiffStatus::Changed)
            .unwrap();
        assert_eq!(changed.prev_anchor_id, prev[0].anchor_id);
        assert_eq!(changed.curr_anchor_id, curr[1].anchor_id);
        assert_ne!(changed.method, MatchMethod::Exact);
    }

    #[test]
    fn kinds_never_cross_and_leftovers_are_reported() {
        let prev = extract(
            &ParsedDocument::new("P:v1", DocumentType::Protocol, Language::En)
                .node(ContentNode::paragraph("Blood samples are drawn at screening.", &["7"]))
                .node(ContentNode::paragraph("Removed paragraph about shipping.", &["7"])),
        );
        let curr = extract(
            &ParsedDocument::new("P:v2", DocumentType::Protocol, Language::En)
                .node(ContentNode::list_item("Blood samples are drawn at screening.", &["7"]))
                .node(ContentNode::paragraph(
                    "Entirely new paragraph on imaging.",
                    &["7"],
                )),
        );
        let report = aligner()
            .align(&prev, &curr, &HashingEmbedder::default())
            .unwrap();
        assert!(report.matches.is_empty(), "{:?}", report.matches);
        assert_eq!(report.added.len(), 2);
        assert_eq!(report.deleted.len(), 2);
    }

    #[test]
    fn duplicates_pair_by_relative_position() {
        let doc = |version: &str| {
            ParsedDocument::new(version, DocumentType::Protocol, Language::En)
                .node(ContentNode::paragraph("Not applicable.", &["1"]))
                .node(ContentNode::paragraph("Something else entirely here.", &["1"]))
                .node(ContentNode::paragraph("Not applicable.", &["2"]))
        };
        let prev = extract(&doc("P:v1"));
        let curr = extract(&doc("P:v2"));
        let report = aligner()
            .align(&prev, &curr, &HashingEmbedder::default())
            .unwrap();
        let pairs: Vec<(&str, &str)> = report
            .matches
            .iter()
            .map(|m| (m.prev_anchor_id.as_str(), m.curr_anchor_id.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (prev[0].anchor_id.as_str(), curr[0].anchor_id.as_str()),
                (prev[1].anchor_id.as_str(), curr[1].anchor_id.as_str()),
                (prev[2].anchor_id.as_str(), curr[2].anchor_id.as_str()),
            ]
        );
    }

    #[test]
    fn config_is_validated() {
        let config = AlignmentConfig {
            fuzzy_threshold: 1.5,
            ..AlignmentConfig::default()
        };
        assert!(AnchorAligner::new(config).is_err());
        let parsed: AlignmentConfig = serde_json::from_str(r#"{"hybrid_threshold": 0.8}"#).unwrap();
        assert_eq!(parsed.fuzzy_threshold, 0.85);
        assert!(serde_json::from_str::<AlignmentConfig>(r#"{"bogus": 1}"#).is_err());
    }
}
