use crate::error::{MappingError, Result};
use crate::evidence::{chunk_lookup, chunks_covering};
use crate::text::contains_term;
use anyhow::{anyhow, Context};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use trialmap_anchors::{normalize_for_matching, subtree_end};
use trialmap_embeddings::CandidateSuggestion;
use trialmap_protocol::{
    Chunk, GateOutcome, HeadingBlock, Language, MappedBy, QcCheck, QcReport, SectionMap,
    SectionStatus, Zone,
};
use trialmap_zones::config::{parse_rules, ConfigSource, Shape};

const BUILTIN_SECTIONS: &str = include_str!("../../../rules/sections.json");

pub const MUST_WEIGHT: f32 = 0.5;
pub const SHOULD_WEIGHT: f32 = 0.1;
pub const SHOULD_CAP: f32 = 0.3;
pub const REGEX_WEIGHT: f32 = 0.2;
/// Applied when the heading level falls outside the preferred range.
pub const LEVEL_PENALTY: f32 = 0.8;
pub const DEFAULT_MAPPED_THRESHOLD: f32 = 0.6;

pub const CHECK_FORBIDDEN: &str = "forbidden_terms";
pub const CHECK_MUST: &str = "must_terms";
pub const CHECK_REGEX: &str = "regex";
pub const CHECK_CONTENT: &str = "min_content";
pub const CHECK_CONFIDENCE: &str = "confidence";
pub const CHECK_OVERLAP: &str = "overlap";

const SIGNALS_SHAPE: Shape = Shape::Object(&[
    ("must", Shape::Leaf),
    ("any", Shape::Leaf),
    ("should", Shape::Leaf),
    ("not", Shape::Leaf),
    ("regex", Shape::Leaf),
    ("heading_levels", Shape::Leaf),
    ("min_content_chars", Shape::Leaf),
]);
const LANGUAGE_SIGNALS: Shape = Shape::MapOf(&SIGNALS_SHAPE);
const SECTIONS_SHAPE: Shape = Shape::Object(&[
    ("schema_version", Shape::Leaf),
    ("description", Shape::Leaf),
    ("mapped_threshold", Shape::Leaf),
    ("sections", Shape::MapOf(&LANGUAGE_SIGNALS)),
]);

#[derive(Debug, Deserialize)]
struct RawSectionRules {
    #[allow(dead_code)]
    schema_version: u32,
    #[allow(dead_code)]
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    mapped_threshold: Option<f32>,
    #[serde(default)]
    sections: BTreeMap<Zone, BTreeMap<Language, RawSignals>>,
}

#[derive(Debug, Deserialize)]
struct RawSignals {
    #[serde(default)]
    must: Vec<String>,
    #[serde(default)]
    any: Vec<String>,
    #[serde(default)]
    should: Vec<String>,
    #[serde(default)]
    not: Vec<String>,
    #[serde(default)]
    regex: Vec<String>,
    #[serde(default)]
    heading_levels: Option<[u8; 2]>,
    #[serde(default)]
    min_content_chars: usize,
}

/// Signal set of one target section in one language, terms pre-normalized.
///
/// Every `must` term has to appear in the captured content; `any` is a group of
/// alternative key terms of which at least one has to appear.
#[derive(Debug, Clone)]
pub struct SectionSignals {
    pub language: Language,
    must: Vec<String>,
    any: Vec<String>,
    should: Vec<String>,
    not: Vec<String>,
    regex: Vec<Regex>,
    heading_levels: Option<(u8, u8)>,
    min_content_chars: usize,
}

impl SectionSignals {
    fn from_raw(language: Language, raw: RawSignals, path: &str) -> anyhow::Result<Self> {
        let terms = |list: Vec<String>| -> Vec<String> {
            list.iter()
                .map(|t| normalize_for_matching(t))
                .filter(|t| !t.is_empty())
                .collect()
        };
        let mut regex = Vec::with_capacity(raw.regex.len());
        for pattern in raw.regex.iter().filter(|p| !p.trim().is_empty()) {
            let re = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("{path}.regex: invalid regex '{pattern}'"))?;
            regex.push(re);
        }
        let heading_levels = match raw.heading_levels {
            Some([min, max]) if min > max => {
                return Err(anyhow!("{path}.heading_levels: {min} > {max}"));
            }
            Some([min, max]) => Some((min, max)),
            None => None,
        };

        let signals = Self {
            language,
            must: terms(raw.must),
            any: terms(raw.any),
            should: terms(raw.should),
            not: terms(raw.not),
            regex,
            heading_levels,
            min_content_chars: raw.min_content_chars,
        };
        if signals.must.is_empty()
            && signals.any.is_empty()
            && signals.should.is_empty()
            && signals.regex.is_empty()
        {
            return Err(anyhow!("{path}: needs at least one must, any, should or regex signal"));
        }
        Ok(signals)
    }

    fn level_allowed(&self, level: Option<u8>) -> bool {
        let level = level.unwrap_or(1);
        self.heading_levels
            .map_or(true, |(min, max)| (min..=max).contains(&level))
    }
}

/// Immutable target-section rule set.
#[derive(Debug, Clone)]
pub struct SectionRules {
    sections: BTreeMap<Zone, Vec<SectionSignals>>,
    mapped_threshold: f32,
    source: ConfigSource,
}

impl SectionRules {
    pub fn from_bytes(name: &str, bytes: &[u8]) -> anyhow::Result<Self> {
        let raw: RawSectionRules = parse_rules(bytes, &SECTIONS_SHAPE, "sections")
            .with_context(|| format!("Section rules '{name}' are not valid configuration"))?;
        Self::from_raw(raw, ConfigSource::from_bytes(name, bytes))
            .with_context(|| format!("Section rules '{name}' failed validation"))
    }

    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_bytes("sections", BUILTIN_SECTIONS.as_bytes())
    }

    fn from_raw(raw: RawSectionRules, source: ConfigSource) -> anyhow::Result<Self> {
        let mapped_threshold = raw.mapped_threshold.unwrap_or(DEFAULT_MAPPED_THRESHOLD);
        if !(0.0..=1.0).contains(&mapped_threshold) {
            return Err(anyhow!("mapped_threshold must be within [0, 1]"));
        }

        let mut sections = BTreeMap::new();
        for (section, per_language) in raw.sections {
            if !section.is_known() {
                return Err(anyhow!("sections.unknown: 'unknown' is not a target section"));
            }
            let mut signals = Vec::with_capacity(per_language.len());
            for (language, raw_signals) in per_language {
                if !language.is_concrete() {
                    return Err(anyhow!(
                        "sections.{section}.{language}: only concrete languages may carry signals"
                    ));
                }
                let path = format!("sections.{section}.{language}");
                signals.push(SectionSignals::from_raw(language, raw_signals, &path)?);
            }
            sections.insert(section, signals);
        }

        Ok(Self {
            sections,
            mapped_threshold,
            source,
        })
    }

    /// Configured target sections, in taxonomy order.
    pub fn sections(&self) -> impl Iterator<Item = Zone> + '_ {
        self.sections.keys().copied()
    }

    /// Signal sets for `language`; `mixed`/`unknown` see every language.
    #[must_use]
    pub fn signals_for(&self, section: Zone, language: Language) -> Vec<&SectionSignals> {
        self.sections
            .get(&section)
            .map(|list| {
                list.iter()
                    .filter(|s| !language.is_concrete() || s.language == language)
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub const fn mapped_threshold(&self) -> f32 {
        self.mapped_threshold
    }

    #[must_use]
    pub const fn source(&self) -> &ConfigSource {
        &self.source
    }
}

/// Candidate that failed a hard QC check and will not be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedCandidate {
    pub section: Zone,
    pub heading_block_id: String,
    pub confidence: f32,
    pub failed_checks: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SectionOutcome {
    pub maps: Vec<SectionMap>,
    pub rejected: Vec<RejectedCandidate>,
    /// Configured sections that ended up without a map.
    pub unmapped: Vec<Zone>,
}

impl SectionOutcome {
    /// Fold in another outcome (e.g. from assist suggestions) and re-resolve overlaps.
    pub fn absorb(&mut self, other: SectionOutcome) {
        for map in other.maps {
            self.unmapped.retain(|z| *z != map.section);
            self.maps.retain(|m| m.section != map.section);
            self.maps.push(map);
        }
        self.maps.sort_by_key(|m| m.section);
        self.rejected.extend(other.rejected);
        resolve_overlaps(&mut self.maps);
    }
}

pub struct SectionInputs<'a> {
    pub doc_version_id: &'a str,
    pub blocks: &'a [HeadingBlock],
    pub chunks: &'a [Chunk],
}

struct Candidate {
    block: usize,
    end: usize,
    confidence: f32,
    qc: QcReport,
    outcome: GateOutcome,
}

/// Finds the best heading block per target section and runs it through the QC gate.
#[derive(Debug, Clone)]
pub struct SectionMapper {
    rules: Arc<SectionRules>,
}

impl SectionMapper {
    #[must_use]
    pub fn new(rules: Arc<SectionRules>) -> Self {
        Self { rules }
    }

    #[must_use]
    pub fn rules(&self) -> &SectionRules {
        &self.rules
    }

    pub fn map(&self, inputs: &SectionInputs<'_>) -> SectionOutcome {
        let chunk_of_anchor = chunk_lookup(inputs.chunks);
        let mut outcome = SectionOutcome::default();

        for section in self.rules.sections() {
            let mut accepted = Vec::new();
            for idx in 0..inputs.blocks.len() {
                let Some(candidate) = self.best_candidate(section, inputs.blocks, idx, true)
                else {
                    continue;
                };
                if candidate.outcome == GateOutcome::Rejected {
                    outcome
                        .rejected
                        .push(rejected(section, &inputs.blocks[idx], &candidate));
                } else {
                    accepted.push(candidate);
                }
            }

            accepted.sort_by(|a, b| {
                b.confidence
                    .total_cmp(&a.confidence)
                    .then_with(|| a.block.cmp(&b.block))
            });
            match accepted.into_iter().next() {
                Some(best) => outcome.maps.push(self.build_map(
                    section,
                    best,
                    inputs,
                    &chunk_of_anchor,
                )),
                None => outcome.unmapped.push(section),
            }
        }

        resolve_overlaps(&mut outcome.maps);
        log::debug!(
            "section mapping for {}: {} maps, {} rejected, {} unmapped",
            inputs.doc_version_id,
            outcome.maps.len(),
            outcome.rejected.len(),
            outcome.unmapped.len()
        );
        outcome
    }

    /// Gate blocks suggested by the assist capability for one section. Heading hits are
    /// not required, and the best survivor is capped at `needs_review`.
    pub fn map_suggested(
        &self,
        section: Zone,
        suggestions: &[CandidateSuggestion],
        inputs: &SectionInputs<'_>,
    ) -> SectionOutcome {
        let mut outcome = SectionOutcome::default();
        let mut accepted: Vec<(Candidate, Option<&str>)> = Vec::new();

        for suggestion in suggestions {
            let Some(idx) = inputs
                .blocks
                .iter()
                .position(|b| b.heading_block_id == suggestion.heading_block_id)
            else {
                log::warn!(
                    "assist suggested unknown heading block {} for {section}",
                    suggestion.heading_block_id
                );
                continue;
            };
            let Some(candidate) = self.best_candidate(section, inputs.blocks, idx, false) else {
                continue;
            };
            if candidate.outcome == GateOutcome::Rejected {
                outcome
                    .rejected
                    .push(rejected(section, &inputs.blocks[idx], &candidate));
            } else {
                accepted.push((candidate, suggestion.rationale.as_deref()));
            }
        }

        accepted.sort_by(|(a, _), (b, _)| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.block.cmp(&b.block))
        });
        match accepted.into_iter().next() {
            Some((best, rationale)) => {
                let chunk_of_anchor = chunk_lookup(inputs.chunks);
                let mut map = self.build_map(section, best, inputs, &chunk_of_anchor);
                map.status = SectionStatus::NeedsReview;
                map.notes.push(match rationale {
                    Some(why) => format!("suggested by assist: {why}"),
                    None => "suggested by assist".to_string(),
                });
                outcome.maps.push(map);
            }
            None => outcome.unmapped.push(section),
        }
        outcome
    }

    fn best_candidate(
        &self,
        section: Zone,
        blocks: &[HeadingBlock],
        idx: usize,
        require_heading_hit: bool,
    ) -> Option<Candidate> {
        self.rules
            .signals_for(section, blocks[idx].language)
            .into_iter()
            .filter_map(|signals| self.evaluate(signals, blocks, idx, require_heading_hit))
            .max_by(|a, b| {
                gate_rank(a.outcome)
                    .cmp(&gate_rank(b.outcome))
                    .then_with(|| a.confidence.total_cmp(&b.confidence))
            })
    }

    fn evaluate(
        &self,
        signals: &SectionSignals,
        blocks: &[HeadingBlock],
        idx: usize,
        require_heading_hit: bool,
    ) -> Option<Candidate> {
        let block = &blocks[idx];
        let heading = block.normalized_heading.as_str();

        let key_in_heading = signals
            .must
            .iter()
            .chain(&signals.any)
            .any(|t| contains_term(heading, t));
        let should_in_heading = signals.should.iter().any(|t| contains_term(heading, t));
        let regex_in_heading = signals.regex.iter().any(|re| re.is_match(heading));
        if require_heading_hit && !(key_in_heading || should_in_heading || regex_in_heading) {
            return None;
        }

        let end = subtree_end(blocks, idx);
        let captured = &blocks[idx..end];
        let captured_text = captured
            .iter()
            .map(HeadingBlock::searchable_text)
            .collect::<Vec<_>>()
            .join(" ");
        let content_chars: usize = captured
            .iter()
            .map(|b| b.content_text.chars().count())
            .sum();

        let should_hits = signals
            .should
            .iter()
            .filter(|t| contains_term(&captured_text, t))
            .count();
        #[allow(clippy::cast_precision_loss)]
        let should_score = (SHOULD_WEIGHT * should_hits as f32).min(SHOULD_CAP);
        let mut confidence = should_score;
        if key_in_heading {
            confidence += MUST_WEIGHT;
        }
        if regex_in_heading {
            confidence += REGEX_WEIGHT;
        }
        confidence = confidence.min(1.0);
        if !signals.level_allowed(block.heading_level) {
            confidence *= LEVEL_PENALTY;
        }

        let mut qc = QcReport::default();
        let forbidden: Vec<&str> = signals
            .not
            .iter()
            .filter(|t| contains_term(&captured_text, t))
            .map(String::as_str)
            .collect();
        push_check(
            &mut qc,
            CHECK_FORBIDDEN,
            forbidden.is_empty(),
            (!forbidden.is_empty()).then(|| format!("found: {}", forbidden.join(", "))),
        );
        let missing: Vec<&str> = signals
            .must
            .iter()
            .filter(|t| !contains_term(&captured_text, t))
            .map(String::as_str)
            .collect();
        let any_ok =
            signals.any.is_empty() || signals.any.iter().any(|t| contains_term(&captured_text, t));
        let must_ok = missing.is_empty() && any_ok;
        let must_detail = match (missing.is_empty(), any_ok) {
            (true, true) => None,
            (false, _) => Some(format!("missing: {}", missing.join(", "))),
            (true, false) => Some("no key term in captured content".to_string()),
        };
        push_check(&mut qc, CHECK_MUST, must_ok, must_detail);
        let regex_ok = signals.regex.is_empty()
            || signals
                .regex
                .iter()
                .any(|re| re.is_match(heading) || re.is_match(&captured_text));
        push_check(
            &mut qc,
            CHECK_REGEX,
            regex_ok,
            (!regex_ok).then(|| "no pattern matched".to_string()),
        );
        let content_ok = content_chars >= signals.min_content_chars;
        push_check(
            &mut qc,
            CHECK_CONTENT,
            content_ok,
            (!content_ok)
                .then(|| format!("{content_chars} < {} chars", signals.min_content_chars)),
        );
        let confidence_ok = confidence >= self.rules.mapped_threshold;
        push_check(
            &mut qc,
            CHECK_CONFIDENCE,
            confidence_ok,
            (!confidence_ok)
                .then(|| format!("{confidence:.2} < {:.2}", self.rules.mapped_threshold)),
        );
        push_check(&mut qc, CHECK_OVERLAP, true, None);

        let outcome = gate_outcome(&qc);
        Some(Candidate {
            block: idx,
            end,
            confidence,
            qc,
            outcome,
        })
    }

    fn build_map(
        &self,
        section: Zone,
        candidate: Candidate,
        inputs: &SectionInputs<'_>,
        chunk_of_anchor: &HashMap<&str, usize>,
    ) -> SectionMap {
        let captured = &inputs.blocks[candidate.block..candidate.end];
        let anchor_ids: Vec<String> = captured
            .iter()
            .flat_map(HeadingBlock::anchor_ids)
            .map(str::to_string)
            .collect();
        let chunk_ids = chunks_covering(
            anchor_ids.iter().map(String::as_str),
            chunk_of_anchor,
            inputs.chunks,
        );
        let status = match candidate.outcome {
            GateOutcome::Mapped => SectionStatus::Mapped,
            _ => SectionStatus::NeedsReview,
        };
        SectionMap {
            doc_version_id: inputs.doc_version_id.to_string(),
            section,
            anchor_ids,
            chunk_ids,
            confidence: candidate.confidence,
            status,
            mapped_by: MappedBy::System,
            heading_block_id: Some(inputs.blocks[candidate.block].heading_block_id.clone()),
            qc: candidate.qc,
            notes: Vec::new(),
        }
    }
}

/// Deterministic gate: hard failures reject, soft failures ask for review.
#[must_use]
pub fn gate_outcome(qc: &QcReport) -> GateOutcome {
    let failed = qc.failed();
    if failed.is_empty() {
        GateOutcome::Mapped
    } else if failed
        .iter()
        .any(|name| *name == CHECK_FORBIDDEN || *name == CHECK_MUST)
    {
        GateOutcome::Rejected
    } else {
        GateOutcome::NeedsReview
    }
}

const fn gate_rank(outcome: GateOutcome) -> u8 {
    match outcome {
        GateOutcome::Rejected => 0,
        GateOutcome::NeedsReview => 1,
        GateOutcome::Mapped => 2,
    }
}

fn push_check(qc: &mut QcReport, name: &str, passed: bool, detail: Option<String>) {
    match qc.checks.iter_mut().find(|c| c.name == name) {
        Some(check) => {
            check.passed = passed;
            check.detail = detail;
        }
        None => qc.checks.push(QcCheck {
            name: name.to_string(),
            passed,
            detail,
        }),
    }
}

fn rejected(section: Zone, block: &HeadingBlock, candidate: &Candidate) -> RejectedCandidate {
    RejectedCandidate {
        section,
        heading_block_id: block.heading_block_id.clone(),
        confidence: candidate.confidence,
        failed_checks: candidate
            .qc
            .failed()
            .into_iter()
            .map(str::to_string)
            .collect(),
    }
}

/// Flag maps whose anchor sets intersect: the lower-confidence one fails the overlap
/// check (both on equal confidence) and drops to `needs_review`. Overridden maps still
/// count as the other side but are never modified.
pub fn resolve_overlaps(maps: &mut [SectionMap]) {
    let mut overlapping: Vec<Vec<Zone>> = vec![Vec::new(); maps.len()];
    {
        let sets: Vec<HashSet<&str>> = maps
            .iter()
            .map(|m| m.anchor_ids.iter().map(String::as_str).collect())
            .collect();
        for i in 0..maps.len() {
            for j in i + 1..maps.len() {
                if sets[i].is_disjoint(&sets[j]) {
                    continue;
                }
                let (a, b) = (maps[i].confidence, maps[j].confidence);
                if a <= b {
                    overlapping[i].push(maps[j].section);
                }
                if b <= a {
                    overlapping[j].push(maps[i].section);
                }
            }
        }
    }

    for (map, others) in maps.iter_mut().zip(overlapping) {
        if map.is_overridden() {
            continue;
        }
        let clear = others.is_empty();
        let detail = (!clear).then(|| {
            let names: Vec<&str> = others.iter().map(|z| z.as_str()).collect();
            format!("overlaps {}", names.join(", "))
        });
        push_check(&mut map.qc, CHECK_OVERLAP, clear, detail);
        if !clear && map.status == SectionStatus::Mapped {
            log::debug!("section {} overlaps another mapping", map.section);
            map.status = SectionStatus::NeedsReview;
        }
    }
}

/// Result of merging a fresh automated mapping with what is already stored.
#[derive(Debug, Clone, Default)]
pub struct Reconciled {
    pub maps: Vec<SectionMap>,
    /// Automated proposals dropped because the section is overridden.
    pub skipped_overridden: usize,
}

/// Overridden maps are kept verbatim; every other existing map is replaced by the
/// proposal set. Overlaps are resolved again over the merged set, so a proposal that
/// captures anchors of an overridden section drops to `needs_review`.
#[must_use]
pub fn reconcile(existing: &[SectionMap], proposed: Vec<SectionMap>) -> Reconciled {
    let protected: BTreeMap<Zone, &SectionMap> = existing
        .iter()
        .filter(|m| m.is_overridden())
        .map(|m| (m.section, m))
        .collect();

    let mut reconciled = Reconciled {
        maps: protected.values().map(|m| (*m).clone()).collect(),
        skipped_overridden: 0,
    };
    for map in proposed {
        if protected.contains_key(&map.section) {
            log::info!(
                "keeping overridden {} mapping for {}",
                map.section,
                map.doc_version_id
            );
            reconciled.skipped_overridden += 1;
            continue;
        }
        reconciled.maps.push(map);
    }
    reconciled.maps.sort_by_key(|m| m.section);
    resolve_overlaps(&mut reconciled.maps);
    reconciled
}

/// Human-authored mapping. Authoritative: automated runs never replace it.
pub fn user_override(
    doc_version_id: &str,
    section: Zone,
    anchor_ids: Vec<String>,
    chunk_ids: Vec<String>,
    user_id: &str,
) -> Result<SectionMap> {
    if !section.is_known() {
        return Err(MappingError::NotATargetSection(section.to_string()));
    }
    Ok(SectionMap {
        doc_version_id: doc_version_id.to_string(),
        section,
        anchor_ids,
        chunk_ids,
        confidence: 1.0,
        status: SectionStatus::Overridden,
        mapped_by: MappedBy::User {
            user_id: user_id.to_string(),
        },
        heading_block_id: None,
        qc: QcReport::default(),
        notes: Vec::new(),
    })
}
