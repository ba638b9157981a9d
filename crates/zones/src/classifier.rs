use crate::rules::{ZoneRegistry, ZoneRule, ZoneRuleSet};
use std::sync::Arc;
use trialmap_anchors::normalize_heading;
use trialmap_protocol::{Anchor, DocumentType, Language, Zone};

const EXACT_STRENGTH: f32 = 1.0;
const STRONG_STRENGTH: f32 = 0.7;
const WEAK_STRENGTH: f32 = 0.4;
const STRONG_COVERAGE: f32 = 0.5;

const FRACTION_WEIGHT: f32 = 0.4;
const STRENGTH_WEIGHT: f32 = 0.6;

/// Classification outcome for one anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneDecision {
    pub zone: Zone,
    pub confidence: f32,
}

impl ZoneDecision {
    pub const UNKNOWN: Self = Self {
        zone: Zone::Unknown,
        confidence: 0.0,
    };
}

/// Classifies anchors of one document type against an immutable rule set.
#[derive(Debug, Clone)]
pub struct ZoneClassifier {
    rules: Arc<ZoneRuleSet>,
}

impl ZoneClassifier {
    #[must_use]
    pub fn new(rules: Arc<ZoneRuleSet>) -> Self {
        Self { rules }
    }

    #[must_use]
    pub fn for_document(registry: &ZoneRegistry, document_type: DocumentType) -> Self {
        Self::new(Arc::new(registry.for_document_type(document_type).clone()))
    }

    #[must_use]
    pub fn rule_set(&self) -> &ZoneRuleSet {
        &self.rules
    }

    /// Classify a structural path plus an optional heading text.
    #[must_use]
    pub fn classify(
        &self,
        path: &[String],
        heading_text: Option<&str>,
        language: Language,
    ) -> ZoneDecision {
        let segments = self.segments(path, heading_text);
        if segments.is_empty() {
            return ZoneDecision::UNKNOWN;
        }

        for rule in self.rules.rules() {
            let strengths: Vec<f32> = segments
                .iter()
                .map(|segment| segment_strength(rule, segment, language))
                .collect();
            let matched: Vec<f32> = strengths.iter().copied().filter(|s| *s > 0.0).collect();
            if matched.is_empty() {
                continue;
            }
            if rule.is_fallback() {
                return ZoneDecision::UNKNOWN;
            }

            #[allow(clippy::cast_precision_loss)]
            let matched_fraction = matched.len() as f32 / segments.len() as f32;
            #[allow(clippy::cast_precision_loss)]
            let mean_strength = matched.iter().sum::<f32>() / matched.len() as f32;
            let confidence =
                (FRACTION_WEIGHT * matched_fraction + STRENGTH_WEIGHT * mean_strength).min(1.0);

            if !self.rules.allows(rule.zone) {
                log::debug!(
                    "zone {} is not allowed by rule set {}, coercing to unknown",
                    rule.zone,
                    self.rules.name()
                );
                return ZoneDecision::UNKNOWN;
            }
            return ZoneDecision {
                zone: rule.zone,
                confidence,
            };
        }
        ZoneDecision::UNKNOWN
    }

    /// Classify one anchor: headings use their own text, other anchors only their path.
    #[must_use]
    pub fn classify_anchor(&self, anchor: &Anchor) -> ZoneDecision {
        let heading = anchor.is_heading().then_some(anchor.text.as_str());
        self.classify(&anchor.structural_path, heading, anchor.language)
    }

    /// Classify every anchor in place and return how many ended up `unknown`.
    pub fn classify_all(&self, anchors: &mut [Anchor]) -> usize {
        let mut unknown = 0;
        for anchor in anchors.iter_mut() {
            let decision = self.classify_anchor(anchor);
            anchor.zone = decision.zone;
            anchor.zone_confidence = decision.confidence;
            if decision.zone == Zone::Unknown {
                unknown += 1;
            }
        }
        log::debug!(
            "classified {} anchors with rule set {} ({unknown} unknown)",
            anchors.len(),
            self.rules.name()
        );
        unknown
    }

    fn segments(&self, path: &[String], heading_text: Option<&str>) -> Vec<String> {
        let mut segments: Vec<String> = path.iter().map(|s| normalize_heading(s)).collect();
        if let Some(heading) = heading_text {
            let heading = normalize_heading(heading);
            if segments.last() != Some(&heading) {
                segments.push(heading);
            }
        }
        segments
            .into_iter()
            .filter(|s| !s.is_empty() && !self.rules.is_skip_segment(s))
            .collect()
    }
}

fn segment_strength(rule: &ZoneRule, segment: &str, language: Language) -> f32 {
    let segment_chars = segment.chars().count();
    let mut best = 0.0f32;
    for re in rule.patterns_for(language) {
        for m in re.find_iter(segment) {
            let covered = m.as_str().chars().count();
            let strength = if m.start() == 0 && m.end() == segment.len() {
                EXACT_STRENGTH
            } else {
                #[allow(clippy::cast_precision_loss)]
                let coverage = covered as f32 / segment_chars.max(1) as f32;
                if coverage >= STRONG_COVERAGE {
                    STRONG_STRENGTH
                } else {
                    WEAK_STRENGTH
                }
            };
            best = best.max(strength);
            if best >= EXACT_STRENGTH {
                return best;
            }
        }
    }
    best
}
