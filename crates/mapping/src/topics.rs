use crate::clustering::cluster_index;
use crate::error::{MappingError, Result};
use crate::text::{contains_phrase, HeadingMatcher};
use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use trialmap_anchors::{normalize_for_matching, normalize_heading};
use trialmap_embeddings::cosine_similarity;
use trialmap_protocol::{
    CandidateScore, DocumentType, HeadingBlock, HeadingCluster, Language, ScoreBreakdown,
    TopicAssignment, TopicExplanation, Zone,
};
use trialmap_zones::config::{parse_rules, ConfigSource, Shape};

const BUILTIN_TOPICS: &str = include_str!("../../../rules/topics.json");

pub const HEADING_WEIGHT: f32 = 0.4;
pub const KEYWORD_WEIGHT: f32 = 0.3;
pub const EMBEDDING_WEIGHT: f32 = 0.3;
pub const PREFERRED_ZONE_PRIOR: f32 = 0.10;
pub const DISSIMILAR_ZONE_PRIOR: f32 = -0.15;
pub const CLUSTER_PRIOR: f32 = 0.05;
pub const NEIGHBOR_BONUS: f32 = 0.05;
pub const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.30;

const KEYWORD_CAP: usize = 5;
const TOP_CANDIDATES: usize = 3;

const LANGUAGE_MAP: Shape = Shape::MapOf(&Shape::Leaf);
const TOPIC_SHAPE: Shape = Shape::Object(&[
    ("key", Shape::Leaf),
    ("title", Shape::Leaf),
    ("description", Shape::Leaf),
    ("aliases", LANGUAGE_MAP),
    ("keywords", LANGUAGE_MAP),
    ("preferred_zones", Shape::Leaf),
    ("dissimilar_zones", Shape::Leaf),
    ("applicable_doc_types", Shape::Leaf),
    ("active", Shape::Leaf),
]);
const CATALOG_SHAPE: Shape = Shape::Object(&[
    ("schema_version", Shape::Leaf),
    ("description", Shape::Leaf),
    ("confidence_floor", Shape::Leaf),
    ("topics", Shape::ArrayOf(&TOPIC_SHAPE)),
]);

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[allow(dead_code)]
    schema_version: u32,
    #[allow(dead_code)]
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    confidence_floor: Option<f32>,
    #[serde(default)]
    topics: Vec<RawTopic>,
}

#[derive(Debug, Deserialize)]
struct RawTopic {
    key: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    aliases: BTreeMap<Language, Vec<String>>,
    #[serde(default)]
    keywords: BTreeMap<Language, Vec<String>>,
    #[serde(default)]
    preferred_zones: Vec<Zone>,
    #[serde(default)]
    dissimilar_zones: Vec<Zone>,
    #[serde(default)]
    applicable_doc_types: Vec<DocumentType>,
    #[serde(default = "default_active")]
    active: bool,
}

const fn default_active() -> bool {
    true
}

/// One entry of the open topic vocabulary, with matching texts pre-normalized.
#[derive(Debug, Clone)]
pub struct Topic {
    pub key: String,
    pub title: String,
    pub description: Option<String>,
    normalized_title: String,
    aliases: BTreeMap<Language, Vec<String>>,
    keywords: BTreeMap<Language, Vec<String>>,
    pub preferred_zones: Vec<Zone>,
    pub dissimilar_zones: Vec<Zone>,
    pub applicable_doc_types: Vec<DocumentType>,
    pub active: bool,
}

impl Topic {
    /// Title plus aliases usable for `language` (all languages when it is not concrete).
    pub fn heading_candidates(&self, language: Language) -> impl Iterator<Item = &str> {
        std::iter::once(self.normalized_title.as_str()).chain(
            self.aliases
                .iter()
                .filter(move |(lang, _)| !language.is_concrete() || **lang == language)
                .flat_map(|(_, list)| list.iter().map(String::as_str)),
        )
    }

    #[must_use]
    pub fn keywords_for(&self, language: Language) -> Vec<&str> {
        self.keywords
            .iter()
            .filter(|(lang, _)| !language.is_concrete() || **lang == language)
            .flat_map(|(_, list)| list.iter().map(String::as_str))
            .collect()
    }

    /// Text embedded to represent the topic.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        let mut parts = vec![self.normalized_title.clone()];
        parts.extend(self.aliases.values().flatten().cloned());
        parts.extend(self.keywords.values().flatten().cloned());
        parts.join(" ")
    }

    fn zone_prior(&self, zone: Zone) -> f32 {
        if self.preferred_zones.contains(&zone) {
            PREFERRED_ZONE_PRIOR
        } else if self.dissimilar_zones.contains(&zone) {
            DISSIMILAR_ZONE_PRIOR
        } else {
            0.0
        }
    }
}

/// Immutable topic catalog.
#[derive(Debug, Clone)]
pub struct TopicCatalog {
    topics: Vec<Topic>,
    confidence_floor: f32,
    source: ConfigSource,
}

impl TopicCatalog {
    pub fn from_bytes(name: &str, bytes: &[u8]) -> anyhow::Result<Self> {
        let raw: RawCatalog = parse_rules(bytes, &CATALOG_SHAPE, "topics")
            .with_context(|| format!("Topic catalog '{name}' is not valid configuration"))?;
        Self::from_raw(raw, ConfigSource::from_bytes(name, bytes))
            .with_context(|| format!("Topic catalog '{name}' failed validation"))
    }

    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_bytes("topics", BUILTIN_TOPICS.as_bytes())
    }

    fn from_raw(raw: RawCatalog, source: ConfigSource) -> anyhow::Result<Self> {
        let confidence_floor = raw.confidence_floor.unwrap_or(DEFAULT_CONFIDENCE_FLOOR);
        if !(0.0..=1.0).contains(&confidence_floor) {
            return Err(anyhow!("confidence_floor must be within [0, 1]"));
        }

        let mut seen = HashSet::new();
        let mut topics = Vec::with_capacity(raw.topics.len());
        for (idx, topic) in raw.topics.into_iter().enumerate() {
            let key = topic.key.trim().to_string();
            if key.is_empty() {
                return Err(anyhow!("topics[{idx}].key must not be empty"));
            }
            if !seen.insert(key.clone()) {
                return Err(anyhow!("topics[{idx}].key '{key}' is duplicated"));
            }
            if topic.applicable_doc_types.is_empty() {
                return Err(anyhow!(
                    "topics[{idx}].applicable_doc_types must list at least one document type"
                ));
            }
            if topic
                .preferred_zones
                .iter()
                .chain(&topic.dissimilar_zones)
                .any(|z| *z == Zone::Unknown)
            {
                return Err(anyhow!("topics[{idx}]: 'unknown' cannot be a zone prior"));
            }
            let normalized_title = normalize_heading(&topic.title);
            if normalized_title.is_empty() {
                return Err(anyhow!("topics[{idx}].title must not be empty"));
            }

            topics.push(Topic {
                key,
                normalized_title,
                aliases: normalize_lists(topic.aliases, normalize_heading),
                keywords: normalize_lists(topic.keywords, normalize_for_matching),
                title: topic.title,
                description: topic.description,
                preferred_zones: topic.preferred_zones,
                dissimilar_zones: topic.dissimilar_zones,
                applicable_doc_types: topic.applicable_doc_types,
                active: topic.active,
            });
        }
        topics.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(Self {
            topics,
            confidence_floor,
            source,
        })
    }

    #[must_use]
    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    /// Active topics applicable to `document_type`, ordered by key.
    #[must_use]
    pub fn active_for(&self, document_type: DocumentType) -> Vec<&Topic> {
        self.topics
            .iter()
            .filter(|t| t.active && t.applicable_doc_types.contains(&document_type))
            .collect()
    }

    #[must_use]
    pub const fn confidence_floor(&self) -> f32 {
        self.confidence_floor
    }

    #[must_use]
    pub const fn source(&self) -> &ConfigSource {
        &self.source
    }
}

fn normalize_lists(
    lists: BTreeMap<Language, Vec<String>>,
    normalize: fn(&str) -> String,
) -> BTreeMap<Language, Vec<String>> {
    lists
        .into_iter()
        .map(|(lang, list)| {
            let normalized = list
                .iter()
                .map(|item| normalize(item))
                .filter(|item| !item.is_empty())
                .collect();
            (lang, normalized)
        })
        .collect()
}

/// Everything the scorer needs for one document.
pub struct TopicInputs<'a> {
    pub document_type: DocumentType,
    pub blocks: &'a [HeadingBlock],
    /// Aligned with `blocks`.
    pub block_embeddings: &'a [Vec<f32>],
    /// Keyed by topic key.
    pub topic_embeddings: &'a HashMap<String, Vec<f32>>,
    pub clusters: &'a [HeadingCluster],
}

#[derive(Debug, Clone, Default)]
pub struct TopicOutcome {
    pub assignments: Vec<TopicAssignment>,
    pub unassigned: Vec<String>,
    pub warnings: Vec<String>,
}

/// Multi-signal scorer assigning at most one topic per heading block.
#[derive(Debug, Clone)]
pub struct TopicScorer {
    catalog: Arc<TopicCatalog>,
}

impl TopicScorer {
    #[must_use]
    pub fn new(catalog: Arc<TopicCatalog>) -> Self {
        Self { catalog }
    }

    #[must_use]
    pub fn catalog(&self) -> &TopicCatalog {
        &self.catalog
    }

    /// Signals that do not depend on other blocks: heading, keyword, embedding, zone.
    pub fn base_breakdown(
        &self,
        matcher: &mut HeadingMatcher,
        block: &HeadingBlock,
        block_embedding: &[f32],
        topic: &Topic,
        topic_embedding: Option<&Vec<f32>>,
    ) -> Result<ScoreBreakdown> {
        let topic_embedding =
            topic_embedding.ok_or_else(|| MappingError::MissingEmbedding(topic.key.clone()))?;
        if topic_embedding.len() != block_embedding.len() {
            return Err(MappingError::DimensionMismatch {
                subject: format!("block {} vs topic {}", block.heading_block_id, topic.key),
                expected: topic_embedding.len(),
                actual: block_embedding.len(),
            });
        }

        let heading_match = topic
            .heading_candidates(block.language)
            .map(|candidate| matcher.similarity(&block.normalized_heading, candidate))
            .fold(0.0f32, f32::max);

        let keywords = topic.keywords_for(block.language);
        let keyword_match = if keywords.is_empty() {
            0.0
        } else {
            let text = block.searchable_text();
            let hits = keywords
                .iter()
                .filter(|kw| contains_phrase(&text, kw))
                .count();
            #[allow(clippy::cast_precision_loss)]
            let ratio = hits as f32 / keywords.len().min(KEYWORD_CAP) as f32;
            ratio.min(1.0)
        };

        let embedding_similarity = cosine_similarity(block_embedding, topic_embedding).max(0.0);

        let mut breakdown = ScoreBreakdown {
            heading_match,
            keyword_match,
            embedding_similarity,
            zone_prior: topic.zone_prior(block.zone),
            ..ScoreBreakdown::default()
        };
        breakdown.total = total(&breakdown);
        Ok(breakdown)
    }

    /// Score every block against every applicable topic and keep the best one above
    /// the confidence floor.
    pub fn assign(&self, inputs: &TopicInputs<'_>) -> TopicOutcome {
        let mut outcome = TopicOutcome::default();
        let topics = self.catalog.active_for(inputs.document_type);
        if topics.is_empty() {
            outcome.unassigned = inputs
                .blocks
                .iter()
                .map(|b| b.heading_block_id.clone())
                .collect();
            return outcome;
        }

        let mut matcher = HeadingMatcher::new();
        let mut base: Vec<Option<Vec<ScoreBreakdown>>> = Vec::with_capacity(inputs.blocks.len());
        for (idx, block) in inputs.blocks.iter().enumerate() {
            let scored = match inputs.block_embeddings.get(idx) {
                Some(embedding) => topics
                    .iter()
                    .map(|topic| {
                        self.base_breakdown(
                            &mut matcher,
                            block,
                            embedding,
                            topic,
                            inputs.topic_embeddings.get(&topic.key),
                        )
                    })
                    .collect::<Result<Vec<_>>>(),
                None => Err(MappingError::MissingEmbedding(block.heading_block_id.clone())),
            };
            match scored {
                Ok(scores) => base.push(Some(scores)),
                Err(err) => {
                    log::warn!("topic scoring failed for {}: {err}", block.heading_block_id);
                    outcome.warnings.push(format!(
                        "topic_scoring_failed: {}: {err}",
                        block.heading_block_id
                    ));
                    base.push(None);
                }
            }
        }

        let clusters = cluster_index(inputs.clusters);
        let votes = self.cluster_votes(inputs, &topics, &base, &clusters);
        let floor = self.catalog.confidence_floor;

        let mut previous_topic: Option<&str> = None;
        for (idx, block) in inputs.blocks.iter().enumerate() {
            let Some(scores) = &base[idx] else {
                outcome.unassigned.push(block.heading_block_id.clone());
                previous_topic = None;
                continue;
            };
            let cluster = clusters.get(block.heading_block_id.as_str()).copied();
            let voted = cluster.and_then(|c| votes.get(c.cluster_id.as_str()).copied());

            let mut candidates: Vec<(&Topic, ScoreBreakdown)> = topics
                .iter()
                .zip(scores)
                .map(|(topic, breakdown)| {
                    let mut breakdown = *breakdown;
                    if voted == Some(topic.key.as_str()) {
                        breakdown.cluster_prior = CLUSTER_PRIOR;
                    }
                    if previous_topic == Some(topic.key.as_str()) {
                        breakdown.neighbor_bonus = NEIGHBOR_BONUS;
                    }
                    breakdown.total = total(&breakdown);
                    (*topic, breakdown)
                })
                .collect();
            candidates.sort_by(|a, b| {
                b.1.total
                    .total_cmp(&a.1.total)
                    .then_with(|| a.0.key.cmp(&b.0.key))
            });

            match candidates.first() {
                Some(&(topic, breakdown)) if breakdown.total >= floor => {
                    let top_candidates = candidates
                        .iter()
                        .take(TOP_CANDIDATES)
                        .enumerate()
                        .map(|(rank, (t, b))| CandidateScore {
                            rank: u32::try_from(rank + 1).unwrap_or(u32::MAX),
                            topic_key: t.key.clone(),
                            breakdown: *b,
                        })
                        .collect();
                    outcome.assignments.push(TopicAssignment {
                        doc_version_id: block.doc_version_id.clone(),
                        heading_block_id: block.heading_block_id.clone(),
                        topic_key: topic.key.clone(),
                        confidence: breakdown.total.clamp(0.0, 1.0),
                        explanation: TopicExplanation {
                            components: breakdown,
                            top_candidates,
                            cluster_id: cluster.map(|c| c.cluster_id.clone()),
                        },
                    });
                    previous_topic = Some(topic.key.as_str());
                }
                _ => {
                    outcome.unassigned.push(block.heading_block_id.clone());
                    previous_topic = None;
                }
            }
        }

        log::debug!(
            "assigned topics to {}/{} heading blocks",
            outcome.assignments.len(),
            inputs.blocks.len()
        );
        outcome
    }

    /// Majority vote of the members' best base candidates, per cluster.
    fn cluster_votes<'t>(
        &self,
        inputs: &TopicInputs<'_>,
        topics: &[&'t Topic],
        base: &[Option<Vec<ScoreBreakdown>>],
        clusters: &HashMap<&str, &HeadingCluster>,
    ) -> HashMap<String, &'t str> {
        let mut tallies: HashMap<String, BTreeMap<&'t str, usize>> = HashMap::new();
        for (block, scores) in inputs.blocks.iter().zip(base) {
            let (Some(scores), Some(cluster)) =
                (scores, clusters.get(block.heading_block_id.as_str()))
            else {
                continue;
            };
            let best = topics
                .iter()
                .zip(scores)
                .filter(|(_, b)| b.total >= self.catalog.confidence_floor)
                .max_by(|a, b| {
                    a.1.total
                        .total_cmp(&b.1.total)
                        .then_with(|| b.0.key.cmp(&a.0.key))
                });
            if let Some((&topic, _)) = best {
                *tallies
                    .entry(cluster.cluster_id.clone())
                    .or_default()
                    .entry(topic.key.as_str())
                    .or_insert(0) += 1;
            }
        }

        tallies
            .into_iter()
            .filter_map(|(cluster_id, counts)| {
                // BTreeMap iterates keys ascending, so the first maximum wins ties.
                let mut winner: Option<(&str, usize)> = None;
                for (key, count) in counts {
                    if winner.map_or(true, |(_, best)| count > best) {
                        winner = Some((key, count));
                    }
                }
                winner.map(|(key, _)| (cluster_id, key))
            })
            .collect()
    }
}

fn total(b: &ScoreBreakdown) -> f32 {
    HEADING_WEIGHT * b.heading_match
        + KEYWORD_WEIGHT * b.keyword_match
        + EMBEDDING_WEIGHT * b.embedding_similarity
        + b.zone_prior
        + b.cluster_prior
        + b.neighbor_bonus
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn catalog(json: &str) -> Arc<TopicCatalog> {
        Arc::new(TopicCatalog::from_bytes("test", json.as_bytes()).unwrap())
    }

    fn block(idx: u32, heading: &str, content: &str, zone: Zone) -> HeadingBlock {
        HeadingBlock {
            heading_block_id: format!("hb:{idx}"),
            doc_version_id: "D:v1".to_string(),
            heading_anchor_id: format!("D:v1:hdr:{idx}:x"),
            heading_text: heading.to_string(),
            normalized_heading: normalize_heading(heading),
            heading_level: Some(1),
            structural_path: vec![heading.to_string()],
            content_anchor_ids: vec![],
            content_text: normalize_for_matching(content),
            zone,
            language: Language::En,
            order: idx,
        }
    }

    const SINGLE: &str = r#"{
        "schema_version": 1,
        "topics": [
            {"key": "zebra", "title": "Zebra protocol", "applicable_doc_types": ["protocol"]}
        ]
    }"#;

    #[test]
    fn exact_heading_alone_scores_point_four() {
        let scorer = TopicScorer::new(catalog(SINGLE));
        let topic = &scorer.catalog().topics()[0];
        let b = block(0, "Zebra Protocol", "", Zone::Unknown);
        let topic_embedding = vec![0.0, 0.0];
        let breakdown = scorer
            .base_breakdown(
                &mut HeadingMatcher::new(),
                &b,
                &[1.0, 0.0],
                topic,
                Some(&topic_embedding),
            )
            .unwrap();
        assert_eq!(breakdown.heading_match, 1.0);
        assert_eq!(breakdown.keyword_match, 0.0);
        assert_eq!(breakdown.embedding_similarity, 0.0);
        assert_eq!(breakdown.total, 0.4);
    }

    const CATALOG: &str = r#"{
        "schema_version": 1,
        "confidence_floor": 0.3,
        "topics": [
            {"key": "inclusion_criteria", "title": "Inclusion criteria",
             "aliases": {"en": ["eligibility criteria"], "ru": ["критерии включения"]},
             "keywords": {"en": ["age", "informed consent", "diagnosis"]},
             "preferred_zones": ["population"], "dissimilar_zones": ["statistics"],
             "applicable_doc_types": ["protocol", "csr"]},
            {"key": "sample_size", "title": "Sample size",
             "keywords": {"en": ["power", "subjects"]},
             "preferred_zones": ["statistics"],
             "applicable_doc_types": ["protocol"]},
            {"key": "retired", "title": "Retired topic", "active": false,
             "applicable_doc_types": ["protocol"]}
        ]
    }"#;

    fn zero_embeddings(catalog: &TopicCatalog) -> HashMap<String, Vec<f32>> {
        catalog
            .topics()
            .iter()
            .map(|t| (t.key.clone(), vec![0.0, 0.0]))
            .collect()
    }

    #[test]
    fn assigns_best_topic_with_explanation() {
        let scorer = TopicScorer::new(catalog(CATALOG));
        let blocks = vec![
            block(0, "5.1 Inclusion Criteria", "Age 18 or older. Signed informed consent.", Zone::Population),
            block(1, "Statistical power", "Ninety subjects give 80% power.", Zone::Statistics),
            block(2, "Acknowledgements", "", Zone::Admin),
        ];
        let embeddings = vec![vec![1.0, 0.0]; 3];
        let topic_embeddings = zero_embeddings(scorer.catalog());
        let outcome = scorer.assign(&TopicInputs {
            document_type: DocumentType::Protocol,
            blocks: &blocks,
            block_embeddings: &embeddings,
            topic_embeddings: &topic_embeddings,
            clusters: &[],
        });

        assert_eq!(outcome.assignments.len(), 2);
        let first = &outcome.assignments[0];
        assert_eq!(first.topic_key, "inclusion_criteria");
        // 0.4 heading + 0.3 * 2/3 keywords + 0.10 zone prior
        assert!((first.confidence - 0.7).abs() < 1e-5, "{}", first.confidence);
        assert_eq!(first.explanation.top_candidates.len(), 2);
        assert_eq!(first.explanation.top_candidates[0].rank, 1);

        let second = &outcome.assignments[1];
        assert_eq!(second.topic_key, "sample_size");
        assert_eq!(outcome.unassigned, vec!["hb:2".to_string()]);
    }

    #[test]
    fn neighbor_bonus_follows_previous_assignment() {
        let scorer = TopicScorer::new(catalog(CATALOG));
        let blocks = vec![
            block(0, "Inclusion criteria", "", Zone::Population),
            block(1, "Further requirements", "age diagnosis", Zone::Population),
        ];
        let embeddings = vec![vec![1.0, 0.0]; 2];
        let topic_embeddings = zero_embeddings(scorer.catalog());
        let outcome = scorer.assign(&TopicInputs {
            document_type: DocumentType::Protocol,
            blocks: &blocks,
            block_embeddings: &embeddings,
            topic_embeddings: &topic_embeddings,
            clusters: &[],
        });
        let second = &outcome.assignments[1];
        assert_eq!(second.topic_key, "inclusion_criteria");
        assert_eq!(second.explanation.components.neighbor_bonus, NEIGHBOR_BONUS);
    }

    #[test]
    fn dimension_mismatch_leaves_block_unassigned_with_warning() {
        let scorer = TopicScorer::new(catalog(CATALOG));
        let blocks = vec![block(0, "Inclusion criteria", "", Zone::Population)];
        let embeddings = vec![vec![1.0, 0.0, 0.0]];
        let topic_embeddings = zero_embeddings(scorer.catalog());
        let outcome = scorer.assign(&TopicInputs {
            document_type: DocumentType::Protocol,
            blocks: &blocks,
            block_embeddings: &embeddings,
            topic_embeddings: &topic_embeddings,
            clusters: &[],
        });
        assert!(outcome.assignments.is_empty());
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].starts_with("topic_scoring_failed: hb:0"));
    }

    #[test]
    fn only_applicable_active_topics_are_scored() {
        let catalog = catalog(CATALOG);
        let keys: Vec<_> = catalog
            .active_for(DocumentType::Csr)
            .iter()
            .map(|t| t.key.as_str())
            .collect();
        assert_eq!(keys, vec!["inclusion_criteria"]);
        assert_eq!(catalog.active_for(DocumentType::Protocol).len(), 2);
    }

    #[test]
    fn catalog_validation() {
        let err = TopicCatalog::from_bytes(
            "bad",
            br#"{"schema_version": 1, "topics": [{"key": "x", "title": "X"}]}"#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("applicable_doc_types"));

        let err = TopicCatalog::from_bytes(
            "bad",
            br#"{"schema_version": 1, "topics": [
                {"key": "x", "title": "X", "applicable_doc_types": ["protocol"]},
                {"key": "x", "title": "Y", "applicable_doc_types": ["protocol"]}
            ]}"#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("duplicated"));
    }

    #[test]
    fn builtin_catalog_parses() {
        let catalog = TopicCatalog::builtin().unwrap();
        assert!(!catalog.active_for(DocumentType::Protocol).is_empty());
        assert!((catalog.confidence_floor() - DEFAULT_CONFIDENCE_FLOOR).abs() < f32::EPSILON);
    }
}
