use anyhow::{anyhow, Context};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use trialmap_anchors::collapse_whitespace;
use trialmap_protocol::{Anchor, ContentKind, DocumentType, ExtractedFact, FactValue, Language};
use trialmap_zones::config::{parse_rules, ConfigSource, Shape};

const BUILTIN_FACTS: &str = include_str!("../../../rules/facts.json");

const FACT_SHAPE: Shape = Shape::Object(&[
    ("key", Shape::Leaf),
    ("description", Shape::Leaf),
    ("patterns", Shape::MapOf(&Shape::Leaf)),
]);
const FACTS_SHAPE: Shape = Shape::Object(&[
    ("schema_version", Shape::Leaf),
    ("description", Shape::Leaf),
    ("facts", Shape::ArrayOf(&FACT_SHAPE)),
    ("required", Shape::MapOf(&Shape::Leaf)),
]);

#[derive(Debug, Deserialize)]
struct RawFacts {
    #[allow(dead_code)]
    schema_version: u32,
    #[allow(dead_code)]
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    facts: Vec<RawFact>,
    #[serde(default)]
    required: BTreeMap<DocumentType, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawFact {
    key: String,
    #[allow(dead_code)]
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    patterns: BTreeMap<Language, Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct FactRule {
    pub key: String,
    patterns: Vec<(Language, Regex)>,
}

impl FactRule {
    fn patterns_for(&self, language: Language) -> impl Iterator<Item = &Regex> {
        self.patterns
            .iter()
            .filter(move |(lang, _)| !language.is_concrete() || *lang == language)
            .map(|(_, re)| re)
    }
}

/// Immutable fact rules plus the facts each document type must yield.
#[derive(Debug, Clone)]
pub struct FactRules {
    rules: Vec<FactRule>,
    required: BTreeMap<DocumentType, Vec<String>>,
    source: ConfigSource,
}

impl FactRules {
    pub fn from_bytes(name: &str, bytes: &[u8]) -> anyhow::Result<Self> {
        let raw: RawFacts = parse_rules(bytes, &FACTS_SHAPE, "facts")
            .with_context(|| format!("Fact rules '{name}' are not valid configuration"))?;

        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(raw.facts.len());
        for (idx, fact) in raw.facts.into_iter().enumerate() {
            let key = fact.key.trim().to_string();
            if key.is_empty() || !seen.insert(key.clone()) {
                return Err(anyhow!(
                    "Fact rules '{name}': facts[{idx}].key '{key}' is empty or duplicated"
                ));
            }
            let mut patterns = Vec::new();
            for (language, list) in fact.patterns {
                if !language.is_concrete() {
                    return Err(anyhow!(
                        "Fact rules '{name}': facts[{idx}].patterns.{language}: only concrete languages may carry patterns"
                    ));
                }
                for pattern in list.iter().filter(|p| !p.trim().is_empty()) {
                    let re = RegexBuilder::new(pattern)
                        .case_insensitive(true)
                        .multi_line(true)
                        .build()
                        .with_context(|| {
                            format!("facts[{idx}].patterns.{language}: invalid regex '{pattern}'")
                        })?;
                    patterns.push((language, re));
                }
            }
            if patterns.is_empty() {
                return Err(anyhow!("Fact rules '{name}': facts[{idx}] ({key}) has no patterns"));
            }
            rules.push(FactRule { key, patterns });
        }

        for (doc_type, keys) in &raw.required {
            if let Some(missing) = keys.iter().find(|k| !seen.contains(k.as_str())) {
                return Err(anyhow!(
                    "Fact rules '{name}': required.{doc_type} names undefined fact '{missing}'"
                ));
            }
        }

        Ok(Self {
            rules,
            required: raw.required,
            source: ConfigSource::from_bytes(name, bytes),
        })
    }

    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_bytes("facts", BUILTIN_FACTS.as_bytes())
    }

    #[must_use]
    pub fn rules(&self) -> &[FactRule] {
        &self.rules
    }

    #[must_use]
    pub fn required_for(&self, document_type: DocumentType) -> &[String] {
        self.required
            .get(&document_type)
            .map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub const fn source(&self) -> &ConfigSource {
        &self.source
    }
}

/// Runs fact rules over body text anchors (paragraphs, list items, table cells).
#[derive(Debug, Clone)]
pub struct FactExtractor {
    rules: Arc<FactRules>,
}

impl FactExtractor {
    #[must_use]
    pub fn new(rules: Arc<FactRules>) -> Self {
        Self { rules }
    }

    /// One record per fact key that matched at least once, in rule order. Every
    /// distinct value keeps its evidence anchors; more than one value is a conflict.
    #[must_use]
    pub fn extract(&self, anchors: &[Anchor]) -> Vec<ExtractedFact> {
        let body: Vec<&Anchor> = anchors
            .iter()
            .filter(|a| {
                matches!(
                    a.kind,
                    ContentKind::Paragraph | ContentKind::ListItem | ContentKind::TableCell
                )
            })
            .collect();

        let mut facts = Vec::new();
        for rule in &self.rules.rules {
            let mut values: Vec<FactValue> = Vec::new();
            let mut seen: Vec<String> = Vec::new();
            for anchor in &body {
                for re in rule.patterns_for(anchor.language) {
                    for caps in re.captures_iter(&anchor.text) {
                        let Some(found) = caps.get(1).or_else(|| caps.get(0)) else {
                            continue;
                        };
                        let value = collapse_whitespace(found.as_str());
                        if value.is_empty() {
                            continue;
                        }
                        // Patterns are case-insensitive, so values compare that way too;
                        // the first spelling is the one reported.
                        let key = value.to_lowercase();
                        match seen.iter().position(|k| *k == key) {
                            Some(idx) => {
                                let existing = &mut values[idx];
                                if !existing.anchor_ids.contains(&anchor.anchor_id) {
                                    existing.anchor_ids.push(anchor.anchor_id.clone());
                                }
                            }
                            None => {
                                seen.push(key);
                                values.push(FactValue {
                                    value,
                                    anchor_ids: vec![anchor.anchor_id.clone()],
                                });
                            }
                        }
                    }
                }
            }
            if values.is_empty() {
                continue;
            }
            let conflicting = values.len() > 1;
            if conflicting {
                log::info!(
                    "fact {} has {} conflicting values",
                    rule.key,
                    values.len()
                );
            }
            facts.push(ExtractedFact {
                key: rule.key.clone(),
                values,
                conflicting,
            });
        }
        facts
    }
}

/// Required keys with no extracted value, in required order.
#[must_use]
pub fn missing_required(facts: &[ExtractedFact], required: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|key| !facts.iter().any(|f| &f.key == *key))
        .cloned()
        .collect()
}
