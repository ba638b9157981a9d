use crate::config::{parse_rules, ConfigSource, Shape};
use anyhow::{anyhow, Context, Result};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::collections::BTreeMap;
use trialmap_protocol::{DocumentType, Language, Zone};

const BUILTIN_PROTOCOL: &str = include_str!("../../../rules/zones/protocol.json");
const BUILTIN_CSR: &str = include_str!("../../../rules/zones/csr.json");
const BUILTIN_GENERIC: &str = include_str!("../../../rules/zones/generic.json");

const RULE_SHAPE: Shape = Shape::Object(&[
    ("zone", Shape::Leaf),
    ("priority", Shape::Leaf),
    ("patterns", Shape::MapOf(&Shape::Leaf)),
]);

const ZONE_RULES_SHAPE: Shape = Shape::Object(&[
    ("schema_version", Shape::Leaf),
    ("name", Shape::Leaf),
    ("description", Shape::Leaf),
    ("document_types", Shape::Leaf),
    ("allowed_zones", Shape::Leaf),
    ("skip_segments", Shape::Leaf),
    ("rules", Shape::ArrayOf(&RULE_SHAPE)),
]);

#[derive(Debug, Deserialize)]
struct RawZoneRules {
    #[allow(dead_code)]
    schema_version: u32,
    name: String,
    #[allow(dead_code)]
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    document_types: Vec<DocumentType>,
    #[serde(default)]
    allowed_zones: Vec<Zone>,
    #[serde(default)]
    skip_segments: Vec<String>,
    #[serde(default)]
    rules: Vec<RawZoneRule>,
}

#[derive(Debug, Deserialize)]
struct RawZoneRule {
    zone: Zone,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    patterns: BTreeMap<Language, Vec<String>>,
}

/// One zone rule with its patterns compiled per language.
#[derive(Debug, Clone)]
pub struct ZoneRule {
    pub zone: Zone,
    pub priority: i32,
    patterns: Vec<(Language, Regex)>,
}

impl ZoneRule {
    /// Patterns that apply to `language`; `mixed`/`unknown` see every language.
    pub fn patterns_for(&self, language: Language) -> impl Iterator<Item = &Regex> {
        self.patterns
            .iter()
            .filter(move |(lang, _)| !language.is_concrete() || *lang == language)
            .map(|(_, re)| re)
    }

    /// A rule for `unknown` marks generic content instead of naming a zone.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.zone == Zone::Unknown
    }
}

/// Immutable, ordered zone rule set for one or more document types.
#[derive(Debug, Clone)]
pub struct ZoneRuleSet {
    name: String,
    document_types: Vec<DocumentType>,
    allowed_zones: Vec<Zone>,
    skip_segments: Vec<String>,
    rules: Vec<ZoneRule>,
    source: ConfigSource,
}

impl ZoneRuleSet {
    /// Names of the bundled rule sets, also the file stems under `rules/zones/`.
    pub const BUILTIN_NAMES: [&'static str; 3] = ["protocol", "csr", "generic"];

    /// A bundled rule set by name.
    pub fn builtin(name: &str) -> Result<Self> {
        let bytes = match name {
            "protocol" => BUILTIN_PROTOCOL,
            "csr" => BUILTIN_CSR,
            "generic" => BUILTIN_GENERIC,
            other => return Err(anyhow!("no bundled zone rule set named '{other}'")),
        };
        Self::from_bytes(name, bytes.as_bytes())
    }

    pub fn from_bytes(name: &str, bytes: &[u8]) -> Result<Self> {
        let raw: RawZoneRules = parse_rules(bytes, &ZONE_RULES_SHAPE, "zones")
            .with_context(|| format!("Zone rules '{name}' are not valid configuration"))?;
        Self::from_raw(raw, ConfigSource::from_bytes(name, bytes))
            .with_context(|| format!("Zone rules '{name}' failed validation"))
    }

    fn from_raw(raw: RawZoneRules, source: ConfigSource) -> Result<Self> {
        let allowed_zones = if raw.allowed_zones.is_empty() {
            Zone::ALL.to_vec()
        } else {
            raw.allowed_zones
        };

        let mut rules = Vec::with_capacity(raw.rules.len());
        for (idx, rule) in raw.rules.into_iter().enumerate() {
            let mut patterns = Vec::new();
            for (language, list) in rule.patterns {
                if !language.is_concrete() {
                    return Err(anyhow!(
                        "rules[{idx}].patterns.{language}: only concrete languages may carry patterns"
                    ));
                }
                for pattern in list.iter().filter(|p| !p.trim().is_empty()) {
                    let re = RegexBuilder::new(pattern)
                        .case_insensitive(true)
                        .build()
                        .with_context(|| {
                            format!("rules[{idx}].patterns.{language}: invalid regex '{pattern}'")
                        })?;
                    patterns.push((language, re));
                }
            }
            if patterns.is_empty() {
                return Err(anyhow!("rules[{idx}] ({}) has no patterns", rule.zone));
            }
            rules.push(ZoneRule {
                zone: rule.zone,
                priority: rule.priority,
                patterns,
            });
        }
        // Stable sort keeps file order among equal priorities.
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));

        Ok(Self {
            name: raw.name,
            document_types: raw.document_types,
            allowed_zones,
            skip_segments: raw
                .skip_segments
                .iter()
                .map(|s| trialmap_anchors::normalize_heading(s))
                .filter(|s| !s.is_empty())
                .collect(),
            rules,
            source,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn document_types(&self) -> &[DocumentType] {
        &self.document_types
    }

    /// Rules in evaluation order (descending priority).
    #[must_use]
    pub fn rules(&self) -> &[ZoneRule] {
        &self.rules
    }

    #[must_use]
    pub fn allows(&self, zone: Zone) -> bool {
        zone == Zone::Unknown || self.allowed_zones.contains(&zone)
    }

    #[must_use]
    pub fn is_skip_segment(&self, normalized: &str) -> bool {
        self.skip_segments.iter().any(|s| s == normalized)
    }

    #[must_use]
    pub const fn source(&self) -> &ConfigSource {
        &self.source
    }
}

/// Zone rule sets keyed by document type, with one generic set for everything else.
#[derive(Debug, Clone)]
pub struct ZoneRegistry {
    sets: Vec<ZoneRuleSet>,
    generic: usize,
}

impl ZoneRegistry {
    /// Build from rule sets; exactly one set must declare no document types (the generic one).
    pub fn new(sets: Vec<ZoneRuleSet>) -> Result<Self> {
        let generic: Vec<usize> = sets
            .iter()
            .enumerate()
            .filter(|(_, s)| s.document_types.is_empty())
            .map(|(idx, _)| idx)
            .collect();
        let [generic] = generic.as_slice() else {
            return Err(anyhow!(
                "expected exactly one generic zone rule set (no document_types), found {}",
                generic.len()
            ));
        };

        for doc_type in sets.iter().flat_map(|s| s.document_types.iter()) {
            let owners = sets
                .iter()
                .filter(|s| s.document_types.contains(doc_type))
                .count();
            if owners > 1 {
                return Err(anyhow!(
                    "document type '{doc_type}' is claimed by {owners} zone rule sets"
                ));
            }
        }

        Ok(Self {
            generic: *generic,
            sets,
        })
    }

    /// Bundled rule sets.
    pub fn builtin() -> Result<Self> {
        Self::new(
            ZoneRuleSet::BUILTIN_NAMES
                .iter()
                .map(|name| ZoneRuleSet::builtin(name))
                .collect::<Result<Vec<_>>>()?,
        )
    }

    #[must_use]
    pub fn for_document_type(&self, document_type: DocumentType) -> &ZoneRuleSet {
        self.sets
            .iter()
            .find(|s| s.document_types.contains(&document_type))
            .unwrap_or(&self.sets[self.generic])
    }

    #[must_use]
    pub fn sources(&self) -> Vec<&ConfigSource> {
        self.sets.iter().map(ZoneRuleSet::source).collect()
    }
}
