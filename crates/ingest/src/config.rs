use crate::facts::FactRules;
use crate::quality::QualityThresholds;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use trialmap_anchors::ChunkerConfig;
use trialmap_embeddings::DEFAULT_DIMENSION;
use trialmap_mapping::{AlignmentConfig, ClusteringConfig, SectionRules, TopicCatalog};
use trialmap_zones::{ConfigSource, ZoneRegistry, ZoneRuleSet};

const PIPELINE_FILE: &str = "pipeline.toml";

/// Numeric knobs of every stage. Missing tables fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSettings {
    #[serde(default)]
    pub chunker: ChunkerConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub alignment: AlignmentConfig,
    #[serde(default)]
    pub quality: QualityThresholds,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
}

const fn default_embedding_dimension() -> usize {
    DEFAULT_DIMENSION
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            clustering: ClusteringConfig::default(),
            alignment: AlignmentConfig::default(),
            quality: QualityThresholds::default(),
            embedding_dimension: default_embedding_dimension(),
        }
    }
}

impl PipelineSettings {
    pub fn from_toml(text: &str) -> Result<Self> {
        let settings: Self = toml::from_str(text).context("Invalid pipeline settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.chunker
            .validate()
            .map_err(|err| anyhow!("chunker: {err}"))?;
        self.clustering
            .validate()
            .map_err(|err| anyhow!("clustering: {err}"))?;
        self.alignment
            .validate()
            .map_err(|err| anyhow!("alignment: {err}"))?;
        if self.embedding_dimension == 0 {
            return Err(anyhow!("embedding_dimension must be > 0"));
        }
        Ok(())
    }
}

/// Every immutable configuration object one ingestor runs with.
///
/// Reloading means building a new `IngestConfig`; nothing here is mutated after
/// construction, so the same instance can be shared across concurrent ingests.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub zones: Arc<ZoneRegistry>,
    pub topics: Arc<TopicCatalog>,
    pub sections: Arc<SectionRules>,
    pub facts: Arc<FactRules>,
    pub settings: PipelineSettings,
}

impl IngestConfig {
    /// Bundled rule files with default settings.
    pub fn builtin() -> Result<Self> {
        Ok(Self {
            zones: Arc::new(ZoneRegistry::builtin()?),
            topics: Arc::new(TopicCatalog::builtin()?),
            sections: Arc::new(SectionRules::builtin()?),
            facts: Arc::new(FactRules::builtin()?),
            settings: PipelineSettings::default(),
        })
    }

    /// Load rules from a directory laid out like the bundled `rules/` tree.
    ///
    /// Each file is optional (`.json` first, then `.toml`); a missing file keeps the
    /// bundled version.
    pub fn from_rules_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(anyhow!("Rules directory {} does not exist", dir.display()));
        }
        let mut config = Self::builtin()?;

        let zones_dir = dir.join("zones");
        let mut overridden_zones = false;
        let mut sets = Vec::with_capacity(ZoneRuleSet::BUILTIN_NAMES.len());
        for name in ZoneRuleSet::BUILTIN_NAMES {
            match read_rule_file(&zones_dir, name)? {
                Some(bytes) => {
                    overridden_zones = true;
                    sets.push(ZoneRuleSet::from_bytes(name, &bytes)?);
                }
                None => sets.push(ZoneRuleSet::builtin(name)?),
            }
        }
        if overridden_zones {
            config.zones = Arc::new(ZoneRegistry::new(sets)?);
        }

        if let Some(bytes) = read_rule_file(dir, "topics")? {
            config.topics = Arc::new(TopicCatalog::from_bytes("topics", &bytes)?);
        }
        if let Some(bytes) = read_rule_file(dir, "sections")? {
            config.sections = Arc::new(SectionRules::from_bytes("sections", &bytes)?);
        }
        if let Some(bytes) = read_rule_file(dir, "facts")? {
            config.facts = Arc::new(FactRules::from_bytes("facts", &bytes)?);
        }

        let settings_path = dir.join(PIPELINE_FILE);
        if settings_path.is_file() {
            let text = std::fs::read_to_string(&settings_path).with_context(|| {
                format!("Failed to read pipeline settings {}", settings_path.display())
            })?;
            config.settings = PipelineSettings::from_toml(&text)
                .with_context(|| format!("In {}", settings_path.display()))?;
        }

        log::debug!("loaded rules from {}", dir.display());
        Ok(config)
    }

    #[must_use]
    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Every configuration source that feeds the run hash, sorted by name.
    #[must_use]
    pub fn sources(&self) -> Vec<&ConfigSource> {
        let mut sources = self.zones.sources();
        sources.push(self.topics.source());
        sources.push(self.sections.source());
        sources.push(self.facts.source());
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        sources
    }

    /// SHA-256 over all source digests plus the serialized settings.
    #[must_use]
    pub fn config_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for source in self.sources() {
            hasher.update(source.name.as_bytes());
            hasher.update(b":");
            hasher.update(source.digest.as_bytes());
            hasher.update(b"\n");
        }
        // Settings are plain numbers and booleans, serialization cannot fail.
        let settings = serde_json::to_string(&self.settings).unwrap_or_default();
        hasher.update(settings.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

fn read_rule_file(dir: &Path, stem: &str) -> Result<Option<Vec<u8>>> {
    let candidates: [PathBuf; 2] = [
        dir.join(format!("{stem}.json")),
        dir.join(format!("{stem}.toml")),
    ];
    for path in candidates {
        if path.is_file() {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read rule file {}", path.display()))?;
            return Ok(Some(bytes));
        }
    }
    Ok(None)
}
