use crate::error::{EmbeddingError, Result};
use crate::hashing::{Embedder, HashingEmbedder};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use trialmap_protocol::{Language, Zone};

const DEFAULT_ASSIST_TIMEOUT_MS: u64 = 10_000;
const MIN_ASSIST_TIMEOUT_MS: u64 = 100;
const MAX_ASSIST_TIMEOUT_MS: u64 = 120_000;

/// What the assist capability sees when asked for section candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateContext {
    pub doc_version_id: String,
    pub section: Zone,
    pub language: Language,
    pub headings: Vec<HeadingSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadingSummary {
    pub heading_block_id: String,
    pub heading_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSuggestion {
    pub heading_block_id: String,
    #[serde(default)]
    pub rationale: Option<String>,
}

/// Out-of-core helper (model-backed embeddings, candidate suggestion).
///
/// Nothing it returns is authoritative: callers go through [`GuardedAssist`], which
/// bounds every call with a timeout and falls back to the deterministic path.
#[async_trait]
pub trait Assist: Send + Sync {
    fn name(&self) -> &str;

    fn enabled(&self) -> bool {
        true
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn suggest_candidates(
        &self,
        context: &CandidateContext,
    ) -> Result<Vec<CandidateSuggestion>>;
}

/// Assist that never does anything; the deterministic core runs alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAssist;

#[async_trait]
impl Assist for NoopAssist {
    fn name(&self) -> &str {
        "noop"
    }

    fn enabled(&self) -> bool {
        false
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(EmbeddingError::Unavailable("noop assist".to_string()))
    }

    async fn suggest_candidates(
        &self,
        _context: &CandidateContext,
    ) -> Result<Vec<CandidateSuggestion>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingSource {
    Deterministic(String),
    Assist(String),
}

#[derive(Debug, Clone)]
pub struct EmbeddingBatch {
    pub vectors: Vec<Vec<f32>>,
    pub source: EmbeddingSource,
}

/// Timeout-bounded wrapper around an [`Assist`] with a deterministic fallback.
#[derive(Clone)]
pub struct GuardedAssist {
    inner: Arc<dyn Assist>,
    timeout: Duration,
    fallback: HashingEmbedder,
}

impl GuardedAssist {
    pub fn new(inner: Arc<dyn Assist>, timeout: Duration, fallback: HashingEmbedder) -> Self {
        Self {
            inner,
            timeout,
            fallback,
        }
    }

    #[must_use]
    pub fn deterministic(fallback: HashingEmbedder) -> Self {
        Self::new(Arc::new(NoopAssist), assist_timeout_from_env(), fallback)
    }

    #[must_use]
    pub fn fallback(&self) -> &HashingEmbedder {
        &self.fallback
    }

    /// Embed every text with one source. Any assist failure switches the whole batch
    /// to the fallback so vectors stay comparable.
    pub async fn embed_all(&self, texts: &[String], warnings: &mut Vec<String>) -> EmbeddingBatch {
        if self.inner.enabled() && !texts.is_empty() {
            match self.try_embed(texts).await {
                Ok(vectors) => {
                    return EmbeddingBatch {
                        vectors,
                        source: EmbeddingSource::Assist(self.inner.name().to_string()),
                    };
                }
                Err(err) => {
                    log::warn!(
                        "assist '{}' embedding failed, using deterministic embeddings: {err}",
                        self.inner.name()
                    );
                    warnings.push(format!(
                        "assist_embedding_fallback: {}: {err}",
                        self.inner.name()
                    ));
                }
            }
        }

        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        EmbeddingBatch {
            vectors: self.fallback.embed_batch(&refs),
            source: EmbeddingSource::Deterministic(self.fallback.id().to_string()),
        }
    }

    async fn try_embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.with_timeout(self.inner.embed(texts)).await?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        if let Some(first) = vectors.first() {
            let expected = first.len();
            if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
                return Err(EmbeddingError::InvalidDimension {
                    expected,
                    actual: bad.len(),
                });
            }
        }
        Ok(vectors)
    }

    /// Ask for section candidates; failures degrade to "no suggestions".
    pub async fn suggest(
        &self,
        context: &CandidateContext,
        warnings: &mut Vec<String>,
    ) -> Vec<CandidateSuggestion> {
        if !self.inner.enabled() {
            return Vec::new();
        }
        match self
            .with_timeout(self.inner.suggest_candidates(context))
            .await
        {
            Ok(suggestions) => suggestions,
            Err(err) => {
                log::warn!(
                    "assist '{}' candidate suggestion failed for section {}: {err}",
                    self.inner.name(),
                    context.section
                );
                warnings.push(format!(
                    "assist_suggestion_fallback: {}: {}: {err}",
                    self.inner.name(),
                    context.section
                ));
                Vec::new()
            }
        }
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(EmbeddingError::Timeout(
                u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        }
    }
}

fn parse_assist_timeout_ms(raw: Option<&str>) -> u64 {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_ASSIST_TIMEOUT_MS)
        .clamp(MIN_ASSIST_TIMEOUT_MS, MAX_ASSIST_TIMEOUT_MS)
}

/// Reads `TRIALMAP_ASSIST_TIMEOUT_MS` (clamped to 100..=120000, default 10s).
#[must_use]
pub fn assist_timeout_from_env() -> Duration {
    let raw = std::env::var("TRIALMAP_ASSIST_TIMEOUT_MS").ok();
    Duration::from_millis(parse_assist_timeout_ms(raw.as_deref()))
}
