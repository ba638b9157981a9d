use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use trialmap_embeddings::{
    Assist, CandidateContext, CandidateSuggestion, EmbeddingError, EmbeddingSource,
    GuardedAssist, HashingEmbedder, Result,
};
use trialmap_protocol::{Language, Zone};

struct SlowAssist;

#[async_trait]
impl Assist for SlowAssist {
    fn name(&self) -> &str {
        "slow"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }

    async fn suggest_candidates(
        &self,
        _context: &CandidateContext,
    ) -> Result<Vec<CandidateSuggestion>> {
        Err(EmbeddingError::Backend("503 from upstream".to_string()))
    }
}

struct FixedAssist;

#[async_trait]
impl Assist for FixedAssist {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.0, 1.0, 0.0]).collect())
    }

    async fn suggest_candidates(
        &self,
        context: &CandidateContext,
    ) -> Result<Vec<CandidateSuggestion>> {
        Ok(context
            .headings
            .iter()
            .take(1)
            .map(|h| CandidateSuggestion {
                heading_block_id: h.heading_block_id.clone(),
                rationale: Some("first heading".to_string()),
            })
            .collect())
    }
}

fn context() -> CandidateContext {
    CandidateContext {
        doc_version_id: "doc:v1".to_string(),
        section: Zone::Ethics,
        language: Language::En,
        headings: vec![trialmap_embeddings::HeadingSummary {
            heading_block_id: "hb:1".to_string(),
            heading_text: "Informed consent".to_string(),
        }],
    }
}

#[tokio::test(start_paused = true)]
async fn timed_out_embedding_falls_back_with_warning() {
    let guard = GuardedAssist::new(
        Arc::new(SlowAssist),
        Duration::from_millis(500),
        HashingEmbedder::new(16),
    );
    let mut warnings = Vec::new();
    let batch = guard
        .embed_all(&["Informed consent".to_string()], &mut warnings)
        .await;

    assert_eq!(batch.vectors[0].len(), 16);
    assert!(matches!(batch.source, EmbeddingSource::Deterministic(_)));
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("timed out"), "{warnings:?}");
}

#[tokio::test]
async fn failing_suggestions_degrade_to_empty() {
    let guard = GuardedAssist::new(
        Arc::new(SlowAssist),
        Duration::from_secs(1),
        HashingEmbedder::new(16),
    );
    let mut warnings = Vec::new();
    let suggestions = guard.suggest(&context(), &mut warnings).await;
    assert!(suggestions.is_empty());
    assert!(warnings[0].contains("ethics"), "{warnings:?}");
}

#[tokio::test]
async fn healthy_assist_is_used_for_the_whole_batch() {
    let guard = GuardedAssist::new(
        Arc::new(FixedAssist),
        Duration::from_secs(1),
        HashingEmbedder::new(16),
    );
    let mut warnings = Vec::new();
    let batch = guard
        .embed_all(&["a".to_string(), "b".to_string()], &mut warnings)
        .await;
    assert!(warnings.is_empty());
    assert_eq!(batch.source, EmbeddingSource::Assist("fixed".to_string()));
    assert_eq!(batch.vectors, vec![vec![0.0, 1.0, 0.0]; 2]);

    let suggestions = guard.suggest(&context(), &mut warnings).await;
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].heading_block_id, "hb:1");
}
