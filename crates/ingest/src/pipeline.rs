use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::facts::{missing_required, FactExtractor};
use crate::lock::VersionLocks;
use crate::quality::{QualityGate, QualityInputs};
use crate::store::{ArtifactStore, DocumentArtifacts};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use trialmap_anchors::{build_heading_blocks, AnchorExtractor, Chunker};
use trialmap_embeddings::{
    Assist, CandidateContext, GuardedAssist, HashingEmbedder, HeadingSummary,
};
use trialmap_mapping::{
    topic_evidence, AnchorAligner, HeadingClusterer, SectionInputs, SectionMapper,
    TopicInputs, TopicScorer,
};
use trialmap_protocol::{
    HeadingBlock, IngestionRun, ParsedDocument, QualityReport, QualityVerdict, RunMetrics,
    RunStatus, SectionStatus,
};
use trialmap_zones::ZoneClassifier;

/// Prefix length of the config hash embedded in run ids.
const RUN_ID_HASH_PREFIX: usize = 12;

static RUN_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub document: ParsedDocument,
    /// Previously ingested version to align anchors against.
    pub prior_version: Option<String>,
}

impl IngestRequest {
    #[must_use]
    pub fn new(document: ParsedDocument) -> Self {
        Self {
            document,
            prior_version: None,
        }
    }

    #[must_use]
    pub fn with_prior_version(mut self, prior: impl Into<String>) -> Self {
        self.prior_version = Some(prior.into());
        self
    }
}

/// Runs the whole pipeline for one document version at a time per version id.
pub struct Ingestor {
    config: Arc<IngestConfig>,
    config_hash: String,
    store: Arc<dyn ArtifactStore>,
    assist: GuardedAssist,
    locks: VersionLocks,
    chunker: Chunker,
    clusterer: HeadingClusterer,
    topics: TopicScorer,
    sections: SectionMapper,
    aligner: AnchorAligner,
    facts: FactExtractor,
    quality: QualityGate,
}

impl Ingestor {
    /// Validates every stage configuration up front; a bad setting never reaches a run.
    pub fn new(config: IngestConfig, store: Arc<dyn ArtifactStore>) -> Result<Self> {
        config
            .settings
            .validate()
            .map_err(|err| IngestError::Config(format!("{err:#}")))?;
        let settings = &config.settings;
        let fallback = HashingEmbedder::new(settings.embedding_dimension);
        Ok(Self {
            config_hash: config.config_hash(),
            chunker: Chunker::new(settings.chunker.clone())?,
            clusterer: HeadingClusterer::new(settings.clustering.clone())?,
            topics: TopicScorer::new(config.topics.clone()),
            sections: SectionMapper::new(config.sections.clone()),
            aligner: AnchorAligner::new(settings.alignment.clone())?,
            facts: FactExtractor::new(config.facts.clone()),
            quality: QualityGate::new(settings.quality.clone()),
            assist: GuardedAssist::deterministic(fallback),
            locks: VersionLocks::new(),
            store,
            config: Arc::new(config),
        })
    }

    /// Route embeddings and section suggestions through `assist`, bounded by `timeout`.
    #[must_use]
    pub fn with_assist(mut self, assist: Arc<dyn Assist>, timeout: Duration) -> Self {
        let fallback = HashingEmbedder::new(self.config.settings.embedding_dimension);
        self.assist = GuardedAssist::new(assist, timeout, fallback);
        self
    }

    /// Share one lock table between several ingestors writing to the same store.
    #[must_use]
    pub fn with_locks(mut self, locks: VersionLocks) -> Self {
        self.locks = locks;
        self
    }

    #[must_use]
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    #[must_use]
    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Ingest one document version. Never returns an error: failures are recorded on
    /// the run, which is also persisted through the store.
    pub async fn ingest(&self, request: IngestRequest) -> IngestionRun {
        let doc_version_id = request.document.doc_version_id.clone();
        let guard = self.locks.acquire(&doc_version_id).await;

        let started_unix_ms = unix_ms();
        let clock = Instant::now();
        let mut warnings = Vec::new();
        let mut metrics = RunMetrics {
            lock_wait_ms: guard.waited_ms(),
            ..RunMetrics::default()
        };

        let outcome = self
            .run_stages(&request, &mut warnings, &mut metrics)
            .await;
        let (status, quality, errors) = match outcome {
            Ok(quality) => (RunStatus::Completed, quality, Vec::new()),
            Err(err) => {
                log::error!("ingest of {doc_version_id} failed: {err}");
                (
                    RunStatus::Failed,
                    QualityReport {
                        verdict: QualityVerdict::NeedsReview,
                        ..QualityReport::default()
                    },
                    vec![err.to_string()],
                )
            }
        };

        let mut run = IngestionRun {
            run_id: self.run_id(&doc_version_id, started_unix_ms),
            doc_version_id,
            status,
            started_unix_ms,
            duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
            metrics,
            quality,
            warnings,
            errors,
            config_hash: self.config_hash.clone(),
        };
        if let Err(err) = self.store.record_run(run.clone()).await {
            log::warn!("failed to record run {}: {err}", run.run_id);
            run.warnings.push(format!("run_not_recorded: {err}"));
        }
        log::info!(
            "ingested {} status={:?} verdict={:?} anchors={} sections={} in {}ms",
            run.doc_version_id,
            run.status,
            run.quality.verdict,
            run.metrics.anchors,
            run.metrics.mapped_sections,
            run.duration_ms
        );
        run
    }

    /// Run record for a document that never reached the pipeline.
    pub(crate) fn failed_run(&self, doc_version_id: &str, error: String) -> IngestionRun {
        let started_unix_ms = unix_ms();
        IngestionRun {
            run_id: self.run_id(doc_version_id, started_unix_ms),
            doc_version_id: doc_version_id.to_string(),
            status: RunStatus::Failed,
            started_unix_ms,
            duration_ms: 0,
            metrics: RunMetrics::default(),
            quality: QualityReport {
                verdict: QualityVerdict::NeedsReview,
                ..QualityReport::default()
            },
            warnings: Vec::new(),
            errors: vec![error],
            config_hash: self.config_hash.clone(),
        }
    }

    fn run_id(&self, doc_version_id: &str, started_unix_ms: u64) -> String {
        let seq = RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let prefix = self
            .config_hash
            .get(..RUN_ID_HASH_PREFIX)
            .unwrap_or(&self.config_hash);
        format!("{doc_version_id}:{prefix}:{started_unix_ms}:{seq}")
    }

    async fn run_stages(
        &self,
        request: &IngestRequest,
        warnings: &mut Vec<String>,
        metrics: &mut RunMetrics,
    ) -> Result<QualityReport> {
        let doc = &request.document;
        let embedder = self.assist.fallback();

        let mut anchors = AnchorExtractor::new().extract(doc)?;
        ZoneClassifier::for_document(&self.config.zones, doc.document_type)
            .classify_all(&mut anchors);
        metrics.anchors = anchors.len();

        let chunks = self.chunker.build(&anchors, embedder);
        let blocks = build_heading_blocks(&anchors);
        metrics.chunks = chunks.len();
        metrics.heading_blocks = blocks.len();

        // Blocks and topic profiles go through one batch so both sides share a source.
        let catalog = self.topics.catalog();
        let mut texts: Vec<String> = blocks.iter().map(HeadingBlock::searchable_text).collect();
        texts.extend(catalog.topics().iter().map(|t| t.embedding_text()));
        let mut vectors = self.assist.embed_all(&texts, warnings).await.vectors;
        let topic_vectors = vectors.split_off(blocks.len());
        let block_vectors = vectors;
        let topic_embeddings: HashMap<String, Vec<f32>> = catalog
            .topics()
            .iter()
            .map(|t| t.key.clone())
            .zip(topic_vectors)
            .collect();

        let clusters = match self.clusterer.cluster(&blocks, Some(block_vectors.as_slice())) {
            Ok(clusters) => clusters,
            Err(err) => {
                log::warn!("heading clustering skipped for {}: {err}", doc.doc_version_id);
                warnings.push(format!("clustering_skipped: {err}"));
                Vec::new()
            }
        };
        metrics.clusters = clusters.len();

        let topics = self.topics.assign(&TopicInputs {
            document_type: doc.document_type,
            blocks: &blocks,
            block_embeddings: &block_vectors,
            topic_embeddings: &topic_embeddings,
            clusters: &clusters,
        });
        warnings.extend(topics.warnings.iter().cloned());
        metrics.assigned_blocks = topics.assignments.len();
        metrics.unassigned_blocks = topics.unassigned.len();
        let evidence = topic_evidence(&topics.assignments, &blocks, &chunks);

        let inputs = SectionInputs {
            doc_version_id: &doc.doc_version_id,
            blocks: &blocks,
            chunks: &chunks,
        };
        let mut sections = self.sections.map(&inputs);
        for section in sections.unmapped.clone() {
            let context = CandidateContext {
                doc_version_id: doc.doc_version_id.clone(),
                section,
                language: doc.language,
                headings: blocks
                    .iter()
                    .map(|b| HeadingSummary {
                        heading_block_id: b.heading_block_id.clone(),
                        heading_text: b.heading_text.clone(),
                    })
                    .collect(),
            };
            let suggestions = self.assist.suggest(&context, warnings).await;
            if !suggestions.is_empty() {
                sections.absorb(self.sections.map_suggested(section, &suggestions, &inputs));
            }
        }
        metrics.rejected_candidates = sections.rejected.len();

        let alignment = match &request.prior_version {
            Some(prior) => match self.store.load_version(prior).await? {
                Some(previous) => {
                    let report = self.aligner.align(&previous.anchors, &anchors, embedder)?;
                    metrics.anchor_matches = report.matches.len();
                    metrics.anchors_added = report.added.len();
                    metrics.anchors_deleted = report.deleted.len();
                    Some(report)
                }
                None => {
                    log::warn!("prior version {prior} not found, alignment skipped");
                    warnings.push(format!("prior_version_missing: {prior}"));
                    None
                }
            },
            None => None,
        };

        let facts = self.facts.extract(&anchors);
        metrics.facts = facts.len();
        let missing_required_facts =
            missing_required(&facts, self.config.facts.required_for(doc.document_type));

        let stored = self
            .store
            .replace_version(DocumentArtifacts {
                doc_version_id: doc.doc_version_id.clone(),
                document_type: doc.document_type,
                language: doc.language,
                anchors: anchors.clone(),
                chunks,
                blocks,
                clusters,
                assignments: topics.assignments,
                evidence,
                section_maps: sections.maps,
                rejected_candidates: sections.rejected,
                alignment,
                facts: facts.clone(),
            })
            .await?;
        metrics.skipped_overridden_sections = stored.skipped_overridden;
        metrics.mapped_sections = stored
            .section_maps
            .iter()
            .filter(|m| m.is_citable())
            .count();
        metrics.needs_review_sections = stored
            .section_maps
            .iter()
            .filter(|m| m.status == SectionStatus::NeedsReview)
            .count();

        Ok(self.quality.evaluate(&QualityInputs {
            document_type: doc.document_type,
            anchors: &anchors,
            section_maps: &stored.section_maps,
            facts: &facts,
            missing_required_facts,
        }))
    }
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
