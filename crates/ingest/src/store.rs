use crate::error::{IngestError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use trialmap_mapping::{reconcile, resolve_overlaps, RejectedCandidate};
use trialmap_protocol::{
    AlignmentReport, Anchor, Chunk, DocumentType, ExtractedFact, HeadingBlock, HeadingCluster,
    IngestionRun, Language, SectionMap, TopicAssignment, TopicEvidence,
};

/// Every derived artifact of one document version. Replaced as a unit on re-ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentArtifacts {
    pub doc_version_id: String,
    pub document_type: DocumentType,
    pub language: Language,
    pub anchors: Vec<Anchor>,
    pub chunks: Vec<Chunk>,
    pub blocks: Vec<HeadingBlock>,
    pub clusters: Vec<HeadingCluster>,
    pub assignments: Vec<TopicAssignment>,
    pub evidence: Vec<TopicEvidence>,
    pub section_maps: Vec<SectionMap>,
    pub rejected_candidates: Vec<RejectedCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<AlignmentReport>,
    pub facts: Vec<ExtractedFact>,
}

/// Section maps as stored after override protection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredSections {
    pub section_maps: Vec<SectionMap>,
    /// Automated proposals dropped because a human override exists.
    pub skipped_overridden: usize,
}

/// Persistence boundary of the pipeline.
///
/// Implementations must make `replace_version` atomic per version and must never
/// replace an overridden section map with an automated one.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Delete everything derived for the version and store `artifacts` instead.
    async fn replace_version(&self, artifacts: DocumentArtifacts) -> Result<StoredSections>;

    async fn load_version(&self, doc_version_id: &str) -> Result<Option<DocumentArtifacts>>;

    async fn section_maps(&self, doc_version_id: &str) -> Result<Vec<SectionMap>>;

    /// Store a human override, replacing whatever the section had before.
    async fn apply_override(&self, map: SectionMap) -> Result<()>;

    async fn record_run(&self, run: IngestionRun) -> Result<()>;

    /// Runs for the version, oldest first.
    async fn runs(&self, doc_version_id: &str) -> Result<Vec<IngestionRun>>;
}

#[derive(Debug, Default)]
struct MemoryState {
    versions: HashMap<String, DocumentArtifacts>,
    runs: Vec<IngestionRun>,
}

/// In-memory [`ArtifactStore`] for tests and single-process runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn version_ids(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut ids: Vec<String> = state.versions.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn replace_version(&self, mut artifacts: DocumentArtifacts) -> Result<StoredSections> {
        let mut state = self.state.write().await;
        let existing = state
            .versions
            .get(&artifacts.doc_version_id)
            .map(|a| a.section_maps.as_slice())
            .unwrap_or_default();
        let reconciled = reconcile(existing, std::mem::take(&mut artifacts.section_maps));
        artifacts.section_maps = reconciled.maps.clone();
        log::debug!(
            "replacing artifacts of {} ({} anchors, {} section maps)",
            artifacts.doc_version_id,
            artifacts.anchors.len(),
            artifacts.section_maps.len()
        );
        state
            .versions
            .insert(artifacts.doc_version_id.clone(), artifacts);
        Ok(StoredSections {
            section_maps: reconciled.maps,
            skipped_overridden: reconciled.skipped_overridden,
        })
    }

    async fn load_version(&self, doc_version_id: &str) -> Result<Option<DocumentArtifacts>> {
        Ok(self.state.read().await.versions.get(doc_version_id).cloned())
    }

    async fn section_maps(&self, doc_version_id: &str) -> Result<Vec<SectionMap>> {
        Ok(self
            .state
            .read()
            .await
            .versions
            .get(doc_version_id)
            .map(|a| a.section_maps.clone())
            .unwrap_or_default())
    }

    async fn apply_override(&self, map: SectionMap) -> Result<()> {
        if !map.is_overridden() {
            return Err(IngestError::Store(format!(
                "override for {} must have status overridden",
                map.section
            )));
        }
        let mut state = self.state.write().await;
        let artifacts = state
            .versions
            .get_mut(&map.doc_version_id)
            .ok_or_else(|| IngestError::UnknownVersion(map.doc_version_id.clone()))?;
        artifacts.section_maps.retain(|m| m.section != map.section);
        artifacts.section_maps.push(map);
        artifacts.section_maps.sort_by_key(|m| m.section);
        resolve_overlaps(&mut artifacts.section_maps);
        Ok(())
    }

    async fn record_run(&self, run: IngestionRun) -> Result<()> {
        self.state.write().await.runs.push(run);
        Ok(())
    }

    async fn runs(&self, doc_version_id: &str) -> Result<Vec<IngestionRun>> {
        Ok(self
            .state
            .read()
            .await
            .runs
            .iter()
            .filter(|r| r.doc_version_id == doc_version_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use trialmap_mapping::user_override;
    use trialmap_protocol::{MappedBy, QcReport, SectionStatus, Zone};

    fn empty_artifacts(doc_version_id: &str) -> DocumentArtifacts {
        DocumentArtifacts {
            doc_version_id: doc_version_id.to_string(),
            document_type: DocumentType::Protocol,
            language: Language::En,
            anchors: vec![],
            chunks: vec![],
            blocks: vec![],
            clusters: vec![],
            assignments: vec![],
            evidence: vec![],
            section_maps: vec![],
            rejected_candidates: vec![],
            alignment: None,
            facts: vec![],
        }
    }

    fn system_map(doc: &str, section: Zone) -> SectionMap {
        SectionMap {
            doc_version_id: doc.to_string(),
            section,
            anchor_ids: vec!["auto".into()],
            chunk_ids: vec![],
            confidence: 0.8,
            status: SectionStatus::Mapped,
            mapped_by: MappedBy::System,
            heading_block_id: None,
            qc: QcReport::default(),
            notes: vec![],
        }
    }

    #[tokio::test]
    async fn overrides_survive_replacement() {
        let store = MemoryStore::new();
        let mut first = empty_artifacts("P:v1");
        first.section_maps = vec![system_map("P:v1", Zone::Safety)];
        store.replace_version(first).await.unwrap();

        let manual = user_override("P:v1", Zone::Safety, vec!["manual".into()], vec![], "u1")
            .unwrap();
        store.apply_override(manual.clone()).await.unwrap();

        let mut second = empty_artifacts("P:v1");
        second.section_maps = vec![
            system_map("P:v1", Zone::Safety),
            system_map("P:v1", Zone::Design),
        ];
        let stored = store.replace_version(second).await.unwrap();
        assert_eq!(stored.skipped_overridden, 1);

        let maps = store.section_maps("P:v1").await.unwrap();
        assert_eq!(maps.len(), 2);
        let safety = maps.iter().find(|m| m.section == Zone::Safety).unwrap();
        assert_eq!(safety, &manual);
    }

    #[tokio::test]
    async fn overrides_need_a_known_version() {
        let store = MemoryStore::new();
        let manual = user_override("P:v9", Zone::Ethics, vec![], vec![], "u1").unwrap();
        assert!(matches!(
            store.apply_override(manual).await,
            Err(IngestError::UnknownVersion(id)) if id == "P:v9"
        ));
        assert!(store.load_version("P:v9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn automated_maps_cannot_pose_as_overrides() {
        let store = MemoryStore::new();
        store.replace_version(empty_artifacts("P:v1")).await.unwrap();
        let err = store
            .apply_override(system_map("P:v1", Zone::Admin))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Store(_)));
    }
}
