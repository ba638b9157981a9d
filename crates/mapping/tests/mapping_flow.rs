use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use trialmap_anchors::{build_heading_blocks, normalize_heading, AnchorExtractor, Chunker, ChunkerConfig};
use trialmap_embeddings::{Embedder, HashingEmbedder};
use trialmap_mapping::{
    topic_evidence, ClusteringConfig, HeadingClusterer, SectionInputs, SectionMapper,
    SectionRules, TopicCatalog, TopicInputs, TopicScorer,
};
use trialmap_protocol::{
    ContentNode, DocumentType, HeadingBlock, Language, ParsedDocument, SectionStatus, Zone,
};
use trialmap_zones::{ZoneClassifier, ZoneRegistry};

fn protocol() -> ParsedDocument {
    let pop = "5 Study Population";
    let inc = "5.1 Inclusion Criteria";
    let ae = "8 Adverse Events";
    ParsedDocument::new("P-1:v1", DocumentType::Protocol, Language::En)
        .node(ContentNode::heading(1, pop, &[pop]))
        .node(ContentNode::paragraph(
            "Adult patients with moderate asthma will be enrolled at twelve sites.",
            &[pop],
        ))
        .node(ContentNode::heading(2, inc, &[pop, inc]))
        .node(ContentNode::list_item(
            "Age 18 years or older at the time of informed consent.",
            &[pop, inc],
        ))
        .node(ContentNode::list_item(
            "Confirmed diagnosis of asthma for at least 12 months.",
            &[pop, inc],
        ))
        .node(ContentNode::heading(1, ae, &[ae]))
        .node(ContentNode::paragraph(
            "Every adverse event is recorded with severity and causality. Serious adverse \
             events are reported to the sponsor within 24 hours of awareness.",
            &[ae],
        ))
}

#[test]
fn a_protocol_flows_through_every_mapping_stage() {
    let doc = protocol();
    let embedder = HashingEmbedder::new(64);

    let mut anchors = AnchorExtractor::new().extract(&doc).unwrap();
    let registry = ZoneRegistry::builtin().unwrap();
    ZoneClassifier::for_document(&registry, doc.document_type).classify_all(&mut anchors);
    let chunks = Chunker::new(ChunkerConfig::default())
        .unwrap()
        .build(&anchors, &embedder);
    let blocks = build_heading_blocks(&anchors);
    assert_eq!(blocks.len(), 3);

    let texts: Vec<String> = blocks.iter().map(HeadingBlock::searchable_text).collect();
    let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let block_embeddings = embedder.embed_batch(&text_refs);

    let clusters = HeadingClusterer::new(ClusteringConfig::default())
        .unwrap()
        .cluster(&blocks, Some(block_embeddings.as_slice()))
        .unwrap();

    let catalog = Arc::new(TopicCatalog::builtin().unwrap());
    let topic_embeddings: HashMap<String, Vec<f32>> = catalog
        .topics()
        .iter()
        .map(|t| (t.key.clone(), embedder.embed(&t.embedding_text())))
        .collect();
    let topics = TopicScorer::new(catalog).assign(&TopicInputs {
        document_type: doc.document_type,
        blocks: &blocks,
        block_embeddings: &block_embeddings,
        topic_embeddings: &topic_embeddings,
        clusters: &clusters,
    });
    assert!(topics.warnings.is_empty(), "{:?}", topics.warnings);
    let inclusion = topics
        .assignments
        .iter()
        .find(|a| a.heading_block_id == blocks[1].heading_block_id)
        .unwrap();
    assert_eq!(inclusion.topic_key, "inclusion_criteria");
    assert_eq!(inclusion.explanation.components.heading_match, 1.0);

    let evidence = topic_evidence(&topics.assignments, &blocks, &chunks);
    let inclusion_evidence = evidence
        .iter()
        .find(|e| e.topic_key == "inclusion_criteria")
        .unwrap();
    assert_eq!(inclusion_evidence.zone, Zone::Population);
    assert!(!inclusion_evidence.chunk_ids.is_empty());

    let sections = SectionMapper::new(Arc::new(SectionRules::builtin().unwrap())).map(
        &SectionInputs {
            doc_version_id: &doc.doc_version_id,
            blocks: &blocks,
            chunks: &chunks,
        },
    );
    let safety = sections
        .maps
        .iter()
        .find(|m| m.section == Zone::Safety)
        .unwrap();
    assert_eq!(safety.status, SectionStatus::Mapped);
    assert_eq!(
        safety.heading_block_id.as_deref(),
        Some(blocks[2].heading_block_id.as_str())
    );
    let population = sections
        .maps
        .iter()
        .find(|m| m.section == Zone::Population)
        .unwrap();
    // The population section captures its inclusion-criteria subsection.
    assert!(population
        .anchor_ids
        .contains(&blocks[1].heading_anchor_id));
    assert!(sections.unmapped.contains(&Zone::Appendix));
}

fn heading_block(idx: usize, heading: &str) -> HeadingBlock {
    HeadingBlock {
        heading_block_id: format!("hb:{idx}"),
        doc_version_id: "D:v1".to_string(),
        heading_anchor_id: format!("a{idx}"),
        heading_text: heading.to_string(),
        normalized_heading: normalize_heading(heading),
        heading_level: Some(1),
        structural_path: vec![],
        content_anchor_ids: vec![],
        content_text: String::new(),
        zone: Zone::Unknown,
        language: Language::En,
        order: u32::try_from(idx).unwrap(),
    }
}

const VOCABULARY: &[&str] = &[
    "inclusion criteria",
    "exclusion criteria",
    "adverse events",
    "serious adverse events",
    "sample size",
    "statistical methods",
    "study design",
    "informed consent",
];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn clustering_is_deterministic_and_disjoint(
        picks in prop::collection::vec(0..VOCABULARY.len(), 1..12),
    ) {
        let blocks: Vec<HeadingBlock> = picks
            .iter()
            .enumerate()
            .map(|(idx, pick)| heading_block(idx, VOCABULARY[*pick]))
            .collect();
        let clusterer = HeadingClusterer::new(ClusteringConfig::default()).unwrap();

        let first = clusterer.cluster(&blocks, None).unwrap();
        let second = clusterer.cluster(&blocks, None).unwrap();
        prop_assert_eq!(&first, &second);

        let mut seen = HashSet::new();
        for cluster in &first {
            prop_assert!(cluster.member_block_ids.len() >= 2);
            for member in &cluster.member_block_ids {
                prop_assert!(seen.insert(member.clone()));
            }
        }
    }
}
