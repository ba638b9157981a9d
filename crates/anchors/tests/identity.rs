use pretty_assertions::assert_eq;
use proptest::prelude::*;
use trialmap_anchors::{build_heading_blocks, AnchorExtractor, Chunker, ChunkerConfig};
use trialmap_embeddings::HashingEmbedder;
use trialmap_protocol::{ContentNode, DocumentType, Language, ParsedDocument};

fn document(doc_id: &str, paragraphs: &[String], headings: &[String]) -> ParsedDocument {
    let mut doc = ParsedDocument::new(doc_id, DocumentType::Protocol, Language::En);
    for (idx, heading) in headings.iter().enumerate() {
        let section = format!("s{idx}");
        doc = doc.node(ContentNode::heading(1, heading.clone(), &[section.as_str()]));
        for paragraph in paragraphs {
            doc = doc.node(ContentNode::paragraph(paragraph.clone(), &[section.as_str()]));
        }
    }
    doc
}

fn all_ids(doc: &ParsedDocument) -> (Vec<String>, Vec<String>, Vec<String>) {
    let anchors = AnchorExtractor::new().extract(doc).unwrap();
    let chunks = Chunker::new(ChunkerConfig::default())
        .unwrap()
        .build(&anchors, &HashingEmbedder::new(32));
    let blocks = build_heading_blocks(&anchors);
    (
        anchors.into_iter().map(|a| a.anchor_id).collect(),
        chunks.into_iter().map(|c| c.chunk_id).collect(),
        blocks.into_iter().map(|b| b.heading_block_id).collect(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn ingesting_the_same_document_twice_yields_the_same_ids(
        paragraphs in prop::collection::vec("[a-zA-Z ]{1,40}", 0..5),
        headings in prop::collection::vec("[A-Z][a-z]{2,12}", 1..4),
    ) {
        let doc = document("P-9:v1", &paragraphs, &headings);
        prop_assert_eq!(all_ids(&doc), all_ids(&doc));
    }

    #[test]
    fn anchor_ids_are_unique_within_a_version(
        paragraphs in prop::collection::vec("[a-z]{1,8}", 1..6),
        headings in prop::collection::vec("[A-Z][a-z]{2,6}", 1..4),
    ) {
        let doc = document("P-9:v1", &paragraphs, &headings);
        let (anchor_ids, _, _) = all_ids(&doc);
        let mut sorted = anchor_ids.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(sorted.len(), anchor_ids.len());
    }
}

#[test]
fn renumbered_heading_keeps_its_hash_but_not_its_text() {
    let v1 = ParsedDocument::new("P-1:v1", DocumentType::Protocol, Language::En)
        .node(ContentNode::heading(1, "4. Objectives", &["4 Objectives"]));
    let v2 = ParsedDocument::new("P-1:v1", DocumentType::Protocol, Language::En)
        .node(ContentNode::heading(1, "5. Objectives", &["5 Objectives"]));
    let a = AnchorExtractor::new().extract(&v1).unwrap();
    let b = AnchorExtractor::new().extract(&v2).unwrap();
    assert_eq!(a[0].anchor_id, b[0].anchor_id);
    assert_eq!(a[0].normalized_text, "objectives");
    assert_eq!(b[0].text, "5. Objectives");
}
