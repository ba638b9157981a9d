use std::collections::{BTreeMap, BTreeSet, HashMap};
use trialmap_protocol::{Chunk, HeadingBlock, Language, TopicAssignment, TopicEvidence, Zone};

/// Chunk ids containing any of the given anchors, in chunk order.
#[must_use]
pub fn chunks_covering<'a>(
    anchor_ids: impl IntoIterator<Item = &'a str>,
    chunk_of_anchor: &HashMap<&str, usize>,
    chunks: &[Chunk],
) -> Vec<String> {
    let positions: BTreeSet<usize> = anchor_ids
        .into_iter()
        .filter_map(|id| chunk_of_anchor.get(id).copied())
        .collect();
    positions
        .into_iter()
        .map(|pos| chunks[pos].chunk_id.clone())
        .collect()
}

/// Anchor id → position of the chunk that holds it.
#[must_use]
pub fn chunk_lookup(chunks: &[Chunk]) -> HashMap<&str, usize> {
    chunks
        .iter()
        .enumerate()
        .flat_map(|(pos, chunk)| chunk.anchor_ids.iter().map(move |id| (id.as_str(), pos)))
        .collect()
}

/// Roll assignments up per `(topic, zone, language)` using the block's zone and
/// language. Ids inside each record are sorted; records are ordered by key.
#[must_use]
pub fn topic_evidence(
    assignments: &[TopicAssignment],
    blocks: &[HeadingBlock],
    chunks: &[Chunk],
) -> Vec<TopicEvidence> {
    let block_by_id: HashMap<&str, &HeadingBlock> = blocks
        .iter()
        .map(|b| (b.heading_block_id.as_str(), b))
        .collect();
    let chunk_of_anchor = chunk_lookup(chunks);

    #[derive(Default)]
    struct Rollup {
        anchors: BTreeSet<String>,
        chunks: BTreeSet<String>,
        blocks: BTreeSet<String>,
    }
    let mut rollups: BTreeMap<(String, Zone, Language), Rollup> = BTreeMap::new();
    let mut doc_version_id = None;

    for assignment in assignments {
        let Some(block) = block_by_id.get(assignment.heading_block_id.as_str()) else {
            log::warn!(
                "assignment references unknown heading block {}",
                assignment.heading_block_id
            );
            continue;
        };
        doc_version_id.get_or_insert_with(|| assignment.doc_version_id.clone());

        let rollup = rollups
            .entry((assignment.topic_key.clone(), block.zone, block.language))
            .or_default();
        rollup.blocks.insert(block.heading_block_id.clone());
        rollup
            .anchors
            .extend(block.anchor_ids().map(str::to_string));
        rollup.chunks.extend(chunks_covering(
            block.anchor_ids(),
            &chunk_of_anchor,
            chunks,
        ));
    }

    let doc_version_id = doc_version_id.unwrap_or_default();
    rollups
        .into_iter()
        .map(|((topic_key, zone, language), rollup)| TopicEvidence {
            doc_version_id: doc_version_id.clone(),
            topic_key,
            zone,
            language,
            anchor_ids: rollup.anchors.into_iter().collect(),
            chunk_ids: rollup.chunks.into_iter().collect(),
            heading_block_ids: rollup.blocks.into_iter().collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use trialmap_protocol::{ScoreBreakdown, TopicExplanation};

    fn block(id: &str, anchors: &[&str], zone: Zone) -> HeadingBlock {
        HeadingBlock {
            heading_block_id: id.to_string(),
            doc_version_id: "D:v1".to_string(),
            heading_anchor_id: anchors[0].to_string(),
            heading_text: id.to_string(),
            normalized_heading: id.to_string(),
            heading_level: Some(1),
            structural_path: vec![],
            content_anchor_ids: anchors[1..].iter().map(|s| (*s).to_string()).collect(),
            content_text: String::new(),
            zone,
            language: Language::En,
            order: 0,
        }
    }

    fn chunk(id: &str, anchors: &[&str]) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            doc_version_id: "D:v1".to_string(),
            structural_path: vec![],
            ordinal: 0,
            anchor_ids: anchors.iter().map(|s| (*s).to_string()).collect(),
            text: String::new(),
            content_hash: String::new(),
            estimated_tokens: 1,
            embedding: vec![],
            zone: Zone::Unknown,
            language: Language::En,
        }
    }

    fn assignment(block: &str, topic: &str) -> TopicAssignment {
        TopicAssignment {
            doc_version_id: "D:v1".to_string(),
            heading_block_id: block.to_string(),
            topic_key: topic.to_string(),
            confidence: 0.5,
            explanation: TopicExplanation {
                components: ScoreBreakdown::default(),
                top_candidates: vec![],
                cluster_id: None,
            },
        }
    }

    #[test]
    fn rolls_up_per_topic_zone_and_language() {
        let blocks = vec![
            block("hb:b", &["a3", "a4"], Zone::Population),
            block("hb:a", &["a1", "a2"], Zone::Population),
            block("hb:c", &["a5"], Zone::Safety),
        ];
        let chunks = vec![chunk("c1", &["a1", "a2"]), chunk("c2", &["a3", "a4", "a5"])];
        let assignments = vec![
            assignment("hb:b", "inclusion"),
            assignment("hb:a", "inclusion"),
            assignment("hb:c", "inclusion"),
        ];

        let evidence = topic_evidence(&assignments, &blocks, &chunks);
        assert_eq!(evidence.len(), 2);
        assert_eq!(evidence[0].zone, Zone::Population);
        assert_eq!(evidence[0].anchor_ids, vec!["a1", "a2", "a3", "a4"]);
        assert_eq!(evidence[0].chunk_ids, vec!["c1", "c2"]);
        assert_eq!(evidence[0].heading_block_ids, vec!["hb:a", "hb:b"]);
        assert_eq!(evidence[1].zone, Zone::Safety);
        assert_eq!(evidence[1].chunk_ids, vec!["c2"]);
    }

    #[test]
    fn unknown_blocks_are_skipped() {
        let evidence = topic_evidence(&[assignment("hb:zz", "x")], &[], &[]);
        assert!(evidence.is_empty());
    }
}
