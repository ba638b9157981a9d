use crate::chunker::mode_first;
use crate::normalize::sha256_hex;
use trialmap_protocol::{Anchor, ContentKind, HeadingBlock, Language};

const BLOCK_ID_HEX_LEN: usize = 24;

/// `hb:` + first 24 hex chars of SHA-256 of the heading anchor id.
#[must_use]
pub fn heading_block_id(heading_anchor_id: &str) -> String {
    let digest = sha256_hex(heading_anchor_id.as_bytes());
    format!("hb:{}", &digest[..BLOCK_ID_HEX_LEN])
}

/// Single linear scan: a heading opens a block, everything up to the next heading
/// joins it. Anchors before the first heading belong to no block.
#[must_use]
pub fn build_heading_blocks(anchors: &[Anchor]) -> Vec<HeadingBlock> {
    let mut blocks: Vec<HeadingBlock> = Vec::new();
    let mut content_languages: Vec<Vec<Language>> = Vec::new();

    for anchor in anchors {
        if anchor.is_heading() {
            let order = u32::try_from(blocks.len()).unwrap_or(u32::MAX);
            blocks.push(HeadingBlock {
                heading_block_id: heading_block_id(&anchor.anchor_id),
                doc_version_id: anchor.doc_version_id.clone(),
                heading_anchor_id: anchor.anchor_id.clone(),
                heading_text: anchor.text.clone(),
                normalized_heading: anchor.normalized_text.clone(),
                heading_level: anchor.heading_level,
                structural_path: anchor.structural_path.clone(),
                content_anchor_ids: Vec::new(),
                content_text: String::new(),
                zone: anchor.zone,
                language: anchor.language,
                order,
            });
            content_languages.push(Vec::new());
            continue;
        }

        let Some(block) = blocks.last_mut() else {
            continue;
        };
        block.content_anchor_ids.push(anchor.anchor_id.clone());
        if anchor.kind != ContentKind::TableCell && !anchor.normalized_text.is_empty() {
            if !block.content_text.is_empty() {
                block.content_text.push(' ');
            }
            block.content_text.push_str(&anchor.normalized_text);
        }
        if let Some(langs) = content_languages.last_mut() {
            langs.push(anchor.language);
        }
    }

    for (block, langs) in blocks.iter_mut().zip(content_languages) {
        if !block.language.is_concrete() {
            if let Some(lang) = mode_first(langs.into_iter().filter(|l| l.is_concrete())) {
                block.language = lang;
            }
        }
    }

    log::debug!("built {} heading blocks", blocks.len());
    blocks
}

/// Exclusive end of the subtree rooted at `blocks[idx]`: the first later block whose
/// heading level is not deeper. Blocks without a level count as level 1.
#[must_use]
pub fn subtree_end(blocks: &[HeadingBlock], idx: usize) -> usize {
    let Some(root) = blocks.get(idx) else {
        return idx;
    };
    let level = root.heading_level.unwrap_or(1);
    blocks[idx + 1..]
        .iter()
        .position(|b| b.heading_level.unwrap_or(1) <= level)
        .map_or(blocks.len(), |offset| idx + 1 + offset)
}
