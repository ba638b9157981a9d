use crate::config::ChunkerConfig;
use crate::error::{AnchorError, Result};
use crate::normalize::{estimate_tokens, sha256_hex};
use std::collections::HashMap;
use std::hash::Hash;
use trialmap_embeddings::Embedder;
use trialmap_protocol::{Anchor, Chunk, ContentKind, Language, Zone, PATH_SEPARATOR};

/// Groups anchors of one structural path into retrieval-sized chunks.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate().map_err(AnchorError::invalid_config)?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Build chunks from anchors in document order. Table cells are skipped because
    /// their table anchor already carries the text.
    pub fn build(&self, anchors: &[Anchor], embedder: &dyn Embedder) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut path_ordinals: HashMap<String, u32> = HashMap::new();
        let mut buffer: Vec<&Anchor> = Vec::new();
        let mut buffer_tokens = 0usize;

        for anchor in anchors.iter().filter(|a| a.kind != ContentKind::TableCell) {
            let tokens = estimate_tokens(&anchor.text);
            let same_path = buffer
                .first()
                .is_some_and(|first| first.structural_path == anchor.structural_path);
            let fits = buffer_tokens + tokens <= self.config.max_chunk_tokens;

            if !buffer.is_empty() && !(same_path && fits) {
                chunks.push(self.flush(&buffer, &mut path_ordinals, embedder));
                buffer.clear();
                buffer_tokens = 0;
            }
            buffer.push(anchor);
            buffer_tokens += tokens;
        }
        if !buffer.is_empty() {
            chunks.push(self.flush(&buffer, &mut path_ordinals, embedder));
        }

        log::debug!(
            "built {} chunks from {} anchors (max {} tokens)",
            chunks.len(),
            anchors.len(),
            self.config.max_chunk_tokens
        );
        chunks
    }

    fn flush(
        &self,
        members: &[&Anchor],
        path_ordinals: &mut HashMap<String, u32>,
        embedder: &dyn Embedder,
    ) -> Chunk {
        let first = members[0];
        let path_key = first.structural_path.join(PATH_SEPARATOR);
        let ordinal = {
            let counter = path_ordinals.entry(path_key.clone()).or_insert(0);
            let current = *counter;
            *counter += 1;
            current
        };

        let text = members
            .iter()
            .map(|a| a.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let content_hash = sha256_hex(text.as_bytes());
        let prefix_len = self.config.hash_prefix_len.min(content_hash.len());
        let chunk_id = chunk_id(
            &first.doc_version_id,
            &path_key,
            ordinal,
            &content_hash[..prefix_len],
        );

        Chunk {
            chunk_id,
            doc_version_id: first.doc_version_id.clone(),
            structural_path: first.structural_path.clone(),
            ordinal,
            anchor_ids: members.iter().map(|a| a.anchor_id.clone()).collect(),
            estimated_tokens: estimate_tokens(&text),
            embedding: embedder.embed(&text),
            zone: mode_first(members.iter().map(|a| a.zone)).unwrap_or(Zone::Unknown),
            language: mode_first(members.iter().map(|a| a.language))
                .unwrap_or(Language::Unknown),
            text,
            content_hash,
        }
    }
}

#[must_use]
pub fn chunk_id(doc_version_id: &str, path_key: &str, ordinal: u32, hash_prefix: &str) -> String {
    format!("{doc_version_id}:{path_key}:{ordinal}:{hash_prefix}")
}

/// Most frequent value; ties go to the value seen first.
pub fn mode_first<T: Copy + Eq + Hash>(items: impl IntoIterator<Item = T>) -> Option<T> {
    let mut counts: HashMap<T, (usize, usize)> = HashMap::new();
    for (idx, item) in items.into_iter().enumerate() {
        counts.entry(item).or_insert((0, idx)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(item, _)| item)
}
