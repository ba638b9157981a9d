use unicode_segmentation::UnicodeSegmentation;

/// Default embedding width for the hashing embedder.
pub const DEFAULT_DIMENSION: usize = 256;

const WORD_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.5;
const TRIGRAM_WEIGHT: f32 = 0.25;

/// Synchronous text → vector capability used by every deterministic stage.
pub trait Embedder: Send + Sync {
    fn id(&self) -> &str;

    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Vec<f32>;

    fn embed_batch(&self, texts: &[&str]) -> Vec<Vec<f32>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Signed feature-hashing embedder over words, word bigrams and character trigrams.
///
/// No model, no I/O: the same text always produces the same vector, which keeps
/// chunk embeddings reproducible for regression runs.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    id: String,
}

impl HashingEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(8);
        Self {
            dimension,
            id: format!("hashing-{dimension}"),
        }
    }

    fn add_feature(&self, vec: &mut [f32], namespace: u8, feature: &str, weight: f32) {
        let mut hash = fnv1a_64(&[namespace]);
        hash = fnv1a_64_continue(hash, feature.as_bytes());
        let slot = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vec[slot] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl Embedder for HashingEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0; self.dimension];
        let words: Vec<String> = text.unicode_words().map(str::to_lowercase).collect();

        for word in &words {
            self.add_feature(&mut vec, b'w', word, WORD_WEIGHT);

            let chars: Vec<char> = word.chars().collect();
            if chars.len() > 3 {
                for window in chars.windows(3) {
                    let gram: String = window.iter().collect();
                    self.add_feature(&mut vec, b't', &gram, TRIGRAM_WEIGHT);
                }
            }
        }
        for pair in words.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.add_feature(&mut vec, b'b', &bigram, BIGRAM_WEIGHT);
        }

        normalize(&mut vec);
        vec
    }
}

pub(crate) fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

/// Cosine similarity; mismatched lengths or zero vectors score 0.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Component-wise mean of equally sized vectors. Empty input yields an empty vector.
#[must_use]
pub fn mean_vector(vectors: &[&[f32]]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };
    let dims = first.len();
    let mut out = vec![0.0; dims];
    let mut count = 0usize;
    for vec in vectors.iter().filter(|v| v.len() == dims) {
        for (slot, value) in out.iter_mut().zip(vec.iter()) {
            *slot += value;
        }
        count += 1;
    }
    if count > 0 {
        #[allow(clippy::cast_precision_loss)]
        let denom = count as f32;
        for slot in &mut out {
            *slot /= denom;
        }
    }
    out
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    fnv1a_64_continue(0xcbf2_9ce4_8422_2325, bytes)
}

fn fnv1a_64_continue(mut hash: u64, bytes: &[u8]) -> u64 {
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
