//! # Trialmap Embeddings
//!
//! Deterministic vectors for chunks, heading blocks and topic profiles, plus the
//! narrow capability interface behind which any model-backed helper lives.
//!
//! ```text
//! text ──> HashingEmbedder (feature hashing, no I/O) ──> Vec<f32>
//!   │
//!   └──> GuardedAssist ──> Assist::embed (timeout) ──┐
//!                          on error / timeout ───────┴──> HashingEmbedder + warning
//! ```

mod assist;
mod error;
mod hashing;

pub use assist::{
    assist_timeout_from_env, Assist, CandidateContext, CandidateSuggestion, EmbeddingBatch,
    EmbeddingSource, GuardedAssist, HeadingSummary, NoopAssist,
};
pub use error::{EmbeddingError, Result};
pub use hashing::{cosine_similarity, mean_vector, Embedder, HashingEmbedder, DEFAULT_DIMENSION};
