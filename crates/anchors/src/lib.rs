//! # Trialmap Anchors
//!
//! Decomposes a parsed clinical-trial document into stable, individually
//! addressable content units and the two derived views built on them.
//!
//! ## Architecture
//!
//! ```text
//! ParsedDocument
//!     │
//!     ├──> AnchorExtractor
//!     │    ├─> one anchor per non-empty leaf (tables → table + cell anchors)
//!     │    ├─> content hash over whitespace-collapsed text
//!     │    └─> id = doc:kind:position:hash (footnotes add footnote/inner index)
//!     │
//!     ├──> (zone classification happens elsewhere)
//!     │
//!     ├──> Chunker → Chunk[] (≤ max tokens, one structural path each)
//!     │
//!     └──> build_heading_blocks → HeadingBlock[]
//! ```
//!
//! Identity never depends on the structural path or the ordinal inside a section,
//! so moving a paragraph under a new heading keeps its id.

mod blocks;
mod chunker;
mod config;
mod error;
mod extractor;
mod language;
mod normalize;

pub use blocks::{build_heading_blocks, heading_block_id, subtree_end};
pub use chunker::{chunk_id, mode_first, Chunker};
pub use config::{ChunkerConfig, DEFAULT_MAX_CHUNK_TOKENS};
pub use error::{AnchorError, Result};
pub use extractor::{anchor_id, footnote_anchor_id, AnchorExtractor};
pub use language::detect_language;
pub use normalize::{
    collapse_whitespace, content_hash, estimate_tokens, hash_basis, normalize_for_matching,
    normalize_heading, sha256_hex, strip_outline_number,
};
