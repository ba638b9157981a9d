//! # Trialmap Mapping
//!
//! Everything that maps document structure onto controlled vocabularies, plus
//! cross-version alignment:
//!
//! ```text
//! HeadingBlocks ──> HeadingClusterer (TF-IDF + average linkage, advisory)
//!       │                    │ cluster prior
//!       ├──────────> TopicScorer ──> TopicAssignment ──> topic_evidence
//!       │
//!       └──────────> SectionMapper ──> QC gate ──> SectionMap ──> reconcile
//!
//! prev Anchors + curr Anchors ──> AnchorAligner (exact → fuzzy → embedding → hybrid)
//! ```
//!
//! Topic and section scoring are independent of each other and only read the
//! blocks. Every score carries a typed breakdown so a reviewer can see why a
//! mapping was made.

mod alignment;
mod clustering;
mod error;
mod evidence;
mod sections;
mod text;
mod topics;

pub use alignment::{AlignmentConfig, AnchorAligner};
pub use clustering::{cluster_index, ClusteringConfig, HeadingClusterer};
pub use error::{MappingError, Result};
pub use evidence::{chunk_lookup, chunks_covering, topic_evidence};
pub use sections::{
    gate_outcome, reconcile, resolve_overlaps, user_override, Reconciled, RejectedCandidate,
    SectionInputs, SectionMapper, SectionOutcome, SectionRules, SectionSignals,
    CHECK_CONFIDENCE, CHECK_CONTENT, CHECK_FORBIDDEN, CHECK_MUST, CHECK_OVERLAP, CHECK_REGEX,
    DEFAULT_MAPPED_THRESHOLD,
};
pub use text::{contains_phrase, contains_term, content_tokens, token_dice, HeadingMatcher};
pub use topics::{
    Topic, TopicCatalog, TopicInputs, TopicOutcome, TopicScorer, DEFAULT_CONFIDENCE_FLOOR,
};
