use crate::{Language, Zone};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Separator used when a structural path is rendered as a single key.
pub const PATH_SEPARATOR: &str = "/";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Heading,
    Paragraph,
    ListItem,
    Footnote,
    TableCell,
    Table,
}

impl ContentKind {
    /// Short code embedded in anchor ids.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Heading => "hdr",
            Self::Paragraph => "p",
            Self::ListItem => "li",
            Self::Footnote => "fn",
            Self::TableCell => "cell",
            Self::Table => "tbl",
        }
    }

    #[must_use]
    pub const fn is_heading(self) -> bool {
        matches!(self, Self::Heading)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FootnoteRef {
    pub footnote_index: u32,
    pub inner_index: u32,
}

/// Position of an anchor inside a table. Table anchors carry the shape,
/// cell anchors carry row/column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TableRef {
    pub table_index: u32,
    pub row: u32,
    pub col: u32,
    pub rows: u32,
    pub cols: u32,
}

/// Atomic addressable content unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Anchor {
    pub anchor_id: String,
    pub doc_version_id: String,
    pub kind: ContentKind,
    /// Ordinal among anchors of the same kind, in document order.
    pub position_index: u32,
    /// Ordinal within the structural section. Metadata only, not identity.
    pub ordinal_in_section: u32,
    pub text: String,
    pub normalized_text: String,
    pub content_hash: String,
    pub structural_path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading_level: Option<u8>,
    #[serde(default)]
    pub zone: Zone,
    #[serde(default)]
    pub zone_confidence: f32,
    #[serde(default)]
    pub language: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footnote: Option<FootnoteRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableRef>,
}

impl Anchor {
    #[must_use]
    pub fn path_key(&self) -> String {
        self.structural_path.join(PATH_SEPARATOR)
    }

    #[must_use]
    pub const fn is_heading(&self) -> bool {
        self.kind.is_heading()
    }
}

/// Retrieval-sized aggregation of anchors within one structural section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Chunk {
    pub chunk_id: String,
    pub doc_version_id: String,
    pub structural_path: Vec<String>,
    pub ordinal: u32,
    pub anchor_ids: Vec<String>,
    pub text: String,
    pub content_hash: String,
    pub estimated_tokens: usize,
    pub embedding: Vec<f32>,
    pub zone: Zone,
    pub language: Language,
}

/// Heading anchor plus the content anchors that follow it up to the next heading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HeadingBlock {
    pub heading_block_id: String,
    pub doc_version_id: String,
    pub heading_anchor_id: String,
    pub heading_text: String,
    pub normalized_heading: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading_level: Option<u8>,
    pub structural_path: Vec<String>,
    pub content_anchor_ids: Vec<String>,
    /// Normalized content text (table cells excluded).
    pub content_text: String,
    pub zone: Zone,
    pub language: Language,
    /// Index of the block in document order.
    pub order: u32,
}

impl HeadingBlock {
    /// Heading anchor followed by content anchors.
    pub fn anchor_ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.heading_anchor_id.as_str())
            .chain(self.content_anchor_ids.iter().map(String::as_str))
    }

    #[must_use]
    pub fn searchable_text(&self) -> String {
        if self.content_text.is_empty() {
            self.normalized_heading.clone()
        } else {
            format!("{} {}", self.normalized_heading, self.content_text)
        }
    }
}

/// Advisory grouping of similar headings across a corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HeadingCluster {
    pub cluster_id: String,
    pub member_block_ids: Vec<String>,
    pub representative_titles: Vec<String>,
    pub stats: ClusterStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClusterStats {
    pub size: usize,
    pub mean_intra_distance: f32,
    pub top_terms: Vec<String>,
    /// True when the cluster absorbed another one in the embedding post-pass.
    #[serde(default)]
    pub merged_by_embedding: bool,
}
