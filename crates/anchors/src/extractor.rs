use crate::error::{AnchorError, Result};
use crate::language::detect_language;
use crate::normalize::{
    collapse_whitespace, content_hash, normalize_for_matching, normalize_heading,
};
use std::collections::HashMap;
use trialmap_protocol::{
    Anchor, ContentKind, ContentNode, FootnoteRef, NodeKind, ParsedDocument, TableRef,
    Zone, PATH_SEPARATOR,
};

/// Separator used when a table anchor renders its cells as one text.
const CELL_SEPARATOR: &str = " | ";

/// Build a non-footnote anchor id.
#[must_use]
pub fn anchor_id(
    doc_version_id: &str,
    kind: ContentKind,
    position_index: u32,
    content_hash: &str,
) -> String {
    format!(
        "{doc_version_id}:{}:{position_index}:{content_hash}",
        kind.code()
    )
}

/// Build a footnote anchor id.
#[must_use]
pub fn footnote_anchor_id(
    doc_version_id: &str,
    position_index: u32,
    footnote: FootnoteRef,
    content_hash: &str,
) -> String {
    format!(
        "{doc_version_id}:{}:{position_index}:{}:{}:{content_hash}",
        ContentKind::Footnote.code(),
        footnote.footnote_index,
        footnote.inner_index
    )
}

/// Decomposes a parsed document into anchors.
///
/// Identity depends only on document version, content kind, the per-kind ordinal and
/// the content hash. Structural path and in-section ordinal are recorded as metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnchorExtractor;

impl AnchorExtractor {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    pub fn extract(&self, doc: &ParsedDocument) -> Result<Vec<Anchor>> {
        if doc.doc_version_id.trim().is_empty() {
            return Err(AnchorError::InvalidDocument(
                "doc_version_id must not be empty".to_string(),
            ));
        }

        let mut state = ExtractionState::new(doc);
        for node in &doc.nodes {
            state.push_node(node);
        }

        if state.anchors.is_empty() {
            return Err(AnchorError::EmptyDocument(doc.doc_version_id.clone()));
        }
        log::debug!(
            "extracted {} anchors from {} nodes of {}",
            state.anchors.len(),
            doc.nodes.len(),
            doc.doc_version_id
        );
        Ok(state.anchors)
    }
}

struct ExtractionState<'a> {
    doc: &'a ParsedDocument,
    anchors: Vec<Anchor>,
    kind_counters: HashMap<ContentKind, u32>,
    section_counters: HashMap<String, u32>,
    table_counter: u32,
}

struct Draft<'n> {
    kind: ContentKind,
    text: String,
    path: &'n [String],
    heading_level: Option<u8>,
    footnote: Option<FootnoteRef>,
    table: Option<TableRef>,
}

impl<'a> ExtractionState<'a> {
    fn new(doc: &'a ParsedDocument) -> Self {
        Self {
            doc,
            anchors: Vec::new(),
            kind_counters: HashMap::new(),
            section_counters: HashMap::new(),
            table_counter: 0,
        }
    }

    fn push_node(&mut self, node: &ContentNode) {
        match &node.kind {
            NodeKind::Heading { level } => self.push(Draft {
                kind: ContentKind::Heading,
                text: node.text.clone(),
                path: &node.path,
                heading_level: Some(*level),
                footnote: None,
                table: None,
            }),
            NodeKind::Paragraph => self.push(Draft {
                kind: ContentKind::Paragraph,
                text: node.text.clone(),
                path: &node.path,
                heading_level: None,
                footnote: None,
                table: None,
            }),
            NodeKind::ListItem => self.push(Draft {
                kind: ContentKind::ListItem,
                text: node.text.clone(),
                path: &node.path,
                heading_level: None,
                footnote: None,
                table: None,
            }),
            NodeKind::Footnote {
                footnote_index,
                inner_index,
            } => self.push(Draft {
                kind: ContentKind::Footnote,
                text: node.text.clone(),
                path: &node.path,
                heading_level: None,
                footnote: Some(FootnoteRef {
                    footnote_index: *footnote_index,
                    inner_index: *inner_index,
                }),
                table: None,
            }),
            NodeKind::Table { rows } => self.push_table(rows, &node.path),
        }
    }

    fn push_table(&mut self, rows: &[Vec<String>], path: &[String]) {
        let table_text = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| collapse_whitespace(cell))
                    .collect::<Vec<_>>()
                    .join(CELL_SEPARATOR)
            })
            .collect::<Vec<_>>()
            .join("\n");
        if rows.iter().flatten().all(|cell| cell.trim().is_empty()) {
            return;
        }

        let row_count = u32::try_from(rows.len()).unwrap_or(u32::MAX);
        let col_count =
            u32::try_from(rows.iter().map(Vec::len).max().unwrap_or(0)).unwrap_or(u32::MAX);
        let table_index = self.table_counter;
        self.table_counter += 1;

        self.push(Draft {
            kind: ContentKind::Table,
            text: table_text,
            path,
            heading_level: None,
            footnote: None,
            table: Some(TableRef {
                table_index,
                row: 0,
                col: 0,
                rows: row_count,
                cols: col_count,
            }),
        });

        for (row_idx, row) in rows.iter().enumerate() {
            for (col_idx, cell) in row.iter().enumerate() {
                self.push(Draft {
                    kind: ContentKind::TableCell,
                    text: cell.clone(),
                    path,
                    heading_level: None,
                    footnote: None,
                    table: Some(TableRef {
                        table_index,
                        row: u32::try_from(row_idx).unwrap_or(u32::MAX),
                        col: u32::try_from(col_idx).unwrap_or(u32::MAX),
                        rows: row_count,
                        cols: col_count,
                    }),
                });
            }
        }
    }

    fn push(&mut self, draft: Draft<'_>) {
        let text = draft.text.trim();
        if text.is_empty() {
            return;
        }

        let position_index = {
            let counter = self.kind_counters.entry(draft.kind).or_insert(0);
            let current = *counter;
            *counter += 1;
            current
        };
        let structural_path: Vec<String> = draft.path.to_vec();
        let ordinal_in_section = {
            let counter = self
                .section_counters
                .entry(structural_path.join(PATH_SEPARATOR))
                .or_insert(0);
            let current = *counter;
            *counter += 1;
            current
        };

        let doc_version_id = self.doc.doc_version_id.as_str();
        let hash = content_hash(draft.kind, text);
        let anchor_id = match draft.footnote {
            Some(footnote) => footnote_anchor_id(doc_version_id, position_index, footnote, &hash),
            None => anchor_id(doc_version_id, draft.kind, position_index, &hash),
        };
        let language = detect_language(text, self.doc.language);

        self.anchors.push(Anchor {
            anchor_id,
            doc_version_id: doc_version_id.to_string(),
            kind: draft.kind,
            position_index,
            ordinal_in_section,
            text: text.to_string(),
            normalized_text: if draft.kind.is_heading() {
                normalize_heading(text)
            } else {
                normalize_for_matching(text)
            },
            content_hash: hash,
            structural_path,
            heading_level: draft.heading_level,
            zone: Zone::Unknown,
            zone_confidence: 0.0,
            language,
            confidence: None,
            footnote: draft.footnote,
            table: draft.table,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use trialmap_protocol::{DocumentType, Language};

    fn sample_doc() -> ParsedDocument {
        ParsedDocument::new("P-001:v1", DocumentType::Protocol, Language::En)
            .node(ContentNode::heading(1, "4. Objectives", &["4 Objectives"]))
            .node(ContentNode::paragraph(
                "The primary objective is to assess efficacy.",
                &["4 Objectives"],
            ))
            .node(ContentNode::list_item("Secondary: safety", &["4 Objectives"]))
            .node(ContentNode::footnote(2, 0, "See the SAP.", &["4 Objectives"]))
            .node(ContentNode::paragraph("   ", &["4 Objectives"]))
    }

    #[test]
    fn identical_input_yields_identical_ids() {
        let extractor = AnchorExtractor::new();
        let a = extractor.extract(&sample_doc()).unwrap();
        let b = extractor.extract(&sample_doc()).unwrap();
        let ids_a: Vec<_> = a.iter().map(|x| x.anchor_id.clone()).collect();
        let ids_b: Vec<_> = b.iter().map(|x| x.anchor_id.clone()).collect();
        assert_eq!(ids_a, ids_b);
        assert_eq!(a.len(), 4, "blank paragraph is skipped");
    }

    #[test]
    fn id_formats_follow_kind_codes() {
        let anchors = AnchorExtractor::new().extract(&sample_doc()).unwrap();
        let hash = content_hash(ContentKind::Heading, "Objectives");
        assert_eq!(anchors[0].anchor_id, format!("P-001:v1:hdr:0:{hash}"));
        assert!(anchors[1].anchor_id.starts_with("P-001:v1:p:0:"));
        assert!(anchors[2].anchor_id.starts_with("P-001:v1:li:0:"));
        assert!(anchors[3].anchor_id.starts_with("P-001:v1:fn:0:2:0:"));
        assert_eq!(anchors[3].footnote.map(|f| f.footnote_index), Some(2));
    }

    #[test]
    fn ordinal_in_section_is_metadata_only() {
        let anchors = AnchorExtractor::new().extract(&sample_doc()).unwrap();
        let ordinals: Vec<_> = anchors.iter().map(|a| a.ordinal_in_section).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3]);
        assert!(anchors
            .iter()
            .all(|a| !a.anchor_id.contains("4 Objectives")));
    }

    #[test]
    fn paragraph_ids_survive_resectioning() {
        let before = ParsedDocument::new("D:v1", DocumentType::Protocol, Language::En)
            .node(ContentNode::heading(1, "Design", &["Design"]))
            .node(ContentNode::paragraph("Randomized 1:1.", &["Design"]))
            .node(ContentNode::paragraph("Double blind.", &["Design"]));
        let after = ParsedDocument::new("D:v1", DocumentType::Protocol, Language::En)
            .node(ContentNode::heading(1, "Design", &["Design"]))
            .node(ContentNode::paragraph("Randomized 1:1.", &["Design"]))
            .node(ContentNode::heading(2, "Blinding", &["Design", "Blinding"]))
            .node(ContentNode::paragraph(
                "Double blind.",
                &["Design", "Blinding"],
            ));

        let extractor = AnchorExtractor::new();
        let paragraphs = |doc: &ParsedDocument| -> Vec<String> {
            extractor
                .extract(doc)
                .unwrap()
                .into_iter()
                .filter(|a| a.kind == ContentKind::Paragraph)
                .map(|a| a.anchor_id)
                .collect()
        };
        assert_eq!(paragraphs(&before), paragraphs(&after));
    }

    #[test]
    fn tables_expand_into_table_and_cell_anchors() {
        let doc = ParsedDocument::new("D:v1", DocumentType::Protocol, Language::En).node(
            ContentNode::table(
                vec![
                    vec!["Procedure".into(), "V1".into(), "V2".into()],
                    vec!["ECG".into(), "X".into(), String::new()],
                ],
                &["Schedule"],
            ),
        );
        let anchors = AnchorExtractor::new().extract(&doc).unwrap();
        assert_eq!(anchors[0].kind, ContentKind::Table);
        assert_eq!(anchors[0].text, "Procedure | V1 | V2\nECG | X |");
        let table = anchors[0].table.unwrap();
        assert_eq!((table.rows, table.cols), (2, 3));

        let cells: Vec<_> = anchors
            .iter()
            .filter(|a| a.kind == ContentKind::TableCell)
            .collect();
        assert_eq!(cells.len(), 5, "empty cell is skipped");
        let ecg_x = cells.iter().find(|a| a.text == "X").unwrap();
        assert_eq!(ecg_x.table.map(|t| (t.row, t.col)), Some((1, 1)));
    }

    #[test]
    fn empty_document_is_an_error() {
        let doc = ParsedDocument::new("D:v1", DocumentType::Protocol, Language::En)
            .node(ContentNode::paragraph("  ", &[]));
        assert!(matches!(
            AnchorExtractor::new().extract(&doc),
            Err(AnchorError::EmptyDocument(id)) if id == "D:v1"
        ));
    }

    #[test]
    fn language_is_detected_per_anchor() {
        let doc = ParsedDocument::new("D:v1", DocumentType::Protocol, Language::En)
            .node(ContentNode::heading(1, "Критерии включения", &["5"]))
            .node(ContentNode::paragraph("Age 18 or older", &["5"]))
            .node(ContentNode::paragraph("42", &["5"]));
        let anchors = AnchorExtractor::new().extract(&doc).unwrap();
        let langs: Vec<_> = anchors.iter().map(|a| a.language).collect();
        assert_eq!(langs, vec![Language::Ru, Language::En, Language::En]);
    }
}
