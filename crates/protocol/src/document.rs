use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of clinical-trial document being ingested.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Protocol,
    Sap,
    Csr,
    Ib,
    Icf,
    Other,
}

impl DocumentType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::Sap => "sap",
            Self::Csr => "csr",
            Self::Ib => "ib",
            Self::Icf => "icf",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "protocol" => Ok(Self::Protocol),
            "sap" => Ok(Self::Sap),
            "csr" => Ok(Self::Csr),
            "ib" => Ok(Self::Ib),
            "icf" => Ok(Self::Icf),
            "other" => Ok(Self::Other),
            other => Err(format!("unsupported document type '{other}'")),
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    En,
    Ru,
    Mixed,
    #[default]
    Unknown,
}

impl Language {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ru => "ru",
            Self::Mixed => "mixed",
            Self::Unknown => "unknown",
        }
    }

    /// Languages with their own rule patterns.
    pub const CONCRETE: [Language; 2] = [Language::En, Language::Ru];

    #[must_use]
    pub const fn is_concrete(self) -> bool {
        matches!(self, Self::En | Self::Ru)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Self::En),
            "ru" => Ok(Self::Ru),
            "mixed" => Ok(Self::Mixed),
            "unknown" | "" => Ok(Self::Unknown),
            other => Err(format!("unsupported language '{other}'")),
        }
    }
}

/// Output of the upstream parser: ordered content nodes plus document metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ParsedDocument {
    pub doc_version_id: String,
    pub document_type: DocumentType,
    #[serde(default)]
    pub language: Language,
    pub nodes: Vec<ContentNode>,
}

impl ParsedDocument {
    pub fn new(
        doc_version_id: impl Into<String>,
        document_type: DocumentType,
        language: Language,
    ) -> Self {
        Self {
            doc_version_id: doc_version_id.into(),
            document_type,
            language,
            nodes: Vec::new(),
        }
    }

    /// Builder: append a node
    #[must_use]
    pub fn node(mut self, node: ContentNode) -> Self {
        self.nodes.push(node);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ContentNode {
    pub kind: NodeKind,
    #[serde(default)]
    pub text: String,
    /// Structural path at parse time, outermost section first.
    #[serde(default)]
    pub path: Vec<String>,
}

impl ContentNode {
    pub fn heading(level: u8, text: impl Into<String>, path: &[&str]) -> Self {
        Self::new(NodeKind::Heading { level }, text, path)
    }

    pub fn paragraph(text: impl Into<String>, path: &[&str]) -> Self {
        Self::new(NodeKind::Paragraph, text, path)
    }

    pub fn list_item(text: impl Into<String>, path: &[&str]) -> Self {
        Self::new(NodeKind::ListItem, text, path)
    }

    pub fn footnote(
        footnote_index: u32,
        inner_index: u32,
        text: impl Into<String>,
        path: &[&str],
    ) -> Self {
        Self::new(
            NodeKind::Footnote {
                footnote_index,
                inner_index,
            },
            text,
            path,
        )
    }

    pub fn table(rows: Vec<Vec<String>>, path: &[&str]) -> Self {
        Self::new(NodeKind::Table { rows }, String::new(), path)
    }

    fn new(kind: NodeKind, text: impl Into<String>, path: &[&str]) -> Self {
        Self {
            kind,
            text: text.into(),
            path: path.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Heading { level: u8 },
    Paragraph,
    ListItem,
    Footnote { footnote_index: u32, inner_index: u32 },
    Table { rows: Vec<Vec<String>> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_nodes() {
        let json = r#"{
            "doc_version_id": "P-001:v2",
            "document_type": "protocol",
            "language": "en",
            "nodes": [
                {"kind": {"type": "heading", "level": 1}, "text": "Objectives", "path": ["4 Objectives"]},
                {"kind": {"type": "footnote", "footnote_index": 3, "inner_index": 0}, "text": "See SAP."},
                {"kind": {"type": "table", "rows": [["Visit", "V1"], ["ECG", "X"]]}}
            ]
        }"#;
        let doc: ParsedDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.nodes.len(), 3);
        assert_eq!(doc.nodes[0].kind, NodeKind::Heading { level: 1 });
        assert!(doc.nodes[1].path.is_empty());
        assert!(matches!(doc.nodes[2].kind, NodeKind::Table { ref rows } if rows.len() == 2));
    }

    #[test]
    fn document_type_parses_case_insensitively() {
        assert_eq!("CSR".parse::<DocumentType>().unwrap(), DocumentType::Csr);
        assert!("memo".parse::<DocumentType>().is_err());
    }
}
