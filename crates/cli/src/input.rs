use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use trialmap_ingest::IngestConfig;
use trialmap_protocol::ParsedDocument;

/// Read a parser output file (JSON `ParsedDocument`).
pub(crate) fn read_document(path: &Path) -> Result<ParsedDocument> {
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read document {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not a parsed document", path.display()))
}

pub(crate) fn load_config(rules_dir: Option<&Path>) -> Result<IngestConfig> {
    match rules_dir {
        Some(dir) => IngestConfig::from_rules_dir(dir)
            .with_context(|| format!("Failed to load rules from {}", dir.display())),
        None => IngestConfig::builtin().context("Bundled rules are invalid"),
    }
}

/// File the artifacts of a version are written to; ids may contain `:` and `/`.
pub(crate) fn artifact_path(dir: &Path, doc_version_id: &str) -> PathBuf {
    let stem: String = doc_version_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    dir.join(format!("{stem}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names_are_filesystem_safe() {
        let path = artifact_path(Path::new("out"), "P-001:v2/draft");
        assert_eq!(path, Path::new("out").join("P-001_v2_draft.json"));
    }

    #[test]
    fn unreadable_documents_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, b"{\"nodes\": []}").unwrap();
        let err = read_document(&path).unwrap_err();
        assert!(format!("{err}").contains("doc.json"));
    }
}
