use serde::Serialize;
use trialmap_protocol::{AlignmentReport, Anchor, DiffStatus, IngestionRun, RunStatus};

/// Serialized name of a unit enum (`soa_missing`, `needs_review`, ...).
fn label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => "?".to_string(),
    }
}

pub(crate) fn run_summary(run: &IngestionRun) -> String {
    if run.status == RunStatus::Failed {
        return format!(
            "{}: failed ({})",
            run.doc_version_id,
            run.errors.join("; ")
        );
    }
    let m = &run.metrics;
    let mut line = format!(
        "{}: {} anchors, {} chunks, {} heading blocks, {} topics assigned, {} sections mapped ({} need review), verdict {}",
        run.doc_version_id,
        m.anchors,
        m.chunks,
        m.heading_blocks,
        m.assigned_blocks,
        m.mapped_sections,
        m.needs_review_sections,
        label(&run.quality.verdict),
    );
    if !run.quality.flags.is_empty() {
        let flags: Vec<String> = run.quality.flags.iter().map(label).collect();
        line.push_str(&format!(" [{}]", flags.join(", ")));
    }
    if m.anchor_matches + m.anchors_added + m.anchors_deleted > 0 {
        line.push_str(&format!(
            ", alignment {} matched / {} added / {} deleted",
            m.anchor_matches, m.anchors_added, m.anchors_deleted
        ));
    }
    line.push_str(&format!(" in {}ms", run.duration_ms));
    if m.lock_wait_ms > 0 {
        line.push_str(&format!(" (waited {}ms for the version lock)", m.lock_wait_ms));
    }
    line
}

pub(crate) fn alignment_lines(report: &AlignmentReport) -> Vec<String> {
    let mut lines = vec![format!(
        "{} -> {}: {} matched ({} changed), {} added, {} deleted",
        report.prev_doc_version_id,
        report.curr_doc_version_id,
        report.matches.len(),
        report.changed_count(),
        report.added.len(),
        report.deleted.len()
    )];
    for m in &report.matches {
        if m.status == DiffStatus::Changed {
            lines.push(format!(
                "  ~ {} -> {} ({} {:.2})",
                m.prev_anchor_id,
                m.curr_anchor_id,
                label(&m.method),
                m.similarity
            ));
        }
    }
    lines.extend(report.deleted.iter().map(|id| format!("  - {id}")));
    lines.extend(report.added.iter().map(|id| format!("  + {id}")));
    lines
}

pub(crate) fn classification_lines(anchors: &[Anchor]) -> Vec<String> {
    anchors
        .iter()
        .map(|a| {
            let mut text: String = a.text.chars().take(60).collect();
            if a.text.chars().count() > 60 {
                text.push('…');
            }
            format!(
                "{:<24} {:.2}  {:<6} {}",
                a.zone.as_str(),
                a.zone_confidence,
                a.kind.code(),
                text
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use trialmap_protocol::{QualityFlag, QualityReport, QualityVerdict, RunMetrics};

    fn completed_run(lock_wait_ms: u64) -> IngestionRun {
        IngestionRun {
            run_id: "P:v1:1".to_string(),
            doc_version_id: "P:v1".to_string(),
            status: RunStatus::Completed,
            started_unix_ms: 1,
            duration_ms: 12,
            metrics: RunMetrics {
                anchors: 4,
                lock_wait_ms,
                ..RunMetrics::default()
            },
            quality: QualityReport::default(),
            warnings: Vec::new(),
            errors: Vec::new(),
            config_hash: "abc".to_string(),
        }
    }

    #[test]
    fn labels_use_wire_names() {
        assert_eq!(label(&QualityFlag::SoaMissing), "soa_missing");
        assert_eq!(label(&QualityVerdict::NeedsReview), "needs_review");
    }

    #[test]
    fn summaries_mention_lock_waits_only_when_there_was_one() {
        let quiet = run_summary(&completed_run(0));
        assert!(quiet.starts_with("P:v1: 4 anchors"));
        assert!(quiet.ends_with(" in 12ms"));

        let waited = run_summary(&completed_run(250));
        assert!(waited.ends_with(" in 12ms (waited 250ms for the version lock)"));
    }
}
