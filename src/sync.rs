use serde::Serialize;

use crate::model::HighlightRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncResult {
    Created,
    Updated,
    Unchanged,
    Skipped,
}

impl SyncResult {
    pub fn record(self, stats: &mut SyncStats) {
        match self {
            SyncResult::Created => stats.created += 1,
            SyncResult::Updated => stats.updated += 1,
            SyncResult::Unchanged => stats.unchanged += 1,
            SyncResult::Skipped => stats.skipped += 1,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub created: i32,
    pub updated: i32,
    pub unchanged: i32,
    pub skipped: i32,
}

pub fn log_skipped(id: &str, reason: &str) {
    tracing::warn!("Skipping imported highlight {}: {}", id, reason);
}

/// Merges one imported record into `existing`, keyed by id. An existing
/// record with the same id is replaced wholesale.
pub fn merge_record(existing: &mut Vec<HighlightRecord>, incoming: HighlightRecord) -> SyncResult {
    if incoming.id.is_empty() {
        log_skipped("<empty>", "missing id");
        return SyncResult::Skipped;
    }
    if incoming.end_offset <= incoming.start_offset {
        log_skipped(&incoming.id, "endOffset must be greater than startOffset");
        return SyncResult::Skipped;
    }

    match existing.iter_mut().find(|r| r.id == incoming.id) {
        Some(current) if *current == incoming => SyncResult::Unchanged,
        Some(current) => {
            *current = incoming;
            SyncResult::Updated
        }
        None => {
            existing.push(incoming);
            SyncResult::Created
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, note: &str) -> HighlightRecord {
        HighlightRecord {
            id: id.to_string(),
            url: "https://example.com".to_string(),
            text: "text".to_string(),
            note: note.to_string(),
            start_offset: 0,
            end_offset: 4,
            xpath: "/html[1]/body[1]/p[1]".to_string(),
            timestamp: 1,
            color: None,
        }
    }

    #[test]
    fn test_merge_record_outcomes() {
        let mut existing = vec![record("a", ""), record("b", "")];
        let mut stats = SyncStats::default();

        merge_record(&mut existing, record("a", "")).record(&mut stats);
        merge_record(&mut existing, record("b", "changed")).record(&mut stats);
        merge_record(&mut existing, record("c", "")).record(&mut stats);
        let mut broken = record("d", "");
        broken.end_offset = 0;
        merge_record(&mut existing, broken).record(&mut stats);

        assert_eq!(
            stats,
            SyncStats {
                created: 1,
                updated: 1,
                unchanged: 1,
                skipped: 1
            }
        );
        assert_eq!(existing.len(), 3);
        assert_eq!(existing[1].note, "changed");
    }
}
