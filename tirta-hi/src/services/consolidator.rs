//! Dataset consolidation
//!
//! Merges upload-derived records with a telemetry export into one
//! deduplicated, date-ascending sequence. For a date present in both inputs
//! the record later in iteration order wins, so callers control precedence
//! by ordering; the orchestrator appends the export after the upload rows so
//! freshly exported live data supersedes bulk-uploaded history.

use crate::models::ConsumptionRecord;
use std::collections::BTreeMap;

/// Merge two date-keyed record sequences, later entries winning
///
/// Matching is exact string equality on the normalized ISO date key.
pub fn consolidate(
    upload: Vec<ConsumptionRecord>,
    export: Vec<ConsumptionRecord>,
) -> Vec<ConsumptionRecord> {
    let mut by_date: BTreeMap<String, ConsumptionRecord> = BTreeMap::new();

    for record in upload.into_iter().chain(export) {
        by_date.insert(record.date.clone(), record);
    }

    by_date.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(date: &str, volume: f64) -> ConsumptionRecord {
        ConsumptionRecord::new(date, volume)
    }

    #[test]
    fn export_wins_on_overlapping_dates() {
        let upload = vec![rec("2025-01-01", 1.5)];
        let export = vec![rec("2025-01-01", 1.8), rec("2025-01-02", 2.0)];

        let merged = consolidate(upload, export);

        assert_eq!(merged, vec![rec("2025-01-01", 1.8), rec("2025-01-02", 2.0)]);
    }

    #[test]
    fn output_is_union_of_both_date_sets() {
        let upload = vec![rec("2025-01-01", 1.0), rec("2025-01-03", 3.0)];
        let export = vec![rec("2025-01-02", 2.0), rec("2025-01-04", 4.0)];

        let merged = consolidate(upload, export);

        let dates: Vec<&str> = merged.iter().map(|r| r.date.as_str()).collect();
        assert_eq!(dates, vec!["2025-01-01", "2025-01-02", "2025-01-03", "2025-01-04"]);
    }

    #[test]
    fn duplicate_dates_within_one_input_keep_the_last() {
        let upload = vec![rec("2025-01-01", 1.0), rec("2025-01-01", 9.0)];
        let merged = consolidate(upload, Vec::new());

        assert_eq!(merged, vec![rec("2025-01-01", 9.0)]);
    }

    #[test]
    fn empty_inputs_merge_to_empty() {
        assert!(consolidate(Vec::new(), Vec::new()).is_empty());
    }

    #[test]
    fn empty_export_preserves_upload() {
        let upload = vec![rec("2025-01-02", 2.0), rec("2025-01-01", 1.0)];
        let merged = consolidate(upload, Vec::new());

        // Still sorted ascending even when one side is empty.
        assert_eq!(merged[0].date, "2025-01-01");
        assert_eq!(merged.len(), 2);
    }
}
