//! Integrity check results

use serde::{Deserialize, Serialize};

/// Entity type reported by the warning that stands in for a failed probe group
pub const UNVERIFIED_DEPENDENTS: &str = "<unverified>";

/// One dependent relationship that references a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityWarning {
    pub dependent_entity_type: String,
    /// Number of referencing rows; existence checks report 1
    pub dependent_count: u64,
    pub dependent_field: String,
    pub cascade_on_delete: bool,
    pub message: String,
}

impl IntegrityWarning {
    /// Warning from an existence probe: at least one row references the record
    pub fn present(dependent_entity_type: &str, dependent_field: &str, cascade_on_delete: bool) -> Self {
        let message = format!(
            "Rows in '{}' reference this record via '{}' ({})",
            dependent_entity_type,
            dependent_field,
            effect(cascade_on_delete)
        );
        Self {
            dependent_entity_type: dependent_entity_type.to_string(),
            dependent_count: 1,
            dependent_field: dependent_field.to_string(),
            cascade_on_delete,
            message,
        }
    }

    /// Warning carrying an exact count of referencing rows
    pub fn counted(dependent_entity_type: &str, dependent_field: &str, dependent_count: u64, cascade_on_delete: bool) -> Self {
        let (rows, verb) = if dependent_count == 1 {
            ("row", "references")
        } else {
            ("rows", "reference")
        };
        let message = format!(
            "{} {} in '{}' {} this record via '{}' ({})",
            dependent_count,
            rows,
            dependent_entity_type,
            verb,
            dependent_field,
            effect(cascade_on_delete)
        );
        Self {
            dependent_entity_type: dependent_entity_type.to_string(),
            dependent_count,
            dependent_field: dependent_field.to_string(),
            cascade_on_delete,
            message,
        }
    }

    /// Placeholder for dependents that could not be verified.
    ///
    /// Never cascading, so a record with unverifiable dependents is never
    /// reported as safe to delete.
    pub fn unverified(relationships: &str) -> Self {
        Self {
            dependent_entity_type: UNVERIFIED_DEPENDENTS.to_string(),
            dependent_count: 1,
            dependent_field: String::new(),
            cascade_on_delete: false,
            message: format!("Could not verify dependent records ({})", relationships),
        }
    }

    pub fn is_unverified(&self) -> bool {
        self.dependent_entity_type == UNVERIFIED_DEPENDENTS
    }

    /// Same warning with an exact dependent count
    pub fn with_count(&self, dependent_count: u64) -> Self {
        if self.is_unverified() {
            return self.clone();
        }
        Self::counted(
            &self.dependent_entity_type,
            &self.dependent_field,
            dependent_count,
            self.cascade_on_delete,
        )
    }
}

fn effect(cascade: bool) -> &'static str {
    if cascade {
        "deleted along with this record"
    } else {
        "blocks deletion"
    }
}

/// Aggregated view of what deleting a record would involve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionSummary {
    pub can_delete: bool,
    pub total_dependents: u64,
    pub cascade_deletions: u64,
    pub blocking_dependencies: u64,
    pub warnings: Vec<IntegrityWarning>,
    pub message: String,
}

impl DeletionSummary {
    pub fn from_warnings(warnings: Vec<IntegrityWarning>) -> Self {
        let cascade_deletions = warnings
            .iter()
            .filter(|w| w.cascade_on_delete)
            .map(|w| w.dependent_count)
            .sum::<u64>();
        let blocking_dependencies = warnings
            .iter()
            .filter(|w| !w.cascade_on_delete)
            .map(|w| w.dependent_count)
            .sum::<u64>();
        let total_dependents = cascade_deletions + blocking_dependencies;
        let can_delete = blocking_dependencies == 0;

        let message = if total_dependents == 0 {
            "No dependent records; safe to delete".to_string()
        } else if can_delete {
            format!(
                "Safe to delete; {} dependent record(s) will be deleted with it",
                cascade_deletions
            )
        } else {
            format!(
                "Cannot delete: {} dependent record(s) must be removed or reassigned first",
                blocking_dependencies
            )
        };

        Self {
            can_delete,
            total_dependents,
            cascade_deletions,
            blocking_dependencies,
            warnings,
            message,
        }
    }
}

/// Result of a delete request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionOutcome {
    pub deleted: bool,
    pub summary: DeletionSummary,
    /// Rows removed by cascading relationships
    pub cascaded_rows: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_without_dependents() {
        let summary = DeletionSummary::from_warnings(Vec::new());
        assert!(summary.can_delete);
        assert_eq!(summary.total_dependents, 0);
        assert!(summary.message.contains("safe to delete"));
    }

    #[test]
    fn test_summary_with_only_cascading_dependents() {
        let summary = DeletionSummary::from_warnings(vec![
            IntegrityWarning::counted("photos", "animal_id", 3, true),
            IntegrityWarning::counted("health_records", "animal_id", 2, true),
        ]);
        assert!(summary.can_delete);
        assert_eq!(summary.cascade_deletions, 5);
        assert_eq!(summary.blocking_dependencies, 0);
        assert!(summary.message.contains("5 dependent record(s) will be deleted"));
    }

    #[test]
    fn test_summary_with_blocking_dependents() {
        let summary = DeletionSummary::from_warnings(vec![
            IntegrityWarning::counted("photos", "animal_id", 1, true),
            IntegrityWarning::counted("animals", "father_id", 4, false),
        ]);
        assert!(!summary.can_delete);
        assert_eq!(summary.total_dependents, 5);
        assert_eq!(summary.blocking_dependencies, 4);
        assert!(summary.message.starts_with("Cannot delete"));
    }

    #[test]
    fn test_unverified_warning_blocks() {
        let warning = IntegrityWarning::unverified("parents");
        assert!(warning.is_unverified());
        assert_eq!(warning.with_count(7), warning);

        let summary = DeletionSummary::from_warnings(vec![warning]);
        assert!(!summary.can_delete);
    }

    #[test]
    fn test_warning_message() {
        let warning = IntegrityWarning::present("photos", "animal_id", true);
        assert_eq!(warning.dependent_count, 1);
        assert_eq!(
            warning.message,
            "Rows in 'photos' reference this record via 'animal_id' (deleted along with this record)"
        );

        let counted = warning.with_count(2);
        assert_eq!(counted.dependent_count, 2);
        assert_eq!(
            counted.message,
            "2 rows in 'photos' reference this record via 'animal_id' (deleted along with this record)"
        );
        assert_eq!(
            IntegrityWarning::counted("animals", "father_id", 1, false).message,
            "1 row in 'animals' references this record via 'father_id' (blocks deletion)"
        );
    }
}
