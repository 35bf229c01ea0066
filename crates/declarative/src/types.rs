//! Execution result types

use serde::{Deserialize, Serialize};

/// Result of provisioning one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// Nothing to do
    NoChange,
    /// Resource was created
    Created,
    /// Resource was updated in place
    Updated,
    /// Resource was destroyed and re-created
    Replaced,
    /// Resource was destroyed
    Deleted,
    /// Data source was looked up
    Read,
    /// Provisioning failed
    Failed { error: String },
    /// Provisioning was skipped
    Skipped { reason: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure, not skipped)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. } | Self::Skipped { .. })
    }

    /// Check if the result represents a change to infrastructure
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Updated | Self::Replaced | Self::Deleted
        )
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub deleted: usize,
    pub read: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.replaced + self.deleted
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.total_changes() + self.read + self.skipped + self.failed + self.no_change
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Updated => self.updated += 1,
            ApplyResult::Replaced => self.replaced += 1,
            ApplyResult::Deleted => self.deleted += 1,
            ApplyResult::Read => self.read += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Don't provision, just report what would happen
    pub dry_run: bool,
    /// Number of resources provisioned in parallel within a wave
    pub jobs: usize,
    /// Log every request and its result at info level
    pub verbose: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            verbose: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = ExecuteSummary::default();
        for result in [
            ApplyResult::Created,
            ApplyResult::Updated,
            ApplyResult::Read,
            ApplyResult::NoChange,
            ApplyResult::Failed { error: "boom".into() },
            ApplyResult::Skipped { reason: "dependency failed".into() },
        ] {
            summary.add_result(&result);
        }

        assert_eq!(summary.total_changes(), 2);
        assert_eq!(summary.total(), 6);
        assert!(!summary.is_success());

        summary.add_result(&ApplyResult::Deleted);
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.total_changes(), 3);
    }

    #[test]
    fn test_apply_result_predicates() {
        assert!(ApplyResult::Read.is_success());
        assert!(!ApplyResult::Read.is_change());
        assert!(ApplyResult::Replaced.is_change());
        assert!(!ApplyResult::Skipped { reason: String::new() }.is_success());
    }
}
