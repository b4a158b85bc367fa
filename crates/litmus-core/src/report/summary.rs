use crate::model::{CaseStatus, TestCaseResult};
use serde::{Deserialize, Serialize};

/// Per-status counts over a run's results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub passed: u32,
    pub failed: u32,
    pub inconclusive: u32,
    pub unscored: u32,
}

impl RunSummary {
    pub fn from_results(results: &[TestCaseResult]) -> Self {
        let mut out = Self::default();
        for r in results {
            match r.status {
                CaseStatus::Passed => out.passed += 1,
                CaseStatus::Failed => out.failed += 1,
                CaseStatus::Inconclusive => out.inconclusive += 1,
                CaseStatus::Unscored => out.unscored += 1,
            }
        }
        out
    }

    pub fn total(&self) -> u32 {
        self.passed + self.failed + self.inconclusive + self.unscored
    }
}
