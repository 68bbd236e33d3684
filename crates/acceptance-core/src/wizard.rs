//! # Wizard Navigation
//!
//! Which stage tab is open. A stage can be opened only when it is complete
//! or current; future stages stay locked.

use crate::error::{AcceptanceError, AcceptanceResult};
use crate::stage::StageReport;
use crate::types::AcceptanceStage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wizard {
    pub active: AcceptanceStage,
}

impl Wizard {
    /// Open on the report's active stage, or the last stage once every
    /// stage is complete.
    #[must_use]
    pub fn open(report: &StageReport) -> Self {
        Self {
            active: report
                .active_stage
                .unwrap_or(AcceptanceStage::PartnerApproval),
        }
    }

    /// Switch tabs, refusing locked stages.
    pub fn activate(&mut self, stage: AcceptanceStage, report: &StageReport) -> AcceptanceResult<()> {
        if !report.status(stage).is_reachable() {
            return Err(AcceptanceError::StageLocked { stage });
        }
        self.active = stage;
        Ok(())
    }

    /// Follow the report to its active stage after a submission.
    ///
    /// Returns `true` if the tab changed.
    pub fn advance(&mut self, report: &StageReport) -> bool {
        match report.active_stage {
            Some(stage) if stage != self.active => {
                self.active = stage;
                true
            }
            _ => false,
        }
    }
}
