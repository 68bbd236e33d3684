//! # Stage-Status Calculator
//!
//! Computes `{complete, current, required}` for each of the four stages from
//! a [`WorkflowSnapshot`].
//!
//! A stage is complete when its marker is set, or when every earlier stage
//! is complete and its own predicate holds. A stage is current when every
//! earlier stage is complete and it is not. Partner approval is the only
//! optional stage; when it is not required its predicate holds trivially.
//!
//! The calculator is pure. It never writes markers; persisting them is the
//! orchestrator's job.

use crate::risk::ReviewStatus;
use crate::types::{AcceptanceStage, EngagementId, UnixSeconds};
use crate::workflow::WorkflowSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status of a single stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStatus {
    pub complete: bool,
    pub current: bool,
    pub required: bool,
}

impl StageStatus {
    /// Complete or current stages can be opened; later ones are locked.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.complete || self.current
    }
}

/// Full evaluation of one engagement's workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub engagement_id: EngagementId,
    pub stages: BTreeMap<AcceptanceStage, StageStatus>,
    /// The first incomplete stage, if any.
    pub active_stage: Option<AcceptanceStage>,
    pub active_index: Option<usize>,
    /// Stages 1-3 complete and stage 4 complete or not required.
    pub is_complete: bool,
    /// When the explicit completion action ran.
    pub completed_at: Option<UnixSeconds>,
    pub progress_percent: u8,
    /// Everything standing between this engagement and acceptance.
    pub blockers: Vec<String>,
}

impl StageReport {
    #[must_use]
    pub fn status(&self, stage: AcceptanceStage) -> StageStatus {
        self.stages.get(&stage).copied().unwrap_or_default()
    }

    /// Blockers empty and not yet finalised.
    #[must_use]
    pub fn can_complete(&self) -> bool {
        self.blockers.is_empty() && self.completed_at.is_none()
    }
}

// =============================================================================
// STAGE PREDICATES
// =============================================================================

/// Unmet conditions of a stage's own completion predicate.
///
/// Ignores the linear chain; an empty list means the predicate holds.
#[must_use]
pub fn stage_blockers(stage: AcceptanceStage, snapshot: &WorkflowSnapshot) -> Vec<String> {
    match stage {
        AcceptanceStage::IndependenceCheck => independence_blockers(snapshot),
        AcceptanceStage::RiskAssessment => match &snapshot.risk_assessment {
            None => vec!["Client risk assessment has not been started".to_string()],
            Some(assessment) => assessment.recommendation_blockers(),
        },
        AcceptanceStage::EngagementLetter => match &snapshot.letter {
            None => vec!["Engagement letter has not been drafted".to_string()],
            Some(letter) if !letter.is_signed() => {
                vec!["Engagement letter has not been signed by the client".to_string()]
            }
            Some(_) => Vec::new(),
        },
        AcceptanceStage::PartnerApproval => {
            if !snapshot.partner_approval_required() {
                return Vec::new();
            }
            let decided = snapshot
                .risk_assessment
                .as_ref()
                .is_some_and(|a| a.partner_decision.is_some());
            if decided {
                Vec::new()
            } else {
                vec!["Partner approval decision has not been recorded".to_string()]
            }
        }
    }
}

fn independence_blockers(snapshot: &WorkflowSnapshot) -> Vec<String> {
    if snapshot.team.is_empty() {
        return vec!["No team members are assigned to the engagement".to_string()];
    }

    snapshot
        .team
        .iter()
        .filter(|member| {
            !snapshot
                .declaration_of(&member.id)
                .is_some_and(|d| d.is_certified)
        })
        .map(|member| format!("Independence declaration not certified for {}", member.name))
        .collect()
}

// =============================================================================
// EVALUATION
// =============================================================================

/// Evaluate every stage of the snapshot.
#[must_use]
pub fn evaluate(snapshot: &WorkflowSnapshot) -> StageReport {
    let approval_required = snapshot.partner_approval_required();
    let mut stages = BTreeMap::new();
    let mut predecessors_complete = true;

    for stage in AcceptanceStage::ALL {
        let required = stage != AcceptanceStage::PartnerApproval || approval_required;
        let complete = snapshot.workflow.is_marked(stage)
            || (predecessors_complete && stage_blockers(stage, snapshot).is_empty());
        let current = predecessors_complete && !complete;

        stages.insert(
            stage,
            StageStatus {
                complete,
                current,
                required,
            },
        );
        predecessors_complete = predecessors_complete && complete;
    }

    let active_stage = AcceptanceStage::ALL
        .into_iter()
        .find(|stage| stages.get(stage).is_some_and(|s| s.current));

    let is_complete = AcceptanceStage::ALL.into_iter().all(|stage| {
        stages
            .get(&stage)
            .is_some_and(|s| s.complete || !s.required)
    });

    let (done, total) = stages
        .values()
        .filter(|s| s.required)
        .fold((0u32, 0u32), |(done, total), s| {
            (done + u32::from(s.complete), total + 1)
        });

    let report = StageReport {
        engagement_id: snapshot.engagement_id().clone(),
        active_index: active_stage.map(AcceptanceStage::index),
        active_stage,
        is_complete,
        completed_at: snapshot.workflow.completed_at,
        progress_percent: progress_percent(done, total),
        blockers: Vec::new(),
        stages,
    };

    StageReport {
        blockers: acceptance_blockers(snapshot, &report),
        ..report
    }
}

/// `done / total * 100`, rounded half up, integer only.
#[must_use]
pub fn progress_percent(done: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let scaled = done.min(total) * 100;
    ((scaled + total / 2) / total) as u8
}

/// Every unmet precondition of the completion action, one string each.
#[must_use]
pub fn acceptance_blockers(snapshot: &WorkflowSnapshot, report: &StageReport) -> Vec<String> {
    let mut blockers = Vec::new();

    for stage in AcceptanceStage::ALL {
        let status = report.status(stage);
        if status.required && !status.complete {
            let unmet = stage_blockers(stage, snapshot);
            if unmet.is_empty() {
                blockers.push(format!(
                    "{} is waiting on the preceding stages",
                    stage.label()
                ));
            } else {
                blockers.extend(unmet);
            }
        }
    }

    let rejected = snapshot
        .risk_assessment
        .as_ref()
        .is_some_and(|a| a.status == ReviewStatus::PartnerRejected);
    if rejected {
        blockers.push("Partner approval was rejected".to_string());
    }

    blockers
}

// =============================================================================
// TESTS
// =============================================================================
