//! # Acceptance Workflow
//!
//! The per-engagement marker record and the snapshot projection the stage
//! calculator evaluates.
//!
//! There is no explicit "create workflow" step: the workflow of an
//! engagement is whatever its stage records say. The marker record only
//! appears once a stage is marked complete, and a missing record reads as
//! an all-false workflow.

use crate::error::AcceptanceResult;
use crate::independence::IndependenceDeclaration;
use crate::letter::EngagementLetter;
use crate::risk::ClientRiskAssessment;
use crate::store::AcceptanceStore;
use crate::types::{AcceptanceStage, EngagementId, MemberId, Revision, TeamMember, UnixSeconds};
use serde::{Deserialize, Serialize};

// =============================================================================
// MARKER RECORD
// =============================================================================

/// Sticky completion markers for one engagement.
///
/// Markers only ever go from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceWorkflow {
    pub engagement_id: EngagementId,
    pub independence_check: bool,
    pub risk_assessment: bool,
    pub engagement_letter: bool,
    pub partner_approval: bool,
    /// Set by the explicit completion action; terminal.
    pub completed_at: Option<UnixSeconds>,
    pub revision: Revision,
}

impl AcceptanceWorkflow {
    #[must_use]
    pub fn new(engagement_id: EngagementId) -> Self {
        Self {
            engagement_id,
            independence_check: false,
            risk_assessment: false,
            engagement_letter: false,
            partner_approval: false,
            completed_at: None,
            revision: 0,
        }
    }

    #[must_use]
    pub fn is_marked(&self, stage: AcceptanceStage) -> bool {
        match stage {
            AcceptanceStage::IndependenceCheck => self.independence_check,
            AcceptanceStage::RiskAssessment => self.risk_assessment,
            AcceptanceStage::EngagementLetter => self.engagement_letter,
            AcceptanceStage::PartnerApproval => self.partner_approval,
        }
    }

    /// Set a marker. Returns `true` if it was not set before.
    pub fn mark(&mut self, stage: AcceptanceStage) -> bool {
        let slot = match stage {
            AcceptanceStage::IndependenceCheck => &mut self.independence_check,
            AcceptanceStage::RiskAssessment => &mut self.risk_assessment,
            AcceptanceStage::EngagementLetter => &mut self.engagement_letter,
            AcceptanceStage::PartnerApproval => &mut self.partner_approval,
        };
        let newly = !*slot;
        *slot = true;
        newly
    }

    /// Whether the explicit completion action has run.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

// =============================================================================
// SNAPSHOT PROJECTION
// =============================================================================

/// Everything stored for one engagement, fetched in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub workflow: AcceptanceWorkflow,
    pub team: Vec<TeamMember>,
    pub declarations: Vec<IndependenceDeclaration>,
    pub risk_assessment: Option<ClientRiskAssessment>,
    pub letter: Option<EngagementLetter>,
}

impl WorkflowSnapshot {
    /// An engagement with nothing stored yet.
    #[must_use]
    pub fn empty(engagement_id: EngagementId) -> Self {
        Self {
            workflow: AcceptanceWorkflow::new(engagement_id),
            team: Vec::new(),
            declarations: Vec::new(),
            risk_assessment: None,
            letter: None,
        }
    }

    /// Materialise the snapshot from a store.
    pub fn load<S>(store: &S, engagement: &EngagementId) -> AcceptanceResult<Self>
    where
        S: AcceptanceStore + ?Sized,
    {
        let workflow = store
            .fetch_workflow(engagement)?
            .unwrap_or_else(|| AcceptanceWorkflow::new(engagement.clone()));

        Ok(Self {
            workflow,
            team: store.fetch_team(engagement)?,
            declarations: store.fetch_independence_declarations(engagement)?,
            risk_assessment: store.fetch_risk_assessment(engagement)?,
            letter: store.fetch_engagement_letter(engagement)?,
        })
    }

    #[must_use]
    pub fn engagement_id(&self) -> &EngagementId {
        &self.workflow.engagement_id
    }

    #[must_use]
    pub fn member(&self, id: &MemberId) -> Option<&TeamMember> {
        self.team.iter().find(|m| &m.id == id)
    }

    #[must_use]
    pub fn declaration_of(&self, member: &MemberId) -> Option<&IndependenceDeclaration> {
        self.declarations.iter().find(|d| &d.member_id == member)
    }

    /// Whether stage 4 must be passed.
    ///
    /// Until a risk assessment exists the answer is unknown, so approval is
    /// treated as required.
    #[must_use]
    pub fn partner_approval_required(&self) -> bool {
        self.risk_assessment
            .as_ref()
            .map(ClientRiskAssessment::partner_approval_required)
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::Recommendation;

    #[test]
    fn mark_is_idempotent() {
        let mut workflow = AcceptanceWorkflow::new(EngagementId::new("e"));
        assert!(workflow.mark(AcceptanceStage::RiskAssessment));
        assert!(!workflow.mark(AcceptanceStage::RiskAssessment));
        assert!(workflow.is_marked(AcceptanceStage::RiskAssessment));
        assert!(!workflow.is_marked(AcceptanceStage::IndependenceCheck));
    }

    #[test]
    fn approval_required_until_assessed() {
        let mut snapshot = WorkflowSnapshot::empty(EngagementId::new("e"));
        assert!(snapshot.partner_approval_required());

        let mut assessment = ClientRiskAssessment::new(EngagementId::new("e"));
        assessment.recommendation = Some(Recommendation::Accept);
        snapshot.risk_assessment = Some(assessment);
        assert!(!snapshot.partner_approval_required());
    }
}
