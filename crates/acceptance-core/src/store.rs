//! # AcceptanceStore Trait
//!
//! The persistence boundary of the acceptance workflow.
//!
//! Every record carries a [`Revision`]. Saving presents the revision the
//! record was read at; the store rejects the write with
//! [`AcceptanceError::Conflict`] if someone else saved in between, and
//! returns the new revision otherwise. Team rosters are plain
//! last-write-wins administrative data.

use crate::error::{AcceptanceError, AcceptanceResult};
use crate::independence::IndependenceDeclaration;
use crate::letter::EngagementLetter;
use crate::risk::ClientRiskAssessment;
use crate::types::{DeclarationId, EngagementId, Revision, TeamMember};
use crate::workflow::AcceptanceWorkflow;

// =============================================================================
// VERSIONED RECORDS
// =============================================================================

/// A record guarded by optimistic concurrency.
pub trait Versioned {
    /// Record kind used in error messages.
    const KIND: &'static str;

    /// Storage key of this record.
    fn key(&self) -> String;

    fn revision(&self) -> Revision;

    fn set_revision(&mut self, revision: Revision);
}

/// Validate a presented revision against the stored one and return the
/// revision the write will be stored at.
pub fn next_revision(
    kind: &'static str,
    id: &str,
    presented: Revision,
    stored: Option<Revision>,
) -> AcceptanceResult<Revision> {
    let stored = stored.unwrap_or(0);
    if presented != stored {
        return Err(AcceptanceError::Conflict {
            kind,
            id: id.to_string(),
            presented,
            stored,
        });
    }
    Ok(stored.saturating_add(1))
}

/// Key prefix grouping all declarations of an engagement.
#[must_use]
pub fn declaration_prefix(engagement: &EngagementId) -> String {
    format!("{}{}", engagement.0, DeclarationId::SEPARATOR)
}

impl Versioned for AcceptanceWorkflow {
    const KIND: &'static str = "workflow";

    fn key(&self) -> String {
        self.engagement_id.0.clone()
    }

    fn revision(&self) -> Revision {
        self.revision
    }

    fn set_revision(&mut self, revision: Revision) {
        self.revision = revision;
    }
}

impl Versioned for IndependenceDeclaration {
    const KIND: &'static str = "independence declaration";

    fn key(&self) -> String {
        self.id.0.clone()
    }

    fn revision(&self) -> Revision {
        self.revision
    }

    fn set_revision(&mut self, revision: Revision) {
        self.revision = revision;
    }
}

impl Versioned for ClientRiskAssessment {
    const KIND: &'static str = "risk assessment";

    fn key(&self) -> String {
        self.engagement_id.0.clone()
    }

    fn revision(&self) -> Revision {
        self.revision
    }

    fn set_revision(&mut self, revision: Revision) {
        self.revision = revision;
    }
}

impl Versioned for EngagementLetter {
    const KIND: &'static str = "engagement letter";

    fn key(&self) -> String {
        self.engagement_id.0.clone()
    }

    fn revision(&self) -> Revision {
        self.revision
    }

    fn set_revision(&mut self, revision: Revision) {
        self.revision = revision;
    }
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Reads and writes of the acceptance records of all engagements.
///
/// Fetches return `Ok(None)` / empty collections for records that were
/// never saved. Saves return the revision the record now has.
pub trait AcceptanceStore {
    fn fetch_workflow(&self, engagement: &EngagementId)
    -> AcceptanceResult<Option<AcceptanceWorkflow>>;

    fn save_workflow(&mut self, workflow: &AcceptanceWorkflow) -> AcceptanceResult<Revision>;

    fn fetch_team(&self, engagement: &EngagementId) -> AcceptanceResult<Vec<TeamMember>>;

    fn save_team(&mut self, engagement: &EngagementId, members: &[TeamMember])
    -> AcceptanceResult<()>;

    /// All declarations of an engagement, ordered by declaration id.
    fn fetch_independence_declarations(
        &self,
        engagement: &EngagementId,
    ) -> AcceptanceResult<Vec<IndependenceDeclaration>>;

    fn fetch_independence_declaration(
        &self,
        id: &DeclarationId,
    ) -> AcceptanceResult<Option<IndependenceDeclaration>>;

    fn save_independence_declaration(
        &mut self,
        declaration: &IndependenceDeclaration,
    ) -> AcceptanceResult<Revision>;

    fn fetch_risk_assessment(
        &self,
        engagement: &EngagementId,
    ) -> AcceptanceResult<Option<ClientRiskAssessment>>;

    fn save_risk_assessment(
        &mut self,
        assessment: &ClientRiskAssessment,
    ) -> AcceptanceResult<Revision>;

    fn fetch_engagement_letter(
        &self,
        engagement: &EngagementId,
    ) -> AcceptanceResult<Option<EngagementLetter>>;

    fn save_engagement_letter(&mut self, letter: &EngagementLetter) -> AcceptanceResult<Revision>;

    /// Every engagement with at least one stored record, in id order.
    fn list_engagements(&self) -> AcceptanceResult<Vec<EngagementId>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_record_must_present_zero() {
        assert_eq!(next_revision("x", "1", 0, None), Ok(1));
        assert!(matches!(
            next_revision("x", "1", 3, None),
            Err(AcceptanceError::Conflict { stored: 0, .. })
        ));
    }

    #[test]
    fn stale_revision_conflicts() {
        assert_eq!(next_revision("x", "1", 4, Some(4)), Ok(5));
        assert!(next_revision("x", "1", 3, Some(4)).is_err());
    }
}
