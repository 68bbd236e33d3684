//! # Core Types
//!
//! Identifiers, team roster entries and the ordered acceptance stages.
//!
//! All identifiers are opaque strings supplied by the surrounding
//! application (typically UUIDs). Ordering is derived so every collection
//! keyed by them iterates deterministically.

use crate::error::{AcceptanceError, AcceptanceResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unix timestamp in whole seconds. The core never reads the clock itself.
pub type UnixSeconds = u64;

/// Optimistic-concurrency token carried by every persisted record.
///
/// `0` means "never stored".
pub type Revision = u64;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of an engagement (audit) under acceptance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngagementId(pub String);

/// Identifier of a team member.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub String);

/// Identifier of an independence declaration.
///
/// There is exactly one declaration per member per engagement, so the id is
/// derived from that pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeclarationId(pub String);

impl EngagementId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Reject blank ids and ids containing [`DeclarationId::SEPARATOR`].
    ///
    /// Declaration keys are `"{engagement}:{member}"`, so an engagement id
    /// holding the separator would share a key range with another
    /// engagement.
    pub fn validate(&self) -> AcceptanceResult<()> {
        if self.0.trim().is_empty() {
            return Err(AcceptanceError::InvalidInput(
                "engagement id may not be empty".to_string(),
            ));
        }
        if self.0.contains(DeclarationId::SEPARATOR) {
            return Err(AcceptanceError::InvalidInput(format!(
                "engagement id '{}' may not contain '{}'",
                self.0,
                DeclarationId::SEPARATOR
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl MemberId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl DeclarationId {
    /// Separator between engagement and member in a derived declaration id.
    pub const SEPARATOR: char = ':';

    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the declaration id for a member on an engagement.
    #[must_use]
    pub fn for_member(engagement: &EngagementId, member: &MemberId) -> Self {
        Self(format!("{}{}{}", engagement.0, Self::SEPARATOR, member.0))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EngagementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DeclarationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// TEAM ROSTER
// =============================================================================

/// Role of a member on the engagement team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    Partner,
    Manager,
    Senior,
    Staff,
}

/// A member assigned to an engagement team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: MemberId,
    pub name: String,
    pub role: TeamRole,
}

impl TeamMember {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: TeamRole) -> Self {
        Self {
            id: MemberId::new(id),
            name: name.into(),
            role,
        }
    }

    /// Partners are the only members allowed to record an approval decision.
    #[must_use]
    pub fn is_partner(&self) -> bool {
        self.role == TeamRole::Partner
    }
}

// =============================================================================
// ACCEPTANCE STAGES
// =============================================================================

/// The four ordered phases of engagement acceptance.
///
/// Declaration order is the workflow order; `Ord` follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceStage {
    IndependenceCheck,
    RiskAssessment,
    EngagementLetter,
    PartnerApproval,
}

impl AcceptanceStage {
    /// All stages in workflow order.
    pub const ALL: [AcceptanceStage; 4] = [
        AcceptanceStage::IndependenceCheck,
        AcceptanceStage::RiskAssessment,
        AcceptanceStage::EngagementLetter,
        AcceptanceStage::PartnerApproval,
    ];

    /// Zero-based position in the workflow.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::IndependenceCheck => 0,
            Self::RiskAssessment => 1,
            Self::EngagementLetter => 2,
            Self::PartnerApproval => 3,
        }
    }

    /// The stage that follows this one, if any.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Wire name, identical to the serde representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IndependenceCheck => "independence_check",
            Self::RiskAssessment => "risk_assessment",
            Self::EngagementLetter => "engagement_letter",
            Self::PartnerApproval => "partner_approval",
        }
    }

    /// Human-readable label used in blocker messages.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::IndependenceCheck => "Independence check",
            Self::RiskAssessment => "Client risk assessment",
            Self::EngagementLetter => "Engagement letter",
            Self::PartnerApproval => "Partner approval",
        }
    }
}

impl fmt::Display for AcceptanceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AcceptanceStage {
    type Err = AcceptanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| AcceptanceError::InvalidInput(format!("unknown stage '{}'", s)))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered() {
        let mut sorted = AcceptanceStage::ALL;
        sorted.sort();
        assert_eq!(sorted, AcceptanceStage::ALL);
        assert_eq!(AcceptanceStage::PartnerApproval.index(), 3);
    }

    #[test]
    fn next_walks_the_chain() {
        assert_eq!(
            AcceptanceStage::IndependenceCheck.next(),
            Some(AcceptanceStage::RiskAssessment)
        );
        assert_eq!(AcceptanceStage::PartnerApproval.next(), None);
    }

    #[test]
    fn stage_names_parse_back() {
        for stage in AcceptanceStage::ALL {
            assert_eq!(stage.as_str().parse::<AcceptanceStage>(), Ok(stage));
        }
        assert!("closing".parse::<AcceptanceStage>().is_err());
    }

    #[test]
    fn declaration_id_is_derived_from_member() {
        let id = DeclarationId::for_member(&EngagementId::new("eng-1"), &MemberId::new("m-7"));
        assert_eq!(id.as_str(), "eng-1:m-7");
    }

    #[test]
    fn engagement_ids_cannot_contain_the_key_separator() {
        assert!(EngagementId::new("acme-2025").validate().is_ok());
        assert!(matches!(
            EngagementId::new("acme:2025").validate(),
            Err(AcceptanceError::InvalidInput(_))
        ));
        assert!(EngagementId::new("  ").validate().is_err());
    }
}
