//! # Independence Declarations
//!
//! Threat assessment and certification for team members' independence
//! declarations.
//!
//! Threats are derived from the declaration form on every save:
//!
//! | Condition                                   | Threat        | Level    |
//! |---------------------------------------------|---------------|----------|
//! | any financial relationship flagged problem  | self_interest | high     |
//! | any personal relationship flagged problem   | familiarity   | moderate |
//! | service-conflict flag set                   | self_review   | moderate |
//!
//! The overall assessment is the most severe emitted threat, `none` when
//! nothing was emitted, and never lower than `low` once anything was.

use crate::error::{AcceptanceError, AcceptanceResult};
use crate::types::{DeclarationId, EngagementId, MemberId, Revision, UnixSeconds};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// THREATS
// =============================================================================

/// Ordinal severity of an independence concern.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    #[default]
    None,
    Low,
    Moderate,
    High,
    Unacceptable,
}

impl ThreatLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Unacceptable => "unacceptable",
        }
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of threat to auditor independence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatType {
    SelfInterest,
    SelfReview,
    Advocacy,
    Familiarity,
    Intimidation,
}

/// A single derived threat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndependenceThreat {
    pub threat_type: ThreatType,
    pub description: String,
    pub level: ThreatLevel,
}

impl IndependenceThreat {
    #[must_use]
    pub fn new(threat_type: ThreatType, description: impl Into<String>, level: ThreatLevel) -> Self {
        Self {
            threat_type,
            description: description.into(),
            level,
        }
    }
}

// =============================================================================
// DECLARED RELATIONSHIPS
// =============================================================================

/// Common view over the declared relationship lists.
pub trait Relationship {
    /// Short label for blocker messages.
    fn label(&self) -> &str;

    fn is_problem(&self) -> bool;

    /// Documented safeguard, if any.
    fn safeguard(&self) -> Option<&str>;

    /// A problem relationship stays unresolved until a safeguard is recorded.
    fn is_unresolved(&self) -> bool {
        self.is_problem() && self.safeguard().is_none_or(|s| s.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinancialRelationship {
    /// Entity the interest is held in.
    pub entity: String,
    /// Nature of the interest (shares, loan, guarantee...).
    pub nature: String,
    pub is_problem: bool,
    pub safeguard: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalRelationship {
    pub person: String,
    pub relationship: String,
    pub position_at_client: String,
    pub is_problem: bool,
    pub safeguard: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NonAuditService {
    pub service: String,
    pub is_problem: bool,
    pub safeguard: Option<String>,
}

impl Relationship for FinancialRelationship {
    fn label(&self) -> &str {
        &self.entity
    }

    fn is_problem(&self) -> bool {
        self.is_problem
    }

    fn safeguard(&self) -> Option<&str> {
        self.safeguard.as_deref()
    }
}

impl Relationship for PersonalRelationship {
    fn label(&self) -> &str {
        &self.person
    }

    fn is_problem(&self) -> bool {
        self.is_problem
    }

    fn safeguard(&self) -> Option<&str> {
        self.safeguard.as_deref()
    }
}

impl Relationship for NonAuditService {
    fn label(&self) -> &str {
        &self.service
    }

    fn is_problem(&self) -> bool {
        self.is_problem
    }

    fn safeguard(&self) -> Option<&str> {
        self.safeguard.as_deref()
    }
}

// =============================================================================
// DECLARATION FORM
// =============================================================================

/// What a team member declares. Threats are derived from this, never stored
/// from client input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeclarationForm {
    pub has_financial_interest: bool,
    pub has_personal_relationship: bool,
    pub has_service_conflict: bool,
    pub has_fee_dependency: bool,
    pub has_other_threat: bool,
    pub other_threat_details: Option<String>,
    pub financial_relationships: Vec<FinancialRelationship>,
    pub personal_relationships: Vec<PersonalRelationship>,
    pub services: Vec<NonAuditService>,
}

impl DeclarationForm {
    /// Names of the raw `has_*` flags that are set.
    #[must_use]
    pub fn raised_flags(&self) -> Vec<&'static str> {
        [
            (self.has_financial_interest, "financial interest"),
            (self.has_personal_relationship, "personal relationship"),
            (self.has_service_conflict, "non-audit service conflict"),
            (self.has_fee_dependency, "fee dependency"),
            (self.has_other_threat, "other threat"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect()
    }

    /// Problem relationships without a documented safeguard.
    #[must_use]
    pub fn unresolved_relationships(&self) -> Vec<String> {
        let financial = self
            .financial_relationships
            .iter()
            .filter(|r| r.is_unresolved())
            .map(|r| format!("financial relationship with '{}'", r.label()));
        let personal = self
            .personal_relationships
            .iter()
            .filter(|r| r.is_unresolved())
            .map(|r| format!("personal relationship with '{}'", r.label()));
        let services = self
            .services
            .iter()
            .filter(|r| r.is_unresolved())
            .map(|r| format!("non-audit service '{}'", r.label()));
        financial.chain(personal).chain(services).collect()
    }
}

/// Derived threats and overall level for a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatAssessment {
    pub threats: Vec<IndependenceThreat>,
    pub overall_assessment: ThreatLevel,
}

/// Derive the threat list from a declaration form.
#[must_use]
pub fn assess(form: &DeclarationForm) -> ThreatAssessment {
    let mut threats = Vec::new();

    if form.financial_relationships.iter().any(|r| r.is_problem) {
        threats.push(IndependenceThreat::new(
            ThreatType::SelfInterest,
            "Financial interest in the client",
            ThreatLevel::High,
        ));
    }
    if form.personal_relationships.iter().any(|r| r.is_problem) {
        threats.push(IndependenceThreat::new(
            ThreatType::Familiarity,
            "Close personal relationship with client personnel",
            ThreatLevel::Moderate,
        ));
    }
    if form.has_service_conflict {
        threats.push(IndependenceThreat::new(
            ThreatType::SelfReview,
            "Non-audit services may lead to reviewing own work",
            ThreatLevel::Moderate,
        ));
    }

    let overall_assessment = overall_level(&threats);
    ThreatAssessment {
        threats,
        overall_assessment,
    }
}

/// Most severe level across threats.
///
/// The `low` floor is unreachable with the current emission rules (every
/// emitted threat is at least `moderate`) but applies to threats added by
/// callers at `none` or `low`.
#[must_use]
pub fn overall_level(threats: &[IndependenceThreat]) -> ThreatLevel {
    match threats.iter().map(|t| t.level).max() {
        None => ThreatLevel::None,
        Some(max) => max.max(ThreatLevel::Low),
    }
}

// =============================================================================
// CERTIFICATION GATE
// =============================================================================

/// What blocks a member from certifying their declaration.
///
/// Both variants block on an `unacceptable` overall assessment and on
/// unresolved problem relationships.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificationGate {
    /// Any raised `has_*` flag also blocks.
    #[default]
    RawFlags,
    /// Only the derived assessment and unresolved relationships block.
    Derived,
}

impl CertificationGate {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RawFlags => "raw-flags",
            Self::Derived => "derived",
        }
    }
}

impl fmt::Display for CertificationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertificationGate {
    type Err = AcceptanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw-flags" | "raw_flags" => Ok(Self::RawFlags),
            "derived" => Ok(Self::Derived),
            other => Err(AcceptanceError::InvalidInput(format!(
                "unknown certification gate '{}', expected raw-flags or derived",
                other
            ))),
        }
    }
}

// =============================================================================
// DECLARATION RECORD
// =============================================================================

/// One declaration per team member per engagement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndependenceDeclaration {
    pub id: DeclarationId,
    pub engagement_id: EngagementId,
    pub member_id: MemberId,
    pub form: DeclarationForm,
    pub threats: Vec<IndependenceThreat>,
    pub overall_assessment: ThreatLevel,
    pub is_certified: bool,
    pub certified_at: Option<UnixSeconds>,
    pub revision: Revision,
}

impl IndependenceDeclaration {
    /// Create an uncertified declaration with derived threats.
    #[must_use]
    pub fn new(engagement_id: EngagementId, member_id: MemberId, form: DeclarationForm) -> Self {
        let assessment = assess(&form);
        Self {
            id: DeclarationId::for_member(&engagement_id, &member_id),
            engagement_id,
            member_id,
            form,
            threats: assessment.threats,
            overall_assessment: assessment.overall_assessment,
            is_certified: false,
            certified_at: None,
            revision: 0,
        }
    }

    /// Replace the form and re-derive threats. Certified declarations are
    /// frozen.
    pub fn update(&mut self, form: DeclarationForm) -> AcceptanceResult<()> {
        if self.is_certified {
            return Err(AcceptanceError::InvariantViolation(format!(
                "declaration {} is certified and can no longer be edited",
                self.id
            )));
        }
        let assessment = assess(&form);
        self.form = form;
        self.threats = assessment.threats;
        self.overall_assessment = assessment.overall_assessment;
        Ok(())
    }

    /// Every reason this declaration cannot be certified under `gate`.
    #[must_use]
    pub fn certification_blockers(&self, gate: CertificationGate) -> Vec<String> {
        let mut blockers = Vec::new();

        if self.overall_assessment == ThreatLevel::Unacceptable {
            blockers.push("Overall independence threat is unacceptable".to_string());
        }
        if gate == CertificationGate::RawFlags {
            for flag in self.form.raised_flags() {
                blockers.push(format!("Declared {} must be cleared", flag));
            }
        }
        for relationship in self.form.unresolved_relationships() {
            blockers.push(format!("Unresolved {}", relationship));
        }

        blockers
    }

    /// Certify the declaration. Certifying twice is a no-op.
    pub fn certify(&mut self, gate: CertificationGate, at: UnixSeconds) -> AcceptanceResult<()> {
        if self.is_certified {
            return Ok(());
        }
        if let Some(err) = AcceptanceError::blocked(self.certification_blockers(gate)) {
            return Err(err);
        }
        self.is_certified = true;
        self.certified_at = Some(at);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn problem_financial() -> FinancialRelationship {
        FinancialRelationship {
            entity: "Client Holdings".to_string(),
            nature: "shares".to_string(),
            is_problem: true,
            safeguard: None,
        }
    }

    fn declaration(form: DeclarationForm) -> IndependenceDeclaration {
        IndependenceDeclaration::new(EngagementId::new("e"), MemberId::new("m"), form)
    }

    #[test]
    fn clean_form_has_no_threats() {
        let result = assess(&DeclarationForm::default());
        assert!(result.threats.is_empty());
        assert_eq!(result.overall_assessment, ThreatLevel::None);
    }

    #[test]
    fn problem_financial_relationship_is_high_self_interest() {
        let form = DeclarationForm {
            financial_relationships: vec![problem_financial()],
            ..DeclarationForm::default()
        };
        let result = assess(&form);

        assert_eq!(result.threats.len(), 1);
        assert_eq!(result.threats[0].threat_type, ThreatType::SelfInterest);
        assert_eq!(result.threats[0].level, ThreatLevel::High);
        assert_eq!(result.overall_assessment, ThreatLevel::High);
    }

    #[test]
    fn unflagged_relationships_emit_nothing() {
        let mut relationship = problem_financial();
        relationship.is_problem = false;
        let form = DeclarationForm {
            has_financial_interest: true,
            financial_relationships: vec![relationship],
            ..DeclarationForm::default()
        };
        assert!(assess(&form).threats.is_empty());
    }

    #[test]
    fn service_flag_emits_self_review_without_flagged_entries() {
        let form = DeclarationForm {
            has_service_conflict: true,
            services: vec![NonAuditService {
                service: "Tax".to_string(),
                is_problem: false,
                safeguard: None,
            }],
            ..DeclarationForm::default()
        };
        let result = assess(&form);
        assert_eq!(result.threats.len(), 1);
        assert_eq!(result.threats[0].threat_type, ThreatType::SelfReview);
        assert_eq!(result.overall_assessment, ThreatLevel::Moderate);
    }

    #[test]
    fn overall_takes_the_maximum() {
        let form = DeclarationForm {
            has_service_conflict: true,
            financial_relationships: vec![problem_financial()],
            personal_relationships: vec![PersonalRelationship {
                person: "Sam".to_string(),
                is_problem: true,
                ..PersonalRelationship::default()
            }],
            ..DeclarationForm::default()
        };
        let result = assess(&form);
        assert_eq!(result.threats.len(), 3);
        assert_eq!(result.overall_assessment, ThreatLevel::High);
    }

    #[test]
    fn overall_floor_is_low_for_minor_threats() {
        let threats = vec![IndependenceThreat::new(
            ThreatType::Advocacy,
            "minor",
            ThreatLevel::None,
        )];
        assert_eq!(overall_level(&threats), ThreatLevel::Low);
    }

    #[test]
    fn raw_flag_blocks_only_under_raw_gate() {
        let decl = declaration(DeclarationForm {
            has_fee_dependency: true,
            ..DeclarationForm::default()
        });
        assert_eq!(decl.overall_assessment, ThreatLevel::None);
        assert_eq!(decl.certification_blockers(CertificationGate::RawFlags).len(), 1);
        assert!(decl.certification_blockers(CertificationGate::Derived).is_empty());
    }

    #[test]
    fn unresolved_problem_blocks_under_both_gates() {
        let mut decl = declaration(DeclarationForm {
            financial_relationships: vec![problem_financial()],
            ..DeclarationForm::default()
        });
        assert!(decl.certify(CertificationGate::Derived, 5).is_err());

        let mut resolved = problem_financial();
        resolved.safeguard = Some("Shares divested before fieldwork".to_string());
        let form = DeclarationForm {
            financial_relationships: vec![resolved],
            ..DeclarationForm::default()
        };
        assert!(decl.update(form).is_ok());
        assert!(decl.certify(CertificationGate::Derived, 5).is_ok());
        assert!(decl.is_certified);
    }

    #[test]
    fn certify_is_idempotent_and_freezes() {
        let mut decl = declaration(DeclarationForm::default());
        assert!(decl.certify(CertificationGate::RawFlags, 5).is_ok());
        assert!(decl.certify(CertificationGate::RawFlags, 9).is_ok());
        assert_eq!(decl.certified_at, Some(5));
        assert!(decl.update(DeclarationForm::default()).is_err());
    }

    #[test]
    fn gate_parses_from_config_names() {
        assert_eq!("raw-flags".parse(), Ok(CertificationGate::RawFlags));
        assert_eq!("derived".parse(), Ok(CertificationGate::Derived));
        assert!("lenient".parse::<CertificationGate>().is_err());
    }
}
