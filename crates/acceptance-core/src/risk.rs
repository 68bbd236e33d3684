//! # Client Risk Assessment
//!
//! Categorical risk ratings, the risk category aggregator, and the client
//! risk assessment record with its review lifecycle.
//!
//! ## Aggregation rule
//!
//! Ratings map to ordinal scores `low=0, moderate=1, high=2, unacceptable=3`.
//!
//! 1. Any `unacceptable` rating makes the aggregate `unacceptable`.
//! 2. Otherwise any `high` rating, or a mean score `>= 1.5`, gives `high`.
//! 3. Otherwise a mean score `>= 0.5` gives `moderate`.
//! 4. Otherwise `low`.
//!
//! The mean is never materialised: `mean >= 1.5` is evaluated as
//! `2 * sum >= 3 * n` and `mean >= 0.5` as `2 * sum >= n`, keeping the
//! crate free of floating point.

use crate::error::{AcceptanceError, AcceptanceResult};
use crate::types::{EngagementId, MemberId, Revision, UnixSeconds};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// RISK CATEGORY
// =============================================================================

/// Ordinal severity of a client or engagement risk factor.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    #[default]
    Low,
    Moderate,
    High,
    Unacceptable,
}

impl RiskCategory {
    /// Ordinal score used by the aggregator.
    #[must_use]
    pub fn score(self) -> u64 {
        match self {
            Self::Low => 0,
            Self::Moderate => 1,
            Self::High => 2,
            Self::Unacceptable => 3,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Unacceptable => "unacceptable",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reduce a list of ratings into one overall rating.
///
/// Fails with `InvalidInput` on an empty list rather than defaulting to `low`.
pub fn aggregate(ratings: &[RiskCategory]) -> AcceptanceResult<RiskCategory> {
    if ratings.is_empty() {
        return Err(AcceptanceError::InvalidInput(
            "cannot aggregate an empty list of risk ratings".to_string(),
        ));
    }

    if ratings.contains(&RiskCategory::Unacceptable) {
        return Ok(RiskCategory::Unacceptable);
    }

    let count = ratings.len() as u64;
    let sum: u64 = ratings.iter().map(|r| r.score()).sum();
    let doubled = sum.saturating_mul(2);

    if ratings.contains(&RiskCategory::High) || doubled >= count.saturating_mul(3) {
        Ok(RiskCategory::High)
    } else if doubled >= count {
        Ok(RiskCategory::Moderate)
    } else {
        Ok(RiskCategory::Low)
    }
}

// =============================================================================
// ASSESSMENT SECTIONS
// =============================================================================

/// A group of categorical risk fields with a derived overall rating.
pub trait RiskSection {
    /// Constituent ratings in field order. Never empty.
    fn ratings(&self) -> Vec<RiskCategory>;

    /// The stored overall rating.
    fn overall(&self) -> RiskCategory;

    fn set_overall(&mut self, overall: RiskCategory);

    /// Recompute the overall rating from the constituent fields.
    fn recompute(&mut self) -> AcceptanceResult<RiskCategory> {
        let overall = aggregate(&self.ratings())?;
        self.set_overall(overall);
        Ok(overall)
    }
}

/// Integrity and track record of client management.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagementIntegrity {
    pub reputation: RiskCategory,
    pub regulatory_history: RiskCategory,
    pub litigation_history: RiskCategory,
    pub governance_quality: RiskCategory,
    pub overall_assessment: RiskCategory,
}

impl RiskSection for ManagementIntegrity {
    fn ratings(&self) -> Vec<RiskCategory> {
        vec![
            self.reputation,
            self.regulatory_history,
            self.litigation_history,
            self.governance_quality,
        ]
    }

    fn overall(&self) -> RiskCategory {
        self.overall_assessment
    }

    fn set_overall(&mut self, overall: RiskCategory) {
        self.overall_assessment = overall;
    }
}

/// Financial health of the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinancialStability {
    pub going_concern: RiskCategory,
    pub profitability: RiskCategory,
    pub liquidity: RiskCategory,
    pub leverage: RiskCategory,
    pub overall_assessment: RiskCategory,
}

impl RiskSection for FinancialStability {
    fn ratings(&self) -> Vec<RiskCategory> {
        vec![
            self.going_concern,
            self.profitability,
            self.liquidity,
            self.leverage,
        ]
    }

    fn overall(&self) -> RiskCategory {
        self.overall_assessment
    }

    fn set_overall(&mut self, overall: RiskCategory) {
        self.overall_assessment = overall;
    }
}

/// Risk inherent to the engagement itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementRisk {
    pub complexity: RiskCategory,
    pub industry_risk: RiskCategory,
    pub fraud_risk: RiskCategory,
    pub related_party_risk: RiskCategory,
    pub deadline_pressure: RiskCategory,
    pub overall_assessment: RiskCategory,
}

impl RiskSection for EngagementRisk {
    fn ratings(&self) -> Vec<RiskCategory> {
        vec![
            self.complexity,
            self.industry_risk,
            self.fraud_risk,
            self.related_party_risk,
            self.deadline_pressure,
        ]
    }

    fn overall(&self) -> RiskCategory {
        self.overall_assessment
    }

    fn set_overall(&mut self, overall: RiskCategory) {
        self.overall_assessment = overall;
    }
}

// =============================================================================
// RECOMMENDATION AND REVIEW
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Accept,
    AcceptWithConditions,
    Decline,
}

/// Review lifecycle of a risk assessment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    Draft,
    SubmittedForReview,
    PartnerApproved,
    PartnerRejected,
}

impl ReviewStatus {
    /// Only drafts may be edited. A partner decision, either way, is final
    /// for the assessment it was made on.
    #[must_use]
    pub fn is_editable(self) -> bool {
        self == Self::Draft
    }
}

/// A recorded partner approval decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerDecision {
    pub partner: MemberId,
    pub approved: bool,
    pub notes: String,
    pub decided_at: UnixSeconds,
}

// =============================================================================
// CLIENT RISK ASSESSMENT
// =============================================================================

/// Editable portion of a risk assessment, as submitted by the form.
///
/// Derived fields (section overalls, overall risk) are absent on purpose;
/// they are always recomputed on save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskAssessmentForm {
    pub management_integrity: ManagementIntegrity,
    pub financial_stability: FinancialStability,
    pub engagement_risk: EngagementRisk,
    pub recommendation: Option<Recommendation>,
    pub conditions: Vec<String>,
    pub decline_reason: Option<String>,
    /// Revision the form was loaded at (`0` for a new assessment).
    pub revision: Revision,
}

/// One client risk assessment per engagement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRiskAssessment {
    pub engagement_id: EngagementId,
    pub management_integrity: ManagementIntegrity,
    pub financial_stability: FinancialStability,
    pub engagement_risk: EngagementRisk,
    /// Aggregate of the three section overalls.
    pub overall_risk: RiskCategory,
    pub recommendation: Option<Recommendation>,
    pub conditions: Vec<String>,
    pub decline_reason: Option<String>,
    pub status: ReviewStatus,
    pub submitted_at: Option<UnixSeconds>,
    pub partner_decision: Option<PartnerDecision>,
    pub revision: Revision,
}

impl ClientRiskAssessment {
    /// A blank draft with every factor rated `low`.
    #[must_use]
    pub fn new(engagement_id: EngagementId) -> Self {
        Self {
            engagement_id,
            management_integrity: ManagementIntegrity::default(),
            financial_stability: FinancialStability::default(),
            engagement_risk: EngagementRisk::default(),
            overall_risk: RiskCategory::Low,
            recommendation: None,
            conditions: Vec::new(),
            decline_reason: None,
            status: ReviewStatus::Draft,
            submitted_at: None,
            partner_decision: None,
            revision: 0,
        }
    }

    /// Recompute every derived rating from the constituent fields.
    ///
    /// Previously stored aggregates are ignored.
    pub fn recompute(&mut self) -> AcceptanceResult<RiskCategory> {
        let sections = [
            self.management_integrity.recompute()?,
            self.financial_stability.recompute()?,
            self.engagement_risk.recompute()?,
        ];
        self.overall_risk = aggregate(&sections)?;
        Ok(self.overall_risk)
    }

    /// Apply an edited form to a draft and recompute every aggregate.
    pub fn apply_form(&mut self, form: RiskAssessmentForm) -> AcceptanceResult<()> {
        if !self.status.is_editable() {
            return Err(AcceptanceError::InvariantViolation(format!(
                "risk assessment for {} cannot be edited while {:?}",
                self.engagement_id, self.status
            )));
        }

        self.management_integrity = form.management_integrity;
        self.financial_stability = form.financial_stability;
        self.engagement_risk = form.engagement_risk;
        self.recommendation = form.recommendation;
        self.conditions = form
            .conditions
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        self.decline_reason = form
            .decline_reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        self.revision = form.revision;
        self.recompute()?;
        Ok(())
    }

    /// Unmet conditions for "recommendation recorded".
    #[must_use]
    pub fn recommendation_blockers(&self) -> Vec<String> {
        let mut blockers = Vec::new();
        match self.recommendation {
            None => blockers.push("Acceptance recommendation has not been recorded".to_string()),
            Some(Recommendation::Accept) => {}
            Some(Recommendation::AcceptWithConditions) => {
                if self.conditions.is_empty() {
                    blockers.push(
                        "Conditions must be listed when accepting with conditions".to_string(),
                    );
                }
            }
            Some(Recommendation::Decline) => {
                if self.decline_reason.as_deref().is_none_or(str::is_empty) {
                    blockers.push("A reason must be given when declining".to_string());
                }
            }
        }
        blockers
    }

    /// Whether a complete recommendation is on record.
    #[must_use]
    pub fn has_recommendation(&self) -> bool {
        self.recommendation_blockers().is_empty()
    }

    /// Partner sign-off is needed unless the recommendation is a plain
    /// `accept` of a client whose overall risk is below `high`.
    #[must_use]
    pub fn partner_approval_required(&self) -> bool {
        self.recommendation != Some(Recommendation::Accept)
            || self.overall_risk >= RiskCategory::High
    }

    /// Move a complete draft into partner review.
    pub fn submit_for_review(&mut self, at: UnixSeconds) -> AcceptanceResult<()> {
        if self.status != ReviewStatus::Draft {
            return Err(AcceptanceError::InvariantViolation(format!(
                "only draft assessments can be submitted, current status is {:?}",
                self.status
            )));
        }
        if let Some(err) = AcceptanceError::blocked(self.recommendation_blockers()) {
            return Err(err);
        }
        self.status = ReviewStatus::SubmittedForReview;
        self.submitted_at = Some(at);
        Ok(())
    }

    /// Record the partner's decision on a submitted assessment.
    pub fn record_partner_decision(&mut self, decision: PartnerDecision) -> AcceptanceResult<()> {
        if self.status != ReviewStatus::SubmittedForReview {
            return Err(AcceptanceError::InvariantViolation(format!(
                "partner decisions require a submitted assessment, current status is {:?}",
                self.status
            )));
        }
        if !decision.approved && decision.notes.trim().is_empty() {
            return Err(AcceptanceError::InvalidInput(
                "a rejection must explain itself in the notes".to_string(),
            ));
        }
        self.status = if decision.approved {
            ReviewStatus::PartnerApproved
        } else {
            ReviewStatus::PartnerRejected
        };
        self.partner_decision = Some(decision);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
