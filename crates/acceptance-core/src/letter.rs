//! # Engagement Letter
//!
//! Strictly forward lifecycle: `draft -> pending_client -> signed`.
//! Terms can only be revised while the letter is a draft; each revision
//! bumps `version`.

use crate::error::{AcceptanceError, AcceptanceResult};
use crate::types::{EngagementId, Revision, UnixSeconds};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LetterStatus {
    #[default]
    Draft,
    PendingClient,
    Signed,
}

/// Commercial terms of the letter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LetterTerms {
    pub scope: String,
    pub fee_basis: String,
    pub deliverables: Vec<String>,
}

/// Client countersignature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSignature {
    pub signed_by: String,
    pub title: String,
    pub organization: String,
    pub signed_at: UnixSeconds,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementLetter {
    pub engagement_id: EngagementId,
    pub status: LetterStatus,
    pub version: u32,
    pub terms: LetterTerms,
    pub sent_at: Option<UnixSeconds>,
    pub signature: Option<ClientSignature>,
    pub revision: Revision,
}

impl EngagementLetter {
    /// First draft, version 1.
    #[must_use]
    pub fn draft(engagement_id: EngagementId, terms: LetterTerms) -> Self {
        Self {
            engagement_id,
            status: LetterStatus::Draft,
            version: 1,
            terms,
            sent_at: None,
            signature: None,
            revision: 0,
        }
    }

    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.status == LetterStatus::Signed
    }

    /// Replace the terms of a draft.
    pub fn revise(&mut self, terms: LetterTerms) -> AcceptanceResult<()> {
        self.require(LetterStatus::Draft, "revise")?;
        if terms != self.terms {
            self.terms = terms;
            self.version = self.version.saturating_add(1);
        }
        Ok(())
    }

    /// `draft -> pending_client`.
    pub fn send_to_client(&mut self, at: UnixSeconds) -> AcceptanceResult<()> {
        self.require(LetterStatus::Draft, "send")?;
        if self.terms.scope.trim().is_empty() {
            return Err(AcceptanceError::InvalidInput(
                "engagement letter needs a scope before it is sent".to_string(),
            ));
        }
        self.status = LetterStatus::PendingClient;
        self.sent_at = Some(at);
        Ok(())
    }

    /// `pending_client -> signed`.
    pub fn record_client_signature(&mut self, signature: ClientSignature) -> AcceptanceResult<()> {
        self.require(LetterStatus::PendingClient, "sign")?;

        let missing: Vec<&str> = [
            ("signed_by", &signature.signed_by),
            ("title", &signature.title),
            ("organization", &signature.organization),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            return Err(AcceptanceError::InvalidInput(format!(
                "client signature is missing: {}",
                missing.join(", ")
            )));
        }

        self.status = LetterStatus::Signed;
        self.signature = Some(signature);
        Ok(())
    }

    fn require(&self, expected: LetterStatus, action: &str) -> AcceptanceResult<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(AcceptanceError::InvariantViolation(format!(
                "cannot {} engagement letter for {} in status {:?}",
                action, self.engagement_id, self.status
            )))
        }
    }
}
