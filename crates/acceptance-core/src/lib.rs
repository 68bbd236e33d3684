//! # Acceptance Core
//!
//! Deterministic engine for the engagement-acceptance workflow of an audit
//! practice: independence declarations, client risk assessment, engagement
//! letter and partner approval.
//!
//! ## Layout
//!
//! ```text
//! risk ─────────┐
//! independence ─┼─► workflow (snapshot) ─► stage (calculator) ─► wizard
//! letter ───────┘          ▲
//!                          │
//!                 store (trait) ◄── storage (memory, redb) ◄── formats
//! ```
//!
//! Everything here is synchronous and side-effect free apart from the
//! stores. Orchestration, logging and transport live in the application
//! crate.

pub mod error;
pub mod formats;
pub mod independence;
pub mod letter;
pub mod risk;
pub mod stage;
pub mod storage;
pub mod store;
pub mod types;
pub mod wizard;
pub mod workflow;

pub use error::{AcceptanceError, AcceptanceResult};
pub use independence::{
    CertificationGate, DeclarationForm, FinancialRelationship, IndependenceDeclaration,
    IndependenceThreat, NonAuditService, PersonalRelationship, ThreatAssessment, ThreatLevel,
    ThreatType,
};
pub use letter::{ClientSignature, EngagementLetter, LetterStatus, LetterTerms};
pub use risk::{
    ClientRiskAssessment, EngagementRisk, FinancialStability, ManagementIntegrity,
    PartnerDecision, Recommendation, ReviewStatus, RiskAssessmentForm, RiskCategory, RiskSection,
};
pub use stage::{StageReport, StageStatus};
pub use storage::{MemoryStore, RedbStore};
pub use store::AcceptanceStore;
pub use types::{
    AcceptanceStage, DeclarationId, EngagementId, MemberId, Revision, TeamMember, TeamRole,
    UnixSeconds,
};
pub use wizard::Wizard;
pub use workflow::{AcceptanceWorkflow, WorkflowSnapshot};
