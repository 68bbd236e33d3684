//! # Acceptance Orchestrator
//!
//! The only component with side effects. Every operation runs
//! "load snapshot, apply transition, write" while holding the store lock,
//! so two requests against the same process never interleave their reads
//! and writes. Records additionally carry revisions, so a client editing
//! from a stale copy gets a `Conflict` instead of silently overwriting.
//!
//! Store access is synchronous (redb commits fsync), so it runs on tokio's
//! blocking pool. An in-flight commit suspends only the handler waiting on
//! it; the async workers stay free.
//!
//! After every successful mutation the orchestrator re-evaluates the
//! workflow and persists a marker for each required stage it observes
//! complete. Markers are never cleared. Reads never write.

use acceptance_core::stage::{evaluate, stage_blockers};
use acceptance_core::{
    AcceptanceError, AcceptanceResult, AcceptanceStage, AcceptanceStore, CertificationGate,
    ClientRiskAssessment, ClientSignature, DeclarationForm, DeclarationId, EngagementId,
    EngagementLetter, IndependenceDeclaration, LetterTerms, MemberId, PartnerDecision, Revision,
    RiskAssessmentForm, StageReport, TeamMember, UnixSeconds, Wizard, WorkflowSnapshot,
};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{Span, error, info, warn};

type DynStore = dyn AcceptanceStore + Send;

/// Wall clock in unix seconds.
pub fn system_clock() -> UnixSeconds {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Clone)]
pub struct AcceptanceOrchestrator {
    store: Arc<Mutex<Box<DynStore>>>,
    gate: CertificationGate,
    clock: fn() -> UnixSeconds,
}

impl std::fmt::Debug for AcceptanceOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcceptanceOrchestrator")
            .field("gate", &self.gate)
            .finish()
    }
}

impl AcceptanceOrchestrator {
    pub fn new<S>(store: S, gate: CertificationGate) -> Self
    where
        S: AcceptanceStore + Send + 'static,
    {
        Self {
            store: Arc::new(Mutex::new(Box::new(store))),
            gate,
            clock: system_clock,
        }
    }

    /// Replace the clock. Tests use this to get stable timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> UnixSeconds) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn gate(&self) -> CertificationGate {
        self.gate
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Evaluate the workflow from the stored records.
    pub async fn status(&self, engagement: &EngagementId) -> AcceptanceResult<StageReport> {
        self.read(engagement, |store, engagement| {
            Ok(evaluate(&WorkflowSnapshot::load(store, engagement)?))
        })
        .await
    }

    /// Everything stored for the engagement.
    pub async fn snapshot(&self, engagement: &EngagementId) -> AcceptanceResult<WorkflowSnapshot> {
        self.read(engagement, |store, engagement| {
            WorkflowSnapshot::load(store, engagement)
        })
        .await
    }

    pub async fn list_engagements(&self) -> AcceptanceResult<Vec<EngagementId>> {
        self.with_store(|store| store.list_engagements()).await
    }

    pub async fn fetch_declarations(
        &self,
        engagement: &EngagementId,
    ) -> AcceptanceResult<Vec<IndependenceDeclaration>> {
        self.read(engagement, |store, engagement| {
            store.fetch_independence_declarations(engagement)
        })
        .await
    }

    pub async fn fetch_risk_assessment(
        &self,
        engagement: &EngagementId,
    ) -> AcceptanceResult<Option<ClientRiskAssessment>> {
        self.read(engagement, |store, engagement| {
            store.fetch_risk_assessment(engagement)
        })
        .await
    }

    pub async fn fetch_letter(
        &self,
        engagement: &EngagementId,
    ) -> AcceptanceResult<Option<EngagementLetter>> {
        self.read(engagement, |store, engagement| {
            store.fetch_engagement_letter(engagement)
        })
        .await
    }

    // =========================================================================
    // TEAM
    // =========================================================================

    /// Replace the engagement roster.
    pub async fn save_team(
        &self,
        engagement: &EngagementId,
        members: Vec<TeamMember>,
    ) -> AcceptanceResult<Vec<TeamMember>> {
        validate_team(&members)?;
        self.mutate(
            engagement,
            AcceptanceStage::IndependenceCheck,
            "save team",
            move |store, snapshot, _| {
                let engagement = snapshot.engagement_id();
                store.save_team(engagement, &members)?;
                info!(engagement = %engagement, members = members.len(), "team saved");
                Ok(members)
            },
        )
        .await
    }

    // =========================================================================
    // STAGE 1: INDEPENDENCE
    // =========================================================================

    /// Create or update a member's declaration. Threats are always
    /// re-derived from the submitted form.
    pub async fn save_declaration(
        &self,
        engagement: &EngagementId,
        member: &MemberId,
        form: DeclarationForm,
        revision: Revision,
    ) -> AcceptanceResult<IndependenceDeclaration> {
        let member = member.clone();
        self.mutate(
            engagement,
            AcceptanceStage::IndependenceCheck,
            "save declaration",
            move |store, snapshot, _| {
                let engagement = snapshot.engagement_id();
                if snapshot.member(&member).is_none() {
                    return Err(AcceptanceError::NotFound {
                        kind: "team member",
                        id: member.to_string(),
                    });
                }

                let id = DeclarationId::for_member(engagement, &member);
                let mut declaration = match store.fetch_independence_declaration(&id)? {
                    Some(mut existing) => {
                        existing.revision = revision;
                        existing.update(form)?;
                        existing
                    }
                    None => {
                        let mut fresh =
                            IndependenceDeclaration::new(engagement.clone(), member.clone(), form);
                        fresh.revision = revision;
                        fresh
                    }
                };
                declaration.revision = store.save_independence_declaration(&declaration)?;

                info!(
                    engagement = %engagement,
                    member = %member,
                    threats = declaration.threats.len(),
                    overall = %declaration.overall_assessment,
                    "declaration saved"
                );
                Ok(declaration)
            },
        )
        .await
    }

    /// Certify a declaration under the configured gate.
    pub async fn certify_independence(
        &self,
        engagement: &EngagementId,
        declaration: &DeclarationId,
    ) -> AcceptanceResult<IndependenceDeclaration> {
        let gate = self.gate;
        let declaration = declaration.clone();
        self.mutate(
            engagement,
            AcceptanceStage::IndependenceCheck,
            "certify declaration",
            move |store, snapshot, now| {
                let engagement = snapshot.engagement_id();
                let mut record = store
                    .fetch_independence_declaration(&declaration)?
                    .filter(|d| &d.engagement_id == engagement)
                    .ok_or_else(|| AcceptanceError::NotFound {
                        kind: "independence declaration",
                        id: declaration.to_string(),
                    })?;

                if record.is_certified {
                    return Ok(record);
                }
                record.certify(gate, now)?;
                record.revision = store.save_independence_declaration(&record)?;

                info!(
                    engagement = %engagement,
                    declaration = %declaration,
                    gate = %gate,
                    "declaration certified"
                );
                Ok(record)
            },
        )
        .await
    }

    // =========================================================================
    // STAGE 2: RISK ASSESSMENT
    // =========================================================================

    /// Save the form; aggregates are recomputed before anything is written.
    pub async fn save_risk_assessment(
        &self,
        engagement: &EngagementId,
        form: RiskAssessmentForm,
    ) -> AcceptanceResult<ClientRiskAssessment> {
        self.mutate(
            engagement,
            AcceptanceStage::RiskAssessment,
            "save risk assessment",
            move |store, snapshot, _| {
                let engagement = snapshot.engagement_id();
                let mut assessment = snapshot
                    .risk_assessment
                    .clone()
                    .unwrap_or_else(|| ClientRiskAssessment::new(engagement.clone()));
                assessment.apply_form(form)?;
                assessment.revision = store.save_risk_assessment(&assessment)?;

                info!(
                    engagement = %engagement,
                    overall_risk = %assessment.overall_risk,
                    approval_required = assessment.partner_approval_required(),
                    "risk assessment saved"
                );
                Ok(assessment)
            },
        )
        .await
    }

    pub async fn submit_risk_assessment_for_review(
        &self,
        engagement: &EngagementId,
    ) -> AcceptanceResult<ClientRiskAssessment> {
        self.mutate(
            engagement,
            AcceptanceStage::RiskAssessment,
            "submit risk assessment",
            |store, snapshot, now| {
                let mut assessment = require_assessment(snapshot)?;
                assessment.submit_for_review(now)?;
                assessment.revision = store.save_risk_assessment(&assessment)?;
                info!(
                    engagement = %snapshot.engagement_id(),
                    "risk assessment submitted for review"
                );
                Ok(assessment)
            },
        )
        .await
    }

    // =========================================================================
    // STAGE 4: PARTNER APPROVAL
    // =========================================================================

    /// Record a partner's decision on the submitted assessment. Only
    /// rostered members with the partner role may decide.
    pub async fn approve_as_partner(
        &self,
        engagement: &EngagementId,
        partner: &MemberId,
        approved: bool,
        notes: String,
    ) -> AcceptanceResult<ClientRiskAssessment> {
        let partner = partner.clone();
        self.mutate(
            engagement,
            AcceptanceStage::PartnerApproval,
            "partner decision",
            move |store, snapshot, now| {
                let engagement = snapshot.engagement_id();
                let member = snapshot
                    .member(&partner)
                    .ok_or_else(|| AcceptanceError::NotFound {
                        kind: "team member",
                        id: partner.to_string(),
                    })?;
                if !member.is_partner() {
                    return Err(AcceptanceError::InvalidInput(format!(
                        "{} is not a partner on engagement {}",
                        member.name, engagement
                    )));
                }

                let mut assessment = require_assessment(snapshot)?;
                assessment.record_partner_decision(PartnerDecision {
                    partner: partner.clone(),
                    approved,
                    notes: notes.trim().to_string(),
                    decided_at: now,
                })?;
                assessment.revision = store.save_risk_assessment(&assessment)?;

                info!(
                    engagement = %engagement,
                    partner = %partner,
                    approved,
                    "partner decision recorded"
                );
                Ok(assessment)
            },
        )
        .await
    }

    // =========================================================================
    // STAGE 3: ENGAGEMENT LETTER
    // =========================================================================

    /// Create the first draft, or revise the existing draft.
    pub async fn save_letter_draft(
        &self,
        engagement: &EngagementId,
        terms: LetterTerms,
        revision: Revision,
    ) -> AcceptanceResult<EngagementLetter> {
        self.mutate(
            engagement,
            AcceptanceStage::EngagementLetter,
            "save letter draft",
            move |store, snapshot, _| {
                let engagement = snapshot.engagement_id();
                let mut letter = match snapshot.letter.clone() {
                    Some(mut existing) => {
                        existing.revise(terms)?;
                        existing
                    }
                    None => EngagementLetter::draft(engagement.clone(), terms),
                };
                letter.revision = revision;
                letter.revision = store.save_engagement_letter(&letter)?;

                info!(engagement = %engagement, version = letter.version, "letter draft saved");
                Ok(letter)
            },
        )
        .await
    }

    pub async fn send_to_client(
        &self,
        engagement: &EngagementId,
    ) -> AcceptanceResult<EngagementLetter> {
        self.mutate(
            engagement,
            AcceptanceStage::EngagementLetter,
            "send letter",
            |store, snapshot, now| {
                let mut letter = require_letter(snapshot)?;
                letter.send_to_client(now)?;
                letter.revision = store.save_engagement_letter(&letter)?;
                info!(
                    engagement = %snapshot.engagement_id(),
                    version = letter.version,
                    "letter sent to client"
                );
                Ok(letter)
            },
        )
        .await
    }

    pub async fn record_client_signature(
        &self,
        engagement: &EngagementId,
        signed_by: String,
        title: String,
        organization: String,
    ) -> AcceptanceResult<EngagementLetter> {
        self.mutate(
            engagement,
            AcceptanceStage::EngagementLetter,
            "record signature",
            move |store, snapshot, now| {
                let mut letter = require_letter(snapshot)?;
                letter.record_client_signature(ClientSignature {
                    signed_by: signed_by.trim().to_string(),
                    title: title.trim().to_string(),
                    organization: organization.trim().to_string(),
                    signed_at: now,
                })?;
                letter.revision = store.save_engagement_letter(&letter)?;
                info!(engagement = %snapshot.engagement_id(), "client signature recorded");
                Ok(letter)
            },
        )
        .await
    }

    // =========================================================================
    // STAGE TRANSITIONS
    // =========================================================================

    /// Persist the completion marker of `stage`.
    ///
    /// A stage that already reads as complete is a no-op apart from marker
    /// persistence. A locked stage fails with `StageLocked`; the current
    /// stage fails with every unmet condition of its predicate.
    pub async fn complete_stage(
        &self,
        engagement: &EngagementId,
        stage: AcceptanceStage,
    ) -> AcceptanceResult<StageReport> {
        let action = "complete stage";
        checked_engagement(engagement, stage, action)?;
        let engagement = engagement.clone();

        self.with_store(move |store| {
            let snapshot = WorkflowSnapshot::load(&*store, &engagement)?;
            let report = evaluate(&snapshot);
            let status = report.status(stage);

            if status.complete {
                return sync_markers(store, &engagement);
            }

            let err = if !status.current {
                AcceptanceError::StageLocked { stage }
            } else {
                AcceptanceError::blocked(stage_blockers(stage, &snapshot)).unwrap_or_else(|| {
                    AcceptanceError::InvariantViolation(format!(
                        "{} is current but could not be completed",
                        stage.label()
                    ))
                })
            };
            log_failure(&engagement, stage, action, &err);
            Err(err)
        })
        .await
    }

    /// Finalise the engagement. Fails with every blocker at once; once
    /// complete, calling again returns the same report.
    pub async fn complete_acceptance(
        &self,
        engagement: &EngagementId,
    ) -> AcceptanceResult<StageReport> {
        let action = "complete acceptance";
        checked_engagement(engagement, AcceptanceStage::PartnerApproval, action)?;
        let engagement = engagement.clone();
        let clock = self.clock;

        self.with_store(move |store| {
            let report = sync_markers(store, &engagement)?;
            if report.completed_at.is_some() {
                return Ok(report);
            }

            if let Some(err) = AcceptanceError::blocked(report.blockers.clone()) {
                let stage = report
                    .active_stage
                    .unwrap_or(AcceptanceStage::PartnerApproval);
                log_failure(&engagement, stage, action, &err);
                return Err(err);
            }

            let mut workflow = WorkflowSnapshot::load(&*store, &engagement)?.workflow;
            workflow.completed_at = Some(clock());
            store.save_workflow(&workflow)?;

            info!(
                engagement = %engagement,
                progress = report.progress_percent,
                "engagement accepted"
            );
            sync_markers(store, &engagement)
        })
        .await
    }

    // =========================================================================
    // WIZARD
    // =========================================================================

    /// Wizard opened on the active stage.
    pub async fn wizard(&self, engagement: &EngagementId) -> AcceptanceResult<Wizard> {
        let report = self.status(engagement).await?;
        Ok(Wizard::open(&report))
    }

    /// Open a stage tab. Locked stages fail with `StageLocked`.
    pub async fn activate_stage(
        &self,
        engagement: &EngagementId,
        stage: AcceptanceStage,
    ) -> AcceptanceResult<Wizard> {
        let report = self.status(engagement).await?;
        let mut wizard = Wizard::open(&report);
        wizard.activate(stage, &report).inspect_err(|err| {
            log_failure(engagement, stage, "activate stage", err);
        })?;
        Ok(wizard)
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    /// Run `op` against the locked store on the blocking pool.
    async fn with_store<T, F>(&self, op: F) -> AcceptanceResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut DynStore) -> AcceptanceResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let span = Span::current();
        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let mut store = store
                .lock()
                .map_err(|_| AcceptanceError::Storage("store lock poisoned".to_string()))?;
            op(&mut **store)
        })
        .await
        .map_err(|err| AcceptanceError::Storage(format!("store task failed: {err}")))?
    }

    async fn read<T, F>(&self, engagement: &EngagementId, op: F) -> AcceptanceResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&DynStore, &EngagementId) -> AcceptanceResult<T> + Send + 'static,
    {
        engagement.validate()?;
        let engagement = engagement.clone();
        self.with_store(move |store| op(&*store, &engagement)).await
    }

    async fn mutate<T, F>(
        &self,
        engagement: &EngagementId,
        stage: AcceptanceStage,
        action: &'static str,
        op: F,
    ) -> AcceptanceResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut DynStore, &WorkflowSnapshot, UnixSeconds) -> AcceptanceResult<T>
            + Send
            + 'static,
    {
        checked_engagement(engagement, stage, action)?;
        let engagement = engagement.clone();
        let clock = self.clock;

        self.with_store(move |store| {
            let snapshot = WorkflowSnapshot::load(&*store, &engagement)?;
            let now = clock();
            let value = ensure_open(&snapshot)
                .and_then(|()| op(&mut *store, &snapshot, now))
                .inspect_err(|err| log_failure(&engagement, stage, action, err))?;

            sync_markers(store, &engagement)?;
            Ok(value)
        })
        .await
    }
}

fn checked_engagement(
    engagement: &EngagementId,
    stage: AcceptanceStage,
    action: &'static str,
) -> AcceptanceResult<()> {
    engagement
        .validate()
        .inspect_err(|err| log_failure(engagement, stage, action, err))
}

/// Re-evaluate and persist markers for every required stage that reads as
/// complete.
///
/// Stage 4 is only marked when it is required, so a later change that makes
/// approval necessary is not bypassed by a marker written while it was
/// optional.
fn sync_markers(store: &mut DynStore, engagement: &EngagementId) -> AcceptanceResult<StageReport> {
    let mut snapshot = WorkflowSnapshot::load(&*store, engagement)?;
    let report = evaluate(&snapshot);

    let mut newly = Vec::new();
    for stage in AcceptanceStage::ALL {
        let status = report.status(stage);
        if status.complete && status.required && snapshot.workflow.mark(stage) {
            newly.push(stage);
        }
    }

    if !newly.is_empty() {
        store.save_workflow(&snapshot.workflow)?;
        for stage in newly {
            info!(engagement = %engagement, stage = %stage, "stage marked complete");
        }
    }
    Ok(report)
}

fn ensure_open(snapshot: &WorkflowSnapshot) -> AcceptanceResult<()> {
    match snapshot.workflow.completed_at {
        Some(at) => Err(AcceptanceError::InvariantViolation(format!(
            "engagement {} was accepted at {} and is closed for edits",
            snapshot.engagement_id(),
            at
        ))),
        None => Ok(()),
    }
}

fn validate_team(members: &[TeamMember]) -> AcceptanceResult<()> {
    let mut seen = BTreeSet::new();
    for member in members {
        if member.id.as_str().trim().is_empty() || member.name.trim().is_empty() {
            return Err(AcceptanceError::InvalidInput(
                "team members need a non-empty id and name".to_string(),
            ));
        }
        if member.id.as_str().contains(DeclarationId::SEPARATOR) {
            return Err(AcceptanceError::InvalidInput(format!(
                "member id '{}' may not contain '{}'",
                member.id,
                DeclarationId::SEPARATOR
            )));
        }
        if !seen.insert(&member.id) {
            return Err(AcceptanceError::InvalidInput(format!(
                "member '{}' is listed twice",
                member.id
            )));
        }
    }
    Ok(())
}

fn require_assessment(snapshot: &WorkflowSnapshot) -> AcceptanceResult<ClientRiskAssessment> {
    snapshot
        .risk_assessment
        .clone()
        .ok_or_else(|| AcceptanceError::NotFound {
            kind: "risk assessment",
            id: snapshot.engagement_id().to_string(),
        })
}

fn require_letter(snapshot: &WorkflowSnapshot) -> AcceptanceResult<EngagementLetter> {
    snapshot
        .letter
        .clone()
        .ok_or_else(|| AcceptanceError::NotFound {
            kind: "engagement letter",
            id: snapshot.engagement_id().to_string(),
        })
}

fn log_failure(
    engagement: &EngagementId,
    stage: AcceptanceStage,
    action: &'static str,
    err: &AcceptanceError,
) {
    match err {
        AcceptanceError::Blocked { blockers } => warn!(
            engagement = %engagement,
            stage = %stage,
            action,
            blockers = blockers.len(),
            "operation blocked"
        ),
        err if err.is_persistence() => error!(
            engagement = %engagement,
            stage = %stage,
            action,
            error = %err,
            "store failure"
        ),
        err => warn!(
            engagement = %engagement,
            stage = %stage,
            action,
            error = %err,
            "operation rejected"
        ),
    }
}
