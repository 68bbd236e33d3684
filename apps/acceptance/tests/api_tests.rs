//! HTTP API tests.
//!
//! Drives the router in-process with axum-test over an in-memory store.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use acceptance::api::{ErrorBody, HealthResponse, router};
use acceptance::orchestrator::AcceptanceOrchestrator;
use acceptance_core::{
    CertificationGate, ClientRiskAssessment, EngagementLetter, IndependenceDeclaration,
    LetterStatus, MemoryStore, RiskCategory, StageReport, Wizard,
};
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::json;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn server() -> TestServer {
    let orchestrator =
        AcceptanceOrchestrator::new(MemoryStore::new(), CertificationGate::RawFlags)
            .with_clock(|| 1_700_000_000);
    TestServer::new(router(orchestrator)).unwrap()
}

async fn staff_engagement(server: &TestServer) {
    server
        .put("/engagements/e1/team")
        .json(&json!({
            "members": [
                {"id": "pat", "name": "Pat Partner", "role": "partner"},
            ]
        }))
        .await
        .assert_status_ok();
}

async fn certify_pat(server: &TestServer) {
    server
        .put("/engagements/e1/declarations")
        .json(&json!({"member_id": "pat"}))
        .await
        .assert_status_ok();
    server
        .post("/engagements/e1/declarations/pat/certify")
        .await
        .assert_status_ok();
}

// =============================================================================
// TESTS
// =============================================================================

#[tokio::test]
async fn test_health() {
    let server = server();
    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: HealthResponse = response.json();
    assert_eq!(body.status, "ok");
}

#[tokio::test]
async fn test_workflow_of_unknown_engagement_starts_at_independence() {
    let server = server();
    let report: StageReport = server.get("/engagements/new/workflow").await.json();
    assert_eq!(report.active_index, Some(0));
    assert!(!report.is_complete);
    assert!(
        report
            .blockers
            .contains(&"No team members are assigned to the engagement".to_string())
    );
}

#[tokio::test]
async fn test_nested_engagement_id_is_bad_request() {
    let server = server();
    server
        .put("/engagements/acme:2025/team")
        .json(&json!({"members": []}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .get("/engagements/acme:2025/workflow")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_declaration_flow_advances_workflow() {
    let server = server();
    staff_engagement(&server).await;
    certify_pat(&server).await;

    let declarations: Vec<IndependenceDeclaration> =
        server.get("/engagements/e1/declarations").await.json();
    assert_eq!(declarations.len(), 1);
    assert!(declarations[0].is_certified);

    let report: StageReport = server.get("/engagements/e1/workflow").await.json();
    assert_eq!(report.active_index, Some(1));
}

#[tokio::test]
async fn test_risk_assessment_recomputes_aggregates() {
    let server = server();
    staff_engagement(&server).await;

    let response = server
        .put("/engagements/e1/risk-assessment")
        .json(&json!({
            "management_integrity": {"reputation": "high"},
            "financial_stability": {"going_concern": "moderate", "overall_assessment": "low"},
            "recommendation": "accept"
        }))
        .await;
    response.assert_status_ok();
    let assessment: ClientRiskAssessment = response.json();
    assert_eq!(
        assessment.management_integrity.overall_assessment,
        RiskCategory::High
    );
    assert_eq!(assessment.overall_risk, RiskCategory::High);
    assert!(assessment.partner_approval_required());

    let fetched: Option<ClientRiskAssessment> =
        server.get("/engagements/e1/risk-assessment").await.json();
    assert_eq!(fetched, Some(assessment));
}

#[tokio::test]
async fn test_blocked_completion_returns_every_blocker() {
    let server = server();
    staff_engagement(&server).await;

    let response = server.post("/engagements/e1/complete").await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: ErrorBody = response.json();
    assert_eq!(body.blockers.len(), 4);
}

#[tokio::test]
async fn test_locked_stage_is_conflict() {
    let server = server();
    let response = server
        .post("/engagements/e1/stages/engagement_letter/activate")
        .await;
    response.assert_status(StatusCode::CONFLICT);

    let response = server
        .post("/engagements/e1/stages/engagement_letter/complete")
        .await;
    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_stage_is_bad_request() {
    let server = server();
    server
        .post("/engagements/e1/stages/fieldwork/complete")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_activate_reachable_stage() {
    let server = server();
    staff_engagement(&server).await;
    certify_pat(&server).await;

    let wizard: Wizard = server
        .post("/engagements/e1/stages/risk_assessment/activate")
        .await
        .json();
    assert_eq!(wizard.active.as_str(), "risk_assessment");
}

#[tokio::test]
async fn test_letter_lifecycle_over_http() {
    let server = server();

    server
        .post("/engagements/e1/letter/send")
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let draft: EngagementLetter = server
        .put("/engagements/e1/letter")
        .json(&json!({"terms": {"scope": "Statutory audit", "fee_basis": "Fixed"}}))
        .await
        .json();
    assert_eq!(draft.version, 1);

    let sent: EngagementLetter = server.post("/engagements/e1/letter/send").await.json();
    assert_eq!(sent.status, LetterStatus::PendingClient);

    // revising after sending is a backward transition
    server
        .put("/engagements/e1/letter")
        .json(&json!({"terms": {"scope": "Other"}, "revision": sent.revision}))
        .await
        .assert_status(StatusCode::CONFLICT);

    server
        .post("/engagements/e1/letter/signature")
        .json(&json!({"signed_by": "", "title": "CFO", "organization": "Client Ltd"}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let signed: EngagementLetter = server
        .post("/engagements/e1/letter/signature")
        .json(&json!({"signed_by": "Casey", "title": "CFO", "organization": "Client Ltd"}))
        .await
        .json();
    assert_eq!(signed.status, LetterStatus::Signed);
    assert_eq!(
        signed.signature.map(|s| s.signed_at),
        Some(1_700_000_000)
    );
}

#[tokio::test]
async fn test_stale_revision_is_conflict() {
    let server = server();
    server
        .put("/engagements/e1/letter")
        .json(&json!({"terms": {"scope": "Audit"}}))
        .await
        .assert_status_ok();

    server
        .put("/engagements/e1/letter")
        .json(&json!({"terms": {"scope": "Audit and review"}, "revision": 0}))
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_partner_approval_route() {
    let server = server();
    staff_engagement(&server).await;
    server
        .put("/engagements/e1/risk-assessment")
        .json(&json!({"recommendation": "decline", "decline_reason": "Fee pressure"}))
        .await
        .assert_status_ok();
    server
        .post("/engagements/e1/risk-assessment/submit")
        .await
        .assert_status_ok();

    let approved: ClientRiskAssessment = server
        .post("/engagements/e1/risk-assessment/approval")
        .json(&json!({"partner_id": "pat", "approved": true}))
        .await
        .json();
    assert!(approved.partner_decision.is_some_and(|d| d.approved));
}
