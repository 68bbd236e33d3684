//! # HTTP API
//!
//! JSON routes over the [`AcceptanceOrchestrator`], one per workflow
//! operation. Unmet preconditions come back as `422` with every blocker in
//! a `blockers` array.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::orchestrator::AcceptanceOrchestrator;
use acceptance_core::{
    AcceptanceError, AcceptanceStage, ClientRiskAssessment, DeclarationForm, DeclarationId,
    EngagementId, EngagementLetter, IndependenceDeclaration, LetterTerms, MemberId, RedbStore,
    Revision, RiskAssessmentForm, StageReport, TeamMember, Wizard,
};
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

// =============================================================================
// ERRORS
// =============================================================================

/// Core error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub AcceptanceError);

impl From<AcceptanceError> for ApiError {
    fn from(err: AcceptanceError) -> Self {
        Self(err)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blockers: Vec<String>,
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AcceptanceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AcceptanceError::Blocked { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AcceptanceError::InvariantViolation(_)
            | AcceptanceError::StageLocked { .. }
            | AcceptanceError::Conflict { .. } => StatusCode::CONFLICT,
            AcceptanceError::NotFound { .. } => StatusCode::NOT_FOUND,
            AcceptanceError::Storage(_) | AcceptanceError::Format(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.0.to_string(),
            blockers: self.0.blockers().to_vec(),
        };
        (self.status(), Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// =============================================================================
// REQUEST BODIES
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRequest {
    pub members: Vec<TeamMember>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclarationRequest {
    pub member_id: MemberId,
    #[serde(default)]
    pub form: DeclarationForm,
    /// Revision the client last read; `0` for a new declaration.
    #[serde(default)]
    pub revision: Revision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub partner_id: MemberId,
    pub approved: bool,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LetterRequest {
    pub terms: LetterTerms,
    #[serde(default)]
    pub revision: Revision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureRequest {
    pub signed_by: String,
    pub title: String,
    pub organization: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// =============================================================================
// ROUTER
// =============================================================================

/// Build the application router.
pub fn router(orchestrator: AcceptanceOrchestrator) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::PUT, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/engagements/{id}/workflow", get(workflow))
        .route("/engagements/{id}/team", get(get_team).put(put_team))
        .route(
            "/engagements/{id}/declarations",
            get(get_declarations).put(put_declaration),
        )
        .route(
            "/engagements/{id}/declarations/{decl}/certify",
            post(certify),
        )
        .route(
            "/engagements/{id}/risk-assessment",
            get(get_risk_assessment).put(put_risk_assessment),
        )
        .route(
            "/engagements/{id}/risk-assessment/submit",
            post(submit_risk_assessment),
        )
        .route(
            "/engagements/{id}/risk-assessment/approval",
            post(partner_approval),
        )
        .route("/engagements/{id}/letter", get(get_letter).put(put_letter))
        .route("/engagements/{id}/letter/send", post(send_letter))
        .route("/engagements/{id}/letter/signature", post(sign_letter))
        .route(
            "/engagements/{id}/stages/{stage}/activate",
            post(activate_stage),
        )
        .route(
            "/engagements/{id}/stages/{stage}/complete",
            post(complete_stage),
        )
        .route("/engagements/{id}/complete", post(complete_acceptance))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(orchestrator)
}

/// Open the store and serve until ctrl-c.
pub async fn serve(config: &AppConfig) -> AppResult<()> {
    let store = RedbStore::open(&config.db_path)?;
    let db = store.path().display().to_string();
    let orchestrator = AcceptanceOrchestrator::new(store, config.certification_gate);
    let app = router(orchestrator);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(
        addr = %config.bind,
        db = %db,
        gate = %config.certification_gate,
        "acceptance server listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("acceptance server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // no handler available; run until killed
        std::future::pending::<()>().await;
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

fn parse_stage(raw: &str) -> Result<AcceptanceStage, ApiError> {
    raw.parse().map_err(ApiError)
}

/// Accept either a full declaration id or a bare member id.
fn declaration_id(engagement: &EngagementId, raw: &str) -> DeclarationId {
    if raw.contains(DeclarationId::SEPARATOR) {
        DeclarationId::new(raw)
    } else {
        DeclarationId::for_member(engagement, &MemberId::new(raw))
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn workflow(
    State(orchestrator): State<AcceptanceOrchestrator>,
    Path(id): Path<String>,
) -> ApiResult<StageReport> {
    Ok(Json(orchestrator.status(&EngagementId::new(id)).await?))
}

async fn get_team(
    State(orchestrator): State<AcceptanceOrchestrator>,
    Path(id): Path<String>,
) -> ApiResult<Vec<TeamMember>> {
    let snapshot = orchestrator.snapshot(&EngagementId::new(id)).await?;
    Ok(Json(snapshot.team))
}

async fn put_team(
    State(orchestrator): State<AcceptanceOrchestrator>,
    Path(id): Path<String>,
    Json(request): Json<TeamRequest>,
) -> ApiResult<Vec<TeamMember>> {
    let team = orchestrator
        .save_team(&EngagementId::new(id), request.members)
        .await?;
    Ok(Json(team))
}

async fn get_declarations(
    State(orchestrator): State<AcceptanceOrchestrator>,
    Path(id): Path<String>,
) -> ApiResult<Vec<IndependenceDeclaration>> {
    let declarations = orchestrator
        .fetch_declarations(&EngagementId::new(id))
        .await?;
    Ok(Json(declarations))
}

async fn put_declaration(
    State(orchestrator): State<AcceptanceOrchestrator>,
    Path(id): Path<String>,
    Json(request): Json<DeclarationRequest>,
) -> ApiResult<IndependenceDeclaration> {
    let declaration = orchestrator
        .save_declaration(
            &EngagementId::new(id),
            &request.member_id,
            request.form,
            request.revision,
        )
        .await?;
    Ok(Json(declaration))
}

async fn certify(
    State(orchestrator): State<AcceptanceOrchestrator>,
    Path((id, decl)): Path<(String, String)>,
) -> ApiResult<IndependenceDeclaration> {
    let engagement = EngagementId::new(id);
    let declaration = declaration_id(&engagement, &decl);
    Ok(Json(
        orchestrator
            .certify_independence(&engagement, &declaration)
            .await?,
    ))
}

async fn get_risk_assessment(
    State(orchestrator): State<AcceptanceOrchestrator>,
    Path(id): Path<String>,
) -> ApiResult<Option<ClientRiskAssessment>> {
    Ok(Json(
        orchestrator
            .fetch_risk_assessment(&EngagementId::new(id))
            .await?,
    ))
}

async fn put_risk_assessment(
    State(orchestrator): State<AcceptanceOrchestrator>,
    Path(id): Path<String>,
    Json(form): Json<RiskAssessmentForm>,
) -> ApiResult<ClientRiskAssessment> {
    Ok(Json(
        orchestrator
            .save_risk_assessment(&EngagementId::new(id), form)
            .await?,
    ))
}

async fn submit_risk_assessment(
    State(orchestrator): State<AcceptanceOrchestrator>,
    Path(id): Path<String>,
) -> ApiResult<ClientRiskAssessment> {
    Ok(Json(
        orchestrator
            .submit_risk_assessment_for_review(&EngagementId::new(id))
            .await?,
    ))
}

async fn partner_approval(
    State(orchestrator): State<AcceptanceOrchestrator>,
    Path(id): Path<String>,
    Json(request): Json<ApprovalRequest>,
) -> ApiResult<ClientRiskAssessment> {
    Ok(Json(
        orchestrator
            .approve_as_partner(
                &EngagementId::new(id),
                &request.partner_id,
                request.approved,
                request.notes,
            )
            .await?,
    ))
}

async fn get_letter(
    State(orchestrator): State<AcceptanceOrchestrator>,
    Path(id): Path<String>,
) -> ApiResult<Option<EngagementLetter>> {
    Ok(Json(orchestrator.fetch_letter(&EngagementId::new(id)).await?))
}

async fn put_letter(
    State(orchestrator): State<AcceptanceOrchestrator>,
    Path(id): Path<String>,
    Json(request): Json<LetterRequest>,
) -> ApiResult<EngagementLetter> {
    Ok(Json(
        orchestrator
            .save_letter_draft(&EngagementId::new(id), request.terms, request.revision)
            .await?,
    ))
}

async fn send_letter(
    State(orchestrator): State<AcceptanceOrchestrator>,
    Path(id): Path<String>,
) -> ApiResult<EngagementLetter> {
    Ok(Json(
        orchestrator.send_to_client(&EngagementId::new(id)).await?,
    ))
}

async fn sign_letter(
    State(orchestrator): State<AcceptanceOrchestrator>,
    Path(id): Path<String>,
    Json(request): Json<SignatureRequest>,
) -> ApiResult<EngagementLetter> {
    Ok(Json(
        orchestrator
            .record_client_signature(
                &EngagementId::new(id),
                request.signed_by,
                request.title,
                request.organization,
            )
            .await?,
    ))
}

async fn activate_stage(
    State(orchestrator): State<AcceptanceOrchestrator>,
    Path((id, stage)): Path<(String, String)>,
) -> ApiResult<Wizard> {
    let stage = parse_stage(&stage)?;
    Ok(Json(
        orchestrator
            .activate_stage(&EngagementId::new(id), stage)
            .await?,
    ))
}

async fn complete_stage(
    State(orchestrator): State<AcceptanceOrchestrator>,
    Path((id, stage)): Path<(String, String)>,
) -> ApiResult<StageReport> {
    let stage = parse_stage(&stage)?;
    Ok(Json(
        orchestrator
            .complete_stage(&EngagementId::new(id), stage)
            .await?,
    ))
}

async fn complete_acceptance(
    State(orchestrator): State<AcceptanceOrchestrator>,
    Path(id): Path<String>,
) -> ApiResult<StageReport> {
    Ok(Json(
        orchestrator
            .complete_acceptance(&EngagementId::new(id))
            .await?,
    ))
}
