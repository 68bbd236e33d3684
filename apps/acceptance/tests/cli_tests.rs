//! Integration tests for acceptance CLI commands.
//!
//! Uses tempfile for testing file-based operations.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use acceptance::cli::{
    ExportDocument, cmd_export, cmd_init, cmd_status, open_existing, render_report,
};
use acceptance::error::AppError;
use acceptance_core::{
    AcceptanceError, AcceptanceStage, AcceptanceStore, DeclarationForm, EngagementId,
    IndependenceDeclaration, MemberId, RedbStore, TeamMember, TeamRole,
};
use std::path::PathBuf;
use tempfile::TempDir;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Create a temporary directory for tests.
fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Initialise a database holding one staffed engagement.
fn seeded_db(dir: &TempDir) -> PathBuf {
    let db_path = dir.path().join("acceptance.redb");
    cmd_init(&db_path, false).unwrap();

    let mut store = RedbStore::open(&db_path).unwrap();
    let engagement = EngagementId::new("e1");
    store
        .save_team(
            &engagement,
            &[TeamMember::new("pat", "Pat Partner", TeamRole::Partner)],
        )
        .unwrap();
    let mut declaration = IndependenceDeclaration::new(
        engagement,
        MemberId::new("pat"),
        DeclarationForm::default(),
    );
    declaration.is_certified = true;
    declaration.certified_at = Some(1);
    store.save_independence_declaration(&declaration).unwrap();
    db_path
}

// =============================================================================
// INIT COMMAND TESTS
// =============================================================================

#[test]
fn test_init_creates_database() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.redb");

    let result = cmd_init(&db_path, false);
    assert!(result.is_ok());
    assert!(db_path.exists());
}

#[test]
fn test_init_fails_if_exists_without_force() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.redb");

    // First init
    cmd_init(&db_path, false).unwrap();

    // Second init should fail
    let result = cmd_init(&db_path, false);
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn test_init_with_force_starts_empty() {
    let temp = create_temp_dir();
    let db_path = seeded_db(&temp);

    cmd_init(&db_path, true).unwrap();

    let store = open_existing(&db_path).unwrap();
    assert!(store.list_engagements().unwrap().is_empty());
}

// =============================================================================
// STATUS COMMAND TESTS
// =============================================================================

#[test]
fn test_status_requires_database() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("missing.redb");

    let result = cmd_status(&db_path, "e1", false);
    assert!(matches!(result, Err(AppError::Config(_))));
    assert!(!db_path.exists());
}

#[test]
fn test_status_of_unknown_engagement() {
    let temp = create_temp_dir();
    let db_path = seeded_db(&temp);

    let result = cmd_status(&db_path, "nope", true);
    assert!(matches!(
        result,
        Err(AppError::Core(AcceptanceError::NotFound { .. }))
    ));
}

#[test]
fn test_status_rejects_nested_engagement_id() {
    let temp = create_temp_dir();
    let db_path = seeded_db(&temp);

    let result = cmd_status(&db_path, "e1:pat", true);
    assert!(matches!(
        result,
        Err(AppError::Core(AcceptanceError::InvalidInput(_)))
    ));
}

#[test]
fn test_status_reports_progress() {
    let temp = create_temp_dir();
    let db_path = seeded_db(&temp);

    let report = cmd_status(&db_path, "e1", false).unwrap();
    assert!(report.status(AcceptanceStage::IndependenceCheck).complete);
    assert_eq!(report.active_stage, Some(AcceptanceStage::RiskAssessment));
    assert_eq!(report.progress_percent, 25);

    let text = render_report(&report);
    assert!(text.contains("25% complete"));
    assert!(text.contains("Client risk assessment has not been started"));
}

#[test]
fn test_status_does_not_write_markers() {
    let temp = create_temp_dir();
    let db_path = seeded_db(&temp);

    cmd_status(&db_path, "e1", true).unwrap();

    let store = open_existing(&db_path).unwrap();
    assert!(
        store
            .fetch_workflow(&EngagementId::new("e1"))
            .unwrap()
            .is_none()
    );
}

// =============================================================================
// EXPORT COMMAND TESTS
// =============================================================================

#[test]
fn test_export_writes_records_and_report() {
    let temp = create_temp_dir();
    let db_path = seeded_db(&temp);
    let output = temp.path().join("e1.json");

    let exported = cmd_export(&db_path, "e1", &output).unwrap();
    assert!(output.exists());

    let content = std::fs::read_to_string(&output).unwrap();
    let parsed: ExportDocument = serde_json::from_str(&content).unwrap();
    assert_eq!(parsed, exported);
    assert_eq!(parsed.records.team.len(), 1);
    assert_eq!(parsed.records.declarations.len(), 1);
    assert_eq!(parsed.report.progress_percent, 25);
}

#[test]
fn test_export_unknown_engagement_writes_nothing() {
    let temp = create_temp_dir();
    let db_path = seeded_db(&temp);
    let output = temp.path().join("nope.json");

    assert!(cmd_export(&db_path, "nope", &output).is_err());
    assert!(!output.exists());
}
