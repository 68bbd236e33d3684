//! # Configuration
//!
//! [`AppConfig`] is the single value the orchestrator, server and CLI
//! commands are built from. It is produced by the CLI parser, where every
//! field can also come from an `ACCEPTANCE_*` environment variable.

use acceptance_core::CertificationGate;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "acceptance.redb";
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// redb database file.
    pub db_path: PathBuf,
    pub bind: SocketAddr,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub certification_gate: CertificationGate,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            certification_gate: CertificationGate::default(),
        }
    }
}
