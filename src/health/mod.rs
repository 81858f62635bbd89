//! Gateway liveness reporting.
//!
//! # Responsibilities
//! - Answer `GET /health` without touching any backend
//! - Report configured services and whether the verification key is held
//!
//! # Design Decisions
//! - Liveness is always "healthy" while the process serves requests; key
//!   readiness is reported separately so orchestrators can tell the two apart
//! - Served behind the admission limiter like every other path

use std::collections::BTreeMap;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;

/// Body of the liveness endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub services: BTreeMap<&'static str, String>,
    pub public_key_ready: bool,
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "healthy",
        services: (*state.services).clone(),
        public_key_ready: state.keys.is_ready(),
    })
}
