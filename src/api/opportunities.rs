//! Opportunity routes.
//!
//! Session origin: an `sf_user_id` query parameter is resolved through the
//! vault; without it the caller must send `Authorization: Bearer` plus
//! `X-Sfdc-Instance-Url`.

use super::AppState;
use crate::crm::soql::{clamp_limit, DEFAULT_OWNED_LIMIT, DEFAULT_SEARCH_LIMIT};
use crate::crm::{
    OpportunityDetail, OpportunityList, OpportunityRecord, SearchFilters, ValidationResult,
};
use crate::error::{GatewayError, Result};
use crate::session::Session;
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Selects the vault-backed session origin when present
#[derive(Deserialize)]
pub struct SubjectParams {
    sf_user_id: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    sf_user_id: Option<String>,
    name: Option<String>,
    stage: Option<String>,
    owner_id: Option<String>,
    limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct OwnedParams {
    sf_user_id: Option<String>,
    /// Owner to list; defaults to `sf_user_id`
    owner_id: Option<String>,
    limit: Option<i64>,
}

#[derive(Serialize)]
pub struct ExistsResponse {
    exists: bool,
    opportunity: Option<OpportunityRecord>,
}

pub fn create_opportunity_router(state: AppState) -> Router {
    Router::new()
        .route("/opportunities", get(search))
        .route("/opportunities/user/my-opportunities", get(owned_by))
        .route("/opportunities/:id", get(exists))
        .route("/opportunities/:id/detail", get(detail))
        .route("/opportunities/:id/validate", get(validate))
        .with_state(state)
}

/// Materialize from the vault when a subject is named, else use the headers
async fn resolve_session(
    state: &AppState,
    sf_user_id: Option<&str>,
    headers: &HeaderMap,
) -> Result<Session> {
    match sf_user_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(subject_id) => state.materializer.resolve(subject_id).await,
        None => Session::from_headers(headers),
    }
}

/// GET /opportunities/:id
async fn exists(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SubjectParams>,
    headers: HeaderMap,
) -> Result<Json<ExistsResponse>> {
    let session = resolve_session(&state, params.sf_user_id.as_deref(), &headers).await?;
    let opportunity = state.opportunities.find(&session, &id).await?;

    Ok(Json(ExistsResponse {
        exists: opportunity.is_some(),
        opportunity,
    }))
}

/// GET /opportunities/:id/detail
async fn detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SubjectParams>,
    headers: HeaderMap,
) -> Result<Json<OpportunityDetail>> {
    let session = resolve_session(&state, params.sf_user_id.as_deref(), &headers).await?;
    Ok(Json(state.opportunities.get_detail(&session, &id).await?))
}

/// GET /opportunities/:id/validate
async fn validate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SubjectParams>,
    headers: HeaderMap,
) -> Result<Json<ValidationResult>> {
    let session = resolve_session(&state, params.sf_user_id.as_deref(), &headers).await?;
    Ok(Json(state.opportunities.validate(&session, &id).await?))
}

/// GET /opportunities?name&stage&owner_id&limit
async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
    headers: HeaderMap,
) -> Result<Json<OpportunityList>> {
    let session = resolve_session(&state, params.sf_user_id.as_deref(), &headers).await?;

    let filters = SearchFilters {
        name: params.name,
        stage: params.stage,
        owner_id: params.owner_id,
    };
    let limit = params.limit.map(clamp_limit).unwrap_or(DEFAULT_SEARCH_LIMIT);

    debug!(?filters, limit, "Searching opportunities");

    Ok(Json(state.opportunities.search(&session, &filters, limit).await?))
}

/// GET /opportunities/user/my-opportunities
async fn owned_by(
    State(state): State<AppState>,
    Query(params): Query<OwnedParams>,
    headers: HeaderMap,
) -> Result<Json<OpportunityList>> {
    let owner_id = params
        .owner_id
        .clone()
        .or_else(|| params.sf_user_id.clone())
        .ok_or_else(|| GatewayError::InvalidFilter("sf_user_id or owner_id is required".to_string()))?;

    let session = resolve_session(&state, params.sf_user_id.as_deref(), &headers).await?;
    let limit = params.limit.map(clamp_limit).unwrap_or(DEFAULT_OWNED_LIMIT);

    Ok(Json(state.opportunities.owned_by(&session, &owner_id, limit).await?))
}
