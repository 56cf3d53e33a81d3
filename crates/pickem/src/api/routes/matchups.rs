use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::ErrorResponse,
    Json,
};
use log::{error, info};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    api::extractors::AdminAuth,
    domain::{
        CreateMatchup, FinalizeMatchup, Matchup, MatchupFilter, SettlementReport, UpdateMatchup,
    },
    startup::AppState,
};

pub async fn list_matchups(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<MatchupFilter>,
) -> Result<Json<Vec<Matchup>>, ErrorResponse> {
    state
        .sportsbook
        .matchups
        .list_matchups(filter)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error listing matchups: {:?}", e);
            e.into()
        })
}

pub async fn get_matchup(
    State(state): State<Arc<AppState>>,
    Path(matchup_id): Path<Uuid>,
) -> Result<Json<Matchup>, ErrorResponse> {
    state
        .sportsbook
        .matchups
        .get_matchup(matchup_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error getting matchup: {:?}", e);
            e.into()
        })
}

// Operator route for the score feed, not exposed through the auth proxy
pub async fn create_matchup(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Json(body): Json<CreateMatchup>,
) -> Result<(StatusCode, Json<Matchup>), ErrorResponse> {
    state
        .sportsbook
        .matchups
        .create_matchup(body)
        .await
        .map(|matchup| (StatusCode::CREATED, Json(matchup)))
        .map_err(|e| {
            error!("error creating matchup: {:?}", e);
            e.into()
        })
}

// Operator route for the score feed
pub async fn update_matchup(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(matchup_id): Path<Uuid>,
    Json(body): Json<UpdateMatchup>,
) -> Result<Json<Matchup>, ErrorResponse> {
    state
        .sportsbook
        .matchups
        .update_matchup(matchup_id, body)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error updating matchup {}: {:?}", matchup_id, e);
            e.into()
        })
}

/// Settle a matchup. A report with failures comes back as 202 so the feed
/// knows to retry; the settled picks stay settled.
pub async fn finalize_matchup(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(matchup_id): Path<Uuid>,
    Json(body): Json<FinalizeMatchup>,
) -> Result<(StatusCode, Json<SettlementReport>), ErrorResponse> {
    let report = state
        .sportsbook
        .finalize_matchup(matchup_id, body)
        .await
        .map_err(|e| {
            error!("error finalizing matchup {}: {:?}", matchup_id, e);
            ErrorResponse::from(e)
        })?;

    info!(
        "finalize {}: {} settled, {} failed",
        matchup_id,
        report.settled.len(),
        report.failures.len()
    );
    let status = if report.completed {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(report)))
}
