use axum::{
    extract::{Query, State},
    response::ErrorResponse,
    Json,
};
use log::error;
use std::sync::Arc;
use time::OffsetDateTime;

use super::Page;
use crate::{
    api::extractors::{AdminAuth, UserAuth},
    domain::{Campaign, Chain, LeaderboardEntry, RolloverSummary},
    startup::AppState,
};

pub async fn get_active_chain(
    UserAuth { user }: UserAuth,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Chain>, ErrorResponse> {
    state
        .sportsbook
        .active_chain(user.id)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error getting active chain for {}: {:?}", user.id, e);
            e.into()
        })
}

pub async fn get_current_campaign(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Campaign>, ErrorResponse> {
    state
        .sportsbook
        .campaigns
        .get_active_campaign()
        .await
        .map(Json)
        .map_err(|e| {
            error!("error getting current campaign: {:?}", e);
            e.into()
        })
}

pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<LeaderboardEntry>>, ErrorResponse> {
    let campaign = state
        .sportsbook
        .campaigns
        .get_active_campaign()
        .await
        .map_err(ErrorResponse::from)?;

    state
        .sportsbook
        .chains
        .leaderboard(campaign.id, page.limit())
        .await
        .map(Json)
        .map_err(|e| {
            error!("error getting leaderboard: {:?}", e);
            e.into()
        })
}

// Operator route, rollover normally runs from the campaign watcher
pub async fn rollover_campaign(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> Result<Json<RolloverSummary>, ErrorResponse> {
    state
        .sportsbook
        .rollover_campaign(OffsetDateTime::now_utc())
        .await
        .map(Json)
        .map_err(|e| {
            error!("error rolling campaign over: {:?}", e);
            e.into()
        })
}
