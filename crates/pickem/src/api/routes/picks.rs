use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::ErrorResponse,
    Json,
};
use log::error;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use super::Page;
use crate::{
    api::extractors::UserAuth,
    domain::{MakePick, Pick},
    startup::AppState,
};

pub async fn make_pick(
    UserAuth { user }: UserAuth,
    State(state): State<Arc<AppState>>,
    Json(body): Json<MakePick>,
) -> Result<(StatusCode, Json<Pick>), ErrorResponse> {
    state
        .sportsbook
        .make_pick(user.id, body, OffsetDateTime::now_utc())
        .await
        .map(|pick| (StatusCode::CREATED, Json(pick)))
        .map_err(|e| {
            error!("error making pick for {}: {:?}", user.id, e);
            e.into()
        })
}

pub async fn cancel_pick(
    UserAuth { user }: UserAuth,
    State(state): State<Arc<AppState>>,
    Path(pick_id): Path<Uuid>,
) -> Result<StatusCode, ErrorResponse> {
    state
        .sportsbook
        .cancel_pick(user.id, pick_id, OffsetDateTime::now_utc())
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(|e| {
            error!("error cancelling pick {}: {:?}", pick_id, e);
            e.into()
        })
}

pub async fn get_picks(
    UserAuth { user }: UserAuth,
    State(state): State<Arc<AppState>>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Pick>>, ErrorResponse> {
    state
        .sportsbook
        .picks
        .get_user_picks(user.id, page.limit())
        .await
        .map(Json)
        .map_err(|e| {
            error!("error getting picks: {:?}", e);
            e.into()
        })
}

/// `null` when the user has nothing riding
pub async fn get_active_pick(
    UserAuth { user }: UserAuth,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Option<Pick>>, ErrorResponse> {
    state
        .sportsbook
        .picks
        .get_active_pick(user.id)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error getting active pick: {:?}", e);
            e.into()
        })
}
