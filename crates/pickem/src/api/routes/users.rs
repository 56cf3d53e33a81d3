use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::ErrorResponse,
    Json,
};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    api::extractors::{AdminAuth, ExternalId, UserAuth},
    domain::{Achievement, CoinTransaction, LeagueStats, Squad, User},
    startup::AppState,
};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterPayload {
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    pub limit: Option<i64>,
}

impl Page {
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    pub league_stats: Vec<LeagueStats>,
}

pub async fn register(
    ExternalId(external_id): ExternalId,
    State(state): State<Arc<AppState>>,
    body: Option<Json<RegisterPayload>>,
) -> Result<(StatusCode, Json<User>), ErrorResponse> {
    let Json(body) = body.unwrap_or_default();
    debug!("registering user: {}", external_id);

    state
        .sportsbook
        .users
        .register_user(external_id, body.username, state.starting_coins)
        .await
        .map(|user| (StatusCode::CREATED, Json(user)))
        .map_err(|e| {
            error!("error registering user: {:?}", e);
            e.into()
        })
}

pub async fn get_me(
    UserAuth { user }: UserAuth,
    State(state): State<Arc<AppState>>,
) -> Result<Json<UserProfile>, ErrorResponse> {
    let league_stats = state
        .sportsbook
        .ledger
        .get_league_stats(user.id)
        .await
        .map_err(|e| {
            error!("error getting league stats: {:?}", e);
            ErrorResponse::from(e)
        })?;
    Ok(Json(UserProfile { user, league_stats }))
}

pub async fn get_transactions(
    UserAuth { user }: UserAuth,
    State(state): State<Arc<AppState>>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<CoinTransaction>>, ErrorResponse> {
    state
        .sportsbook
        .ledger
        .get_transactions(user.id, page.limit())
        .await
        .map(Json)
        .map_err(|e| {
            error!("error getting transactions: {:?}", e);
            e.into()
        })
}

pub async fn get_achievements(
    UserAuth { user }: UserAuth,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Achievement>>, ErrorResponse> {
    state
        .sportsbook
        .achievements
        .list_achievements(user.id)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error listing achievements: {:?}", e);
            e.into()
        })
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSquad {
    pub name: String,
}

// Operator route
pub async fn create_squad(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Json(body): Json<CreateSquad>,
) -> Result<(StatusCode, Json<Squad>), ErrorResponse> {
    state
        .sportsbook
        .squads
        .create_squad(body.name)
        .await
        .map(|squad| (StatusCode::CREATED, Json(squad)))
        .map_err(|e| {
            error!("error creating squad: {:?}", e);
            e.into()
        })
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinSquad {
    /// `None` leaves the current squad
    pub squad_id: Option<Uuid>,
}

pub async fn join_squad(
    UserAuth { user }: UserAuth,
    State(state): State<Arc<AppState>>,
    Json(body): Json<JoinSquad>,
) -> Result<Json<User>, ErrorResponse> {
    if let Some(squad_id) = body.squad_id {
        state
            .sportsbook
            .squads
            .get_squad(squad_id)
            .await
            .map_err(ErrorResponse::from)?;
    }

    state
        .sportsbook
        .users
        .join_squad(user.id, body.squad_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error joining squad: {:?}", e);
            e.into()
        })
}
