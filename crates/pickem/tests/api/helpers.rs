use axum::{
    body::{to_bytes, Body},
    http::{request::Builder, Method, Request, StatusCode},
    Router,
};
use log::LevelFilter;
use pickem::{
    app,
    domain::{Job, JobSignal, Sportsbook},
    AppState, DBConnection, DatabasePoolConfig,
};
use pickem_core::TeamSnapshot;
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc};
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};
use tower::ServiceExt;
use uuid::Uuid;

pub const IDENTITY_HEADER: &str = "x-user-id";
pub const ADMIN_HEADER: &str = "x-admin-key";
pub const ADMIN_KEY: &str = "feed-secret";
pub const STARTING_COINS: i64 = 50;

pub struct TestApp {
    pub router: Router,
    pub sportsbook: Arc<Sportsbook>,
}

pub async fn spawn_app() -> TestApp {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(LevelFilter::Debug)
        .filter_module("sqlx", LevelFilter::Warn)
        .try_init();

    // Memory databases are keyed by path, a fresh one per test
    let db = DBConnection::new(
        &format!("/tmp/pickem-test-{}", Uuid::now_v7()),
        "pickem",
        DatabasePoolConfig::testing(),
    )
    .await
    .expect("failed to create test db");

    let (signal, _) = JobSignal::new();
    let sportsbook = Arc::new(Sportsbook::new(db, signal));
    sportsbook
        .ensure_campaign(OffsetDateTime::now_utc())
        .await
        .expect("failed to open campaign");

    let state = AppState {
        sportsbook: sportsbook.clone(),
        identity_header: IDENTITY_HEADER.to_string(),
        admin_key: Some(ADMIN_KEY.to_string()),
        admin_header: ADMIN_HEADER.to_string(),
        starting_coins: STARTING_COINS,
        background_threads: Arc::new(HashMap::new()),
    };

    TestApp {
        router: app(state, vec![String::from("http://localhost:3000")]),
        sportsbook,
    }
}

impl TestApp {
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            request = request.header(IDENTITY_HEADER, user);
        }
        self.dispatch(request, body).await
    }

    /// Call an operator route with the configured admin key
    pub async fn send_admin(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send_with_key(method, uri, Some(ADMIN_KEY), body).await
    }

    pub async fn send_with_key(
        &self,
        method: Method,
        uri: &str,
        admin_key: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(key) = admin_key {
            request = request.header(ADMIN_HEADER, key);
        }
        self.dispatch(request, body).await
    }

    async fn dispatch(&self, request: Builder, body: Option<Value>) -> (StatusCode, Value) {
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .expect("failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("body is not json")
        };
        (status, body)
    }

    pub async fn register(&self, external_id: &str) -> Value {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/v1/users/register",
                Some(external_id),
                Some(json!({ "username": external_id })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body
    }

    pub async fn create_matchup(&self, game: &str, cost: i64, featured: bool) -> Value {
        let (status, body) = self
            .send_admin(
                Method::POST,
                "/api/v1/matchups",
                Some(matchup_payload(game, cost, featured)),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body
    }

    pub async fn finalize(&self, matchup_id: &str, home: i64, away: i64) -> (StatusCode, Value) {
        self.send_admin(
            Method::POST,
            &format!("/api/v1/matchups/{}/finalize", matchup_id),
            Some(json!({
                "home_team": team("den", home),
                "away_team": team("kc", away),
            })),
        )
        .await
    }

    pub async fn make_pick(&self, user: &str, matchup_id: &str, team_id: &str) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            "/api/v1/picks",
            Some(user),
            Some(json!({ "matchup_id": matchup_id, "team_id": team_id })),
        )
        .await
    }

    /// Side-effect jobs written so far, oldest first
    pub async fn queued_jobs(&self) -> Vec<Job> {
        self.sportsbook
            .jobs
            .pending(0, 100)
            .await
            .expect("failed to read jobs")
            .into_iter()
            .map(|queued| queued.job)
            .collect()
    }

    pub async fn me(&self, user: &str) -> Value {
        let (status, body) = self
            .send(Method::GET, "/api/v1/users/me", Some(user), None)
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body
    }
}

pub fn team(id: &str, score: i64) -> TeamSnapshot {
    TeamSnapshot {
        id: id.to_string(),
        name: id.to_uppercase(),
        score,
        image: None,
    }
}

pub fn matchup_payload(game: &str, cost: i64, featured: bool) -> Value {
    let start_time = (OffsetDateTime::now_utc() + Duration::hours(3))
        .format(&Rfc3339)
        .expect("failed to format start time");
    json!({
        "external_game_id": game,
        "league": "NFL",
        "start_time": start_time,
        "home_team": team("den", 0),
        "away_team": team("kc", 0),
        "cost": cost,
        "featured": featured,
    })
}

pub fn id_of(value: &Value) -> String {
    value["id"]
        .as_str()
        .expect("value has no id")
        .to_string()
}
