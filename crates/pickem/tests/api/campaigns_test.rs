use axum::http::{Method, StatusCode};

use crate::helpers::{id_of, spawn_app};

#[tokio::test]
async fn test_leaderboard_orders_by_chain() {
    let test_app = spawn_app().await;
    test_app.register("auth|dot").await;
    test_app.register("auth|eve").await;

    let matchup_id = id_of(&test_app.create_matchup("nfl-1", 10, false).await);
    test_app.make_pick("auth|dot", &matchup_id, "kc").await;
    test_app.make_pick("auth|eve", &matchup_id, "den").await;
    test_app.finalize(&matchup_id, 3, 24).await;

    let (status, board) = test_app
        .send(
            Method::GET,
            "/api/v1/campaigns/current/leaderboard",
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let board = board.as_array().unwrap();
    assert_eq!(board.len(), 2);
    assert_eq!(board[0]["username"], "auth|dot");
    assert_eq!(board[0]["chain"], 1);
    assert_eq!(board[1]["chain"], -1);
}

#[tokio::test]
async fn test_forced_rollover() {
    let test_app = spawn_app().await;

    let (status, current) = test_app
        .send(Method::GET, "/api/v1/campaigns/current", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = test_app
        .send_admin(Method::POST, "/api/v1/campaigns/rollover", None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "NO_CHAINS");

    test_app.register("auth|fin").await;
    let (status, _) = test_app
        .send(Method::GET, "/api/v1/chains/active", Some("auth|fin"), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, summary) = test_app
        .send_admin(Method::POST, "/api/v1/campaigns/rollover", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["closed_campaign_id"], current["id"]);
    assert_eq!(summary["chains_closed"], 1);

    let (_, next) = test_app
        .send(Method::GET, "/api/v1/campaigns/current", None, None)
        .await;
    assert_eq!(next["id"], summary["next_campaign"]["id"]);
    assert_ne!(next["id"], current["id"]);
}

#[tokio::test]
async fn test_health_check() {
    let test_app = spawn_app().await;
    let (status, _) = test_app
        .send(Method::GET, "/api/v1/health_check", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
}
