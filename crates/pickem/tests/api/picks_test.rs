use axum::http::{Method, StatusCode};
use pickem::domain::Job;

use crate::helpers::{id_of, spawn_app};

#[tokio::test]
async fn test_winning_pick_end_to_end() {
    let test_app = spawn_app().await;
    test_app.register("auth|zoe").await;
    let matchup = test_app.create_matchup("nfl-1", 10, false).await;
    let matchup_id = id_of(&matchup);

    let (status, pick) = test_app.make_pick("auth|zoe", &matchup_id, "den").await;
    assert_eq!(status, StatusCode::CREATED, "{}", pick);
    assert_eq!(pick["status"], "PENDING");
    assert_eq!(pick["pick_team"]["id"], "den");

    let (status, active) = test_app
        .send(Method::GET, "/api/v1/picks/active", Some("auth|zoe"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active["id"], pick["id"]);

    let (status, report) = test_app.finalize(&matchup_id, 27, 20).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["settled"][0]["coins"], 20);

    let me = test_app.me("auth|zoe").await;
    assert_eq!(me["coins"], 70);
    assert_eq!(me["wins"], 1);
    assert_eq!(me["league_stats"][0]["league"], "NFL");
    assert_eq!(me["league_stats"][0]["wins"], 1);

    let (status, chain) = test_app
        .send(Method::GET, "/api/v1/chains/active", Some("auth|zoe"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chain["chain"], 1);
    assert_eq!(chain["wins"], 1);

    let (_, active) = test_app
        .send(Method::GET, "/api/v1/picks/active", Some("auth|zoe"), None)
        .await;
    assert!(active.is_null());

    let (_, picks) = test_app
        .send(Method::GET, "/api/v1/picks", Some("auth|zoe"), None)
        .await;
    assert_eq!(picks[0]["status"], "WIN");

    let mut notified = false;
    for job in test_app.queued_jobs().await {
        if let Job::NotifyPickSettled(notification) = job {
            assert_eq!(notification.user_external_id, "auth|zoe");
            assert_eq!(notification.coins, 20);
            notified = true;
        }
    }
    assert!(notified);
}

#[tokio::test]
async fn test_tied_matchup_pushes() {
    let test_app = spawn_app().await;
    test_app.register("auth|abe").await;
    let matchup = test_app.create_matchup("nfl-1", 10, false).await;
    let matchup_id = id_of(&matchup);
    test_app.make_pick("auth|abe", &matchup_id, "kc").await;

    let (status, report) = test_app.finalize(&matchup_id, 17, 17).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["settled"][0]["outcome"], "PUSH");

    let me = test_app.me("auth|abe").await;
    assert_eq!(me["coins"], 50);
    assert_eq!(me["pushes"], 1);

    let (_, chain) = test_app
        .send(Method::GET, "/api/v1/chains/active", Some("auth|abe"), None)
        .await;
    assert_eq!(chain["chain"], 0);
    assert_eq!(chain["pushes"], 1);
}

#[tokio::test]
async fn test_pick_conflicts_and_funds() {
    let test_app = spawn_app().await;
    test_app.register("auth|bea").await;
    let first = id_of(&test_app.create_matchup("nfl-1", 10, false).await);
    let second = id_of(&test_app.create_matchup("nfl-2", 10, false).await);
    let pricey = id_of(&test_app.create_matchup("nfl-3", 500, false).await);

    let (status, body) = test_app.make_pick("auth|bea", &pricey, "den").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INSUFFICIENT_FUNDS");

    let (status, _) = test_app.make_pick("auth|bea", &first, "den").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = test_app.make_pick("auth|bea", &second, "kc").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "EXISTING_PICK_FOUND");
}

#[tokio::test]
async fn test_cancel_pick() {
    let test_app = spawn_app().await;
    test_app.register("auth|cy").await;
    let matchup_id = id_of(&test_app.create_matchup("nfl-1", 10, false).await);
    let (_, pick) = test_app.make_pick("auth|cy", &matchup_id, "den").await;
    let pick_id = id_of(&pick);

    let (status, _) = test_app
        .send(
            Method::DELETE,
            &format!("/api/v1/picks/{}", pick_id),
            Some("auth|cy"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = test_app
        .send(
            Method::DELETE,
            &format!("/api/v1/picks/{}", pick_id),
            Some("auth|cy"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "PICK_NOT_FOUND");
}
