use axum::http::{Method, StatusCode};
use serde_json::json;

use crate::helpers::{id_of, matchup_payload, spawn_app, team, ADMIN_KEY};

#[tokio::test]
async fn test_create_list_and_update_matchups() {
    let test_app = spawn_app().await;
    let created = test_app.create_matchup("nfl-1", 10, false).await;
    assert_eq!(created["status"], "SCHEDULED");
    assert_eq!(created["settlement_type"], "SCORE");
    assert_eq!(created["active"], true);

    let (status, body) = test_app
        .send_admin(
            Method::POST,
            "/api/v1/matchups",
            Some(matchup_payload("nfl-1", 10, false)),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_REQUEST");

    let (status, listed) = test_app
        .send(Method::GET, "/api/v1/matchups?league=NFL&active=true", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let id = id_of(&created);
    let (status, updated) = test_app
        .send_admin(
            Method::PUT,
            &format!("/api/v1/matchups/{}", id),
            Some(json!({ "status": "IN_PROGRESS", "home_team": team("den", 3) })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "IN_PROGRESS");
    assert_eq!(updated["home_team"]["score"], 3);
}

#[tokio::test]
async fn test_unknown_matchup_is_not_found() {
    let test_app = spawn_app().await;
    let (status, body) = test_app
        .send(
            Method::GET,
            &format!("/api/v1/matchups/{}", uuid::Uuid::now_v7()),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "MATCHUP_NOT_FOUND");
}

#[tokio::test]
async fn test_finalize_twice_conflicts() {
    let test_app = spawn_app().await;
    let matchup = test_app.create_matchup("nfl-2", 10, false).await;
    let id = id_of(&matchup);

    let (status, report) = test_app.finalize(&id, 10, 10).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["winner_id"], "PUSH");
    assert_eq!(report["completed"], true);

    let (status, body) = test_app.finalize(&id, 10, 10).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "MATCHUP_ALREADY_SETTLED");
}

#[tokio::test]
async fn test_operator_routes_require_admin_key() {
    let test_app = spawn_app().await;
    let id = id_of(&test_app.create_matchup("nfl-3", 10, false).await);
    let finalize_uri = format!("/api/v1/matchups/{}/finalize", id);
    let scores = json!({ "home_team": team("den", 21), "away_team": team("kc", 3) });

    for key in [None, Some("guess")] {
        let (status, body) = test_app
            .send_with_key(Method::POST, &finalize_uri, key, Some(scores.clone()))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "UNAUTHORIZED");

        let (status, _) = test_app
            .send_with_key(
                Method::POST,
                "/api/v1/matchups",
                key,
                Some(matchup_payload("nfl-4", 10, false)),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = test_app
            .send_with_key(Method::POST, "/api/v1/campaigns/rollover", key, None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = test_app
            .send_with_key(
                Method::POST,
                "/api/v1/squads",
                key,
                Some(json!({ "name": "Night Owls" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // Rejected calls left the matchup open
    let (_, matchup) = test_app
        .send(Method::GET, &format!("/api/v1/matchups/{}", id), None, None)
        .await;
    assert_eq!(matchup["active"], true);
    assert_eq!(matchup["status"], "SCHEDULED");

    let (status, _) = test_app
        .send_with_key(Method::POST, &finalize_uri, Some(ADMIN_KEY), Some(scores))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_settled_scores_cannot_be_rewritten() {
    let test_app = spawn_app().await;
    let id = id_of(&test_app.create_matchup("nfl-5", 10, false).await);

    let (status, _) = test_app.finalize(&id, 24, 17).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = test_app
        .send_admin(
            Method::PUT,
            &format!("/api/v1/matchups/{}", id),
            Some(json!({ "away_team": team("kc", 31) })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "MATCHUP_ALREADY_SETTLED");

    let (_, matchup) = test_app
        .send(Method::GET, &format!("/api/v1/matchups/{}", id), None, None)
        .await;
    assert_eq!(matchup["away_team"]["score"], 17);
    assert_eq!(matchup["winner_id"], "den");
}
