use axum::http::{Method, StatusCode};
use serde_json::json;

use crate::helpers::{spawn_app, STARTING_COINS};

#[tokio::test]
async fn test_register_is_idempotent() {
    let test_app = spawn_app().await;

    let first = test_app.register("auth|wren").await;
    assert_eq!(first["coins"], STARTING_COINS);
    assert_eq!(first["username"], "auth|wren");

    let second = test_app.register("auth|wren").await;
    assert_eq!(first["id"], second["id"]);
    assert_eq!(second["coins"], STARTING_COINS);

    let (status, ledger) = test_app
        .send(
            Method::GET,
            "/api/v1/users/me/transactions",
            Some("auth|wren"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let ledger = ledger.as_array().unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0]["transaction_type"], "ADMIN");
    assert_eq!(ledger[0]["amount"], STARTING_COINS);
}

#[tokio::test]
async fn test_identity_header_required() {
    let test_app = spawn_app().await;

    let (status, body) = test_app
        .send(Method::GET, "/api/v1/users/me", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHORIZED");

    let (status, body) = test_app
        .send(Method::GET, "/api/v1/users/me", Some("auth|ghost"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "USER_NOT_FOUND");
}

#[tokio::test]
async fn test_join_squad() {
    let test_app = spawn_app().await;
    test_app.register("auth|yara").await;

    let (status, squad) = test_app
        .send_admin(
            Method::POST,
            "/api/v1/squads",
            Some(json!({ "name": "Early Birds" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, user) = test_app
        .send(
            Method::PUT,
            "/api/v1/users/me/squad",
            Some("auth|yara"),
            Some(json!({ "squad_id": squad["id"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["squad_id"], squad["id"]);

    let (status, body) = test_app
        .send(
            Method::PUT,
            "/api/v1/users/me/squad",
            Some("auth|yara"),
            Some(json!({ "squad_id": uuid::Uuid::now_v7() })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_REQUEST");
}
