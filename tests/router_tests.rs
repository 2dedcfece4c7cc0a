mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use common::Harness;
use dyncreds::server::{DynCredsState, dyncreds_router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const KEY: &str = "pwd";

async fn app() -> (Router, Arc<Harness>) {
    let h = Harness::new().await;
    let engine = dyncreds::CredentialEngine::new(
        h.roles.clone(),
        h.engine.registry().clone(),
        common::generator(),
    );
    let state = DynCredsState::new(Arc::new(engine), h.leases.clone(), Arc::from(KEY));
    (dyncreds_router(state), Arc::new(h))
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.expect("request failed");
    let status = resp.status();
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).expect("response body was not json")
    };
    (status, value)
}

fn put_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-api-key", KEY)
        .body(Body::from(body.to_string()))
        .expect("failed to build request")
}

#[tokio::test]
async fn creds_route_requires_key() {
    let (app, _h) = app().await;
    let (status, body) = send(
        &app,
        Request::builder()
            .uri("/creds/app")
            .header("x-api-key", "wrong")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn issue_renew_revoke_round_trip() {
    let (app, h) = app().await;

    let (status, body) = send(
        &app,
        Request::builder()
            .uri("/creds/app")
            .header("authorization", format!("Bearer {KEY}"))
            .header("x-display-name", "alice")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lease_duration"], 3600);
    let username = body["data"]["username"].as_str().unwrap().to_string();
    assert!(username.starts_with("v-app-alice-"));
    assert!(body["data"]["password"].as_str().unwrap().len() >= 32);
    let lease_id = body["lease_id"].as_str().unwrap().to_string();
    assert!(h.account("primary", &username).await.is_some());

    let (status, body) = send(
        &app,
        put_json("/leases/renew", json!({"lease_id": lease_id, "increment": 100000})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    // clamped to the role's 2h max_ttl
    let duration = body["lease_duration"].as_u64().unwrap();
    assert!(duration <= 7200 && duration > 7190, "got {duration}");
    let stored = h.leases.get_lease(&lease_id).await.unwrap().unwrap();
    assert_eq!(stored.ttl.as_secs(), duration);

    for _ in 0..2 {
        let (status, _) = send(&app, put_json("/leases/revoke", json!({"lease_id": lease_id}))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
    assert!(h.account("primary", &username).await.is_none());
    assert!(h.leases.get_lease(&lease_id).await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_role_and_lease_are_not_found() {
    let (app, _h) = app().await;

    let (status, body) = send(
        &app,
        Request::builder()
            .uri("/creds/ghost")
            .header("x-api-key", KEY)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = send(
        &app,
        put_json("/leases/renew", json!({"lease_id": "creds/app/missing"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_is_public() {
    let (app, _h) = app().await;
    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
