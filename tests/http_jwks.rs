//! HTTP-facing tests: JWKS fetching against a local server, the
//! `/authorize` route and the route-protecting layer.
#![cfg(feature = "server")]

mod common;

use std::sync::Arc;
use std::time::Duration;

use actions_oidc_authorizer::auth::RequireGatewayAuthorization;
use actions_oidc_authorizer::axum_integration::{router, AuthorizedContext};
use actions_oidc_authorizer::{AuthorizerError, HttpJwksSource, JwksSource};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use common::*;
use serde_json::{json, Value};
use tower::ServiceExt;

/// Serve a JWKS endpoint plus a few broken ones on an ephemeral port.
async fn spawn_jwks_server() -> String {
    let app = Router::new()
        .route("/.well-known/jwks", get(|| async { Json(jwks()) }))
        .route(
            "/broken",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream unavailable").into_response() }),
        )
        .route("/garbage", get(|| async { "<html>not a key set</html>" }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(jwks())
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

fn plain_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder().timeout(timeout).build().unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn authorize_event(headers: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/authorize")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "version": "2.0", "headers": headers }).to_string()))
        .unwrap()
}

// ---------------------------------------------------------------------------
// HttpJwksSource
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetches_jwks_document() {
    let base = spawn_jwks_server().await;
    let source = HttpJwksSource::with_client(
        format!("{}/.well-known/jwks", base),
        plain_client(Duration::from_secs(5)),
    );

    let document = source.fetch_jwks().await.unwrap();
    assert_eq!(document, jwks());
}

#[tokio::test]
async fn non_success_status_is_fetch_failure() {
    let base = spawn_jwks_server().await;
    let source = HttpJwksSource::with_client(format!("{}/broken", base), plain_client(Duration::from_secs(5)));

    let err = source.fetch_jwks().await.unwrap_err();
    assert!(matches!(err, AuthorizerError::KeyFetchFailed(ref msg) if msg.contains("500")));
}

#[tokio::test]
async fn unparseable_body_is_fetch_failure() {
    let base = spawn_jwks_server().await;
    let source = HttpJwksSource::with_client(format!("{}/garbage", base), plain_client(Duration::from_secs(5)));

    assert!(matches!(
        source.fetch_jwks().await.unwrap_err(),
        AuthorizerError::KeyFetchFailed(_)
    ));
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let base = spawn_jwks_server().await;
    let source = HttpJwksSource::with_client(format!("{}/slow", base), plain_client(Duration::from_millis(200)));

    assert!(matches!(
        source.fetch_jwks().await.unwrap_err(),
        AuthorizerError::KeyFetchFailed(_)
    ));
}

#[tokio::test]
async fn default_client_refuses_plain_http() {
    let base = spawn_jwks_server().await;
    let source = HttpJwksSource::new(format!("{}/.well-known/jwks", base), Duration::from_secs(5)).unwrap();

    assert!(matches!(
        source.fetch_jwks().await.unwrap_err(),
        AuthorizerError::KeyFetchFailed(_)
    ));
}

#[tokio::test]
async fn authorizer_over_http_source_allows_valid_token() {
    let base = spawn_jwks_server().await;
    let source = Arc::new(HttpJwksSource::with_client(
        format!("{}/.well-known/jwks", base),
        plain_client(Duration::from_secs(5)),
    ));
    let authorizer = actions_oidc_authorizer::Authorizer::with_source(Default::default(), source);

    let request =
        actions_oidc_authorizer::AuthorizerRequest::with_authorization(format!("Bearer {}", sign(&valid_claims())));
    let response = authorizer.authorize(&request).await;

    assert!(response.is_authorized);
    assert_eq!(response.context.unwrap().repository, "octodemo/actions-playground");
}

// ---------------------------------------------------------------------------
// POST /authorize
// ---------------------------------------------------------------------------

#[tokio::test]
async fn authorize_route_allows_valid_event() {
    let app = router(Arc::new(authorizer_with(CountingSource::serving(vec![jwks()]))));
    let token = sign(&valid_claims());

    let response = app
        .oneshot(authorize_event(json!({ "authorization": format!("Bearer {}", token) })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({
            "isAuthorized": true,
            "context": {
                "repository": "octodemo/actions-playground",
                "workflow": "ci",
                "ref": "refs/heads/main",
                "actor": "alice",
            }
        })
    );
}

#[tokio::test]
async fn authorize_route_denies_missing_header() {
    let app = router(Arc::new(authorizer_with(CountingSource::serving(vec![jwks()]))));

    let response = app
        .oneshot(authorize_event(json!({ "host": "example.com" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "isAuthorized": false }));
}

#[tokio::test]
async fn authorize_route_denies_unparseable_event() {
    let app = router(Arc::new(authorizer_with(CountingSource::serving(vec![jwks()]))));

    let request = Request::builder()
        .method("POST")
        .uri("/authorize")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "isAuthorized": false }));
}

// ---------------------------------------------------------------------------
// RequireGatewayAuthorization
// ---------------------------------------------------------------------------

async fn greet(context: AuthorizedContext) -> String {
    format!("Hello, {} from {}!", context.actor, context.repository)
}

fn protected_app() -> Router {
    let authorizer = Arc::new(authorizer_with(CountingSource::serving(vec![jwks()])));
    Router::new()
        .route("/greet", get(greet))
        .layer(RequireGatewayAuthorization::new(authorizer))
}

#[tokio::test]
async fn protected_route_receives_context() {
    let request = Request::builder()
        .uri("/greet")
        .header(header::AUTHORIZATION, format!("Bearer {}", sign(&valid_claims())))
        .body(Body::empty())
        .unwrap();

    let response = protected_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"Hello, alice from octodemo/actions-playground!");
}

#[tokio::test]
async fn protected_route_rejects_other_repository() {
    let token = sign(&with_claim("repository", json!("octodemo/other-repo")));
    let request = Request::builder()
        .uri("/greet")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = protected_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await, json!({ "isAuthorized": false }));
}

#[tokio::test]
async fn extractor_without_layer_is_unauthorized() {
    let app = Router::new().route("/greet", get(greet));
    let request = Request::builder().uri("/greet").body(Body::empty()).unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
