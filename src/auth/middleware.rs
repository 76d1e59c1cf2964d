use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    extract::Request,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use futures::future::{BoxFuture, FutureExt};
use tower::{Layer, Service};

use crate::authorizer::{Authorizer, AuthorizerResponse};
use crate::axum_integration::{request_from_headers, AuthorizedContext};

/// Middleware layer that admits only requests the authorizer allows.
///
/// Allowed requests reach the inner service with an [`AuthorizedContext`]
/// in their extensions. Everything else gets `403` with the denial body.
#[derive(Clone)]
pub struct RequireGatewayAuthorization {
    authorizer: Arc<Authorizer>,
}

impl RequireGatewayAuthorization {
    pub fn new(authorizer: Arc<Authorizer>) -> Self {
        Self { authorizer }
    }
}

impl<S> Layer<S> for RequireGatewayAuthorization {
    type Service = RequireGatewayAuthorizationMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireGatewayAuthorizationMiddleware {
            inner,
            authorizer: self.authorizer.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RequireGatewayAuthorizationMiddleware<S> {
    inner: S,
    authorizer: Arc<Authorizer>,
}

impl<S> Service<Request> for RequireGatewayAuthorizationMiddleware<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), S::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        // Take the service that was driven to readiness, leave a clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let authorizer = self.authorizer.clone();

        async move {
            let verdict = authorizer.authorize(&request_from_headers(request.headers())).await;

            match verdict.context {
                Some(context) if verdict.is_authorized => {
                    request.extensions_mut().insert(AuthorizedContext(context));
                    inner.call(request).await
                }
                _ => Ok(denied_response()),
            }
        }
        .boxed()
    }
}

fn denied_response() -> Response {
    let body = serde_json::to_vec(&AuthorizerResponse::denied()).unwrap_or_default();
    (
        StatusCode::FORBIDDEN,
        [(header::CONTENT_TYPE, "application/json")],
        Body::from(body),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyConfig;
    use crate::error::{AuthorizerError, Result as AuthResult};
    use crate::oidc::JwksSource;
    use async_trait::async_trait;
    use serde_json::Value;

    macro_rules! echo_service {
        () => {
            tower::service_fn(|_req: Request| async {
                Ok::<Response, Box<dyn std::error::Error + Send + Sync>>("OK".into_response())
            })
        };
    }

    struct UnreachableSource;

    #[async_trait]
    impl JwksSource for UnreachableSource {
        async fn fetch_jwks(&self) -> AuthResult<Value> {
            Err(AuthorizerError::KeyFetchFailed("unreachable".to_string()))
        }
    }

    fn layer() -> RequireGatewayAuthorization {
        let authorizer = Authorizer::with_source(PolicyConfig::default(), Arc::new(UnreachableSource));
        RequireGatewayAuthorization::new(Arc::new(authorizer))
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), 1024).await.unwrap().to_vec()
    }

    #[tokio::test]
    async fn test_missing_header_is_forbidden() {
        let mut service = tower::ServiceBuilder::new().layer(layer()).service(echo_service!());
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();

        let response = service.call(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_bytes(response).await, br#"{"isAuthorized":false}"#);
    }

    #[tokio::test]
    async fn test_wrong_scheme_is_forbidden() {
        let mut service = tower::ServiceBuilder::new().layer(layer()).service(echo_service!());
        let request = Request::builder()
            .uri("/")
            .header("Authorization", "Token abc.def.ghi")
            .body(Body::empty())
            .unwrap();

        let response = service.call(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unverifiable_token_is_forbidden() {
        let mut service = tower::ServiceBuilder::new().layer(layer()).service(echo_service!());
        let request = Request::builder()
            .uri("/")
            .header("Authorization", "Bearer abc.def.ghi")
            .body(Body::empty())
            .unwrap();

        let response = service.call(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_bytes(response).await, br#"{"isAuthorized":false}"#);
    }
}
