//! Tower Service implementation for bearer authentication
//!
//! Works with `http::Request<B>` for any body type, so it plugs into axum,
//! hyper or tower-http stacks. Rejections are ordinary 401 responses, not
//! service errors; the inner service's error type passes through unchanged.

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use http::header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use http::{HeaderValue, StatusCode};
use tower::Service;
use tracing::{debug, warn};

use crate::context::TokenAuthenticator;
use crate::sanitize::{self, AUTHENTICATION_REQUIRED};
use crate::server::{extract_bearer_token, unauthorized_response_body};

use super::BearerAuthConfig;

/// Tower Service that performs bearer authentication
///
/// This service extracts the bearer token, authenticates it with the
/// configured [`TokenAuthenticator`], and inserts the resulting
/// [`AuthContext`](crate::AuthContext) into the request's extensions before
/// forwarding to the inner service.
///
/// # Type Parameters
///
/// * `S` - The inner service type
/// * `A` - The authenticator type
pub struct BearerAuthService<S, A> {
    inner: S,
    authenticator: Arc<A>,
    config: Arc<BearerAuthConfig>,
}

impl<S: Clone, A> Clone for BearerAuthService<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            authenticator: Arc::clone(&self.authenticator),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: fmt::Debug, A> fmt::Debug for BearerAuthService<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuthService")
            .field("inner", &self.inner)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S, A> BearerAuthService<S, A> {
    /// Create a new auth service
    pub fn new(inner: S, authenticator: Arc<A>, config: Arc<BearerAuthConfig>) -> Self {
        Self {
            inner,
            authenticator,
            config,
        }
    }

    /// Get a reference to the inner service
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Service configuration
    pub fn config(&self) -> &BearerAuthConfig {
        &self.config
    }
}

/// Future type for auth service responses
pub type BearerAuthServiceFuture<T, E> = BoxFuture<'static, Result<T, E>>;

impl<S, A, B, ResBody> Service<http::Request<B>> for BearerAuthService<S, A>
where
    S: Service<http::Request<B>, Response = http::Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send + 'static,
    A: TokenAuthenticator + 'static,
    B: Send + 'static,
    ResBody: From<String> + Send + 'static,
{
    type Response = http::Response<ResBody>;
    type Error = S::Error;
    type Future = BearerAuthServiceFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        // The clone may not be ready; keep the driven instance for this call
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if self.config.should_bypass(req.uri().path()) {
            return Box::pin(async move { inner.call(req).await });
        }

        let (mut parts, body) = req.into_parts();

        let token = match parts.headers.get(AUTHORIZATION) {
            None => {
                debug!(path = %parts.uri.path(), "Request without credentials");
                let response = unauthorized(&self.config, None, AUTHENTICATION_REQUIRED);
                return Box::pin(async move { Ok(response) });
            }
            Some(value) => match value.to_str().map(extract_bearer_token) {
                Ok(Ok(token)) => token.to_string(),
                _ => {
                    debug!(path = %parts.uri.path(), "Malformed Authorization header");
                    let response =
                        unauthorized(&self.config, Some("invalid_request"), AUTHENTICATION_REQUIRED);
                    return Box::pin(async move { Ok(response) });
                }
            },
        };

        let authenticator = Arc::clone(&self.authenticator);
        let config = Arc::clone(&self.config);

        Box::pin(async move {
            match authenticator.authenticate(&token, Some(&parts)).await {
                Ok(auth_context) => {
                    parts.extensions.insert(auth_context);
                    inner.call(http::Request::from_parts(parts, body)).await
                }
                Err(reason) => {
                    let message = sanitize::reject(
                        reason,
                        &format_args!("{} {}", parts.method, parts.uri.path()),
                    );
                    Ok(unauthorized(&config, Some("invalid_token"), message))
                }
            }
        })
    }
}

/// 401 response with challenge header and JSON body
fn unauthorized<ResBody: From<String>>(
    config: &BearerAuthConfig,
    error: Option<&str>,
    public_message: &'static str,
) -> http::Response<ResBody> {
    let body = unauthorized_response_body(public_message, &config.metadata_url).to_string();
    let mut response = http::Response::new(ResBody::from(body));
    *response.status_mut() = StatusCode::UNAUTHORIZED;

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    match HeaderValue::from_str(&config.challenge(error)) {
        Ok(challenge) => {
            headers.insert(WWW_AUTHENTICATE, challenge);
        }
        Err(e) => {
            warn!(error = %e, metadata_url = %config.metadata_url, "Challenge is not a valid header value");
            headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_response_shape() {
        let config = BearerAuthConfig::new("https://m.example/prm");
        let response: http::Response<String> =
            unauthorized(&config, Some("invalid_token"), "token validation failed");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[WWW_AUTHENTICATE],
            "Bearer resource_metadata=\"https://m.example/prm\", error=\"invalid_token\""
        );
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");

        let body: serde_json::Value = serde_json::from_str(response.body()).unwrap();
        assert_eq!(body["error_description"], "token validation failed");
    }

    #[test]
    fn test_unencodable_metadata_url_falls_back() {
        let config = BearerAuthConfig::new("https://m.example/\nprm");
        let response: http::Response<String> = unauthorized(&config, None, AUTHENTICATION_REQUIRED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer");
    }
}
