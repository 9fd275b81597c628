//! Tower Layer implementation for bearer authentication

use std::fmt;
use std::sync::Arc;

use tower::Layer;

use crate::context::TokenAuthenticator;

use super::BearerAuthConfig;
use super::service::BearerAuthService;

/// Tower Layer that adds bearer authentication to services
///
/// This layer wraps inner services with [`BearerAuthService`], which
/// authenticates the bearer token before forwarding requests.
pub struct BearerAuthLayer<A> {
    authenticator: Arc<A>,
    config: Arc<BearerAuthConfig>,
}

impl<A> Clone for BearerAuthLayer<A> {
    fn clone(&self) -> Self {
        Self {
            authenticator: Arc::clone(&self.authenticator),
            config: Arc::clone(&self.config),
        }
    }
}

impl<A> fmt::Debug for BearerAuthLayer<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuthLayer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<A> BearerAuthLayer<A>
where
    A: TokenAuthenticator,
{
    /// Create a new auth layer
    pub fn new(authenticator: A, config: BearerAuthConfig) -> Self {
        Self::from_arc(Arc::new(authenticator), config)
    }

    /// Create a new auth layer from an Arc'd authenticator
    pub fn from_arc(authenticator: Arc<A>, config: BearerAuthConfig) -> Self {
        Self {
            authenticator,
            config: Arc::new(config),
        }
    }

    /// Layer configuration
    pub fn config(&self) -> &BearerAuthConfig {
        &self.config
    }
}

impl<S, A> Layer<S> for BearerAuthLayer<A> {
    type Service = BearerAuthService<S, A>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuthService::new(
            inner,
            Arc::clone(&self.authenticator),
            Arc::clone(&self.config),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AuthContext;
    use crate::error::FailureReason;
    use async_trait::async_trait;

    struct RejectAll;

    #[async_trait]
    impl TokenAuthenticator for RejectAll {
        async fn authenticate(
            &self,
            _token: &str,
            _request: Option<&http::request::Parts>,
        ) -> Result<AuthContext, FailureReason> {
            Err(FailureReason::SignatureInvalid)
        }
    }

    #[test]
    fn test_layer_shares_authenticator() {
        let layer = BearerAuthLayer::new(
            RejectAll,
            BearerAuthConfig::new("https://m.example/prm").bypass_path("/healthz"),
        );
        let clone = layer.clone();
        assert!(Arc::ptr_eq(&layer.authenticator, &clone.authenticator));
        assert!(clone.config().should_bypass("/healthz"));
    }

    #[test]
    fn test_layer_wraps_service() {
        let layer = BearerAuthLayer::new(RejectAll, BearerAuthConfig::new("https://m.example/prm"));
        let service = layer.layer(tower::service_fn(|_req: http::Request<String>| async {
            Ok::<_, std::convert::Infallible>(http::Response::new(String::new()))
        }));
        assert_eq!(service.config().metadata_url, "https://m.example/prm");
    }
}
