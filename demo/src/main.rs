//! Toolgate demo gateway
//!
//! Serves the protected-resource discovery document and a bearer-protected
//! `/mcp` endpoint that reports the authenticated identity.
//!
//! ```text
//! TOOLGATE_RESOURCE_URL=https://mcp.example.com \
//! TOOLGATE_AUTH__ISSUER=https://cognito-idp.us-east-1.amazonaws.com/us-east-1_pool \
//! toolgate-demo
//! ```
//!
//! Set `TOOLGATE_CONFIG` to read settings from a TOML/YAML/JSON file first.

mod config;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Context;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use toolgate_auth::middleware::{BearerAuthConfig, BearerAuthLayer};
use toolgate_auth::server::METADATA_WELL_KNOWN_PATH;
use toolgate_auth::{
    AuthContext, ProtectedResourceMetadata, TokenAuthenticator, TokenVerifier, build_metadata,
};
use tracing::info;

use crate::config::GatewayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os("TOOLGATE_CONFIG").map(PathBuf::from);
    let config = GatewayConfig::load(config_path.as_deref()).context("loading configuration")?;
    config.logging.init().context("initializing logging")?;

    let metadata = build_metadata(&config.resource_url, &config.auth.issuer)
        .context("building protected-resource metadata")?;
    let verifier = TokenVerifier::new(config.auth.clone()).context("building token verifier")?;
    let auth_layer = BearerAuthLayer::new(
        verifier,
        BearerAuthConfig::for_resource(&config.resource_url)?,
    );

    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!(
        %addr,
        resource = %config.resource_url,
        issuer = %config.auth.issuer,
        jwks_uri = %config.auth.key_source_url(),
        "Gateway listening"
    );

    axum::serve(listener, router(metadata, auth_layer))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    info!("Gateway stopped");
    Ok(())
}

fn router<A>(metadata: ProtectedResourceMetadata, auth_layer: BearerAuthLayer<A>) -> Router
where
    A: TokenAuthenticator + 'static,
{
    let protected: Router = Router::new().route("/mcp", post(mcp)).layer(auth_layer);

    Router::new()
        .route(METADATA_WELL_KNOWN_PATH, get(discovery))
        .with_state(Arc::new(metadata))
        .merge(protected)
}

async fn discovery(
    State(metadata): State<Arc<ProtectedResourceMetadata>>,
) -> Json<ProtectedResourceMetadata> {
    Json(metadata.as_ref().clone())
}

/// Stand-in for tool dispatch: reports who called and what
async fn mcp(Extension(auth): Extension<AuthContext>, Json(request): Json<Value>) -> Json<Value> {
    let expires_in = auth
        .expires_at
        .duration_since(SystemTime::now())
        .map(|d| d.as_secs())
        .unwrap_or_default();

    info!(subject = %auth.subject, method = %request["method"], "Tool call");

    Json(json!({
        "jsonrpc": "2.0",
        "id": request.get("id").cloned().unwrap_or(Value::Null),
        "result": {
            "subject": auth.subject,
            "org_id": auth.org_id().unwrap_or_default(),
            "scopes": auth.scopes,
            "expires_in": expires_in,
            "forwards_credentials": auth.bearer_header().is_ok(),
        }
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header, request::Parts};
    use std::collections::HashMap;
    use std::time::Duration;
    use toolgate_auth::FailureReason;
    use tower::ServiceExt;

    /// Accepts the token "demo-token" for subject "user-1"
    struct StaticAuthenticator;

    #[async_trait]
    impl TokenAuthenticator for StaticAuthenticator {
        async fn authenticate(
            &self,
            token: &str,
            _request: Option<&Parts>,
        ) -> Result<AuthContext, FailureReason> {
            if token != "demo-token" {
                return Err(FailureReason::SignatureInvalid);
            }
            Ok(AuthContext {
                subject: "user-1".to_string(),
                expires_at: SystemTime::now() + Duration::from_secs(600),
                scopes: vec!["openid".to_string()],
                extra: HashMap::from([
                    ("raw_token".to_string(), Value::from(token)),
                    ("org_id".to_string(), Value::from("org-1")),
                ]),
            })
        }
    }

    fn app() -> Router {
        let metadata = build_metadata(
            "https://mcp.example.com",
            "https://issuer.example/pool",
        )
        .unwrap();
        let layer = BearerAuthLayer::new(
            StaticAuthenticator,
            BearerAuthConfig::for_resource("https://mcp.example.com").unwrap(),
        );
        router(metadata, layer)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_discovery_is_public() {
        let response = app()
            .oneshot(
                Request::get(METADATA_WELL_KNOWN_PATH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["resource"], "https://mcp.example.com");
        assert_eq!(body["authorization_servers"][0], "https://issuer.example/pool");
        assert_eq!(body["resource_name"], "Toolgate MCP Server");
    }

    #[tokio::test]
    async fn test_mcp_requires_token() {
        let response = app()
            .oneshot(
                Request::post("/mcp")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = response.headers()[header::WWW_AUTHENTICATE].to_str().unwrap();
        assert!(challenge.contains(
            "resource_metadata=\"https://mcp.example.com/.well-known/oauth-protected-resource\""
        ));
    }

    #[tokio::test]
    async fn test_mcp_with_token() {
        let response = app()
            .oneshot(
                Request::post("/mcp")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::AUTHORIZATION, "Bearer demo-token")
                    .body(Body::from(r#"{"jsonrpc":"2.0","id":7,"method":"tools/list"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["id"], 7);
        assert_eq!(body["result"]["subject"], "user-1");
        assert_eq!(body["result"]["org_id"], "org-1");
        assert_eq!(body["result"]["forwards_credentials"], true);
    }
}
