//! Server-side discovery and challenge helpers
//!
//! This module provides utilities for the gateway's HTTP surface:
//! - Protected Resource Metadata discovery (RFC 9728)
//! - WWW-Authenticate header generation for 401 responses
//! - Bearer token extraction from the Authorization header

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::parse_absolute_url;
use crate::error::{AuthError, AuthResult};

/// Path of the discovery document, relative to the resource
pub const METADATA_WELL_KNOWN_PATH: &str = "/.well-known/oauth-protected-resource";

/// Human-readable name advertised in the metadata document
pub const DEFAULT_RESOURCE_NAME: &str = "Toolgate MCP Server";

/// How a client may present its bearer token (RFC 6750)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BearerMethod {
    /// `Authorization: Bearer <token>`
    Header,
    /// Form-encoded body parameter
    Body,
    /// URI query parameter
    Query,
}

/// OAuth 2.0 Protected Resource Metadata (RFC 9728)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// Resource identifier (the gateway's public URL)
    pub resource: String,

    /// Authorization servers whose tokens are accepted
    pub authorization_servers: Vec<String>,

    /// Scopes the resource understands
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,

    /// Accepted token presentation methods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bearer_methods_supported: Vec<BearerMethod>,

    /// Human-readable resource name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,

    /// Developer documentation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_documentation: Option<String>,
}

/// Build the metadata document with default scopes, methods and name
///
/// # Errors
///
/// Returns [`AuthError::InvalidUrl`] if either URL is empty or not absolute.
///
/// # Example
///
/// ```rust
/// use toolgate_auth::server::build_metadata;
///
/// let metadata = build_metadata(
///     "https://mcp.example.com",
///     "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_pool",
/// )?;
/// assert_eq!(metadata.bearer_methods_supported.len(), 1);
/// # Ok::<(), toolgate_auth::AuthError>(())
/// ```
pub fn build_metadata(resource_url: &str, issuer_url: &str) -> AuthResult<ProtectedResourceMetadata> {
    ProtectedResourceMetadataBuilder::new(resource_url, issuer_url).build()
}

/// Discovery document URL for a resource
pub fn metadata_url(resource_url: &str) -> String {
    format!(
        "{}{}",
        resource_url.trim_end_matches('/'),
        METADATA_WELL_KNOWN_PATH
    )
}

/// Protected Resource Metadata builder
#[derive(Debug, Clone)]
pub struct ProtectedResourceMetadataBuilder {
    resource: String,
    authorization_server: String,
    scopes: Vec<String>,
    bearer_methods: Vec<BearerMethod>,
    resource_name: String,
    documentation_uri: Option<String>,
}

impl ProtectedResourceMetadataBuilder {
    /// Create a new metadata builder
    pub fn new(resource: impl Into<String>, authorization_server: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            authorization_server: authorization_server.into(),
            scopes: vec!["openid".to_string(), "profile".to_string()],
            bearer_methods: vec![BearerMethod::Header],
            resource_name: DEFAULT_RESOURCE_NAME.to_string(),
            documentation_uri: None,
        }
    }

    /// Set supported scopes
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Set bearer token methods
    pub fn with_bearer_methods(mut self, methods: Vec<BearerMethod>) -> Self {
        self.bearer_methods = methods;
        self
    }

    /// Set the resource name
    pub fn with_resource_name(mut self, name: impl Into<String>) -> Self {
        self.resource_name = name.into();
        self
    }

    /// Set documentation URI
    pub fn with_documentation(mut self, uri: impl Into<String>) -> Self {
        self.documentation_uri = Some(uri.into());
        self
    }

    /// Validate the URLs and build the document
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidUrl`] if the resource, authorization
    /// server or documentation URL is empty or not absolute.
    pub fn build(self) -> AuthResult<ProtectedResourceMetadata> {
        parse_absolute_url("resource_url", &self.resource)?;
        parse_absolute_url("issuer_url", &self.authorization_server)?;
        if let Some(doc) = &self.documentation_uri {
            parse_absolute_url("resource_documentation", doc)?;
        }

        Ok(ProtectedResourceMetadata {
            resource: self.resource,
            authorization_servers: vec![self.authorization_server],
            scopes_supported: self.scopes,
            bearer_methods_supported: self.bearer_methods,
            resource_name: Some(self.resource_name),
            resource_documentation: self.documentation_uri,
        })
    }
}

/// WWW-Authenticate header builder for 401 Unauthorized responses
///
/// Implements RFC 9728 Section 5.1 "WWW-Authenticate Response" for indicating
/// the location of Protected Resource Metadata.
#[derive(Debug, Clone)]
pub struct WwwAuthenticateBuilder {
    metadata_uri: String,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl WwwAuthenticateBuilder {
    /// Create a new WWW-Authenticate builder
    pub fn new(metadata_uri: impl Into<String>) -> Self {
        Self {
            metadata_uri: metadata_uri.into(),
            scope: None,
            error: None,
            error_description: None,
        }
    }

    /// Set required scope
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Set error code (RFC 6750 section 3.1) and description
    ///
    /// The description is sent to the client; pass a public message only.
    pub fn with_error(mut self, error: impl Into<String>, description: Option<&str>) -> Self {
        self.error = Some(error.into());
        self.error_description = description.map(str::to_string);
        self
    }

    /// Build the WWW-Authenticate header value
    ///
    /// Produces a header like:
    /// ```text
    /// Bearer resource_metadata="https://mcp.example.com/.well-known/oauth-protected-resource", error="invalid_token"
    /// ```
    pub fn build(self) -> String {
        let mut parts = vec![format!(
            "Bearer resource_metadata=\"{}\"",
            quote_escape(&self.metadata_uri)
        )];

        if let Some(scope) = self.scope {
            parts.push(format!("scope=\"{}\"", quote_escape(&scope)));
        }

        if let Some(error) = self.error {
            parts.push(format!("error=\"{}\"", quote_escape(&error)));
        }

        if let Some(description) = self.error_description {
            parts.push(format!(
                "error_description=\"{}\"",
                quote_escape(&description)
            ));
        }

        parts.join(", ")
    }
}

fn quote_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Extract the bearer token from an Authorization header value
///
/// The scheme is matched case-insensitively and exactly one token must
/// follow it.
///
/// # Errors
///
/// Returns [`AuthError::InvalidAuthorizationHeader`] for any other shape.
///
/// # Example
///
/// ```rust
/// # use toolgate_auth::server::extract_bearer_token;
/// assert_eq!(extract_bearer_token("Bearer mytoken")?, "mytoken");
/// assert!(extract_bearer_token("Basic dXNlcjpwYXNz").is_err());
/// # Ok::<(), toolgate_auth::AuthError>(())
/// ```
pub fn extract_bearer_token(authorization_header: &str) -> AuthResult<&str> {
    let mut parts = authorization_header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        _ => Err(AuthError::InvalidAuthorizationHeader),
    }
}

/// Build a 401 Unauthorized JSON response body
///
/// `public_message` must come from [`crate::sanitize`].
pub fn unauthorized_response_body(public_message: &str, metadata_uri: &str) -> Value {
    json!({
        "error": "unauthorized",
        "error_description": public_message,
        "resource_metadata": metadata_uri,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_metadata_defaults() {
        let metadata = build_metadata(
            "https://mcp.example.com",
            "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_pool",
        )
        .unwrap();

        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["resource"], "https://mcp.example.com");
        assert_eq!(
            value["authorization_servers"],
            json!(["https://cognito-idp.us-east-1.amazonaws.com/us-east-1_pool"])
        );
        assert_eq!(value["scopes_supported"], json!(["openid", "profile"]));
        assert_eq!(value["bearer_methods_supported"], json!(["header"]));
        assert_eq!(value["resource_name"], "Toolgate MCP Server");
        assert!(value.get("resource_documentation").is_none());
    }

    #[test]
    fn test_build_metadata_rejects_bad_urls() {
        assert!(matches!(
            build_metadata("", "https://issuer.example"),
            Err(AuthError::InvalidUrl {
                field: "resource_url",
                ..
            })
        ));
        assert!(matches!(
            build_metadata("https://mcp.example.com", "issuer.example"),
            Err(AuthError::InvalidUrl {
                field: "issuer_url",
                ..
            })
        ));
        assert!(build_metadata("/relative", "https://issuer.example").is_err());
    }

    #[test]
    fn test_metadata_builder_overrides() {
        let metadata =
            ProtectedResourceMetadataBuilder::new("https://mcp.example.com", "https://auth.example")
                .with_scopes(vec!["tools:read".to_string()])
                .with_resource_name("Internal Gateway")
                .with_documentation("https://mcp.example.com/docs")
                .build()
                .unwrap();

        assert_eq!(metadata.scopes_supported, vec!["tools:read"]);
        assert_eq!(metadata.resource_name.as_deref(), Some("Internal Gateway"));
        assert_eq!(
            metadata.resource_documentation.as_deref(),
            Some("https://mcp.example.com/docs")
        );
    }

    #[test]
    fn test_metadata_url() {
        assert_eq!(
            metadata_url("https://mcp.example.com/"),
            "https://mcp.example.com/.well-known/oauth-protected-resource"
        );
        assert_eq!(
            metadata_url("https://mcp.example.com"),
            "https://mcp.example.com/.well-known/oauth-protected-resource"
        );
    }

    #[test]
    fn test_www_authenticate_builder() {
        let header = WwwAuthenticateBuilder::new(
            "https://mcp.example.com/.well-known/oauth-protected-resource",
        )
        .with_scope("openid profile")
        .with_error("invalid_token", Some("token validation failed"))
        .build();

        assert_eq!(
            header,
            "Bearer resource_metadata=\"https://mcp.example.com/.well-known/oauth-protected-resource\", \
             scope=\"openid profile\", error=\"invalid_token\", \
             error_description=\"token validation failed\""
        );
    }

    #[test]
    fn test_www_authenticate_escapes_quotes() {
        let header = WwwAuthenticateBuilder::new("https://x.example/\"evil").build();
        assert_eq!(header, "Bearer resource_metadata=\"https://x.example/\\\"evil\"");
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(extract_bearer_token("Bearer mytoken123").unwrap(), "mytoken123");
        assert_eq!(extract_bearer_token("bearer mytoken123").unwrap(), "mytoken123");
        assert_eq!(extract_bearer_token("BEARER  mytoken123 ").unwrap(), "mytoken123");
    }

    #[test]
    fn test_bearer_token_extraction_invalid_format() {
        for header in ["mytoken123", "Bearer", "Bearer a b", "Basic abc", ""] {
            assert!(
                matches!(
                    extract_bearer_token(header),
                    Err(AuthError::InvalidAuthorizationHeader)
                ),
                "{header:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_unauthorized_response() {
        let response = unauthorized_response_body(
            "authentication required",
            "https://mcp.example.com/.well-known/oauth-protected-resource",
        );

        assert_eq!(response["error"], "unauthorized");
        assert_eq!(response["error_description"], "authentication required");
        assert!(response.get("resource_metadata").is_some());
    }
}
