//! Common test utilities for integration tests
//!
//! Provides a wiremock-backed issuer that serves a JWKS document, the two
//! fixture RSA keys, and token minting helpers.

#![allow(dead_code)]

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use toolgate_auth::VerifierConfig;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const JWKS_PATH: &str = "/.well-known/jwks.json";

pub const K1_PEM: &[u8] = include_bytes!("../fixtures/k1.pem");
pub const K2_PEM: &[u8] = include_bytes!("../fixtures/k2.pem");

const K1_N: &str = "wDnTAJqxM4xO2YY-clpgXeuTUtahCLb797pcCMhY1c3MJE9m5qnIDMj_9GDY81RlKJfCPho3qXO0eFG6NXTo4nL2aJzjc1k8AuarKPLunzTst5NXhnQ74N_d9ena7JfAgNBbH8aYBV9XbF94dXHcpIoNXtzcZY1CifU9UzGkQyCS-lK0KHCjwdcXS5epPZUaKH1JubRyorciRnVqBJK2Uzd0Yg5R-Mymch8oMsk-1kDCX8TQ8JjkPSQHwGLXjieKSRUyoJKHmeO4IZyWdLVAl_2pq_Bi5-CNAkL43x-N7UCjQ0mPhYDq_fguvrtUi2yeiVW-x8fmuLgDLcMhrdkFxw";
const K2_N: &str = "oN6I26v1NhmR75zl47fzwACYbnnOnMM20zVMaQOcsj4RmORi6I8qrxfM62wWrZdIFVe33sYqPcJcHgjAsO9ZV3jpNPH8p4uV7SufWQEXMikzJ-a_HwB21XmfHZ241CrX6NMQZdmvaBcgLd8X7W68fgzFLYTxn9q_u9n3fGX6mnp3UnDDtEmUejFG-mRdZwLX3mfL_6elJwo_EEfuGeNOuxYiL-hXo-y2GCsOSoy1sGuuxzHcSSkH_SoSXv7bxrOa92R3tt4JMREDHptQ0pj9oNqp3z_QVT1zS6tegGLKSMNyrKUiEoY43vZxCiRErcv68PTxDtgmgId2xDoq2Pln9Q";

/// Public JWK for fixture key 1
pub fn k1_jwk() -> Value {
    rsa_jwk("k1", K1_N)
}

/// Public JWK for fixture key 2
pub fn k2_jwk() -> Value {
    rsa_jwk("k2", K2_N)
}

fn rsa_jwk(kid: &str, n: &str) -> Value {
    json!({
        "kty": "RSA",
        "kid": kid,
        "use": "sig",
        "alg": "RS256",
        "n": n,
        "e": "AQAB"
    })
}

/// Mock identity provider serving its key set at the well-known path
pub struct MockIssuer {
    pub server: MockServer,
    pub issuer: String,
    pub jwks_uri: String,
}

impl MockIssuer {
    /// Start a mock issuer with no key set mounted
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let issuer = server.uri();

        Self {
            jwks_uri: format!("{issuer}{JWKS_PATH}"),
            server,
            issuer,
        }
    }

    /// Serve these keys for every request
    pub async fn mock_jwks(&self, keys: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
            .mount(&self.server)
            .await;
    }

    /// Serve these keys for the next `times` requests only
    ///
    /// Mount before the steady-state mock; wiremock answers with the first
    /// matching mock that still has uses left.
    pub async fn mock_jwks_times(&self, keys: Vec<Value>, times: u64) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
            .up_to_n_times(times)
            .mount(&self.server)
            .await;
    }

    /// Serve these keys after a delay
    pub async fn mock_jwks_delayed(&self, keys: Vec<Value>, delay: Duration) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "keys": keys }))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer key-set requests with an error status
    pub async fn mock_jwks_status(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Number of key-set requests received so far
    pub async fn fetch_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| {
                requests
                    .iter()
                    .filter(|r| r.url.path() == JWKS_PATH)
                    .count()
            })
            .unwrap_or_default()
    }

    /// Verifier configuration trusting this issuer
    pub fn config(&self) -> VerifierConfig {
        VerifierConfig::new(self.issuer.clone()).with_fetch_timeout(Duration::from_secs(2))
    }

    /// Standard claims for a token from this issuer, valid for ten minutes
    pub fn claims(&self, sub: &str) -> Value {
        let now = current_timestamp();
        json!({
            "iss": self.issuer,
            "sub": sub,
            "iat": now,
            "exp": now + 600,
            "custom:org_id": "org-456"
        })
    }
}

/// Sign claims with an RS256 fixture key
pub fn sign(pem: &[u8], kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.typ = Some("JWT".to_string());
    header.kid = Some(kid.to_string());

    let key = EncodingKey::from_rsa_pem(pem).expect("Invalid RSA key");
    encode(&header, claims, &key).expect("Failed to encode test JWT")
}

/// Get current Unix timestamp
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs()
}

/// Route library logs to the test harness output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("toolgate_auth=debug")),
        )
        .with_test_writer()
        .try_init();
}
