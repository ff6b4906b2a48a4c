#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{Request, Response, header},
};
use taskgate::{
    ServerConfig, create_app,
    db::Database,
    jwt::DEFAULT_TOKEN_LIFETIME_SECS,
    oauth::{IdentityProvider, ProviderError, ProviderIdentity},
};
use tower::ServiceExt;
use url::Url;

pub const JWT_SECRET: &[u8] = b"test-jwt-secret-that-is-long-enough";
pub const CLIENT_URL: &str = "http://localhost:3000";

/// Identity provider that accepts the code `good` and returns `identity`.
pub struct FakeProvider {
    pub identity: ProviderIdentity,
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn authorization_url(&self, state: &str) -> Url {
        let mut url = Url::parse("https://idp.test/authorize").unwrap();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("state", state);
        url
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderIdentity, ProviderError> {
        if code == "good" {
            Ok(self.identity.clone())
        } else {
            Err(ProviderError::MissingField("sub"))
        }
    }
}

pub fn google_identity(email: &str, verified: bool) -> ProviderIdentity {
    ProviderIdentity {
        subject: "google-sub-1".to_string(),
        email: email.to_string(),
        email_verified: verified,
        name: Some("Gina Google".to_string()),
        picture: Some("https://img.test/gina.png".to_string()),
    }
}

pub struct TestApp {
    pub router: Router,
    pub db: Database,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_provider(None).await
    }

    pub async fn with_provider(identity: Option<ProviderIdentity>) -> Self {
        let db = Database::open(":memory:")
            .await
            .expect("Failed to open test database");
        let identity_provider = identity
            .map(|identity| Arc::new(FakeProvider { identity }) as Arc<dyn IdentityProvider>);

        let config = ServerConfig {
            db: db.clone(),
            jwt_secret: JWT_SECRET.to_vec(),
            token_lifetime: DEFAULT_TOKEN_LIFETIME_SECS,
            secure_cookies: false,
            client_url: Url::parse(CLIENT_URL).unwrap(),
            identity_provider,
            ip_header: None,
        };

        let router = create_app(&config)
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4242))));
        Self { router, db }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response<Body> {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> serde_json::Value {
        let response = self
            .post_json(
                "/api/auth/register",
                serde_json::json!({ "name": name, "email": email, "password": password }),
            )
            .await;
        assert_eq!(response.status(), 201);
        body_json(response).await
    }
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// All `Set-Cookie` values of a response.
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// The value of cookie `name` from the response's `Set-Cookie` headers.
pub fn cookie_value(response: &Response<Body>, name: &str) -> Option<String> {
    set_cookies(response).into_iter().find_map(|c| {
        let first = c.split(';').next()?.trim().to_string();
        let (k, v) = first.split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}

pub fn location(response: &Response<Body>) -> Url {
    let value = response
        .headers()
        .get(header::LOCATION)
        .expect("missing Location header")
        .to_str()
        .unwrap();
    Url::parse(value).unwrap()
}
