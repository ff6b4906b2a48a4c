//! Authorization-code handoff: state cookie, code exchange, local identity
//! resolution and the final redirect back to the front end.

use std::sync::Arc;

use base64::Engine;
use rand::RngCore;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::provider::{IdentityProvider, ProviderError, ProviderIdentity};
use crate::db::{Database, NewUser, User, is_unique_violation};
use crate::issuer::{IssuedSession, SessionIssuer};
use crate::jwt::CodecError;
use crate::validation::{NAME_MAX_CHARS, NAME_MIN_CHARS, is_valid_email, normalize_email};

const STATE_BYTES: usize = 32;
const FALLBACK_NAME: &str = "User";

/// Progress of one federated login, used as a structured log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffStage {
    Unauthenticated,
    AuthorizationRequested,
    ProviderCallbackReceived,
    LocalIdentityResolved,
    Redirected,
}

impl HandoffStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandoffStage::Unauthenticated => "unauthenticated",
            HandoffStage::AuthorizationRequested => "authorization_requested",
            HandoffStage::ProviderCallbackReceived => "provider_callback_received",
            HandoffStage::LocalIdentityResolved => "local_identity_resolved",
            HandoffStage::Redirected => "redirected",
        }
    }
}

/// Every way the handoff can fail. The browser only ever sees the generic
/// `oauth_failed` redirect; the variant is for logs.
#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error("no identity provider is configured")]
    MissingProviderConfig,
    #[error("state parameter does not match the state cookie")]
    StateMismatch,
    #[error("provider denied the request: {0}")]
    ProviderDenied(String),
    #[error("callback is missing the authorization code")]
    MissingCode,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("provider returned an invalid email address")]
    InvalidEmail,
    #[error("email belongs to a local account but the provider has not verified it")]
    UnverifiedEmail,
    #[error("local account is already linked to another provider identity")]
    AlreadyLinked,
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Query parameters the provider sends to the callback.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Generate an unguessable `state` value.
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// `<client>/dashboard?token=<token>`
pub fn dashboard_redirect(client_url: &Url, token: &str) -> Url {
    let mut url = client_path(client_url, "dashboard");
    url.query_pairs_mut().append_pair("token", token);
    url
}

/// `<client>/login?error=oauth_failed`
pub fn login_error_redirect(client_url: &Url) -> Url {
    let mut url = client_path(client_url, "login");
    url.query_pairs_mut().append_pair("error", "oauth_failed");
    url
}

fn client_path(client_url: &Url, page: &str) -> Url {
    let mut url = client_url.clone();
    let base = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{base}/{page}"));
    url.set_query(None);
    url.set_fragment(None);
    url
}

fn display_name(identity: &ProviderIdentity, email: &str) -> String {
    let fits = |s: &str| (NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&s.chars().count());

    if let Some(name) = identity.name.as_deref().map(str::trim).filter(|n| fits(n)) {
        return name.to_string();
    }

    let local: String = email
        .split('@')
        .next()
        .unwrap_or_default()
        .chars()
        .take(NAME_MAX_CHARS)
        .collect();
    if fits(&local) {
        local
    } else {
        FALLBACK_NAME.to_string()
    }
}

/// Map a provider identity to exactly one local user.
///
/// Order: existing link by provider id, then a verified email match (which
/// gets linked), then a brand new federated-only account.
pub async fn resolve_local_user(
    db: &Database,
    identity: &ProviderIdentity,
) -> Result<User, HandoffError> {
    let users = db.users();

    if let Some(user) = users.get_by_google_id(&identity.subject).await? {
        debug!(user = %user.uuid, "Provider identity already linked");
        return Ok(user);
    }

    let email = normalize_email(&identity.email);
    if !is_valid_email(&email) {
        return Err(HandoffError::InvalidEmail);
    }

    if let Some(existing) = users.get_by_email(&email).await? {
        if !identity.email_verified {
            return Err(HandoffError::UnverifiedEmail);
        }
        if !users
            .link_google(existing.id, &identity.subject, identity.picture.as_deref())
            .await?
        {
            return Err(HandoffError::AlreadyLinked);
        }
        info!(user = %existing.uuid, "Linked provider identity to existing account");
        return users
            .get_by_id(existing.id)
            .await?
            .ok_or(HandoffError::Store(sqlx::Error::RowNotFound));
    }

    let uuid = uuid::Uuid::new_v4().to_string();
    let name = display_name(identity, &email);
    let created = users
        .create(&NewUser {
            uuid: &uuid,
            name: &name,
            email: &email,
            password_hash: None,
            google_id: Some(&identity.subject),
            avatar: identity.picture.as_deref(),
            email_verified: true,
        })
        .await;

    let id = match created {
        Ok(id) => id,
        Err(e) if is_unique_violation(&e) => {
            // A concurrent callback for the same identity won the insert.
            warn!("Concurrent federated signup, reloading account");
            return users
                .get_by_google_id(&identity.subject)
                .await?
                .ok_or(HandoffError::Store(e));
        }
        Err(e) => return Err(e.into()),
    };

    info!(user = %uuid, "Created account from provider identity");
    users
        .get_by_id(id)
        .await?
        .ok_or(HandoffError::Store(sqlx::Error::RowNotFound))
}

/// Drives both legs of the federated login.
#[derive(Clone)]
pub struct FederatedLogin {
    db: Database,
    issuer: SessionIssuer,
    provider: Option<Arc<dyn IdentityProvider>>,
}

impl FederatedLogin {
    pub fn new(
        db: Database,
        issuer: SessionIssuer,
        provider: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        Self {
            db,
            issuer,
            provider,
        }
    }

    fn provider(&self) -> Result<&Arc<dyn IdentityProvider>, HandoffError> {
        self.provider.as_ref().ok_or(HandoffError::MissingProviderConfig)
    }

    /// Begin the flow. Returns the state to store in the cookie and the
    /// provider URL to send the browser to.
    pub fn start(&self) -> Result<(String, Url), HandoffError> {
        let provider = self.provider()?;
        let state = generate_state();
        let url = provider.authorization_url(&state);
        debug!(
            provider = provider.name(),
            stage = HandoffStage::AuthorizationRequested.as_str(),
            "Redirecting to identity provider"
        );
        Ok((state, url))
    }

    /// Finish the flow from the provider's callback and mint a session.
    pub async fn complete(
        &self,
        params: &CallbackParams,
        cookie_state: Option<&str>,
    ) -> Result<IssuedSession, HandoffError> {
        let provider = self.provider()?;

        match (params.state.as_deref(), cookie_state) {
            (Some(returned), Some(expected)) if !returned.is_empty() && returned == expected => {}
            _ => return Err(HandoffError::StateMismatch),
        }
        if let Some(error) = &params.error {
            return Err(HandoffError::ProviderDenied(error.clone()));
        }
        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(HandoffError::MissingCode)?;

        debug!(
            provider = provider.name(),
            stage = HandoffStage::ProviderCallbackReceived.as_str(),
            "Exchanging authorization code"
        );
        let identity = provider.exchange_code(code).await?;

        let user = resolve_local_user(&self.db, &identity).await?;
        debug!(
            user = %user.uuid,
            stage = HandoffStage::LocalIdentityResolved.as_str(),
            "Resolved local account"
        );

        Ok(self.issuer.issue_for(&user)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::TokenCodec;
    use async_trait::async_trait;

    struct FakeProvider(ProviderIdentity);

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn authorization_url(&self, state: &str) -> Url {
            let mut url = Url::parse("https://idp.test/auth").unwrap();
            url.query_pairs_mut().append_pair("state", state);
            url
        }

        async fn exchange_code(&self, code: &str) -> Result<ProviderIdentity, ProviderError> {
            if code == "good" {
                Ok(self.0.clone())
            } else {
                Err(ProviderError::MissingField("sub"))
            }
        }
    }

    fn identity(email: &str, verified: bool) -> ProviderIdentity {
        ProviderIdentity {
            subject: "google-42".to_string(),
            email: email.to_string(),
            email_verified: verified,
            name: Some("Alice Example".to_string()),
            picture: Some("https://img.test/a.png".to_string()),
        }
    }

    async fn setup(identity: ProviderIdentity) -> (FederatedLogin, SessionIssuer, Database) {
        let db = Database::open(":memory:").await.unwrap();
        let codec = Arc::new(TokenCodec::new(b"test-secret-key-for-testing"));
        let issuer = SessionIssuer::new(db.clone(), codec);
        let provider: Arc<dyn IdentityProvider> = Arc::new(FakeProvider(identity));
        let login = FederatedLogin::new(db.clone(), issuer.clone(), Some(provider));
        (login, issuer, db)
    }

    fn callback(code: &str, state: &str) -> CallbackParams {
        CallbackParams {
            code: Some(code.to_string()),
            state: Some(state.to_string()),
            error: None,
        }
    }

    #[test]
    fn test_generate_state() {
        let a = generate_state();
        let b = generate_state();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(!a.contains('=') && !a.contains('+') && !a.contains('/'));
    }

    #[test]
    fn test_redirect_urls() {
        let client = Url::parse("http://localhost:3000").unwrap();
        assert_eq!(
            dashboard_redirect(&client, "abc.def").as_str(),
            "http://localhost:3000/dashboard?token=abc.def"
        );
        assert_eq!(
            login_error_redirect(&client).as_str(),
            "http://localhost:3000/login?error=oauth_failed"
        );

        let nested = Url::parse("https://example.com/app/").unwrap();
        assert_eq!(
            dashboard_redirect(&nested, "t").as_str(),
            "https://example.com/app/dashboard?token=t"
        );
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut id = identity("bob@example.com", true);
        assert_eq!(display_name(&id, "bob@example.com"), "Alice Example");

        id.name = Some(" ".to_string());
        assert_eq!(display_name(&id, "bob@example.com"), "bob");

        id.name = None;
        assert_eq!(display_name(&id, "b@example.com"), FALLBACK_NAME);
    }

    #[tokio::test]
    async fn test_links_existing_local_account() {
        let (login, issuer, db) = setup(identity("Alice@Example.com", true)).await;
        let local = issuer
            .register("Alice", "alice@example.com", "secret1")
            .await
            .unwrap();

        let session = login.complete(&callback("good", "s1"), Some("s1")).await.unwrap();

        assert_eq!(session.user.id, local.user.id);
        assert!(session.user.google_linked);
        assert!(session.user.has_password);
        assert!(session.user.email_verified);
        assert_eq!(session.user.avatar.as_deref(), Some("https://img.test/a.png"));
        assert_eq!(db.users().count().await.unwrap(), 1);

        // Second login finds the link directly.
        let again = login.complete(&callback("good", "s2"), Some("s2")).await.unwrap();
        assert_eq!(again.user.id, local.user.id);
        assert_eq!(db.users().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_creates_federated_account() {
        let (login, _, db) = setup(identity("new@example.com", true)).await;

        let session = login.complete(&callback("good", "s"), Some("s")).await.unwrap();
        assert_eq!(session.user.email, "new@example.com");
        assert_eq!(session.user.name, "Alice Example");
        assert!(!session.user.has_password);
        assert!(session.user.google_linked);

        let stored = db.users().get_by_google_id("google-42").await.unwrap().unwrap();
        assert!(stored.password_hash.is_none());
    }

    #[tokio::test]
    async fn test_unverified_email_does_not_link() {
        let (login, issuer, db) = setup(identity("alice@example.com", false)).await;
        issuer
            .register("Alice", "alice@example.com", "secret1")
            .await
            .unwrap();

        let err = login.complete(&callback("good", "s"), Some("s")).await.unwrap_err();
        assert!(matches!(err, HandoffError::UnverifiedEmail));

        let user = db.users().get_by_email("alice@example.com").await.unwrap().unwrap();
        assert!(user.google_id.is_none());
    }

    #[tokio::test]
    async fn test_state_must_match() {
        let (login, _, db) = setup(identity("new@example.com", true)).await;

        let err = login.complete(&callback("good", "s1"), Some("s2")).await.unwrap_err();
        assert!(matches!(err, HandoffError::StateMismatch));

        let err = login.complete(&callback("good", "s1"), None).await.unwrap_err();
        assert!(matches!(err, HandoffError::StateMismatch));

        assert_eq!(db.users().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_provider_error_and_failed_exchange() {
        let (login, _, _) = setup(identity("new@example.com", true)).await;

        let denied = CallbackParams {
            code: None,
            state: Some("s".to_string()),
            error: Some("access_denied".to_string()),
        };
        assert!(matches!(
            login.complete(&denied, Some("s")).await,
            Err(HandoffError::ProviderDenied(_))
        ));

        assert!(matches!(
            login.complete(&callback("bad", "s"), Some("s")).await,
            Err(HandoffError::Provider(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_provider() {
        let db = Database::open(":memory:").await.unwrap();
        let codec = Arc::new(TokenCodec::new(b"test-secret-key-for-testing"));
        let login = FederatedLogin::new(db.clone(), SessionIssuer::new(db, codec), None);

        assert!(matches!(login.start(), Err(HandoffError::MissingProviderConfig)));
    }
}
