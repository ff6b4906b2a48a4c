//! Register and login orchestration.
//!
//! Every successful path ends in [`SessionIssuer::issue_for`], which mints a
//! single token and packages it as an [`IssuedSession`]. The HTTP layer then
//! offers that one token through every transport: the `token` cookie and the
//! JSON body (or the redirect URL for the federated flow).

use std::sync::Arc;

use tracing::{info, warn};

use crate::db::{Database, NewUser, PublicUser, User, is_unique_violation};
use crate::jwt::{CodecError, TokenCodec};
use crate::password::{self, PasswordError};
use crate::validation::{self, ValidationErrors};

/// A minted session: the public user plus the token that proves it.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub user: PublicUser,
    pub token: String,
    /// Cookie lifetime in seconds (equal to the token lifetime).
    pub max_age: u64,
}

/// Failures that are never the caller's fault. Logged, then reported as a
/// generic server error.
#[derive(Debug, thiserror::Error)]
pub enum InternalError {
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error("hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    /// The email is already registered. `federated_hint` is set when the
    /// existing account signs in through the external provider.
    #[error("email already registered")]
    DuplicateEmail { federated_hint: bool },
    #[error(transparent)]
    Internal(#[from] InternalError),
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    /// Unknown email and wrong password are deliberately the same variant.
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl From<sqlx::Error> for RegisterError {
    fn from(e: sqlx::Error) -> Self {
        Self::Internal(e.into())
    }
}

impl From<sqlx::Error> for LoginError {
    fn from(e: sqlx::Error) -> Self {
        Self::Internal(e.into())
    }
}

#[derive(Clone)]
pub struct SessionIssuer {
    db: Database,
    codec: Arc<TokenCodec>,
}

impl SessionIssuer {
    pub fn new(db: Database, codec: Arc<TokenCodec>) -> Self {
        Self { db, codec }
    }

    /// Mint a token for an existing user.
    pub fn issue_for(&self, user: &User) -> Result<IssuedSession, CodecError> {
        let issued = self.codec.issue_now(&user.uuid)?;
        Ok(IssuedSession {
            user: user.to_public(),
            token: issued.token,
            max_age: issued.lifetime,
        })
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<IssuedSession, RegisterError> {
        let input = validation::validate_registration(name, email, password)?;

        if let Some(existing) = self.db.users().get_by_email(&input.email).await? {
            return Err(RegisterError::DuplicateEmail {
                federated_hint: existing.google_id.is_some(),
            });
        }

        let plain = input.password.clone();
        let hash = tokio::task::spawn_blocking(move || password::hash_password(&plain))
            .await
            .map_err(InternalError::from)?
            .map_err(InternalError::from)?;

        let uuid = uuid::Uuid::new_v4().to_string();
        let created = self
            .db
            .users()
            .create(&NewUser {
                uuid: &uuid,
                name: &input.name,
                email: &input.email,
                password_hash: Some(&hash),
                ..Default::default()
            })
            .await;

        let id = match created {
            Ok(id) => id,
            Err(e) if is_unique_violation(&e) => {
                warn!(email = %input.email, "Concurrent registration for the same email");
                return Err(RegisterError::DuplicateEmail {
                    federated_hint: false,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let user = self
            .db
            .users()
            .get_by_id(id)
            .await?
            .ok_or(InternalError::Store(sqlx::Error::RowNotFound))?;

        info!(user = %user.uuid, "User registered");
        Ok(self.issue_for(&user).map_err(InternalError::from)?)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedSession, LoginError> {
        let email = validation::validate_login(email, password)?;
        let user = self.db.users().get_by_email(&email).await?;

        let plain = password.to_string();
        let stored_hash = user.as_ref().and_then(|u| u.password_hash.clone());
        let matched = tokio::task::spawn_blocking(move || match stored_hash {
            Some(hash) => password::verify_password(&hash, &plain),
            None => {
                password::dummy_verify(&plain);
                false
            }
        })
        .await
        .map_err(InternalError::from)?;

        let Some(user) = user.filter(|_| matched) else {
            return Err(LoginError::InvalidCredentials);
        };

        info!(user = %user.uuid, "User logged in");
        Ok(self.issue_for(&user).map_err(InternalError::from)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn issuer() -> (SessionIssuer, Arc<TokenCodec>, Database) {
        let db = Database::open(":memory:").await.unwrap();
        let codec = Arc::new(TokenCodec::new(b"test-secret-key-for-testing"));
        (SessionIssuer::new(db.clone(), codec.clone()), codec, db)
    }

    #[tokio::test]
    async fn test_register_then_verify() {
        let (issuer, codec, _db) = issuer().await;

        let session = issuer
            .register("Alice", "Alice@Example.com", "secret1")
            .await
            .unwrap();
        assert_eq!(session.user.email, "alice@example.com");
        assert!(session.user.has_password);

        let claims = codec.verify_now(&session.token).unwrap();
        assert_eq!(claims.sub, session.user.id);
        assert_eq!(session.max_age, codec.lifetime());
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (issuer, _, _) = issuer().await;

        let err = issuer.register("A", "alice", "123").await.unwrap_err();
        assert!(matches!(err, RegisterError::Validation(e) if e.0.len() == 3));
    }

    #[tokio::test]
    async fn test_register_duplicate_local() {
        let (issuer, _, _) = issuer().await;
        issuer
            .register("Alice", "alice@example.com", "secret1")
            .await
            .unwrap();

        let err = issuer
            .register("Alice Again", "ALICE@example.com", "secret2")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegisterError::DuplicateEmail {
                federated_hint: false
            }
        ));
    }

    #[tokio::test]
    async fn test_register_duplicate_federated() {
        let (issuer, _, db) = issuer().await;
        db.users()
            .create(&NewUser {
                uuid: "uuid-g",
                name: "Gina",
                email: "gina@example.com",
                google_id: Some("google-1"),
                email_verified: true,
                ..Default::default()
            })
            .await
            .unwrap();

        let err = issuer
            .register("Gina", "gina@example.com", "secret1")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegisterError::DuplicateEmail {
                federated_hint: true
            }
        ));
    }

    #[tokio::test]
    async fn test_login() {
        let (issuer, codec, _) = issuer().await;
        let registered = issuer
            .register("Alice", "alice@example.com", "secret1")
            .await
            .unwrap();

        let session = issuer.login(" Alice@example.com", "secret1").await.unwrap();
        assert_eq!(session.user.id, registered.user.id);
        assert_eq!(codec.verify_now(&session.token).unwrap().sub, registered.user.id);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let (issuer, _, db) = issuer().await;
        issuer
            .register("Alice", "alice@example.com", "secret1")
            .await
            .unwrap();
        db.users()
            .create(&NewUser {
                uuid: "uuid-g",
                name: "Gina",
                email: "gina@example.com",
                google_id: Some("google-1"),
                ..Default::default()
            })
            .await
            .unwrap();

        let wrong_password = issuer.login("alice@example.com", "wrong!").await.unwrap_err();
        let unknown_email = issuer.login("nobody@example.com", "secret1").await.unwrap_err();
        let federated_only = issuer.login("gina@example.com", "secret1").await.unwrap_err();

        assert!(matches!(wrong_password, LoginError::InvalidCredentials));
        assert!(matches!(unknown_email, LoginError::InvalidCredentials));
        assert!(matches!(federated_only, LoginError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }
}
