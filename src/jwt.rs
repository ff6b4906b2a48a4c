//! Bearer token issuance and verification.
//!
//! Tokens are HS256 JWTs carrying only `{sub, iat, exp}`. There is no
//! server-side revocation list: a token is valid until it expires or its
//! subject is deleted.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default token lifetime: 7 days.
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 7 * 24 * 60 * 60;

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user UUID)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// A freshly minted token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token lifetime in seconds
    pub lifetime: u64,
}

/// Errors that can occur while issuing or verifying a token.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("token has expired")]
    Expired,
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    SignatureMismatch,
    #[error("failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
}

/// Signs and verifies bearer tokens with a server-held secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: u64,
}

impl TokenCodec {
    /// Create a codec with the default 7-day lifetime.
    pub fn new(secret: &[u8]) -> Self {
        Self::with_lifetime(secret, DEFAULT_TOKEN_LIFETIME_SECS)
    }

    pub fn with_lifetime(secret: &[u8], lifetime: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            lifetime,
        }
    }

    pub fn lifetime(&self) -> u64 {
        self.lifetime
    }

    /// Mint a token for `user_uuid`, valid from `now` for the configured lifetime.
    pub fn issue(&self, user_uuid: &str, now: u64) -> Result<IssuedToken, CodecError> {
        let exp = now + self.lifetime;
        let claims = Claims {
            sub: user_uuid.to_string(),
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(CodecError::Encoding)?;

        Ok(IssuedToken {
            token,
            issued_at: now,
            expires_at: exp,
            lifetime: self.lifetime,
        })
    }

    /// Verify a token as of `now` and return its claims.
    ///
    /// The HMAC comparison runs in constant time. Expiry is checked here
    /// rather than by `jsonwebtoken` so callers control the clock.
    pub fn verify(&self, token: &str, now: u64) -> Result<Claims, CodecError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["sub", "exp"]);

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => CodecError::SignatureMismatch,
                _ => CodecError::Malformed,
            })?;
        let claims = data.claims;

        if claims.exp < claims.iat || claims.exp - claims.iat > self.lifetime {
            return Err(CodecError::Malformed);
        }
        if now > claims.exp {
            return Err(CodecError::Expired);
        }

        Ok(claims)
    }

    /// Mint a token as of the current system time.
    pub fn issue_now(&self, user_uuid: &str) -> Result<IssuedToken, CodecError> {
        self.issue(user_uuid, unix_now())
    }

    /// Verify a token as of the current system time.
    pub fn verify_now(&self, token: &str) -> Result<Claims, CodecError> {
        self.verify(token, unix_now())
    }
}

/// Current Unix time in seconds. A clock before the epoch reads as 0.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
