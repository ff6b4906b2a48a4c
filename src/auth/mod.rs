//! Bearer token authentication for API routes.
//!
//! A request is authenticated by a single token, taken from the
//! `Authorization: Bearer` header or, failing that, the `token` cookie.
//! The token is verified statelessly and its subject is loaded from the
//! database, so deleting a user is the only way to revoke their tokens.
//! Every credential failure answers with the same 401.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod state;
mod types;

pub use cookie::{
    OAUTH_STATE_COOKIE_NAME, TOKEN_COOKIE_NAME, clear_oauth_state_cookie, clear_token_cookie,
    get_cookie, oauth_state_cookie, token_cookie,
};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{Auth, OptionalAuth, bearer_token, request_token, require_auth};
pub use ip::extract_client_ip;
pub use state::HasAuthBackend;
pub use types::AuthenticatedUser;
