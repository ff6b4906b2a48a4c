//! Authentication user types.

use crate::db::PublicUser;

/// Identity attached to an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Database user ID
    pub user_id: i64,
    /// Public view of the user (never carries the password hash)
    pub user: PublicUser,
}
