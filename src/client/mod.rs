//! Client-side session handling.
//!
//! [`SessionMachine`] is the pure transition table; [`SessionController`]
//! runs it against token storage, page history and the auth API, and
//! publishes every [`ClientAuthState`] on a watch channel. The guard
//! functions turn that state into routing decisions.

mod api;
mod controller;
mod guard;
mod machine;
mod storage;
mod url_token;

pub use api::{ApiCallError, AuthApi, HttpAuthApi, SessionPayload};
pub use controller::{FETCH_TIMEOUT, SessionController};
pub use guard::{
    DASHBOARD_PATH, GuardDecision, LOGIN_PATH, guard_protected, guard_public, guard_root,
    post_login_destination,
};
pub use machine::{ClientAuthState, Effect, Event, FetchOutcome, Phase, SessionMachine};
pub use storage::{History, MemoryHistory, MemoryStorage, TokenStorage};
pub use url_token::{TOKEN_PARAM, take_token};
