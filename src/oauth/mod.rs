//! Federated login through an external OAuth 2.0 identity provider.

mod handoff;
mod provider;

pub use handoff::{
    CallbackParams, FederatedLogin, HandoffError, HandoffStage, dashboard_redirect,
    generate_state, login_error_redirect, resolve_local_user,
};
pub use provider::{
    Endpoints, GoogleProvider, IdentityProvider, ProviderError, ProviderIdentity, SCOPES,
};
