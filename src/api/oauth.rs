//! Federated login endpoints.
//!
//! - GET `/oauth/start` - Redirect to the identity provider
//! - GET `/oauth/callback` - Provider callback; redirects to the front end
//!
//! Both answer with a 302. Failures never produce an error page, only the
//! front end's login URL with `?error=oauth_failed`.

use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{AppendHeaders, IntoResponse, Response},
    routing::get,
};
use tracing::{info, warn};
use url::Url;

use crate::auth::{
    OAUTH_STATE_COOKIE_NAME, clear_oauth_state_cookie, get_cookie, oauth_state_cookie,
    token_cookie,
};
use crate::oauth::{
    CallbackParams, FederatedLogin, HandoffStage, dashboard_redirect, login_error_redirect,
};
use crate::rate_limit::{LimitedRoute, rate_limit};

#[derive(Clone)]
pub struct OAuthState {
    pub login: FederatedLogin,
    pub client_url: Url,
    pub secure_cookies: bool,
    pub rate_limit: LimitedRoute,
}

pub fn router(state: OAuthState) -> Router {
    Router::new()
        .route("/oauth/start", get(start))
        .route("/oauth/callback", get(callback))
        .layer(middleware::from_fn_with_state(
            state.rate_limit.clone(),
            rate_limit,
        ))
        .with_state(state)
}

/// 302 Found. `Redirect::to` would answer 303.
fn found(location: &Url) -> (StatusCode, [(header::HeaderName, String); 1]) {
    (
        StatusCode::FOUND,
        [(header::LOCATION, location.as_str().to_string())],
    )
}

fn failed(state: &OAuthState) -> Response {
    (
        AppendHeaders([(
            header::SET_COOKIE,
            clear_oauth_state_cookie(state.secure_cookies),
        )]),
        found(&login_error_redirect(&state.client_url)),
    )
        .into_response()
}

async fn start(State(state): State<OAuthState>) -> Response {
    match state.login.start() {
        Ok((oauth_state, url)) => (
            AppendHeaders([(
                header::SET_COOKIE,
                oauth_state_cookie(&oauth_state, state.secure_cookies),
            )]),
            found(&url),
        )
            .into_response(),
        Err(e) => {
            warn!(
                error = %e,
                stage = HandoffStage::Unauthenticated.as_str(),
                "Federated login could not start"
            );
            failed(&state)
        }
    }
}

async fn callback(
    State(state): State<OAuthState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    let cookie_state = get_cookie(&headers, OAUTH_STATE_COOKIE_NAME);

    match state.login.complete(&params, cookie_state).await {
        Ok(session) => {
            info!(
                user = %session.user.id,
                stage = HandoffStage::Redirected.as_str(),
                "Federated login succeeded"
            );
            (
                AppendHeaders([
                    (
                        header::SET_COOKIE,
                        token_cookie(&session.token, session.max_age, state.secure_cookies),
                    ),
                    (
                        header::SET_COOKIE,
                        clear_oauth_state_cookie(state.secure_cookies),
                    ),
                ]),
                found(&dashboard_redirect(&state.client_url, &session.token)),
            )
                .into_response()
        }
        Err(e) => {
            warn!(
                error = %e,
                stage = HandoffStage::Unauthenticated.as_str(),
                "Federated login failed"
            );
            failed(&state)
        }
    }
}
