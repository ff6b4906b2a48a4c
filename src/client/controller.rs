//! Runs the [`SessionMachine`] against real collaborators.
//!
//! Transitions and their local effects (storage writes, URL rewrites) happen
//! under one mutex, so storage always matches the last transition. HTTP calls
//! run after the lock is released, so a slow fetch never blocks a logout.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use super::api::{ApiCallError, AuthApi};
use super::machine::{ClientAuthState, Effect, Event, FetchOutcome, SessionMachine};
use super::storage::{History, TokenStorage};
use crate::db::PublicUser;

struct Inner<A, S, H> {
    machine: Mutex<SessionMachine>,
    api: A,
    storage: S,
    history: H,
    state_tx: watch::Sender<ClientAuthState>,
    fetch_timeout: Duration,
}

/// How long a session check may take before it counts as a transport failure.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

pub struct SessionController<A, S, H> {
    inner: Arc<Inner<A, S, H>>,
}

impl<A, S, H> Clone for SessionController<A, S, H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A, S, H> SessionController<A, S, H>
where
    A: AuthApi,
    S: TokenStorage,
    H: History,
{
    pub fn new(api: A, storage: S, history: H) -> Self {
        Self::with_fetch_timeout(api, storage, history, FETCH_TIMEOUT)
    }

    pub fn with_fetch_timeout(api: A, storage: S, history: H, fetch_timeout: Duration) -> Self {
        let (state_tx, _) = watch::channel(ClientAuthState::default());
        Self {
            inner: Arc::new(Inner {
                machine: Mutex::new(SessionMachine::new()),
                api,
                storage,
                history,
                state_tx,
                fetch_timeout,
            }),
        }
    }

    /// Receive every state change.
    pub fn subscribe(&self) -> watch::Receiver<ClientAuthState> {
        self.inner.state_tx.subscribe()
    }

    pub fn state(&self) -> ClientAuthState {
        self.inner.state_tx.borrow().clone()
    }

    pub fn api(&self) -> &A {
        &self.inner.api
    }

    pub fn storage(&self) -> &S {
        &self.inner.storage
    }

    pub fn history(&self) -> &H {
        &self.inner.history
    }

    fn machine(&self) -> MutexGuard<'_, SessionMachine> {
        self.inner
            .machine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Page load: merge the stored token and the URL token.
    pub async fn boot(&self) {
        let stored_token = self.inner.storage.load();
        let url = self.inner.history.current();
        self.dispatch(Event::Boot { stored_token, url }).await;
    }

    /// The page navigated; pick up a token if the new URL carries one.
    pub async fn url_changed(&self) {
        let url = self.inner.history.current();
        self.dispatch(Event::UrlChanged(url)).await;
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<PublicUser, ApiCallError> {
        let session = self.inner.api.login(email, password).await?;
        let user = session.user.clone();
        self.dispatch(Event::LoginSucceeded {
            user: session.user,
            token: session.token,
        })
        .await;
        Ok(user)
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<PublicUser, ApiCallError> {
        let session = self.inner.api.register(name, email, password).await?;
        let user = session.user.clone();
        self.dispatch(Event::LoginSucceeded {
            user: session.user,
            token: session.token,
        })
        .await;
        Ok(user)
    }

    pub async fn logout(&self) {
        self.dispatch(Event::Logout).await;
    }

    /// A protected call answered 401.
    pub async fn unauthorized(&self) {
        self.dispatch(Event::Unauthorized).await;
    }

    /// Apply `event` and run its effects, feeding fetch results back in
    /// until nothing is left to do.
    pub async fn dispatch(&self, event: Event) {
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            let remote = self.transition(event);

            for effect in remote {
                if let Some(next) = self.run_remote(effect).await {
                    pending.push_back(next);
                }
            }
        }
    }

    /// Run one transition and its local effects under the lock. Returns the
    /// effects that need the network.
    fn transition(&self, event: Event) -> Vec<Effect> {
        let mut machine = self.machine();
        let effects = machine.handle(event);
        self.inner.state_tx.send_if_modified(|state| {
            if *state == *machine.state() {
                false
            } else {
                *state = machine.state().clone();
                true
            }
        });

        let mut remote = Vec::new();
        for effect in effects {
            match effect {
                Effect::PersistToken(token) => self.inner.storage.store(&token),
                Effect::ClearStoredToken => self.inner.storage.clear(),
                Effect::ReplaceUrl(url) => self.inner.history.replace(url),
                other => remote.push(other),
            }
        }
        remote
    }

    async fn run_remote(&self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::NotifyServerLogout => {
                if let Err(e) = self.inner.api.logout().await {
                    debug!(error = %e, "Server logout failed");
                }
                None
            }
            Effect::FetchCurrentUser { generation, token } => {
                let fetch = self.inner.api.current_user(&token);
                let outcome = match tokio::time::timeout(self.inner.fetch_timeout, fetch).await {
                    Ok(Ok(user)) => FetchOutcome::User(user),
                    Ok(Err(ApiCallError::Unauthorized)) | Ok(Err(ApiCallError::Rejected { .. })) => {
                        FetchOutcome::Rejected
                    }
                    Ok(Err(e @ ApiCallError::Transport(_))) => {
                        warn!(error = %e, "Could not verify stored session");
                        FetchOutcome::Failed
                    }
                    Err(_) => {
                        warn!(timeout = ?self.inner.fetch_timeout, "Session check timed out");
                        FetchOutcome::Failed
                    }
                };
                Some(Event::FetchCompleted {
                    generation,
                    outcome,
                })
            }
            Effect::PersistToken(_) | Effect::ClearStoredToken | Effect::ReplaceUrl(_) => None,
        }
    }
}
