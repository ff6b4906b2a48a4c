//! Client session state machine.
//!
//! Tokens arrive from local storage, from the URL after a federated login,
//! and from a direct login. [`SessionMachine`] folds all of them into one
//! [`ClientAuthState`]. It performs no I/O: every transition returns the
//! [`Effect`]s the caller has to carry out.
//!
//! At most one user fetch is outstanding. Each fetch is tagged with a
//! generation number; a completion whose generation is not the one in
//! flight is stale and ignored. Logout and login bump the generation, so a
//! fetch started before them can never change the state afterwards.

use url::Url;

use super::url_token::take_token;
use crate::db::PublicUser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Nothing has been checked yet.
    #[default]
    Idle,
    /// A token is being verified against the server.
    Checking,
    Authenticated,
    Unauthenticated,
}

/// What the UI reads.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientAuthState {
    pub phase: Phase,
    pub user: Option<PublicUser>,
    pub token: Option<String>,
}

impl ClientAuthState {
    /// True only once the server has confirmed the token's user.
    pub fn is_authenticated(&self) -> bool {
        self.phase == Phase::Authenticated && self.user.is_some()
    }

    /// True while a verification round-trip is outstanding.
    pub fn loading(&self) -> bool {
        self.phase == Phase::Checking
    }
}

/// Result of asking the server who a token belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    User(PublicUser),
    /// The server refused the token.
    Rejected,
    /// The server could not be reached or answered unexpectedly.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Page load: the persisted token and the URL the page was opened with.
    Boot {
        stored_token: Option<String>,
        url: Url,
    },
    /// In-app navigation to a new URL, which may carry a token.
    UrlChanged(Url),
    LoginSucceeded {
        user: PublicUser,
        token: String,
    },
    FetchCompleted {
        generation: u64,
        outcome: FetchOutcome,
    },
    Logout,
    /// A protected call came back 401.
    Unauthorized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    PersistToken(String),
    ClearStoredToken,
    /// Swap the address bar URL without adding a history entry.
    ReplaceUrl(Url),
    FetchCurrentUser {
        generation: u64,
        token: String,
    },
    /// Best effort; the local transition never waits for it.
    NotifyServerLogout,
}

#[derive(Debug, Clone)]
struct InFlight {
    generation: u64,
    token: String,
}

#[derive(Debug, Default)]
pub struct SessionMachine {
    state: ClientAuthState,
    generation: u64,
    in_flight: Option<InFlight>,
    /// Latest token that arrived while a different one was being fetched.
    queued: Option<String>,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ClientAuthState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn fetch_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        let mut effects = Vec::new();

        match event {
            Event::Boot { stored_token, url } => {
                let from_url = take_token(&url);
                if self.state.phase != Phase::Idle {
                    // Only the first boot counts; later ones behave like navigation.
                    if let Some((token, clean)) = from_url {
                        self.accept_url_token(token, clean, &mut effects);
                    }
                    return effects;
                }

                match (from_url, stored_token.filter(|t| !t.is_empty())) {
                    (Some((token, clean)), _) => self.accept_url_token(token, clean, &mut effects),
                    (None, Some(token)) => self.request_fetch(token, &mut effects),
                    (None, None) => self.state.phase = Phase::Unauthenticated,
                }
            }
            Event::UrlChanged(url) => {
                if let Some((token, clean)) = take_token(&url) {
                    self.accept_url_token(token, clean, &mut effects);
                }
            }
            Event::LoginSucceeded { user, token } => {
                self.cancel_fetches();
                self.state = ClientAuthState {
                    phase: Phase::Authenticated,
                    user: Some(user),
                    token: Some(token.clone()),
                };
                effects.push(Effect::PersistToken(token));
            }
            Event::FetchCompleted {
                generation,
                outcome,
            } => self.complete_fetch(generation, outcome, &mut effects),
            Event::Logout => {
                self.sign_out(&mut effects);
                effects.push(Effect::NotifyServerLogout);
            }
            Event::Unauthorized => self.sign_out(&mut effects),
        }

        effects
    }

    fn accept_url_token(&mut self, token: String, clean: Url, effects: &mut Vec<Effect>) {
        effects.push(Effect::PersistToken(token.clone()));
        effects.push(Effect::ReplaceUrl(clean));
        self.request_fetch(token, effects);
    }

    fn request_fetch(&mut self, token: String, effects: &mut Vec<Effect>) {
        if let Some(in_flight) = &self.in_flight {
            if in_flight.token == token {
                // Coalesce; a newer token queued earlier is superseded.
                self.queued = None;
            } else {
                self.queued = Some(token.clone());
            }
            self.state.token = Some(token);
            return;
        }

        if self.state.is_authenticated() && self.state.token.as_deref() == Some(token.as_str()) {
            return;
        }

        self.start_fetch(token, effects);
    }

    fn start_fetch(&mut self, token: String, effects: &mut Vec<Effect>) {
        self.generation += 1;
        self.in_flight = Some(InFlight {
            generation: self.generation,
            token: token.clone(),
        });
        self.state = ClientAuthState {
            phase: Phase::Checking,
            user: None,
            token: Some(token.clone()),
        };
        effects.push(Effect::FetchCurrentUser {
            generation: self.generation,
            token,
        });
    }

    fn complete_fetch(&mut self, generation: u64, outcome: FetchOutcome, effects: &mut Vec<Effect>) {
        let current = self.in_flight.as_ref().map(|f| f.generation);
        if current != Some(generation) {
            return;
        }
        self.in_flight = None;

        if let Some(next) = self.queued.take() {
            self.start_fetch(next, effects);
            return;
        }

        match outcome {
            FetchOutcome::User(user) => {
                self.state.phase = Phase::Authenticated;
                self.state.user = Some(user);
            }
            FetchOutcome::Rejected => {
                self.state = ClientAuthState {
                    phase: Phase::Unauthenticated,
                    ..Default::default()
                };
                effects.push(Effect::ClearStoredToken);
            }
            FetchOutcome::Failed => {
                // Keep the persisted token; the next boot retries it.
                self.state = ClientAuthState {
                    phase: Phase::Unauthenticated,
                    ..Default::default()
                };
            }
        }
    }

    fn cancel_fetches(&mut self) {
        self.generation += 1;
        self.in_flight = None;
        self.queued = None;
    }

    fn sign_out(&mut self, effects: &mut Vec<Effect>) {
        self.cancel_fetches();
        self.state = ClientAuthState {
            phase: Phase::Unauthenticated,
            ..Default::default()
        };
        effects.push(Effect::ClearStoredToken);
    }
}
