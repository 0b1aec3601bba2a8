//! The per-request handshake state machine.
//!
//! ```text
//! Idle --start--> Handshaking --non-challenge--> Authenticated --close--> Closed
//!                     |  ^                                                  ^
//!                     |  +--challenge (round < cap)                         |
//!                     +--fault--> Failed          cancel (any live state) --+
//! ```
//!
//! The session never touches the network. The engine feeds it every response
//! head and sends whatever it asks for, which keeps the round cap and the
//! cancellation paths testable without a server.

use std::fmt;
use std::sync::Arc;

use http::header::HeaderName;
use http::{HeaderMap, HeaderValue, StatusCode};

use super::credentials::Identity;
use super::negotiate::{authorization, basic_authorization, AuthTarget, Challenges, Scheme};
use super::provider::{
    ContextRequest, ProviderError, ProviderErrorKind, SecurityContext, SecurityProvider,
};
use crate::error::{self, Error};
use crate::Result;

/// Where a handshake session is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SessionState {
    /// Created, nothing sent yet.
    Idle,
    /// Requests are being exchanged.
    Handshaking,
    /// The server accepted the request; the response is with the caller.
    Authenticated,
    /// Finished; the security context is released.
    Closed,
    /// A fault ended the session; the security context is released.
    Failed,
}

/// What the engine should do after a response.
#[derive(Debug)]
pub(crate) enum Next {
    /// Re-send the request with this credentials header.
    Retry(HeaderName, HeaderValue),
    /// Hand the response to the caller.
    Done,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct SessionOptions {
    pub(crate) max_rounds: usize,
    pub(crate) mutual_auth: bool,
    pub(crate) basic_fallback: bool,
}

pub(crate) struct HandshakeSession {
    state: SessionState,
    provider: Arc<dyn SecurityProvider>,
    context: Option<SecurityContext>,
    identity: Identity,
    target_spn: String,
    target: Option<AuthTarget>,
    scheme: Option<Scheme>,
    round_trips: usize,
    token_rounds: usize,
    basic_sent: bool,
    options: SessionOptions,
}

impl HandshakeSession {
    pub(crate) fn new(
        provider: Arc<dyn SecurityProvider>,
        identity: Identity,
        target_spn: String,
        options: SessionOptions,
    ) -> HandshakeSession {
        HandshakeSession {
            state: SessionState::Idle,
            provider,
            context: None,
            identity,
            target_spn,
            target: None,
            scheme: None,
            round_trips: 0,
            token_rounds: 0,
            basic_sent: false,
            options,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    /// Requests sent so far, the unauthenticated first one included.
    pub(crate) fn round_trips(&self) -> usize {
        self.round_trips
    }

    /// The first request goes out without credentials.
    pub(crate) fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(error::builder(format!(
                "session cannot start from {:?}",
                self.state
            )));
        }
        self.state = SessionState::Handshaking;
        self.round_trips = 1;
        Ok(())
    }

    pub(crate) fn on_response(&mut self, status: StatusCode, headers: &HeaderMap) -> Result<Next> {
        if self.state != SessionState::Handshaking {
            return Err(error::builder(format!(
                "response fed to a session in {:?}",
                self.state
            )));
        }

        let outcome = match AuthTarget::from_status(status) {
            Some(target) => self.next_round(status, target, headers),
            None => self.finish(headers),
        };

        match outcome {
            Ok(Next::Done) => {
                self.state = SessionState::Authenticated;
                Ok(Next::Done)
            }
            Ok(next) => {
                self.round_trips += 1;
                Ok(next)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// The caller has the response; nothing more will be exchanged.
    pub(crate) fn close(&mut self) {
        self.release();
        if self.state != SessionState::Failed {
            self.state = SessionState::Closed;
        }
    }

    /// Abandon the handshake, e.g. when the caller gives up waiting.
    pub(crate) fn cancel(&mut self) {
        if matches!(self.state, SessionState::Idle | SessionState::Handshaking) {
            log::debug!("handshake for {} cancelled", self.target_spn);
        }
        self.close();
    }

    /// Move to `Failed`, releasing the context before the error surfaces.
    pub(crate) fn fail(&mut self, err: Error) -> Error {
        self.release();
        self.state = SessionState::Failed;
        err
    }

    fn release(&mut self) {
        if let Some(mut context) = self.context.take() {
            context.release();
        }
    }

    fn next_round(
        &mut self,
        status: StatusCode,
        target: AuthTarget,
        headers: &HeaderMap,
    ) -> Result<Next> {
        let challenges = Challenges::parse(headers, &target.challenge_header());

        if challenges.is_empty() {
            return Err(error::authentication_failed(format!(
                "server answered {} without a challenge",
                status
            )));
        }
        if self.basic_sent {
            return Err(error::authentication_failed(
                "server rejected the Basic credentials",
            ));
        }

        let scheme = match self.scheme {
            Some(scheme) => scheme,
            None => match challenges.preferred() {
                Some(scheme) => {
                    self.scheme = Some(scheme);
                    self.target = Some(target);
                    scheme
                }
                None => return self.basic_round(target, &challenges),
            },
        };

        let input = match challenges.get(scheme) {
            None => {
                return Err(error::authentication_failed(format!(
                    "server dropped the {} challenge",
                    scheme
                )))
            }
            Some(None) if self.context.is_some() => {
                return Err(error::authentication_failed(format!(
                    "server rejected the {} token",
                    scheme
                )))
            }
            Some(None) => None,
            Some(Some(_)) if self.context.is_none() => {
                log::debug!("ignoring token in the initial {} challenge", scheme);
                None
            }
            Some(Some(token)) => Some(token),
        };

        if self.context.as_ref().map_or(false, SecurityContext::is_complete) {
            return Err(error::authentication_failed(
                "server challenged an already established security context",
            ));
        }
        if self.token_rounds >= self.options.max_rounds {
            return Err(error::handshake_exceeded(self.options.max_rounds));
        }

        let request = ContextRequest {
            scheme,
            identity: &self.identity,
            target_spn: &self.target_spn,
        };
        let context = self
            .context
            .get_or_insert_with(|| SecurityContext::new(Arc::clone(&self.provider)));
        let token = context
            .step(&request, input)
            .map_err(provider_error)?;

        if token.is_empty() {
            return Err(error::authentication_failed(
                "security provider produced no token",
            ));
        }

        self.token_rounds += 1;
        log::debug!(
            "{} round {} for {} ({} byte token)",
            scheme,
            self.token_rounds,
            self.target_spn,
            token.len()
        );

        Ok(Next::Retry(
            target.credentials_header(),
            authorization(scheme, &token)?,
        ))
    }

    fn basic_round(&mut self, target: AuthTarget, challenges: &Challenges) -> Result<Next> {
        if !challenges.basic {
            return Err(error::authentication_failed(
                "server offered no supported authentication scheme",
            ));
        }
        if !self.options.basic_fallback {
            return Err(error::authentication_failed(
                "server only offers Basic authentication",
            ));
        }
        let Identity::Explicit {
            domain,
            principal,
            secret,
        } = &self.identity
        else {
            return Err(error::authentication_failed(
                "Basic authentication requires explicit credentials",
            ));
        };

        let username = if principal.contains('@') {
            principal.clone()
        } else {
            format!("{}\\{}", domain, principal)
        };
        log::debug!("falling back to Basic authentication as {}", username);

        self.basic_sent = true;
        Ok(Next::Retry(
            target.credentials_header(),
            basic_authorization(&username, secret.expose())?,
        ))
    }

    /// A non-challenge response ends the handshake. A trailing server token
    /// completes mutual authentication.
    fn finish(&mut self, headers: &HeaderMap) -> Result<Next> {
        let (Some(scheme), Some(target)) = (self.scheme, self.target) else {
            return Ok(Next::Done);
        };
        let Some(context) = self.context.as_mut() else {
            return Ok(Next::Done);
        };

        if !context.is_complete() {
            let challenges = Challenges::parse(headers, &target.challenge_header());
            if let Some(Some(token)) = challenges.get(scheme) {
                let request = ContextRequest {
                    scheme,
                    identity: &self.identity,
                    target_spn: &self.target_spn,
                };
                context.step(&request, Some(token)).map_err(provider_error)?;
            }
        }

        if self.options.mutual_auth && !context.is_complete() {
            return Err(error::authentication_failed(
                "server did not complete mutual authentication",
            ));
        }

        Ok(Next::Done)
    }
}

impl Drop for HandshakeSession {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn provider_error(err: ProviderError) -> Error {
    match err.kind() {
        ProviderErrorKind::InvalidTargetName => error::invalid_spn(err),
        ProviderErrorKind::LogonDenied
        | ProviderErrorKind::InvalidToken
        | ProviderErrorKind::Other => error::authentication_failed(err),
    }
}

impl fmt::Debug for HandshakeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeSession")
            .field("state", &self.state)
            .field("target_spn", &self.target_spn)
            .field("scheme", &self.scheme)
            .field("round_trips", &self.round_trips)
            .field("context", &self.context)
            .finish()
    }
}
