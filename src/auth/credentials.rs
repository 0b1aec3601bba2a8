//! The identity presented to the server and the service it is presented to.

use std::fmt;

use url::Url;

use super::ambient::{AmbientIdentity, AmbientUser};
use super::negotiate::derive_spn;
use crate::error;
use crate::Result;

/// A password that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wrap a password.
    pub fn new(secret: impl Into<String>) -> Secret {
        Secret(secret.into())
    }

    /// The password itself, for handing to the security provider.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

/// The identity one handshake authenticates as.
///
/// Resolved from a [`CredentialContext`] at the start of every session.
#[derive(Clone, Debug)]
pub enum Identity {
    /// The login session the process runs under, as far as it is visible.
    ///
    /// `None` when the host exposes no user name; the security provider may
    /// still find default credentials (a Kerberos ticket cache, say).
    Ambient(Option<AmbientUser>),
    /// Explicitly supplied credentials. Never falls back to the ambient
    /// session.
    Explicit {
        /// The resolved domain (explicit, embedded in the principal, or the
        /// ambient session's domain).
        domain: String,
        /// The account name, without any `DOMAIN\` prefix.
        principal: String,
        /// The password.
        secret: Secret,
    },
}

impl Identity {
    /// Returns true when the ambient login session is used.
    pub fn is_ambient(&self) -> bool {
        matches!(self, Identity::Ambient(_))
    }

    /// The account name presented to the server, if known.
    pub fn principal(&self) -> Option<&str> {
        match self {
            Identity::Ambient(user) => user.as_ref().map(AmbientUser::user),
            Identity::Explicit { principal, .. } => Some(principal),
        }
    }

    /// The domain presented to the server, if any.
    pub fn domain(&self) -> Option<&str> {
        match self {
            Identity::Ambient(user) => user.as_ref().and_then(AmbientUser::domain),
            Identity::Explicit { domain, .. } => Some(domain),
        }
    }

    /// The password, for explicit identities.
    pub fn secret(&self) -> Option<&Secret> {
        match self {
            Identity::Ambient(_) => None,
            Identity::Explicit { secret, .. } => Some(secret),
        }
    }
}

/// Which identity to present, and to which service.
///
/// A client owns one of these. Every request snapshots it when its handshake
/// begins, so replacing the credentials never affects a request that is
/// already in flight.
///
/// # Example
///
/// ```
/// use negotiate_http::auth::CredentialContext;
///
/// let mut creds = CredentialContext::new();
/// creds.set_credentials("CORP", "alice", "hunter2").unwrap();
/// creds.set_target_name("HTTP/intranet.corp.example").unwrap();
/// assert!(creds.has_explicit_credentials());
///
/// creds.clear();
/// assert!(!creds.has_explicit_credentials());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CredentialContext {
    domain: Option<String>,
    principal: Option<String>,
    secret: Option<Secret>,
    target_spn: Option<String>,
}

impl CredentialContext {
    /// Credentials that use the ambient login session and derive the SPN
    /// from the request URL.
    pub fn new() -> CredentialContext {
        CredentialContext::default()
    }

    /// Use an explicit identity for every subsequent request.
    ///
    /// `principal` may carry its own domain, as `DOMAIN\user` or
    /// `user@realm`; an empty `domain` is then taken from it, or from the
    /// ambient session when the request starts.
    ///
    /// # Errors
    ///
    /// Fails with an invalid-credentials error, leaving the context
    /// unchanged, if `principal` or `secret` is empty.
    pub fn set_credentials(
        &mut self,
        domain: impl Into<String>,
        principal: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<()> {
        let domain = domain.into();
        let principal = principal.into();
        let secret = secret.into();

        if principal.is_empty() {
            return Err(error::invalid_credentials("principal must not be empty"));
        }
        if secret.is_empty() {
            return Err(error::invalid_credentials(
                "secret is required when a principal is set",
            ));
        }

        let (embedded, principal) = split_principal(&principal);
        let domain = Some(domain)
            .filter(|d| !d.is_empty())
            .or_else(|| embedded.map(str::to_owned));

        self.domain = domain;
        self.principal = Some(principal.to_owned());
        self.secret = Some(Secret::new(secret));
        Ok(())
    }

    /// Authenticate against this service principal name instead of the one
    /// derived from the request host (`HTTP/<host>`).
    ///
    /// # Errors
    ///
    /// Fails with an invalid-SPN error if `spn` is empty or contains
    /// whitespace or control characters. No network activity happens.
    pub fn set_target_name(&mut self, spn: impl Into<String>) -> Result<()> {
        let spn = spn.into();
        validate_spn(&spn)?;
        self.target_spn = Some(spn);
        Ok(())
    }

    /// Go back to the ambient login session. The previous secret is dropped.
    ///
    /// The target name is kept; see [`clear_target_name`](Self::clear_target_name).
    pub fn clear(&mut self) {
        self.domain = None;
        self.principal = None;
        self.secret = None;
    }

    /// Go back to deriving the SPN from the request host.
    pub fn clear_target_name(&mut self) {
        self.target_spn = None;
    }

    /// Returns true if an explicit identity is set.
    pub fn has_explicit_credentials(&self) -> bool {
        self.principal.is_some()
    }

    /// The explicit domain, if one was given or embedded in the principal.
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// The explicit principal, if set.
    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    /// The explicit target SPN, if set.
    pub fn target_name(&self) -> Option<&str> {
        self.target_spn.as_deref()
    }

    pub(crate) fn resolve_identity(&self, ambient: &dyn AmbientIdentity) -> Result<Identity> {
        match (&self.principal, &self.secret) {
            (Some(principal), Some(secret)) => {
                let domain = match self.domain {
                    Some(ref domain) => domain.clone(),
                    None => ambient
                        .current_user()
                        .and_then(|user| user.domain().map(str::to_owned))
                        .ok_or_else(|| {
                            error::invalid_credentials(format!(
                                "no domain given for {principal:?} and none available from the login session"
                            ))
                        })?,
                };
                Ok(Identity::Explicit {
                    domain,
                    principal: principal.clone(),
                    secret: secret.clone(),
                })
            }
            (None, None) => Ok(Identity::Ambient(ambient.current_user())),
            _ => Err(error::invalid_credentials(
                "principal and secret must be set together",
            )),
        }
    }

    pub(crate) fn resolve_spn(&self, url: &Url) -> Result<String> {
        match self.target_spn {
            Some(ref spn) => Ok(spn.clone()),
            None => derive_spn(url),
        }
    }
}

/// Split `DOMAIN\user` into its parts. `user@realm` keeps the full name as
/// the principal and reports the realm as the domain.
fn split_principal(principal: &str) -> (Option<&str>, &str) {
    if let Some((domain, user)) = principal.split_once('\\') {
        return (Some(domain).filter(|d| !d.is_empty()), user);
    }
    if let Some((_, realm)) = principal.rsplit_once('@') {
        return (Some(realm).filter(|r| !r.is_empty()), principal);
    }
    (None, principal)
}

pub(crate) fn validate_spn(spn: &str) -> Result<()> {
    if spn.is_empty() {
        return Err(error::invalid_spn("target name is empty"));
    }
    if spn.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(error::invalid_spn(format!(
            "target name {spn:?} contains whitespace or control characters"
        )));
    }
    Ok(())
}
