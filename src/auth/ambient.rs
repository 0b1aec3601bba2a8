//! The identity of the login session the process runs under.

use std::env;
use std::fmt;

/// The user of the host login session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AmbientUser {
    user: String,
    domain: Option<String>,
}

impl AmbientUser {
    /// Create an ambient user, e.g. for a fixed identity in tests.
    pub fn new(user: impl Into<String>, domain: Option<String>) -> AmbientUser {
        AmbientUser {
            user: user.into(),
            domain: domain.filter(|d| !d.is_empty()),
        }
    }

    /// The account name of the session.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The domain the session is logged on to, if any.
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }
}

impl fmt::Display for AmbientUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.domain {
            Some(ref domain) => write!(f, "{}\\{}", domain, self.user),
            None => f.write_str(&self.user),
        }
    }
}

/// Read-only query of the host login session.
///
/// The engine asks once per session, before any network activity. Nothing
/// is cached between sessions, so a provider may reflect changes to the
/// environment immediately.
pub trait AmbientIdentity: Send + Sync {
    /// The current user, or `None` if the host has no usable login session.
    fn current_user(&self) -> Option<AmbientUser>;
}

/// Ambient identity taken from the process environment.
///
/// Reads `USERNAME` (falling back to `USER`) and `USERDOMAIN`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemIdentity;

impl AmbientIdentity for SystemIdentity {
    fn current_user(&self) -> Option<AmbientUser> {
        let user = non_empty_var("USERNAME").or_else(|| non_empty_var("USER"))?;
        Some(AmbientUser::new(user, non_empty_var("USERDOMAIN")))
    }
}

impl AmbientIdentity for AmbientUser {
    fn current_user(&self) -> Option<AmbientUser> {
        Some(self.clone())
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}
