// src/auth/negotiate.rs

//! HTTP Negotiate header handling (RFC 4559).
//!
//! Parses `WWW-Authenticate` / `Proxy-Authenticate` challenges and builds the
//! matching `Authorization` / `Proxy-Authorization` values. Token bytes are
//! opaque here; they are only base64-decoded and encoded.

use std::fmt;

use base64::Engine as _;
use http::header::{
    HeaderName, AUTHORIZATION, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, WWW_AUTHENTICATE,
};
use http::{HeaderMap, HeaderValue, StatusCode};

use crate::error;
use crate::Result;

/// The HTTP authentication scheme a handshake runs under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// SPNEGO, negotiating Kerberos or NTLM.
    Negotiate,
    /// Raw NTLM.
    Ntlm,
}

impl Scheme {
    /// The scheme name as it appears in headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Negotiate => "Negotiate",
            Scheme::Ntlm => "NTLM",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is asking for authentication: the origin server (401) or a proxy
/// (407).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AuthTarget {
    Server,
    Proxy,
}

impl AuthTarget {
    pub(crate) fn from_status(status: StatusCode) -> Option<AuthTarget> {
        match status {
            StatusCode::UNAUTHORIZED => Some(AuthTarget::Server),
            StatusCode::PROXY_AUTHENTICATION_REQUIRED => Some(AuthTarget::Proxy),
            _ => None,
        }
    }

    pub(crate) fn challenge_header(&self) -> HeaderName {
        match self {
            AuthTarget::Server => WWW_AUTHENTICATE,
            AuthTarget::Proxy => PROXY_AUTHENTICATE,
        }
    }

    pub(crate) fn credentials_header(&self) -> HeaderName {
        match self {
            AuthTarget::Server => AUTHORIZATION,
            AuthTarget::Proxy => PROXY_AUTHORIZATION,
        }
    }
}

/// Derive the Service Principal Name (SPN) from a URL.
///
/// For HTTP authentication, the SPN format is "HTTP/<hostname>". The port is
/// not part of it.
pub(crate) fn derive_spn(url: &url::Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| error::invalid_spn("URL has no host for SPN"))?;

    Ok(format!("HTTP/{}", host.trim_start_matches('[').trim_end_matches(']')))
}

/// The challenges offered in one response.
///
/// For each scheme: `None` if not offered, `Some(None)` for a bare
/// challenge, `Some(Some(token))` for a challenge carrying a token.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Challenges {
    pub(crate) negotiate: Option<Option<Vec<u8>>>,
    pub(crate) ntlm: Option<Option<Vec<u8>>>,
    pub(crate) basic: bool,
}

impl Challenges {
    /// Parse every challenge header of the given name.
    pub(crate) fn parse(headers: &HeaderMap, name: &HeaderName) -> Challenges {
        let mut challenges = Challenges::default();

        for value in headers.get_all(name) {
            let Ok(value) = value.to_str() else {
                log::debug!("ignoring non-ASCII {} header", name);
                continue;
            };

            for part in value.split(',') {
                let part = part.trim();
                let (scheme, rest) = match part.split_once(' ') {
                    Some((scheme, rest)) => (scheme, rest.trim()),
                    None => (part, ""),
                };
                // auth-params of the previous challenge (`realm="x"`) are not schemes
                if scheme.is_empty() || scheme.contains('=') {
                    continue;
                }

                if scheme.eq_ignore_ascii_case("negotiate") {
                    challenges.negotiate = Some(decode_token(rest));
                } else if scheme.eq_ignore_ascii_case("ntlm") {
                    challenges.ntlm = Some(decode_token(rest));
                } else if scheme.eq_ignore_ascii_case("basic") {
                    challenges.basic = true;
                }
            }
        }

        challenges
    }

    /// Negotiate is preferred over NTLM when both are offered.
    pub(crate) fn preferred(&self) -> Option<Scheme> {
        if self.negotiate.is_some() {
            Some(Scheme::Negotiate)
        } else if self.ntlm.is_some() {
            Some(Scheme::Ntlm)
        } else {
            None
        }
    }

    pub(crate) fn get(&self, scheme: Scheme) -> Option<Option<&[u8]>> {
        let challenge = match scheme {
            Scheme::Negotiate => &self.negotiate,
            Scheme::Ntlm => &self.ntlm,
        };
        challenge.as_ref().map(|token| token.as_deref())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.negotiate.is_none() && self.ntlm.is_none() && !self.basic
    }
}

fn decode_token(token: &str) -> Option<Vec<u8>> {
    if token.is_empty() {
        return None;
    }
    match base64::engine::general_purpose::STANDARD.decode(token) {
        Ok(decoded) if !decoded.is_empty() => Some(decoded),
        Ok(_) => None,
        Err(err) => {
            log::debug!("ignoring undecodable challenge token: {}", err);
            None
        }
    }
}

/// `<Scheme> <base64 token>`
pub(crate) fn authorization(scheme: Scheme, token: &[u8]) -> Result<HeaderValue> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(token);
    let mut value = HeaderValue::from_str(&format!("{} {}", scheme, encoded))
        .map_err(|_| error::authentication_failed("invalid authorization header"))?;
    value.set_sensitive(true);
    Ok(value)
}

/// `Basic <base64 user:password>`
pub(crate) fn basic_authorization(username: &str, password: &str) -> Result<HeaderValue> {
    let credentials = format!("{}:{}", username, password);
    let encoded = base64::engine::general_purpose::STANDARD.encode(credentials.as_bytes());
    let mut value = HeaderValue::from_str(&format!("Basic {}", encoded))
        .map_err(|_| error::authentication_failed("invalid authorization header"))?;
    value.set_sensitive(true);
    Ok(value)
}
