use std::error::Error as StdError;
use std::fmt;
use std::io;

use url::Url;

/// A `Result` alias where the `Err` case is `negotiate_http::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// A boxed error, used at the transport and provider seams.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// The Errors that may occur when fetching a resource.
///
/// Every error is terminal for the request that produced it: the engine
/// never retries, and the security context of the failed session has already
/// been released by the time the error is observed.
pub struct Error {
    inner: Box<Inner>,
}

struct Inner {
    kind: Kind,
    source: Option<BoxError>,
    url: Option<Url>,
}

impl Error {
    pub(crate) fn new<E>(kind: Kind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(Inner {
                kind,
                source: source.map(Into::into),
                url: None,
            }),
        }
    }

    /// Returns a possible URL related to this error.
    pub fn url(&self) -> Option<&Url> {
        self.inner.url.as_ref()
    }

    /// Returns a mutable reference to the URL related to this error.
    ///
    /// This is useful if you need to remove sensitive information from the URL
    /// (e.g. an API key in the query), but do not want to remove the URL
    /// entirely.
    pub fn url_mut(&mut self) -> Option<&mut Url> {
        self.inner.url.as_mut()
    }

    /// Add a url related to this error (overwriting any existing).
    pub fn with_url(mut self, url: Url) -> Self {
        self.inner.url = Some(url);
        self
    }

    /// Strip the related url from this error (if, for example, it contains
    /// sensitive information).
    pub fn without_url(mut self) -> Self {
        self.inner.url = None;
        self
    }

    /// Returns true if the error is from a type `Builder`.
    pub fn is_builder(&self) -> bool {
        matches!(self.inner.kind, Kind::Builder)
    }

    /// Returns true if the error came from the network layer: connect, DNS,
    /// TLS, I/O or an expired deadline.
    pub fn is_transport(&self) -> bool {
        matches!(self.inner.kind, Kind::Transport)
    }

    /// Returns true if the error is related to a timeout.
    pub fn is_timeout(&self) -> bool {
        let mut source = self.source();

        while let Some(err) = source {
            if err.is::<TimedOut>() {
                return true;
            }
            if let Some(io) = err.downcast_ref::<io::Error>() {
                if io.kind() == io::ErrorKind::TimedOut {
                    return true;
                }
            }
            source = err.source();
        }

        false
    }

    /// Returns true if the supplied or derived service principal name was
    /// rejected, either locally or by the security subsystem.
    pub fn is_invalid_spn(&self) -> bool {
        matches!(self.inner.kind, Kind::InvalidSpn)
    }

    /// Returns true if the explicit credentials were incomplete or could not
    /// be resolved into an identity.
    pub fn is_invalid_credentials(&self) -> bool {
        matches!(self.inner.kind, Kind::InvalidCredentials)
    }

    /// Returns true if the server kept challenging past the round-trip cap.
    pub fn is_handshake_exceeded(&self) -> bool {
        matches!(self.inner.kind, Kind::HandshakeExceeded)
    }

    /// Returns true if the server or the security subsystem rejected the
    /// identity.
    pub fn is_authentication_failed(&self) -> bool {
        matches!(self.inner.kind, Kind::AuthenticationFailed)
    }

    /// Returns true if the error is related to decoding the response's body.
    pub fn is_decode(&self) -> bool {
        matches!(self.inner.kind, Kind::Decode)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut builder = f.debug_struct("negotiate_http::Error");

        builder.field("kind", &self.inner.kind);

        if let Some(ref url) = self.inner.url {
            builder.field("url", &url.as_str());
        }
        if let Some(ref source) = self.inner.source {
            builder.field("source", source);
        }

        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.inner.kind {
            Kind::Builder => f.write_str("builder error")?,
            Kind::Transport => f.write_str("error sending request")?,
            Kind::InvalidSpn => f.write_str("invalid service principal name")?,
            Kind::InvalidCredentials => f.write_str("invalid credentials")?,
            Kind::HandshakeExceeded => f.write_str("too many authentication round trips")?,
            Kind::AuthenticationFailed => f.write_str("authentication failed")?,
            Kind::Decode => f.write_str("error decoding response body")?,
        }

        if let Some(url) = &self.inner.url {
            write!(f, " for url ({})", url)?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| &**e as _)
    }
}

#[derive(Debug)]
pub(crate) enum Kind {
    Builder,
    Transport,
    InvalidSpn,
    InvalidCredentials,
    HandshakeExceeded,
    AuthenticationFailed,
    Decode,
}

// constructors

pub(crate) fn builder<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Builder, Some(e))
}

pub(crate) fn transport<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Transport, Some(e))
}

pub(crate) fn invalid_spn<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::InvalidSpn, Some(e))
}

pub(crate) fn invalid_credentials<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::InvalidCredentials, Some(e))
}

pub(crate) fn handshake_exceeded(max_rounds: usize) -> Error {
    Error::new(
        Kind::HandshakeExceeded,
        Some(format!("server still challenging after {} rounds", max_rounds)),
    )
}

pub(crate) fn authentication_failed<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::AuthenticationFailed, Some(e))
}

pub(crate) fn decode<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Decode, Some(e))
}

#[derive(Debug)]
pub(crate) struct TimedOut;

impl fmt::Display for TimedOut {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("operation timed out")
    }
}

impl StdError for TimedOut {}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn test_source_chain() {
        let root = Error::new(Kind::Transport, None::<Error>);
        assert!(root.source().is_none());

        let link = transport(root);
        assert!(link.source().is_some());
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn mem_size_of() {
        use std::mem::size_of;
        assert_eq!(size_of::<Error>(), size_of::<usize>());
    }

    #[test]
    fn is_timeout() {
        let err = transport(TimedOut);
        assert!(err.is_timeout());
        assert!(err.is_transport());

        let io = io::Error::from(io::ErrorKind::TimedOut);
        let nested = transport(io);
        assert!(nested.is_timeout());

        let refused = transport(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(!refused.is_timeout());
    }

    #[test]
    fn display_includes_url() {
        let url = Url::parse("http://example.com/secret").unwrap();
        let err = authentication_failed("rejected").with_url(url);
        assert_eq!(
            err.to_string(),
            "authentication failed for url (http://example.com/secret)"
        );
        assert_eq!(err.without_url().to_string(), "authentication failed");
    }

    #[test]
    fn predicates_match_kind() {
        assert!(invalid_spn("empty").is_invalid_spn());
        assert!(invalid_credentials("no password").is_invalid_credentials());
        assert!(handshake_exceeded(4).is_handshake_exceeded());
        assert!(decode("bad json").is_decode());
        assert!(builder("no provider").is_builder());
        assert!(!builder("no provider").is_transport());
    }
}
