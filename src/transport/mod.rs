//! The HTTP transport the engine runs its handshakes over.
//!
//! Connection-oriented schemes (NTLM in particular) bind the security
//! context to the TCP connection, so the engine asks for one [`Connection`]
//! per request and sends every round of the handshake through it.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use url::Url;

use crate::error::BoxError;

mod conn;
#[cfg(feature = "rustls")]
mod tls;

pub use self::conn::HttpTransport;

/// A boxed, sendable future, as returned by the transport traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Opens connections to an origin.
pub trait Transport: Send + Sync {
    /// Open a connection to the origin of `url`.
    fn connect<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<Box<dyn Connection>, BoxError>>;
}

/// One connection, kept open across the rounds of a handshake.
///
/// Dropping a connection aborts it.
pub trait Connection: Send {
    /// Send a request and read the full response.
    ///
    /// The request URI is absolute; implementations rewrite it as needed.
    fn send(
        &mut self,
        request: http::Request<Bytes>,
    ) -> BoxFuture<'_, Result<http::Response<Bytes>, BoxError>>;

    /// Returns false once the peer has closed the connection.
    fn is_reusable(&self) -> bool;
}
