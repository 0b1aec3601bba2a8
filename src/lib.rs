#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # negotiate-http
//!
//! An async HTTP client that authenticates to servers (and proxies) that
//! answer with `WWW-Authenticate: Negotiate` or `WWW-Authenticate: NTLM`.
//!
//! - Kerberos/SPNEGO and NTLM through a pluggable [`SecurityProvider`](auth::SecurityProvider)
//! - Ambient login-session identity or explicit credentials
//! - Explicit service principal names
//! - Every round of a handshake on one connection
//! - Plain HTTP/1.1, or HTTPS with the `rustls` feature
//!
//! ## Making a request
//!
//! ```rust,no_run
//! # async fn run() -> negotiate_http::Result<()> {
//! let client = negotiate_http::Client::builder().build()?;
//!
//! let body = client
//!     .fetch("http://intranet.corp.example/")
//!     .await?
//!     .text()
//!     .await?;
//!
//! println!("body = {body:?}");
//! # Ok(())
//! # }
//! ```
//!
//! The first request goes out without credentials. If the server replies
//! `401` (or a proxy `407`) with a Negotiate or NTLM challenge, the client
//! obtains a token from the security provider and repeats the request with
//! an `Authorization` header, until the server accepts it. A server that
//! never stops challenging fails the request after
//! [`max_rounds`](ClientBuilder::max_rounds) token rounds.
//!
//! ## Credentials
//!
//! By default the identity of the current login session is used, and the
//! target is `HTTP/<host>` of the request URL. Both can be overridden:
//!
//! ```rust,no_run
//! # fn run() -> negotiate_http::Result<()> {
//! let mut client = negotiate_http::Client::builder().build()?;
//! client.set_credentials("CORP", "alice", "secret")?;
//! client.set_target_name("HTTP/web.corp.example")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Optional Features
//!
//! - **rustls** *(enabled by default)*: HTTPS via rustls and the platform
//!   certificate verifier.
//! - **json** *(enabled by default)*: `RequestBuilder::json` and
//!   `Response::json`.
//! - **sspi**: a default security provider backed by the `sspi` crate.
//!   Without it, a provider must be passed to
//!   [`ClientBuilder::security_provider`].

pub use http::header;
pub use http::Method;
pub use http::{StatusCode, Version};
pub use url::Url;

pub use self::client::{Client, ClientBuilder};
pub use self::error::{Error, Result};
pub use self::into_url::IntoUrl;
pub use self::request::{Request, RequestBuilder};
pub use self::response::Response;

pub mod auth;
mod client;
mod error;
mod into_url;
mod request;
mod response;
pub mod transport;
