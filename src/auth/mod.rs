// src/auth/mod.rs

//! Authentication for HTTP Negotiate (SPNEGO/Kerberos/NTLM).
//!
//! The pieces, leaves first:
//!
//! - [`CredentialContext`]: which identity to present and to which service.
//! - [`AmbientIdentity`]: read-only view of the host login session, used when
//!   no explicit credentials are set.
//! - [`SecurityProvider`]: capability interface over the security subsystem
//!   that produces and consumes the opaque handshake tokens.
//! - `session`: the per-request handshake state machine.
//!
//! The engine that drives a session over the transport lives in
//! [`Client`](crate::Client).

mod ambient;
mod credentials;
mod negotiate;
mod provider;
pub(crate) mod session;

#[cfg(feature = "sspi")]
mod sspi;

pub use self::ambient::{AmbientIdentity, AmbientUser, SystemIdentity};
pub use self::credentials::{CredentialContext, Identity, Secret};
pub use self::negotiate::Scheme;
pub use self::provider::{
    ContextHandle, ContextRequest, ContextStatus, ProviderError, ProviderErrorKind,
    SecurityProvider,
};

#[cfg(feature = "sspi")]
pub use self::sspi::SspiProvider;
