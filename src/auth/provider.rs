//! The capability interface over the platform security subsystem.

use std::fmt;
use std::sync::Arc;

use super::credentials::Identity;
use super::negotiate::Scheme;

/// Opaque reference to a security context owned by a [`SecurityProvider`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextHandle(u64);

impl ContextHandle {
    /// Wrap a provider-specific identifier.
    pub fn new(id: u64) -> ContextHandle {
        ContextHandle(id)
    }

    /// The provider-specific identifier.
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Whether the security context needs another token from the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextStatus {
    /// Send the output token and feed the server's reply back in.
    ContinueNeeded,
    /// The context is established; the output token (if any) is the last.
    Complete,
}

/// What a security context is being initialized for.
#[derive(Debug)]
pub struct ContextRequest<'a> {
    /// The HTTP scheme the server challenged with.
    pub scheme: Scheme,
    /// The identity to authenticate as.
    pub identity: &'a Identity,
    /// The service principal name of the server.
    pub target_spn: &'a str,
}

/// The security subsystem that produces and consumes handshake tokens.
///
/// Implementations wrap SSPI, GSSAPI, a pure-Rust NTLM/Kerberos stack, or a
/// scripted fake in tests. Calls for one handle are strictly sequential;
/// calls for different handles may happen concurrently.
pub trait SecurityProvider: Send + Sync {
    /// Advance the security context.
    ///
    /// On the first call `handle` is `None` and `input_token` is `None`; the
    /// provider creates a context and stores its handle in `handle`, even if
    /// it then fails. Later calls pass the server's token.
    ///
    /// Returns the token to send to the server and the resulting status.
    fn initialize_context(
        &self,
        handle: &mut Option<ContextHandle>,
        request: &ContextRequest<'_>,
        input_token: Option<&[u8]>,
    ) -> Result<(Vec<u8>, ContextStatus), ProviderError>;

    /// Release a context. Called exactly once per handle.
    fn release_context(&self, handle: ContextHandle);
}

impl<P: SecurityProvider + ?Sized> SecurityProvider for Arc<P> {
    fn initialize_context(
        &self,
        handle: &mut Option<ContextHandle>,
        request: &ContextRequest<'_>,
        input_token: Option<&[u8]>,
    ) -> Result<(Vec<u8>, ContextStatus), ProviderError> {
        (**self).initialize_context(handle, request, input_token)
    }

    fn release_context(&self, handle: ContextHandle) {
        (**self).release_context(handle)
    }
}

/// Classifies a [`ProviderError`] so the engine can map it onto its own
/// error kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The identity was rejected (bad password, locked account, ...).
    LogonDenied,
    /// The target name is unknown or malformed.
    InvalidTargetName,
    /// The server's token could not be processed.
    InvalidToken,
    /// Anything else the subsystem reports.
    Other,
}

/// An error reported by a [`SecurityProvider`].
#[derive(Debug)]
pub struct ProviderError {
    kind: ProviderErrorKind,
    message: String,
}

impl ProviderError {
    /// Create a provider error.
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> ProviderError {
        ProviderError {
            kind,
            message: message.into(),
        }
    }

    /// The classification of this error.
    pub fn kind(&self) -> ProviderErrorKind {
        self.kind
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ProviderError {}

/// Owns one provider handle and releases it exactly once, on `release` or
/// on drop, whichever comes first.
pub(crate) struct SecurityContext {
    provider: Arc<dyn SecurityProvider>,
    handle: Option<ContextHandle>,
    status: Option<ContextStatus>,
}

impl SecurityContext {
    pub(crate) fn new(provider: Arc<dyn SecurityProvider>) -> SecurityContext {
        SecurityContext {
            provider,
            handle: None,
            status: None,
        }
    }

    pub(crate) fn step(
        &mut self,
        request: &ContextRequest<'_>,
        input_token: Option<&[u8]>,
    ) -> Result<Vec<u8>, ProviderError> {
        let (token, status) =
            self.provider
                .initialize_context(&mut self.handle, request, input_token)?;
        self.status = Some(status);
        Ok(token)
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.status == Some(ContextStatus::Complete)
    }

    pub(crate) fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            log::trace!("releasing security context {}", handle.id());
            self.provider.release_context(handle);
        }
    }
}

impl Drop for SecurityContext {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityContext")
            .field("handle", &self.handle)
            .field("status", &self.status)
            .finish()
    }
}
