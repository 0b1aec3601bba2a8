//! A [`SecurityProvider`] backed by the pure-Rust `sspi` crate.
//!
//! Works on every platform the crate supports: Kerberos when a KDC is
//! reachable, NTLM otherwise (or when the server only offers NTLM).

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use sspi::ntlm::NtlmConfig;
use sspi::{
    AuthIdentity, BufferType, ClientRequestFlags, CredentialUse, Credentials, CredentialsBuffers,
    DataRepresentation, ErrorKind, Negotiate, NegotiateConfig, SecurityBuffer, SecurityStatus,
    Sspi, SspiImpl, Username,
};

use super::credentials::Identity;
use super::negotiate::Scheme;
use super::provider::{
    ContextHandle, ContextRequest, ContextStatus, ProviderError, ProviderErrorKind,
    SecurityProvider,
};

/// Security provider using the `sspi` crate's Negotiate package.
///
/// Each handshake gets its own Negotiate context and credentials handle,
/// kept here until the engine releases it.
#[derive(Default)]
pub struct SspiProvider {
    next_id: AtomicU64,
    contexts: Mutex<HashMap<u64, SspiContext>>,
}

struct SspiContext {
    negotiate: Negotiate,
    creds_handle: Option<CredentialsBuffers>,
}

impl SspiProvider {
    /// Create a provider with no open contexts.
    pub fn new() -> SspiProvider {
        SspiProvider::default()
    }

    fn open(&self, request: &ContextRequest<'_>) -> Result<SspiContext, ProviderError> {
        let packages = match request.scheme {
            Scheme::Negotiate => "kerberos,ntlm",
            Scheme::Ntlm => "ntlm",
        };
        let config = NegotiateConfig::new(
            Box::new(NtlmConfig::default()),
            Some(packages.to_string()),
            String::new(),
        );
        let mut negotiate = Negotiate::new_client(config).map_err(from_sspi)?;

        let credentials = match request.identity {
            Identity::Ambient(_) => None,
            Identity::Explicit {
                domain,
                principal,
                secret,
            } => {
                let username = if principal.contains('@') {
                    Username::parse(principal)
                } else {
                    Username::new(principal, Some(domain.as_str()))
                }
                .map_err(|e| ProviderError::new(ProviderErrorKind::LogonDenied, e.to_string()))?;

                Some(Credentials::from(AuthIdentity {
                    username,
                    password: secret.expose().to_owned().into(),
                }))
            }
        };

        let acquired = {
            let mut builder = negotiate
                .acquire_credentials_handle()
                .with_credential_use(CredentialUse::Outbound);
            if let Some(ref creds) = credentials {
                builder = builder.with_auth_data(creds);
            }
            builder.execute(&mut negotiate).map_err(from_sspi)?
        };

        Ok(SspiContext {
            negotiate,
            creds_handle: acquired.credentials_handle,
        })
    }
}

impl SspiContext {
    fn step(
        &mut self,
        target_spn: &str,
        input_token: Option<&[u8]>,
    ) -> Result<(Vec<u8>, ContextStatus), ProviderError> {
        let mut input = vec![SecurityBuffer::new(
            input_token.map(<[u8]>::to_vec).unwrap_or_default(),
            BufferType::Token,
        )];
        let mut output = vec![SecurityBuffer::new(Vec::new(), BufferType::Token)];
        let mut creds = self.creds_handle.take();

        let mut builder = self
            .negotiate
            .initialize_security_context()
            .with_credentials_handle(&mut creds)
            .with_context_requirements(
                ClientRequestFlags::MUTUAL_AUTH
                    | ClientRequestFlags::REPLAY_DETECT
                    | ClientRequestFlags::SEQUENCE_DETECT,
            )
            .with_target_data_representation(DataRepresentation::Native)
            .with_target_name(target_spn)
            .with_output(&mut output);
        if input_token.is_some() {
            builder = builder.with_input(&mut input);
        }

        let result = self
            .negotiate
            .initialize_security_context_impl(&mut builder)
            .and_then(|generator| generator.resolve_to_result());
        self.creds_handle = creds;

        let status = match result.map_err(from_sspi)?.status {
            SecurityStatus::Ok => ContextStatus::Complete,
            SecurityStatus::ContinueNeeded => ContextStatus::ContinueNeeded,
            other => {
                return Err(ProviderError::new(
                    ProviderErrorKind::Other,
                    format!("unexpected security status {:?}", other),
                ))
            }
        };

        let token = output
            .into_iter()
            .find(|b| b.buffer_type.buffer_type == BufferType::Token)
            .map(|b| b.buffer)
            .unwrap_or_default();
        Ok((token, status))
    }
}

impl SecurityProvider for SspiProvider {
    fn initialize_context(
        &self,
        handle: &mut Option<ContextHandle>,
        request: &ContextRequest<'_>,
        input_token: Option<&[u8]>,
    ) -> Result<(Vec<u8>, ContextStatus), ProviderError> {
        // the context is taken out of the map while it runs, so handshakes
        // on other handles are not serialized behind this one
        let (id, mut context) = match *handle {
            Some(existing) => {
                let context = self
                    .lock()?
                    .remove(&existing.id())
                    .ok_or_else(|| {
                        ProviderError::new(ProviderErrorKind::Other, "unknown context handle")
                    })?;
                (existing.id(), context)
            }
            None => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                *handle = Some(ContextHandle::new(id));
                (id, self.open(request)?)
            }
        };

        let result = context.step(request.target_spn, input_token);
        self.lock()?.insert(id, context);
        result
    }

    fn release_context(&self, handle: ContextHandle) {
        match self.contexts.lock() {
            Ok(mut contexts) => {
                contexts.remove(&handle.id());
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(&handle.id());
            }
        }
    }
}

impl SspiProvider {
    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<u64, SspiContext>>, ProviderError> {
        self.contexts
            .lock()
            .map_err(|_| ProviderError::new(ProviderErrorKind::Other, "context table poisoned"))
    }
}

impl fmt::Debug for SspiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = self.contexts.lock().map(|c| c.len()).unwrap_or_default();
        f.debug_struct("SspiProvider")
            .field("open_contexts", &open)
            .finish()
    }
}

fn from_sspi(err: sspi::Error) -> ProviderError {
    let kind = match err.error_type {
        ErrorKind::LogonDenied => ProviderErrorKind::LogonDenied,
        ErrorKind::TargetUnknown => ProviderErrorKind::InvalidTargetName,
        ErrorKind::InvalidToken => ProviderErrorKind::InvalidToken,
        _ => ProviderErrorKind::Other,
    };
    ProviderError::new(kind, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AmbientUser;

    #[test]
    fn ntlm_negotiate_message() {
        let provider = SspiProvider::new();
        let identity = Identity::Explicit {
            domain: "CORP".into(),
            principal: "alice".into(),
            secret: crate::auth::Secret::new("hunter2"),
        };
        let request = ContextRequest {
            scheme: Scheme::Ntlm,
            identity: &identity,
            target_spn: "HTTP/web.corp",
        };

        let mut handle = None;
        let (token, status) = provider
            .initialize_context(&mut handle, &request, None)
            .unwrap();
        assert_eq!(status, ContextStatus::ContinueNeeded);
        assert!(!token.is_empty());

        provider.release_context(handle.unwrap());
        assert!(provider.contexts.lock().unwrap().is_empty());
    }

    #[test]
    fn unknown_handle_is_an_error() {
        let provider = SspiProvider::new();
        let identity = Identity::Ambient(Some(AmbientUser::new("alice", None)));
        let request = ContextRequest {
            scheme: Scheme::Negotiate,
            identity: &identity,
            target_spn: "HTTP/web.corp",
        };
        let mut handle = Some(ContextHandle::new(42));
        let err = provider
            .initialize_context(&mut handle, &request, Some(b"token"))
            .unwrap_err();
        assert_eq!(err.kind(), ProviderErrorKind::Other);
    }
}
