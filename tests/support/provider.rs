use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use negotiate_http::auth::{
    ContextHandle, ContextRequest, ContextStatus, ProviderError, ProviderErrorKind,
    SecurityProvider,
};

/// What one `initialize_context` call saw.
#[derive(Clone, Debug)]
pub struct Call {
    pub scheme: &'static str,
    pub principal: Option<String>,
    pub domain: Option<String>,
    pub ambient: bool,
    pub target_spn: String,
    pub input: Option<Vec<u8>>,
}

/// A provider that emits `token-1`, `token-2`, ... and reports the context
/// complete once it has produced `complete_after` tokens.
#[derive(Clone, Default)]
pub struct Scripted {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    complete_after: usize,
    fail: Option<ProviderErrorKind>,
    next_handle: AtomicU64,
    steps: AtomicUsize,
    released: AtomicUsize,
    calls: Mutex<Vec<Call>>,
}

impl Scripted {
    pub fn completing_after(tokens: usize) -> Scripted {
        Scripted {
            inner: Arc::new(Inner {
                complete_after: tokens,
                ..Inner::default()
            }),
        }
    }

    /// Never completes.
    pub fn endless() -> Scripted {
        Scripted::completing_after(usize::MAX)
    }

    pub fn failing(kind: ProviderErrorKind) -> Scripted {
        Scripted {
            inner: Arc::new(Inner {
                complete_after: 1,
                fail: Some(kind),
                ..Inner::default()
            }),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn contexts(&self) -> u64 {
        self.inner.next_handle.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.inner.released.load(Ordering::SeqCst)
    }
}

impl SecurityProvider for Scripted {
    fn initialize_context(
        &self,
        handle: &mut Option<ContextHandle>,
        request: &ContextRequest<'_>,
        input_token: Option<&[u8]>,
    ) -> Result<(Vec<u8>, ContextStatus), ProviderError> {
        if handle.is_none() {
            let id = self.inner.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
            *handle = Some(ContextHandle::new(id));
        }

        self.inner.calls.lock().unwrap().push(Call {
            scheme: request.scheme.as_str(),
            principal: request.identity.principal().map(str::to_owned),
            domain: request.identity.domain().map(str::to_owned),
            ambient: request.identity.is_ambient(),
            target_spn: request.target_spn.to_owned(),
            input: input_token.map(<[u8]>::to_vec),
        });

        if let Some(kind) = self.inner.fail {
            return Err(ProviderError::new(kind, "scripted failure"));
        }

        let step = self.inner.steps.fetch_add(1, Ordering::SeqCst) + 1;
        let status = if step >= self.inner.complete_after {
            ContextStatus::Complete
        } else {
            ContextStatus::ContinueNeeded
        };
        Ok((format!("token-{}", step).into_bytes(), status))
    }

    fn release_context(&self, _handle: ContextHandle) {
        self.inner.released.fetch_add(1, Ordering::SeqCst);
    }
}
