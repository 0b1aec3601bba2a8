//! Public API checks that need no server.

use negotiate_http::auth::{AmbientIdentity, AmbientUser, CredentialContext, Scheme};
use negotiate_http::Client;

#[test]
fn credential_context_is_local_state() {
    let mut creds = CredentialContext::new();
    assert!(!creds.has_explicit_credentials());

    creds.set_credentials("", "CORP\\alice", "pw").unwrap();
    assert_eq!(creds.domain(), Some("CORP"));
    assert_eq!(creds.principal(), Some("alice"));

    creds.set_target_name("HTTP/web.corp.example").unwrap();
    creds.clear();
    assert!(!creds.has_explicit_credentials());
    assert_eq!(creds.target_name(), Some("HTTP/web.corp.example"));

    let err = creds.set_target_name("HTTP/bad host").unwrap_err();
    assert!(err.is_invalid_spn());
    assert_eq!(creds.target_name(), Some("HTTP/web.corp.example"));
}

#[test]
fn ambient_user_display() {
    let user = AmbientUser::new("alice", Some("CORP".into()));
    assert_eq!(user.to_string(), "CORP\\alice");
    assert_eq!(user.current_user(), Some(user.clone()));
}

#[test]
fn scheme_names_match_the_header_tokens() {
    assert_eq!(Scheme::Negotiate.as_str(), "Negotiate");
    assert_eq!(Scheme::Ntlm.to_string(), "NTLM");
}

#[test]
fn request_with_invalid_url_fails_at_send() {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    #[cfg(not(feature = "sspi"))]
    assert!(Client::builder().build().unwrap_err().is_builder());

    let client = Client::builder()
        .security_provider(support_free::Never)
        .build()
        .unwrap();
    let err = rt
        .block_on(client.get("ftp://files.corp.example/").send())
        .unwrap_err();
    assert!(err.is_builder());
    assert_eq!(
        err.url().map(|u| u.as_str()),
        Some("ftp://files.corp.example/")
    );
}

mod support_free {
    use negotiate_http::auth::{
        ContextHandle, ContextRequest, ContextStatus, ProviderError, ProviderErrorKind,
        SecurityProvider,
    };

    pub struct Never;

    impl SecurityProvider for Never {
        fn initialize_context(
            &self,
            _handle: &mut Option<ContextHandle>,
            _request: &ContextRequest<'_>,
            _input_token: Option<&[u8]>,
        ) -> Result<(Vec<u8>, ContextStatus), ProviderError> {
            Err(ProviderError::new(ProviderErrorKind::Other, "not used"))
        }

        fn release_context(&self, _handle: ContextHandle) {}
    }
}
