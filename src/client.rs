use std::convert::TryFrom;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, USER_AGENT};
use http::Method;

use crate::auth::session::{HandshakeSession, Next, SessionOptions};
use crate::auth::{AmbientIdentity, CredentialContext, SecurityProvider, SystemIdentity};
use crate::error::{self, TimedOut};
use crate::request::{Request, RequestBuilder};
use crate::transport::{HttpTransport, Transport};
use crate::{IntoUrl, Response};

const DEFAULT_MAX_ROUNDS: usize = 4;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// An HTTP client that authenticates with Negotiate (SPNEGO/Kerberos) or
/// NTLM when the server asks for it.
///
/// Every request runs its own handshake on its own connection: the first
/// request goes out without credentials, and each `401`/`407` challenge is
/// answered with a token from the [`SecurityProvider`] until the server
/// accepts or a limit is reached.
///
/// The `Client` holds a connection-independent configuration and the
/// [`CredentialContext`]. Cloning is cheap; clones share configuration but
/// each keeps its own credentials, so changing the credentials of one clone
/// never affects another, or a request already in flight.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientRef>,
    credentials: Arc<CredentialContext>,
}

/// A `ClientBuilder` can be used to create a `Client` with custom configuration.
#[must_use]
pub struct ClientBuilder {
    config: Config,
}

struct Config {
    // NOTE: When adding a new field, update `fmt::Debug for ClientBuilder`
    error: Option<crate::Error>,
    credentials: CredentialContext,
    headers: HeaderMap,
    max_rounds: usize,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    mutual_auth: bool,
    basic_fallback: bool,
    transport: Option<Arc<dyn Transport>>,
    provider: Option<Arc<dyn SecurityProvider>>,
    ambient: Arc<dyn AmbientIdentity>,
}

struct ClientRef {
    headers: HeaderMap,
    timeout: Option<Duration>,
    options: SessionOptions,
    transport: Arc<dyn Transport>,
    provider: Arc<dyn SecurityProvider>,
    ambient: Arc<dyn AmbientIdentity>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    /// Constructs a new `ClientBuilder`.
    ///
    /// This is the same as `Client::builder()`.
    pub fn new() -> ClientBuilder {
        ClientBuilder {
            config: Config {
                error: None,
                credentials: CredentialContext::new(),
                headers: HeaderMap::new(),
                max_rounds: DEFAULT_MAX_ROUNDS,
                timeout: None,
                connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
                mutual_auth: false,
                basic_fallback: false,
                transport: None,
                provider: None,
                ambient: Arc::new(SystemIdentity),
            },
        }
    }

    /// Returns a `Client` that uses this `ClientBuilder` configuration.
    ///
    /// # Errors
    ///
    /// This method fails if a setting was invalid, if TLS cannot be
    /// initialized, or if no security provider is available (the `sspi`
    /// feature is off and none was given).
    pub fn build(self) -> crate::Result<Client> {
        let config = self.config;

        if let Some(err) = config.error {
            return Err(err);
        }

        let provider = match config.provider {
            Some(provider) => provider,
            None => default_provider()?,
        };
        let transport = match config.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new()?.connect_timeout(config.connect_timeout)),
        };

        Ok(Client {
            inner: Arc::new(ClientRef {
                headers: config.headers,
                timeout: config.timeout,
                options: SessionOptions {
                    max_rounds: config.max_rounds,
                    mutual_auth: config.mutual_auth,
                    basic_fallback: config.basic_fallback,
                },
                transport,
                provider,
                ambient: config.ambient,
            }),
            credentials: Arc::new(config.credentials),
        })
    }

    // Higher-level options

    /// Sets the `User-Agent` header to be used by this client.
    pub fn user_agent<V>(mut self, value: V) -> ClientBuilder
    where
        V: TryFrom<HeaderValue>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        match <HeaderValue as TryFrom<V>>::try_from(value) {
            Ok(value) => {
                self.config.headers.insert(USER_AGENT, value);
            }
            Err(e) => {
                self.config.error = Some(error::builder(e.into()));
            }
        };
        self
    }

    /// Sets the default headers for every request.
    ///
    /// Headers set on a request take precedence.
    pub fn default_headers(mut self, headers: HeaderMap) -> ClientBuilder {
        for (key, value) in headers.iter() {
            self.config.headers.insert(key, value.clone());
        }
        self
    }

    /// Authenticate with an explicit identity instead of the login session.
    ///
    /// See [`CredentialContext::set_credentials`]; an invalid identity makes
    /// [`build`](Self::build) fail.
    pub fn credentials(
        mut self,
        domain: impl Into<String>,
        principal: impl Into<String>,
        secret: impl Into<String>,
    ) -> ClientBuilder {
        if let Err(err) = self
            .config
            .credentials
            .set_credentials(domain, principal, secret)
        {
            self.config.error = Some(err);
        }
        self
    }

    /// Authenticate against this service principal name instead of deriving
    /// `HTTP/<host>` from each request URL.
    pub fn target_name(mut self, spn: impl Into<String>) -> ClientBuilder {
        if let Err(err) = self.config.credentials.set_target_name(spn) {
            self.config.error = Some(err);
        }
        self
    }

    // Handshake options

    /// Cap the number of token-carrying requests in one handshake.
    ///
    /// Default is 4. A server still challenging after that many rounds fails
    /// the request with a handshake-exceeded error.
    pub fn max_rounds(mut self, max: usize) -> ClientBuilder {
        if max == 0 {
            self.config.error = Some(error::builder("max_rounds must be at least 1"));
        }
        self.config.max_rounds = max;
        self
    }

    /// Require the server to prove its identity.
    ///
    /// When enabled, a successful response that does not complete the
    /// security context (no final server token) fails with an
    /// authentication error. Default is `false`.
    pub fn mutual_auth(mut self, enable: bool) -> ClientBuilder {
        self.config.mutual_auth = enable;
        self
    }

    /// Answer a `Basic`-only challenge with the explicit credentials.
    ///
    /// Only applies when explicit credentials are set, and sends the password
    /// in the clear unless the connection uses TLS. Default is `false`.
    pub fn basic_fallback(mut self, enable: bool) -> ClientBuilder {
        self.config.basic_fallback = enable;
        self
    }

    // Timeout options

    /// Enables a total request timeout.
    ///
    /// The timeout covers every round of the handshake, from connecting
    /// until the final response body has been read. When it expires the
    /// handshake is abandoned and its security context released.
    ///
    /// Default is no timeout.
    pub fn timeout(mut self, timeout: Duration) -> ClientBuilder {
        self.config.timeout = Some(timeout);
        self
    }

    /// Set a timeout for only the connect phase of a `Client`.
    ///
    /// Default is 30 seconds. Ignored when a custom transport is set.
    pub fn connect_timeout(mut self, timeout: Duration) -> ClientBuilder {
        self.config.connect_timeout = Some(timeout);
        self
    }

    // Seams

    /// Use this security provider for the handshakes.
    ///
    /// Defaults to `SspiProvider` when the `sspi` feature is enabled.
    pub fn security_provider<P>(mut self, provider: P) -> ClientBuilder
    where
        P: SecurityProvider + 'static,
    {
        self.config.provider = Some(Arc::new(provider));
        self
    }

    /// Use this source for the login-session identity.
    ///
    /// Defaults to [`SystemIdentity`].
    pub fn ambient_identity<A>(mut self, ambient: A) -> ClientBuilder
    where
        A: AmbientIdentity + 'static,
    {
        self.config.ambient = Arc::new(ambient);
        self
    }

    /// Use this transport instead of the built-in HTTP/1.1 one.
    pub fn transport<T>(mut self, transport: T) -> ClientBuilder
    where
        T: Transport + 'static,
    {
        self.config.transport = Some(Arc::new(transport));
        self
    }
}

#[cfg(feature = "sspi")]
fn default_provider() -> crate::Result<Arc<dyn SecurityProvider>> {
    Ok(Arc::new(crate::auth::SspiProvider::new()))
}

#[cfg(not(feature = "sspi"))]
fn default_provider() -> crate::Result<Arc<dyn SecurityProvider>> {
    Err(error::builder(
        "no security provider: enable the `sspi` feature or set one with `ClientBuilder::security_provider`",
    ))
}

impl Client {
    /// Creates a `ClientBuilder` to configure a `Client`.
    ///
    /// This is the same as `ClientBuilder::new()`.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Convenience method to make a `GET` request to a URL.
    ///
    /// # Errors
    ///
    /// This method fails whenever the supplied `Url` cannot be parsed.
    pub fn get<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Convenience method to make a `POST` request to a URL.
    ///
    /// # Errors
    ///
    /// This method fails whenever the supplied `Url` cannot be parsed.
    pub fn post<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Convenience method to make a `PUT` request to a URL.
    ///
    /// # Errors
    ///
    /// This method fails whenever the supplied `Url` cannot be parsed.
    pub fn put<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    /// Convenience method to make a `DELETE` request to a URL.
    ///
    /// # Errors
    ///
    /// This method fails whenever the supplied `Url` cannot be parsed.
    pub fn delete<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    /// Start building a `Request` with the `Method` and `Url`.
    ///
    /// Returns a `RequestBuilder`, which will allow setting headers and
    /// the request body before sending.
    ///
    /// # Errors
    ///
    /// This method fails whenever the supplied `Url` cannot be parsed.
    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        let req = url.into_url().map(move |url| Request::new(method, url));
        RequestBuilder::new(self.clone(), req)
    }

    /// `GET` a URL, authenticating as needed.
    ///
    /// Resolves with the response once the server accepts the request
    /// (any non-challenge status, not only `2xx`).
    ///
    /// # Errors
    ///
    /// Fails if the URL or credentials are invalid, the transport fails,
    /// the server rejects the identity, or it keeps challenging past
    /// [`max_rounds`](ClientBuilder::max_rounds).
    pub async fn fetch<U: IntoUrl>(&self, url: U) -> crate::Result<Response> {
        self.get(url).send().await
    }

    /// Executes a `Request`.
    ///
    /// A `Request` can be built manually with `Request::new()` or obtained
    /// from a RequestBuilder with `RequestBuilder::build()`.
    ///
    /// You should prefer to use the `RequestBuilder` and
    /// `RequestBuilder::send()`.
    ///
    /// # Errors
    ///
    /// This method fails if there was an error while sending request,
    /// or the authentication handshake failed.
    pub async fn execute(&self, request: Request) -> crate::Result<Response> {
        let url = request.url().clone();
        let timeout = request.timeout().copied().or(self.inner.timeout);
        let credentials = Arc::clone(&self.credentials);
        let pending = self.execute_request(request, credentials);

        let result = match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, pending).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    log::debug!("request to {} timed out", url.origin().ascii_serialization());
                    Err(error::transport(TimedOut))
                }
            },
            None => pending.await,
        };

        result.map_err(|err| err.with_url(url))
    }

    async fn execute_request(
        &self,
        request: Request,
        credentials: Arc<CredentialContext>,
    ) -> crate::Result<Response> {
        let url = request.url().clone();

        // local validation happens before any network activity
        let target_spn = credentials.resolve_spn(&url)?;
        let identity = credentials.resolve_identity(&*self.inner.ambient)?;
        drop(credentials);

        let mut session = HandshakeSession::new(
            Arc::clone(&self.inner.provider),
            identity,
            target_spn,
            self.inner.options,
        );
        session.start()?;

        let transport = &self.inner.transport;
        let mut connection = transport
            .connect(&url)
            .await
            .map_err(|e| session.fail(error::transport(e)))?;
        let mut authorization: Option<(HeaderName, HeaderValue)> = None;
        let mut peer_closing = false;

        loop {
            let mut outgoing = request
                .to_http(&self.inner.headers)
                .map_err(|e| session.fail(e))?;
            if let Some((name, value)) = authorization.take() {
                outgoing.headers_mut().insert(name, value);
            }

            if peer_closing || !connection.is_reusable() {
                log::warn!(
                    "connection to {} closed mid-handshake, reconnecting",
                    url.origin().ascii_serialization()
                );
                connection = transport
                    .connect(&url)
                    .await
                    .map_err(|e| session.fail(error::transport(e)))?;
            }

            let response = connection
                .send(outgoing)
                .await
                .map_err(|e| session.fail(error::transport(e)))?;

            peer_closing = announces_close(response.headers());

            log::debug!(
                "{} {} round {}: {}",
                request.method(),
                url.path(),
                session.round_trips(),
                response.status()
            );

            match session.on_response(response.status(), response.headers())? {
                Next::Retry(name, value) => authorization = Some((name, value)),
                Next::Done => {
                    let rounds = session.round_trips();
                    session.close();
                    return Ok(Response::new(response, url, rounds));
                }
            }
        }
    }

    // Credentials

    /// Authenticate subsequent requests with an explicit identity.
    ///
    /// Requests already in flight keep the identity they started with.
    ///
    /// # Errors
    ///
    /// Fails with an invalid-credentials error if `principal` or `secret` is
    /// empty; the previous credentials stay in place.
    pub fn set_credentials(
        &mut self,
        domain: impl Into<String>,
        principal: impl Into<String>,
        secret: impl Into<String>,
    ) -> crate::Result<()> {
        let mut credentials = (*self.credentials).clone();
        credentials.set_credentials(domain, principal, secret)?;
        self.credentials = Arc::new(credentials);
        Ok(())
    }

    /// Authenticate subsequent requests against this service principal name.
    ///
    /// # Errors
    ///
    /// Fails with an invalid-SPN error if `spn` is empty or malformed. No
    /// network activity happens.
    pub fn set_target_name(&mut self, spn: impl Into<String>) -> crate::Result<()> {
        let mut credentials = (*self.credentials).clone();
        credentials.set_target_name(spn)?;
        self.credentials = Arc::new(credentials);
        Ok(())
    }

    /// Go back to the login-session identity for subsequent requests.
    pub fn clear_credentials(&mut self) {
        let mut credentials = (*self.credentials).clone();
        credentials.clear();
        self.credentials = Arc::new(credentials);
    }

    /// Go back to deriving the SPN from each request URL.
    pub fn clear_target_name(&mut self) {
        let mut credentials = (*self.credentials).clone();
        credentials.clear_target_name();
        self.credentials = Arc::new(credentials);
    }

    /// The credentials subsequent requests will use.
    pub fn credentials(&self) -> &CredentialContext {
        &self.credentials
    }
}

/// The server will close the connection after this response, so the next
/// round cannot go out on it.
fn announces_close(headers: &HeaderMap) -> bool {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("close"))
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Client")
            .field("credentials", &self.credentials)
            .field("headers", &self.inner.headers)
            .field("timeout", &self.inner.timeout)
            .field("options", &self.inner.options)
            .finish()
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("credentials", &self.config.credentials)
            .field("headers", &self.config.headers)
            .field("max_rounds", &self.config.max_rounds)
            .field("timeout", &self.config.timeout)
            .field("connect_timeout", &self.config.connect_timeout)
            .field("mutual_auth", &self.config.mutual_auth)
            .field("basic_fallback", &self.config.basic_fallback)
            .field("custom_transport", &self.config.transport.is_some())
            .field("custom_provider", &self.config.provider.is_some())
            .finish()
    }
}
