use std::fmt;
#[cfg(feature = "rustls")]
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderValue, HOST};
use http::uri::{PathAndQuery, Uri};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use url::Url;

use super::{BoxFuture, Connection, Transport};
use crate::error::{BoxError, TimedOut};

/// HTTP/1.1 over TCP, or over TLS for `https` URLs when the `rustls`
/// feature is enabled.
///
/// Each [`connect`](Transport::connect) opens a fresh connection driven by a
/// background task on the current tokio runtime.
#[derive(Clone)]
pub struct HttpTransport {
    connect_timeout: Option<Duration>,
    #[cfg(feature = "rustls")]
    tls: Arc<OnceLock<Arc<rustls::ClientConfig>>>,
}

impl HttpTransport {
    /// Create a transport. With the `rustls` feature the platform
    /// certificate verifier is loaded on the first `https` connection.
    pub fn new() -> crate::Result<HttpTransport> {
        Ok(HttpTransport {
            connect_timeout: None,
            #[cfg(feature = "rustls")]
            tls: Arc::new(OnceLock::new()),
        })
    }

    #[cfg(feature = "rustls")]
    fn tls_config(&self) -> Result<Arc<rustls::ClientConfig>, BoxError> {
        if let Some(config) = self.tls.get() {
            return Ok(Arc::clone(config));
        }
        let config = super::tls::client_config()?;
        Ok(Arc::clone(self.tls.get_or_init(|| config)))
    }

    /// Bound the time spent establishing TCP connections.
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> HttpTransport {
        self.connect_timeout = timeout;
        self
    }

    async fn tcp_connect(&self, url: &Url) -> Result<TcpStream, BoxError> {
        let host = url.host_str().ok_or("URL has no host")?;
        let port = url.port_or_known_default().ok_or("URL has no port")?;
        let addr = format!("{}:{}", host, port);

        let connecting = TcpStream::connect(addr);
        let stream = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connecting)
                .await
                .map_err(|_| TimedOut)??,
            None => connecting.await?,
        };
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

impl Transport for HttpTransport {
    fn connect<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<Box<dyn Connection>, BoxError>> {
        Box::pin(async move {
            let stream = self.tcp_connect(url).await?;
            log::trace!("connected to {}", url.origin().ascii_serialization());

            match url.scheme() {
                "http" => handshake(TokioIo::new(stream)).await,
                #[cfg(feature = "rustls")]
                "https" => {
                    let config = self.tls_config()?;
                    let stream = super::tls::connect(&config, url, stream).await?;
                    handshake(TokioIo::new(stream)).await
                }
                other => Err(format!("unsupported URL scheme {:?}", other).into()),
            }
        })
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

async fn handshake<T>(io: T) -> Result<Box<dyn Connection>, BoxError>
where
    T: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (sender, conn) = http1::handshake::<_, Full<Bytes>>(io).await?;
    let driver = tokio::spawn(async move {
        if let Err(err) = conn.await {
            log::debug!("connection error: {}", err);
        }
    });
    Ok(Box::new(HttpConnection { sender, driver }))
}

struct HttpConnection {
    sender: http1::SendRequest<Full<Bytes>>,
    driver: JoinHandle<()>,
}

impl Connection for HttpConnection {
    fn send(
        &mut self,
        request: http::Request<Bytes>,
    ) -> BoxFuture<'_, Result<http::Response<Bytes>, BoxError>> {
        Box::pin(async move {
            let request = origin_form(request)?;
            self.sender.ready().await?;
            let response = self.sender.send_request(request.map(Full::new)).await?;
            let (parts, body) = response.into_parts();
            let body = body.collect().await?.to_bytes();
            Ok(http::Response::from_parts(parts, body))
        })
    }

    fn is_reusable(&self) -> bool {
        !self.sender.is_closed()
    }
}

impl Drop for HttpConnection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Rewrite an absolute-form request for a direct origin connection:
/// path-and-query as the target, authority in `Host`.
fn origin_form(mut request: http::Request<Bytes>) -> Result<http::Request<Bytes>, BoxError> {
    let uri = request.uri().clone();

    if !request.headers().contains_key(HOST) {
        if let Some(authority) = uri.authority() {
            let host = match authority.port_u16() {
                Some(port) => format!("{}:{}", authority.host(), port),
                None => authority.host().to_owned(),
            };
            request.headers_mut().insert(HOST, HeaderValue::from_str(&host)?);
        }
    }

    let target = uri
        .path_and_query()
        .map(PathAndQuery::as_str)
        .unwrap_or("/");
    *request.uri_mut() = target.parse::<Uri>()?;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(uri: &str) -> http::Request<Bytes> {
        let request = http::Request::get(uri).body(Bytes::new()).unwrap();
        origin_form(request).unwrap()
    }

    #[test]
    fn origin_form_sets_host() {
        let request = rewrite("http://user:pw@web.corp:8080/app?q=1");
        assert_eq!(request.uri(), "/app?q=1");
        assert_eq!(request.headers()[HOST], "web.corp:8080");
    }

    #[test]
    fn origin_form_default_path() {
        let request = rewrite("http://web.corp");
        assert_eq!(request.uri(), "/");
        assert_eq!(request.headers()[HOST], "web.corp");
    }

    #[test]
    fn origin_form_keeps_explicit_host() {
        let request = http::Request::get("http://10.0.0.1/")
            .header(HOST, "virtual.corp")
            .body(Bytes::new())
            .unwrap();
        let request = origin_form(request).unwrap();
        assert_eq!(request.headers()[HOST], "virtual.corp");
    }
}
