use std::net::IpAddr;
use std::sync::Arc;

use rustls::ClientConfig;
use rustls_pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use url::{Host, Url};

use crate::error::BoxError;

pub(crate) fn client_config() -> Result<Arc<ClientConfig>, BoxError> {
    use rustls_platform_verifier::ConfigVerifierExt;

    let mut config = ClientConfig::with_platform_verifier()?;
    // the handshake needs one connection for its rounds; stay on HTTP/1.1
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

pub(crate) async fn connect(
    config: &Arc<ClientConfig>,
    url: &Url,
    stream: TcpStream,
) -> Result<TlsStream<TcpStream>, BoxError> {
    let server_name = match url.host() {
        Some(Host::Domain(domain)) => ServerName::try_from(domain)?.to_owned(),
        Some(Host::Ipv4(ip)) => ServerName::IpAddress(IpAddr::V4(ip).into()),
        Some(Host::Ipv6(ip)) => ServerName::IpAddress(IpAddr::V6(ip).into()),
        None => return Err("URL has no host".into()),
    };

    let connector = TlsConnector::from(Arc::clone(config));
    Ok(connector.connect(server_name, stream).await?)
}
