use std::fmt;

use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version};
#[cfg(feature = "json")]
use serde::de::DeserializeOwned;
use url::Url;

use crate::error;

/// A Response to a submitted `Request`, after authentication completed.
///
/// The body has been read in full; the connection and the security context
/// used to obtain it are already released.
pub struct Response {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    url: Url,
    body: Bytes,
    rounds: usize,
}

impl Response {
    pub(crate) fn new(res: http::Response<Bytes>, url: Url, rounds: usize) -> Response {
        let (parts, body) = res.into_parts();
        Response {
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
            url,
            body,
            rounds,
        }
    }

    /// Get the `StatusCode` of this `Response`.
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the HTTP `Version` of this `Response`.
    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Get the `Headers` of this `Response`.
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a mutable reference to the `Headers` of this `Response`.
    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Get the final `Url` of this `Response`.
    #[inline]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// How many requests it took to get this response, the initial
    /// unauthenticated one included.
    #[inline]
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Get the content-length of the response body.
    pub fn content_length(&self) -> Option<u64> {
        Some(self.body.len() as u64)
    }

    /// Get the full response body as `Bytes`.
    pub async fn bytes(self) -> crate::Result<Bytes> {
        Ok(self.body)
    }

    /// Get the full response text.
    ///
    /// # Errors
    ///
    /// Fails with a decode error if the body is not valid UTF-8.
    pub async fn text(self) -> crate::Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| error::decode(e).with_url(self.url))
    }

    /// Try to deserialize the response body as JSON.
    ///
    /// # Errors
    ///
    /// This method fails whenever the response body is not in JSON format,
    /// or it cannot be properly deserialized to target type `T`.
    #[cfg(feature = "json")]
    #[cfg_attr(docsrs, doc(cfg(feature = "json")))]
    pub async fn json<T: DeserializeOwned>(self) -> crate::Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| error::decode(e).with_url(self.url))
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Response")
            .field("url", &self.url.as_str())
            .field("status", &self.status())
            .field("headers", self.headers())
            .field("rounds", &self.rounds)
            .finish()
    }
}
