//! Request and response types.

use crate::endpoint::Endpoint;
use crate::error::{ResilienceError, Result, TransportError};
use bytes::{Bytes, BytesMut};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;

/// Largest abandoned body [`HttpResponse::drain`] keeps in memory.
pub const MAX_DRAINED_BODY: usize = 64 * 1024;

/// An outgoing request against a logical endpoint.
///
/// Cloning is cheap; the body is reference counted.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl HttpRequest {
    /// Create a request.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Create a request from a URL string.
    pub fn parse(method: Method, url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| ResilienceError::invalid_request(format!("`{url}`: {e}")))?;
        Ok(Self::new(method, url))
    }

    /// A GET request.
    pub fn get(url: &str) -> Result<Self> {
        Self::parse(Method::GET, url)
    }

    /// A POST request.
    pub fn post(url: &str) -> Result<Self> {
        Self::parse(Method::POST, url)
    }

    /// A PUT request.
    pub fn put(url: &str) -> Result<Self> {
        Self::parse(Method::PUT, url)
    }

    /// A DELETE request.
    pub fn delete(url: &str) -> Result<Self> {
        Self::parse(Method::DELETE, url)
    }

    /// A PATCH request.
    pub fn patch(url: &str) -> Result<Self> {
        Self::parse(Method::PATCH, url)
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Add a header from strings.
    pub fn try_header(self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ResilienceError::invalid_request(format!("header name `{name}`: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ResilienceError::invalid_request(format!("header `{name}`: {e}")))?;
        Ok(self.with_header(name, value))
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a JSON body and content type.
    pub fn with_json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)
            .map_err(|e| ResilienceError::invalid_request(format!("JSON body: {e}")))?;
        Ok(self
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_body(body))
    }

    /// The method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The body, if any.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Whether the request uses TLS.
    pub fn is_secure(&self) -> bool {
        self.url.scheme().eq_ignore_ascii_case("https")
    }

    /// The logical endpoint the request targets.
    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::from_url(&self.url)
    }

    /// A copy of this request aimed at `endpoint`.
    pub fn retarget(&self, endpoint: &Endpoint) -> Result<Self> {
        let mut request = self.clone();
        request
            .url
            .set_host(Some(&endpoint.url_host()))
            .map_err(|e| ResilienceError::invalid_request(format!("host `{endpoint}`: {e}")))?;
        request
            .url
            .set_port(endpoint.port())
            .map_err(|()| ResilienceError::invalid_request(format!("cannot set port on `{}`", request.url)))?;
        Ok(request)
    }
}

/// The body of an [`HttpResponse`].
#[derive(Debug, Default)]
pub enum ResponseBody {
    /// No body.
    #[default]
    Empty,
    /// A fully read body.
    Buffered(Bytes),
    /// A body still attached to its connection.
    Streaming(reqwest::Response),
}

/// A response received from one endpoint.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
}

impl HttpResponse {
    /// An empty response with `status`.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
        }
    }

    /// Wrap a live reqwest response without reading its body.
    pub fn from_reqwest(response: reqwest::Response) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            body: ResponseBody::Streaming(response),
        }
    }

    /// Set a buffered body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = ResponseBody::Buffered(body.into());
        self
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// The status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The body.
    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Whether the body is still attached to a connection.
    pub fn is_streaming(&self) -> bool {
        matches!(self.body, ResponseBody::Streaming(_))
    }

    /// Body size, when known without reading it.
    pub fn content_length(&self) -> Option<u64> {
        match &self.body {
            ResponseBody::Empty => Some(0),
            ResponseBody::Buffered(bytes) => Some(bytes.len() as u64),
            ResponseBody::Streaming(response) => response.content_length().or_else(|| {
                self.headers
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
            }),
        }
    }

    /// The content type header.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Read any unread body so the connection can be reused.
    ///
    /// Bodies up to [`MAX_DRAINED_BODY`] bytes are kept, so the response stays
    /// readable afterwards. Larger bodies are dropped along with their
    /// connection and the response is left empty.
    pub async fn drain(&mut self) -> std::result::Result<(), TransportError> {
        if !self.is_streaming() {
            return Ok(());
        }
        let ResponseBody::Streaming(mut response) = std::mem::take(&mut self.body) else {
            return Ok(());
        };
        let mut buffered = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| TransportError::from(e).wrap("draining response body"))?
        {
            if buffered.len() + chunk.len() > MAX_DRAINED_BODY {
                debug!(status = %self.status, "Dropping oversized response body");
                return Ok(());
            }
            buffered.extend_from_slice(&chunk);
        }
        self.body = ResponseBody::Buffered(buffered.freeze());
        Ok(())
    }

    /// Read the whole body.
    pub async fn bytes(self) -> std::result::Result<Bytes, TransportError> {
        match self.body {
            ResponseBody::Empty => Ok(Bytes::new()),
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Streaming(response) => Ok(response.bytes().await?),
        }
    }

    /// Read the body as UTF-8 text.
    pub async fn text(self) -> std::result::Result<String, TransportError> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| TransportError::Other(anyhow::Error::new(e).context("response body is not UTF-8")))
    }

    /// Deserialize a JSON body.
    pub async fn json<T: DeserializeOwned>(self) -> std::result::Result<T, TransportError> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| TransportError::Other(anyhow::Error::new(e).context("decoding JSON body")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_retarget_rewrites_authority_only() {
        let request = HttpRequest::post("http://logical:8080/items?id=3")
            .unwrap()
            .try_header("X-Custom", "yes")
            .unwrap()
            .with_body("payload");

        let retargeted = request.retarget(&Endpoint::new("10.0.0.7", 9000)).unwrap();

        assert_eq!(retargeted.url().as_str(), "http://10.0.0.7:9000/items?id=3");
        assert_eq!(retargeted.method(), &Method::POST);
        assert_eq!(retargeted.headers().get("x-custom").unwrap(), "yes");
        assert_eq!(retargeted.body().unwrap(), &Bytes::from("payload"));
        assert_eq!(request.url().as_str(), "http://logical:8080/items?id=3");
    }

    #[test]
    fn test_retarget_ipv6() {
        let request = HttpRequest::get("http://logical/").unwrap();
        let retargeted = request.retarget(&Endpoint::new("::1", 8080)).unwrap();
        assert_eq!(retargeted.url().as_str(), "http://[::1]:8080/");
    }

    #[test]
    fn test_endpoint_and_scheme() {
        let request = HttpRequest::get("http://svc:81/x").unwrap();
        assert_eq!(request.endpoint().unwrap(), Endpoint::new("svc", 81));
        assert!(!request.is_secure());
        assert!(HttpRequest::get("https://svc/x").unwrap().is_secure());
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            HttpRequest::get("not a url"),
            Err(ResilienceError::InvalidRequest(_))
        ));
        assert!(HttpRequest::get("http://a/").unwrap().try_header("bad name", "v").is_err());
    }

    #[tokio::test]
    async fn test_buffered_body() {
        let response = HttpResponse::new(StatusCode::OK)
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_body(r#"{"ok":true}"#);

        assert_eq!(response.content_length(), Some(11));
        assert_eq!(response.content_type(), Some("application/json"));

        let value: serde_json::Value = response.json().await.unwrap();
        assert_eq!(value, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_drain_keeps_buffered_body() {
        let mut response = HttpResponse::new(StatusCode::OK).with_body("kept");
        response.drain().await.unwrap();
        assert_eq!(response.text().await.unwrap(), "kept");
    }
}
