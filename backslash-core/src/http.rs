//! # Transport
//!
//! Owns the pooled HTTP connection to the Backslash server and performs every
//! request the client makes.
//!
//! ```text
//! call_function(name, params)
//!        |
//!        v
//! +------------------+   too large   +------------------+
//! | Params::encode   | ------------> | PayloadTooLarge  |
//! | (gzip > 4 KiB)   |               +------------------+
//! +------------------+
//!        |
//!        v
//! +------------------+  conn error / timeout / 502 / 504   +------------------+
//! | attempt          | ----------------------------------> | sleep [3s, 10s)  |
//! | POST /api/<name> | <---------------------------------- | while window open|
//! +------------------+                                     +------------------+
//!        |                                                          |
//!        | 2xx                          other status       window elapsed
//!        v                                   |                      |
//!   JSON body                            Error::Status     Error::RetriesExhausted
//! ```
//!
//! The connection pool lives as long as the [`Transport`] and is released
//! when it is dropped.

use backon::Retryable;
use bytes::Bytes;
use http::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE},
    Method, Request,
};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::{client::legacy, rt::TokioExecutor};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::*;
use url::Url;

use crate::{
    capabilities::Capabilities,
    config::{Config, PayloadConfig},
    masking::{mask_headers, mask_url},
    params::{Params, Payload},
    retry::RetryWindow,
    Error, Result,
};

pub const RUN_TOKEN_HEADER: &str = "x-backslash-run-token";
pub const CLIENT_VERSION_HEADER: &str = "x-backslash-client-version";
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(feature = "native-tls")]
type Connector = hyper_tls::HttpsConnector<legacy::connect::HttpConnector>;
#[cfg(all(feature = "rustls-tls", not(feature = "native-tls")))]
type Connector = hyper_rustls::HttpsConnector<legacy::connect::HttpConnector>;
#[cfg(not(any(feature = "native-tls", feature = "rustls-tls")))]
type Connector = legacy::connect::HttpConnector;

#[cfg(feature = "native-tls")]
fn connector() -> Result<Connector> {
    Ok(hyper_tls::HttpsConnector::new())
}

#[cfg(all(feature = "rustls-tls", not(feature = "native-tls")))]
fn connector() -> Result<Connector> {
    Ok(hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()?
        .https_or_http()
        .enable_http1()
        .build())
}

#[cfg(not(any(feature = "native-tls", feature = "rustls-tls")))]
fn connector() -> Result<Connector> {
    Ok(legacy::connect::HttpConnector::new())
}

/// Authenticated connection to one Backslash server.
pub struct Transport {
    base: Url,
    inner: legacy::Client<Connector, Full<Bytes>>,
    headers: HeaderMap,
    timeout: Duration,
    retry: RetryWindow,
    payload: PayloadConfig,
    capabilities: OnceCell<Capabilities>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base", &self.base.as_str())
            .field("headers", &mask_headers(&self.headers))
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Transport {
    pub fn new(cfg: &Config) -> Result<Transport> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &cfg.run_token {
            headers.insert(
                RUN_TOKEN_HEADER,
                HeaderValue::from_str(token).map_err(http::Error::from)?,
            );
        }
        headers.insert(
            CLIENT_VERSION_HEADER,
            HeaderValue::from_static(CLIENT_VERSION),
        );
        for (name, value) in &cfg.headers {
            headers.insert(
                HeaderName::try_from(name.as_str()).map_err(http::Error::from)?,
                HeaderValue::from_str(value).map_err(http::Error::from)?,
            );
        }

        Ok(Transport {
            base: cfg.base_url()?,
            inner: legacy::Client::builder(TokioExecutor::new()).build(connector()?),
            headers,
            timeout: cfg.timeout,
            retry: RetryWindow::from(&cfg.retry),
            payload: cfg.payload.clone(),
            capabilities: OnceCell::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Resolves a server path (optionally carrying a query string) against the base URL.
    pub fn url_for(&self, path: &str) -> Result<Url> {
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };

        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(path.split('/').filter(|s| !s.is_empty()));
        url.set_query(query);
        Ok(url)
    }

    /// Calls the named API function and returns the decoded response body.
    pub async fn call_function(&self, name: &str, params: &Params) -> Result<Value> {
        let payload = params.encode(&self.payload)?;
        let url = self.url_for(&format!("api/{name}"))?;
        let body = self.send(Method::POST, &url, Some(&payload)).await?;
        parse_body(&body)
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        let url = self.url_for(path)?;
        self.get_url(&url).await
    }

    pub async fn get_url(&self, url: &Url) -> Result<Value> {
        let body = self.send(Method::GET, url, None).await?;
        parse_body(&body)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url_for(path)?;
        self.send(Method::DELETE, &url, None).await?;
        Ok(())
    }

    /// Capability manifest of the server. Only the first call hits the network.
    pub async fn capabilities(&self) -> Result<Capabilities> {
        let capabilities = self
            .capabilities
            .get_or_try_init(|| async {
                let url = self.url_for("api")?;
                let body = self.send(Method::OPTIONS, &url, None).await?;
                let capabilities = Capabilities::new(parse_body(&body)?);
                debug!("server capabilities: {capabilities:?}");
                Ok::<_, Error>(capabilities)
            })
            .await?;
        Ok(capabilities.clone())
    }

    async fn send(&self, method: Method, url: &Url, payload: Option<&Payload>) -> Result<Bytes> {
        let result = (|| self.attempt(&method, url, payload))
            .retry(self.retry.clone())
            .sleep(tokio::time::sleep)
            .when(Error::is_transient)
            .notify(|err, delay| {
                warn!("{method} {} failed: {err}; retrying in {delay:?}", mask_url(url));
            })
            .await;

        match result {
            Err(e) if e.is_transient() => Err(Error::RetriesExhausted {
                method: method.to_string(),
                url: mask_url(url).to_string(),
                last: e.to_string(),
            }),
            other => other,
        }
    }

    async fn attempt(&self, method: &Method, url: &Url, payload: Option<&Payload>) -> Result<Bytes> {
        let mut builder = Request::builder().method(method.clone()).uri(url.as_str());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers.clone());
        }
        let body = match payload {
            Some(payload) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                if payload.compressed {
                    builder = builder.header(CONTENT_ENCODING, "gzip");
                }
                Full::new(payload.body.clone())
            }
            None => Full::new(Bytes::new()),
        };
        let req = builder.body(body)?;

        debug!(
            "Requesting {method} {} headers={:?}",
            mask_url(url),
            mask_headers(req.headers())
        );

        let exchange = async {
            let res: hyper::Response<Incoming> = self
                .inner
                .request(req)
                .await
                .map_err(|e| Error::Connection(describe(&e)))?;
            let status = res.status();
            let body = res
                .into_body()
                .collect()
                .await
                .map_err(|e| Error::Connection(describe(&e)))?
                .to_bytes();
            Ok::<_, Error>((status, body))
        };
        let (status, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| Error::Timeout(self.timeout))??;

        debug!("{method} {} -> {status}", mask_url(url));

        if !status.is_success() {
            return Err(Error::Status {
                method: method.to_string(),
                url: mask_url(url).to_string(),
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(body)
    }
}

fn describe(err: &dyn std::error::Error) -> String {
    match err.source() {
        Some(source) => format!("{err}: {}", describe(source)),
        None => err.to_string(),
    }
}

fn parse_body(body: &[u8]) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(body)?)
}

/// Selects the payload of a response envelope.
///
/// `{"result": x}` yields `x`. Otherwise a top-level key whose value is an
/// object typed after the key itself (`{"session": {"type": "session", ..}}`)
/// yields that object. Anything else is returned unchanged.
pub fn unwrap_envelope(body: Value) -> Value {
    let Value::Object(mut map) = body else {
        return body;
    };
    if let Some(result) = map.remove("result") {
        return result;
    }

    let singular = map.iter().find_map(|(key, value)| {
        let tag = value.as_object()?.get("type")?.as_str()?;
        (tag == key).then(|| key.clone())
    });
    match singular.and_then(|key| map.remove(&key)) {
        Some(value) => value,
        None => Value::Object(map),
    }
}
