//! Whole-page response cache.
//!
//! Each full path (query string included) remembers which request headers
//! its response varied on; the page key is built from the method, the full
//! path and the request's values for those headers. A response stored with `Vary: Cookie` is therefore
//! partitioned per cookie value, which is why the cache middleware strips
//! `Cookie` from `Vary` before calling [`PageCache::store`].

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::CacheStore;
use super::vary::vary_headers;
use crate::http::{Headers, Method, Request, Response, StatusCode};

/// The stored form of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPage {
    pub status: u16,
    pub headers: Headers,
    /// Base64 of the body bytes.
    pub body: String,
}

impl CachedPage {
    /// Captures `response`, leaving out `Set-Cookie` headers.
    pub fn from_response(response: &Response) -> Self {
        let mut headers = response.headers().clone();
        headers.remove("set-cookie");
        Self {
            status: response.status().as_u16(),
            headers,
            body: STANDARD.encode(response.body_bytes()),
        }
    }

    /// Rebuilds the response. `None` if the entry is unreadable.
    pub fn into_response(self) -> Option<Response> {
        let status = StatusCode::from_u16(self.status)?;
        let body = STANDARD.decode(self.body).ok()?;
        Some(Response::from_parts(status, self.headers, body))
    }
}

#[derive(Debug, Clone)]
pub struct PageCache {
    store: Arc<dyn CacheStore>,
    prefix: String,
    timeout: Duration,
}

impl PageCache {
    pub fn new(store: Arc<dyn CacheStore>, prefix: impl Into<String>, timeout: Duration) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            timeout,
        }
    }

    pub fn store_backend(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Looks up a cached response for `request`.
    ///
    /// A `HEAD` request is answered from the `GET` entry when there is one.
    pub fn get(&self, request: &Request) -> Option<Response> {
        let vary = self.vary_list(&full_path(request))?;
        let (key, raw) = match request.method() {
            Method::Head => {
                let key = self.page_key(request, "GET", &vary);
                match self.store.get(&key) {
                    Some(raw) => (key, raw),
                    None => {
                        let key = self.page_key(request, "HEAD", &vary);
                        let raw = self.store.get(&key)?;
                        (key, raw)
                    }
                }
            }
            other => {
                let key = self.page_key(request, other.as_str(), &vary);
                let raw = self.store.get(&key)?;
                (key, raw)
            }
        };

        match serde_json::from_slice::<CachedPage>(&raw) {
            Ok(page) => {
                let response = page.into_response();
                if response.is_none() {
                    warn!(key = %key, "discarding unreadable cached page");
                }
                response
            }
            Err(err) => {
                warn!(key = %key, error = %err, "discarding unreadable cached page");
                None
            }
        }
    }

    /// Stores `response` for `request`, keyed on the request method and the
    /// response's current `Vary` header.
    pub fn store(&self, request: &Request, response: &Response) -> Result<(), serde_json::Error> {
        let vary = vary_headers(response.headers());
        let header_key = self.header_key(&full_path(request));
        self.store.set(
            &header_key,
            Bytes::from(serde_json::to_vec(&vary)?),
            self.timeout,
        );

        let key = self.page_key(request, request.method().as_str(), &vary);
        let page = CachedPage::from_response(response);
        self.store
            .set(&key, Bytes::from(serde_json::to_vec(&page)?), self.timeout);
        debug!(key = %key, vary = ?vary, "stored page");
        Ok(())
    }

    fn vary_list(&self, path: &str) -> Option<Vec<String>> {
        let raw = self.store.get(&self.header_key(path))?;
        serde_json::from_slice(&raw).ok()
    }

    fn header_key(&self, path: &str) -> String {
        format!("{}.headers.{}", self.prefix, digest(path.as_bytes()))
    }

    fn page_key(&self, request: &Request, method: &str, vary: &[String]) -> String {
        let mut hasher = Sha256::new();
        for name in vary {
            hasher.update(request.headers().get(name).unwrap_or_default().as_bytes());
            hasher.update(b"\0");
        }
        format!(
            "{}.page.{}.{}.{}",
            self.prefix,
            method,
            digest(full_path(request).as_bytes()),
            hex::encode(hasher.finalize())
        )
    }
}

fn full_path(request: &Request) -> String {
    match request.query_string() {
        Some(query) => format!("{}?{query}", request.path()),
        None => request.path().to_owned(),
    }
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
