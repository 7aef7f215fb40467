//! Per-request context passed through the middleware chain.
//!
//! Not to be confused with [`crate::template::Context`], the variable scope a
//! template renders against.

use crate::Request;

/// Owns the request while it travels through the middleware stack.
///
/// Middleware that needs to adjust the request for downstream layers (for
/// example to attach a freshly issued CSRF cookie) does so through
/// [`request_mut`](Self::request_mut) before calling the next layer.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request: Request,
}

impl RequestContext {
    /// Create a new context from a request
    pub fn new(request: Request) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn into_request(self) -> Request {
        self.request
    }
}

impl From<Request> for RequestContext {
    fn from(request: Request) -> Self {
        Self::new(request)
    }
}
