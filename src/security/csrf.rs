//! CSRF token cookie.
//!
//! The token is the per-request fact that most often forces a page out of a
//! shared cache. [`CsrfMiddleware`] makes sure every request carries one, so
//! the second rendering pass can render `{% csrf_token %}` from the live
//! request while the rest of the page is served from cache.

use std::pin::Pin;

use tracing::debug;
use uuid::Uuid;

use crate::{
    Response,
    cache::vary::patch_vary_headers,
    context::RequestContext,
    middleware::{Middleware, Next},
};

/// Name of the cookie holding the CSRF token.
pub const CSRF_COOKIE_NAME: &str = "csrftoken";

/// Generates a fresh token: 32 lowercase hex characters.
pub fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Issues a CSRF cookie to requests that lack one.
///
/// # Behavior
///
/// - A request without a `csrftoken` cookie gets a new token set on its cookie
///   jar before the downstream handler runs, and the response carries a
///   matching `Set-Cookie` header.
/// - A request that already has the cookie passes through unchanged.
/// - Every response gets `Cookie` added to its `Vary` header.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use phased::middleware::from_middleware;
/// use phased::security::CsrfMiddleware;
///
/// let handler = from_middleware(Arc::new(CsrfMiddleware::new()));
/// ```
#[derive(Debug, Clone)]
pub struct CsrfMiddleware {
    cookie_path: String,
}

impl Default for CsrfMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl CsrfMiddleware {
    pub fn new() -> Self {
        Self {
            cookie_path: "/".to_owned(),
        }
    }

    /// Sets the `Path` attribute of the issued cookie.
    #[must_use]
    pub fn cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = path.into();
        self
    }
}

impl Middleware for CsrfMiddleware {
    fn handle(
        &self,
        mut ctx: RequestContext,
        next: Next,
    ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let cookie_path = self.cookie_path.clone();

        Box::pin(async move {
            let issued = match ctx.request().cookie(CSRF_COOKIE_NAME) {
                Some(_) => None,
                None => {
                    let token = new_token();
                    ctx.request_mut().set_cookie(CSRF_COOKIE_NAME, token.clone());
                    debug!("issued csrf token");
                    Some(token)
                }
            };

            let mut resp = next.run(ctx).await;
            if let Some(token) = issued {
                resp.add_header(
                    "Set-Cookie",
                    format!("{CSRF_COOKIE_NAME}={token}; Path={cookie_path}; SameSite=Lax"),
                );
            }
            patch_vary_headers(&mut resp, &["Cookie"]);
            resp
        })
    }
}
