//! Second-pass rendering of HTML responses.

use std::{future::Future, pin::Pin, sync::Arc};

use tracing::{error, trace, warn};

use super::{Middleware, Next};
use crate::{Response, StatusCode, context::RequestContext, phased::SecondPass};

/// Resolves deferred fragments in every HTML response passing through.
///
/// Place it outside the page cache so cached first-pass output is completed
/// for each request. Responses that are not `text/html`, or whose body is not
/// UTF-8, pass through untouched. When rendering fails the response is
/// replaced with a plain `500`.
#[derive(Debug, Clone)]
pub struct PhasedRenderMiddleware {
    second_pass: Arc<SecondPass>,
}

impl PhasedRenderMiddleware {
    pub fn new(second_pass: SecondPass) -> Self {
        Self {
            second_pass: Arc::new(second_pass),
        }
    }
}

impl Middleware for PhasedRenderMiddleware {
    fn handle(
        &self,
        ctx: RequestContext,
        next: Next,
    ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let second_pass = Arc::clone(&self.second_pass);

        Box::pin(async move {
            let mut request = ctx.request().clone();
            let mut resp = next.run(ctx).await;

            if !resp.is_html() {
                trace!(path = request.path(), "skipping non-html response");
                return resp;
            }
            let body = match std::str::from_utf8(resp.body_bytes()) {
                Ok(body) => body.to_owned(),
                Err(_) => {
                    warn!(path = request.path(), "html response is not utf-8, skipping");
                    return resp;
                }
            };

            match second_pass.render(&mut request, &body) {
                Ok(rendered) => {
                    resp.set_body(rendered);
                    resp
                }
                Err(err) => {
                    error!(path = request.path(), error = %err, "second pass failed");
                    Response::new(StatusCode::InternalServerError)
                        .header("Content-Type", "text/plain; charset=utf-8")
                        .body("Internal Server Error")
                }
            }
        })
    }
}
