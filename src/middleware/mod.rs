//! Middleware pipeline: composable before/after request handler logic.
//!
//! This module defines the core types for building an ordered middleware stack.
//! Each middleware wraps the next layer, enabling request inspection, short-circuit
//! responses, and response decoration without coupling handlers to infrastructure
//! concerns.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining middleware chain; call [`Next::run`] to
//!   advance to the next layer.
//! - [`MiddlewareHandler`]: type-erased, cheaply-cloneable middleware function.
//! - [`from_middleware`]: converts a [`Middleware`] into a [`MiddlewareHandler`].
//! - [`endpoint`]: wraps an async handler as the terminal layer.
//!
//! ## Provided middleware
//!
//! - [`LoggerMiddleware`]: request/response logger.
//! - [`PhasedRenderMiddleware`]: second rendering pass over HTML responses.
//! - [`CacheMiddleware`]: whole-page cache that ignores `Vary: Cookie`.
//! - [`CsrfMiddleware`](crate::security::CsrfMiddleware): CSRF cookie issuing.
//!
//! A typical stack, outermost first, is CSRF, phased render, cache, handler:
//! the cache stores first-pass output and every response, cached or not, gets
//! its deferred fragments rendered for the current request.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Response, context::RequestContext};

pub mod cache;
pub mod phased;

pub use cache::CacheMiddleware;
pub use phased::PhasedRenderMiddleware;

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is passed to each middleware's [`Middleware::handle`] implementation.
/// Calling [`Next::run`] advances the cursor by one position and invokes the next
/// middleware (or returns a fallback `500` response when the chain is exhausted
/// without any middleware generating a response).
///
/// `Next` is consumed on each call to [`run`](Self::run), so it cannot be called
/// more than once per middleware invocation.
///
/// # Examples
///
/// ```rust,no_run
/// use std::pin::Pin;
/// use phased::{Response, context::RequestContext, middleware::{Middleware, Next}};
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(
///         &self,
///         ctx: RequestContext,
///         next: Next,
///     ) -> Pin<Box<dyn std::future::Future<Output = Response> + Send>> {
///         Box::pin(async move { next.run(ctx).await })
///     }
/// }
/// ```
pub struct Next {
    middlewares: Vec<MiddlewareHandler>,
    // Tracks which middleware to invoke on the next `run` call.
    index: usize,
}

/// A type-erased, reference-counted middleware function.
///
/// Every entry in the middleware stack is stored as a `MiddlewareHandler`.
/// The [`Arc`] wrapper makes handlers cheap to clone so that [`Next`] can
/// advance through the chain without copying closures.
///
/// Construct one with [`from_middleware`] or [`endpoint`].
pub type MiddlewareHandler = Arc<
    dyn Fn(RequestContext, Next) -> Pin<Box<dyn Future<Output = Response> + Send>>
        + Send
        + Sync
        + 'static,
>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use phased::middleware::{LoggerMiddleware, from_middleware};
///
/// let handler = from_middleware(Arc::new(LoggerMiddleware));
/// ```
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: RequestContext, next: Next| middleware.handle(ctx, next))
}

/// Wraps an async request handler as the last layer of a chain.
///
/// The handler never sees [`Next`]; whatever it returns is the response.
///
/// # Examples
///
/// ```rust,no_run
/// use phased::{Response, StatusCode, context::RequestContext, middleware::endpoint};
///
/// let handler = endpoint(|_ctx: RequestContext| async {
///     Response::new(StatusCode::Ok).body("hello")
/// });
/// ```
pub fn endpoint<F, Fut>(handler: F) -> MiddlewareHandler
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(
        move |ctx: RequestContext, _next: Next| -> Pin<Box<dyn Future<Output = Response> + Send>> {
            Box::pin(handler(ctx))
        },
    )
}

impl Next {
    /// Creates a new `Next` positioned at the start of the given middleware stack.
    ///
    /// # Arguments
    ///
    /// - `middlewares`: the ordered list of handlers that make up the pipeline.
    pub fn new(middlewares: Vec<MiddlewareHandler>) -> Self {
        Self {
            middlewares,
            index: 0,
        }
    }

    /// Invokes the next middleware in the chain and returns its response.
    ///
    /// Advances the internal cursor by one, clones the handler at the current
    /// position, and awaits it. If no handler remains (i.e. the chain is
    /// exhausted without producing a response), a `500 Internal Server Error`
    /// response is returned as a safe fallback.
    pub async fn run(mut self, ctx: RequestContext) -> Response {
        if self.index < self.middlewares.len() {
            let handler = self.middlewares[self.index].clone();
            self.index += 1;
            handler(ctx, self).await
        } else {
            Response::new(crate::StatusCode::InternalServerError)
                .body("No response generated by middleware pipeline")
        }
    }
}

/// The core trait for all middleware.
///
/// Implementors receive a [`RequestContext`] and a [`Next`] cursor. They may:
///
/// - **Pass through**: call `next.run(ctx).await` without modification.
/// - **Short-circuit**: return a [`Response`] directly without calling `next`.
/// - **Decorate**: call `next.run(ctx).await`, inspect the response, and return
///   a modified copy.
///
/// # Contract
///
/// - Implementations **must** be `Send + Sync` because middleware is shared across
///   Tokio tasks.
/// - `handle` **must** return a pinned, `Send` future so it can be awaited across
///   `.await` points in multi-threaded runtimes.
/// - Implementations **should not** hold `&mut` references to shared state across
///   an `.await` point.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next middleware.
    fn handle(
        &self,
        ctx: RequestContext,
        next: Next,
    ) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// Logs each request's method, path, status, and duration.
///
/// Emits a single `tracing::info!` line after the downstream handler completes.
/// `LoggerMiddleware` does not short-circuit.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(
        &self,
        ctx: RequestContext,
        next: Next,
    ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().as_str().to_string();
            let path = ctx.request().path().to_string();

            let response = next.run(ctx).await;

            let duration = start.elapsed();
            let status = response.status().as_u16();

            tracing::info!(%method, %path, status, ?duration, "request handled");

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Request, StatusCode};

    fn ctx(path: &str) -> RequestContext {
        let raw = format!("GET {path} HTTP/1.1\r\n\r\n");
        RequestContext::new(Request::parse(raw.as_bytes()).unwrap().0)
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[tokio::test]
    async fn exhausted_chain_falls_back_to_500() {
        let resp = Next::new(Vec::new()).run(ctx("/")).await;
        assert_eq!(resp.status(), StatusCode::InternalServerError);
    }

    #[tokio::test]
    async fn endpoint_ends_the_chain() {
        init_tracing();
        let chain = vec![
            from_middleware(Arc::new(LoggerMiddleware)),
            endpoint(|ctx: RequestContext| async move {
                Response::new(StatusCode::Ok).body(ctx.request().path().to_owned())
            }),
            endpoint(|_ctx: RequestContext| async { Response::new(StatusCode::NotFound) }),
        ];
        let resp = Next::new(chain).run(ctx("/first")).await;
        assert_eq!(resp.status(), StatusCode::Ok);
        assert_eq!(resp.body_bytes(), b"/first");
    }

    #[tokio::test]
    async fn middleware_can_short_circuit() {
        let deny: MiddlewareHandler = Arc::new(|_ctx: RequestContext, _next: Next| {
            Box::pin(async { Response::new(StatusCode::Forbidden) })
                as Pin<Box<dyn Future<Output = Response> + Send>>
        });
        let chain = vec![
            deny,
            endpoint(|_ctx: RequestContext| async { Response::new(StatusCode::Ok) }),
        ];
        let resp = Next::new(chain).run(ctx("/")).await;
        assert_eq!(resp.status(), StatusCode::Forbidden);
    }
}
