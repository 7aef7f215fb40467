//! # phased
//!
//! Two-phase template rendering: cache whole pages while deferring
//! per-request fragments.
//!
//! A page is rendered once by the [`template`] engine. Blocks wrapped in
//! `{% phased %}` are left unrendered and marked with a secret delimiter,
//! together with a snapshot of the variables they need. The result can be
//! stored in a shared page cache. On every request the
//! [`PhasedRenderMiddleware`](middleware::PhasedRenderMiddleware) renders only
//! the marked fragments against the live request.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use phased::cache::MemoryCache;
//! use phased::context::RequestContext;
//! use phased::middleware::{
//!     CacheMiddleware, Next, PhasedRenderMiddleware, endpoint, from_middleware,
//! };
//! use phased::phased::{PhasedConfig, PhasedTags, SecondPass, Settings};
//! use phased::security::CsrfMiddleware;
//! use phased::template::{Context, Engine};
//! use phased::{Request, Response, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::from_config(PhasedConfig::default());
//!     let mut engine = Engine::new();
//!     PhasedTags::new(settings.clone()).install(&mut engine);
//!
//!     let template = Arc::new(engine.compile(
//!         "{% load phased_tags %}{% phased %}{% csrf_token %}{% endphased %}",
//!     )?);
//!     let second_pass = SecondPass::new(settings.clone(), engine);
//!
//!     let handler = {
//!         let second_pass = second_pass.clone();
//!         endpoint(move |ctx: RequestContext| {
//!             let mut context = Context::from_map(second_pass.request_context(ctx.request()));
//!             let page = template.render(&mut context).unwrap_or_default();
//!             async move {
//!                 Response::new(StatusCode::Ok)
//!                     .header("Content-Type", "text/html")
//!                     .body(page)
//!             }
//!         })
//!     };
//!
//!     let stack = vec![
//!         from_middleware(Arc::new(CsrfMiddleware::new())),
//!         from_middleware(Arc::new(PhasedRenderMiddleware::new(second_pass))),
//!         from_middleware(Arc::new(CacheMiddleware::from_settings(
//!             Arc::new(MemoryCache::new()),
//!             &settings,
//!         ))),
//!         handler,
//!     ];
//!
//!     let (request, _) = Request::parse(b"GET / HTTP/1.1\r\n\r\n")?;
//!     let response = Next::new(stack).run(RequestContext::new(request)).await;
//!     println!("{}", String::from_utf8_lossy(response.body_bytes()));
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod context;
pub mod http;
pub mod middleware;
pub mod phased;
pub mod security;
pub mod template;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
