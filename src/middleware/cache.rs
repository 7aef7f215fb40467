//! Whole-page caching that is blind to `Vary: Cookie`.
//!
//! Pages whose only per-user content sits in deferred fragments can be shared
//! between users. The response's `Vary: Cookie` is removed before the page is
//! stored, so the cache key does not include the cookie, and put back before
//! the response leaves this layer.

use std::{future::Future, pin::Pin, sync::Arc};

use tracing::{debug, warn};

use super::{Middleware, Next};
use crate::{
    Response, StatusCode,
    cache::{CacheStore, PageCache, vary::{drop_vary_headers, patch_vary_headers}},
    context::RequestContext,
    phased::Settings,
};

/// Serves and stores `GET`/`HEAD` responses through a [`PageCache`].
///
/// Only `200` responses are stored. A cache hit short-circuits the rest of
/// the chain.
#[derive(Debug, Clone)]
pub struct CacheMiddleware {
    cache: PageCache,
}

impl CacheMiddleware {
    pub fn new(cache: PageCache) -> Self {
        Self { cache }
    }

    /// Uses the page prefix and default timeout from `settings`.
    pub fn from_settings(store: Arc<dyn CacheStore>, settings: &Settings) -> Self {
        let config = settings.cache();
        Self::new(PageCache::new(
            store,
            config.page_prefix.clone(),
            config.default_timeout(),
        ))
    }
}

impl Middleware for CacheMiddleware {
    fn handle(
        &self,
        ctx: RequestContext,
        next: Next,
    ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let cache = self.cache.clone();

        Box::pin(async move {
            if !ctx.request().method().is_cacheable() {
                return next.run(ctx).await;
            }

            if let Some(mut hit) = cache.get(ctx.request()) {
                debug!(path = ctx.request().path(), "page cache hit");
                patch_vary_headers(&mut hit, &["Cookie"]);
                return hit;
            }
            debug!(path = ctx.request().path(), "page cache miss");

            let request = ctx.request().clone();
            let mut resp = next.run(ctx).await;
            if resp.status() != StatusCode::Ok {
                return resp;
            }

            drop_vary_headers(&mut resp, &["Cookie"]);
            if let Err(err) = cache.store(&request, &resp) {
                warn!(path = request.path(), error = %err, "failed to store page");
            }
            patch_vary_headers(&mut resp, &["Cookie"]);
            resp
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::Request;
    use crate::cache::MemoryCache;
    use crate::middleware::{MiddlewareHandler, PhasedRenderMiddleware, endpoint, from_middleware};
    use crate::phased::{PhasedConfig, PhasedTags, SecondPass};
    use crate::security::CsrfMiddleware;
    use crate::template::{Context, Engine};

    fn ctx(raw: &str) -> RequestContext {
        RequestContext::new(Request::parse(raw.as_bytes()).unwrap().0)
    }

    fn page_cache() -> PageCache {
        PageCache::new(Arc::new(MemoryCache::new()), "views.cache", Duration::from_secs(60))
    }

    fn counting_handler(calls: Arc<AtomicUsize>, vary: Option<&'static str>) -> MiddlewareHandler {
        endpoint(move |ctx: RequestContext| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let cookie = ctx.request().cookie("test").unwrap_or("none").to_owned();
            async move {
                let mut resp = Response::new(StatusCode::Ok)
                    .header("Content-Type", "text/html")
                    .body(format!("{cookie} #{n}"));
                if let Some(vary) = vary {
                    resp.add_header("Vary", vary);
                }
                resp
            }
        })
    }

    fn chain(cache: &CacheMiddleware, handler: MiddlewareHandler) -> Vec<MiddlewareHandler> {
        vec![from_middleware(Arc::new(cache.clone())), handler]
    }

    #[tokio::test]
    async fn cookie_does_not_partition_the_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CacheMiddleware::new(page_cache());
        let handler = counting_handler(Arc::clone(&calls), Some("Cookie"));

        let first = Next::new(chain(&cache, handler.clone()))
            .run(ctx("GET / HTTP/1.1\r\nCookie: test=foo\r\n\r\n"))
            .await;
        assert_eq!(first.body_bytes(), b"foo #1");
        assert_eq!(first.headers().get("vary"), Some("Cookie"));

        let second = Next::new(chain(&cache, handler))
            .run(ctx("GET / HTTP/1.1\r\nCookie: test=bar\r\n\r\n"))
            .await;
        assert_eq!(second.body_bytes(), b"foo #1");
        assert_eq!(second.headers().get("vary"), Some("Cookie"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn other_vary_headers_still_partition() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CacheMiddleware::new(page_cache());
        let handler = counting_handler(Arc::clone(&calls), Some("Accept-Language, Cookie"));

        for lang in ["en", "de", "en"] {
            let raw = format!("GET / HTTP/1.1\r\nAccept-Language: {lang}\r\n\r\n");
            let resp = Next::new(chain(&cache, handler.clone())).run(ctx(&raw)).await;
            assert_eq!(resp.status(), StatusCode::Ok);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    fn echo_query() -> MiddlewareHandler {
        endpoint(|ctx: RequestContext| {
            let is_head = matches!(ctx.request().method(), crate::Method::Head);
            let query = ctx.request().query_string().unwrap_or_default().to_owned();
            async move {
                let resp = Response::new(StatusCode::Ok).header("Content-Type", "text/html");
                if is_head { resp } else { resp.body(query) }
            }
        })
    }

    #[tokio::test]
    async fn query_strings_are_cached_separately() {
        let cache = CacheMiddleware::new(page_cache());

        for query in ["q=a", "q=b", "q=a"] {
            let raw = format!("GET /search?{query} HTTP/1.1\r\n\r\n");
            let resp = Next::new(chain(&cache, echo_query())).run(ctx(&raw)).await;
            assert_eq!(resp.body_bytes(), query.as_bytes());
        }
    }

    #[tokio::test]
    async fn head_response_is_not_served_to_get() {
        let cache = CacheMiddleware::new(page_cache());

        let head = Next::new(chain(&cache, echo_query()))
            .run(ctx("HEAD /page?q= HTTP/1.1\r\n\r\n"))
            .await;
        assert!(head.body_bytes().is_empty());

        let get = Next::new(chain(&cache, echo_query()))
            .run(ctx("GET /page?q= HTTP/1.1\r\n\r\n"))
            .await;
        assert_eq!(get.body_bytes(), b"q=");

        let head_after_get = Next::new(chain(&cache, echo_query()))
            .run(ctx("HEAD /page?q= HTTP/1.1\r\n\r\n"))
            .await;
        assert_eq!(head_after_get.body_bytes(), b"q=");
    }

    #[tokio::test]
    async fn unsafe_methods_and_errors_bypass_the_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CacheMiddleware::new(page_cache());
        let handler = counting_handler(Arc::clone(&calls), None);

        for _ in 0..2 {
            Next::new(chain(&cache, handler.clone()))
                .run(ctx("POST /form HTTP/1.1\r\nContent-Length: 0\r\n\r\n"))
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let missing = endpoint(|_ctx: RequestContext| async { Response::new(StatusCode::NotFound) });
        for _ in 0..2 {
            let resp = Next::new(chain(&cache, missing.clone()))
                .run(ctx("GET /missing HTTP/1.1\r\n\r\n"))
                .await;
            assert_eq!(resp.status(), StatusCode::NotFound);
        }
        assert!(cache.cache.store_backend().is_empty());
    }

    #[tokio::test]
    async fn cached_page_gets_live_csrf_token() {
        let settings = Settings::from_config(PhasedConfig::default());
        let mut engine = Engine::new();
        PhasedTags::new(Arc::clone(&settings)).install(&mut engine);
        let second_pass = SecondPass::new(Arc::clone(&settings), engine.clone());
        let template = Arc::new(
            engine
                .compile(
                    "{% load phased_tags %}<form>{% phased %}{% csrf_token %}{% endphased %}</form>{{ title }}",
                )
                .unwrap(),
        );

        let calls = Arc::new(AtomicUsize::new(0));
        let handler = {
            let calls = Arc::clone(&calls);
            let second_pass = second_pass.clone();
            endpoint(move |ctx: RequestContext| {
                calls.fetch_add(1, Ordering::SeqCst);
                let mut context = Context::from_map(second_pass.request_context(ctx.request()));
                context.set("title", "Home");
                let page = template.render(&mut context).unwrap();
                async move {
                    Response::new(StatusCode::Ok)
                        .header("Content-Type", "text/html; charset=utf-8")
                        .header("Content-Length", page.len().to_string())
                        .body(page)
                }
            })
        };

        let csrf = from_middleware(Arc::new(CsrfMiddleware::new()));
        let phased = from_middleware(Arc::new(PhasedRenderMiddleware::new(second_pass)));
        let cache = from_middleware(Arc::new(CacheMiddleware::from_settings(
            Arc::new(MemoryCache::new()),
            &settings,
        )));
        let stack = vec![csrf, phased, cache, handler];

        for token in ["aaa", "bbb"] {
            let raw = format!("GET /home HTTP/1.1\r\nCookie: csrftoken={token}\r\n\r\n");
            let resp = Next::new(stack.clone()).run(ctx(&raw)).await;
            let body = std::str::from_utf8(resp.body_bytes()).unwrap().to_owned();

            assert_eq!(
                body,
                format!(
                    "<form><input type=\"hidden\" name=\"csrfmiddlewaretoken\" value=\"{token}\"></form>Home"
                )
            );
            assert_eq!(resp.headers().get("content-length"), Some(body.len().to_string().as_str()));
            assert_eq!(resp.headers().get("vary"), Some("Cookie"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
