//! The second rendering pass.
//!
//! Only the text between delimiters is ever tokenized; everything outside is
//! copied through untouched, so literal page content can never be executed
//! as template markup.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::codec::Trailer;
use super::config::Settings;
use super::error::RenderError;
use super::{LIBRARY_ID, components, snapshot};
use crate::http::Request;
use crate::security::CSRF_COOKIE_NAME;
use crate::template::{Context, Engine, Lazy, Map, Opaque, Value, tokenize};

/// Contributes per-request variables to the second-pass context.
pub trait ContextProcessor: Send + Sync {
    fn process(&self, request: &Request) -> Map;
}

/// Exposes `request` (path, method, query string, cookies) and a lazily
/// resolved `csrf_token`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestProcessor;

impl ContextProcessor for RequestProcessor {
    fn process(&self, request: &Request) -> Map {
        let cookies: Map = request
            .cookies()
            .map(|(name, value)| (name.to_owned(), Value::from(value)))
            .collect();
        let request_value = Opaque::new("request")
            .attr("path", request.path())
            .attr("method", request.method().as_str())
            .attr("query_string", request.query_string().unwrap_or_default())
            .attr("COOKIES", cookies);

        let token = request.cookie(CSRF_COOKIE_NAME).map(str::to_owned);
        let csrf_token = Lazy::new(move || match &token {
            Some(token) => Value::from(token.as_str()),
            None => Value::from(snapshot::NOT_PROVIDED),
        });

        let mut map = Map::new();
        map.insert("request".to_owned(), request_value.into());
        map.insert(snapshot::CSRF_KEY.to_owned(), Value::Lazy(csrf_token));
        map
    }
}

/// Where live, per-request values come from.
enum Live<'a> {
    /// Request-derived values override the snapshot.
    Request(&'a mut Request),
    /// An enclosing render context; the snapshot overrides it.
    Context(&'a Context),
}

/// Renders the deferred fragments of a first-pass page.
#[derive(Clone)]
pub struct SecondPass {
    settings: Arc<Settings>,
    engine: Engine,
    processors: Vec<Arc<dyn ContextProcessor>>,
}

impl SecondPass {
    /// Creates a renderer with the [`RequestProcessor`] installed.
    pub fn new(settings: Arc<Settings>, engine: Engine) -> Self {
        Self {
            settings,
            engine,
            processors: vec![Arc::new(RequestProcessor)],
        }
    }

    #[must_use]
    pub fn processor(mut self, processor: impl ContextProcessor + 'static) -> Self {
        self.processors.push(Arc::new(processor));
        self
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Variables every processor contributes for `request`, later processors winning.
    pub fn request_context(&self, request: &Request) -> Map {
        let mut map = Map::new();
        for processor in &self.processors {
            map.extend(processor.process(request));
        }
        map
    }

    /// Resolves every deferred fragment in `content` against `request`.
    ///
    /// A captured CSRF token is restored into the request's cookies when it
    /// carries none.
    pub fn render(&self, request: &mut Request, content: &str) -> Result<String, RenderError> {
        self.resolve(&mut Live::Request(request), content, 0)
    }

    /// Resolves every deferred fragment in `content` on top of `base`.
    pub fn render_with_context(&self, content: &str, base: &Context) -> Result<String, RenderError> {
        self.resolve(&mut Live::Context(base), content, 0)
    }

    fn resolve(&self, live: &mut Live<'_>, content: &str, depth: usize) -> Result<String, RenderError> {
        let max = self.settings.max_depth();
        if depth > max {
            return Err(RenderError::DepthExceeded { max });
        }

        let mut out = String::with_capacity(content.len());
        for (index, segment) in self.settings.delimiter().split(content).into_iter().enumerate() {
            if index % 2 == 0 {
                out.push_str(segment);
            } else {
                out.push_str(&self.fragment(live, segment, depth)?);
            }
        }
        Ok(out)
    }

    fn fragment(&self, live: &mut Live<'_>, segment: &str, depth: usize) -> Result<String, RenderError> {
        let trailer = Trailer::split(segment);

        let mut stash = match trailer.context.map(snapshot::decode_map) {
            Some(Ok(map)) => map,
            Some(Err(err)) => {
                warn!(error = %err, "ignoring unreadable context snapshot");
                Map::new()
            }
            None => Map::new(),
        };
        let libraries = match trailer.components.map(components::decode_set) {
            Some(Ok(set)) => set,
            Some(Err(err)) => {
                warn!(error = %err, "ignoring unreadable component set");
                Default::default()
            }
            None => Default::default(),
        };
        let csrf_token = stash.remove(snapshot::CSRF_KEY);

        let mut context = match live {
            Live::Request(request) => {
                restore_csrf_token(&mut **request, csrf_token);
                let mut context = Context::from_map(stash);
                context.update(self.request_context(&**request));
                context
            }
            Live::Context(base) => {
                let mut context = Context::from_map(base.flatten(false));
                context.update(stash);
                context
            }
        };

        let mut parser = self.engine.parser(tokenize(trailer.source));
        if self.engine.is_registered(LIBRARY_ID) {
            parser.load(LIBRARY_ID)?;
        }
        for id in &libraries {
            parser.load(id)?;
        }
        let nodes = parser.parse()?;
        let rendered = nodes.render(&mut context)?;
        debug!(depth, components = libraries.len(), "resolved deferred fragment");

        if self.settings.delimiter().occurs_in(&rendered) {
            self.resolve(live, &rendered, depth + 1)
        } else {
            Ok(rendered)
        }
    }
}

impl fmt::Debug for SecondPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecondPass")
            .field("engine", &self.engine)
            .field("processors", &self.processors.len())
            .finish_non_exhaustive()
    }
}

fn restore_csrf_token(request: &mut Request, captured: Option<Value>) {
    if request.cookie(CSRF_COOKIE_NAME).is_some() {
        return;
    }
    if let Some(Value::String(token)) = captured {
        if token != snapshot::NOT_PROVIDED {
            debug!("restoring captured csrf token");
            request.set_cookie(CSRF_COOKIE_NAME, token);
        }
    }
}
