//! The `phasedcache` fragment-cache tag.
//!
//! ```text
//! {% phasedcache <timeout> <fragment_name> [vary_on ...] %} ... {% endphasedcache %}
//! ```
//!
//! The body's first-pass output, deferred fragments included, is cached. Every
//! render then runs the second pass over that text against the current context,
//! so deferred fragments inside a cached block still see live values.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::config::Settings;
use super::render::SecondPass;
use crate::cache::CacheStore;
use crate::template::{Context, Expr, Node, NodeList, Parser, TemplateError, Token};

pub const TAG_NAME: &str = "phasedcache";
pub const END_TAG_NAME: &str = "endphasedcache";

#[derive(Debug)]
pub struct PhasedCacheNode {
    store: Arc<dyn CacheStore>,
    second_pass: SecondPass,
    key_prefix: String,
    timeout: Duration,
    fragment_name: String,
    vary_on: Vec<Expr>,
    body: NodeList,
}

impl PhasedCacheNode {
    fn cache_key(&self, context: &Context) -> Result<String, TemplateError> {
        let values = self
            .vary_on
            .iter()
            .map(|expr| expr.resolve(context).map(|value| value.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(fragment_cache_key(&self.key_prefix, &self.fragment_name, &values))
    }

    fn cached(&self, key: &str) -> Option<String> {
        let bytes = self.store.get(key)?;
        match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Some(text),
            Err(_) => {
                warn!(key, "cached fragment is not valid UTF-8");
                None
            }
        }
    }
}

impl Node for PhasedCacheNode {
    fn render(&self, context: &mut Context) -> Result<String, TemplateError> {
        let key = self.cache_key(context)?;
        let content = match self.cached(&key) {
            Some(content) => {
                debug!(key = %key, "fragment cache hit");
                content
            }
            None => {
                let content = self.body.render(context)?;
                self.store
                    .set(&key, Bytes::from(content.clone()), self.timeout);
                debug!(key = %key, "fragment cache miss, stored");
                content
            }
        };
        Ok(self.second_pass.render_with_context(&content, context)?)
    }
}

/// `<prefix>.<name>.<sha256 hex of the vary values joined by ':'>`.
pub fn fragment_cache_key(prefix: &str, name: &str, vary_on: &[String]) -> String {
    let digest = Sha256::digest(vary_on.join(":").as_bytes());
    format!("{prefix}.{name}.{}", hex::encode(digest))
}

pub fn compile(
    settings: &Arc<Settings>,
    store: &Arc<dyn CacheStore>,
    parser: &mut Parser<'_>,
    token: Token,
) -> Result<Box<dyn Node>, TemplateError> {
    let bits = token.split_contents();
    let [_, timeout, fragment_name, vary_on @ ..] = bits.as_slice() else {
        return Err(TemplateError::syntax(
            format!("'{TAG_NAME}' tag requires at least 2 arguments"),
            token.line,
        ));
    };
    let timeout = timeout.parse::<u64>().map_err(|_| {
        TemplateError::syntax(
            format!("'{TAG_NAME}' tag got a non-integer timeout value: '{timeout}'"),
            token.line,
        )
    })?;
    let vary_on = vary_on
        .iter()
        .map(|bit| parser.compile_expr(bit))
        .collect::<Result<Vec<_>, _>>()?;

    let body = parser.parse_until(&[END_TAG_NAME])?;
    parser.delete_first_token();

    Ok(Box::new(PhasedCacheNode {
        store: Arc::clone(store),
        second_pass: SecondPass::new(Arc::clone(settings), parser.engine().clone()),
        key_prefix: settings.cache().key_prefix.clone(),
        timeout: Duration::from_secs(timeout),
        fragment_name: fragment_name.clone(),
        vary_on,
        body,
    }))
}
