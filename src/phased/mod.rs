//! Two-phase template rendering.
//!
//! A page is rendered once with most of its content resolved. Blocks marked
//! `{% phased %}` are not rendered on that first pass; their raw source is
//! written into the output between two copies of a secret [`Delimiter`],
//! together with a snapshot of the variables they need. The page can then be
//! cached as a whole. On every request the [`SecondPass`] finds the delimited
//! fragments, restores their snapshot, and renders just those against the live
//! request.
//!
//! ```
//! use phased::http::Request;
//! use phased::phased::{PhasedConfig, PhasedTags, SecondPass, Settings};
//! use phased::template::{Context, Engine};
//!
//! let settings = Settings::from_config(PhasedConfig::default());
//! let mut engine = Engine::new();
//! PhasedTags::new(settings.clone()).install(&mut engine);
//!
//! let template = engine
//!     .compile("{% load phased_tags %}{% phased %}{{ request.path }}{% endphased %} cached")
//!     .unwrap();
//! let page = template.render(&mut Context::new()).unwrap();
//!
//! let (mut request, _) = Request::parse(b"GET /live HTTP/1.1\r\n\r\n").unwrap();
//! let out = SecondPass::new(settings, engine).render(&mut request, &page).unwrap();
//! assert_eq!(out, "/live cached");
//! ```

mod cache_tag;
mod codec;
pub mod components;
mod config;
mod delimiter;
mod error;
mod render;
pub mod snapshot;
mod tag;

use std::sync::Arc;

use crate::cache::CacheStore;
use crate::template::{Engine, Library};

pub use cache_tag::{PhasedCacheNode, fragment_cache_key};
pub use codec::{SnapshotFormat, Trailer, decode_payload, encode_payload};
pub use config::{CacheConfig, PhasedConfig, Settings};
pub use delimiter::Delimiter;
pub use error::{RenderError, SerializationError};
pub use render::{ContextProcessor, RequestProcessor, SecondPass};
pub use tag::{PhasedNode, scan_raw_source};

/// Identifier of the phased tag library, as used in `{% load phased_tags %}`.
pub const LIBRARY_ID: &str = "phased_tags";

/// Builds the `phased_tags` library.
#[derive(Debug, Clone)]
pub struct PhasedTags {
    settings: Arc<Settings>,
    fragment_cache: Option<Arc<dyn CacheStore>>,
}

impl PhasedTags {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            settings,
            fragment_cache: None,
        }
    }

    /// Enables the `phasedcache` tag, storing fragments in `store`.
    #[must_use]
    pub fn fragment_cache(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.fragment_cache = Some(store);
        self
    }

    pub fn library(&self) -> Library {
        let mut library = Library::new(LIBRARY_ID);

        let settings = Arc::clone(&self.settings);
        library.tag(self.settings.tag_name(), move |parser, token| {
            tag::compile(&settings, parser, token)
        });

        if let Some(store) = &self.fragment_cache {
            let settings = Arc::clone(&self.settings);
            let store = Arc::clone(store);
            library.tag(cache_tag::TAG_NAME, move |parser, token| {
                cache_tag::compile(&settings, &store, parser, token)
            });
        }
        library
    }

    /// Registers the library with `engine`.
    pub fn install(&self, engine: &mut Engine) {
        engine.register(self.library());
    }
}
