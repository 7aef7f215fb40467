//! Tag and filter libraries.
//!
//! A [`Library`] is a named bundle of tag compilers and filters. Templates
//! pull libraries in with `{% load name %}`; the identifier is what gets
//! recorded when a deferred fragment needs the same libraries on a later pass.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::error::TemplateError;
use super::lexer::Token;
use super::node::Node;
use super::parser::Parser;
use super::value::Value;

/// Compiles a block tag into a node. Receives the parser positioned just after the tag.
pub type TagCompiler =
    Arc<dyn Fn(&mut Parser<'_>, Token) -> Result<Box<dyn Node>, TemplateError> + Send + Sync>;

/// Transforms a value, with an optional `:argument`.
pub type FilterFn = Arc<dyn Fn(Value, Option<Value>) -> Result<Value, TemplateError> + Send + Sync>;

#[derive(Clone)]
pub struct Library {
    id: String,
    tags: BTreeMap<String, TagCompiler>,
    filters: BTreeMap<String, FilterFn>,
}

impl Library {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tags: BTreeMap::new(),
            filters: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Registers a block tag.
    pub fn tag<F>(&mut self, name: impl Into<String>, compile: F) -> &mut Self
    where
        F: Fn(&mut Parser<'_>, Token) -> Result<Box<dyn Node>, TemplateError>
            + Send
            + Sync
            + 'static,
    {
        self.tags.insert(name.into(), Arc::new(compile));
        self
    }

    /// Registers a filter.
    pub fn filter<F>(&mut self, name: impl Into<String>, apply: F) -> &mut Self
    where
        F: Fn(Value, Option<Value>) -> Result<Value, TemplateError> + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(apply));
        self
    }

    pub fn tags(&self) -> impl Iterator<Item = (&str, &TagCompiler)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn filters(&self) -> impl Iterator<Item = (&str, &FilterFn)> {
        self.filters.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("id", &self.id)
            .field("tags", &self.tags.keys().collect::<Vec<_>>())
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .finish()
    }
}
