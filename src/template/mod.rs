//! Template engine.
//!
//! A small Django-flavoured engine: `{{ var|filter }}` expressions, `{% tag %}`
//! blocks and `{# comments #}`. Tags and filters come from [`Library`] values
//! registered with an [`Engine`]; templates pull extra libraries in with
//! `{% load id %}`.
//!
//! ```
//! use phased::template::{Context, Engine};
//!
//! let engine = Engine::new();
//! let template = engine.compile("Hello {{ name|upper }}!").unwrap();
//!
//! let mut ctx = Context::new();
//! ctx.set("name", "world");
//! assert_eq!(template.render(&mut ctx).unwrap(), "Hello WORLD!");
//! ```

pub mod builtins;
mod context;
mod error;
pub mod lexer;
mod library;
mod node;
mod parser;
mod value;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

pub use context::{Context, Layer};
pub use error::TemplateError;
pub use lexer::{Token, TokenKind, tokenize};
pub use library::{FilterFn, Library, TagCompiler};
pub use node::{Expr, Node, NodeList, TextNode, VariableNode};
pub use parser::Parser;
pub use value::{Lazy, Map, Opaque, Value};

/// Library registry plus the set of always-loaded libraries.
///
/// Cloning is cheap: libraries are shared behind [`Arc`].
#[derive(Debug, Clone)]
pub struct Engine {
    libraries: HashMap<String, Arc<Library>>,
    builtins: Vec<Arc<Library>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Creates an engine with only the `builtins` library.
    pub fn new() -> Self {
        let builtins = Arc::new(builtins::library());
        let mut libraries = HashMap::new();
        libraries.insert(builtins.id().to_owned(), Arc::clone(&builtins));
        Self {
            libraries,
            builtins: vec![builtins],
        }
    }

    /// Makes a library available to `{% load %}`, replacing one with the same id.
    pub fn register(&mut self, library: Library) -> &mut Self {
        self.libraries
            .insert(library.id().to_owned(), Arc::new(library));
        self
    }

    /// Registers a library and loads it into every template automatically.
    pub fn add_builtin(&mut self, library: Library) -> &mut Self {
        let library = Arc::new(library);
        self.libraries
            .insert(library.id().to_owned(), Arc::clone(&library));
        self.builtins.retain(|lib| lib.id() != library.id());
        self.builtins.push(library);
        self
    }

    pub fn library(&self, id: &str) -> Option<Arc<Library>> {
        self.libraries.get(id).cloned()
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.libraries.contains_key(id)
    }

    pub fn builtins(&self) -> impl Iterator<Item = &Library> {
        self.builtins.iter().map(|lib| lib.as_ref())
    }

    /// Identifiers of the always-loaded libraries.
    pub fn builtin_ids(&self) -> BTreeSet<String> {
        self.builtins.iter().map(|lib| lib.id().to_owned()).collect()
    }

    pub fn parser(&self, tokens: Vec<Token>) -> Parser<'_> {
        Parser::new(self, tokens)
    }

    /// Tokenizes and parses `source`.
    pub fn compile(&self, source: &str) -> Result<Template, TemplateError> {
        let nodes = self.parser(tokenize(source)).parse()?;
        Ok(Template { nodes })
    }
}

/// A compiled template.
#[derive(Debug)]
pub struct Template {
    nodes: NodeList,
}

impl Template {
    pub fn render(&self, context: &mut Context) -> Result<String, TemplateError> {
        self.nodes.render(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_brings_library_into_scope() {
        let mut engine = Engine::new();
        let mut extra = Library::new("shouting");
        extra.filter("shout", |v, _| Ok(Value::String(format!("{v}!"))));
        engine.register(extra);

        assert!(engine.compile("{{ x|shout }}").is_err());

        let template = engine.compile("{% load shouting %}{{ x|shout }}").unwrap();
        let mut ctx = Context::new();
        ctx.set("x", "hey");
        assert_eq!(template.render(&mut ctx).unwrap(), "hey!");
    }

    #[test]
    fn add_builtin_is_always_loaded() {
        let mut engine = Engine::new();
        let mut extra = Library::new("always");
        extra.filter("twice", |v, _| Ok(Value::String(format!("{v}{v}"))));
        engine.add_builtin(extra);

        assert_eq!(
            engine.builtin_ids().into_iter().collect::<Vec<_>>(),
            vec!["always".to_owned(), "builtins".to_owned()]
        );
        let mut ctx = Context::new();
        ctx.set("x", "ab");
        assert_eq!(
            engine.compile("{{ x|twice }}").unwrap().render(&mut ctx).unwrap(),
            "abab"
        );
    }

    #[test]
    fn missing_variable_renders_empty() {
        let engine = Engine::new();
        let out = engine
            .compile("[{{ nothing }}]")
            .unwrap()
            .render(&mut Context::new())
            .unwrap();
        assert_eq!(out, "[]");
    }
}
