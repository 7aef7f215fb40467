//! Token-stream parser.
//!
//! The parser owns the remaining tokens and the set of tags and filters
//! currently in scope. Tag compilers receive `&mut Parser` so they can consume
//! their own body, either by parsing it into nodes or by pulling raw tokens.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use tracing::debug;

use super::Engine;
use super::error::TemplateError;
use super::lexer::{Token, TokenKind};
use super::library::{FilterFn, Library, TagCompiler};
use super::node::{Expr, NodeList, TextNode, VariableNode};

pub struct Parser<'e> {
    engine: &'e Engine,
    tokens: VecDeque<Token>,
    tags: HashMap<String, (String, TagCompiler)>,
    filters: HashMap<String, (String, FilterFn)>,
    line: usize,
}

impl<'e> Parser<'e> {
    /// Creates a parser over `tokens` with the engine's builtin libraries in scope.
    pub fn new(engine: &'e Engine, tokens: Vec<Token>) -> Self {
        let mut parser = Self {
            engine,
            tokens: tokens.into(),
            tags: HashMap::new(),
            filters: HashMap::new(),
            line: 1,
        };
        for library in engine.builtins() {
            parser.add_library(library);
        }
        parser
    }

    pub fn engine(&self) -> &'e Engine {
        self.engine
    }

    /// Brings every tag and filter of `library` into scope.
    pub fn add_library(&mut self, library: &Library) {
        for (name, compile) in library.tags() {
            self.tags
                .insert(name.to_owned(), (library.id().to_owned(), Arc::clone(compile)));
        }
        for (name, apply) in library.filters() {
            self.filters
                .insert(name.to_owned(), (library.id().to_owned(), Arc::clone(apply)));
        }
    }

    /// Loads a library registered with the engine by identifier.
    pub fn load(&mut self, id: &str) -> Result<(), TemplateError> {
        let library = self
            .engine
            .library(id)
            .ok_or_else(|| TemplateError::UnknownLibrary(id.to_owned()))?;
        debug!(library = id, "loading tag library");
        self.add_library(library.as_ref());
        Ok(())
    }

    /// Identifiers of every library that contributed a tag or filter now in scope.
    pub fn active_libraries(&self) -> BTreeSet<String> {
        self.tags
            .values()
            .map(|(id, _)| id)
            .chain(self.filters.values().map(|(id, _)| id))
            .cloned()
            .collect()
    }

    /// Parses the whole token stream.
    pub fn parse(&mut self) -> Result<NodeList, TemplateError> {
        self.parse_until(&[])
    }

    /// Parses until a block tag named in `until`, which is left unconsumed.
    ///
    /// With a non-empty `until`, running out of tokens is an unclosed-block error.
    pub fn parse_until(&mut self, until: &[&str]) -> Result<NodeList, TemplateError> {
        let mut nodes = NodeList::new();

        while let Some(token) = self.next_token() {
            match token.kind {
                TokenKind::Text => nodes.push(Box::new(TextNode(token.contents))),
                TokenKind::Comment => {}
                TokenKind::Variable => {
                    if token.contents.is_empty() {
                        return Err(TemplateError::syntax("empty variable tag", token.line));
                    }
                    let expr = self.compile_expr(&token.contents)?;
                    nodes.push(Box::new(VariableNode(expr)));
                }
                TokenKind::Block => {
                    let name = token.name().to_owned();
                    if name.is_empty() {
                        return Err(TemplateError::syntax("empty block tag", token.line));
                    }
                    if until.contains(&name.as_str()) {
                        self.prepend_token(token);
                        return Ok(nodes);
                    }
                    let compile = match self.tags.get(&name) {
                        Some((_, compile)) => Arc::clone(compile),
                        None => {
                            return Err(TemplateError::UnknownTag {
                                name,
                                line: token.line,
                            });
                        }
                    };
                    nodes.push(compile(self, token)?);
                }
            }
        }

        if until.is_empty() {
            Ok(nodes)
        } else {
            Err(self.unclosed_block(until))
        }
    }

    /// Skips tokens up to and including the block tag `end`.
    pub fn skip_past(&mut self, end: &str) -> Result<(), TemplateError> {
        while let Some(token) = self.next_token() {
            if token.kind == TokenKind::Block && token.contents == end {
                return Ok(());
            }
        }
        Err(self.unclosed_block(&[end]))
    }

    pub fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.pop_front()?;
        self.line = token.line;
        Some(token)
    }

    pub fn prepend_token(&mut self, token: Token) {
        self.tokens.push_front(token);
    }

    pub fn delete_first_token(&mut self) {
        self.tokens.pop_front();
    }

    pub fn has_tokens(&self) -> bool {
        !self.tokens.is_empty()
    }

    /// Line of the most recently consumed token.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn unclosed_block(&self, expected: &[&str]) -> TemplateError {
        TemplateError::UnclosedBlock {
            expected: expected.join(", "),
            line: self.line,
        }
    }

    /// Compiles a variable expression against the filters in scope.
    pub fn compile_expr(&self, source: &str) -> Result<Expr, TemplateError> {
        Expr::compile(source, self.line, |name| {
            self.filters.get(name).map(|(_, apply)| Arc::clone(apply))
        })
    }
}
