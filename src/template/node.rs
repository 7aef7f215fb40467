//! Render tree nodes and variable expressions.

use std::fmt;

use super::builtins::escape_html;
use super::context::Context;
use super::error::TemplateError;
use super::lexer::split_respecting_quotes;
use super::library::FilterFn;
use super::value::Value;

/// A compiled piece of a template.
pub trait Node: fmt::Debug + Send + Sync {
    fn render(&self, context: &mut Context) -> Result<String, TemplateError>;
}

#[derive(Debug, Default)]
pub struct NodeList(Vec<Box<dyn Node>>);

impl NodeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: Box<dyn Node>) {
        self.0.push(node);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn render(&self, context: &mut Context) -> Result<String, TemplateError> {
        let mut out = String::new();
        for node in &self.0 {
            out.push_str(&node.render(context)?);
        }
        Ok(out)
    }
}

#[derive(Debug)]
pub struct TextNode(pub String);

impl Node for TextNode {
    fn render(&self, _context: &mut Context) -> Result<String, TemplateError> {
        Ok(self.0.clone())
    }
}

/// `{{ expr }}`. Output is HTML-escaped unless the last filter is `escape`
/// or `safe`.
#[derive(Debug)]
pub struct VariableNode(pub Expr);

impl Node for VariableNode {
    fn render(&self, context: &mut Context) -> Result<String, TemplateError> {
        let value = self.0.resolve(context)?.to_string();
        Ok(if self.0.is_marked_safe() {
            value
        } else {
            escape_html(&value)
        })
    }
}

#[derive(Debug, Clone)]
enum Operand {
    Literal(Value),
    Variable(String),
}

impl Operand {
    fn parse(bit: &str, line: usize) -> Result<Self, TemplateError> {
        let bit = bit.trim();
        if bit.is_empty() {
            return Err(TemplateError::syntax("empty variable expression", line));
        }
        if let Some(s) = unquote(bit) {
            return Ok(Operand::Literal(Value::String(s.to_owned())));
        }
        if let Ok(i) = bit.parse::<i64>() {
            return Ok(Operand::Literal(Value::Int(i)));
        }
        if bit.contains('.') {
            if let Ok(f) = bit.parse::<f64>() {
                return Ok(Operand::Literal(Value::Float(f)));
            }
        }
        Ok(match bit {
            "True" | "true" => Operand::Literal(Value::Bool(true)),
            "False" | "false" => Operand::Literal(Value::Bool(false)),
            "None" => Operand::Literal(Value::Null),
            path => Operand::Variable(path.to_owned()),
        })
    }

    fn resolve(&self, context: &Context) -> Value {
        match self {
            Operand::Literal(value) => value.clone(),
            Operand::Variable(path) => context.resolve_path(path).unwrap_or(Value::Null),
        }
    }
}

/// Strips matching surrounding quotes.
pub(crate) fn unquote(bit: &str) -> Option<&str> {
    let first = bit.chars().next()?;
    if bit.len() >= 2 && (first == '"' || first == '\'') && bit.ends_with(first) {
        Some(&bit[1..bit.len() - 1])
    } else {
        None
    }
}

#[derive(Clone)]
struct FilterCall {
    name: String,
    apply: FilterFn,
    arg: Option<Operand>,
}

/// A variable or literal followed by zero or more filters: `user.name|default:"anon"|upper`.
#[derive(Clone)]
pub struct Expr {
    source: String,
    base: Operand,
    filters: Vec<FilterCall>,
}

impl Expr {
    pub(crate) fn compile(
        source: &str,
        line: usize,
        lookup: impl Fn(&str) -> Option<FilterFn>,
    ) -> Result<Self, TemplateError> {
        let mut parts = split_respecting_quotes(source, |c| c == '|').into_iter();
        let base = Operand::parse(&parts.next().unwrap_or_default(), line)?;

        let mut filters = Vec::new();
        for part in parts {
            let (name, arg) = match split_respecting_quotes(&part, |c| c == ':').as_slice() {
                [name] => (name.trim().to_owned(), None),
                [name, arg] => (name.trim().to_owned(), Some(Operand::parse(arg, line)?)),
                _ => {
                    return Err(TemplateError::syntax(
                        format!("could not parse filter '{part}'"),
                        line,
                    ));
                }
            };
            let apply = lookup(&name).ok_or_else(|| TemplateError::UnknownFilter(name.clone()))?;
            filters.push(FilterCall { name, apply, arg });
        }

        Ok(Self {
            source: source.to_owned(),
            base,
            filters,
        })
    }

    pub fn resolve(&self, context: &Context) -> Result<Value, TemplateError> {
        let mut value = self.base.resolve(context);
        for filter in &self.filters {
            let arg = filter.arg.as_ref().map(|a| a.resolve(context));
            value = (filter.apply)(value, arg)?;
        }
        Ok(value)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// `true` when the last filter already produced markup-safe output.
    pub fn is_marked_safe(&self) -> bool {
        self.filters
            .last()
            .is_some_and(|filter| filter.name == "escape" || filter.name == "safe")
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.filters.iter().map(|filter| filter.name.as_str()).collect();
        f.debug_struct("Expr")
            .field("source", &self.source)
            .field("filters", &names)
            .finish()
    }
}
