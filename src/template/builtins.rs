//! The always-available `builtins` library.

use super::context::Context;
use super::error::TemplateError;
use super::lexer::Token;
use super::library::Library;
use super::node::{Expr, Node, NodeList};
use super::parser::Parser;
use super::value::{Map, Value};

pub const LIBRARY_ID: &str = "builtins";

/// Value the CSRF token renders as when no token was available.
pub const CSRF_NOT_PROVIDED: &str = "NOTPROVIDED";

pub fn library() -> Library {
    let mut lib = Library::new(LIBRARY_ID);
    lib.tag("if", do_if)
        .tag("for", do_for)
        .tag("comment", do_comment)
        .tag("load", do_load)
        .tag("csrf_token", do_csrf_token)
        .filter("upper", |v, _| Ok(Value::String(v.to_string().to_uppercase())))
        .filter("lower", |v, _| Ok(Value::String(v.to_string().to_lowercase())))
        .filter("default", |v, arg| {
            Ok(if v.is_truthy() {
                v
            } else {
                arg.unwrap_or(Value::Null)
            })
        })
        .filter("length", |v, _| {
            let len = match &v {
                Value::String(s) => s.chars().count(),
                other => other.iter_items().len(),
            };
            Ok(Value::Int(len as i64))
        })
        .filter("escape", |v, _| Ok(Value::String(escape_html(&v.to_string()))))
        .filter("safe", |v, _| Ok(v));
    lib
}

/// HTML-escapes `"`, `'`, `&`, `<` and `>`.
pub fn escape_html(val: &str) -> String {
    let mut out = String::with_capacity(val.len());
    let mut rem = val;
    while let Some(idx) = rem.find(['"', '\'', '&', '<', '>']) {
        out.push_str(&rem[..idx]);
        out.push_str(match rem.as_bytes()[idx] {
            b'"' => "&quot;",
            b'\'' => "&#x27;",
            b'&' => "&amp;",
            b'<' => "&lt;",
            _ => "&gt;",
        });
        rem = &rem[idx + 1..];
    }
    out.push_str(rem);
    out
}

#[derive(Debug)]
struct IfNode {
    negate: bool,
    condition: Expr,
    then_branch: NodeList,
    else_branch: NodeList,
}

impl Node for IfNode {
    fn render(&self, context: &mut Context) -> Result<String, TemplateError> {
        let truthy = self.condition.resolve(context)?.is_truthy();
        if truthy != self.negate {
            self.then_branch.render(context)
        } else {
            self.else_branch.render(context)
        }
    }
}

fn do_if(parser: &mut Parser<'_>, token: Token) -> Result<Box<dyn Node>, TemplateError> {
    let bits = token.split_contents();
    let (negate, expr) = match bits.as_slice() {
        [_, expr] => (false, expr),
        [_, not, expr] if not == "not" => (true, expr),
        _ => {
            return Err(TemplateError::syntax(
                "'if' takes a single condition, optionally preceded by 'not'",
                token.line,
            ));
        }
    };
    let condition = parser.compile_expr(expr)?;

    let then_branch = parser.parse_until(&["else", "endif"])?;
    let else_branch = match parser.next_token() {
        Some(end) if end.contents == "else" => {
            let nodes = parser.parse_until(&["endif"])?;
            parser.delete_first_token();
            nodes
        }
        _ => NodeList::new(),
    };

    Ok(Box::new(IfNode {
        negate,
        condition,
        then_branch,
        else_branch,
    }))
}

#[derive(Debug)]
struct ForNode {
    var: String,
    sequence: Expr,
    body: NodeList,
}

impl Node for ForNode {
    fn render(&self, context: &mut Context) -> Result<String, TemplateError> {
        let items = self.sequence.resolve(context)?.iter_items();
        let total = items.len();
        let mut out = String::new();

        for (index, item) in items.into_iter().enumerate() {
            let mut forloop = Map::new();
            forloop.insert("counter".into(), Value::Int(index as i64 + 1));
            forloop.insert("counter0".into(), Value::Int(index as i64));
            forloop.insert("first".into(), Value::Bool(index == 0));
            forloop.insert("last".into(), Value::Bool(index + 1 == total));

            context.push();
            context.set(self.var.clone(), item);
            context.set("forloop", forloop);
            let rendered = self.body.render(context);
            context.pop();
            out.push_str(&rendered?);
        }
        Ok(out)
    }
}

fn do_for(parser: &mut Parser<'_>, token: Token) -> Result<Box<dyn Node>, TemplateError> {
    let bits = token.split_contents();
    let [_, var, kw, sequence] = bits.as_slice() else {
        return Err(TemplateError::syntax(
            "'for' statements should look like 'for x in y'",
            token.line,
        ));
    };
    if kw != "in" {
        return Err(TemplateError::syntax(
            "'for' statements should use the format 'for x in y'",
            token.line,
        ));
    }
    let sequence = parser.compile_expr(sequence)?;
    let body = parser.parse_until(&["endfor"])?;
    parser.delete_first_token();

    Ok(Box::new(ForNode {
        var: var.clone(),
        sequence,
        body,
    }))
}

#[derive(Debug)]
struct EmptyNode;

impl Node for EmptyNode {
    fn render(&self, _context: &mut Context) -> Result<String, TemplateError> {
        Ok(String::new())
    }
}

fn do_comment(parser: &mut Parser<'_>, _token: Token) -> Result<Box<dyn Node>, TemplateError> {
    parser.skip_past("endcomment")?;
    Ok(Box::new(EmptyNode))
}

fn do_load(parser: &mut Parser<'_>, token: Token) -> Result<Box<dyn Node>, TemplateError> {
    let bits = token.split_contents();
    if bits.len() < 2 {
        return Err(TemplateError::syntax(
            "'load' requires at least one library name",
            token.line,
        ));
    }
    for id in &bits[1..] {
        parser.load(id)?;
    }
    Ok(Box::new(EmptyNode))
}

#[derive(Debug)]
struct CsrfTokenNode;

impl Node for CsrfTokenNode {
    fn render(&self, context: &mut Context) -> Result<String, TemplateError> {
        Ok(match context.resolve("csrf_token") {
            Some(Value::String(token)) if !token.is_empty() && token != CSRF_NOT_PROVIDED => {
                format!(
                    "<input type=\"hidden\" name=\"csrfmiddlewaretoken\" value=\"{}\">",
                    escape_html(&token)
                )
            }
            _ => String::new(),
        })
    }
}

fn do_csrf_token(_parser: &mut Parser<'_>, _token: Token) -> Result<Box<dyn Node>, TemplateError> {
    Ok(Box::new(CsrfTokenNode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Engine;

    fn render(source: &str, context: &mut Context) -> String {
        Engine::new().compile(source).unwrap().render(context).unwrap()
    }

    #[test]
    fn if_else() {
        let mut ctx = Context::new();
        ctx.set("flag", true);
        assert_eq!(render("{% if flag %}y{% else %}n{% endif %}", &mut ctx), "y");
        assert_eq!(render("{% if not flag %}y{% else %}n{% endif %}", &mut ctx), "n");
        assert_eq!(render("{% if 1 %}test{% endif %}", &mut ctx), "test");
        assert_eq!(render("{% if missing %}x{% endif %}", &mut ctx), "");
    }

    #[test]
    fn for_loop_scopes_variables() {
        let mut ctx = Context::new();
        ctx.set("items", Value::List(vec!["a".into(), "b".into()]));
        let out = render(
            "{% for x in items %}{{ forloop.counter }}{{ x }}{% if forloop.last %}.{% endif %}{% endfor %}{{ x }}",
            &mut ctx,
        );
        assert_eq!(out, "1a2b.");
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn comment_block_is_skipped() {
        let out = render("a{% comment %}{{ b }}{% if %}{% endcomment %}c", &mut Context::new());
        assert_eq!(out, "ac");
    }

    #[test]
    fn filters() {
        let mut ctx = Context::new();
        ctx.set("name", "Ada");
        ctx.set("html", "<b>\"x\" & 'y'</b>");
        assert_eq!(render("{{ name|upper }}", &mut ctx), "ADA");
        assert_eq!(render("{{ missing|default:\"anon\" }}", &mut ctx), "anon");
        assert_eq!(render("{{ name|length }}", &mut ctx), "3");
        assert_eq!(
            render("{{ html|escape }}", &mut ctx),
            "&lt;b&gt;&quot;x&quot; &amp; &#x27;y&#x27;&lt;/b&gt;"
        );
    }

    #[test]
    fn variables_are_escaped_unless_marked_safe() {
        let mut ctx = Context::new();
        ctx.set("html", "<i>a & b</i>");
        assert_eq!(render("{{ html }}", &mut ctx), "&lt;i&gt;a &amp; b&lt;/i&gt;");
        assert_eq!(render("{{ html|upper }}", &mut ctx), "&lt;I&gt;A &amp; B&lt;/I&gt;");
        assert_eq!(render("{{ html|safe }}", &mut ctx), "<i>a & b</i>");
        assert_eq!(render("{{ html|escape }}", &mut ctx), "&lt;i&gt;a &amp; b&lt;/i&gt;");
    }

    #[test]
    fn csrf_token_tag() {
        let mut ctx = Context::new();
        assert_eq!(render("{% csrf_token %}", &mut ctx), "");
        ctx.set("csrf_token", CSRF_NOT_PROVIDED);
        assert_eq!(render("{% csrf_token %}", &mut ctx), "");
        ctx.set("csrf_token", "abc");
        assert_eq!(
            render("{% csrf_token %}", &mut ctx),
            "<input type=\"hidden\" name=\"csrfmiddlewaretoken\" value=\"abc\">"
        );
    }

    #[test]
    fn unclosed_if_is_a_syntax_error() {
        let err = Engine::new().compile("{% if x %}never closed").unwrap_err();
        assert!(err.is_syntax());
    }
}
