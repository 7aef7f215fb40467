//! The first-pass `phased` block tag.
//!
//! ```text
//! {% phased [with name ...] %} ... {% endphased %}
//! ```
//!
//! The body is never compiled here. Its tokens are written back out as
//! literal markup and emitted between two delimiters together with the
//! captured context and component set, for the second pass to render.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::codec::SnapshotFormat;
use super::config::Settings;
use super::{components, snapshot};
use crate::template::{Context, Layer, Map, Node, Parser, TemplateError, Token, TokenKind};

#[derive(Debug)]
pub struct PhasedNode {
    settings: Arc<Settings>,
    raw_source: String,
    var_names: Vec<String>,
    components: BTreeSet<String>,
    line: usize,
}

impl PhasedNode {
    pub fn raw_source(&self) -> &str {
        &self.raw_source
    }

    fn stash(&self, context: &Context) -> Result<Map, TemplateError> {
        if self.var_names.is_empty() {
            return Ok(if self.settings.keep_full_context() {
                snapshot::flatten(context)
            } else {
                Map::new()
            });
        }

        let mut stash = Map::new();
        for name in &self.var_names {
            let value = context.resolve_path(name).ok_or_else(|| {
                TemplateError::syntax(
                    format!(
                        "'{}' tag got an unknown variable: '{name}'",
                        self.settings.tag_name()
                    ),
                    self.line,
                )
            })?;
            stash.insert(name.clone(), value);
        }
        Ok(stash)
    }
}

impl Node for PhasedNode {
    fn render(&self, context: &mut Context) -> Result<String, TemplateError> {
        let mut stash = self.stash(context)?;
        stash.insert(
            snapshot::CSRF_KEY.to_owned(),
            snapshot::backup_csrf_token(context),
        );

        let mut body = self.raw_source.clone();
        body.push_str(&snapshot::encode(
            &Layer::Layered(Context::from_map(stash)),
            &SnapshotFormat::CONTEXT,
        )?);
        if self.settings.writes_components() && !self.components.is_empty() {
            body.push_str(&components::encode(&self.components)?);
        }
        Ok(self.settings.delimiter().wrap(&body))
    }
}

/// Compiles `{% phased %}`. The matching end tag is consumed.
pub fn compile(
    settings: &Arc<Settings>,
    parser: &mut Parser<'_>,
    token: Token,
) -> Result<Box<dyn Node>, TemplateError> {
    let tag = settings.tag_name();
    let bits = token.split_contents();
    let var_names = match bits.as_slice() {
        [_] => Vec::new(),
        [_, with, names @ ..] if with == "with" => {
            if names.is_empty() {
                return Err(TemplateError::syntax(
                    format!("'{tag}' tag requires at least one context variable name"),
                    token.line,
                ));
            }
            names.iter().map(|name| unquote(name).to_owned()).collect()
        }
        _ => {
            return Err(TemplateError::syntax(
                format!("'{tag}' tag requires the second argument to be 'with'"),
                token.line,
            ));
        }
    };

    let end = settings.end_tag_name();
    let raw_source = scan_raw_source(parser, tag, &end)?;
    parser.delete_first_token();

    Ok(Box::new(PhasedNode {
        settings: Arc::clone(settings),
        raw_source,
        var_names,
        components: components::collect(parser),
        line: token.line,
    }))
}

/// Re-serializes tokens up to the `end` tag that closes the current block.
///
/// Nested `tag`/`end` pairs are copied through. The closing token is left in
/// the stream.
pub fn scan_raw_source(parser: &mut Parser<'_>, tag: &str, end: &str) -> Result<String, TemplateError> {
    let mut depth: usize = 0;
    let mut raw = String::new();

    while let Some(token) = parser.next_token() {
        if token.kind == TokenKind::Block {
            if token.name() == tag {
                depth += 1;
            } else if token.name() == end {
                if depth == 0 {
                    parser.prepend_token(token);
                    return Ok(raw);
                }
                depth -= 1;
            }
        }
        raw.push_str(&token.to_source());
    }

    Err(parser.unclosed_block(&[end]))
}

fn unquote(name: &str) -> &str {
    let bytes = name.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(b'"'), Some(b'"')) | (Some(b'\''), Some(b'\'')) if name.len() >= 2 => {
            &name[1..name.len() - 1]
        }
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phased::{PhasedConfig, PhasedTags};
    use crate::template::{Engine, Value};

    fn engine(config: PhasedConfig) -> (Engine, Arc<Settings>) {
        let settings = Settings::from_config(config);
        let mut engine = Engine::new();
        PhasedTags::new(Arc::clone(&settings)).install(&mut engine);
        (engine, settings)
    }

    fn fancy() -> PhasedConfig {
        PhasedConfig {
            explicit_delimiter: Some("fancydelimiter".into()),
            ..PhasedConfig::default()
        }
    }

    fn csrf_only() -> String {
        let mut stash = Map::new();
        stash.insert("csrf_token".into(), snapshot::NOT_PROVIDED.into());
        snapshot::encode(&Layer::Layered(Context::from_map(stash)), &SnapshotFormat::CONTEXT).unwrap()
    }

    #[test]
    fn body_is_emitted_as_literal_markup() {
        let (engine, _) = engine(fancy());
        let template = engine
            .compile("{% load phased_tags %}{% phased %}{% if 1 %}test{% endif %}{% endphased %}{{ test_var }}")
            .unwrap();
        let mut ctx = Context::new();
        ctx.set("test_var", "TEST");

        let out = template.render(&mut ctx).unwrap();
        assert_eq!(
            out,
            format!("fancydelimiter{{% if 1 %}}test{{% endif %}}{}fancydelimiterTEST", csrf_only())
        );
    }

    #[test]
    fn nested_blocks_are_copied_through() {
        let (engine, settings) = engine(PhasedConfig::default());
        let template = engine
            .compile(
                "{% load phased_tags %}{% phased %}{% load phased_tags %}{% phased %}{% if 1 %}first{% endif %}\
                 {% endphased %}{% if 1 %}second{% endif %}{% endphased %}{{ test_var }}",
            )
            .unwrap();
        let mut ctx = Context::new();
        ctx.set("test_var", "TEST");

        let out = template.render(&mut ctx).unwrap();
        let d = settings.delimiter().as_str();
        assert_eq!(
            out,
            format!(
                "{d}{{% load phased_tags %}}{{% phased %}}{{% if 1 %}}first{{% endif %}}{{% endphased %}}\
                 {{% if 1 %}}second{{% endif %}}{}{d}TEST",
                csrf_only()
            )
        );
    }

    #[test]
    fn keep_full_context_captures_everything_portable() {
        let (engine, _) = engine(PhasedConfig {
            keep_full_context: true,
            ..fancy()
        });
        let template = engine.compile("{% load phased_tags %}{% phased %}x{% endphased %}").unwrap();
        let mut ctx = Context::new();
        ctx.set("test_var", "TEST");

        let out = template.render(&mut ctx).unwrap();
        let captured = snapshot::decode(&out, &SnapshotFormat::CONTEXT).unwrap();
        assert_eq!(captured.get("test_var"), Some(&Value::from("TEST")));
        assert_eq!(captured.get("csrf_token"), Some(&Value::from(snapshot::NOT_PROVIDED)));
    }

    #[test]
    fn with_clause_captures_named_variables() {
        let (engine, _) = engine(fancy());
        let template = engine
            .compile("{% load phased_tags %}{% phased with \"test_var\" test_condition %}x{% endphased %}")
            .unwrap();

        let mut missing = Context::new();
        missing.set("test_var", "TEST");
        assert!(template.render(&mut missing).unwrap_err().is_syntax());

        let mut ctx = Context::new();
        ctx.set("test_var", "TEST");
        ctx.set("test_condition", true);
        ctx.set("other", "ignored");
        let out = template.render(&mut ctx).unwrap();
        let captured = snapshot::decode(&out, &SnapshotFormat::CONTEXT).unwrap();
        assert_eq!(
            captured.keys().collect::<Vec<_>>(),
            vec!["csrf_token", "test_condition", "test_var"]
        );
    }

    #[test]
    fn with_requires_names() {
        let (engine, _) = engine(PhasedConfig::default());
        let err = engine
            .compile("{% load phased_tags %}{% phased with %}x{% endphased %}")
            .unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { ref message, .. } if message.contains("at least one")));

        let err = engine
            .compile("{% load phased_tags %}{% phased using x %}x{% endphased %}")
            .unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { ref message, .. } if message.contains("'with'")));
    }

    #[test]
    fn unclosed_block_is_a_syntax_error() {
        let (engine, _) = engine(PhasedConfig::default());
        let err = engine
            .compile("{% load phased_tags %}{% phased %}{% phased %}x{% endphased %}")
            .unwrap_err();
        assert!(matches!(err, TemplateError::UnclosedBlock { ref expected, .. } if expected == "endphased"));
    }

    #[test]
    fn custom_libraries_are_recorded() {
        let (mut engine, settings) = engine(PhasedConfig::default());
        let mut custom = crate::template::Library::new("custom_tags");
        custom.filter("noop", |v, _| Ok(v));
        engine.register(custom);

        let template = engine
            .compile("{% load phased_tags custom_tags %}{% phased %}{{ x|noop }}{% endphased %}")
            .unwrap();
        let out = template.render(&mut Context::new()).unwrap();
        let fragment = settings.delimiter().split(&out)[1].to_owned();
        assert!(fragment.ends_with(&components::encode(&["custom_tags".to_owned()].into()).unwrap()));
    }

    #[test]
    fn custom_tag_name() {
        let (engine, _) = engine(PhasedConfig {
            tag_name: "literal".into(),
            ..fancy()
        });
        let out = engine
            .compile("{% load phased_tags %}{% literal %}{{ a }}{% endliteral %}")
            .unwrap()
            .render(&mut Context::new())
            .unwrap();
        assert!(out.starts_with("fancydelimiter{{ a }}{# context"));
    }
}
