//! Template lexer.
//!
//! Splits source text into text, `{{ variable }}`, `{% block %}` and
//! `{# comment #}` tokens. Tag tokens keep their inner contents trimmed, so
//! [`Token::to_source`] reproduces a canonical spelling of the original tag.

use std::sync::LazyLock;

use regex::Regex;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{%.*?%\}|\{\{.*?\}\}|\{#.*?#\}").expect("tag pattern is a valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Text,
    Variable,
    Block,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub contents: String,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, contents: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            contents: contents.into(),
            line,
        }
    }

    /// Re-serializes the token to literal template markup.
    ///
    /// ```
    /// use phased::template::{Token, TokenKind};
    ///
    /// assert_eq!(Token::new(TokenKind::Block, "if x", 1).to_source(), "{% if x %}");
    /// assert_eq!(Token::new(TokenKind::Variable, "x|upper", 1).to_source(), "{{ x|upper }}");
    /// assert_eq!(Token::new(TokenKind::Comment, "note", 1).to_source(), "{# note #}");
    /// ```
    pub fn to_source(&self) -> String {
        match self.kind {
            TokenKind::Text => self.contents.clone(),
            TokenKind::Variable => format!("{{{{ {} }}}}", self.contents),
            TokenKind::Block => format!("{{% {} %}}", self.contents),
            TokenKind::Comment => format!("{{# {} #}}", self.contents),
        }
    }

    /// The first word of a block token, e.g. `if` for `{% if x %}`.
    pub fn name(&self) -> &str {
        self.contents.split_whitespace().next().unwrap_or("")
    }

    /// Splits the contents on whitespace, keeping quoted strings in one piece.
    pub fn split_contents(&self) -> Vec<String> {
        split_respecting_quotes(&self.contents, char::is_whitespace)
    }
}

/// Splits `input` on `is_sep`, never breaking inside `"…"` or `'…'`.
pub(crate) fn split_respecting_quotes(input: &str, is_sep: impl Fn(char) -> bool) -> Vec<String> {
    let mut bits = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in input.chars() {
        match quote {
            Some(q) => {
                current.push(ch);
                if ch == q {
                    quote = None;
                }
            }
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                current.push(ch);
            }
            None if is_sep(ch) => {
                if !current.is_empty() {
                    bits.push(std::mem::take(&mut current));
                }
            }
            None => current.push(ch),
        }
    }
    if !current.is_empty() {
        bits.push(current);
    }
    bits
}

/// Tokenizes template source.
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut last = 0;

    for m in TAG_RE.find_iter(source) {
        if m.start() > last {
            let text = &source[last..m.start()];
            tokens.push(Token::new(TokenKind::Text, text, line));
            line += text.matches('\n').count();
        }
        tokens.push(classify(m.as_str(), line));
        line += m.as_str().matches('\n').count();
        last = m.end();
    }
    if last < source.len() {
        tokens.push(Token::new(TokenKind::Text, &source[last..], line));
    }
    tokens
}

fn classify(tag: &str, line: usize) -> Token {
    let inner = tag[2..tag.len() - 2].trim();
    let kind = match &tag[..2] {
        "{{" => TokenKind::Variable,
        "{%" => TokenKind::Block,
        _ => TokenKind::Comment,
    };
    Token::new(kind, inner, line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_every_kind() {
        let tokens = tokenize("a{{ b }}c{% if d %}e{# f #}");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Text,
                TokenKind::Variable,
                TokenKind::Text,
                TokenKind::Block,
                TokenKind::Text,
                TokenKind::Comment,
            ]
        );
        assert_eq!(tokens[3].contents, "if d");
        assert_eq!(tokens[5].contents, "f");
    }

    #[test]
    fn to_source_normalizes_whitespace() {
        let tokens = tokenize("{%if 1%}x{%   endif   %}");
        let rebuilt: String = tokens.iter().map(Token::to_source).collect();
        assert_eq!(rebuilt, "{% if 1 %}x{% endif %}");
    }

    #[test]
    fn tracks_line_numbers() {
        let tokens = tokenize("one\ntwo\n{% tag %}\n{{ var }}");
        assert_eq!(tokens[1].line, 3);
        assert_eq!(tokens[3].line, 4);
    }

    #[test]
    fn unterminated_tag_is_text() {
        let tokens = tokenize("a {% b");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Text);
    }

    #[test]
    fn split_contents_keeps_quotes() {
        let token = Token::new(TokenKind::Block, r#"phased with "test var" other"#, 1);
        assert_eq!(
            token.split_contents(),
            vec!["phased", "with", "\"test var\"", "other"]
        );
    }
}
