//! Wire format for the metadata carried inside a deferred fragment.
//!
//! Payloads are JSON, base64-encoded, wrapped in a template comment so they
//! stay inert if a page is ever served without a second pass:
//!
//! ```text
//! {# context "<base64>" endcontext #}{# components "<base64>" endcomponents #}
//! ```

use std::borrow::Cow;
use std::sync::LazyLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::error::SerializationError;

/// Text written on either side of an encoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFormat {
    open: Cow<'static, str>,
    close: Cow<'static, str>,
}

impl SnapshotFormat {
    pub const CONTEXT: Self = Self::fixed("{# context \"", "\" endcontext #}");
    pub const LEGACY: Self = Self::fixed("{# stashed context: \"", "\" #}");
    pub const COMPONENTS: Self = Self::fixed("{# components \"", "\" endcomponents #}");

    const fn fixed(open: &'static str, close: &'static str) -> Self {
        Self {
            open: Cow::Borrowed(open),
            close: Cow::Borrowed(close),
        }
    }

    /// A custom wrapper, e.g. an HTML comment.
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: Cow::Owned(open.into()),
            close: Cow::Owned(close.into()),
        }
    }

    pub fn wrap(&self, payload: &str) -> String {
        format!("{}{}{}", self.open, payload, self.close)
    }

    /// Returns the payload of the rightmost wrapped occurrence in `text`.
    pub fn find<'a>(&self, text: &'a str) -> Option<&'a str> {
        let start = text.rfind(self.open.as_ref())? + self.open.len();
        let rest = &text[start..];
        let end = rest.find(self.close.as_ref())?;
        Some(&rest[..end])
    }

    fn trailing_pattern(&self) -> String {
        format!(
            "{}([A-Za-z0-9+/=]*){}\\z",
            regex::escape(&self.open),
            regex::escape(&self.close)
        )
    }
}

static COMPONENTS_TRAILER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&SnapshotFormat::COMPONENTS.trailing_pattern())
        .expect("components trailer is a valid regex")
});

static CONTEXT_TRAILER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&SnapshotFormat::CONTEXT.trailing_pattern())
        .expect("context trailer is a valid regex")
});

static LEGACY_TRAILER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&SnapshotFormat::LEGACY.trailing_pattern())
        .expect("legacy trailer is a valid regex")
});

/// Serializes `value` to JSON, base64-encodes it and wraps it in `format`.
pub fn encode_payload<T: Serialize + ?Sized>(
    value: &T,
    format: &SnapshotFormat,
) -> Result<String, SerializationError> {
    let json = serde_json::to_vec(value)?;
    Ok(format.wrap(&STANDARD.encode(json)))
}

/// Reverses [`encode_payload`] for a bare (unwrapped) payload.
pub fn decode_payload<T: DeserializeOwned>(payload: &str) -> Result<T, SerializationError> {
    let bytes = STANDARD.decode(payload)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// A fragment body split into template source and its metadata comments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailer<'a> {
    pub source: &'a str,
    pub context: Option<&'a str>,
    pub components: Option<&'a str>,
}

impl<'a> Trailer<'a> {
    /// Peels the components comment and then the context comment (either
    /// form) off the end of `fragment`.
    pub fn split(fragment: &'a str) -> Self {
        let (rest, components) = strip_trailing(fragment, &COMPONENTS_TRAILER);
        let (source, context) = match strip_trailing(rest, &CONTEXT_TRAILER) {
            (source, Some(payload)) => (source, Some(payload)),
            _ => strip_trailing(rest, &LEGACY_TRAILER),
        };
        Self {
            source,
            context,
            components,
        }
    }
}

fn strip_trailing<'a>(text: &'a str, pattern: &Regex) -> (&'a str, Option<&'a str>) {
    match pattern.captures(text) {
        Some(caps) => match (caps.get(0), caps.get(1)) {
            (Some(whole), Some(payload)) => (&text[..whole.start()], Some(payload.as_str())),
            _ => (text, None),
        },
        None => (text, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_takes_rightmost_occurrence() {
        let text = format!(
            "{}x{}",
            SnapshotFormat::CONTEXT.wrap("first"),
            SnapshotFormat::CONTEXT.wrap("second")
        );
        assert_eq!(SnapshotFormat::CONTEXT.find(&text), Some("second"));
        assert_eq!(SnapshotFormat::LEGACY.find(&text), None);
    }

    #[test]
    fn custom_wrapper() {
        let format = SnapshotFormat::new("<!-- better be careful ", " yikes -->");
        let wrapped = encode_payload(&vec!["a"], &format).unwrap();
        assert!(wrapped.starts_with("<!-- better be careful "));
        let payload = format.find(&wrapped).unwrap();
        let back: Vec<String> = decode_payload(payload).unwrap();
        assert_eq!(back, vec!["a"]);
    }

    #[test]
    fn trailer_splits_both_comments() {
        let ctx = SnapshotFormat::CONTEXT.wrap("e30=");
        let comps = SnapshotFormat::COMPONENTS.wrap("W10=");
        let fragment = format!("{{% if 1 %}}x{{% endif %}}{ctx}{comps}");
        let trailer = Trailer::split(&fragment);
        assert_eq!(trailer.source, "{% if 1 %}x{% endif %}");
        assert_eq!(trailer.context, Some("e30="));
        assert_eq!(trailer.components, Some("W10="));
    }

    #[test]
    fn trailer_accepts_legacy_form_and_absence() {
        let fragment = format!("body{}", SnapshotFormat::LEGACY.wrap("e30="));
        let trailer = Trailer::split(&fragment);
        assert_eq!(trailer.source, "body");
        assert_eq!(trailer.context, Some("e30="));
        assert_eq!(trailer.components, None);

        let bare = Trailer::split("{{ x }}");
        assert_eq!(bare.source, "{{ x }}");
        assert_eq!(bare.context, None);
    }

    #[test]
    fn metadata_inside_the_body_is_not_a_trailer() {
        let fragment = format!("{}tail", SnapshotFormat::CONTEXT.wrap("e30="));
        let trailer = Trailer::split(&fragment);
        assert_eq!(trailer.source, fragment);
        assert_eq!(trailer.context, None);
    }

    #[test]
    fn corrupt_payloads_are_errors() {
        assert!(matches!(
            decode_payload::<Vec<String>>("!!!"),
            Err(SerializationError::Base64(_))
        ));
        assert!(matches!(
            decode_payload::<Vec<String>>("bm90IGpzb24="),
            Err(SerializationError::Json(_))
        ));
    }
}
