//! `Vary` header manipulation.
//!
//! The header is a comma-separated set of case-insensitive request header
//! names. [`drop_vary_headers`] and [`patch_vary_headers`] are inverses: the
//! cache middleware drops `Cookie` just before storing a response and adds it
//! back just after, so the stored entry is shared across cookie values while
//! clients still see `Vary: Cookie`.

use crate::http::{Headers, Response};

const VARY: &str = "Vary";

/// Every token across all `Vary` headers, in order.
pub fn vary_headers(headers: &Headers) -> Vec<String> {
    headers
        .get_all(VARY)
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Removes `names` from a header value. `None` means the header should be absent.
pub fn drop_tokens(value: Option<&str>, names: &[&str]) -> Option<String> {
    let kept: Vec<&str> = value
        .into_iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter(|token| !names.iter().any(|name| name.eq_ignore_ascii_case(token)))
        .collect();
    (!kept.is_empty()).then(|| kept.join(", "))
}

/// Appends each of `names` not already present to a header value.
pub fn add_tokens(value: Option<&str>, names: &[&str]) -> String {
    let mut tokens: Vec<&str> = value
        .into_iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect();
    for name in names {
        if !tokens.iter().any(|token| token.eq_ignore_ascii_case(name)) {
            tokens.push(name);
        }
    }
    tokens.join(", ")
}

/// Removes `names` from the response's `Vary` header, deleting it when empty.
pub fn drop_vary_headers(response: &mut Response, names: &[&str]) {
    let current = vary_headers(response.headers()).join(", ");
    let headers = response.headers_mut();
    match drop_tokens(Some(&current), names) {
        Some(value) => headers.set(VARY, value),
        None => {
            headers.remove(VARY);
        }
    }
}

/// Adds `names` to the response's `Vary` header.
pub fn patch_vary_headers(response: &mut Response, names: &[&str]) {
    let current = vary_headers(response.headers()).join(", ");
    response
        .headers_mut()
        .set(VARY, add_tokens(Some(&current), names));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;

    #[test]
    fn patch_then_drop() {
        let mut response = Response::new(StatusCode::Ok);
        assert!(!response.headers().contains("vary"));

        patch_vary_headers(&mut response, &["Cookie"]);
        assert_eq!(response.headers().get("vary"), Some("Cookie"));
        patch_vary_headers(&mut response, &["Nomnomnom"]);
        assert_eq!(response.headers().get("vary"), Some("Cookie, Nomnomnom"));

        drop_vary_headers(&mut response, &["Cookie"]);
        assert_eq!(response.headers().get("vary"), Some("Nomnomnom"));
        drop_vary_headers(&mut response, &["Nomnomnom"]);
        assert!(!response.headers().contains("vary"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(drop_tokens(Some("cookie, Accept"), &["COOKIE"]), Some("Accept".into()));
        assert_eq!(add_tokens(Some("COOKIE"), &["Cookie"]), "COOKIE");
        assert_eq!(drop_tokens(Some(" , "), &["Cookie"]), None);
    }

    #[test]
    fn drop_then_add_restores_cookie() {
        for original in [None, Some("Accept-Encoding, Cookie, User-Agent"), Some("Accept-Encoding")] {
            let dropped = drop_tokens(original, &["Cookie"]);
            let restored = add_tokens(dropped.as_deref(), &["Cookie"]);
            let tokens: Vec<&str> = restored.split(", ").collect();
            assert!(tokens.contains(&"Cookie"));
            for kept in ["Accept-Encoding", "User-Agent"] {
                assert_eq!(
                    original.is_some_and(|o| o.contains(kept)),
                    tokens.contains(&kept)
                );
            }
        }
        assert_eq!(
            add_tokens(drop_tokens(Some("A, Cookie, B"), &["Cookie"]).as_deref(), &["Cookie"]),
            "A, B, Cookie"
        );
    }

    #[test]
    fn multiple_vary_headers_are_merged() {
        let mut response = Response::new(StatusCode::Ok)
            .header("Vary", "Accept")
            .header("Vary", "Cookie");
        drop_vary_headers(&mut response, &["cookie"]);
        assert_eq!(response.headers().get_all("vary").collect::<Vec<_>>(), vec!["Accept"]);
    }
}
