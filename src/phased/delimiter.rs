//! The secret marker bounding deferred fragments in rendered output.

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiter(String);

impl Delimiter {
    /// Derives the delimiter as the SHA-256 hex digest of `secret`.
    pub fn derive(secret: &str) -> Self {
        Self(hex::encode(Sha256::digest(secret.as_bytes())))
    }

    pub fn explicit(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Surrounds `body` with the delimiter on both sides.
    pub fn wrap(&self, body: &str) -> String {
        let mut out = String::with_capacity(body.len() + 2 * self.0.len());
        out.push_str(&self.0);
        out.push_str(body);
        out.push_str(&self.0);
        out
    }

    /// Splits `content` on the delimiter. Odd-indexed segments are fragments.
    pub fn split<'a>(&self, content: &'a str) -> Vec<&'a str> {
        content.split(self.0.as_str()).collect()
    }

    pub fn occurs_in(&self, content: &str) -> bool {
        !self.0.is_empty() && content.contains(&self.0)
    }
}
