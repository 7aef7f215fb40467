//! Configuration for the phased renderer.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use super::delimiter::Delimiter;

/// Recognized options, loadable from JSON.
///
/// ```
/// use phased::phased::PhasedConfig;
///
/// let config = PhasedConfig::from_json(r#"{ "secret_key": "s3cr3t", "keep_full_context": true }"#).unwrap();
/// assert!(config.keep_full_context);
/// assert_eq!(config.tag_name, "phased");
/// assert_eq!(config.cache.key_prefix, "template.cache");
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PhasedConfig {
    /// Installation secret the delimiter is derived from.
    pub secret_key: String,
    /// Used verbatim instead of the derived delimiter.
    pub explicit_delimiter: Option<String>,
    /// Snapshot the whole render context when a block names no variables.
    pub keep_full_context: bool,
    /// Always write the component set when it is non-empty.
    pub capture_components: bool,
    pub tag_name: String,
    /// Deepest nesting of deferred fragments the second pass will follow.
    pub max_depth: usize,
    pub cache: CacheConfig,
}

impl Default for PhasedConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            explicit_delimiter: None,
            keep_full_context: false,
            capture_components: true,
            tag_name: "phased".to_owned(),
            max_depth: 16,
            cache: CacheConfig::default(),
        }
    }
}

impl PhasedConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Namespace for `phasedcache` fragment keys.
    pub key_prefix: String,
    /// Namespace for whole-page cache keys.
    pub page_prefix: String,
    pub default_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: "template.cache".to_owned(),
            page_prefix: "views.cache".to_owned(),
            default_timeout_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

/// Resolved, immutable settings shared by every phased component.
#[derive(Debug)]
pub struct Settings {
    config: PhasedConfig,
    delimiter: Delimiter,
}

impl Settings {
    /// Resolves the delimiter once and freezes the configuration.
    pub fn from_config(config: PhasedConfig) -> Arc<Self> {
        let delimiter = match &config.explicit_delimiter {
            Some(explicit) => {
                debug!("using explicitly configured delimiter");
                Delimiter::explicit(explicit.clone())
            }
            None => {
                if config.secret_key.is_empty() {
                    warn!("secret_key is empty; the derived delimiter is predictable");
                }
                debug!("deriving delimiter from secret key");
                Delimiter::derive(&config.secret_key)
            }
        };
        Arc::new(Self { config, delimiter })
    }

    pub fn delimiter(&self) -> &Delimiter {
        &self.delimiter
    }

    pub fn config(&self) -> &PhasedConfig {
        &self.config
    }

    pub fn tag_name(&self) -> &str {
        &self.config.tag_name
    }

    pub fn end_tag_name(&self) -> String {
        format!("end{}", self.config.tag_name)
    }

    pub fn keep_full_context(&self) -> bool {
        self.config.keep_full_context
    }

    /// Whether a non-empty component set is written into each fragment.
    pub fn writes_components(&self) -> bool {
        self.config.keep_full_context || self.config.capture_components
    }

    pub fn max_depth(&self) -> usize {
        self.config.max_depth
    }

    pub fn cache(&self) -> &CacheConfig {
        &self.config.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_delimiter_wins() {
        let settings = Settings::from_config(PhasedConfig {
            secret_key: "ignored".into(),
            explicit_delimiter: Some("fancydelimiter".into()),
            ..PhasedConfig::default()
        });
        assert_eq!(settings.delimiter().as_str(), "fancydelimiter");
    }

    #[test]
    fn derived_delimiter_is_stable() {
        let a = Settings::from_config(PhasedConfig {
            secret_key: "abc".into(),
            ..PhasedConfig::default()
        });
        let b = Settings::from_config(PhasedConfig {
            secret_key: "abc".into(),
            ..PhasedConfig::default()
        });
        assert_eq!(a.delimiter(), b.delimiter());
        assert_eq!(a.end_tag_name(), "endphased");
    }

    #[test]
    fn json_fills_in_defaults() {
        let config = PhasedConfig::from_json(r#"{ "tag_name": "literal", "cache": { "default_timeout_secs": 5 } }"#)
            .unwrap();
        assert_eq!(config.tag_name, "literal");
        assert_eq!(config.max_depth, 16);
        assert!(config.capture_components);
        assert_eq!(config.cache.page_prefix, "views.cache");
        assert_eq!(config.cache.default_timeout(), Duration::from_secs(5));
    }
}
