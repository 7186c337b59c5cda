use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::gate::{AuthPolicy, RateLimitSettings};
use crate::paths::PathMapper;

#[derive(Debug, Deserialize, Clone)]
pub struct MailgenConfig {
    /// Template root, relative to the config file.
    #[serde(default = "default_email_dir")]
    pub email_dir: String,

    /// Build directory; wrappers land in `<build_dir>/email-wrappers`.
    #[serde(default = "default_build_dir")]
    pub build_dir: String,

    /// Root of the generated API route tree.
    #[serde(default = "default_api_dir")]
    pub api_dir: String,

    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,

    /// Preview layout component imported by every wrapper.
    #[serde(default = "default_layout_component")]
    pub layout_component: String,

    /// Fallback base URL used when `NUXT_PUBLIC_SITE_URL` is not set.
    #[serde(default = "default_site_url")]
    pub site_url: String,

    #[serde(default)]
    pub api_key: ApiKeySetting,

    #[serde(default)]
    pub rate_limit: RateLimitSetting,

    #[serde(default)]
    pub send_handler: Option<SendHandlerConfig>,

    #[serde(default)]
    pub watch: WatchConfig,

    /// Write `registry.json` next to the wrappers.
    #[serde(default = "default_manifest")]
    pub manifest: bool,
}

impl Default for MailgenConfig {
    fn default() -> Self {
        Self {
            email_dir: default_email_dir(),
            build_dir: default_build_dir(),
            api_dir: default_api_dir(),
            route_prefix: default_route_prefix(),
            layout_component: default_layout_component(),
            site_url: default_site_url(),
            api_key: ApiKeySetting::default(),
            rate_limit: RateLimitSetting::default(),
            send_handler: None,
            watch: WatchConfig::default(),
            manifest: default_manifest(),
        }
    }
}

fn default_email_dir() -> String {
    "emails".to_string()
}

fn default_build_dir() -> String {
    ".nuxt".to_string()
}

fn default_api_dir() -> String {
    "server/api/emails".to_string()
}

fn default_route_prefix() -> String {
    "/__emails".to_string()
}

fn default_layout_component() -> String {
    "runtime/pages/__emails.vue".to_string()
}

fn default_site_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_manifest() -> bool {
    true
}

/// `api_key: "..."`, `api_key: false`, or absent (a key is generated).
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ApiKeySetting {
    Key(String),
    Enabled(bool),
}

impl Default for ApiKeySetting {
    fn default() -> Self {
        ApiKeySetting::Enabled(true)
    }
}

impl ApiKeySetting {
    pub fn resolve(&self) -> AuthPolicy {
        match self {
            ApiKeySetting::Key(key) => AuthPolicy::Key(key.clone()),
            ApiKeySetting::Enabled(false) => AuthPolicy::Disabled,
            ApiKeySetting::Enabled(true) => AuthPolicy::generated(),
        }
    }
}

/// `rate_limit: { max_requests, window_ms }`, `rate_limit: false`, or absent.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum RateLimitSetting {
    Limits(RateLimitSettings),
    Enabled(bool),
}

impl Default for RateLimitSetting {
    fn default() -> Self {
        RateLimitSetting::Limits(RateLimitSettings::default())
    }
}

impl RateLimitSetting {
    pub fn resolve(&self) -> Option<RateLimitSettings> {
        match self {
            RateLimitSetting::Limits(limits) => Some(limits.clone()),
            RateLimitSetting::Enabled(true) => Some(RateLimitSettings::default()),
            RateLimitSetting::Enabled(false) => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SendHandlerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    500
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid rate limit: {0}")]
    InvalidRateLimit(String),
}

impl MailgenConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: MailgenConfig = serde_yaml::from_str(content)?;
        if let Some(limits) = config.rate_limit.resolve() {
            if limits.max_requests == 0 || limits.window_ms == 0 {
                return Err(ConfigError::InvalidRateLimit(format!(
                    "max_requests and window_ms must be positive (got {} / {})",
                    limits.max_requests, limits.window_ms
                )));
            }
        }
        Ok(config)
    }

    /// Template root resolved against `base`.
    pub fn template_root(&self, base: &Path) -> PathBuf {
        base.join(&self.email_dir)
    }

    /// Builds the path mapper for a project rooted at `base`, writing
    /// generated artifacts under `output_base`.
    pub fn mapper(&self, base: &Path, output_base: &Path) -> PathMapper {
        PathMapper::new(
            self.template_root(base),
            output_base.join(&self.build_dir).join("email-wrappers"),
            output_base.join(&self.api_dir),
        )
        .with_route_prefix(&self.route_prefix)
    }

    pub fn layout_path(&self, base: &Path) -> PathBuf {
        base.join(&self.layout_component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = MailgenConfig::from_yaml("{}").unwrap();
        assert_eq!(config.email_dir, "emails");
        assert_eq!(config.route_prefix, "/__emails");
        assert_eq!(config.api_key, ApiKeySetting::Enabled(true));
        assert_eq!(
            config.rate_limit.resolve(),
            Some(RateLimitSettings {
                max_requests: 10,
                window_ms: 60_000
            })
        );
        assert!(config.manifest);
        assert_eq!(config.watch.debounce_ms, 500);
    }

    #[test]
    fn test_disabled_flags() {
        let config = MailgenConfig::from_yaml("api_key: false\nrate_limit: false\n").unwrap();
        assert_eq!(config.api_key.resolve(), AuthPolicy::Disabled);
        assert_eq!(config.rate_limit.resolve(), None);
    }

    #[test]
    fn test_explicit_values() {
        let yaml = r#"
email_dir: app/emails
api_key: secret
rate_limit:
  max_requests: 3
  window_ms: 1000
send_handler:
  command: ./send.sh
  args: ["--dry"]
"#;
        let config = MailgenConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.email_dir, "app/emails");
        assert_eq!(config.api_key.resolve(), AuthPolicy::Key("secret".to_string()));
        assert_eq!(
            config.rate_limit.resolve(),
            Some(RateLimitSettings {
                max_requests: 3,
                window_ms: 1000
            })
        );
        let handler = config.send_handler.unwrap();
        assert_eq!(handler.command, "./send.sh");
        assert_eq!(handler.args, vec!["--dry".to_string()]);
    }

    #[test]
    fn test_generated_key_when_absent() {
        let config = MailgenConfig::default();
        match config.api_key.resolve() {
            AuthPolicy::Key(key) => assert!(!key.is_empty()),
            AuthPolicy::Disabled => panic!("expected a generated key"),
        }
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let yaml = "rate_limit:\n  max_requests: 0\n  window_ms: 1000\n";
        assert!(matches!(
            MailgenConfig::from_yaml(yaml),
            Err(ConfigError::InvalidRateLimit(_))
        ));
    }

    #[test]
    fn test_mapper_roots() {
        let config = MailgenConfig::default();
        let mapper = config.mapper(Path::new("/app"), Path::new("/out"));
        assert_eq!(mapper.template_root(), Path::new("/app/emails"));
        assert_eq!(mapper.wrapper_root(), Path::new("/out/.nuxt/email-wrappers"));
        assert_eq!(mapper.api_root(), Path::new("/out/server/api/emails"));
    }
}
