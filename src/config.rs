//! Runtime configuration.
//!
//! Client id and secret are normally baked in at build time (`option_env!`), the
//! way a distributed plug-in ships its OAuth app registration. Environment
//! variables (or a `.env` file) override them for development.

use std::env;
use url::Url;

use crate::error::ConfigError;

/// Redirect target for the paste-the-code-back flow (no local listener).
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
pub const DEFAULT_SETTINGS_PATH: &str = "axosoft_settings";

const BUILD_CLIENT_ID: Option<&str> = option_env!("AXOSOFT_CLIENT_ID");
const BUILD_CLIENT_SECRET: Option<&str> = option_env!("AXOSOFT_CLIENT_SECRET");

#[derive(Clone)]
pub struct AppConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Fallback domain when none is stored in settings yet.
    pub domain: Option<String>,
    pub redirect_uri: String,
    pub settings_path: String,
    /// Replaces `https://{domain}/` (self-hosted installs, tests).
    pub api_base: Option<Url>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &crate::mask_token(&self.client_secret))
            .field("domain", &self.domain)
            .field("redirect_uri", &self.redirect_uri)
            .field("settings_path", &self.settings_path)
            .field("api_base", &self.api_base.as_ref().map(Url::as_str))
            .finish()
    }
}

impl AppConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            domain: None,
            redirect_uri: OOB_REDIRECT_URI.to_string(),
            settings_path: DEFAULT_SETTINGS_PATH.to_string(),
            api_base: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_api_base(mut self, base: Url) -> Self {
        self.api_base = Some(base);
        self
    }

    /// Load configuration from the process environment (after reading `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        // .env is optional; a missing file is not an error
        let _ = dotenvy::dotenv();
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |var: &'static str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let client_id = read("AXOSOFT_CLIENT_ID")
            .or_else(|| BUILD_CLIENT_ID.map(str::to_string))
            .ok_or(ConfigError::Missing("AXOSOFT_CLIENT_ID"))?;
        let client_secret = read("AXOSOFT_CLIENT_SECRET")
            .or_else(|| BUILD_CLIENT_SECRET.map(str::to_string))
            .ok_or(ConfigError::Missing("AXOSOFT_CLIENT_SECRET"))?;

        let api_base = match read("AXOSOFT_API_BASE") {
            Some(raw) => Some(Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                var: "AXOSOFT_API_BASE",
                reason: e.to_string(),
            })?),
            None => None,
        };

        Ok(Self {
            client_id,
            client_secret,
            domain: read("AXOSOFT_DOMAIN"),
            redirect_uri: read("AXOSOFT_REDIRECT_URI")
                .unwrap_or_else(|| OOB_REDIRECT_URI.to_string()),
            settings_path: read("AXOSOFT_SETTINGS_PATH")
                .unwrap_or_else(|| DEFAULT_SETTINGS_PATH.to_string()),
            api_base,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let map: HashMap<&'static str, String> =
            pairs.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn reads_values_and_applies_defaults() {
        let config = AppConfig::from_lookup(lookup(&[
            ("AXOSOFT_CLIENT_ID", "client-1"),
            ("AXOSOFT_CLIENT_SECRET", "secret-1"),
            ("AXOSOFT_DOMAIN", "acme.axosoft.com"),
        ]))
        .expect("config");

        assert_eq!(config.client_id, "client-1");
        assert_eq!(config.domain.as_deref(), Some("acme.axosoft.com"));
        assert_eq!(config.redirect_uri, OOB_REDIRECT_URI);
        assert_eq!(config.settings_path, DEFAULT_SETTINGS_PATH);
        assert!(config.api_base.is_none());
    }

    #[test]
    fn rejects_unparseable_api_base() {
        let err = AppConfig::from_lookup(lookup(&[
            ("AXOSOFT_CLIENT_ID", "client-1"),
            ("AXOSOFT_CLIENT_SECRET", "secret-1"),
            ("AXOSOFT_API_BASE", "not a url"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "AXOSOFT_API_BASE", .. }));
    }

    #[test]
    fn debug_output_masks_secret() {
        let config = AppConfig::new("client-1", "super-secret-value-123");
        let printed = format!("{config:?}");
        assert!(!printed.contains("super-secret-value-123"));
    }
}
