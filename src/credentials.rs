//! Credential store: OAuth app registration, domain, and the bearer token.
//!
//! The in-memory `Credentials` value is the only copy the process works from;
//! the settings store is written through on `save`/`clear`.

use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::security::mask_token;
use crate::settings::{SettingsStore, ACCESS_TOKEN_KEY, DOMAIN_KEY, PROJECT_KEY};

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub domain: String,
    pub access_token: Option<String>,
    pub redirect_uri: String,
}

impl Credentials {
    /// Session predicate: a non-blank access token is present.
    pub fn has_token(&self) -> bool {
        self.token().is_some()
    }

    pub fn token(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &mask_token(&self.client_secret))
            .field("domain", &self.domain)
            .field("access_token", &self.access_token.as_deref().map(mask_token))
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

pub struct CredentialStore<S> {
    settings: S,
    credentials: Credentials,
}

impl<S: SettingsStore> CredentialStore<S> {
    /// Build credentials from config plus persisted settings. A missing token is
    /// the unauthenticated state, not an error.
    pub fn load(config: &AppConfig, settings: S) -> Result<Self, ApiError> {
        let domain = settings
            .get_string(DOMAIN_KEY)?
            .or_else(|| config.domain.clone())
            .unwrap_or_default();
        let access_token = settings.get_string(ACCESS_TOKEN_KEY)?;

        let credentials = Credentials {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            domain,
            access_token,
            redirect_uri: config.redirect_uri.clone(),
        };
        tracing::debug!(
            domain = %credentials.domain,
            authenticated = credentials.has_token(),
            "credentials loaded"
        );

        Ok(Self {
            settings,
            credentials,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn settings(&self) -> &S {
        &self.settings
    }

    /// Persist a new access token, replacing any previous one. If the flush
    /// fails the previous value is put back and the in-memory token is kept.
    pub fn save(&mut self, token: &str) -> Result<(), ApiError> {
        let previous = self.settings.get(ACCESS_TOKEN_KEY)?;
        self.settings.set(ACCESS_TOKEN_KEY, json!(token))?;
        if let Err(err) = self.settings.save() {
            let restored = match previous {
                Some(value) => self.settings.set(ACCESS_TOKEN_KEY, value),
                None => self.settings.erase(ACCESS_TOKEN_KEY),
            };
            if let Err(restore_err) = restored {
                tracing::warn!(error = %restore_err, "could not restore previous access token");
            }
            return Err(err.into());
        }
        self.credentials.access_token = Some(token.to_string());
        Ok(())
    }

    /// Erase the persisted token. Client id/secret and domain are untouched.
    /// Once the key is erased the in-memory token goes too, even if the flush
    /// afterwards fails.
    pub fn clear(&mut self) -> Result<(), ApiError> {
        self.settings.erase(ACCESS_TOKEN_KEY)?;
        self.credentials.access_token = None;
        self.settings.save()?;
        Ok(())
    }

    /// Drop the in-memory token only; persisted settings are left alone.
    pub fn forget_token(&mut self) {
        self.credentials.access_token = None;
    }

    pub fn set_domain(&mut self, domain: &str) -> Result<(), ApiError> {
        let domain = domain.trim();
        self.settings.set(DOMAIN_KEY, json!(domain))?;
        self.settings.save()?;
        self.credentials.domain = domain.to_string();
        Ok(())
    }

    /// Current project id as stored (number or string, as the API returned it).
    pub fn project_id(&self) -> Result<Option<Value>, ApiError> {
        Ok(self.settings.get(PROJECT_KEY)?.filter(|v| !v.is_null()))
    }

    pub fn set_project(&mut self, project_id: i64) -> Result<(), ApiError> {
        self.settings.set(PROJECT_KEY, json!(project_id))?;
        self.settings.save()?;
        Ok(())
    }
}
