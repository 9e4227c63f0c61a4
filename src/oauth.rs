//! OAuth2 authorization-code flow against an Axosoft site.
//!
//! The host cannot run a redirect listener, so the flow is split in two:
//! `begin_authorization` builds the URL the user opens in a browser, and
//! `complete_authorization` exchanges the code they paste back for a token.
//! Persisting the token is the caller's job (see `CredentialStore::save`).

use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::credentials::{CredentialStore, Credentials};
use crate::endpoints::Endpoints;
use crate::error::{ApiError, ApiResult};
use crate::security::{mask_token, sanitize_body_snippet};
use crate::settings::SettingsStore;
use crate::transport::{ApiRequest, Transport};

pub const DEFAULT_SCOPE: &str = "read write";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    /// Authorization URL handed out, waiting for the user to paste a code.
    PendingCode,
    Authenticated,
}

#[derive(Debug, Clone)]
pub struct Authorizer {
    state: AuthState,
    api_base: Option<Url>,
    scope: String,
}

impl Authorizer {
    pub fn new(credentials: &Credentials) -> Self {
        let state = if credentials.has_token() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        };
        Self {
            state,
            api_base: None,
            scope: DEFAULT_SCOPE.to_string(),
        }
    }

    pub fn with_api_base(mut self, base: Option<Url>) -> Self {
        self.api_base = base;
        self
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Token presence only. A stale token is discovered on the first API call
    /// that comes back 401.
    pub fn is_authenticated(&self, credentials: &Credentials) -> bool {
        credentials.has_token()
    }

    fn endpoints(&self, credentials: &Credentials) -> ApiResult<Endpoints> {
        match &self.api_base {
            Some(base) => Ok(Endpoints::from_root(base.clone())),
            None => Endpoints::for_domain(&credentials.domain),
        }
    }

    /// Authorization page URL for `redirect_uri`. Pure: no state changes.
    pub fn begin_authorization(
        &self,
        credentials: &Credentials,
        redirect_uri: &str,
    ) -> ApiResult<Url> {
        let mut url = self.endpoints(credentials)?.authorize()?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &credentials.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &self.scope)
            .append_pair("expiring", "false");
        Ok(url)
    }

    /// `begin_authorization` plus the move to `PendingCode`.
    pub fn request_authorization(
        &mut self,
        credentials: &Credentials,
        redirect_uri: &str,
    ) -> ApiResult<Url> {
        let url = self.begin_authorization(credentials, redirect_uri)?;
        if self.state == AuthState::Unauthenticated {
            self.state = AuthState::PendingCode;
        }
        tracing::info!(domain = %credentials.domain, "authorization requested");
        Ok(url)
    }

    /// Exchange a one-time code for an access token. Credentials are not
    /// touched; on failure the authorizer keeps its previous state.
    pub fn complete_authorization<T: Transport>(
        &mut self,
        transport: &T,
        credentials: &Credentials,
        code: &str,
        redirect_uri: &str,
    ) -> ApiResult<String> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ApiError::AuthExchangeFailed("empty authorization code".to_string()));
        }

        let request = ApiRequest::new(Method::GET, self.endpoints(credentials)?.token()?)
            .query("grant_type", "authorization_code")
            .query("code", code)
            .query("redirect_uri", redirect_uri)
            .query("client_id", credentials.client_id.as_str())
            .query("client_secret", credentials.client_secret.as_str());

        let response = transport.send(&request)?;
        let token = parse_token_response(response.status, &response.body)?;

        self.state = AuthState::Authenticated;
        tracing::info!(token = %mask_token(&token), "authorization code exchanged");
        Ok(token)
    }

    /// Put back a state captured before `complete_authorization`, for callers
    /// whose follow-up step (persisting the token) failed.
    pub fn restore_state(&mut self, state: AuthState) {
        self.state = state;
    }

    /// Drop the in-memory token. No revocation call is made to the server.
    pub fn log_out<S: SettingsStore>(&mut self, store: &mut CredentialStore<S>) {
        store.forget_token();
        self.state = AuthState::Unauthenticated;
        tracing::info!("logged out");
    }
}

fn parse_token_response(status: u16, body: &str) -> ApiResult<String> {
    let rejected = |detail: String| {
        ApiError::AuthExchangeFailed(format!(
            "status={status} {detail} body={}",
            sanitize_body_snippet(body)
        ))
    };

    if !(200..300).contains(&status) {
        let (code, message) = parse_oauth_error_details(body);
        let detail = [code, message].into_iter().flatten().collect::<Vec<_>>().join(": ");
        return Err(rejected(detail));
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|e| rejected(format!("token response json invalid: {e}")))?;

    if let (Some(code), message) = parse_oauth_error_details(body) {
        return Err(rejected(format!("{code}: {}", message.unwrap_or_default())));
    }

    value
        .get("access_token")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| rejected("token response missing access_token".to_string()))
}

fn parse_oauth_error_details(body: &str) -> (Option<String>, Option<String>) {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return (None, None),
    };

    let code = value
        .get("error")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    let message = ["error_description", "message"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    (code, message)
}
