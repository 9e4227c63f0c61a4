//! URL layout of an Axosoft installation.
//!
//! Everything hangs off the site root `https://{domain}/`:
//! - `auth` for the browser authorization page
//! - `api/oauth2/token` for the code exchange
//! - `api/v1/{resource}[/{id}]` for the REST collections
//! - `viewitem.aspx?id=..&type=..` for opening an item in the web UI

use url::Url;

use crate::error::ApiError;
use crate::models::Resource;

pub const API_PREFIX: &str = "api/v1/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    root: Url,
}

impl Endpoints {
    pub fn for_domain(domain: &str) -> Result<Self, ApiError> {
        let domain = domain.trim().trim_end_matches('/');
        if domain.is_empty() {
            return Err(ApiError::Config(crate::error::ConfigError::Missing(
                "AXOSOFT_DOMAIN",
            )));
        }
        let root = Url::parse(&format!("https://{domain}/")).map_err(|e| {
            ApiError::Config(crate::error::ConfigError::Invalid {
                var: "AXOSOFT_DOMAIN",
                reason: e.to_string(),
            })
        })?;
        Ok(Self { root })
    }

    /// Use an explicit site root (scheme, host, optional port and path).
    pub fn from_root(mut root: Url) -> Self {
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }
        Self { root }
    }

    pub fn root(&self) -> &Url {
        &self.root
    }

    fn join(&self, path: &str) -> Result<Url, ApiError> {
        self.root
            .join(path)
            .map_err(|e| ApiError::InvalidResponse(format!("bad url `{path}`: {e}")))
    }

    pub fn authorize(&self) -> Result<Url, ApiError> {
        self.join("auth")
    }

    pub fn token(&self) -> Result<Url, ApiError> {
        self.join("api/oauth2/token")
    }

    pub fn resource(&self, resource: Resource, id: Option<i64>) -> Result<Url, ApiError> {
        match id {
            Some(id) => self.join(&format!("{API_PREFIX}{}/{id}", resource.path())),
            None => self.join(&format!("{API_PREFIX}{}", resource.path())),
        }
    }

    /// Web UI link for an item.
    pub fn view_item(&self, id: i64, item_type: &str) -> Result<Url, ApiError> {
        let mut url = self.join("viewitem.aspx")?;
        url.query_pairs_mut()
            .append_pair("id", &id.to_string())
            .append_pair("type", item_type);
        Ok(url)
    }
}
