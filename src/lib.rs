//! axosoft_client: Axosoft issue-tracker client
//!
//! Core of an editor integration for the Axosoft REST API:
//! OAuth2 authorization-code login, a credential store persisted through a
//! settings backend (sled), and a blocking REST client for the work-item
//! collections (features, defects, incidents, tasks) plus work logs.
//!
//! UI concerns (menus, input wizards, item views) live in the host; they drive
//! this crate through `AxosoftSession` and react to the `ApiError` it returns.

pub mod browser;
pub mod client;
pub mod config;
pub mod credentials;
pub mod endpoints;
pub mod error;
pub mod logging;
pub mod models;
pub mod oauth;
pub mod security;
// Session context for the command layer (replaces a process-wide shared client)
pub mod session;
pub mod settings;
pub mod transport;

pub use client::{CreateOutcome, DeleteOutcome, ResourceClient};
pub use config::AppConfig;
pub use credentials::{CredentialStore, Credentials};
pub use error::{ApiError, ApiResult};
pub use models::{ItemQuery, ItemType, Resource, ResourceItem};
pub use oauth::{AuthState, Authorizer};
pub use security::mask_token;
pub use session::AxosoftSession;
pub use settings::{MemorySettings, SettingsStore, SledSettings};
pub use transport::{HttpTransport, Transport};
