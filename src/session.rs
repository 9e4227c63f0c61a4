//! Session context handed to the command layer.
//!
//! Bundles the credential store, the authorizer and the resource client into one
//! explicitly passed value. Every operation that talks to the API checks for a
//! token first and returns `Unauthenticated` instead of sending anything.

use serde_json::Value;
use url::Url;

use crate::browser::BrowserLauncher;
use crate::client::{data_as, envelope_data, CreateOutcome, DeleteOutcome, ResourceClient};
use crate::config::AppConfig;
use crate::credentials::{CredentialStore, Credentials};
use crate::endpoints::Endpoints;
use crate::error::{ApiError, ApiResult, WORK_LOG_DURATION_FIELD};
use crate::models::{
    CurrentUser, ItemQuery, ItemType, NewItem, Project, Resource, ResourceItem, WorkLogEntry,
};
use crate::oauth::{AuthState, Authorizer};
use crate::settings::SettingsStore;
use crate::transport::Transport;

pub struct AxosoftSession<S, T, B> {
    store: CredentialStore<S>,
    authorizer: Authorizer,
    client: ResourceClient<T>,
    browser: B,
    api_base: Option<Url>,
}

impl<S, T, B> AxosoftSession<S, T, B>
where
    S: SettingsStore,
    T: Transport,
    B: BrowserLauncher,
{
    pub fn new(config: &AppConfig, settings: S, transport: T, browser: B) -> ApiResult<Self> {
        let store = CredentialStore::load(config, settings)?;
        let authorizer =
            Authorizer::new(store.credentials()).with_api_base(config.api_base.clone());
        let client = ResourceClient::new(transport).with_api_base(config.api_base.clone());
        Ok(Self {
            store,
            authorizer,
            client,
            browser,
            api_base: config.api_base.clone(),
        })
    }

    pub fn credentials(&self) -> &Credentials {
        self.store.credentials()
    }

    pub fn store(&self) -> &CredentialStore<S> {
        &self.store
    }

    pub fn client(&self) -> &ResourceClient<T> {
        &self.client
    }

    pub fn auth_state(&self) -> AuthState {
        if self.is_authenticated() {
            AuthState::Authenticated
        } else {
            self.authorizer.state()
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authorizer.is_authenticated(self.store.credentials())
    }

    fn authenticated(&self) -> ApiResult<&Credentials> {
        let credentials = self.store.credentials();
        if self.authorizer.is_authenticated(credentials) {
            Ok(credentials)
        } else {
            Err(ApiError::Unauthenticated(
                "no access token; log in first".to_string(),
            ))
        }
    }

    pub fn set_domain(&mut self, domain: &str) -> ApiResult<()> {
        self.store.set_domain(domain)
    }

    // --- authentication ---

    /// Build the authorization URL and try to open it. The URL is returned
    /// either way so the caller can show it when no browser is available.
    pub fn begin_login(&mut self) -> ApiResult<Url> {
        let redirect_uri = self.store.credentials().redirect_uri.clone();
        let url = self
            .authorizer
            .request_authorization(self.store.credentials(), &redirect_uri)?;
        if let Err(err) = self.browser.open(url.as_str()) {
            tracing::warn!(error = %err, "could not launch browser for authorization");
        }
        Ok(url)
    }

    /// Exchange the pasted code and persist the resulting token. If the token
    /// cannot be persisted the authorizer goes back to its previous state.
    pub fn finish_login(&mut self, code: &str) -> ApiResult<()> {
        let redirect_uri = self.store.credentials().redirect_uri.clone();
        let previous = self.authorizer.state();
        let token = self.authorizer.complete_authorization(
            self.client.transport(),
            self.store.credentials(),
            code,
            &redirect_uri,
        )?;
        if let Err(err) = self.store.save(&token) {
            self.authorizer.restore_state(previous);
            return Err(err);
        }
        Ok(())
    }

    /// Erase the stored token and reset local state. The server is not told.
    pub fn log_out(&mut self) -> ApiResult<()> {
        let cleared = self.store.clear();
        if !self.store.credentials().has_token() {
            self.authorizer.log_out(&mut self.store);
        }
        cleared
    }

    // --- reads ---

    pub fn me(&self) -> ApiResult<CurrentUser> {
        let credentials = self.authenticated()?;
        data_as(self.client.get(credentials, Resource::Me, None, None)?)
    }

    pub fn projects(&self) -> ApiResult<Vec<Project>> {
        let credentials = self.authenticated()?;
        let body = self.client.get(credentials, Resource::Projects, None, None)?;
        data_as(body)
    }

    pub fn current_project(&self) -> ApiResult<Option<Value>> {
        self.store.project_id()
    }

    pub fn set_project(&mut self, project_id: i64) -> ApiResult<()> {
        self.store.set_project(project_id)?;
        tracing::info!(project_id, "current project set");
        Ok(())
    }

    pub fn items(&self, item_type: ItemType, query: &ItemQuery) -> ApiResult<Vec<ResourceItem>> {
        let credentials = self.authenticated()?;
        self.client
            .list(credentials, item_type.into(), Some(query))?
            .into_iter()
            .map(|raw| {
                serde_json::from_value(raw)
                    .map_err(|e| ApiError::InvalidResponse(format!("malformed {item_type}: {e}")))
            })
            .collect()
    }

    /// Items assigned to the logged-in user.
    pub fn my_items(&self, item_type: ItemType) -> ApiResult<Vec<ResourceItem>> {
        let me = self.me()?;
        self.items(item_type, &ItemQuery::assigned_to(me.id))
    }

    pub fn search_items(&self, item_type: ItemType, text: &str) -> ApiResult<Vec<ResourceItem>> {
        self.items(item_type, &ItemQuery::search(text.trim()))
    }

    pub fn item(&self, item_type: ItemType, id: i64) -> ApiResult<ResourceItem> {
        let credentials = self.authenticated()?;
        data_as(self.client.get(credentials, item_type.into(), Some(id), None)?)
    }

    // --- writes ---

    /// Create an item in the current project. Without a current project this
    /// returns `SetProjectFirst` and sends nothing.
    pub fn create_item(&self, item_type: ItemType, new_item: &NewItem) -> ApiResult<CreateOutcome> {
        let credentials = self.authenticated()?;
        let project_id = self.store.project_id()?.ok_or(ApiError::SetProjectFirst)?;

        let outcome = self.client.create(
            credentials,
            item_type.into(),
            &new_item.to_payload(&project_id),
        )?;
        if let CreateOutcome::PartialFailureWithData { message, .. } = &outcome {
            tracing::warn!(%item_type, id = ?outcome.id(), %message, "item created with warnings");
        }
        Ok(outcome)
    }

    /// Log `duration` hours against `item`, stamped with the local time.
    pub fn log_time(
        &self,
        item: &ResourceItem,
        duration: &str,
        description: &str,
    ) -> ApiResult<CreateOutcome> {
        let credentials = self.authenticated()?;
        let me = self.me()?;
        let entry = WorkLogEntry {
            user_id: me.id,
            item_id: item.id,
            item_type: item.item_type.clone(),
            duration: duration.trim().to_string(),
            description: description.to_string(),
            timestamp: chrono::Local::now().to_rfc3339(),
        };
        self.client
            .create(credentials, Resource::WorkLogs, &entry.to_payload())
            .map_err(|err| match err {
                // unnamed work-log rejections are about the duration
                ApiError::ValueRejected {
                    field: None,
                    message,
                } => ApiError::ValueRejected {
                    field: Some(WORK_LOG_DURATION_FIELD.to_string()),
                    message,
                },
                other => other,
            })
    }

    pub fn delete_item(&self, item: &ResourceItem) -> ApiResult<DeleteOutcome> {
        let credentials = self.authenticated()?;
        let resource = resource_for(&item.item_type)?;
        self.client.delete(credentials, resource, item.id)
    }

    /// Send an edited item (JSON text) back to the server.
    pub fn save_item(&self, edited: &str) -> ApiResult<Value> {
        let credentials = self.authenticated()?;
        let content: Value = serde_json::from_str(edited)
            .map_err(|e| ApiError::InvalidItem(format!("not valid json: {e}")))?;
        let id = content
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| ApiError::InvalidItem("missing numeric `id`".to_string()))?;
        let item_type = content
            .get("item_type")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::InvalidItem("missing `item_type`".to_string()))?;
        let resource = resource_for(item_type)?;

        let payload = serde_json::json!({ "item": content });
        let updated = self.client.update(credentials, resource, id, &payload)?;
        Ok(envelope_data(updated))
    }

    // --- links ---

    pub fn item_url(&self, item: &ResourceItem) -> ApiResult<Url> {
        let endpoints = match &self.api_base {
            Some(base) => Endpoints::from_root(base.clone()),
            None => Endpoints::for_domain(&self.store.credentials().domain)?,
        };
        endpoints.view_item(item.id, &item.item_type)
    }

    pub fn open_in_browser(&self, item: &ResourceItem) -> ApiResult<Url> {
        let url = self.item_url(item)?;
        self.browser.open(url.as_str())?;
        Ok(url)
    }
}

fn resource_for(item_type: &str) -> ApiResult<Resource> {
    item_type
        .parse::<ItemType>()
        .map(Resource::from)
        .map_err(ApiError::InvalidItem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{MemorySettings, ACCESS_TOKEN_KEY, PROJECT_KEY};
    use crate::transport::testing::StubTransport;
    use serde_json::json;
    use std::cell::RefCell;
    use std::io;

    #[derive(Default)]
    struct RecordingBrowser {
        opened: RefCell<Vec<String>>,
    }

    impl BrowserLauncher for &RecordingBrowser {
        fn open(&self, url: &str) -> io::Result<()> {
            self.opened.borrow_mut().push(url.to_string());
            Ok(())
        }
    }

    fn config() -> AppConfig {
        AppConfig::new("client-1", "secret-1").with_domain("acme.axosoft.com")
    }

    fn session<'a>(
        settings: MemorySettings,
        transport: StubTransport,
        browser: &'a RecordingBrowser,
    ) -> AxosoftSession<MemorySettings, StubTransport, &'a RecordingBrowser> {
        AxosoftSession::new(&config(), settings, transport, browser).unwrap()
    }

    fn item(id: i64, item_type: &str) -> ResourceItem {
        serde_json::from_value(json!({"id": id, "item_type": item_type, "name": "Thing"})).unwrap()
    }

    #[test]
    fn login_flow_persists_token() {
        let browser = RecordingBrowser::default();
        let transport = StubTransport::new().respond(200, json!({"access_token": "new-token"}));
        let mut session = session(MemorySettings::new(), transport, &browser);

        assert_eq!(session.auth_state(), AuthState::Unauthenticated);
        let url = session.begin_login().unwrap();
        assert_eq!(session.auth_state(), AuthState::PendingCode);
        assert_eq!(browser.opened.borrow().as_slice(), &[url.to_string()]);

        session.finish_login("the-code").unwrap();
        assert!(session.is_authenticated());
        assert_eq!(
            session.store().settings().get_string(ACCESS_TOKEN_KEY).unwrap().as_deref(),
            Some("new-token")
        );
    }

    #[test]
    fn failed_exchange_keeps_session_unauthenticated() {
        let browser = RecordingBrowser::default();
        let transport = StubTransport::new().respond(401, json!({"error": "invalid_grant"}));
        let mut session = session(MemorySettings::new(), transport, &browser);

        let err = session.finish_login("bad").unwrap_err();
        assert!(matches!(err, ApiError::AuthExchangeFailed(_)));
        assert!(!session.is_authenticated());
        assert!(!session.store().settings().has(ACCESS_TOKEN_KEY).unwrap());
    }

    #[test]
    fn log_out_erases_token_and_flushes() {
        let browser = RecordingBrowser::default();
        let settings = MemorySettings::with(&[(ACCESS_TOKEN_KEY, json!("tok"))]);
        let mut session = session(settings, StubTransport::new(), &browser);
        assert!(session.is_authenticated());

        session.log_out().unwrap();

        assert!(!session.is_authenticated());
        assert!(!session.store().settings().has(ACCESS_TOKEN_KEY).unwrap());
        assert_eq!(session.store().settings().save_count(), 1);
        assert_eq!(session.client().transport().calls(), 0);
    }

    #[test]
    fn unpersisted_token_rolls_back_login() {
        let browser = RecordingBrowser::default();
        let transport = StubTransport::new().respond(200, json!({"access_token": "new-token"}));
        let mut session = session(MemorySettings::new().read_only(), transport, &browser);
        session.begin_login().unwrap();

        let err = session.finish_login("the-code").unwrap_err();

        assert!(matches!(err, ApiError::Settings(_)));
        assert!(!session.is_authenticated());
        assert_eq!(session.auth_state(), AuthState::PendingCode);
        assert!(!session.store().settings().has(ACCESS_TOKEN_KEY).unwrap());
    }

    #[test]
    fn failed_flush_on_log_out_leaves_no_token_anywhere() {
        let browser = RecordingBrowser::default();
        let settings = MemorySettings::with(&[(ACCESS_TOKEN_KEY, json!("tok"))]).read_only();
        let mut session = session(settings, StubTransport::new(), &browser);

        assert!(session.log_out().is_err());

        assert!(!session.is_authenticated());
        assert_eq!(session.auth_state(), AuthState::Unauthenticated);
        assert!(!session.store().settings().has(ACCESS_TOKEN_KEY).unwrap());
    }

    #[test]
    fn create_without_project_short_circuits() {
        let browser = RecordingBrowser::default();
        let settings = MemorySettings::with(&[(ACCESS_TOKEN_KEY, json!("tok"))]);
        let session = session(settings, StubTransport::new(), &browser);
        let new_item = NewItem {
            name: "Title".to_string(),
            description: "Desc".to_string(),
            estimate_hours: "2".to_string(),
        };

        let err = session.create_item(ItemType::Features, &new_item).unwrap_err();

        assert!(matches!(err, ApiError::SetProjectFirst));
        assert_eq!(err.user_message(), "You must first set the current project");
        assert_eq!(session.client().transport().calls(), 0);
    }

    #[test]
    fn unauthenticated_operations_send_nothing() {
        let browser = RecordingBrowser::default();
        let settings = MemorySettings::with(&[(PROJECT_KEY, json!(3))]);
        let session = session(settings, StubTransport::new(), &browser);
        let new_item = NewItem {
            name: "Title".to_string(),
            description: String::new(),
            estimate_hours: "1".to_string(),
        };

        assert!(session.me().unwrap_err().needs_reauth());
        assert!(session.my_items(ItemType::Tasks).unwrap_err().needs_reauth());
        assert!(session.create_item(ItemType::Tasks, &new_item).unwrap_err().needs_reauth());
        assert!(session.log_time(&item(1, "tasks"), "1", "x").unwrap_err().needs_reauth());
        assert!(session.delete_item(&item(1, "tasks")).unwrap_err().needs_reauth());
        assert!(session.save_item(r#"{"id":1,"item_type":"tasks"}"#).unwrap_err().needs_reauth());
        assert_eq!(session.client().transport().calls(), 0);
    }

    #[test]
    fn create_item_uses_stored_project() {
        let browser = RecordingBrowser::default();
        let settings = MemorySettings::with(&[
            (ACCESS_TOKEN_KEY, json!("tok")),
            (PROJECT_KEY, json!(17)),
        ]);
        let transport = StubTransport::new().respond(
            200,
            json!({
                "error": "partial",
                "data": {"id": 501, "item_type": "features", "name": "Title"}
            }),
        );
        let session = session(settings, transport, &browser);
        let new_item = NewItem {
            name: "Title".to_string(),
            description: "Desc".to_string(),
            estimate_hours: "2".to_string(),
        };

        let outcome = session.create_item(ItemType::Features, &new_item).unwrap();

        assert!(matches!(outcome, CreateOutcome::PartialFailureWithData { .. }));
        assert_eq!(outcome.id(), Some(501));
        let sent = session.client().transport().request(0);
        assert_eq!(sent.url.path(), "/api/v1/features");
        assert_eq!(sent.body.unwrap()["item"]["project"]["id"], 17);
    }

    #[test]
    fn log_time_posts_work_log_for_current_user() {
        let browser = RecordingBrowser::default();
        let settings = MemorySettings::with(&[(ACCESS_TOKEN_KEY, json!("tok"))]);
        let transport = StubTransport::new()
            .respond(200, json!({"data": {"id": 42, "first_name": "Ada", "last_name": "L"}}))
            .respond(200, json!({"data": {"id": 900}}));
        let session = session(settings, transport, &browser);

        let outcome = session.log_time(&item(7, "defects"), " 1.25 ", "triage").unwrap();

        assert_eq!(outcome.id(), Some(900));
        let sent = session.client().transport().request(1);
        assert_eq!(sent.url.path(), "/api/v1/work_logs");
        let body = sent.body.unwrap();
        assert_eq!(body["user"]["id"], 42);
        assert_eq!(body["item"]["id"], 7);
        assert_eq!(body["item"]["item_type"], "defects");
        assert_eq!(body["work_done"]["duration"], "1.25");
        let stamp = body["date_time"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
    }

    #[test]
    fn rejected_estimate_does_not_mention_time_logging() {
        let browser = RecordingBrowser::default();
        let settings = MemorySettings::with(&[
            (ACCESS_TOKEN_KEY, json!("tok")),
            (PROJECT_KEY, json!(17)),
        ]);
        let transport = StubTransport::new().respond(
            400,
            json!({
                "error": "invalid_request",
                "error_description": "estimated_duration must be numeric"
            }),
        );
        let session = session(settings, transport, &browser);
        let new_item = NewItem {
            name: "Title".to_string(),
            description: String::new(),
            estimate_hours: "abc".to_string(),
        };

        let err = session.create_item(ItemType::Features, &new_item).unwrap_err();

        assert!(matches!(err, ApiError::ValueRejected { .. }));
        assert!(!err.user_message().contains("Unable to log time"));
        assert!(err.user_message().contains("estimated_duration must be numeric"));
    }

    #[test]
    fn rejected_work_log_gets_time_message() {
        let browser = RecordingBrowser::default();
        let settings = MemorySettings::with(&[(ACCESS_TOKEN_KEY, json!("tok"))]);
        let transport = StubTransport::new()
            .respond(200, json!({"data": {"id": 42, "first_name": "Ada", "last_name": "L"}}))
            .respond(400, json!({"error": "invalid_request", "message": "bad value"}));
        let session = session(settings, transport, &browser);

        let err = session.log_time(&item(7, "defects"), "abc", "").unwrap_err();

        assert!(matches!(
            err,
            ApiError::ValueRejected { ref field, .. }
                if field.as_deref() == Some(WORK_LOG_DURATION_FIELD)
        ));
        assert!(err.user_message().contains("enter only a number"));
    }

    #[test]
    fn save_item_wraps_edited_json() {
        let browser = RecordingBrowser::default();
        let settings = MemorySettings::with(&[(ACCESS_TOKEN_KEY, json!("tok"))]);
        let transport = StubTransport::new()
            .respond(200, json!({"data": {"id": 12, "item_type": "incidents", "name": "Edited"}}));
        let session = session(settings, transport, &browser);

        let saved = session
            .save_item(r#"{"id": 12, "item_type": "incidents", "name": "Edited"}"#)
            .unwrap();

        assert_eq!(saved["name"], "Edited");
        let sent = session.client().transport().request(0);
        assert_eq!(sent.url.path(), "/api/v1/incidents/12");
        assert_eq!(sent.body.unwrap()["item"]["name"], "Edited");
    }

    #[test]
    fn save_item_rejects_broken_json_locally() {
        let browser = RecordingBrowser::default();
        let settings = MemorySettings::with(&[(ACCESS_TOKEN_KEY, json!("tok"))]);
        let session = session(settings, StubTransport::new(), &browser);

        assert!(matches!(
            session.save_item("{not json"),
            Err(ApiError::InvalidItem(_))
        ));
        assert!(matches!(
            session.save_item(r#"{"name": "no id"}"#),
            Err(ApiError::InvalidItem(_))
        ));
        assert_eq!(session.client().transport().calls(), 0);
    }

    #[test]
    fn open_in_browser_uses_view_item_link() {
        let browser = RecordingBrowser::default();
        let session = session(MemorySettings::new(), StubTransport::new(), &browser);

        let url = session.open_in_browser(&item(44, "features")).unwrap();

        assert_eq!(url.as_str(), "https://acme.axosoft.com/viewitem.aspx?id=44&type=features");
        assert_eq!(browser.opened.borrow().as_slice(), &[url.to_string()]);
    }
}
