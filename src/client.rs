//! REST resource client for the Axosoft API.
//!
//! Generic CRUD over named collections (`features`, `defects`, `work_logs`, ...):
//! - attaches `Authorization: Bearer <token>` from the caller's credentials
//! - refuses to send anything when no token is present
//! - maps non-2xx statuses and error payloads onto `ApiError`
//!
//! One attempt per call. A 401 is reported as `Unauthenticated` and the cached
//! token is left in place; re-authorizing is the caller's decision.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::credentials::Credentials;
use crate::endpoints::Endpoints;
use crate::error::{ApiError, ApiResult};
use crate::models::{ItemQuery, Resource};
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// Result of a create call that reached the server.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(Value),
    /// The API flagged the create as failed but still returned usable fields
    /// (typically a provisional id).
    PartialFailureWithData { data: Value, message: String },
}

impl CreateOutcome {
    /// Data the server returned, whichever way the create went.
    pub fn data(&self) -> &Value {
        match self {
            CreateOutcome::Created(data) => data,
            CreateOutcome::PartialFailureWithData { data, .. } => data,
        }
    }

    pub fn into_data(self) -> Value {
        match self {
            CreateOutcome::Created(data) => data,
            CreateOutcome::PartialFailureWithData { data, .. } => data,
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.data().get("id").and_then(Value::as_i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The server no longer knows the id (already deleted).
    AlreadyAbsent,
}

pub struct ResourceClient<T> {
    transport: T,
    api_base: Option<Url>,
}

impl<T: Transport> ResourceClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            api_base: None,
        }
    }

    pub fn with_api_base(mut self, base: Option<Url>) -> Self {
        self.api_base = base;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn endpoints(&self, credentials: &Credentials) -> ApiResult<Endpoints> {
        match &self.api_base {
            Some(base) => Ok(Endpoints::from_root(base.clone())),
            None => Endpoints::for_domain(&credentials.domain),
        }
    }

    /// Build an authenticated request, failing before any I/O when there is no token.
    fn request(
        &self,
        credentials: &Credentials,
        method: Method,
        resource: Resource,
        id: Option<i64>,
    ) -> ApiResult<ApiRequest> {
        let token = credentials.token().ok_or_else(|| {
            ApiError::Unauthenticated(format!("no access token for {method} {resource}"))
        })?;
        let url = self.endpoints(credentials)?.resource(resource, id)?;
        Ok(ApiRequest::new(method, url).bearer(token))
    }

    /// Fetch a collection (`id == None`, optional filters) or a single resource.
    pub fn get(
        &self,
        credentials: &Credentials,
        resource: Resource,
        id: Option<i64>,
        query: Option<&ItemQuery>,
    ) -> ApiResult<Value> {
        let mut request = self.request(credentials, Method::GET, resource, id)?;
        if id.is_none() {
            if let Some(query) = query {
                request.query = query.to_pairs();
            }
        }

        let response = self.transport.send(&request)?;
        if !response.is_success() {
            return Err(map_failure(resource, &response));
        }
        parse_body(resource, &response)
    }

    /// List endpoint with the `data` envelope removed.
    pub fn list(
        &self,
        credentials: &Credentials,
        resource: Resource,
        query: Option<&ItemQuery>,
    ) -> ApiResult<Vec<Value>> {
        let body = self.get(credentials, resource, None, query)?;
        match envelope_data(body) {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(ApiError::InvalidResponse(format!(
                "{resource} list is not an array: {}",
                crate::security::sanitize_body_snippet(&other.to_string())
            ))),
        }
    }

    /// POST a new resource. The response body decides success, not only the status.
    pub fn create(
        &self,
        credentials: &Credentials,
        resource: Resource,
        payload: &Value,
    ) -> ApiResult<CreateOutcome> {
        let request = self
            .request(credentials, Method::POST, resource, None)?
            .json(payload.clone());

        let response = self.transport.send(&request)?;
        if !response.is_success() {
            return Err(map_failure(resource, &response));
        }

        let body = parse_body(resource, &response)?;
        if let Some(message) = payload_error(&body) {
            let data = envelope_data(body);
            if data.get("id").is_some_and(|id| !id.is_null()) {
                tracing::warn!(%resource, %message, "create flagged as failed but returned data");
                return Ok(CreateOutcome::PartialFailureWithData { data, message });
            }
            tracing::warn!(%resource, %message, "create rejected");
            let field = error_field(&data)
                .or_else(|| error_field(&response.json().unwrap_or_default()));
            return Err(ApiError::ValueRejected { field, message });
        }

        tracing::info!(%resource, "resource created");
        Ok(CreateOutcome::Created(envelope_data(body)))
    }

    /// Update resource `id`. Axosoft takes updates as a POST to the item URL.
    pub fn update(
        &self,
        credentials: &Credentials,
        resource: Resource,
        id: i64,
        payload: &Value,
    ) -> ApiResult<Value> {
        let request = self
            .request(credentials, Method::POST, resource, Some(id))?
            .json(payload.clone());

        let response = self.transport.send(&request)?;
        if !response.is_success() {
            return Err(map_failure(resource, &response));
        }

        let body = parse_body(resource, &response)?;
        if let Some(message) = payload_error(&body) {
            return Err(ApiError::ValueRejected {
                field: error_field(&body),
                message,
            });
        }
        tracing::info!(%resource, id, "resource updated");
        Ok(envelope_data(body))
    }

    /// Delete resource `id`. A 404/410 means it is already gone and is not an error.
    pub fn delete(
        &self,
        credentials: &Credentials,
        resource: Resource,
        id: i64,
    ) -> ApiResult<DeleteOutcome> {
        let request = self.request(credentials, Method::DELETE, resource, Some(id))?;

        let response = self.transport.send(&request)?;
        match response.status {
            404 | 410 => {
                tracing::info!(%resource, id, "delete of missing resource treated as done");
                Ok(DeleteOutcome::AlreadyAbsent)
            }
            _ if response.is_success() => {
                tracing::info!(%resource, id, "resource deleted");
                Ok(DeleteOutcome::Deleted)
            }
            _ => Err(map_failure(resource, &response)),
        }
    }
}

/// Deserialize the `data` member of an API response.
pub fn data_as<D: DeserializeOwned>(body: Value) -> ApiResult<D> {
    serde_json::from_value(envelope_data(body))
        .map_err(|e| ApiError::InvalidResponse(format!("unexpected data shape: {e}")))
}

/// Strip the `{ "data": ... }` envelope when present.
pub fn envelope_data(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn parse_body(resource: Resource, response: &ApiResponse) -> ApiResult<Value> {
    response.json().map_err(|e| {
        ApiError::InvalidResponse(format!("{resource} response is not json: {e}"))
    })
}

/// Application-level failure carried in an otherwise successful response.
fn payload_error(body: &Value) -> Option<String> {
    let error = body.get("error")?;
    let code = match error {
        Value::Null | Value::Bool(false) => return None,
        Value::String(s) if s.trim().is_empty() => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("error")
            .to_string(),
        other => other.to_string(),
    };
    Some(match error_message(body) {
        Some(message) if message != code => format!("{code}: {message}"),
        _ => code,
    })
}

fn error_message(body: &Value) -> Option<String> {
    ["error_description", "message"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

/// Field name the server blamed, when it says so.
fn error_field(body: &Value) -> Option<String> {
    ["field", "parameter", "property"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn map_failure(resource: Resource, response: &ApiResponse) -> ApiError {
    let body = response.json().unwrap_or(Value::Null);
    let message = error_message(&body)
        .or_else(|| payload_error(&body))
        .unwrap_or_else(|| crate::security::sanitize_body_snippet(&response.body));

    match response.status {
        401 => ApiError::Unauthenticated(format!("token rejected by server: {message}")),
        404 => ApiError::NotFound {
            resource: resource.to_string(),
        },
        400 | 422 if body.get("error").is_some() || error_field(&body).is_some() => {
            ApiError::ValueRejected {
                field: error_field(&body),
                message,
            }
        }
        status => ApiError::ResourceError {
            resource: resource.to_string(),
            status,
            message,
        },
    }
}
