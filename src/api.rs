use reqwest::{StatusCode, blocking::Client};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    config::Config,
    model::{
        Envelope, Group, GroupId, GroupsPayload, Health, Project, ProjectsPayload,
        SubgroupsPayload,
    },
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("not authorized by backend (HTTP {status})")]
    Auth { status: u16 },
    #[error("{}", api_message(.status, .message))]
    Api { status: Option<u16>, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

fn api_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("backend error (HTTP {status}): {message}"),
        None => format!("backend error: {message}"),
    }
}

/// Where the tree gets its data from. Implementations are called from
/// worker threads.
pub trait GroupSource: Send + Sync + 'static {
    fn top_level_groups(&self) -> Result<Vec<Group>, FetchError>;
    fn subgroups(&self, group_id: GroupId) -> Result<Vec<Group>, FetchError>;
    fn projects(&self, group_id: GroupId) -> Result<Vec<Project>, FetchError>;
}

/// Blocking client for the dashboard backend's `/api` routes.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base: String,
}

impl BackendClient {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| FetchError::Network(err.to_string()))?;
        Ok(Self {
            client,
            base: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub fn health(&self) -> Result<Health, FetchError> {
        let url = format!("{}/api/health", self.base);
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|err| FetchError::Network(err.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(status, resp.text().unwrap_or_default()));
        }
        resp.json::<Health>()
            .map_err(|err| FetchError::InvalidResponse(err.to_string()))
    }

    fn get_envelope<T>(&self, path: &str) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base);
        debug!(%url, "backend request");
        let resp = self.client.get(&url).send().map_err(|err| {
            warn!(%url, error = %err, "backend unreachable");
            FetchError::Network(err.to_string())
        })?;

        let status = resp.status();
        let body = resp
            .text()
            .map_err(|err| FetchError::Network(err.to_string()))?;
        if !status.is_success() {
            let err = status_error(status, body);
            warn!(%url, error = %err, "backend request failed");
            return Err(err);
        }

        decode_envelope(&body)
    }
}

impl GroupSource for BackendClient {
    fn top_level_groups(&self) -> Result<Vec<Group>, FetchError> {
        let payload: GroupsPayload = self.get_envelope("/api/groups")?;
        Ok(payload.groups)
    }

    fn subgroups(&self, group_id: GroupId) -> Result<Vec<Group>, FetchError> {
        let payload: SubgroupsPayload =
            self.get_envelope(&format!("/api/groups/{group_id}/subgroups"))?;
        Ok(payload.subgroups)
    }

    fn projects(&self, group_id: GroupId) -> Result<Vec<Project>, FetchError> {
        let payload: ProjectsPayload =
            self.get_envelope(&format!("/api/groups/{group_id}/projects"))?;
        Ok(payload.projects)
    }
}

fn decode_envelope<T>(body: &str) -> Result<T, FetchError>
where
    T: DeserializeOwned,
{
    let envelope: Envelope<T> = serde_json::from_str(body)
        .map_err(|err| FetchError::InvalidResponse(err.to_string()))?;
    if !envelope.success {
        return Err(FetchError::Api {
            status: None,
            message: envelope
                .error
                .unwrap_or_else(|| "request was not successful".to_string()),
        });
    }
    Ok(envelope.payload)
}

fn status_error(status: StatusCode, body: String) -> FetchError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return FetchError::Auth {
            status: status.as_u16(),
        };
    }
    let message = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
        .ok()
        .and_then(|envelope| envelope.error)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string()
        });
    FetchError::Api {
        status: Some(status.as_u16()),
        message,
    }
}
