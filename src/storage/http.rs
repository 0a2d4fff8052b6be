use super::engine::{Operation, RemoteStore};
use crate::config::ClientConfig;
use crate::core::{Persona, PersonaId, StoreError, StoreResult};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;

/// Error code a MySQL-backed persona API reports for a duplicate primary key.
pub const DUPLICATE_ENTRY_CODE: &str = "ER_DUP_ENTRY";

/// `RemoteStore` over the REST resource `{endpoint}{resource_path}`.
#[derive(Clone)]
pub struct HttpStore {
    client: Client,
    resource: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl HttpStore {
    pub fn new(config: &ClientConfig) -> StoreResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self::with_client(client, config.resource_url()))
    }

    /// Uses an existing client; `resource_url` must end with `/`.
    pub fn with_client(client: Client, resource_url: impl Into<String>) -> Self {
        Self {
            client,
            resource: resource_url.into(),
        }
    }

    pub fn resource_url(&self) -> &str {
        &self.resource
    }

    fn item_url(&self, id: &PersonaId) -> String {
        format!("{}{}", self.resource, id)
    }

    /// Maps a non-2xx response to the store taxonomy.
    ///
    /// `subject` is the identifier the call is about, if any; without one a
    /// 404 or 409 cannot name what was missing and is reported as `Rejected`.
    async fn ensure_success(
        op: Operation,
        response: Response,
        subject: Option<&PersonaId>,
    ) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorEnvelope>(&body)
            .ok()
            .map(|envelope| envelope.error);
        let duplicate = detail
            .as_ref()
            .and_then(|d| d.code.as_deref())
            .is_some_and(|code| code == DUPLICATE_ENTRY_CODE);

        match (status, subject) {
            (StatusCode::NOT_FOUND, Some(id)) => Err(StoreError::NotFound(id.clone())),
            (StatusCode::CONFLICT, Some(id)) => Err(StoreError::Conflict(id.clone())),
            (_, Some(id)) if duplicate => Err(StoreError::Conflict(id.clone())),
            _ => {
                let message = detail
                    .and_then(|d| d.message)
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| format!("{op} failed"));
                Err(StoreError::Rejected {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

fn transport(err: reqwest::Error) -> StoreError {
    if err.is_decode() {
        StoreError::Decode(err.to_string())
    } else {
        StoreError::Transport(err.to_string())
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn list(&self) -> StoreResult<Vec<Persona>> {
        let response = self.client.get(&self.resource).send().await.map_err(transport)?;
        let response = Self::ensure_success(Operation::List, response, None).await?;
        response.json().await.map_err(transport)
    }

    async fn get(&self, id: &PersonaId) -> StoreResult<Persona> {
        let response = self.client.get(self.item_url(id)).send().await.map_err(transport)?;
        let response = Self::ensure_success(Operation::Get, response, Some(id)).await?;
        response.json().await.map_err(transport)
    }

    async fn create(&self, persona: &Persona) -> StoreResult<()> {
        let response = self
            .client
            .post(&self.resource)
            .json(persona)
            .send()
            .await
            .map_err(transport)?;
        Self::ensure_success(Operation::Create, response, Some(&persona.identifier)).await?;
        Ok(())
    }

    async fn update(&self, id: &PersonaId, persona: &Persona) -> StoreResult<()> {
        if &persona.identifier != id {
            return Err(StoreError::IdentifierMismatch {
                path: id.clone(),
                payload: persona.identifier.clone(),
            });
        }
        let response = self
            .client
            .put(self.item_url(id))
            .json(persona)
            .send()
            .await
            .map_err(transport)?;
        Self::ensure_success(Operation::Update, response, Some(id)).await?;
        Ok(())
    }

    async fn delete(&self, id: &PersonaId) -> StoreResult<()> {
        let response = self
            .client
            .delete(self.item_url(id))
            .send()
            .await
            .map_err(transport)?;
        Self::ensure_success(Operation::Delete, response, Some(id)).await?;
        Ok(())
    }
}
