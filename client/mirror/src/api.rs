//! # Queue REST API
//!
//! Thin client over the shop backend. Every request carries the bearer
//! token, a `401` always comes back as [`SyncError::Unauthorized`] so the
//! caller can hand it to the session handler before touching local state.
//!
//! ## Endpoints
//!
//! - `GET /queue/{shop_id}`: full snapshot
//! - `GET /shops/{shop_id}/appointments`: appointment list
//! - `PUT /shops/{shop_id}/queue/{entry_id}`: partial entry update
//! - `PUT /shops/{shop_id}/queue/`: single-entry position move
use async_trait::async_trait;
use queue::{
    Appointment, EntryId, EntryUpdate, QueueEntry, QueueSnapshot, ReorderRequest, ReorderResponse,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{config::Config, error::SyncError};

#[async_trait]
pub trait QueueApi: Send + Sync {
    async fn fetch_snapshot(&self, shop_id: &str) -> Result<QueueSnapshot, SyncError>;

    async fn fetch_appointments(&self, shop_id: &str) -> Result<Vec<Appointment>, SyncError>;

    async fn update_entry(
        &self,
        shop_id: &str,
        entry_id: &EntryId,
        update: &EntryUpdate,
    ) -> Result<QueueEntry, SyncError>;

    /// Returns whatever entries the backend echoed back, possibly none.
    async fn move_entry(
        &self,
        shop_id: &str,
        request: &ReorderRequest,
    ) -> Result<Vec<QueueEntry>, SyncError>;
}

pub struct HttpApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpApi {
    pub fn new(config: &Config) -> Result<Self, SyncError> {
        let client = Client::builder().build()?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl QueueApi for HttpApi {
    async fn fetch_snapshot(&self, shop_id: &str) -> Result<QueueSnapshot, SyncError> {
        let request = self.client.get(self.url(&format!("/queue/{shop_id}")));
        let response = self.authorize(request).send().await?;

        read_json(check(response).await?).await
    }

    async fn fetch_appointments(&self, shop_id: &str) -> Result<Vec<Appointment>, SyncError> {
        let request = self
            .client
            .get(self.url(&format!("/shops/{shop_id}/appointments")));
        let response = self.authorize(request).send().await?;

        read_json(check(response).await?).await
    }

    async fn update_entry(
        &self,
        shop_id: &str,
        entry_id: &EntryId,
        update: &EntryUpdate,
    ) -> Result<QueueEntry, SyncError> {
        let request = self
            .client
            .put(self.url(&format!("/shops/{shop_id}/queue/{entry_id}")))
            .json(update);
        let response = self.authorize(request).send().await?;

        read_json(check(response).await?).await
    }

    async fn move_entry(
        &self,
        shop_id: &str,
        request: &ReorderRequest,
    ) -> Result<Vec<QueueEntry>, SyncError> {
        let builder = self
            .client
            .put(self.url(&format!("/shops/{shop_id}/queue/")))
            .json(request);
        let response = check(self.authorize(builder).send().await?).await?;

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        let reply: ReorderResponse = serde_json::from_slice(&bytes)?;
        Ok(reply.into_entries())
    }
}

async fn check(response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    debug!("{} {}", status, response.url());

    if status == StatusCode::UNAUTHORIZED {
        return Err(SyncError::Unauthorized);
    }

    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(SyncError::Rejected { status, message });
    }

    Ok(response)
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, SyncError> {
    let bytes = response.bytes().await?;

    Ok(serde_json::from_slice(&bytes)?)
}
