// Typed client for the remote task service. One async method per
// endpoint; the server stays the single source of truth.
use crate::model::{Stats, Task, TaskDraft};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{message}")]
    Status { status: StatusCode, message: String },
}

impl ApiError {
    /// HTTP status of a rejected request, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Transport(err) => err.status(),
            ApiError::Status { status, .. } => Some(*status),
        }
    }
}

/// Error envelope the service uses for every failure response.
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Confirmation body of `DELETE /tasks/:id`.
#[derive(Deserialize)]
struct DeleteConfirmation {
    message: String,
}

#[derive(Clone, Debug)]
pub struct TaskClient {
    http: reqwest::Client,
    base_url: String,
}

impl TaskClient {
    /// `base_url` is the fixed base path of the service, e.g.
    /// `http://localhost:3000/api`.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };
        Err(ApiError::Status { status, message })
    }

    /// `GET /tasks`: the full list, ordered by identifier descending.
    pub async fn list_tasks(&self) -> Result<Vec<Task>, ApiError> {
        let response = self.http.get(self.url("/tasks")).send().await?;
        Self::decode(response).await
    }

    /// `GET /tasks/:id`.
    pub async fn get_task(&self, id: i64) -> Result<Task, ApiError> {
        let response = self
            .http
            .get(self.url(&format!("/tasks/{}", id)))
            .send()
            .await?;
        Self::decode(response).await
    }

    /// `POST /tasks`. Title validation happens server-side.
    pub async fn create_task(&self, draft: &TaskDraft) -> Result<Task, ApiError> {
        let response = self
            .http
            .post(self.url("/tasks"))
            .json(draft)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// `PUT /tasks/:id`: full replacement.
    pub async fn update_task(&self, id: i64, draft: &TaskDraft) -> Result<Task, ApiError> {
        let response = self
            .http
            .put(self.url(&format!("/tasks/{}", id)))
            .json(draft)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// `PATCH /tasks/:id/toggle`: flips `completed`, returns the updated
    /// task.
    pub async fn toggle_task(&self, id: i64) -> Result<Task, ApiError> {
        let response = self
            .http
            .patch(self.url(&format!("/tasks/{}/toggle", id)))
            .send()
            .await?;
        Self::decode(response).await
    }

    /// `DELETE /tasks/:id`. The confirmation message is logged and
    /// discarded.
    pub async fn delete_task(&self, id: i64) -> Result<(), ApiError> {
        let response = self
            .http
            .delete(self.url(&format!("/tasks/{}", id)))
            .send()
            .await?;
        let confirmation: DeleteConfirmation = Self::decode(response).await?;
        debug!(task_id = id, message = %confirmation.message, "task deleted");
        Ok(())
    }

    /// `GET /search?q=`: server-side case-insensitive substring search
    /// over title and description.
    pub async fn search_tasks(&self, query: &str) -> Result<Vec<Task>, ApiError> {
        let response = self
            .http
            .get(self.url("/search"))
            .query(&[("q", query)])
            .send()
            .await?;
        Self::decode(response).await
    }

    /// `GET /stats`: aggregate counters over the whole table.
    pub async fn get_stats(&self) -> Result<Stats, ApiError> {
        let response = self.http.get(self.url("/stats")).send().await?;
        Self::decode(response).await
    }
}
