//! HTTP Transport for Task Mutations
//!
//! The dispatcher talks to the server through the [`TaskTransport`] seam so
//! tests can substitute a scripted transport. The production implementation
//! issues `PATCH /api/tasks/{taskId}/status` with a JSON body via reqwest and
//! maps HTTP failures into the [`SyncError`] taxonomy.

use crate::shared::error::SyncError;
use crate::shared::protocol::RemoteTask;
use crate::shared::task::TaskStatus;
use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

/// Server mutation seam used by the dispatcher
#[async_trait]
pub trait TaskTransport: Send + Sync {
    /// Move a task to a new status; returns the server's updated
    /// representation of the task
    async fn update_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
    ) -> Result<RemoteTask, SyncError>;
}

/// Production transport over reqwest
pub struct HttpTaskTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTaskTransport {
    /// Create a transport against the given server base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, task_id: Uuid) -> String {
        format!("{}/api/tasks/{}/status", self.base_url, task_id)
    }
}

#[async_trait]
impl TaskTransport for HttpTaskTransport {
    async fn update_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
    ) -> Result<RemoteTask, SyncError> {
        let response = self
            .client
            .patch(self.endpoint(task_id))
            .json(&json!({ "status": status }))
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    SyncError::Timeout
                } else {
                    SyncError::network(err.to_string())
                }
            })?;

        let http_status = response.status();
        if http_status.is_success() {
            response
                .json::<RemoteTask>()
                .await
                .map_err(|err| SyncError::network(format!("invalid task payload: {err}")))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(SyncError::from_status(http_status.as_u16(), body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_shape() {
        let transport = HttpTaskTransport::new("http://127.0.0.1:3000/");
        let task_id = Uuid::new_v4();
        assert_eq!(
            transport.endpoint(task_id),
            format!("http://127.0.0.1:3000/api/tasks/{task_id}/status")
        );
    }

    #[test]
    fn test_body_shape() {
        let body = json!({ "status": TaskStatus::Doing });
        assert_eq!(body.to_string(), r#"{"status":"doing"}"#);
    }
}
