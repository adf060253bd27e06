use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur when handing a match to project creation
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Unauthorized: project service rejected the request")]
    Unauthorized,
}

/// Body sent to the project-creation service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectBody {
    #[serde(rename = "requestId")]
    pub request_id: Uuid,
    #[serde(rename = "candidateId")]
    pub candidate_id: String,
    #[serde(rename = "matchId")]
    pub match_id: Uuid,
}

/// What the project-creation service answered
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatedProject {
    #[serde(rename = "projectId", default)]
    pub project_id: Option<String>,
}

/// Client for the external project-creation service
///
/// Invoked once per accepted match with `{requestId, candidateId}`.
pub struct ProjectClient {
    base_url: String,
    client: Client,
}

impl ProjectClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProjectError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    /// Create the project for an accepted match
    pub async fn create_project(
        &self,
        request_id: Uuid,
        candidate_id: &str,
        match_id: Uuid,
    ) -> Result<CreatedProject, ProjectError> {
        let url = format!("{}/projects", self.base_url.trim_end_matches('/'));
        let body = CreateProjectBody {
            request_id,
            candidate_id: candidate_id.to_string(),
            match_id,
        };

        tracing::debug!("Creating project for request {} at {}", request_id, url);

        let response = self.client.post(&url).json(&body).send().await?;

        match response.status() {
            status if status.is_success() => {
                // Some deployments answer 204 with no body
                let text = response.text().await?;
                if text.trim().is_empty() {
                    return Ok(CreatedProject::default());
                }
                serde_json::from_str(&text)
                    .map_err(|e| ProjectError::ApiError(format!("Invalid response body: {}", e)))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProjectError::Unauthorized),
            status => Err(ProjectError::ApiError(format!(
                "Failed to create project: {}",
                status
            ))),
        }
    }
}
