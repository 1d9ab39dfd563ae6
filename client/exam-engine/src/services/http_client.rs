use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use crate::models::answer::{AutoSavePayload, SubmissionPayload};
use crate::models::question::AssessmentBundle;
use crate::services::{AssessmentSource, SubmissionSink};

/// Collaborator implementations backed by the assessment HTTP API. The
/// engine itself only ever sees the trait objects; this client is what a
/// real deployment wires in.
pub struct AssessmentApiClient {
    http_client: Client,
    base_url: String,
}

impl AssessmentApiClient {
    pub fn new(base_url: String) -> Self {
        Self {
            http_client: Client::new(),
            base_url,
        }
    }

    async fn post_json<T: serde::Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<()> {
        let response = self
            .http_client
            .post(url)
            .json(body)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
            .with_context(|| format!("Failed to call assessment API: {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Assessment API returned error {}: {}",
                status,
                error_text
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl AssessmentSource for AssessmentApiClient {
    async fn fetch_session(&self, session_id: &str) -> Result<AssessmentBundle> {
        let url = format!("{}/api/v1/assessments/{}", self.base_url, session_id);

        tracing::debug!("Fetching assessment bundle: {}", url);

        let response = self
            .http_client
            .get(&url)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
            .context("Failed to call assessment API")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Assessment API returned error {} for session {}",
                response.status(),
                session_id
            ));
        }

        let bundle: AssessmentBundle = response
            .json()
            .await
            .context("Failed to parse assessment bundle")?;

        tracing::info!(
            "Fetched assessment bundle: session={}, questions={}, duration={}ms",
            session_id,
            bundle.questions.len(),
            bundle.duration_ms
        );

        Ok(bundle)
    }
}

#[async_trait]
impl SubmissionSink for AssessmentApiClient {
    async fn submit(&self, session_id: &str, payload: &SubmissionPayload) -> Result<()> {
        let url = format!("{}/api/v1/assessments/{}/submit", self.base_url, session_id);
        self.post_json(&url, payload).await
    }

    async fn auto_save(&self, session_id: &str, payload: &AutoSavePayload) -> Result<()> {
        let url = format!(
            "{}/api/v1/assessments/{}/autosave",
            self.base_url, session_id
        );
        self.post_json(&url, payload).await
    }
}
