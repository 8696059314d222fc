use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::{SessionPersister, SessionSubmission, SubmitReceipt};
use crate::error::PersistError;
use crate::storage::ApiConfig;

const ENTRIES_PATH: &str = "api/v1/entries";

/// Posts sessions to the entry API as JSON.
#[derive(Debug, Clone)]
pub struct HttpPersister {
    client: reqwest::Client,
    endpoint: Url,
    token: Option<String>,
}

impl HttpPersister {
    /// # Errors
    ///
    /// Returns an error if `base_url` does not parse or the HTTP client
    /// cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, PersistError> {
        let mut base = Url::parse(&config.base_url)?;
        // Keep any path prefix on the base URL when joining.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join(ENTRIES_PATH)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            token: config.token.clone().filter(|t| !t.is_empty()),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl SessionPersister for HttpPersister {
    async fn submit(&self, submission: &SessionSubmission) -> Result<SubmitReceipt, PersistError> {
        debug!("POST {}", self.endpoint);

        let mut request = self.client.post(self.endpoint.clone()).json(submission);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(PersistError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(SubmitReceipt::from_body(&body))
    }
}
