use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, info};

use crate::application::ports::FaultSinkPort;
use crate::domain::{
    errors::{DomainError, DomainResult},
    fault::FaultReport,
};

const FAULTS_PATH: &str = "/api/v1/faults";

/// Backend ids are MongoDB ObjectIDs: 24 hex digits.
fn is_object_id(id: &str) -> bool {
    id.len() == 24 && id.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Client of the fault-detection backend (`POST /api/v1/faults`, `GET /api/v1/faults/:id`).
pub struct HttpFaultClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFaultClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client, base_url: base_url.trim_end_matches('/').to_string() }
    }

    fn faults_url(&self) -> String {
        format!("{}{}", self.base_url, FAULTS_PATH)
    }
}

#[async_trait]
impl FaultSinkPort for HttpFaultClient {
    async fn submit(&self, report: &FaultReport) -> DomainResult<u16> {
        let url = self.faults_url();
        debug!("POST {} {:?}", url, report);

        let res = self
            .client
            .post(&url)
            .json(report)
            .send()
            .await
            .map_err(|e| DomainError::Backend(format!("cannot reach {url}: {e}")))?;

        let status = res.status();
        if status == StatusCode::CREATED {
            info!("Backend accepted fault for product {}", report.product_id);
            return Ok(status.as_u16());
        }
        let body = res.text().await.unwrap_or_default();
        Err(DomainError::Backend(format!(
            "backend answered {}: {}",
            status.as_u16(),
            body.trim()
        )))
    }

    async fn fetch(&self, id: &str) -> DomainResult<serde_json::Value> {
        if !is_object_id(id) {
            return Err(DomainError::InvalidInput(format!("invalid fault id '{id}'")));
        }
        let url = format!("{}/{}", self.faults_url(), id);
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DomainError::Backend(format!("cannot reach {url}: {e}")))?;

        match res.status() {
            StatusCode::OK => res
                .json::<serde_json::Value>()
                .await
                .map_err(|e| DomainError::Backend(format!("bad JSON from backend: {e}"))),
            StatusCode::NOT_FOUND => Err(DomainError::NotFound(format!("fault {id}"))),
            other => Err(DomainError::Backend(format!("backend answered {}", other.as_u16()))),
        }
    }
}
