use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;

use super::line_protocol;
use crate::export::{ExportPoint, PointSink, SinkError};

const DIAGNOSTIC_QUERY: &str = "SHOW DIAGNOSTICS";

/// InfluxDB 1.x HTTP API client.
pub struct InfluxDbClient {
    client: ClientWithMiddleware,
    base_url: String,
    database: String,
    credentials: Option<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    error: Option<String>,
}

impl InfluxDbClient {
    pub fn new(
        client: ClientWithMiddleware,
        base_url: impl Into<String>,
        database: impl Into<String>,
        credentials: Option<(String, String)>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            database: database.into(),
            credentials,
        }
    }

    fn post(&self, url: &str) -> reqwest_middleware::RequestBuilder {
        let request = self.client.post(url);

        match &self.credentials {
            Some((username, password)) => request.basic_auth(username, Some(password)),
            None => request,
        }
    }

    async fn query(&self, query: &str) -> Result<(), SinkError> {
        let url = format!("{}/query", self.base_url);

        let response = self
            .post(&url)
            .query(&[("db", self.database.as_str()), ("q", query)])
            .send()
            .await
            .map_err(|e| SinkError::Transport {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| SinkError::Transport {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(SinkError::Rejected {
                url,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: QueryResponse = serde_json::from_str(&body).map_err(|e| SinkError::InvalidResponse {
            url: url.clone(),
            reason: format!("{e}: {body}"),
        })?;

        let error = parsed
            .error
            .or_else(|| parsed.results.into_iter().find_map(|result| result.error));

        match error {
            Some(reason) => Err(SinkError::InvalidResponse { url, reason }),
            None => Ok(()),
        }
    }
}

impl PointSink for InfluxDbClient {
    async fn check_connectivity(&self) -> Result<(), SinkError> {
        self.query(DIAGNOSTIC_QUERY).await
    }

    async fn write(&self, points: Vec<ExportPoint>) -> Result<(), SinkError> {
        if points.is_empty() {
            return Ok(());
        }

        let url = format!("{}/write", self.base_url);

        let response = self
            .post(&url)
            .query(&[("db", self.database.as_str()), ("precision", "ns")])
            .body(line_protocol::encode(&points))
            .send()
            .await
            .map_err(|e| SinkError::Transport {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Rejected {
            url,
            status: status.as_u16(),
            body,
        })
    }
}
