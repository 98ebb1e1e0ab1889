//! PostgREST Client
//!
//! HTTP client for the bulk query path (`/rest/v1/{table}`).

use reqwest::Client;
use serde_json::Value;

use super::{BulkQuery, RawRecord, SourceError, SourceResult, SupabaseConfig};

/// Read-only PostgREST client
pub struct PostgrestClient {
    client: Client,
    config: SupabaseConfig,
}

impl PostgrestClient {
    /// Create a new client with the given configuration
    pub fn new(config: SupabaseConfig) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(SourceError::Request)?;

        Ok(Self { client, config })
    }

    /// Get the current configuration
    pub fn config(&self) -> &SupabaseConfig {
        &self.config
    }

    /// Full request URL for a bulk query
    pub fn query_url(&self, query: &BulkQuery) -> String {
        format!(
            "{}/rest/v1/{}?select=*&order={}.{}&limit={}",
            self.config.base_url(),
            urlencoding::encode(&query.table),
            urlencoding::encode(&query.order_column),
            query.direction.as_str(),
            query.limit
        )
    }

    /// Fetch rows for a bulk query
    pub async fn query(&self, query: &BulkQuery) -> SourceResult<Vec<RawRecord>> {
        let url = self.query_url(query);

        tracing::debug!(
            table = %query.table,
            order = %query.order_column,
            direction = query.direction.as_str(),
            limit = query.limit,
            "PostgREST bulk query"
        );

        let response = self
            .client
            .get(&url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&self.config.anon_key)
            .header("Accept-Profile", &self.config.schema)
            .send()
            .await
            .map_err(SourceError::from_request)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let body: Value = response.json().await.map_err(SourceError::from_request)?;
        records_from_body(body)
    }
}

/// Split a PostgREST response body into rows
pub(crate) fn records_from_body(body: Value) -> SourceResult<Vec<RawRecord>> {
    let Value::Array(rows) = body else {
        return Err(SourceError::Malformed(
            "expected a JSON array of rows".to_string(),
        ));
    };

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| match row {
            Value::Object(record) => Ok(record),
            other => Err(SourceError::Malformed(format!(
                "row {} is not an object: {}",
                i, other
            ))),
        })
        .collect()
}
