//! Supabase-backed source
//!
//! Pairs the PostgREST client (bulk queries) with the Realtime client
//! (insert notifications) behind one [`ReadingSource`].

use async_trait::async_trait;

use super::{
    BulkQuery, PostgrestClient, RawRecord, ReadingSource, RealtimeClient, SourceResult,
    Subscription,
};

/// Connection settings for a Supabase project
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL (e.g., "https://abcd.supabase.co")
    pub url: String,
    /// Anonymous API key sent as `apikey` and bearer token
    pub anon_key: String,
    /// Postgres schema holding the readings table
    pub schema: String,
    /// Realtime channel name
    pub channel: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Realtime heartbeat interval in milliseconds
    pub heartbeat_interval_ms: u64,
    /// How long to wait for the channel join reply
    pub join_timeout_ms: u64,
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:54321".to_string(),
            anon_key: String::new(),
            schema: "public".to_string(),
            channel: "sensor_data_changes".to_string(),
            request_timeout_ms: 10_000,
            heartbeat_interval_ms: 25_000,
            join_timeout_ms: 10_000,
        }
    }
}

impl SupabaseConfig {
    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

/// [`ReadingSource`] backed by a Supabase project
pub struct SupabaseSource {
    rest: PostgrestClient,
    realtime: RealtimeClient,
}

impl SupabaseSource {
    pub fn new(config: SupabaseConfig) -> SourceResult<Self> {
        Ok(Self {
            rest: PostgrestClient::new(config.clone())?,
            realtime: RealtimeClient::new(config),
        })
    }
}

#[async_trait]
impl ReadingSource for SupabaseSource {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn query(&self, query: &BulkQuery) -> SourceResult<Vec<RawRecord>> {
        self.rest.query(query).await
    }

    async fn subscribe(&self, table: &str) -> SourceResult<Subscription> {
        self.realtime.subscribe(table).await
    }
}
