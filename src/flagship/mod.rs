//! Contract of the feature-flag client consumed by the request handlers.
//!
//! A [`FlagProvider`] lives for the whole process and starts one
//! [`FlagClient`] per request. Visitors created from that client resolve
//! flags and queue hits, which the client delivers when it is closed.

pub mod decision_api;
mod flag;
mod hit;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::Credentials;

pub use flag::Flag;
pub use hit::Hit;

#[derive(thiserror::Error, Debug)]
pub enum FlagError {
    #[error("invalid flag client configuration: {0}")]
    Configuration(String),

    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} answered with status {status}")]
    UnexpectedStatus { endpoint: String, status: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionMode {
    /// Flags are resolved against a bucketing snapshot handed over at start.
    BucketingEdge,
}

/// Precomputed flag-assignment rules, treated as an opaque document.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketingSnapshot(pub Value);

impl BucketingSnapshot {
    /// Panic mode switches every flag back to its default value.
    pub fn is_panic(&self) -> bool {
        self.0.get("panic").and_then(Value::as_bool).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartConfig {
    pub decision_mode: DecisionMode,
    pub initial_bucketing: Option<BucketingSnapshot>,
    /// When false, nothing is fetched over the network until a visitor asks for flags.
    pub fetch_now: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisitorOptions {
    pub visitor_id: Option<String>,
    pub has_consented: bool,
    pub context: HashMap<String, String>,
}

impl VisitorOptions {
    /// The provided id, or a freshly generated one.
    pub fn resolved_visitor_id(&self) -> String {
        self.visitor_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}

#[async_trait]
pub trait FlagProvider: Send + Sync {
    async fn start(
        &self,
        credentials: &Credentials,
        config: StartConfig,
    ) -> Result<Box<dyn FlagClient>, FlagError>;
}

#[async_trait]
pub trait FlagClient: Send + Sync {
    fn new_visitor(&self, options: VisitorOptions) -> Box<dyn Visitor>;

    /// Delivers every queued hit and releases the client.
    async fn close(&self) -> Result<(), FlagError>;
}

#[async_trait]
pub trait Visitor: Send + Sync {
    fn visitor_id(&self) -> &str;

    async fn fetch_flags(&mut self) -> Result<(), FlagError>;

    fn get_flag(&self, key: &str) -> Flag;

    /// Queues hits on the owning client; delivery happens on close.
    async fn send_hits(&self, hits: Vec<Hit>) -> Result<(), FlagError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_panic_switch() {
        assert!(BucketingSnapshot(json!({"panic": true})).is_panic());
        assert!(!BucketingSnapshot(json!({"panic": false, "campaigns": []})).is_panic());
        assert!(!BucketingSnapshot(json!("not an object")).is_panic());
    }

    #[test]
    fn test_visitor_id_resolution() {
        let provided = VisitorOptions {
            visitor_id: Some("visitor-42".to_string()),
            ..Default::default()
        };
        assert_eq!(provided.resolved_visitor_id(), "visitor-42");

        let generated = VisitorOptions::default().resolved_visitor_id();
        assert!(!generated.is_empty());
        assert!(Uuid::parse_str(&generated).is_ok());

        let empty = VisitorOptions {
            visitor_id: Some(String::new()),
            ..Default::default()
        };
        assert!(!empty.resolved_visitor_id().is_empty());
    }
}
