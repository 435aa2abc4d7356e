//! Flag client backed by the remote decision service and the events collector.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::{
    DecisionMode, Flag, FlagClient, FlagError, FlagProvider, Hit, StartConfig, Visitor,
    VisitorOptions,
};
use crate::config::{Credentials, FlagshipSettings};

/// Data source tag sent with every hit.
const DATA_SOURCE: &str = "APP";

pub struct DecisionApiProvider {
    http: reqwest::Client,
    decision_api_url: String,
    events_url: String,
}

impl DecisionApiProvider {
    pub fn new(settings: &FlagshipSettings) -> Result<Self, FlagError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| FlagError::Configuration(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            decision_api_url: settings.decision_api_url.trim_end_matches('/').to_string(),
            events_url: settings.events_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl FlagProvider for DecisionApiProvider {
    async fn start(
        &self,
        credentials: &Credentials,
        config: StartConfig,
    ) -> Result<Box<dyn FlagClient>, FlagError> {
        if credentials.env_id.is_empty() || credentials.api_key.is_empty() {
            return Err(FlagError::Configuration(
                "environment id and api key must not be empty".to_string(),
            ));
        }

        let client = DecisionApiClient::new(
            self.http.clone(),
            credentials.clone(),
            self.decision_api_url.clone(),
            self.events_url.clone(),
            config,
        );
        if client.inner.panic {
            tracing::warn!(env_id = %credentials.env_id, "bucketing snapshot is in panic mode, flags fall back to defaults");
        }

        tracing::debug!(
            env_id = %credentials.env_id,
            decision_mode = ?client.inner.config.decision_mode,
            has_snapshot = client.inner.config.initial_bucketing.is_some(),
            fetch_now = client.inner.config.fetch_now,
            "flag client started"
        );
        Ok(Box::new(client))
    }
}

struct QueuedHit {
    visitor_id: String,
    has_consented: bool,
    queued_at: DateTime<Utc>,
    hit: Hit,
}

struct ClientInner {
    http: reqwest::Client,
    credentials: Credentials,
    decision_api_url: String,
    events_url: String,
    config: StartConfig,
    panic: bool,
    queue: Mutex<Vec<QueuedHit>>,
}

impl ClientInner {
    /// Without a snapshot and with fetching deferred there is nothing to evaluate against.
    fn can_resolve(&self) -> bool {
        if self.panic {
            return false;
        }
        match self.config.decision_mode {
            DecisionMode::BucketingEdge => {
                self.config.initial_bucketing.is_some() || self.config.fetch_now
            }
        }
    }

    fn push_hits(&self, visitor_id: &str, has_consented: bool, hits: Vec<Hit>) {
        let now = Utc::now();
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.extend(hits.into_iter().map(|hit| QueuedHit {
            visitor_id: visitor_id.to_string(),
            has_consented,
            queued_at: now,
            hit,
        }));
    }

    fn take_hits(&self) -> Vec<QueuedHit> {
        std::mem::take(&mut *self.queue.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

pub struct DecisionApiClient {
    inner: Arc<ClientInner>,
}

impl DecisionApiClient {
    fn new(
        http: reqwest::Client,
        credentials: Credentials,
        decision_api_url: String,
        events_url: String,
        config: StartConfig,
    ) -> Self {
        let panic = config
            .initial_bucketing
            .as_ref()
            .is_some_and(|snapshot| snapshot.is_panic());

        Self {
            inner: Arc::new(ClientInner {
                http,
                credentials,
                decision_api_url,
                events_url,
                config,
                panic,
                queue: Mutex::new(Vec::new()),
            }),
        }
    }

    async fn deliver(&self, queued: &QueuedHit) -> Result<(), FlagError> {
        let inner = &self.inner;
        let envelope = HitEnvelope {
            cid: &inner.credentials.env_id,
            vid: &queued.visitor_id,
            ds: DATA_SOURCE,
            qt: (Utc::now() - queued.queued_at).num_milliseconds().max(0),
            hit: &queued.hit,
        };

        let response = inner
            .http
            .post(&inner.events_url)
            .json(&envelope)
            .send()
            .await
            .map_err(|source| FlagError::Http {
                endpoint: inner.events_url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(FlagError::UnexpectedStatus {
                endpoint: inner.events_url.clone(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl FlagClient for DecisionApiClient {
    fn new_visitor(&self, options: VisitorOptions) -> Box<dyn Visitor> {
        let visitor_id = options.resolved_visitor_id();
        tracing::debug!(visitor_id = %visitor_id, "visitor created");

        Box::new(DecisionApiVisitor {
            inner: self.inner.clone(),
            visitor_id,
            has_consented: options.has_consented,
            context: options.context,
            flags: HashMap::new(),
        })
    }

    async fn close(&self) -> Result<(), FlagError> {
        let queued = self.inner.take_hits();
        let mut first_error = None;
        let mut delivered = 0;

        for hit in queued.iter() {
            if !hit.has_consented {
                tracing::debug!(visitor_id = %hit.visitor_id, "dropping hit of visitor without consent");
                continue;
            }
            match self.deliver(hit).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(visitor_id = %hit.visitor_id, error = %e, "failed to deliver hit");
                    first_error.get_or_insert(e);
                }
            }
        }

        tracing::debug!(queued = queued.len(), delivered, "flag client closed");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

struct DecisionApiVisitor {
    inner: Arc<ClientInner>,
    visitor_id: String,
    has_consented: bool,
    context: HashMap<String, String>,
    flags: HashMap<String, Value>,
}

#[async_trait]
impl Visitor for DecisionApiVisitor {
    fn visitor_id(&self) -> &str {
        &self.visitor_id
    }

    async fn fetch_flags(&mut self) -> Result<(), FlagError> {
        if !self.inner.can_resolve() {
            tracing::debug!(visitor_id = %self.visitor_id, "nothing to resolve flags against, keeping defaults");
            self.flags.clear();
            return Ok(());
        }

        let inner = &self.inner;
        let endpoint = format!(
            "{}/v2/{}/campaigns",
            inner.decision_api_url, inner.credentials.env_id
        );

        let response = inner
            .http
            .post(&endpoint)
            .query(&[("exposeAllKeys", "true")])
            .header("x-api-key", &inner.credentials.api_key)
            .json(&CampaignsRequest {
                visitor_id: &self.visitor_id,
                context: &self.context,
                trigger_hit: false,
                visitor_consent: self.has_consented,
            })
            .send()
            .await
            .map_err(|source| FlagError::Http {
                endpoint: endpoint.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(FlagError::UnexpectedStatus {
                endpoint,
                status: response.status().as_u16(),
            });
        }

        let campaigns: CampaignsResponse =
            response.json().await.map_err(|source| FlagError::Http {
                endpoint: endpoint.clone(),
                source,
            })?;

        self.flags = flags_from_campaigns(campaigns);
        tracing::debug!(visitor_id = %self.visitor_id, flags = self.flags.len(), "flags fetched");
        Ok(())
    }

    fn get_flag(&self, key: &str) -> Flag {
        Flag {
            key: key.to_string(),
            value: self.flags.get(key).cloned(),
        }
    }

    async fn send_hits(&self, hits: Vec<Hit>) -> Result<(), FlagError> {
        self.inner
            .push_hits(&self.visitor_id, self.has_consented, hits);
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CampaignsRequest<'a> {
    visitor_id: &'a str,
    context: &'a HashMap<String, String>,
    #[serde(rename = "trigger_hit")]
    trigger_hit: bool,
    #[serde(rename = "visitor_consent")]
    visitor_consent: bool,
}

#[derive(Debug, Deserialize)]
struct CampaignsResponse {
    #[serde(default)]
    campaigns: Vec<Campaign>,
}

#[derive(Debug, Deserialize)]
struct Campaign {
    variation: Variation,
}

#[derive(Debug, Deserialize)]
struct Variation {
    modifications: Modifications,
}

#[derive(Debug, Deserialize)]
struct Modifications {
    #[serde(default)]
    value: HashMap<String, Value>,
}

/// Earlier campaigns win when two of them set the same key.
fn flags_from_campaigns(response: CampaignsResponse) -> HashMap<String, Value> {
    let mut flags = HashMap::new();
    for campaign in response.campaigns {
        for (key, value) in campaign.variation.modifications.value {
            flags.entry(key).or_insert(value);
        }
    }
    flags
}

#[derive(Serialize)]
struct HitEnvelope<'a> {
    cid: &'a str,
    vid: &'a str,
    ds: &'static str,
    qt: i64,
    #[serde(flatten)]
    hit: &'a Hit,
}
