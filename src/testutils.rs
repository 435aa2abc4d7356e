use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::background::BackgroundTasks;
use crate::config::{Config, Credentials};
use crate::edge_config::{EdgeConfigError, EdgeConfigStore};
use crate::flagship::{
    Flag, FlagClient, FlagError, FlagProvider, Hit, StartConfig, Visitor, VisitorOptions,
};
use crate::state::AppState;

/// Every interaction a handler had with the flag client, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Start(StartConfig),
    NewVisitor(VisitorOptions),
    FetchFlags(String),
    SendHits(Vec<Hit>),
    Close,
}

#[derive(Clone, Default)]
pub struct SpyFlagProvider {
    flags: HashMap<String, Value>,
    reject_start: bool,
    fail_start: bool,
    fail_fetch: bool,
    fail_hits: bool,
    calls: Arc<Mutex<Vec<Call>>>,
    visitor_ids: Arc<Mutex<Vec<String>>>,
}

impl SpyFlagProvider {
    pub fn with_flag(mut self, key: &str, value: Value) -> Self {
        self.flags.insert(key.to_string(), value);
        self
    }

    pub fn rejecting_start(mut self) -> Self {
        self.reject_start = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_fetch(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    pub fn failing_hits(mut self) -> Self {
        self.fail_hits = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn visitor_ids(&self) -> Vec<String> {
        self.visitor_ids.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SendHits(hits) => Some(hits),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn unavailable() -> FlagError {
    FlagError::UnexpectedStatus {
        endpoint: "spy".to_string(),
        status: 503,
    }
}

#[async_trait]
impl FlagProvider for SpyFlagProvider {
    async fn start(
        &self,
        _credentials: &Credentials,
        config: StartConfig,
    ) -> Result<Box<dyn FlagClient>, FlagError> {
        self.record(Call::Start(config));
        if self.reject_start {
            return Err(FlagError::Configuration("rejected by spy".to_string()));
        }
        if self.fail_start {
            return Err(unavailable());
        }
        Ok(Box::new(SpyClient { spy: self.clone() }))
    }
}

struct SpyClient {
    spy: SpyFlagProvider,
}

#[async_trait]
impl FlagClient for SpyClient {
    fn new_visitor(&self, options: VisitorOptions) -> Box<dyn Visitor> {
        let visitor_id = options.resolved_visitor_id();
        self.spy.record(Call::NewVisitor(options));
        self.spy.visitor_ids.lock().unwrap().push(visitor_id.clone());

        Box::new(SpyVisitor {
            spy: self.spy.clone(),
            visitor_id,
            fetched: HashMap::new(),
        })
    }

    async fn close(&self) -> Result<(), FlagError> {
        self.spy.record(Call::Close);
        Ok(())
    }
}

struct SpyVisitor {
    spy: SpyFlagProvider,
    visitor_id: String,
    fetched: HashMap<String, Value>,
}

#[async_trait]
impl Visitor for SpyVisitor {
    fn visitor_id(&self) -> &str {
        &self.visitor_id
    }

    async fn fetch_flags(&mut self) -> Result<(), FlagError> {
        self.spy.record(Call::FetchFlags(self.visitor_id.clone()));
        if self.spy.fail_fetch {
            return Err(unavailable());
        }
        self.fetched = self.spy.flags.clone();
        Ok(())
    }

    fn get_flag(&self, key: &str) -> Flag {
        Flag {
            key: key.to_string(),
            value: self.fetched.get(key).cloned(),
        }
    }

    async fn send_hits(&self, hits: Vec<Hit>) -> Result<(), FlagError> {
        self.spy.record(Call::SendHits(hits));
        if self.spy.fail_hits {
            return Err(unavailable());
        }
        Ok(())
    }
}

/// Config store whose every lookup fails.
pub struct FailingEdgeConfig;

#[async_trait]
impl EdgeConfigStore for FailingEdgeConfig {
    async fn get(&self, _key: &str) -> Result<Option<Value>, EdgeConfigError> {
        Err(EdgeConfigError::UnexpectedStatus(503))
    }
}

pub fn test_config(with_credentials: bool) -> Config {
    let mut vars = HashMap::new();
    if with_credentials {
        vars.insert("FLAGSHIP_ENV_ID", "env-test".to_string());
        vars.insert("FLAGSHIP_API_KEY", "key-test".to_string());
    }
    Config::from_vars(|name| vars.get(name).cloned()).unwrap()
}

pub fn app_state(
    config: Config,
    edge_config: impl EdgeConfigStore + 'static,
    flags: SpyFlagProvider,
) -> AppState {
    AppState {
        config: Arc::new(config),
        edge_config: Arc::new(edge_config),
        flags: Arc::new(flags),
        background: BackgroundTasks::default(),
    }
}

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn serve_stub(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}
