//! Read-only key-value store holding the cached bucketing snapshot.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum EdgeConfigError {
    #[error("invalid edge config connection string: {0}")]
    InvalidConnectionString(String),

    #[error("edge config request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("edge config answered with status {0}")]
    UnexpectedStatus(u16),
}

#[async_trait]
pub trait EdgeConfigStore: Send + Sync {
    /// `Ok(None)` when the key is not present.
    async fn get(&self, key: &str) -> Result<Option<Value>, EdgeConfigError>;
}

/// In-memory store, used when no edge config is attached.
#[derive(Debug, Default, Clone)]
pub struct StaticEdgeConfig {
    items: HashMap<String, Value>,
}

impl StaticEdgeConfig {
    #[cfg(test)]
    pub fn with_item(mut self, key: impl Into<String>, value: Value) -> Self {
        self.items.insert(key.into(), value);
        self
    }
}

#[async_trait]
impl EdgeConfigStore for StaticEdgeConfig {
    async fn get(&self, key: &str) -> Result<Option<Value>, EdgeConfigError> {
        Ok(self.items.get(key).cloned())
    }
}

pub struct HttpEdgeConfig {
    http: reqwest::Client,
    items_url: Url,
    token: String,
}

impl HttpEdgeConfig {
    /// Accepts connection strings of the form `https://edge-config.vercel.com/<id>?token=<token>`.
    pub fn from_connection_string(
        connection: &str,
        timeout: Duration,
    ) -> Result<Self, EdgeConfigError> {
        let (items_url, token) = parse_connection_string(connection)?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            items_url,
            token,
        })
    }
}

fn parse_connection_string(connection: &str) -> Result<(Url, String), EdgeConfigError> {
    let invalid = |reason: &str| EdgeConfigError::InvalidConnectionString(reason.to_string());

    let url = Url::parse(connection).map_err(|e| invalid(&e.to_string()))?;
    let token = url
        .query_pairs()
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| invalid("missing token"))?;
    let id = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| invalid("missing edge config id"))?
        .to_string();

    let mut items_url = url.clone();
    items_url.set_query(None);
    items_url.set_path(&format!("{id}/item/"));

    Ok((items_url, token))
}

#[async_trait]
impl EdgeConfigStore for HttpEdgeConfig {
    async fn get(&self, key: &str) -> Result<Option<Value>, EdgeConfigError> {
        let url = self
            .items_url
            .join(key)
            .map_err(|e| EdgeConfigError::InvalidConnectionString(e.to_string()))?;

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(EdgeConfigError::UnexpectedStatus(status.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::serve_stub;
    use axum::{
        extract::Path,
        http::{header, HeaderMap},
        routing::get,
        Json, Router,
    };
    use serde_json::json;

    async fn item(Path(key): Path<String>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
        let authorized = headers
            .get(header::AUTHORIZATION)
            .is_some_and(|v| v == "Bearer secret");
        match key.as_str() {
            _ if !authorized => Err(StatusCode::UNAUTHORIZED),
            "initialBucketing" => Ok(Json(json!({"panic": false, "campaigns": []}))),
            "boom" => Err(StatusCode::BAD_GATEWAY),
            _ => Err(StatusCode::NOT_FOUND),
        }
    }

    async fn http_store(token: &str) -> HttpEdgeConfig {
        let base = serve_stub(Router::new().route("/ecfg_test/item/{key}", get(item))).await;
        HttpEdgeConfig::from_connection_string(
            &format!("{base}/ecfg_test?token={token}"),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_connection_string() {
        let (url, token) =
            parse_connection_string("https://edge-config.vercel.com/ecfg_abc123?token=secret")
                .unwrap();

        assert_eq!(token, "secret");
        assert_eq!(
            url.join("initialBucketing").unwrap().as_str(),
            "https://edge-config.vercel.com/ecfg_abc123/item/initialBucketing"
        );
    }

    #[test]
    fn test_connection_string_without_token() {
        let err = parse_connection_string("https://edge-config.vercel.com/ecfg_abc123").unwrap_err();
        assert!(matches!(err, EdgeConfigError::InvalidConnectionString(_)));
    }

    #[test]
    fn test_connection_string_not_a_url() {
        assert!(parse_connection_string("ecfg_abc123").is_err());
    }

    #[tokio::test]
    async fn test_static_store() {
        let store = StaticEdgeConfig::default().with_item("initialBucketing", json!({"panic": false}));

        assert_eq!(
            store.get("initialBucketing").await.unwrap(),
            Some(json!({"panic": false}))
        );
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_http_store_reads_item() {
        let store = http_store("secret").await;

        assert_eq!(
            store.get("initialBucketing").await.unwrap(),
            Some(json!({"panic": false, "campaigns": []}))
        );
    }

    #[tokio::test]
    async fn test_http_store_missing_item() {
        let store = http_store("secret").await;

        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_http_store_unexpected_status() {
        let store = http_store("secret").await;
        let err = store.get("boom").await.unwrap_err();
        assert!(matches!(err, EdgeConfigError::UnexpectedStatus(502)));

        let store = http_store("wrong").await;
        let err = store.get("initialBucketing").await.unwrap_err();
        assert!(matches!(err, EdgeConfigError::UnexpectedStatus(401)));
    }
}
