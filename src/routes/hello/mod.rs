pub mod routes;

use axum::http::{header, HeaderMap, Uri};
use serde::Serialize;
use std::collections::HashMap;
use url::form_urlencoded;

// FLAGS AND CACHE KEYS

pub const INITIAL_BUCKETING_KEY: &str = "initialBucketing";
pub const WELCOME_MESSAGE_FLAG: &str = "welcome_message";
pub const DEFAULT_WELCOME_MESSAGE: &str = "Welcome to our site!";
pub const NEW_FEATURE_FLAG: &str = "new_feature_enabled";
pub const FEATURE_VIEW_ACTION: &str = "feature_view";
pub const NEW_FEATURE_LABEL: &str = "new_feature";

const UNKNOWN: &str = "unknown";
const VISITOR_ID_PARAM: &str = "visitorId";

// MODELS

#[derive(Debug, Default, PartialEq)]
pub struct HelloParams {
    pub visitor_id: Option<String>,
}

impl HelloParams {
    /// The first `visitorId` pair wins; repeated ones are ignored.
    pub fn from_query(query: Option<&str>) -> Self {
        let visitor_id = query.and_then(|q| {
            form_urlencoded::parse(q.as_bytes())
                .find(|(k, _)| k == VISITOR_ID_PARAM)
                .map(|(_, v)| v.into_owned())
        });

        Self { visitor_id }
    }

    pub fn visitor_id(self) -> Option<String> {
        self.visitor_id.filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct HelloResponse {
    pub message: String,
    pub features: Features,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Features {
    pub new_feature_enabled: bool,
}

/// What the pipeline needs to know about the inbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestMeta {
    pub url: String,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

// HELPER FUNCTIONS

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Rebuilds the absolute URL of the request; origin-form URIs take their host from the headers.
pub fn request_url(headers: &HeaderMap, uri: &Uri) -> String {
    if uri.scheme().is_some() && uri.authority().is_some() {
        return uri.to_string();
    }

    let scheme = header_value(headers, header::HeaderName::from_static("x-forwarded-proto"))
        .unwrap_or_else(|| "http".to_string());
    let host = header_value(headers, header::HOST).unwrap_or_else(|| "localhost".to_string());
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

    format!("{scheme}://{host}{path}")
}

impl RequestMeta {
    pub fn from_parts(headers: &HeaderMap, uri: &Uri) -> Self {
        Self {
            url: request_url(headers, uri),
            user_agent: header_value(headers, header::USER_AGENT),
            referrer: header_value(headers, header::REFERER),
        }
    }

    /// Targeting context handed to the flag client.
    pub fn visitor_context(&self) -> HashMap<String, String> {
        let or_unknown = |value: &Option<String>| value.clone().unwrap_or_else(|| UNKNOWN.to_string());

        HashMap::from([
            ("userAgent".to_string(), or_unknown(&self.user_agent)),
            ("path".to_string(), self.url.clone()),
            ("referrer".to_string(), or_unknown(&self.referrer)),
        ])
    }
}
