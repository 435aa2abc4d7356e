use axum::{
    extract::{RawQuery, State},
    http::{HeaderMap, Uri},
    Json,
};

use super::{
    Features, HelloParams, HelloResponse, RequestMeta, DEFAULT_WELCOME_MESSAGE,
    FEATURE_VIEW_ACTION, INITIAL_BUCKETING_KEY, NEW_FEATURE_FLAG, NEW_FEATURE_LABEL,
    WELCOME_MESSAGE_FLAG,
};
use crate::error::HandlerError;
use crate::flagship::{BucketingSnapshot, DecisionMode, FlagError, Hit, StartConfig, VisitorOptions};
use crate::routes::after_response::AfterResponse;
use crate::state::AppState;

/// Resolve the greeting flags for a visitor and report the page view
pub async fn hello(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    uri: Uri,
    after: AfterResponse,
) -> Result<Json<HelloResponse>, HandlerError> {
    let visitor_id = HelloParams::from_query(query.as_deref()).visitor_id();

    greet(&state, visitor_id, RequestMeta::from_parts(&headers, &uri), &after)
        .await
        .map(Json)
}

fn default_response() -> HelloResponse {
    HelloResponse {
        message: DEFAULT_WELCOME_MESSAGE.to_string(),
        features: Features {
            new_feature_enabled: false,
        },
    }
}

/// The per-request pipeline behind `GET /api/hello`.
///
/// Only configuration problems fail the request. Lookup, evaluation and
/// reporting failures are logged and the flag defaults are served instead.
/// Closing the client is handed to `after` and never delays the response.
pub async fn greet(
    state: &AppState,
    visitor_id: Option<String>,
    meta: RequestMeta,
    after: &AfterResponse,
) -> Result<HelloResponse, HandlerError> {
    // Step 1: Credentials are checked before anything touches the flag client
    let credentials = state.config.flagship.credentials()?;

    // Step 2: Cached bucketing snapshot, best effort
    let initial_bucketing = match state.edge_config.get(INITIAL_BUCKETING_KEY).await {
        Ok(snapshot) => snapshot.map(BucketingSnapshot),
        Err(e) => {
            tracing::warn!(error = %e, "bucketing snapshot lookup failed");
            None
        }
    };
    if initial_bucketing.is_none() {
        tracing::debug!(key = INITIAL_BUCKETING_KEY, "no cached bucketing snapshot");
    }

    // Step 3: One client per request
    let client = match state
        .flags
        .start(
            &credentials,
            StartConfig {
                decision_mode: DecisionMode::BucketingEdge,
                initial_bucketing,
                fetch_now: false,
            },
        )
        .await
    {
        Ok(client) => client,
        Err(e @ FlagError::Configuration(_)) => return Err(HandlerError::ClientConfiguration(e)),
        Err(e) => {
            tracing::warn!(error = %e, "flag client failed to start, serving defaults");
            return Ok(default_response());
        }
    };

    // Step 4: Visitor with consent and request-derived context
    let mut visitor = client.new_visitor(VisitorOptions {
        visitor_id,
        has_consented: true,
        context: meta.visitor_context(),
    });

    // Step 5: Resolve flags
    if let Err(e) = visitor.fetch_flags().await {
        tracing::warn!(visitor_id = visitor.visitor_id(), error = %e, "failed to fetch flags, using defaults");
    }

    // Step 6: Read values with defaults
    let welcome = visitor.get_flag(WELCOME_MESSAGE_FLAG);
    let new_feature = visitor.get_flag(NEW_FEATURE_FLAG);
    tracing::debug!(
        visitor_id = visitor.visitor_id(),
        welcome_resolved = welcome.exists(),
        new_feature_resolved = new_feature.exists(),
        "flags read"
    );
    let message = welcome.get_value(DEFAULT_WELCOME_MESSAGE.to_string());
    let new_feature_enabled = new_feature.get_value(false);

    // Step 7: Report the page view and whether the feature was shown
    let hits = vec![
        Hit::page_view(meta.url.clone()),
        Hit::action(
            FEATURE_VIEW_ACTION,
            NEW_FEATURE_LABEL,
            u32::from(new_feature_enabled),
        ),
    ];
    if let Err(e) = visitor.send_hits(hits).await {
        tracing::warn!(visitor_id = visitor.visitor_id(), error = %e, "failed to queue hits");
    }
    drop(visitor);

    // Step 8: Flush queued hits once the response is out
    after.defer(async move {
        if let Err(e) = client.close().await {
            tracing::warn!(error = %e, "failed to close flag client");
        }
    });

    Ok(HelloResponse {
        message,
        features: Features {
            new_feature_enabled,
        },
    })
}
