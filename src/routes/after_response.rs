use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use crate::background::BackgroundTasks;

type DeferredTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Request-scoped queue of work that runs once the response has been produced.
#[derive(Clone, Default)]
pub struct AfterResponse {
    tasks: Arc<Mutex<Vec<DeferredTask>>>,
}

impl AfterResponse {
    pub fn defer<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::pin(task));
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    /// Runs the deferred tasks in the order they were queued.
    pub async fn run(self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            task.await;
        }
    }
}

impl<S> FromRequestParts<S> for AfterResponse
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AfterResponse>()
            .cloned()
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "after-response hook not installed"))
    }
}

/// Middleware installing an [`AfterResponse`] hook and running it once the handler is done
pub async fn run_after_response(
    State(background): State<BackgroundTasks>,
    mut req: Request,
    next: Next,
) -> Response {
    let after = AfterResponse::default();
    req.extensions_mut().insert(after.clone());

    let response = next.run(req).await;

    if !after.is_empty() {
        background.spawn(after.run());
    }
    response
}
