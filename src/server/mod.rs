//! HTTP surface of the job server.
//!
//! Every handler acts on behalf of a [`Caller`] built from the
//! [`CurrentUser`] the session layer attached, so listings, cancellation
//! and history only ever touch the caller's own jobs.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::access::{
    folder_access, manager_access, resolve_session, CurrentUser, FolderAccess, ManagerAccess,
    SessionResolver,
};
use crate::error::SentinelError;
use crate::identity::{Caller, IdentityContext, UserId};
use crate::scheduler::{
    HistoryEntry, HistoryQuery, JobDescriptor, JobId, JobQueue, NewJob, QueueStats, RunningJob,
};
use crate::storage::{NamespaceResolver, StorageKind};

#[derive(Clone)]
pub struct ServerState {
    pub identity: IdentityContext,
    pub queue: Arc<dyn JobQueue>,
    pub namespaces: Arc<NamespaceResolver>,
    /// Default priority for submissions that do not carry one.
    pub next_number: Arc<AtomicI64>,
}

impl ServerState {
    pub fn new(
        identity: IdentityContext,
        queue: Arc<dyn JobQueue>,
        namespaces: Arc<NamespaceResolver>,
    ) -> Self {
        Self {
            identity,
            queue,
            namespaces,
            next_number: Arc::new(AtomicI64::new(0)),
        }
    }
}

/// Middleware installed around the routes. `None` skips that gate.
#[derive(Clone)]
pub struct AccessLayers {
    pub sessions: Arc<dyn SessionResolver>,
    pub folders: Option<FolderAccess>,
    pub manager: Option<ManagerAccess>,
}

/// The caller behind the current request.
pub struct RequestCaller {
    pub user: Option<UserId>,
    pub caller: Caller,
}

impl FromRequestParts<ServerState> for RequestCaller {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<CurrentUser>()
            .and_then(|c| c.0.clone());
        let caller = state.identity.request_caller(user.clone());
        Ok(Self { user, caller })
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub prompt: Value,
    #[serde(default)]
    pub extra_data: Value,
    pub number: Option<i64>,
    #[serde(default)]
    pub front: bool,
    #[serde(default)]
    pub outputs_to_execute: Vec<String>,
    pub prompt_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub prompt_id: Uuid,
    pub number: i64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub queue_running: Vec<RunningJob>,
    pub queue_pending: Vec<JobDescriptor>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearOrDeleteRequest {
    #[serde(default)]
    pub clear: bool,
    #[serde(default)]
    pub delete: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
struct ClearOrDeleteResponse {
    cleared: usize,
    deleted: usize,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub max_items: Option<usize>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
struct NamespacesResponse {
    owner: String,
    input: String,
    output: String,
    temp: String,
}

/// Build the router with `layers` installed in their fixed order:
/// trace → session → folder → manager → handler.
pub fn build_router(state: ServerState, layers: AccessLayers) -> Router {
    let namespaces = state.namespaces.clone();

    let mut app = Router::new()
        .route("/prompt", axum::routing::post(submit_job_handler))
        .route("/queue", get(get_queue_handler).post(post_queue_handler))
        .route("/history", get(get_history_handler).post(post_history_handler))
        .route("/history/{id}", get(get_history_item_handler))
        .route("/api/namespaces", get(namespaces_handler))
        .route("/api/manager/queue", get(manager_queue_handler))
        .nest_service(
            "/input",
            ServeDir::new(namespaces.root(StorageKind::Input)),
        )
        .nest_service(
            "/output",
            ServeDir::new(namespaces.root(StorageKind::Output)),
        )
        .nest_service("/temp", ServeDir::new(namespaces.root(StorageKind::Temp)))
        .with_state(state);

    // Layers wrap outward: the last one added runs first.
    if let Some(manager) = layers.manager {
        app = app.layer(middleware::from_fn_with_state(manager, manager_access));
    }
    if let Some(folders) = layers.folders {
        app = app.layer(middleware::from_fn_with_state(folders, folder_access));
    }
    app.layer(middleware::from_fn_with_state(
        layers.sessions,
        resolve_session,
    ))
    .layer(TraceLayer::new_for_http())
}

pub async fn run_server(
    addr: SocketAddr,
    app: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind HTTP server");
            return Err(e);
        }
    };

    tracing::info!(addr = %addr, "Starting HTTP server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

async fn submit_job_handler(
    State(state): State<ServerState>,
    request_caller: RequestCaller,
    Json(payload): Json<SubmitJobRequest>,
) -> impl IntoResponse {
    if !payload.prompt.is_object() {
        return bad_request("prompt must be an object").into_response();
    }

    // Submitting makes this user the fallback for off-request path lookups.
    let caller = state
        .identity
        .set_current_user(request_caller.user.clone(), true);

    if let Err(e) = state.namespaces.resolve(StorageKind::Input, &caller) {
        tracing::error!(owner = %caller.owner(), error = %e, "Failed to prepare input namespace");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "storage unavailable".to_string(),
            }),
        )
            .into_response();
    }

    let mut number = state.next_number.fetch_add(1, Ordering::SeqCst);
    if payload.front {
        number = -number;
    }
    if let Some(explicit) = payload.number {
        number = explicit;
    }

    let mut prompt = payload.prompt;
    state.namespaces.inject(&caller, &mut prompt);

    let mut job = NewJob::new(number, prompt)
        .with_extra(payload.extra_data)
        .with_outputs(payload.outputs_to_execute);
    if let Some(id) = payload.prompt_id {
        job = job.with_id(id);
    }

    let descriptor = match state.queue.put(&caller, job) {
        Ok(descriptor) => descriptor,
        Err(SentinelError::DuplicateJob(_)) => {
            return (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: "prompt_id already in use".to_string(),
                }),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!(owner = %caller.owner(), error = %e, "Failed to queue job");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "failed to queue job".to_string(),
                }),
            )
                .into_response();
        }
    };

    (
        StatusCode::OK,
        Json(SubmitJobResponse {
            prompt_id: descriptor.id,
            number: descriptor.priority,
        }),
    )
        .into_response()
}

async fn get_queue_handler(
    State(state): State<ServerState>,
    RequestCaller { caller, .. }: RequestCaller,
) -> impl IntoResponse {
    let snapshot = state.queue.current_queue(&caller);
    Json(QueueResponse {
        queue_running: snapshot.running,
        queue_pending: snapshot.pending,
    })
}

async fn post_queue_handler(
    State(state): State<ServerState>,
    RequestCaller { caller, .. }: RequestCaller,
    Json(request): Json<ClearOrDeleteRequest>,
) -> impl IntoResponse {
    let cleared = if request.clear {
        state.queue.wipe_queue(&caller)
    } else {
        0
    };

    let deleted = request
        .delete
        .iter()
        .filter(|id| {
            state
                .queue
                .delete_queue_item(&caller, &|job: &JobDescriptor| &job.id == *id)
        })
        .count();

    Json(ClearOrDeleteResponse { cleared, deleted })
}

async fn get_history_handler(
    State(state): State<ServerState>,
    RequestCaller { caller, .. }: RequestCaller,
    Query(params): Query<HistoryParams>,
) -> Json<IndexMap<JobId, HistoryEntry>> {
    let query = HistoryQuery::page(params.max_items, params.offset.unwrap_or(-1));
    Json(state.queue.history(&caller, &query))
}

async fn get_history_item_handler(
    State(state): State<ServerState>,
    RequestCaller { caller, .. }: RequestCaller,
    Path(id): Path<Uuid>,
) -> Json<IndexMap<JobId, HistoryEntry>> {
    Json(state.queue.history(&caller, &HistoryQuery::single(id)))
}

async fn post_history_handler(
    State(state): State<ServerState>,
    RequestCaller { caller, .. }: RequestCaller,
    Json(request): Json<ClearOrDeleteRequest>,
) -> impl IntoResponse {
    let cleared = if request.clear {
        state.queue.wipe_history(&caller)
    } else {
        0
    };

    let deleted = request
        .delete
        .iter()
        .filter(|id| state.queue.delete_history_item(&caller, id))
        .count();

    Json(ClearOrDeleteResponse { cleared, deleted })
}

async fn namespaces_handler(
    State(state): State<ServerState>,
    RequestCaller { caller, .. }: RequestCaller,
) -> impl IntoResponse {
    let resolve = |kind| {
        state
            .namespaces
            .resolve(kind, &caller)
            .map(|p| p.display().to_string())
    };

    match (
        resolve(StorageKind::Input),
        resolve(StorageKind::Output),
        resolve(StorageKind::Temp),
    ) {
        (Ok(input), Ok(output), Ok(temp)) => Json(NamespacesResponse {
            owner: caller.owner().to_string(),
            input,
            output,
            temp,
        })
        .into_response(),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "storage unavailable".to_string(),
            }),
        )
            .into_response(),
    }
}

/// Global counters across every owner. Only reachable by the admin when
/// the manager gate is installed.
async fn manager_queue_handler(State(state): State<ServerState>) -> Json<QueueStats> {
    Json(state.queue.stats())
}
