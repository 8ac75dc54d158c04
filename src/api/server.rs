use std::net::SocketAddr;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use axum::extract::{MatchedPath, Request};
use axum::middleware::{self, Next, from_fn};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::api::handler::*;
use crate::api::middleware::verify_internal::verify_internal_ident;
use crate::chat::ChatOrchestrator;
use crate::progression::ProgressionError;
use crate::util::env::{self, EnvErr};

pub type JsonResult<T> = core::result::Result<Json<T>, RouteError>;

#[derive(Clone)]
pub struct AppState {
    pub pool: Option<&'static PgPool>,
    pub orchestrator: Arc<ChatOrchestrator>,
}

#[instrument(skip(tx, pool, orchestrator))]
pub async fn router(
    tx: UnboundedSender<SocketAddr>,
    pool: Option<&'static PgPool>,
    orchestrator: Arc<ChatOrchestrator>,
) -> Result<(), RouteError> {
    let state = Arc::new(AppState { pool, orchestrator });

    let internal_post_routes = Router::new()
        .route("/xp/grant", post(grant_xp))
        .route("/verification/set", post(set_verification))
        .route_layer(middleware::from_fn(verify_internal_ident));

    let app = Router::new()
        .merge(internal_post_routes)
        //
        // general
        .route("/", get(root))
        .route("/health", get(health))
        .route("/status", get(status))
        //
        // chat + memory
        .route("/chat", post(chat))
        .route("/history", get(history))
        //
        // progression
        .route("/leaderboard", get(leaderboard))
        .route("/xp/history", get(xp_history))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let uri = req.uri();

                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                tracing::debug_span!("api_request", ?method, ?uri, ?matched_path)
            }),
        )
        .layer(from_fn(log_route_errors))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let port = env::vars().await?.server_api_port;

    let socket_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), port);
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;

    if let Err(e) = tx.send(socket_addr) {
        tracing::warn!(error = ?e, "server-ready channel closed");
    }

    axum::serve(listener, app).await?;
    Ok(())
}

/// Custom error trace handler for `RouteError`-type responses
#[instrument(skip(request, next), fields(uri = request.uri().to_string()))]
async fn log_route_errors(request: Request, next: Next) -> Response {
    let res = next.run(request).await;
    if let Some(err) = res.extensions().get::<Arc<RouteError>>() {
        tracing::error!(error = ?err, "error occurred inside route handler");
    }

    res
}

#[instrument(skip(tx, rx, pool, orchestrator))]
pub async fn start_server(
    tx: UnboundedSender<SocketAddr>,
    mut rx: UnboundedReceiver<SocketAddr>,
    pool: Option<&'static PgPool>,
    orchestrator: Arc<ChatOrchestrator>,
) -> Result<Vec<JoinHandle<()>>, RouteError> {
    tracing::info!("starting server");
    let server_handle = tokio::task::spawn(async move {
        if let Err(e) = router(tx, pool, orchestrator).await {
            tracing::error!(error = ?e, "api server exited");
        }
    });

    let logging_handle = tokio::task::spawn(async move {
        while !rx.is_closed() {
            if let Some(msg) = rx.recv().await {
                tracing::info!(
                    server_url = &format!("http://127.0.0.1:{}", msg.port()),
                    "server ready"
                );
                break;
            }
        }
    });

    let handles = vec![server_handle, logging_handle];
    Ok(handles)
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("missing or invalid field: {0}")]
    Validation(String),

    #[error(transparent)]
    Progression(#[from] ProgressionError),

    #[error(transparent)]
    SqlxError(#[from] sqlx::error::Error),

    #[error(transparent)]
    EnvError(#[from] EnvErr),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("store disabled - this endpoint needs a configured DATABASE_URL")]
    StoreDisabled,
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            message: String,
        }

        let (status, message, err) = match &self {
            RouteError::Validation(field) => (
                StatusCode::BAD_REQUEST,
                format!("missing or invalid field: {field}"),
                // client error, not ours to page anyone over
                None,
            ),

            RouteError::Progression(progression_err) => match progression_err {
                ProgressionError::UserNotFound(id) => (
                    StatusCode::NOT_FOUND,
                    format!("user '{id}' not found"),
                    None,
                ),
                ProgressionError::UnknownLevel(level) => (
                    StatusCode::BAD_REQUEST,
                    format!("unknown level {level}"),
                    None,
                ),
                ProgressionError::InsufficientXp { required, actual } => (
                    StatusCode::BAD_REQUEST,
                    format!("not enough xp: need {required}, have {actual}"),
                    None,
                ),
                ProgressionError::Store(error) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error.to_string(),
                    Some(self),
                ),
            },

            RouteError::SqlxError(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error.to_string(),
                Some(self),
            ),

            RouteError::EnvError(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error.to_string(),
                Some(self),
            ),

            RouteError::Io(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error.to_string(),
                Some(self),
            ),

            RouteError::StoreDisabled => (
                StatusCode::SERVICE_UNAVAILABLE,
                self.to_string(),
                None,
            ),
        };

        let mut response = (status, Json(ErrorResponse { message })).into_response();
        if let Some(err) = err {
            response.extensions_mut().insert(Arc::new(err));
        }

        response
    }
}
