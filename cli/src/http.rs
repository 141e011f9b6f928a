//! Read-only HTTP surface over the query facade.
//!
//! | Route | Body |
//! |---|---|
//! | `GET /campaigns` | campaigns, most recent first |
//! | `GET /campaigns/:address` | one campaign, 404 if unknown |
//! | `GET /tokens[?allowed=true]` | token records |
//! | `GET /funds` | funds claims, most recent first |
//! | `GET /status` | per-indexer status |
//! | `GET /health` | liveness |
//!
//! Handlers only read published snapshots; nothing here triggers a scan.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use fundindex_core::indexer::IndexerStatus;
use fundindex_evm::{CampaignRecord, FundsClaimRecord, QueryFacade, TokenRecord};

/// Handler error rendered as a JSON body.
pub enum ApiError {
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(what) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": format!("{what} not found") })))
                    .into_response()
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenFilter {
    #[serde(default)]
    pub allowed: Option<bool>,
}

pub fn router(facade: QueryFacade) -> Router {
    Router::new()
        .route("/campaigns", get(campaigns))
        .route("/campaigns/:address", get(campaign))
        .route("/tokens", get(tokens))
        .route("/funds", get(funds))
        .route("/status", get(status))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(facade)
}

/// Serve until `shutdown` flips to `true` (or its sender is dropped).
pub async fn serve(
    listener: TcpListener,
    facade: QueryFacade,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    info!(addr = ?listener.local_addr().ok(), "http listening");
    axum::serve(listener, router(facade))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}

async fn campaigns(State(facade): State<QueryFacade>) -> Json<Vec<CampaignRecord>> {
    Json(facade.campaigns())
}

async fn campaign(
    State(facade): State<QueryFacade>,
    Path(address): Path<String>,
) -> Result<Json<CampaignRecord>, ApiError> {
    facade
        .campaign(&address)
        .map(Json)
        .ok_or(ApiError::NotFound(format!("campaign {address}")))
}

async fn tokens(
    State(facade): State<QueryFacade>,
    Query(filter): Query<TokenFilter>,
) -> Json<Vec<TokenRecord>> {
    match filter.allowed {
        Some(true) => Json(facade.allowed_tokens()),
        Some(false) => Json(facade.tokens().into_iter().filter(|t| !t.status).collect()),
        None => Json(facade.tokens()),
    }
}

async fn funds(State(facade): State<QueryFacade>) -> Json<Vec<FundsClaimRecord>> {
    Json(facade.funds())
}

async fn status(State(facade): State<QueryFacade>) -> Json<Vec<IndexerStatus>> {
    Json(facade.status())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
