// Copyright (c) XBridge, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The query RPC surface: a single JSON command endpoint plus a health
//! route. Command dispatch and the witness lookups live in `handler`.

use crate::crypto::WitnessKeyPair;
use crate::metrics::WitnessMetrics;
use crate::storage::Store;
use crate::types::BridgeSpec;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub mod handler;

pub const HEALTH_PATH: &str = "/health";

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub bridge: BridgeSpec,
    pub keypair: Arc<WitnessKeyPair>,
    /// Sign requested tuples directly instead of consulting the store.
    /// Off by default; it delegates trust to the caller.
    pub sign_on_demand: bool,
    /// Cancelled by the `stop` command to shut the process down.
    pub shutdown: CancellationToken,
    pub metrics: Arc<WitnessMetrics>,
}

/// Bind the listener (fatal on failure) and serve the query RPC until the
/// process exits.
pub async fn run_server(
    socket_address: SocketAddr,
    state: AppState,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let listener = TcpListener::bind(socket_address).await?;
    tracing::info!("query RPC listening on {socket_address}");
    Ok(tokio::spawn(async move {
        axum::serve(listener, make_router(state).into_make_service())
            .await
            .unwrap();
    }))
}

pub(crate) fn make_router(state: AppState) -> Router {
    Router::new()
        .route("/", post(handle_command))
        .route(HEALTH_PATH, get(health_check))
        .with_state(state)
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn handle_command(State(state): State<AppState>, Json(request): Json<Value>) -> Json<Value> {
    Json(handler::do_command(&state, request).await)
}
