// Copyright (c) XBridge, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Process wiring: build every component from the config, run until a
//! shutdown signal, then tear down in order — stop the producers, let the
//! federator drain and flush, close the store.

use crate::client::spawn_chain_client;
use crate::config::WitnessNodeConfig;
use crate::federator::Federator;
use crate::listener::{ChainEnd, ChainListener};
use crate::metrics::WitnessMetrics;
use crate::queue::{event_channel, EventSender};
use crate::server::{run_server, AppState};
use crate::storage::Store;
use crate::events::WitnessEvent;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::info;

async fn run_heartbeat(interval: Duration, events: EventSender, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => events.push(WitnessEvent::HeartbeatTimer).await,
        }
    }
}

pub async fn run_witness_node(
    config: WitnessNodeConfig,
    registry: &prometheus::Registry,
) -> anyhow::Result<()> {
    let metrics = Arc::new(WitnessMetrics::new(registry));

    // Fatal startup steps first: signing key, store, RPC bind.
    let keypair = config.signing_keypair()?;
    let server_keypair = config.signing_keypair()?;
    let store = Store::open(&config.db_path()).await?;

    let cancel = CancellationToken::new();
    let (event_tx, event_rx) = event_channel(config.event_queue_size);

    let (locking_in_tx, locking_in_rx) = mpsc::channel(64);
    let locking_client = spawn_chain_client(
        "locking",
        config.locking_chain_endpoint.clone(),
        locking_in_tx,
        cancel.child_token(),
    );
    let (issuing_in_tx, issuing_in_rx) = mpsc::channel(64);
    let issuing_client = spawn_chain_client(
        "issuing",
        config.issuing_chain_endpoint.clone(),
        issuing_in_tx,
        cancel.child_token(),
    );

    let locking_listener = ChainListener::new(
        ChainEnd::Locking,
        config.bridge.clone(),
        locking_client.clone(),
        event_tx.clone(),
        metrics.clone(),
    );
    tokio::spawn(locking_listener.run(locking_in_rx, cancel.child_token()));
    let issuing_listener = ChainListener::new(
        ChainEnd::Issuing,
        config.bridge.clone(),
        issuing_client.clone(),
        event_tx.clone(),
        metrics.clone(),
    );
    tokio::spawn(issuing_listener.run(issuing_in_rx, cancel.child_token()));

    tokio::spawn(run_heartbeat(
        Duration::from_millis(config.heartbeat_interval_ms),
        event_tx.clone(),
        cancel.child_token(),
    ));

    let federator = Federator::new(
        config.bridge.clone(),
        keypair,
        config.locking_chain_reward_account,
        config.issuing_chain_reward_account,
        config.witness_submit,
        store.clone(),
        locking_client,
        issuing_client,
        metrics.clone(),
    );
    // The main-loop gate: the federator consumes nothing until bootstrap
    // below is complete.
    let (ready_tx, ready_rx) = oneshot::channel();
    let federator_handle = tokio::spawn(federator.run(event_rx, ready_rx, cancel.clone()));

    let rpc_address = SocketAddr::new(
        IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
        config.rpc_listen_port,
    );
    let server_handle = run_server(
        rpc_address,
        AppState {
            store,
            bridge: config.bridge.clone(),
            keypair: Arc::new(server_keypair),
            sign_on_demand: config.sign_on_demand,
            shutdown: cancel.clone(),
            metrics,
        },
    )
    .await?;

    let _ = ready_tx.send(());
    info!("witness node started");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received interrupt signal"),
        _ = cancel.cancelled() => info!("stop requested"),
    }
    cancel.cancel();

    // The listeners and heartbeat stop as producers; the federator drains
    // the queue, flushes its buffers and closes the store.
    federator_handle.await??;
    server_handle.abort();
    info!("witness node stopped");
    Ok(())
}
