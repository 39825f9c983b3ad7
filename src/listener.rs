// Copyright (c) XBridge, Inc.
// SPDX-License-Identifier: Apache-2.0

//! One listener per chain: subscribes to the door account's validated
//! transaction stream, filters and decodes bridge-relevant transactions,
//! and pushes normalized events into the federator's queue. All upstream
//! JSON parsing lives here, behind `classify_message`, so protocol drift
//! touches one file.

use crate::client::{ChainClientHandle, ChainMessage};
use crate::events::{
    AccountCreateCommitDetected, CommitDetected, TransferResult, WitnessEvent,
};
use crate::metrics::WitnessMetrics;
use crate::queue::EventSender;
use crate::types::{AccountId, Amount, BridgeSpec, Direction, TxHash};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

/// Which end of the bridge this listener watches. The locking chain is the
/// original "mainchain"; the issuing chain is the sidechain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainEnd {
    Locking,
    Issuing,
}

impl ChainEnd {
    pub fn name(self) -> &'static str {
        match self {
            ChainEnd::Locking => "locking",
            ChainEnd::Issuing => "issuing",
        }
    }

    fn is_locking(self) -> bool {
        matches!(self, ChainEnd::Locking)
    }
}

/// Ask a chain to stop replaying historical transactions, keeping only the
/// live stream. Sent once backfill overlaps with already-stored rows.
pub fn stop_historical_txns(client: &ChainClientHandle, door: &AccountId) {
    client.send(
        "unsubscribe",
        json!({
            "account_history_tx_stream": {
                "account": door.to_base58(),
                "stop_history_tx_only": true,
            }
        }),
    );
}

pub struct ChainListener {
    chain: ChainEnd,
    bridge: BridgeSpec,
    client: ChainClientHandle,
    events: EventSender,
    metrics: Arc<WitnessMetrics>,
}

impl ChainListener {
    pub fn new(
        chain: ChainEnd,
        bridge: BridgeSpec,
        client: ChainClientHandle,
        events: EventSender,
        metrics: Arc<WitnessMetrics>,
    ) -> Self {
        Self {
            chain,
            bridge,
            client,
            events,
            metrics,
        }
    }

    fn door(&self) -> &AccountId {
        if self.chain.is_locking() {
            &self.bridge.locking_chain_door
        } else {
            &self.bridge.issuing_chain_door
        }
    }

    /// Subscribe to the door account's history + live transaction stream.
    /// Called on every (re)connect; the transport never replays it for us.
    fn subscribe(&self) {
        info!(chain = self.chain.name(), door = %self.door(), "subscribing to door account stream");
        self.client.send(
            "subscribe",
            json!({
                "account_history_tx_stream": { "account": self.door().to_base58() }
            }),
        );
    }

    pub async fn run(self, mut inbound: mpsc::Receiver<ChainMessage>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = inbound.recv() => {
                    match msg {
                        None => break,
                        Some(ChainMessage::Connected) => self.subscribe(),
                        Some(ChainMessage::Message(v)) => {
                            if let Some(event) = classify_message(self.chain, &self.bridge, &v) {
                                self.metrics
                                    .events_observed
                                    .with_label_values(&[self.chain.name(), event.event_type()])
                                    .inc();
                                self.events.push(event).await;
                            }
                        }
                    }
                }
            }
        }
        info!(chain = self.chain.name(), "chain listener stopped");
    }
}

fn as_u64_field(v: &Value) -> Option<u64> {
    v.as_u64()
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

/// The create count lives in the transaction metadata: the door's bridge
/// ledger entry is modified by the create, and its `FinalFields` carry the
/// post-transaction `XChainAccountCreateCount`.
fn create_count_from_meta(meta: &Value) -> Option<u64> {
    for node in meta.get("AffectedNodes")?.as_array()? {
        let Some(modified) = node.get("ModifiedNode") else {
            continue;
        };
        if modified.get("LedgerEntryType").and_then(Value::as_str) != Some("Bridge") {
            continue;
        }
        let Some(count) = modified
            .get("FinalFields")
            .and_then(|f| f.get("XChainAccountCreateCount"))
        else {
            continue;
        };
        if let Some(n) = count.as_u64() {
            return Some(n);
        }
        if let Some(s) = count.as_str() {
            return s
                .parse()
                .ok()
                .or_else(|| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok());
        }
    }
    None
}

/// Filter and decode one inbound stream message into a witness event.
/// Returns None for everything that is not a validated, bridge-relevant
/// transaction; malformed required fields are logged at warn and skipped.
pub fn classify_message(
    chain: ChainEnd,
    bridge: &BridgeSpec,
    msg: &Value,
) -> Option<WitnessEvent> {
    let chain_name = chain.name();

    if !msg.get("validated").and_then(Value::as_bool).unwrap_or(false) {
        trace!(chain = chain_name, "ignoring message: not validated");
        return None;
    }
    let Some(status) = msg.get("engine_result_code").and_then(Value::as_i64) else {
        trace!(chain = chain_name, "ignoring message: no engine result code");
        return None;
    };
    let Some(rpc_order) = msg.get("account_history_tx_index").and_then(Value::as_i64) else {
        trace!(chain = chain_name, "ignoring message: no account history tx index");
        return None;
    };
    let Some(meta) = msg.get("meta") else {
        trace!(chain = chain_name, "ignoring message: no tx meta");
        return None;
    };
    if msg.get("type").and_then(Value::as_str) != Some("transaction") {
        trace!(chain = chain_name, "ignoring message: not a transaction");
        return None;
    }
    let Some(txn) = msg.get("transaction") else {
        trace!(chain = chain_name, "ignoring message: no transaction body");
        return None;
    };

    #[derive(Clone, Copy, PartialEq)]
    enum TxnType {
        Commit,
        Claim,
        CreateAccount,
    }
    let txn_type = match txn.get("TransactionType").and_then(Value::as_str) {
        Some("XChainCommit") => TxnType::Commit,
        Some("XChainClaim") => TxnType::Claim,
        Some("SidechainXChainAccountCreate") => TxnType::CreateAccount,
        _ => {
            trace!(chain = chain_name, "ignoring message: not a bridge transaction");
            return None;
        }
    };

    let Some(txn_bridge) = txn.get("XChainBridge").and_then(|v| BridgeSpec::from_json(v)) else {
        trace!(chain = chain_name, "ignoring message: missing or invalid bridge");
        return None;
    };
    if txn_bridge != *bridge {
        // Expected: unrelated traffic on a door account used by other
        // bridges.
        trace!(chain = chain_name, "ignoring message: bridge mismatch");
        return None;
    }

    let tx_hash = match txn
        .get("hash")
        .and_then(Value::as_str)
        .and_then(|s| TxHash::from_hex(s).ok())
    {
        Some(h) => h,
        None => {
            warn!(chain = chain_name, "ignoring message: no tx hash");
            return None;
        }
    };
    if txn.get("Sequence").and_then(as_u64_field).is_none() {
        warn!(chain = chain_name, tx = %tx_hash, "ignoring message: no sequence");
        return None;
    }
    let Some(ledger_seq) = msg.get("ledger_index").and_then(as_u64_field) else {
        warn!(chain = chain_name, tx = %tx_hash, "ignoring message: no ledger index");
        return None;
    };
    let ledger_seq = ledger_seq as u32;

    // Prefer the metadata's delivered amount; fall back to the declared
    // amount for transactions that do not record one.
    let delivered_amount = meta
        .get("delivered_amount")
        .and_then(Amount::from_json)
        .or_else(|| txn.get("Amount").and_then(Amount::from_json));

    let Some(src) = txn
        .get("Account")
        .and_then(Value::as_str)
        .and_then(|s| AccountId::from_base58(s).ok())
    else {
        warn!(chain = chain_name, tx = %tx_hash, "ignoring message: no source account");
        return None;
    };

    let dst_field = match txn_type {
        TxnType::Claim | TxnType::CreateAccount => "Destination",
        TxnType::Commit => "OtherChainAccount",
    };
    let dst = txn
        .get(dst_field)
        .and_then(Value::as_str)
        .and_then(|s| AccountId::from_base58(s).ok());

    let status = status as i32;
    let rpc_order = rpc_order as i32;

    match txn_type {
        TxnType::Claim => {
            let Some(claim_id) = txn.get("XChainClaimID").and_then(as_u64_field) else {
                warn!(chain = chain_name, tx = %tx_hash, "ignoring claim: no claim id");
                return None;
            };
            let Some(dst) = dst else {
                warn!(chain = chain_name, tx = %tx_hash, "ignoring claim: no destination");
                return None;
            };
            // A claim settles a transfer that was triggered on the other
            // chain; its direction is the original transfer's.
            Some(WitnessEvent::TransferResult(TransferResult {
                dir: if chain.is_locking() {
                    Direction::IssuingToLocking
                } else {
                    Direction::LockingToIssuing
                },
                dst,
                delivered_amount,
                claim_id,
                ledger_seq,
                tx_hash,
                ter: status,
                rpc_order,
            }))
        }
        TxnType::Commit => {
            let Some(claim_id) = txn.get("XChainClaimID").and_then(as_u64_field) else {
                warn!(chain = chain_name, tx = %tx_hash, "ignoring commit: no claim id");
                return None;
            };
            Some(WitnessEvent::CommitDetected(CommitDetected {
                dir: if chain.is_locking() {
                    Direction::LockingToIssuing
                } else {
                    Direction::IssuingToLocking
                },
                src,
                bridge: txn_bridge,
                delivered_amount,
                claim_id,
                other_chain_account: dst,
                ledger_seq,
                tx_hash,
                status,
                rpc_order,
            }))
        }
        TxnType::CreateAccount => {
            let Some(create_count) = create_count_from_meta(meta) else {
                warn!(chain = chain_name, tx = %tx_hash, "ignoring account create: no create count");
                return None;
            };
            let Some(reward_amount) = txn.get("SignatureReward").and_then(Amount::from_json)
            else {
                warn!(chain = chain_name, tx = %tx_hash, "ignoring account create: no signature reward");
                return None;
            };
            let Some(dst) = dst else {
                warn!(chain = chain_name, tx = %tx_hash, "ignoring account create: no destination");
                return None;
            };
            Some(WitnessEvent::AccountCreateCommitDetected(
                AccountCreateCommitDetected {
                    dir: if chain.is_locking() {
                        Direction::LockingToIssuing
                    } else {
                        Direction::IssuingToLocking
                    },
                    src,
                    bridge: txn_bridge,
                    delivered_amount,
                    reward_amount,
                    create_count,
                    other_chain_account: dst,
                    ledger_seq,
                    tx_hash,
                    status,
                    rpc_order,
                },
            ))
        }
    }
}
