// Copyright (c) XBridge, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The normalized event stream between the chain listeners and the
//! federator. Each variant carries everything the federator needs; events
//! are moved into the queue and consumed exactly once.

use crate::types::{AccountId, Amount, BridgeSpec, Direction, TxHash};

/// Result code of a successful transaction on either chain.
pub const TES_SUCCESS: i32 = 0;

pub fn is_tes_success(status: i32) -> bool {
    status == TES_SUCCESS
}

/// A user-initiated cross-chain commit validated on the source chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitDetected {
    pub dir: Direction,
    /// Source account on the source chain.
    pub src: AccountId,
    pub bridge: BridgeSpec,
    pub delivered_amount: Option<Amount>,
    pub claim_id: u64,
    pub other_chain_account: Option<AccountId>,
    pub ledger_seq: u32,
    pub tx_hash: TxHash,
    /// Transaction engine result code.
    pub status: i32,
    /// Index from the account-history stream; negative means historical
    /// backfill, non-negative means live.
    pub rpc_order: i32,
}

/// A user-initiated cross-chain account create validated on the source
/// chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountCreateCommitDetected {
    pub dir: Direction,
    pub src: AccountId,
    pub bridge: BridgeSpec,
    pub delivered_amount: Option<Amount>,
    pub reward_amount: Amount,
    pub create_count: u64,
    pub other_chain_account: AccountId,
    pub ledger_seq: u32,
    pub tx_hash: TxHash,
    pub status: i32,
    pub rpc_order: i32,
}

/// A door-initiated settlement observed on the destination chain. The
/// direction is the original transfer's, not the chain the settlement was
/// seen on. Monitoring only; never signed or stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferResult {
    pub dir: Direction,
    pub dst: AccountId,
    pub delivered_amount: Option<Amount>,
    pub claim_id: u64,
    pub ledger_seq: u32,
    pub tx_hash: TxHash,
    pub ter: i32,
    pub rpc_order: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WitnessEvent {
    CommitDetected(CommitDetected),
    AccountCreateCommitDetected(AccountCreateCommitDetected),
    TransferResult(TransferResult),
    HeartbeatTimer,
}

impl WitnessEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            WitnessEvent::CommitDetected(_) => "commit_detected",
            WitnessEvent::AccountCreateCommitDetected(_) => "account_create_commit_detected",
            WitnessEvent::TransferResult(_) => "transfer_result",
            WitnessEvent::HeartbeatTimer => "heartbeat_timer",
        }
    }
}
