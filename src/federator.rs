// Copyright (c) XBridge, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The federator engine: the single consumer of the event queue. It signs
//! attestations about detected commits, persists them, buffers the
//! successful live ones per direction, and flushes batches at ledger
//! boundaries (heartbeats) or when a buffer fills. Buffers are touched only
//! by this task, so they need no locking.

use crate::client::ChainClientHandle;
use crate::crypto::{self, WitnessKeyPair};
use crate::encoding;
use crate::error::WitnessResult;
use crate::events::{
    is_tes_success, AccountCreateCommitDetected, CommitDetected, TransferResult, WitnessEvent,
};
use crate::listener;
use crate::metrics::WitnessMetrics;
use crate::queue::EventReceiver;
use crate::storage::{ClaimRow, CreateAccountRow, Store};
use crate::types::{
    AccountId, AttestationBatch, AttestationClaim, AttestationCreateAccount, BridgeSpec, Direction,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Flush a buffer early once it holds this many attestations, even between
/// ledger boundaries.
pub const SUBMIT_SOFT_CAP: usize = 8;

pub struct Federator {
    bridge: BridgeSpec,
    keypair: WitnessKeyPair,
    signing_pk: Vec<u8>,
    locking_chain_reward_account: AccountId,
    issuing_chain_reward_account: AccountId,
    witness_submit: bool,
    submit_account: AccountId,
    store: Store,
    locking_client: ChainClientHandle,
    issuing_client: ChainClientHandle,
    to_issuing_claims: Vec<AttestationClaim>,
    to_locking_claims: Vec<AttestationClaim>,
    to_issuing_creates: Vec<AttestationCreateAccount>,
    to_locking_creates: Vec<AttestationCreateAccount>,
    metrics: Arc<WitnessMetrics>,
}

impl Federator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bridge: BridgeSpec,
        keypair: WitnessKeyPair,
        locking_chain_reward_account: AccountId,
        issuing_chain_reward_account: AccountId,
        witness_submit: bool,
        store: Store,
        locking_client: ChainClientHandle,
        issuing_client: ChainClientHandle,
        metrics: Arc<WitnessMetrics>,
    ) -> Self {
        use fastcrypto::traits::KeyPair as _;
        let signing_pk = crypto::public_key_bytes(&keypair);
        let submit_account = crypto::account_from_public_key(keypair.public());
        Self {
            bridge,
            keypair,
            signing_pk,
            locking_chain_reward_account,
            issuing_chain_reward_account,
            witness_submit,
            submit_account,
            store,
            locking_client,
            issuing_client,
            to_issuing_claims: Vec::new(),
            to_locking_claims: Vec::new(),
            to_issuing_creates: Vec::new(),
            to_locking_creates: Vec::new(),
            metrics,
        }
    }

    /// Consume events until cancelled. The `ready` gate holds the loop back
    /// until bootstrap is complete. On cancellation the residual queue is
    /// drained, both directions get a final flush, and the store is closed.
    /// A store failure ends the loop with an error; the federator is not a
    /// partial-failure safe component.
    pub async fn run(
        mut self,
        mut events: EventReceiver,
        ready: oneshot::Receiver<()>,
        cancel: CancellationToken,
    ) -> WitnessResult<()> {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("federator cancelled before start");
                return Ok(());
            }
            _ = ready => {}
        }
        info!("federator main loop running");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    None => break,
                    Some(event) => self.handle_event(event).await?,
                }
            }
        }

        // Draining: producers are being shut down; consume whatever is
        // still queued, then flush.
        events.close();
        while let Some(event) = events.recv().await {
            self.handle_event(event).await?;
        }
        self.submit(true, true);
        self.submit(false, true);
        self.store.close().await;
        info!("federator stopped");
        Ok(())
    }

    pub async fn handle_event(&mut self, event: WitnessEvent) -> WitnessResult<()> {
        match event {
            WitnessEvent::CommitDetected(e) => self.on_commit(e).await,
            WitnessEvent::AccountCreateCommitDetected(e) => {
                self.on_account_create_commit(e).await
            }
            WitnessEvent::TransferResult(e) => {
                self.on_transfer_result(e);
                Ok(())
            }
            WitnessEvent::HeartbeatTimer => {
                self.on_heartbeat();
                Ok(())
            }
        }
    }

    /// The chain that observed an event is the transfer's source chain.
    fn source_chain(&self, dir: Direction) -> (&ChainClientHandle, &AccountId) {
        match dir {
            Direction::LockingToIssuing => {
                (&self.locking_client, &self.bridge.locking_chain_door)
            }
            Direction::IssuingToLocking => {
                (&self.issuing_client, &self.bridge.issuing_chain_door)
            }
        }
    }

    /// Backfill has reached transactions we already hold; tell the source
    /// chain to stop replaying history.
    fn on_duplicate(&self, dir: Direction, rpc_order: i32) {
        self.metrics.duplicate_events.inc();
        if rpc_order < 0 {
            let (client, door) = self.source_chain(dir);
            info!(%dir, "historical backfill reached stored attestations, stopping it");
            listener::stop_historical_txns(client, door);
        }
    }

    async fn on_commit(&mut self, e: CommitDetected) -> WitnessResult<()> {
        info!(dir = %e.dir, tx = %e.tx_hash, claim_id = e.claim_id, ledger = e.ledger_seq,
              "commit detected");

        let was_locking_chain_send = e.dir.was_locking_chain_send();
        let reward_account = if was_locking_chain_send {
            self.issuing_chain_reward_account
        } else {
            self.locking_chain_reward_account
        };
        let success = is_tes_success(e.status);

        // Sign only successful commits that actually delivered value. The
        // row is stored either way for audit.
        let attestation = if !success {
            None
        } else if let Some(amount) = &e.delivered_amount {
            let message = encoding::claim_message(
                &e.bridge,
                &e.src,
                amount,
                &reward_account,
                was_locking_chain_send,
                e.claim_id,
                e.other_chain_account.as_ref(),
            );
            let signature = crypto::sign(&self.keypair, &message);
            debug_assert!(crypto::verify(&self.signing_pk, &message, &signature));
            Some(AttestationClaim {
                signing_pk: self.signing_pk.clone(),
                signature,
                sending_account: e.src,
                sending_amount: amount.clone(),
                reward_account,
                was_locking_chain_send,
                claim_id: e.claim_id,
                destination: e.other_chain_account,
            })
        } else {
            warn!(tx = %e.tx_hash, "missing delivered amount in successful cross-chain transfer");
            None
        };

        let row = ClaimRow {
            tx_hash: e.tx_hash.to_hex(),
            ledger_seq: e.ledger_seq,
            claim_id: e.claim_id,
            success,
            delivered_amt: e
                .delivered_amount
                .as_ref()
                .map(encoding::encode_amount)
                .unwrap_or_default(),
            bridge: encoding::encode_bridge(&e.bridge),
            sending_account: e.src.to_vec(),
            reward_account: reward_account.to_vec(),
            other_chain_account: e
                .other_chain_account
                .as_ref()
                .map(AccountId::to_vec)
                .unwrap_or_default(),
            public_key: self.signing_pk.clone(),
            signature: attestation
                .as_ref()
                .map(|a| a.signature.clone())
                .unwrap_or_default(),
        };
        if !self.store.insert_claim(e.dir, &row).await? {
            debug!(tx = %e.tx_hash, claim_id = e.claim_id, "claim attestation already stored");
            self.on_duplicate(e.dir, e.rpc_order);
            return Ok(());
        }

        if let Some(attestation) = attestation {
            let dir_label = e.dir.to_string();
            self.metrics
                .attestations_signed
                .with_label_values(&[dir_label.as_str()])
                .inc();
            // Historical events are attested and stored but never produce
            // submission effects.
            if e.rpc_order >= 0 {
                let buffer = if was_locking_chain_send {
                    &mut self.to_issuing_claims
                } else {
                    &mut self.to_locking_claims
                };
                buffer.push(attestation);
            }
        }
        self.submit(was_locking_chain_send, false);
        Ok(())
    }

    async fn on_account_create_commit(
        &mut self,
        e: AccountCreateCommitDetected,
    ) -> WitnessResult<()> {
        info!(dir = %e.dir, tx = %e.tx_hash, create_count = e.create_count, ledger = e.ledger_seq,
              "account create commit detected");

        let was_locking_chain_send = e.dir.was_locking_chain_send();
        let reward_account = if was_locking_chain_send {
            self.issuing_chain_reward_account
        } else {
            self.locking_chain_reward_account
        };
        let success = is_tes_success(e.status);

        let attestation = if !success {
            None
        } else if let Some(amount) = &e.delivered_amount {
            let message = encoding::create_account_message(
                &e.bridge,
                &e.src,
                amount,
                &e.reward_amount,
                &reward_account,
                was_locking_chain_send,
                e.create_count,
                &e.other_chain_account,
            );
            let signature = crypto::sign(&self.keypair, &message);
            debug_assert!(crypto::verify(&self.signing_pk, &message, &signature));
            Some(AttestationCreateAccount {
                signing_pk: self.signing_pk.clone(),
                signature,
                sending_account: e.src,
                sending_amount: amount.clone(),
                reward_amount: e.reward_amount.clone(),
                reward_account,
                was_locking_chain_send,
                create_count: e.create_count,
                destination: e.other_chain_account,
            })
        } else {
            warn!(tx = %e.tx_hash, "missing delivered amount in successful account create");
            None
        };

        let row = CreateAccountRow {
            tx_hash: e.tx_hash.to_hex(),
            ledger_seq: e.ledger_seq,
            create_count: e.create_count,
            success,
            delivered_amt: e
                .delivered_amount
                .as_ref()
                .map(encoding::encode_amount)
                .unwrap_or_default(),
            reward_amt: encoding::encode_amount(&e.reward_amount),
            bridge: encoding::encode_bridge(&e.bridge),
            sending_account: e.src.to_vec(),
            reward_account: reward_account.to_vec(),
            other_chain_account: e.other_chain_account.to_vec(),
            public_key: self.signing_pk.clone(),
            signature: attestation
                .as_ref()
                .map(|a| a.signature.clone())
                .unwrap_or_default(),
        };
        if !self.store.insert_create_account(e.dir, &row).await? {
            debug!(tx = %e.tx_hash, create_count = e.create_count,
                   "create-account attestation already stored");
            self.on_duplicate(e.dir, e.rpc_order);
            return Ok(());
        }

        if let Some(attestation) = attestation {
            let dir_label = e.dir.to_string();
            self.metrics
                .attestations_signed
                .with_label_values(&[dir_label.as_str()])
                .inc();
            if e.rpc_order >= 0 {
                let buffer = if was_locking_chain_send {
                    &mut self.to_issuing_creates
                } else {
                    &mut self.to_locking_creates
                };
                buffer.push(attestation);
            }
        }
        self.submit(was_locking_chain_send, false);
        Ok(())
    }

    /// Settlement results are observed for monitoring only.
    fn on_transfer_result(&self, e: TransferResult) {
        info!(dir = %e.dir, tx = %e.tx_hash, claim_id = e.claim_id, ter = e.ter,
              "transfer result observed");
    }

    fn on_heartbeat(&mut self) {
        trace!("heartbeat");
        self.submit(true, true);
        self.submit(false, true);
    }

    /// Flush the buffers holding attestations about `from_locking_chain`
    /// events into one batch, when at a ledger boundary or past the soft
    /// cap. If submission is enabled the batch goes to the opposite chain,
    /// fire and forget; persistence is never rolled back on failure.
    fn submit(&mut self, from_locking_chain: bool, ledger_boundary: bool) {
        let buffered = if from_locking_chain {
            self.to_issuing_claims.len() + self.to_issuing_creates.len()
        } else {
            self.to_locking_claims.len() + self.to_locking_creates.len()
        };
        if buffered == 0 || !(ledger_boundary || buffered >= SUBMIT_SOFT_CAP) {
            return;
        }

        let (claims, creates) = if from_locking_chain {
            (
                std::mem::take(&mut self.to_issuing_claims),
                std::mem::take(&mut self.to_issuing_creates),
            )
        } else {
            (
                std::mem::take(&mut self.to_locking_claims),
                std::mem::take(&mut self.to_locking_creates),
            )
        };
        let batch = AttestationBatch {
            bridge: self.bridge.clone(),
            claims,
            creates,
        };

        let destination = if from_locking_chain {
            &self.issuing_client
        } else {
            &self.locking_client
        };
        let chain = if from_locking_chain { "issuing" } else { "locking" };
        self.metrics.batches_flushed.with_label_values(&[chain]).inc();

        if self.witness_submit {
            info!(chain, count = buffered, "submitting attestation batch");
            destination.send(
                "submit",
                json!({
                    "tx_json": {
                        "Account": self.submit_account.to_base58(),
                        "TransactionType": "XChainAddAttestation",
                        "XChainAttestationBatch": batch.to_json(),
                    }
                }),
            );
        } else {
            debug!(chain, count = buffered, "flushed attestation batch (submission disabled)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ChainClientHandle;
    use crate::events::TES_SUCCESS;
    use crate::types::{Amount, Issue, TxHash, ACCOUNT_ID_LEN};
    use serde_json::Value;

    const TEST_SEED: &str = "e42c82337ce12d4a7ad6cd65876d91b2ab6594fd50cdab1737c91773ba7451db";

    fn account(byte: u8) -> AccountId {
        AccountId([byte; ACCOUNT_ID_LEN])
    }

    fn test_bridge() -> BridgeSpec {
        BridgeSpec {
            locking_chain_door: account(1),
            locking_chain_issue: Issue {
                currency: "XBW".to_string(),
                issuer: None,
            },
            issuing_chain_door: account(2),
            issuing_chain_issue: Issue {
                currency: "XBW".to_string(),
                issuer: None,
            },
        }
    }

    struct Harness {
        federator: Federator,
        locking_rx: tokio::sync::mpsc::UnboundedReceiver<crate::client::Outbound>,
        issuing_rx: tokio::sync::mpsc::UnboundedReceiver<crate::client::Outbound>,
    }

    async fn harness(witness_submit: bool) -> Harness {
        let (locking_client, locking_rx) = ChainClientHandle::detached_for_testing("locking");
        let (issuing_client, issuing_rx) = ChainClientHandle::detached_for_testing("issuing");
        let store = Store::open_in_memory().await.unwrap();
        let keypair = crypto::keypair_from_seed_hex(TEST_SEED).unwrap();
        let federator = Federator::new(
            test_bridge(),
            keypair,
            account(10),
            account(11),
            witness_submit,
            store,
            locking_client,
            issuing_client,
            Arc::new(WitnessMetrics::new_for_testing()),
        );
        Harness {
            federator,
            locking_rx,
            issuing_rx,
        }
    }

    fn commit(claim_id: u64, rpc_order: i32, status: i32, tx_byte: u8) -> CommitDetected {
        CommitDetected {
            dir: Direction::LockingToIssuing,
            src: account(3),
            bridge: test_bridge(),
            delivered_amount: Some(Amount::Native(100)),
            claim_id,
            other_chain_account: Some(account(4)),
            ledger_seq: 42,
            tx_hash: TxHash([tx_byte; 32]),
            status,
            rpc_order,
        }
    }

    fn create_commit(create_count: u64, tx_byte: u8) -> AccountCreateCommitDetected {
        AccountCreateCommitDetected {
            dir: Direction::LockingToIssuing,
            src: account(3),
            bridge: test_bridge(),
            delivered_amount: Some(Amount::Native(50)),
            reward_amount: Amount::Native(10),
            create_count,
            other_chain_account: account(5),
            ledger_seq: 43,
            tx_hash: TxHash([tx_byte; 32]),
            status: TES_SUCCESS,
            rpc_order: 0,
        }
    }

    #[tokio::test]
    async fn successful_commit_stores_verifiable_attestation() {
        let mut h = harness(false).await;
        let e = commit(7, 0, TES_SUCCESS, 0x11);
        h.federator
            .handle_event(WitnessEvent::CommitDetected(e.clone()))
            .await
            .unwrap();

        let stored = h
            .federator
            .store
            .select_claim(
                Direction::LockingToIssuing,
                7,
                &encoding::encode_amount(&Amount::Native(100)),
                &encoding::encode_bridge(&test_bridge()),
                account(3).as_bytes(),
                account(4).as_bytes(),
            )
            .await
            .unwrap()
            .expect("one row should exist");

        // The reward account for a locking-to-issuing transfer is the
        // issuing side's.
        let message = encoding::claim_message(
            &e.bridge,
            &e.src,
            &Amount::Native(100),
            &account(11),
            true,
            7,
            Some(&account(4)),
        );
        assert!(crypto::verify(&stored.public_key, &message, &stored.signature));
        assert_eq!(h.federator.to_issuing_claims.len(), 1);
        assert!(h.federator.to_locking_claims.is_empty());
    }

    #[tokio::test]
    async fn duplicate_events_collapse_to_one_row() {
        let mut h = harness(false).await;
        // Historical first, then the same transaction live (S2)
        h.federator
            .handle_event(WitnessEvent::CommitDetected(commit(7, -3, TES_SUCCESS, 0x11)))
            .await
            .unwrap();
        h.federator
            .handle_event(WitnessEvent::CommitDetected(commit(7, 1, TES_SUCCESS, 0x11)))
            .await
            .unwrap();

        // One row, and only the historical copy was attested: the live
        // duplicate must not be buffered again.
        assert!(h.federator.to_issuing_claims.is_empty());
        assert!(h
            .federator
            .store
            .select_claim(
                Direction::LockingToIssuing,
                7,
                &encoding::encode_amount(&Amount::Native(100)),
                &encoding::encode_bridge(&test_bridge()),
                account(3).as_bytes(),
                account(4).as_bytes(),
            )
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn historical_duplicate_stops_backfill() {
        let mut h = harness(false).await;
        // Live first, then backfill catches up to the same transaction
        h.federator
            .handle_event(WitnessEvent::CommitDetected(commit(7, 1, TES_SUCCESS, 0x11)))
            .await
            .unwrap();
        h.federator
            .handle_event(WitnessEvent::CommitDetected(commit(7, -8, TES_SUCCESS, 0x11)))
            .await
            .unwrap();

        // The locking chain (the source of this transfer) gets the
        // unsubscribe.
        let out = h.locking_rx.try_recv().expect("stop-history should be sent");
        let v: Value = serde_json::from_str(&out.text).unwrap();
        assert_eq!(v["command"], "unsubscribe");
        assert_eq!(
            v["account_history_tx_stream"]["stop_history_tx_only"],
            true
        );
        assert!(h.issuing_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_commit_is_stored_unsigned_and_not_buffered() {
        let mut h = harness(false).await;
        h.federator
            .handle_event(WitnessEvent::CommitDetected(commit(9, 0, 104, 0x22)))
            .await
            .unwrap();

        assert!(h.federator.to_issuing_claims.is_empty());
        // Not visible through the success-only query path
        assert!(h
            .federator
            .store
            .select_claim(
                Direction::LockingToIssuing,
                9,
                &encoding::encode_amount(&Amount::Native(100)),
                &encoding::encode_bridge(&test_bridge()),
                account(3).as_bytes(),
                account(4).as_bytes(),
            )
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn historical_events_are_attested_but_not_buffered() {
        let mut h = harness(false).await;
        h.federator
            .handle_event(WitnessEvent::CommitDetected(commit(7, -1, TES_SUCCESS, 0x11)))
            .await
            .unwrap();
        assert!(h.federator.to_issuing_claims.is_empty());
        assert!(h
            .federator
            .store
            .select_claim(
                Direction::LockingToIssuing,
                7,
                &encoding::encode_amount(&Amount::Native(100)),
                &encoding::encode_bridge(&test_bridge()),
                account(3).as_bytes(),
                account(4).as_bytes(),
            )
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn transfer_result_is_log_only() {
        let mut h = harness(false).await;
        h.federator
            .handle_event(WitnessEvent::TransferResult(TransferResult {
                dir: Direction::LockingToIssuing,
                dst: account(4),
                delivered_amount: Some(Amount::Native(100)),
                claim_id: 7,
                ledger_seq: 44,
                tx_hash: TxHash([0x44; 32]),
                ter: TES_SUCCESS,
                rpc_order: 2,
            }))
            .await
            .unwrap();
        // No row appears in either claim table
        for dir in [Direction::LockingToIssuing, Direction::IssuingToLocking] {
            assert!(h
                .federator
                .store
                .select_claim(
                    dir,
                    7,
                    &encoding::encode_amount(&Amount::Native(100)),
                    &encoding::encode_bridge(&test_bridge()),
                    account(3).as_bytes(),
                    account(4).as_bytes(),
                )
                .await
                .unwrap()
                .is_none());
        }
    }

    #[tokio::test]
    async fn heartbeat_flushes_buffers_to_opposite_chain() {
        let mut h = harness(true).await;
        h.federator
            .handle_event(WitnessEvent::CommitDetected(commit(7, 0, TES_SUCCESS, 0x11)))
            .await
            .unwrap();
        h.federator
            .handle_event(WitnessEvent::AccountCreateCommitDetected(create_commit(3, 0x33)))
            .await
            .unwrap();
        assert!(h.issuing_rx.try_recv().is_err());

        h.federator
            .handle_event(WitnessEvent::HeartbeatTimer)
            .await
            .unwrap();

        // Locking-to-issuing attestations are submitted on the issuing
        // chain.
        let out = h.issuing_rx.try_recv().expect("batch should be submitted");
        let v: Value = serde_json::from_str(&out.text).unwrap();
        assert_eq!(v["command"], "submit");
        assert_eq!(v["tx_json"]["TransactionType"], "XChainAddAttestation");
        let batch = &v["tx_json"]["XChainAttestationBatch"];
        assert_eq!(batch["XChainClaimAttestations"][0]["XChainClaimID"], 7);
        assert_eq!(
            batch["XChainCreateAccountAttestations"][0]["XChainAccountCreateCount"],
            3
        );
        assert!(h.federator.to_issuing_claims.is_empty());
        assert!(h.federator.to_issuing_creates.is_empty());

        // Nothing was buffered for the locking chain, so no submission
        // there.
        assert!(h.locking_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn soft_cap_flushes_between_boundaries() {
        let mut h = harness(true).await;
        for i in 0..SUBMIT_SOFT_CAP as u64 {
            h.federator
                .handle_event(WitnessEvent::CommitDetected(commit(
                    i + 1,
                    0,
                    TES_SUCCESS,
                    i as u8 + 1,
                )))
                .await
                .unwrap();
        }
        let out = h.issuing_rx.try_recv().expect("soft cap should flush");
        let v: Value = serde_json::from_str(&out.text).unwrap();
        assert_eq!(
            v["tx_json"]["XChainAttestationBatch"]["XChainClaimAttestations"]
                .as_array()
                .unwrap()
                .len(),
            SUBMIT_SOFT_CAP
        );
    }

    #[tokio::test]
    async fn disabled_submission_still_clears_buffers() {
        let mut h = harness(false).await;
        h.federator
            .handle_event(WitnessEvent::CommitDetected(commit(7, 0, TES_SUCCESS, 0x11)))
            .await
            .unwrap();
        h.federator
            .handle_event(WitnessEvent::HeartbeatTimer)
            .await
            .unwrap();
        assert!(h.federator.to_issuing_claims.is_empty());
        assert!(h.issuing_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn replaying_the_same_log_is_byte_deterministic() {
        let events = vec![
            WitnessEvent::CommitDetected(commit(7, 0, TES_SUCCESS, 0x11)),
            WitnessEvent::AccountCreateCommitDetected(create_commit(3, 0x33)),
            WitnessEvent::CommitDetected(commit(8, 1, TES_SUCCESS, 0x12)),
        ];

        let mut outputs = Vec::new();
        for _ in 0..2 {
            let mut h = harness(true).await;
            for event in &events {
                h.federator.handle_event(event.clone()).await.unwrap();
            }
            h.federator
                .handle_event(WitnessEvent::HeartbeatTimer)
                .await
                .unwrap();
            let out = h.issuing_rx.try_recv().unwrap();
            outputs.push(out.text);
        }
        assert_eq!(outputs[0], outputs[1]);
    }

    #[tokio::test]
    async fn run_drains_and_stops_on_cancel() {
        let h = harness(false).await;
        let (event_tx, event_rx) = crate::queue::event_channel(16);
        let (ready_tx, ready_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(h.federator.run(event_rx, ready_rx, cancel.clone()));

        ready_tx.send(()).unwrap();
        event_tx
            .push(WitnessEvent::CommitDetected(commit(7, 0, TES_SUCCESS, 0x11)))
            .await;
        event_tx.push(WitnessEvent::HeartbeatTimer).await;
        tokio::task::yield_now().await;
        cancel.cancel();
        handle.await.unwrap().unwrap();
    }
}
