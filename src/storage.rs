// Copyright (c) XBridge, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The attestation store: a SQLite file with four tables, two directions
//! times {claim, create-account}. Rows are written once by the federator
//! and read by the query RPC. Blob columns hold the canonical byte
//! encodings from `encoding`, so lookups compare bytes exactly. A unique
//! index on the logical key makes duplicate events collapse to one row.

use crate::error::WitnessResult;
use crate::types::Direction;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::info;

pub const XCHAIN_DB_NAME: &str = "xchain_txns.db";

fn claim_table(dir: Direction) -> &'static str {
    match dir {
        Direction::LockingToIssuing => "XChainTxnLockingToIssuing",
        Direction::IssuingToLocking => "XChainTxnIssuingToLocking",
    }
}

fn create_account_table(dir: Direction) -> &'static str {
    match dir {
        Direction::LockingToIssuing => "XChainCreateAccountLockingToIssuing",
        Direction::IssuingToLocking => "XChainCreateAccountIssuingToLocking",
    }
}

/// One stored claim attestation. `signature` is empty when the witnessed
/// transaction did not succeed (the row is kept for audit).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimRow {
    pub tx_hash: String,
    pub ledger_seq: u32,
    pub claim_id: u64,
    pub success: bool,
    pub delivered_amt: Vec<u8>,
    pub bridge: Vec<u8>,
    pub sending_account: Vec<u8>,
    pub reward_account: Vec<u8>,
    pub other_chain_account: Vec<u8>,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

/// One stored create-account attestation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateAccountRow {
    pub tx_hash: String,
    pub ledger_seq: u32,
    pub create_count: u64,
    pub success: bool,
    pub delivered_amt: Vec<u8>,
    pub reward_amt: Vec<u8>,
    pub bridge: Vec<u8>,
    pub sending_account: Vec<u8>,
    pub reward_account: Vec<u8>,
    pub other_chain_account: Vec<u8>,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

/// The columns the query RPC needs to reconstruct an attestation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredAttestation {
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
    pub reward_account: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the attestation database and its schema.
    pub async fn open(path: &Path) -> WitnessResult<Self> {
        info!("opening attestation store at {}", path.display());
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .pragma("journal_size_limit", "1582080");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Store { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory store for tests. A single connection, or every pool
    /// checkout would see its own empty database.
    #[cfg(test)]
    pub async fn open_in_memory() -> WitnessResult<Self> {
        let options: SqliteConnectOptions = "sqlite::memory:".parse()?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Store { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> WitnessResult<()> {
        for dir in [Direction::LockingToIssuing, Direction::IssuingToLocking] {
            let table = claim_table(dir);
            sqlx::query(&format!(
                r#"CREATE TABLE IF NOT EXISTS {table} (
                    TransID           TEXT PRIMARY KEY,
                    LedgerSeq         INTEGER NOT NULL,
                    ClaimID           INTEGER NOT NULL,
                    Success           INTEGER NOT NULL,
                    DeliveredAmt      BLOB NOT NULL,
                    Bridge            BLOB NOT NULL,
                    SendingAccount    BLOB NOT NULL,
                    RewardAccount     BLOB NOT NULL,
                    OtherChainAccount BLOB NOT NULL,
                    PublicKey         BLOB NOT NULL,
                    Signature         BLOB NOT NULL
                )"#
            ))
            .execute(&self.pool)
            .await?;
            sqlx::query(&format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {table}KeyIdx ON {table}(ClaimID, Bridge)"
            ))
            .execute(&self.pool)
            .await?;

            let table = create_account_table(dir);
            sqlx::query(&format!(
                r#"CREATE TABLE IF NOT EXISTS {table} (
                    TransID           TEXT PRIMARY KEY,
                    LedgerSeq         INTEGER NOT NULL,
                    CreateCount       INTEGER NOT NULL,
                    Success           INTEGER NOT NULL,
                    DeliveredAmt      BLOB NOT NULL,
                    RewardAmt         BLOB NOT NULL,
                    Bridge            BLOB NOT NULL,
                    SendingAccount    BLOB NOT NULL,
                    RewardAccount     BLOB NOT NULL,
                    OtherChainAccount BLOB NOT NULL,
                    PublicKey         BLOB NOT NULL,
                    Signature         BLOB NOT NULL
                )"#
            ))
            .execute(&self.pool)
            .await?;
            sqlx::query(&format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {table}KeyIdx ON {table}(CreateCount, Bridge)"
            ))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Insert a claim attestation row. Returns false when an equivalent row
    /// (same transaction, or same claim id on this bridge) already exists.
    pub async fn insert_claim(&self, dir: Direction, row: &ClaimRow) -> WitnessResult<bool> {
        let table = claim_table(dir);
        let result = sqlx::query(&format!(
            r#"INSERT OR IGNORE INTO {table}
               (TransID, LedgerSeq, ClaimID, Success, DeliveredAmt, Bridge,
                SendingAccount, RewardAccount, OtherChainAccount, PublicKey, Signature)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        ))
        .bind(&row.tx_hash)
        .bind(row.ledger_seq as i64)
        .bind(row.claim_id as i64)
        .bind(row.success as i64)
        .bind(&row.delivered_amt)
        .bind(&row.bridge)
        .bind(&row.sending_account)
        .bind(&row.reward_account)
        .bind(&row.other_chain_account)
        .bind(&row.public_key)
        .bind(&row.signature)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Insert a create-account attestation row; same semantics as
    /// `insert_claim`.
    pub async fn insert_create_account(
        &self,
        dir: Direction,
        row: &CreateAccountRow,
    ) -> WitnessResult<bool> {
        let table = create_account_table(dir);
        let result = sqlx::query(&format!(
            r#"INSERT OR IGNORE INTO {table}
               (TransID, LedgerSeq, CreateCount, Success, DeliveredAmt, RewardAmt, Bridge,
                SendingAccount, RewardAccount, OtherChainAccount, PublicKey, Signature)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        ))
        .bind(&row.tx_hash)
        .bind(row.ledger_seq as i64)
        .bind(row.create_count as i64)
        .bind(row.success as i64)
        .bind(&row.delivered_amt)
        .bind(&row.reward_amt)
        .bind(&row.bridge)
        .bind(&row.sending_account)
        .bind(&row.reward_account)
        .bind(&row.other_chain_account)
        .bind(&row.public_key)
        .bind(&row.signature)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Look up the successful claim attestation matching the full logical
    /// key. The unique index guarantees at most one row.
    pub async fn select_claim(
        &self,
        dir: Direction,
        claim_id: u64,
        delivered_amt: &[u8],
        bridge: &[u8],
        sending_account: &[u8],
        other_chain_account: &[u8],
    ) -> WitnessResult<Option<StoredAttestation>> {
        let table = claim_table(dir);
        let row = sqlx::query(&format!(
            r#"SELECT Signature, PublicKey, RewardAccount FROM {table}
               WHERE ClaimID = ? AND Success = 1 AND DeliveredAmt = ?
                 AND Bridge = ? AND SendingAccount = ? AND OtherChainAccount = ?"#
        ))
        .bind(claim_id as i64)
        .bind(delivered_amt)
        .bind(bridge)
        .bind(sending_account)
        .bind(other_chain_account)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| StoredAttestation {
            signature: r.get("Signature"),
            public_key: r.get("PublicKey"),
            reward_account: r.get("RewardAccount"),
        }))
    }

    /// Look up the successful create-account attestation matching the full
    /// logical key.
    #[allow(clippy::too_many_arguments)]
    pub async fn select_create_account(
        &self,
        dir: Direction,
        create_count: u64,
        delivered_amt: &[u8],
        reward_amt: &[u8],
        bridge: &[u8],
        sending_account: &[u8],
        other_chain_account: &[u8],
    ) -> WitnessResult<Option<StoredAttestation>> {
        let table = create_account_table(dir);
        let row = sqlx::query(&format!(
            r#"SELECT Signature, PublicKey, RewardAccount FROM {table}
               WHERE CreateCount = ? AND Success = 1 AND DeliveredAmt = ? AND RewardAmt = ?
                 AND Bridge = ? AND SendingAccount = ? AND OtherChainAccount = ?"#
        ))
        .bind(create_count as i64)
        .bind(delivered_amt)
        .bind(reward_amt)
        .bind(bridge)
        .bind(sending_account)
        .bind(other_chain_account)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| StoredAttestation {
            signature: r.get("Signature"),
            public_key: r.get("PublicKey"),
            reward_account: r.get("RewardAccount"),
        }))
    }

    pub async fn close(&self) {
        info!("closing attestation store");
        self.pool.close().await;
    }
}
