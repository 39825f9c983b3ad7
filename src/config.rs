// Copyright (c) XBridge, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::crypto::{self, WitnessKeyPair, SIGNING_KEY_TYPE};
use crate::queue::DEFAULT_EVENT_QUEUE_SIZE;
use crate::storage::XCHAIN_DB_NAME;
use crate::types::{AccountId, BridgeSpec};
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_signing_key_type() -> String {
    SIGNING_KEY_TYPE.to_string()
}

fn default_db_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_heartbeat_interval_ms() -> u64 {
    1000
}

fn default_event_queue_size() -> usize {
    DEFAULT_EVENT_QUEUE_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WitnessNodeConfig {
    /// 32-byte hex seed of the witness signing key.
    pub signing_key: String,
    #[serde(default = "default_signing_key_type")]
    pub signing_key_type: String,
    /// Reward account this witness names on each chain.
    pub locking_chain_reward_account: AccountId,
    pub issuing_chain_reward_account: AccountId,
    /// Websocket endpoints of the two chain nodes.
    pub locking_chain_endpoint: String,
    pub issuing_chain_endpoint: String,
    /// Submit flushed attestation batches to the destination chain.
    #[serde(default)]
    pub witness_submit: bool,
    /// Sign witness requests on demand instead of consulting the store.
    /// Delegates trust to the caller; leave off unless you know better.
    #[serde(default)]
    pub sign_on_demand: bool,
    /// The port the query RPC listens on.
    pub rpc_listen_port: u16,
    #[serde(default = "default_db_dir")]
    pub db_dir: PathBuf,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_event_queue_size")]
    pub event_queue_size: usize,
    pub bridge: BridgeSpec,
}

impl WitnessNodeConfig {
    /// Load a config file, YAML or JSON by extension.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("failed to parse config {}", path.display()))?,
            _ => serde_json::from_str(&content)
                .with_context(|| format!("failed to parse config {}", path.display()))?,
        };
        Ok(config)
    }

    /// Decode and validate the signing key. A wrong key type or an
    /// undecodable seed aborts startup.
    pub fn signing_keypair(&self) -> anyhow::Result<WitnessKeyPair> {
        if self.signing_key_type != SIGNING_KEY_TYPE {
            return Err(anyhow!(
                "unsupported signing-key-type {:?}: this witness signs with {SIGNING_KEY_TYPE} keys",
                self.signing_key_type
            ));
        }
        crypto::keypair_from_seed_hex(&self.signing_key)
            .map_err(|e| anyhow!("failed to load signing key: {e}"))
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_dir.join(XCHAIN_DB_NAME)
    }
}
