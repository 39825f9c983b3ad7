// Copyright (c) XBridge, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Core bridge types shared by the listeners, the federator, the store and
//! the query RPC. JSON encodings here are the canonical upstream encodings:
//! accounts are base58 strings, native amounts are decimal strings, issued
//! amounts and bridges are objects with their on-chain field names.

use crate::error::{WitnessError, WitnessResult};
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

pub const ACCOUNT_ID_LEN: usize = 20;
pub const TX_HASH_LEN: usize = 32;

/// A 20-byte chain account identifier, base58 on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId(pub [u8; ACCOUNT_ID_LEN]);

impl AccountId {
    pub fn from_base58(s: &str) -> WitnessResult<Self> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| WitnessError::InvalidAccount(format!("{s}: {e}")))?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> WitnessResult<Self> {
        if bytes.len() != ACCOUNT_ID_LEN {
            return Err(WitnessError::InvalidAccount(format!(
                "expected {ACCOUNT_ID_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut id = [0u8; ACCOUNT_ID_LEN];
        id.copy_from_slice(bytes);
        Ok(AccountId(id))
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        AccountId::from_base58(&s).map_err(D::Error::custom)
    }
}

/// A 256-bit transaction hash, hex on the wire and in the store.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; TX_HASH_LEN]);

impl TxHash {
    pub fn from_hex(s: &str) -> WitnessResult<Self> {
        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| WitnessError::InvalidTxHash(format!("{s}: {e}")))?;
        if bytes.len() != TX_HASH_LEN {
            return Err(WitnessError::InvalidTxHash(format!(
                "expected {TX_HASH_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut hash = [0u8; TX_HASH_LEN];
        hash.copy_from_slice(&bytes);
        Ok(TxHash(hash))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Direction of a cross-chain transfer. Every event and attestation is
/// tagged with the direction of the transfer it witnesses, not the chain
/// that observed it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    LockingToIssuing,
    IssuingToLocking,
}

impl Direction {
    pub fn was_locking_chain_send(self) -> bool {
        matches!(self, Direction::LockingToIssuing)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::LockingToIssuing => write!(f, "locking-to-issuing"),
            Direction::IssuingToLocking => write!(f, "issuing-to-locking"),
        }
    }
}

/// Asset identifier: a currency code plus its issuer. The native asset has
/// no issuer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<AccountId>,
}

/// An amount of value on one chain. Native amounts travel as decimal
/// strings (the chain's smallest unit); issued amounts as objects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Amount {
    Native(u64),
    Issued { value: u64, issue: Issue },
}

impl Amount {
    pub fn from_json(v: &Value) -> Option<Amount> {
        serde_json::from_value(v.clone()).ok()
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Amount::Native(v) => serializer.serialize_str(&v.to_string()),
            Amount::Issued { value, issue } => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("currency", &issue.currency)?;
                if let Some(issuer) = &issue.issuer {
                    map.serialize_entry("issuer", issuer)?;
                }
                map.serialize_entry("value", &value.to_string())?;
                map.end()
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum U64Repr {
    Num(u64),
    Str(String),
}

impl U64Repr {
    fn get(self) -> Result<u64, String> {
        match self {
            U64Repr::Num(n) => Ok(n),
            U64Repr::Str(s) => s.parse().map_err(|e| format!("{s}: {e}")),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AmountRepr {
    Native(U64Repr),
    Issued {
        currency: String,
        #[serde(default)]
        issuer: Option<AccountId>,
        value: U64Repr,
    },
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match AmountRepr::deserialize(deserializer)? {
            AmountRepr::Native(v) => Ok(Amount::Native(v.get().map_err(D::Error::custom)?)),
            AmountRepr::Issued {
                currency,
                issuer,
                value,
            } => Ok(Amount::Issued {
                value: value.get().map_err(D::Error::custom)?,
                issue: Issue { currency, issuer },
            }),
        }
    }
}

/// The bridge identity: one door account and one issue per chain. Immutable
/// for the witness' lifetime and shared by both listeners. Field names are
/// the on-chain `XChainBridge` object's.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSpec {
    #[serde(rename = "LockingChainDoor")]
    pub locking_chain_door: AccountId,
    #[serde(rename = "LockingChainIssue")]
    pub locking_chain_issue: Issue,
    #[serde(rename = "IssuingChainDoor")]
    pub issuing_chain_door: AccountId,
    #[serde(rename = "IssuingChainIssue")]
    pub issuing_chain_issue: Issue,
}

impl BridgeSpec {
    pub fn from_json(v: &Value) -> Option<BridgeSpec> {
        serde_json::from_value(v.clone()).ok()
    }
}

mod hex_blob {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }
}

/// A signed witness statement about one cross-chain commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AttestationClaim {
    #[serde(rename = "SigningPublicKey", serialize_with = "hex_blob::serialize")]
    pub signing_pk: Vec<u8>,
    #[serde(rename = "Signature", serialize_with = "hex_blob::serialize")]
    pub signature: Vec<u8>,
    #[serde(rename = "SendingAccount")]
    pub sending_account: AccountId,
    #[serde(rename = "SendingAmount")]
    pub sending_amount: Amount,
    #[serde(rename = "RewardAccount")]
    pub reward_account: AccountId,
    #[serde(rename = "WasLockingChainSend")]
    pub was_locking_chain_send: bool,
    #[serde(rename = "XChainClaimID")]
    pub claim_id: u64,
    #[serde(rename = "Destination", skip_serializing_if = "Option::is_none")]
    pub destination: Option<AccountId>,
}

/// A signed witness statement about one cross-chain account create.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AttestationCreateAccount {
    #[serde(rename = "SigningPublicKey", serialize_with = "hex_blob::serialize")]
    pub signing_pk: Vec<u8>,
    #[serde(rename = "Signature", serialize_with = "hex_blob::serialize")]
    pub signature: Vec<u8>,
    #[serde(rename = "SendingAccount")]
    pub sending_account: AccountId,
    #[serde(rename = "SendingAmount")]
    pub sending_amount: Amount,
    #[serde(rename = "RewardAmount")]
    pub reward_amount: Amount,
    #[serde(rename = "RewardAccount")]
    pub reward_account: AccountId,
    #[serde(rename = "WasLockingChainSend")]
    pub was_locking_chain_send: bool,
    #[serde(rename = "XChainAccountCreateCount")]
    pub create_count: u64,
    #[serde(rename = "Destination")]
    pub destination: AccountId,
}

/// A set of attestations submitted together, grouped by bridge. The JSON
/// encoding is the canonical on-chain encoding and is bit-reproducible for
/// a given input set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AttestationBatch {
    #[serde(rename = "XChainBridge")]
    pub bridge: BridgeSpec,
    #[serde(rename = "XChainClaimAttestations")]
    pub claims: Vec<AttestationClaim>,
    #[serde(rename = "XChainCreateAccountAttestations")]
    pub creates: Vec<AttestationCreateAccount>,
}

impl AttestationBatch {
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).expect("batch encoding should not fail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn account(byte: u8) -> AccountId {
        AccountId([byte; ACCOUNT_ID_LEN])
    }

    #[test]
    fn account_base58_round_trip() {
        let a = account(7);
        let encoded = a.to_base58();
        assert_eq!(AccountId::from_base58(&encoded).unwrap(), a);
    }

    #[test]
    fn account_rejects_bad_input() {
        assert!(AccountId::from_base58("0OIl").is_err());
        assert!(AccountId::from_base58(&bs58::encode([1u8; 5]).into_string()).is_err());
        assert!(AccountId::from_slice(&[0u8; 19]).is_err());
    }

    #[test]
    fn tx_hash_round_trip() {
        let h = TxHash([0xab; TX_HASH_LEN]);
        assert_eq!(TxHash::from_hex(&h.to_hex()).unwrap(), h);
        assert_eq!(TxHash::from_hex(&format!("0x{}", h.to_hex())).unwrap(), h);
        assert!(TxHash::from_hex("abcd").is_err());
        assert!(TxHash::from_hex("zz").is_err());
    }

    #[test]
    fn native_amount_json() {
        let amt = Amount::Native(100);
        assert_eq!(serde_json::to_value(&amt).unwrap(), json!("100"));
        assert_eq!(Amount::from_json(&json!("100")).unwrap(), amt);
        // Bare numbers are tolerated on input
        assert_eq!(Amount::from_json(&json!(100)).unwrap(), amt);
        assert!(Amount::from_json(&json!("not a number")).is_none());
    }

    #[test]
    fn issued_amount_json() {
        let amt = Amount::Issued {
            value: 42,
            issue: Issue {
                currency: "USD".to_string(),
                issuer: Some(account(9)),
            },
        };
        let v = serde_json::to_value(&amt).unwrap();
        assert_eq!(v["currency"], "USD");
        assert_eq!(v["value"], "42");
        assert_eq!(Amount::from_json(&v).unwrap(), amt);
    }

    #[test]
    fn bridge_spec_json_round_trip() {
        let bridge = BridgeSpec {
            locking_chain_door: account(1),
            locking_chain_issue: Issue {
                currency: "XBW".to_string(),
                issuer: None,
            },
            issuing_chain_door: account(2),
            issuing_chain_issue: Issue {
                currency: "XBW".to_string(),
                issuer: Some(account(2)),
            },
        };
        let v = serde_json::to_value(&bridge).unwrap();
        assert_eq!(v["LockingChainDoor"], account(1).to_base58());
        assert_eq!(BridgeSpec::from_json(&v).unwrap(), bridge);
        // A different door is a different bridge
        let mut other = bridge.clone();
        other.issuing_chain_door = account(3);
        assert_ne!(BridgeSpec::from_json(&v).unwrap(), other);
    }

    #[test]
    fn batch_json_is_deterministic() {
        let bridge = BridgeSpec {
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
        };
        let batch = AttestationBatch {
            bridge,
            claims: vec![AttestationClaim {
                signing_pk: vec![0xaa; 32],
                signature: vec![0xbb; 64],
                sending_account: account(3),
                sending_amount: Amount::Native(100),
                reward_account: account(4),
                was_locking_chain_send: true,
                claim_id: 7,
                destination: Some(account(5)),
            }],
            creates: vec![],
        };
        let a = serde_json::to_string(&batch.to_json()).unwrap();
        let b = serde_json::to_string(&batch.to_json()).unwrap();
        assert_eq!(a, b);
        let v = batch.to_json();
        assert_eq!(v["XChainClaimAttestations"][0]["XChainClaimID"], 7);
        assert_eq!(
            v["XChainClaimAttestations"][0]["Signature"],
            hex::encode(vec![0xbb; 64])
        );
    }
}
