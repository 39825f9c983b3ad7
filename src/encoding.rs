// Copyright (c) XBridge, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Canonical byte encoding of attestation messages and of the blob columns
//! in the attestation store. All multi-byte integers are big-endian and all
//! variable-length fields carry a 4-byte big-endian length prefix, so the
//! same inputs always produce the same bytes. These bytes are what the
//! witness signs and what verification re-derives.

use crate::types::{AccountId, Amount, BridgeSpec, Issue};

pub const CLAIM_MESSAGE_PREFIX: &[u8] = b"XBWD_ATTEST_CLAIM";
pub const CREATE_ACCOUNT_MESSAGE_PREFIX: &[u8] = b"XBWD_ATTEST_CREATE";

const NATIVE_AMOUNT_TAG: u8 = 0x00;
const ISSUED_AMOUNT_TAG: u8 = 0x01;
const ABSENT_TAG: u8 = 0x00;
const PRESENT_TAG: u8 = 0x01;

fn put_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn put_optional_account(out: &mut Vec<u8>, account: Option<&AccountId>) {
    match account {
        Some(a) => {
            out.push(PRESENT_TAG);
            out.extend_from_slice(a.as_bytes());
        }
        None => out.push(ABSENT_TAG),
    }
}

pub fn encode_issue(issue: &Issue) -> Vec<u8> {
    let mut out = Vec::new();
    put_len_prefixed(&mut out, issue.currency.as_bytes());
    put_optional_account(&mut out, issue.issuer.as_ref());
    out
}

pub fn encode_amount(amount: &Amount) -> Vec<u8> {
    let mut out = Vec::new();
    match amount {
        Amount::Native(value) => {
            out.push(NATIVE_AMOUNT_TAG);
            out.extend_from_slice(&value.to_be_bytes());
        }
        Amount::Issued { value, issue } => {
            out.push(ISSUED_AMOUNT_TAG);
            put_len_prefixed(&mut out, &encode_issue(issue));
            out.extend_from_slice(&value.to_be_bytes());
        }
    }
    out
}

pub fn encode_bridge(bridge: &BridgeSpec) -> Vec<u8> {
    let mut out = Vec::new();
    put_len_prefixed(&mut out, bridge.locking_chain_door.as_bytes());
    put_len_prefixed(&mut out, &encode_issue(&bridge.locking_chain_issue));
    put_len_prefixed(&mut out, bridge.issuing_chain_door.as_bytes());
    put_len_prefixed(&mut out, &encode_issue(&bridge.issuing_chain_issue));
    out
}

/// The signed message for a claim attestation: a deterministic encoding of
/// `(bridge, sending account, amount, reward account, direction, claim id,
/// destination?)`.
pub fn claim_message(
    bridge: &BridgeSpec,
    sending_account: &AccountId,
    sending_amount: &Amount,
    reward_account: &AccountId,
    was_locking_chain_send: bool,
    claim_id: u64,
    destination: Option<&AccountId>,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);
    out.extend_from_slice(CLAIM_MESSAGE_PREFIX);
    put_len_prefixed(&mut out, &encode_bridge(bridge));
    out.extend_from_slice(sending_account.as_bytes());
    put_len_prefixed(&mut out, &encode_amount(sending_amount));
    out.extend_from_slice(reward_account.as_bytes());
    out.push(was_locking_chain_send as u8);
    out.extend_from_slice(&claim_id.to_be_bytes());
    put_optional_account(&mut out, destination);
    out
}

/// The signed message for an account-create attestation. As the claim
/// message, with the reward amount and create count in place of the claim
/// id, and a mandatory destination.
pub fn create_account_message(
    bridge: &BridgeSpec,
    sending_account: &AccountId,
    sending_amount: &Amount,
    reward_amount: &Amount,
    reward_account: &AccountId,
    was_locking_chain_send: bool,
    create_count: u64,
    destination: &AccountId,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(160);
    out.extend_from_slice(CREATE_ACCOUNT_MESSAGE_PREFIX);
    put_len_prefixed(&mut out, &encode_bridge(bridge));
    out.extend_from_slice(sending_account.as_bytes());
    put_len_prefixed(&mut out, &encode_amount(sending_amount));
    put_len_prefixed(&mut out, &encode_amount(reward_amount));
    out.extend_from_slice(reward_account.as_bytes());
    out.push(was_locking_chain_send as u8);
    out.extend_from_slice(&create_count.to_be_bytes());
    out.extend_from_slice(destination.as_bytes());
    out
}
