// Copyright (c) XBridge, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Query RPC command handlers. Every response carries the request back
//! under `request`, and either a `result` or an `error` string; transport
//! status is always 200.

use super::AppState;
use crate::crypto;
use crate::encoding;
use crate::types::{
    AccountId, Amount, AttestationBatch, AttestationClaim, AttestationCreateAccount, BridgeSpec,
    Direction,
};
use serde_json::{json, Value};
use tracing::{info, warn};

pub async fn do_command(state: &AppState, request: Value) -> Value {
    let command = request
        .get("command")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    state
        .metrics
        .rpc_requests
        .with_label_values(&[command.as_str()])
        .inc();

    let response = match command.as_str() {
        "stop" => do_stop(state, request),
        "server_info" => do_server_info(request),
        "witness" => do_witness(state, request).await,
        "witness_account_create" => do_witness_account_create(state, request).await,
        _ => json!({
            "request": request,
            "error": format!("No such method: {command}"),
        }),
    };
    if response.get("error").is_some() {
        state
            .metrics
            .rpc_errors
            .with_label_values(&[command.as_str()])
            .inc();
    }
    response
}

fn do_stop(state: &AppState, request: Value) -> Value {
    info!("stop requested over RPC");
    state.shutdown.cancel();
    json!({ "request": request, "result": "stopping" })
}

fn do_server_info(request: Value) -> Value {
    json!({ "request": request, "result": "normal" })
}

fn opt_bridge(request: &Value, field: &str) -> Option<BridgeSpec> {
    request.get(field).and_then(BridgeSpec::from_json)
}

fn opt_amount(request: &Value, field: &str) -> Option<Amount> {
    request.get(field).and_then(Amount::from_json)
}

fn opt_account(request: &Value, field: &str) -> Option<AccountId> {
    request
        .get(field)
        .and_then(Value::as_str)
        .and_then(|s| AccountId::from_base58(s).ok())
}

fn opt_u64(request: &Value, field: &str) -> Option<u64> {
    let v = request.get(field)?;
    v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

fn missing_field_error(request: Value, field: &str) -> Value {
    json!({
        "request": request,
        "error": format!("Missing or invalid field: {field}"),
    })
}

/// Map the door account named in a request onto the direction whose table
/// holds the attestation.
fn direction_for_door(bridge: &BridgeSpec, door: &AccountId) -> Option<Direction> {
    if *door == bridge.locking_chain_door {
        Some(Direction::LockingToIssuing)
    } else if *door == bridge.issuing_chain_door {
        Some(Direction::IssuingToLocking)
    } else {
        None
    }
}

async fn do_witness(state: &AppState, request: Value) -> Value {
    let Some(bridge) = opt_bridge(&request, "bridge") else {
        return missing_field_error(request, "bridge");
    };
    let Some(sending_amount) = opt_amount(&request, "sending_amount") else {
        return missing_field_error(request, "sending_amount");
    };
    let Some(claim_id) = opt_u64(&request, "claim_id") else {
        return missing_field_error(request, "claim_id");
    };
    let Some(door) = opt_account(&request, "door") else {
        return missing_field_error(request, "door");
    };
    let Some(sending_account) = opt_account(&request, "sending_account") else {
        return missing_field_error(request, "sending_account");
    };
    let Some(reward_account) = opt_account(&request, "reward_account") else {
        return missing_field_error(request, "reward_account");
    };
    let destination = opt_account(&request, "destination");

    let Some(dir) = direction_for_door(&bridge, &door) else {
        return json!({
            "request": request,
            "error": "Specified door account does not match any bridge door account",
        });
    };
    let was_locking_chain_send = dir.was_locking_chain_send();

    if state.sign_on_demand {
        let message = encoding::claim_message(
            &bridge,
            &sending_account,
            &sending_amount,
            &reward_account,
            was_locking_chain_send,
            claim_id,
            destination.as_ref(),
        );
        let signature = crypto::sign(&state.keypair, &message);
        let claim = AttestationClaim {
            signing_pk: crypto::public_key_bytes(&state.keypair),
            signature,
            sending_account,
            sending_amount,
            reward_account,
            was_locking_chain_send,
            claim_id,
            destination,
        };
        return batch_result(request, &bridge, Some(claim), None);
    }

    let stored = match state
        .store
        .select_claim(
            dir,
            claim_id,
            &encoding::encode_amount(&sending_amount),
            &encoding::encode_bridge(&bridge),
            sending_account.as_bytes(),
            &destination
                .as_ref()
                .map(AccountId::to_vec)
                .unwrap_or_default(),
        )
        .await
    {
        Ok(row) => row,
        Err(e) => {
            warn!(error = %e, "witness lookup failed");
            return json!({ "request": request, "error": "No such transaction" });
        }
    };

    match stored {
        Some(stored) => {
            let Ok(stored_reward_account) = AccountId::from_slice(&stored.reward_account) else {
                warn!("stored reward account is corrupt");
                return json!({ "request": request, "error": "No such transaction" });
            };
            let claim = AttestationClaim {
                signing_pk: stored.public_key,
                signature: stored.signature,
                sending_account,
                sending_amount,
                reward_account: stored_reward_account,
                was_locking_chain_send,
                claim_id,
                destination,
            };
            batch_result(request, &bridge, Some(claim), None)
        }
        None => json!({ "request": request, "error": "No such transaction" }),
    }
}

async fn do_witness_account_create(state: &AppState, request: Value) -> Value {
    let Some(bridge) = opt_bridge(&request, "bridge") else {
        return missing_field_error(request, "bridge");
    };
    let Some(sending_amount) = opt_amount(&request, "sending_amount") else {
        return missing_field_error(request, "sending_amount");
    };
    let Some(reward_amount) = opt_amount(&request, "reward_amount") else {
        return missing_field_error(request, "reward_amount");
    };
    let Some(create_count) = opt_u64(&request, "create_count") else {
        return missing_field_error(request, "create_count");
    };
    let Some(door) = opt_account(&request, "door") else {
        return missing_field_error(request, "door");
    };
    let Some(sending_account) = opt_account(&request, "sending_account") else {
        return missing_field_error(request, "sending_account");
    };
    let Some(reward_account) = opt_account(&request, "reward_account") else {
        return missing_field_error(request, "reward_account");
    };
    let Some(destination) = opt_account(&request, "destination") else {
        return missing_field_error(request, "destination");
    };

    let Some(dir) = direction_for_door(&bridge, &door) else {
        return json!({
            "request": request,
            "error": "Specified door account does not match any bridge door account",
        });
    };
    let was_locking_chain_send = dir.was_locking_chain_send();

    if state.sign_on_demand {
        let message = encoding::create_account_message(
            &bridge,
            &sending_account,
            &sending_amount,
            &reward_amount,
            &reward_account,
            was_locking_chain_send,
            create_count,
            &destination,
        );
        let signature = crypto::sign(&state.keypair, &message);
        let create = AttestationCreateAccount {
            signing_pk: crypto::public_key_bytes(&state.keypair),
            signature,
            sending_account,
            sending_amount,
            reward_amount,
            reward_account,
            was_locking_chain_send,
            create_count,
            destination,
        };
        return batch_result(request, &bridge, None, Some(create));
    }

    let stored = match state
        .store
        .select_create_account(
            dir,
            create_count,
            &encoding::encode_amount(&sending_amount),
            &encoding::encode_amount(&reward_amount),
            &encoding::encode_bridge(&bridge),
            sending_account.as_bytes(),
            destination.as_bytes(),
        )
        .await
    {
        Ok(row) => row,
        Err(e) => {
            warn!(error = %e, "witness_account_create lookup failed");
            return json!({ "request": request, "error": "No such transaction" });
        }
    };

    match stored {
        Some(stored) => {
            let Ok(stored_reward_account) = AccountId::from_slice(&stored.reward_account) else {
                warn!("stored reward account is corrupt");
                return json!({ "request": request, "error": "No such transaction" });
            };
            let create = AttestationCreateAccount {
                signing_pk: stored.public_key,
                signature: stored.signature,
                sending_account,
                sending_amount,
                reward_amount,
                reward_account: stored_reward_account,
                was_locking_chain_send,
                create_count,
                destination,
            };
            batch_result(request, &bridge, None, Some(create))
        }
        None => json!({ "request": request, "error": "No such transaction" }),
    }
}

fn batch_result(
    request: Value,
    bridge: &BridgeSpec,
    claim: Option<AttestationClaim>,
    create: Option<AttestationCreateAccount>,
) -> Value {
    let batch = AttestationBatch {
        bridge: bridge.clone(),
        claims: claim.into_iter().collect(),
        creates: create.into_iter().collect(),
    };
    json!({
        "request": request,
        "result": { "XChainAttestationBatch": batch.to_json() },
    })
}
