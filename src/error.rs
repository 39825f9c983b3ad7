// Copyright (c) XBridge, Inc.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WitnessError {
    // The input does not parse as an account id
    #[error("invalid account: {0}")]
    InvalidAccount(String),
    // The input does not parse as a transaction hash
    #[error("invalid transaction hash: {0}")]
    InvalidTxHash(String),
    // The configured signing key is unusable
    #[error("signing key error: {0}")]
    SigningKey(String),
    // Chain connection failed or dropped before a reply arrived
    #[error("chain transport error: {0}")]
    Transport(String),
    // A correlated request got no reply in time
    #[error("request timed out: {0}")]
    RequestTimeout(String),
    // Attestation store failure
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

pub type WitnessResult<T> = Result<T, WitnessError>;
