// Copyright (c) XBridge, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

#[derive(Debug)]
pub struct WitnessMetrics {
    /// Bridge-relevant events decoded from a chain stream, by chain and
    /// event type.
    pub events_observed: IntCounterVec,
    /// Attestations signed, by direction.
    pub attestations_signed: IntCounterVec,
    /// Events that matched an already-stored attestation.
    pub duplicate_events: IntCounter,
    /// Attestation batches flushed, by destination chain.
    pub batches_flushed: IntCounterVec,
    /// Query RPC requests received, by command.
    pub rpc_requests: IntCounterVec,
    /// Query RPC requests answered with an error, by command.
    pub rpc_errors: IntCounterVec,
}

impl WitnessMetrics {
    pub fn new(registry: &Registry) -> Self {
        let events_observed = IntCounterVec::new(
            Opts::new("witness_events_observed", "Bridge events decoded from chain streams"),
            &["chain", "event_type"],
        )
        .unwrap();
        let attestations_signed = IntCounterVec::new(
            Opts::new("witness_attestations_signed", "Attestations signed"),
            &["direction"],
        )
        .unwrap();
        let duplicate_events = IntCounter::new(
            "witness_duplicate_events",
            "Events matching an already-stored attestation",
        )
        .unwrap();
        let batches_flushed = IntCounterVec::new(
            Opts::new("witness_batches_flushed", "Attestation batches flushed"),
            &["chain"],
        )
        .unwrap();
        let rpc_requests = IntCounterVec::new(
            Opts::new("witness_rpc_requests", "Query RPC requests received"),
            &["command"],
        )
        .unwrap();
        let rpc_errors = IntCounterVec::new(
            Opts::new("witness_rpc_errors", "Query RPC requests answered with an error"),
            &["command"],
        )
        .unwrap();
        for collector in [
            Box::new(events_observed.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(attestations_signed.clone()),
            Box::new(duplicate_events.clone()),
            Box::new(batches_flushed.clone()),
            Box::new(rpc_requests.clone()),
            Box::new(rpc_errors.clone()),
        ] {
            registry.register(collector).unwrap();
        }
        Self {
            events_observed,
            attestations_signed,
            duplicate_events,
            batches_flushed,
            rpc_requests,
            rpc_errors,
        }
    }

    pub fn new_for_testing() -> Self {
        Self::new(&Registry::new())
    }
}
