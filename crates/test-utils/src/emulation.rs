//! Canned emulation clients and trace builders.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tonnect_emulation::{
    EmulationClient, EmulationError, EmulationRequest, EmulationTrace, Message, TraceNode,
    Transaction, TxDescription,
};
use tonnect_primitives::{Coins, TonAddress};

/// Answers every request with the same trace.
pub struct FixedEmulation {
    trace: EmulationTrace,
}

impl FixedEmulation {
    pub fn new(trace: EmulationTrace) -> Self {
        Self { trace }
    }
}

#[async_trait]
impl EmulationClient for FixedEmulation {
    async fn emulate(&self, _request: &EmulationRequest) -> Result<EmulationTrace, EmulationError> {
        Ok(self.trace.clone())
    }
}

/// Always fails, either as an undeployed account or as an outage.
pub struct FailingEmulation {
    account_not_found: bool,
}

impl FailingEmulation {
    pub fn account_not_found() -> Self {
        Self { account_not_found: true }
    }

    pub fn unavailable() -> Self {
        Self { account_not_found: false }
    }
}

#[async_trait]
impl EmulationClient for FailingEmulation {
    async fn emulate(&self, _request: &EmulationRequest) -> Result<EmulationTrace, EmulationError> {
        if self.account_not_found {
            Err(EmulationError::AccountNotFound)
        } else {
            Err(EmulationError::Endpoint { status: 503, body: "emulator offline".into() })
        }
    }
}

/// Forwards to an inner client and keeps every request for assertions.
pub struct RecordingEmulation<C> {
    inner: C,
    requests: Mutex<Vec<EmulationRequest>>,
}

impl<C> RecordingEmulation<C> {
    pub fn new(inner: C) -> Self {
        Self { inner, requests: Mutex::new(Vec::new()) }
    }

    pub fn requests(&self) -> Vec<EmulationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl<C: EmulationClient> EmulationClient for RecordingEmulation<C> {
    async fn emulate(&self, request: &EmulationRequest) -> Result<EmulationTrace, EmulationError> {
        self.requests.lock().push(request.clone());
        self.inner.emulate(request).await
    }
}

/// A one-transaction trace in which `wallet` sends exactly `nano` toncoin
/// to `recipient`, paying `fees`. Matches the expected flow of a request
/// with a single plain message of the same amount.
pub fn single_transfer_trace(
    wallet: TonAddress,
    recipient: TonAddress,
    nano: u128,
    fees: u128,
) -> EmulationTrace {
    let external_in = Message { destination: Some(wallet), ..Default::default() };
    let transfer = Message {
        source: Some(wallet),
        destination: Some(recipient),
        value: Some(Coins::from_nano(nano)),
        ..Default::default()
    };
    let tx = Transaction {
        hash: "root".into(),
        account: wallet,
        lt: 1,
        now: 1_700_000_000,
        total_fees: Coins::from_nano(fees),
        description: TxDescription::default(),
        in_msg: Some(external_in),
        out_msgs: vec![transfer],
    };
    EmulationTrace {
        trace: TraceNode { tx_hash: "root".into(), in_msg_hash: None, children: vec![] },
        transactions: HashMap::from([("root".to_string(), tx)]),
        address_book: HashMap::new(),
        metadata: HashMap::new(),
        actions: vec![],
    }
}
