//! Flow comparison and the verdict.

use crate::flow::{emulated_flow, expected_flow, JettonKey, MoneyFlow};
use serde::{Deserialize, Serialize};
use std::fmt;
use tonnect_emulation::EmulationTrace;
use tonnect_primitives::{Coins, TonAddress};
use tonnect_protocol::TransactionRequest;

/// Outcome of cross-checking a transaction request.
///
/// `Unverified` is what an emulation failure produces; comparison itself
/// only ever yields `Valid` or `Mismatch`. An unverified request must never
/// be presented as a verified one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Valid,
    Mismatch(Vec<FlowMismatch>),
    Unverified(UnverifiedReason),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn is_mismatch(&self) -> bool {
        matches!(self, Self::Mismatch(_))
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => f.write_str("valid"),
            Self::Mismatch(mismatches) => {
                write!(f, "mismatch: ")?;
                for (i, m) in mismatches.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    m.fmt(f)?;
                }
                Ok(())
            }
            Self::Unverified(reason) => write!(f, "unverified: {reason}"),
        }
    }
}

/// Why no verdict could be produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnverifiedReason {
    /// The sending account has no on-chain state yet, so its first
    /// transaction cannot be emulated.
    AccountNotFound,
    EmulationFailed(String),
}

impl fmt::Display for UnverifiedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccountNotFound => f.write_str("sending account not found on chain"),
            Self::EmulationFailed(reason) => write!(f, "emulation failed: {reason}"),
        }
    }
}

/// One divergence between the expected and the emulated flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowMismatch {
    TonOutput { expected: Coins, emulated: Coins },
    TonInput { expected: Coins, emulated: Coins },
    JettonMissing { key: JettonKey },
    JettonUnexpected { key: JettonKey, amount: Coins },
    JettonAmount { key: JettonKey, expected: Coins, emulated: Coins },
}

impl fmt::Display for FlowMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TonOutput { expected, emulated } => write!(
                f,
                "ton outputs diverge: request claims {expected}, emulation shows {emulated}"
            ),
            Self::TonInput { expected, emulated } => write!(
                f,
                "ton inputs diverge: request implies {expected}, emulation shows {emulated}"
            ),
            Self::JettonMissing { key } => {
                write!(f, "jetton transfer {key} is in the request but not in the emulation")
            }
            Self::JettonUnexpected { key, amount } => write!(
                f,
                "emulation shows a jetton transfer of {amount} ({key}) the request does not claim"
            ),
            Self::JettonAmount { key, expected, emulated } => write!(
                f,
                "jetton transfer {key} amount diverges: request claims {expected}, emulation shows {emulated}"
            ),
        }
    }
}

/// Everything the preview layer needs: both flows and the verdict.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub expected: MoneyFlow,
    pub emulated: MoneyFlow,
    pub verdict: Verdict,
}

/// Compares two flows of the same account field by field.
///
/// Toncoin totals must match exactly in both directions; the outgoing
/// jetton sets must have the same keys with exactly equal amounts. Fees are
/// display data and never compared.
pub fn compare(expected: &MoneyFlow, emulated: &MoneyFlow) -> Verdict {
    let mut mismatches = Vec::new();

    let (exp_out, emu_out) = (expected.ton_out(), emulated.ton_out());
    if exp_out != emu_out {
        mismatches.push(FlowMismatch::TonOutput { expected: exp_out, emulated: emu_out });
    }
    let (exp_in, emu_in) = (expected.ton_in(), emulated.ton_in());
    if exp_in != emu_in {
        mismatches.push(FlowMismatch::TonInput { expected: exp_in, emulated: emu_in });
    }

    let exp_jettons = expected.jetton_outgoing();
    let emu_jettons = emulated.jetton_outgoing();
    for (key, exp_amount) in &exp_jettons {
        match emu_jettons.get(key) {
            None => mismatches.push(FlowMismatch::JettonMissing { key: key.clone() }),
            Some(emu_amount) if emu_amount != exp_amount => {
                mismatches.push(FlowMismatch::JettonAmount {
                    key: key.clone(),
                    expected: *exp_amount,
                    emulated: *emu_amount,
                });
            }
            Some(_) => {}
        }
    }
    for (key, amount) in &emu_jettons {
        if !exp_jettons.contains_key(key) {
            mismatches.push(FlowMismatch::JettonUnexpected { key: key.clone(), amount: *amount });
        }
    }

    if mismatches.is_empty() {
        Verdict::Valid
    } else {
        Verdict::Mismatch(mismatches)
    }
}

/// Derives both flows for `account` and compares them.
pub fn validate(
    account: TonAddress,
    request: &TransactionRequest,
    trace: &EmulationTrace,
) -> Validation {
    let expected = expected_flow(account, request);
    let emulated = emulated_flow(account, trace);
    let verdict = compare(&expected, &emulated);
    Validation { expected, emulated, verdict }
}
