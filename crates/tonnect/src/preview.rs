//! Building the money-flow preview for a transaction request.

use serde::Serialize;
use tonnect_emulation::{EmulationClient, EmulationError, EmulationRequest, EmulationTrace};
use tonnect_primitives::TonAddress;
use tonnect_protocol::TransactionRequest;
use tonnect_validator::{expected_flow, validate, MoneyFlow, UnverifiedReason, Verdict};

/// What the host shows next to a transaction request.
///
/// The expected flow is always derived from the request itself; emulated
/// figures are attached alongside and never substituted for it, so a lying
/// emulator cannot make a request look cheaper than it claims to be.
#[derive(Clone, Debug, Serialize)]
pub struct Preview {
    pub verdict: Verdict,
    /// What the request claims will happen.
    pub expected: MoneyFlow,
    /// What the emulation says will happen, when it ran.
    pub emulated: Option<MoneyFlow>,
    /// The full trace, for hosts that render the transaction tree.
    pub trace: Option<EmulationTrace>,
}

impl Preview {
    fn unverified(expected: MoneyFlow, reason: UnverifiedReason) -> Self {
        Self { verdict: Verdict::Unverified(reason), expected, emulated: None, trace: None }
    }
}

/// Emulates the request and cross-checks the flows. Every failure path
/// yields an unverified preview rather than an error: the host still gets
/// to present the request, it just cannot call it verified.
pub(crate) async fn build(
    account: TonAddress,
    request: &TransactionRequest,
    client: Option<&dyn EmulationClient>,
) -> Preview {
    let expected = expected_flow(account, request);
    let Some(client) = client else {
        return Preview::unverified(
            expected,
            UnverifiedReason::EmulationFailed("emulation is not configured".to_string()),
        );
    };

    let emulation_request =
        EmulationRequest::full(account, request.valid_until, request.messages.clone());
    match client.emulate(&emulation_request).await {
        Ok(trace) => {
            let validation = validate(account, request, &trace);
            Preview {
                verdict: validation.verdict,
                expected: validation.expected,
                emulated: Some(validation.emulated),
                trace: Some(trace),
            }
        }
        Err(EmulationError::AccountNotFound) => {
            Preview::unverified(expected, UnverifiedReason::AccountNotFound)
        }
        Err(err) => {
            tracing::warn!(target: "tonnect::engine", %err, "transaction emulation failed");
            Preview::unverified(expected, UnverifiedReason::EmulationFailed(err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tonnect_primitives::Coins;
    use tonnect_protocol::TransactionMessage;

    struct NotFound;

    #[async_trait]
    impl EmulationClient for NotFound {
        async fn emulate(
            &self,
            _request: &EmulationRequest,
        ) -> Result<EmulationTrace, EmulationError> {
            Err(EmulationError::AccountNotFound)
        }
    }

    fn request(nano: u128) -> TransactionRequest {
        TransactionRequest {
            valid_until: None,
            network: None,
            from: None,
            messages: vec![TransactionMessage {
                address: TonAddress::new(0, [9u8; 32]),
                amount: Coins::from_nano(nano),
                payload: None,
                state_init: None,
                mode: None,
                extra_currency: None,
            }],
        }
    }

    #[tokio::test]
    async fn no_client_means_unverified_with_the_expected_flow_intact() {
        let preview = build(TonAddress::ZERO, &request(5), None).await;
        assert!(matches!(
            preview.verdict,
            Verdict::Unverified(UnverifiedReason::EmulationFailed(_))
        ));
        assert_eq!(preview.expected.ton_out(), Coins::from_nano(5));
        assert!(preview.emulated.is_none());
        assert!(preview.trace.is_none());
    }

    #[tokio::test]
    async fn undeployed_accounts_are_unverified_not_valid() {
        let preview = build(TonAddress::ZERO, &request(5), Some(&NotFound)).await;
        assert_eq!(preview.verdict, Verdict::Unverified(UnverifiedReason::AccountNotFound));
        assert!(!preview.verdict.is_valid());
    }
}
