//! x402 payment negotiation.
//!
//! [`PaymentHook`] watches tool results for payment signals. When the upstream
//! asks to be paid and the call has an authenticated identity, the hook signs
//! the first accepted payment option and asks the pipeline to retry the call
//! with the signed token in `_meta["payment-token"]`. When the payer is short
//! of funds, the hook tells the caller how to top up instead of retrying.
//!
//! Signing and funding lookups are external collaborators
//! ([`PaymentSigner`], [`FundingUrlBuilder`]); their failures leave the result
//! untouched.

use std::fmt;
use std::sync::Arc;
#[cfg(feature = "telemetry")]
use tracing::{debug, info, warn};

use crate::context::{CallContext, Session};
use crate::error::{FundingError, SigningError};
use crate::hook::{BoxFuture, CallToolResultAction, Hook, HookResult, ResultAction};
use crate::networks::network_family;
use crate::proto::payment::{
    PaymentErrorCode, PaymentRequirement, PaymentSignal, extract_payment_signal,
};
use crate::proto::{CallToolRequest, CallToolResult, ContentItem};

/// Produces a signed payment authorization for a requirement.
pub trait PaymentSigner: Send + Sync {
    /// Signs `requirement` on behalf of `session`, returning the payment token.
    fn sign<'a>(
        &'a self,
        requirement: &'a PaymentRequirement,
        session: &'a Session,
    ) -> BoxFuture<'a, Result<String, SigningError>>;
}

/// Builds an on-ramp URL that funds `payer` for a requirement.
pub trait FundingUrlBuilder: Send + Sync {
    /// Returns a funding URL, or `None` if no on-ramp supports the requirement.
    fn create_funding_url<'a>(
        &'a self,
        payer: &'a str,
        requirement: &'a PaymentRequirement,
    ) -> BoxFuture<'a, Result<Option<String>, FundingError>>;
}

/// Settings for [`PaymentHook`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use]
pub struct PaymentHookConfig {
    /// Wallet-management page shown when the payer is short of funds.
    pub wallet_url: Option<String>,
}

impl PaymentHookConfig {
    /// Sets the wallet-management URL.
    pub fn with_wallet_url(mut self, url: impl Into<String>) -> Self {
        self.wallet_url = Some(url.into());
        self
    }
}

/// Signs and retries tool calls the upstream wants paid for.
pub struct PaymentHook {
    signer: Arc<dyn PaymentSigner>,
    funding: Option<Arc<dyn FundingUrlBuilder>>,
    config: PaymentHookConfig,
}

impl fmt::Debug for PaymentHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentHook")
            .field("funding", &self.funding.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PaymentHook {
    /// Creates a payment hook that signs with `signer`.
    pub fn new(signer: Arc<dyn PaymentSigner>, config: PaymentHookConfig) -> Self {
        Self {
            signer,
            funding: None,
            config,
        }
    }

    /// Adds an on-ramp link to insufficient-funds messages.
    #[must_use]
    pub fn with_funding(mut self, funding: Arc<dyn FundingUrlBuilder>) -> Self {
        self.funding = Some(funding);
        self
    }

    async fn handle_signal(
        &self,
        signal: PaymentSignal,
        mut result: CallToolResult,
        request: &CallToolRequest,
        ctx: &CallContext,
    ) -> CallToolResultAction {
        if signal.code == PaymentErrorCode::InsufficientFunds {
            let message = self.funding_message(&signal, ctx).await;
            result.content.insert(0, ContentItem::text(message));
            return ResultAction::Continue(result);
        }

        let Some(session) = ctx.session.as_ref() else {
            #[cfg(feature = "telemetry")]
            debug!(request_id = %ctx.request_id, code = %signal.code, "payment requested but call has no identity");
            return ResultAction::Continue(result);
        };
        let Some(requirement) = signal.accepts.first() else {
            #[cfg(feature = "telemetry")]
            debug!(request_id = %ctx.request_id, code = %signal.code, "payment signal lists no accepted options");
            return ResultAction::Continue(result);
        };

        match self.signer.sign(requirement, session).await {
            Ok(token) => {
                #[cfg(feature = "telemetry")]
                debug!(
                    request_id = %ctx.request_id,
                    tool = %request.name,
                    network = %requirement.network,
                    amount = %requirement.max_amount_required,
                    "payment signed; retrying with token"
                );
                ResultAction::Retry(request.with_payment_token(token))
            }
            Err(error) => {
                #[cfg(feature = "telemetry")]
                warn!(request_id = %ctx.request_id, tool = %request.name, %error, "payment signing failed");
                #[cfg(not(feature = "telemetry"))]
                let _ = error;
                ResultAction::Continue(result)
            }
        }
    }

    async fn funding_message(&self, signal: &PaymentSignal, ctx: &CallContext) -> String {
        let mut lines = vec!["Insufficient funds to pay for this tool call.".to_owned()];
        if let Some(wallet_url) = &self.config.wallet_url {
            lines.push(format!("Manage your wallet and add funds: {wallet_url}"));
        }

        let payer = signal.payer.as_deref().or_else(|| {
            ctx.session
                .as_ref()
                .and_then(|s| s.wallet_address.as_deref())
        });
        let requirement = signal
            .accepts
            .iter()
            .find(|r| network_family(&r.network).is_some());
        if let (Some(funding), Some(payer), Some(requirement)) =
            (&self.funding, payer, requirement)
        {
            match funding.create_funding_url(payer, requirement).await {
                Ok(Some(url)) => lines.push(format!(
                    "Buy funds on {} for {payer}: {url}",
                    requirement.network
                )),
                Ok(None) => {}
                Err(error) => {
                    #[cfg(feature = "telemetry")]
                    warn!(request_id = %ctx.request_id, %error, "funding URL lookup failed");
                    #[cfg(not(feature = "telemetry"))]
                    let _ = error;
                }
            }
        }
        lines.join("\n")
    }
}

/// Logs the settlement receipt of a paid call, if the upstream returned one.
#[cfg(feature = "telemetry")]
fn log_settlement(result: &CallToolResult, request: &CallToolRequest, ctx: &CallContext) {
    if request.payment_token().is_none() {
        return;
    }
    if let Some(receipt) = crate::proto::payment::extract_payment_receipt(&result.meta) {
        info!(
            request_id = %ctx.request_id,
            tool = %request.name,
            network = %receipt.network,
            transaction = %receipt.transaction,
            payer = %receipt.payer,
            success = receipt.success,
            "paid tool call settled"
        );
    }
}

impl Hook for PaymentHook {
    fn name(&self) -> &'static str {
        "payment"
    }

    fn process_call_tool_result<'a>(
        &'a self,
        result: CallToolResult,
        request: &'a CallToolRequest,
        ctx: &'a CallContext,
    ) -> BoxFuture<'a, HookResult<CallToolResultAction>> {
        Box::pin(async move {
            if let Some(signal) = extract_payment_signal(&result) {
                return Ok(self.handle_signal(signal, result, request, ctx).await);
            }
            #[cfg(feature = "telemetry")]
            log_settlement(&result, request, ctx);
            Ok(ResultAction::Continue(result))
        })
    }
}
