//! Remote payment signing.
//!
//! The signing service holds the users' managed wallets. [`RemoteSigner`]
//! sends it a payment requirement and the identity to pay as, and receives
//! an opaque payment token to attach to the retried tool call.

use mcpay::context::Session;
use mcpay::error::SigningError;
use mcpay::hook::BoxFuture;
use mcpay::hooks::PaymentSigner;
use mcpay::proto::payment::PaymentRequirement;
use serde::{Deserialize, Serialize};
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::client::JsonClient;
use crate::error::ClientError;

/// Body of a signing request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest<'a> {
    /// The requirement to authorize.
    pub requirement: &'a PaymentRequirement,
    /// The identity paying.
    pub user_id: &'a str,
    /// The identity's wallet, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<&'a str>,
}

/// Body of a signing response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignResponse {
    /// Whether the service signed.
    #[serde(default)]
    pub success: bool,
    /// The payment token, on success.
    #[serde(default)]
    pub token: Option<String>,
    /// Why the service declined.
    #[serde(default)]
    pub error: Option<String>,
}

/// A [`PaymentSigner`] backed by a remote signing service.
#[derive(Clone, Debug)]
pub struct RemoteSigner {
    endpoint: Url,
    client: JsonClient,
}

impl RemoteSigner {
    /// Creates a signer posting to `endpoint`.
    #[must_use]
    pub const fn new(endpoint: Url, client: JsonClient) -> Self {
        Self { endpoint, client }
    }

    /// Returns the signing endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Asks the signing service to authorize `requirement` for `session`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the service cannot be reached or answers
    /// with something other than a signing response.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "mcpay.signer.sign", skip_all, fields(network = %requirement.network), err)
    )]
    pub async fn sign(
        &self,
        requirement: &PaymentRequirement,
        session: &Session,
    ) -> Result<SignResponse, ClientError> {
        let request = SignRequest {
            requirement,
            user_id: &session.user_id,
            wallet_address: session.wallet_address.as_deref(),
        };
        self.client
            .post_json(&self.endpoint, "POST sign", &request)
            .await
    }
}

impl PaymentSigner for RemoteSigner {
    fn sign<'a>(
        &'a self,
        requirement: &'a PaymentRequirement,
        session: &'a Session,
    ) -> BoxFuture<'a, Result<String, SigningError>> {
        Box::pin(async move {
            let response = Self::sign(self, requirement, session).await?;
            match response.token {
                Some(token) if response.success && !token.is_empty() => Ok(token),
                _ => Err(SigningError::Rejected(
                    response
                        .error
                        .unwrap_or_else(|| "signing service declined".to_owned()),
                )),
            }
        })
    }
}
