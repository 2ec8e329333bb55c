//! On-ramp links for payers who are short of funds.

use mcpay::error::FundingError;
use mcpay::hook::BoxFuture;
use mcpay::hooks::FundingUrlBuilder;
use mcpay::networks::{NetworkFamily, network_family};
use mcpay::proto::payment::PaymentRequirement;
use serde::{Deserialize, Serialize};
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::client::JsonClient;
use crate::error::ClientError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FundingRequest<'a> {
    payer_address: &'a str,
    chain: &'static str,
    requirement: &'a PaymentRequirement,
}

#[derive(Debug, Default, Deserialize)]
struct FundingResponse {
    #[serde(default)]
    url: Option<String>,
}

/// A [`FundingUrlBuilder`] backed by a remote on-ramp service.
///
/// Requirements on networks outside the EVM and Solana families never reach
/// the service.
#[derive(Clone, Debug)]
pub struct FundingClient {
    endpoint: Url,
    client: JsonClient,
}

impl FundingClient {
    /// Creates a client posting to `endpoint`.
    #[must_use]
    pub const fn new(endpoint: Url, client: JsonClient) -> Self {
        Self { endpoint, client }
    }

    /// Requests a funding URL for `payer`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the service cannot be reached or answers
    /// with an unexpected body.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "mcpay.funding.create_url", skip_all, fields(network = %requirement.network), err)
    )]
    pub async fn create_funding_url(
        &self,
        payer: &str,
        requirement: &PaymentRequirement,
    ) -> Result<Option<String>, ClientError> {
        let chain = match network_family(&requirement.network) {
            Some(NetworkFamily::Evm) => "evm",
            Some(NetworkFamily::Solana) => "solana",
            None => return Ok(None),
        };
        let request = FundingRequest {
            payer_address: payer,
            chain,
            requirement,
        };
        let response: FundingResponse = self
            .client
            .post_json(&self.endpoint, "POST funding url", &request)
            .await?;
        Ok(response.url.filter(|url| !url.is_empty()))
    }
}

impl FundingUrlBuilder for FundingClient {
    fn create_funding_url<'a>(
        &'a self,
        payer: &'a str,
        requirement: &'a PaymentRequirement,
    ) -> BoxFuture<'a, Result<Option<String>, FundingError>> {
        Box::pin(async move { Ok(Self::create_funding_url(self, payer, requirement).await?) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn requirement(network: &str) -> PaymentRequirement {
        PaymentRequirement {
            network: network.into(),
            asset: "0xusdc".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_funding_url_for_evm_payer() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "payerAddress": "0xpayer", "chain": "evm" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "url": "https://onramp.example/buy?to=0xpayer" })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = FundingClient::new(mock_server.uri().parse().unwrap(), JsonClient::new());
        let url = client
            .create_funding_url("0xpayer", &requirement("base-sepolia"))
            .await
            .unwrap();
        assert_eq!(url.as_deref(), Some("https://onramp.example/buy?to=0xpayer"));
    }

    #[tokio::test]
    async fn test_unsupported_network_skips_service() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = FundingClient::new(mock_server.uri().parse().unwrap(), JsonClient::new());
        let url = client
            .create_funding_url("addr", &requirement("bitcoin"))
            .await
            .unwrap();
        assert_eq!(url, None);
    }
}
