//! Client for the web-proof service.
//!
//! The service exposes two endpoints relative to its base URL:
//!
//! - `POST ./prove` - notarize an HTTP exchange, returning a [`ProofEnvelope`]
//! - `POST ./execute-and-prove` - the same, plus the decoded HTTP response
//!   ([`ProvenExchange`])
//!
//! Both take a [`ProofRequest`] (`{ url, method, headers, body? }`).

use mcpay::error::ProofError;
use mcpay::hook::BoxFuture;
use mcpay::hooks::ProofService;
use mcpay::proto::proof::{ProofEnvelope, ProofRequest, ProvenExchange};
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::client::{JsonClient, join_endpoint};
use crate::error::ClientError;

/// A [`ProofService`] backed by a remote proof service.
#[derive(Clone, Debug)]
pub struct ProofClient {
    base_url: Url,
    prove_url: Url,
    execute_and_prove_url: Url,
    client: JsonClient,
}

impl ProofClient {
    /// Constructs a client from the service's base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UrlParse`] if the endpoint URLs cannot be built.
    pub fn try_new(base_url: Url, client: JsonClient) -> Result<Self, ClientError> {
        let prove_url = join_endpoint(&base_url, "./prove", "Failed to construct ./prove URL")?;
        let execute_and_prove_url = join_endpoint(
            &base_url,
            "./execute-and-prove",
            "Failed to construct ./execute-and-prove URL",
        )?;
        Ok(Self {
            base_url,
            prove_url,
            execute_and_prove_url,
            client,
        })
    }

    /// Returns the base URL used by this client.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Sends a `POST ./prove` request.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the HTTP request fails.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "mcpay.proof.prove", skip_all, fields(url = %request.url), err)
    )]
    pub async fn prove(&self, request: &ProofRequest) -> Result<ProofEnvelope, ClientError> {
        self.client
            .post_json(&self.prove_url, "POST /prove", request)
            .await
    }

    /// Sends a `POST ./execute-and-prove` request.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the HTTP request fails.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "mcpay.proof.execute_and_prove", skip_all, fields(url = %request.url), err)
    )]
    pub async fn execute_and_prove(
        &self,
        request: &ProofRequest,
    ) -> Result<ProvenExchange, ClientError> {
        self.client
            .post_json(&self.execute_and_prove_url, "POST /execute-and-prove", request)
            .await
    }
}

impl ProofService for ProofClient {
    fn execute_and_prove<'a>(
        &'a self,
        request: &'a ProofRequest,
    ) -> BoxFuture<'a, Result<ProvenExchange, ProofError>> {
        Box::pin(async move { Ok(Self::execute_and_prove(self, request).await?) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ProofRequest {
        ProofRequest {
            url: "https://tools.example/mcp".into(),
            method: "POST".into(),
            headers: vec!["Content-Type: application/json".into()],
            body: Some("{}".into()),
        }
    }

    fn envelope_json() -> serde_json::Value {
        json!({
            "success": true,
            "data": "0a0b",
            "version": "0.1.0-alpha.12",
            "meta": { "notaryUrl": "https://notary.example" }
        })
    }

    #[tokio::test]
    async fn test_prove_posts_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/prove"))
            .and(body_partial_json(json!({
                "url": "https://tools.example/mcp",
                "method": "POST",
                "headers": ["Content-Type: application/json"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope_json()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let base = format!("{}/v1", mock_server.uri()).parse().unwrap();
        let client = ProofClient::try_new(base, JsonClient::new()).unwrap();
        let envelope = client.prove(&request()).await.unwrap();
        assert!(envelope.validate().is_ok());
        assert_eq!(envelope.meta.notary_url, "https://notary.example");
    }

    #[tokio::test]
    async fn test_execute_and_prove_returns_exchange() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/execute-and-prove"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "envelope": envelope_json(),
                "response": {
                    "status": 200,
                    "statusText": "OK",
                    "headers": { "content-type": "application/json" },
                    "body": "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"content\":[]}}"
                }
            })))
            .mount(&mock_server)
            .await;

        let client =
            ProofClient::try_new(mock_server.uri().parse().unwrap(), JsonClient::new()).unwrap();
        let service: &dyn ProofService = &client;
        let proven = service.execute_and_prove(&request()).await.unwrap();
        let exchange = proven.response.unwrap();
        assert_eq!(exchange.status, 200);
        assert_eq!(exchange.content_type(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_service_failure_is_transport_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("notary down"))
            .mount(&mock_server)
            .await;

        let client =
            ProofClient::try_new(mock_server.uri().parse().unwrap(), JsonClient::new()).unwrap();
        let service: &dyn ProofService = &client;
        let err = service.execute_and_prove(&request()).await.unwrap_err();
        assert!(matches!(err, ProofError::Transport(_)));
    }
}
