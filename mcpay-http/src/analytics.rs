//! Analytics delivery over HTTP.

use mcpay::error::SinkError;
use mcpay::hook::BoxFuture;
use mcpay::hooks::{AnalyticsEvent, AnalyticsSink};
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::client::{JsonClient, record_result_on_span};
use crate::error::ClientError;

/// An [`AnalyticsSink`] that posts each event as JSON to a collector.
#[derive(Clone, Debug)]
pub struct HttpAnalyticsSink {
    endpoint: Url,
    client: JsonClient,
}

impl HttpAnalyticsSink {
    /// Creates a sink posting to `endpoint`.
    #[must_use]
    pub const fn new(endpoint: Url, client: JsonClient) -> Self {
        Self { endpoint, client }
    }

    /// Posts one event; the collector's response body is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the request fails or the status is not 2xx.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "mcpay.analytics.emit", skip_all, fields(request_id = %event.request_id), err)
    )]
    pub async fn emit(&self, event: &AnalyticsEvent) -> Result<(), ClientError> {
        let result = self
            .client
            .send_json(&self.endpoint, "POST analytics event", event, &[])
            .await
            .map(drop);
        record_result_on_span(&result);
        result
    }
}

impl AnalyticsSink for HttpAnalyticsSink {
    fn emit(&self, event: AnalyticsEvent) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move { Ok(Self::emit(self, &event).await?) })
    }
}
