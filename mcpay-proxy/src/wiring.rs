//! Builds per-target pipelines from [`ProxyConfig`].
//!
//! One HTTP upstream, one analytics hook and one payment hook are shared by
//! every target. Proof hooks are built per target because each target carries
//! its own proof settings.

use std::sync::Arc;

use mcpay::context::TargetFlags;
use mcpay::hook::Hook;
use mcpay::hooks::{
    AnalyticsHook, PaymentHook, PaymentHookConfig, ProofHook, ProofService,
};
use mcpay::pipeline::Pipeline;
use mcpay::upstream::Upstream;
use mcpay_http::{
    FundingClient, HttpAnalyticsSink, HttpUpstream, JsonClient, ProofClient, RemoteSigner,
};

use crate::config::{ConfigError, HookKind, ProofSection, ProxyConfig};
use crate::handlers::{Proxy, Target};
use crate::session::SessionStore;

/// Collaborator-backed hooks, built once from the `services` table.
struct Services {
    analytics: Option<Arc<dyn Hook>>,
    payment: Option<Arc<dyn Hook>>,
    proof: Option<Arc<dyn ProofService>>,
}

impl Services {
    fn connect(config: &ProxyConfig, client: &JsonClient) -> Result<Self, ConfigError> {
        let services = &config.services;

        let analytics = services.analytics.as_ref().map(|endpoint| {
            let sink = HttpAnalyticsSink::new(endpoint.clone(), client.clone());
            Arc::new(AnalyticsHook::new(Arc::new(sink))) as Arc<dyn Hook>
        });

        let payment = services.signer.as_ref().map(|endpoint| {
            let signer = RemoteSigner::new(endpoint.clone(), client.clone());
            let hook_config = match &config.wallet_url {
                Some(url) => PaymentHookConfig::default().with_wallet_url(url.clone()),
                None => PaymentHookConfig::default(),
            };
            let hook = PaymentHook::new(Arc::new(signer), hook_config);
            let hook = match &services.funding {
                Some(endpoint) => hook.with_funding(Arc::new(FundingClient::new(
                    endpoint.clone(),
                    client.clone(),
                ))),
                None => hook,
            };
            Arc::new(hook) as Arc<dyn Hook>
        });

        let proof = services
            .proof
            .as_ref()
            .map(|base| ProofClient::try_new(base.clone(), client.clone()))
            .transpose()
            .map_err(|source| ConfigError::Service {
                service: "proof",
                source,
            })?
            .map(|client| Arc::new(client) as Arc<dyn ProofService>);

        Ok(Self {
            analytics,
            payment,
            proof,
        })
    }

    fn hook(
        &self,
        target: &str,
        kind: HookKind,
        proof: &ProofSection,
    ) -> Result<Arc<dyn Hook>, ConfigError> {
        let missing = |service| ConfigError::MissingService {
            target: target.to_owned(),
            hook: kind,
            service,
        };
        match kind {
            HookKind::Analytics => self.analytics.clone().ok_or_else(|| missing("analytics")),
            HookKind::Payment => self.payment.clone().ok_or_else(|| missing("signer")),
            HookKind::Proof => {
                let service = self.proof.as_ref().ok_or_else(|| missing("proof"))?;
                let hook = ProofHook::new(Arc::clone(service), proof.to_proof_config());
                Ok(Arc::new(hook))
            }
        }
    }
}

/// Builds the proxy state described by `config`.
///
/// # Errors
///
/// Returns [`ConfigError`] if a target needs a service that is not
/// configured or a service client cannot be constructed.
pub fn build_proxy(config: &ProxyConfig) -> Result<Proxy, ConfigError> {
    let client = JsonClient::new().with_timeout(config.services.timeout());
    let upstream: Arc<dyn Upstream> = Arc::new(HttpUpstream::new(client.clone()));
    let services = Services::connect(config, &client)?;

    let mut proxy = Proxy::new(SessionStore::from_config(&config.api_keys));
    for (id, target) in &config.targets {
        let mut builder = Pipeline::builder(Arc::clone(&upstream)).max_retries(config.max_retries);
        for kind in &target.hooks {
            builder = builder.shared_hook(services.hook(id, *kind, &target.proof)?);
        }
        let pipeline = builder.build();

        tracing::info!(
            target_id = %id,
            url = %target.url,
            hooks = ?pipeline.hook_names().collect::<Vec<_>>(),
            proof = target.proof.enabled,
            "Registered target"
        );

        proxy = proxy.with_target(
            id.clone(),
            Target {
                url: target.url.clone(),
                flags: TargetFlags {
                    proof_enabled: target.proof.enabled,
                },
                pipeline,
            },
        );
    }
    Ok(proxy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(toml: &str) -> ProxyConfig {
        ProxyConfig::from_toml(toml, |_| None).unwrap()
    }

    #[test]
    fn test_pipelines_follow_configured_order() {
        let proxy = build_proxy(&config(
            r#"
            max_retries = 4

            [services]
            signer = "https://signer.example/sign"
            funding = "https://onramp.example/links"
            proof = "https://notary.example/v1/"
            analytics = "https://collector.example/events"

            [api_keys.sk-alice]
            user_id = "alice"

            [targets.weather]
            url = "https://weather.example/mcp"

            [targets.weather.proof]
            enabled = true

            [targets.search]
            url = "https://search.example/mcp"
            hooks = ["payment", "analytics"]
            "#,
        ))
        .unwrap();

        let weather = proxy.target("weather").unwrap();
        assert!(weather.flags.proof_enabled);
        assert_eq!(weather.pipeline.max_retries(), 4);
        assert_eq!(
            weather.pipeline.hook_names().collect::<Vec<_>>(),
            ["analytics", "payment", "proof"]
        );

        let search = proxy.target("search").unwrap();
        assert!(!search.flags.proof_enabled);
        assert_eq!(
            search.pipeline.hook_names().collect::<Vec<_>>(),
            ["payment", "analytics"]
        );

        assert_eq!(proxy.sessions().len(), 1);
    }

    #[test]
    fn test_target_without_hooks_is_a_plain_relay() {
        let proxy = build_proxy(&config(
            r#"
            [targets.echo]
            url = "http://127.0.0.1:9000/mcp"
            hooks = []
            "#,
        ))
        .unwrap();
        let echo = proxy.target("echo").unwrap();
        assert_eq!(echo.pipeline.hook_names().count(), 0);
        assert!(proxy.sessions().is_empty());
    }
}
