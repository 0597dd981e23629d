//! Per-request evaluation.
//!
//! # Responsibilities
//! - Derive the client address from headers
//! - Load the rule set through the policy cache
//! - Decide, log and count the verdict
//! - Relay allowed requests, answer denied ones directly

use axum::{
    body::Body,
    http::{HeaderMap, Request},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::address::{AddressNormalizer, ClientAddress};
use crate::config::GatewayConfig;
use crate::gateway::decision::{Decision, Denial, DenyReason};
use crate::gateway::forwarder::{ForwardError, Forwarder};
use crate::http::RequestIdExt;
use crate::observability::metrics;
use crate::policy::{first_match, PolicyCache, PolicyError, PolicyStore, RuleSet};

/// The access-control gateway: normalizer, cache and forwarder.
pub struct Gateway {
    normalizer: AddressNormalizer,
    cache: Arc<PolicyCache>,
    forwarder: Forwarder,
}

impl Gateway {
    pub fn new(normalizer: AddressNormalizer, cache: Arc<PolicyCache>, forwarder: Forwarder) -> Self {
        Self {
            normalizer,
            cache,
            forwarder,
        }
    }

    /// Wire a gateway from configuration around an already built store.
    pub fn from_config(config: &GatewayConfig, store: Arc<dyn PolicyStore>) -> Result<Self, ForwardError> {
        let forwarder = Forwarder::from_origin(&config.upstream.origin)?;
        let cache = Arc::new(PolicyCache::new(store, config.policy.cache_ttl()));
        Ok(Self::new(
            AddressNormalizer::from_config(&config.client_address),
            cache,
            forwarder,
        ))
    }

    pub fn cache(&self) -> &Arc<PolicyCache> {
        &self.cache
    }

    pub fn normalizer(&self) -> &AddressNormalizer {
        &self.normalizer
    }

    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    /// Decide a request from its headers alone.
    ///
    /// The rule set is only consulted once a client address is known.
    pub async fn decide(&self, headers: &HeaderMap) -> Decision {
        let Some(client) = self.normalizer.client_address(headers) else {
            return Decision::Deny(Denial::new(DenyReason::UndeterminableAddress, None));
        };

        match self.cache.get().await {
            Ok(rules) => evaluate(client, &rules),
            Err(PolicyError::Unavailable(_)) => {
                Decision::Deny(Denial::new(DenyReason::PolicyUnavailable, Some(client)))
            }
        }
    }

    /// Full request path: decide, then relay or refuse.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let request_id = request.headers().request_id().to_string();

        match self.decide(request.headers()).await {
            Decision::Allow { client, rule } => {
                metrics::record_decision("allow", "matched");
                tracing::debug!(
                    request_id = %request_id,
                    client = %client,
                    decision = "allow",
                    rule = %rule,
                    "Request allowed"
                );

                match self.forwarder.forward(request).await {
                    Ok(response) => response.map(Body::new),
                    Err(e) => {
                        tracing::error!(request_id = %request_id, error = %e, "Upstream error");
                        e.into_response()
                    }
                }
            }
            Decision::Deny(denial) => {
                let reason = denial.reason;
                let client = denial.client.as_ref().map(ClientAddress::as_str).unwrap_or("-");
                metrics::record_decision("deny", reason.label());

                match reason {
                    DenyReason::PolicyUnavailable => tracing::error!(
                        request_id = %request_id,
                        client = %client,
                        decision = "deny",
                        reason = reason.label(),
                        "Allow list unavailable, failing closed"
                    ),
                    DenyReason::NotAuthorized | DenyReason::UndeterminableAddress => tracing::warn!(
                        request_id = %request_id,
                        client = %client,
                        decision = "deny",
                        reason = reason.label(),
                        "Request denied"
                    ),
                }

                denial.into_response()
            }
        }
    }
}

/// Evaluate a known client against a rule snapshot.
pub fn evaluate(client: ClientAddress, rules: &RuleSet) -> Decision {
    match first_match(client.as_str(), rules.rules()) {
        Some(rule) => Decision::Allow {
            rule: rule.to_string(),
            client,
        },
        None => Decision::Deny(Denial::new(DenyReason::NotAuthorized, Some(client))),
    }
}
