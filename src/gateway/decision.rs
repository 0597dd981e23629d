//! Per-request verdicts and the denial response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::address::ClientAddress;

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No usable client address header.
    UndeterminableAddress,
    /// The rule set could not be loaded.
    PolicyUnavailable,
    /// No rule covers the client.
    NotAuthorized,
}

impl DenyReason {
    pub fn status(self) -> StatusCode {
        match self {
            DenyReason::PolicyUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            DenyReason::UndeterminableAddress | DenyReason::NotAuthorized => StatusCode::FORBIDDEN,
        }
    }

    /// Machine-readable `error` field.
    pub fn error(self) -> &'static str {
        match self {
            DenyReason::PolicyUnavailable => "Allowlist Unavailable",
            DenyReason::UndeterminableAddress | DenyReason::NotAuthorized => "Forbidden",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            DenyReason::UndeterminableAddress => "Unable to determine client IP address",
            DenyReason::PolicyUnavailable => {
                "The access policy could not be loaded, try again later"
            }
            DenyReason::NotAuthorized => "Your IP address is not authorized to access this resource",
        }
    }

    /// Metric label.
    pub fn label(self) -> &'static str {
        match self {
            DenyReason::UndeterminableAddress => "undeterminable_address",
            DenyReason::PolicyUnavailable => "policy_unavailable",
            DenyReason::NotAuthorized => "not_authorized",
        }
    }
}

/// A refused request, rendered as a JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub reason: DenyReason,
    pub client: Option<ClientAddress>,
}

impl Denial {
    pub fn new(reason: DenyReason, client: Option<ClientAddress>) -> Self {
        Self { reason, client }
    }

    pub fn body(&self) -> DenialBody<'_> {
        DenialBody {
            error: self.reason.error(),
            message: self.reason.message(),
            your_ip: self.client.as_ref().map(ClientAddress::as_str),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DenialBody<'a> {
    pub error: &'a str,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub your_ip: Option<&'a str>,
}

impl IntoResponse for Denial {
    fn into_response(self) -> Response {
        (self.reason.status(), Json(self.body())).into_response()
    }
}

/// Outcome of evaluating one request. Never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow { client: ClientAddress, rule: String },
    Deny(Denial),
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressNormalizer;
    use crate::config::ClientAddressConfig;
    use axum::http::HeaderMap;

    fn client(addr: &'static str) -> ClientAddress {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", addr.parse().unwrap());
        AddressNormalizer::from_config(&ClientAddressConfig::default())
            .client_address(&headers)
            .unwrap()
    }

    #[test]
    fn not_authorized_body_carries_address() {
        let denial = Denial::new(DenyReason::NotAuthorized, Some(client("11.1.2.3")));
        let json = serde_json::to_value(denial.body()).unwrap();
        assert_eq!(json["error"], "Forbidden");
        assert_eq!(json["your_ip"], "11.1.2.3");
        assert_eq!(denial.reason.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn undeterminable_body_omits_address() {
        let denial = Denial::new(DenyReason::UndeterminableAddress, None);
        let json = serde_json::to_value(denial.body()).unwrap();
        assert!(json.get("your_ip").is_none());
        assert_eq!(json["message"], "Unable to determine client IP address");
    }

    #[test]
    fn unavailable_is_503() {
        let denial = Denial::new(DenyReason::PolicyUnavailable, Some(client("10.0.0.1")));
        let response = denial.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers()["content-type"],
            "application/json"
        );
        assert_eq!(DenyReason::PolicyUnavailable.error(), "Allowlist Unavailable");
    }
}
