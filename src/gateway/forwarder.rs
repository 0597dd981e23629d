//! Relays allowed requests to the upstream origin.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the configured origin
//! - Strip `Host` and hop-by-hop headers, copy the rest
//! - Stream the body through (none for GET and HEAD)
//! - Return the upstream response untouched, or a 502 on transport failure
//!
//! # Design Decisions
//! - One attempt per request, no retries and no timeout
//! - The upstream `Host` is derived from the origin by the client

use axum::{
    body::Body,
    http::{
        header::{self, HeaderName},
        uri::{Authority, Scheme},
        HeaderMap, Method, Request, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    Json,
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde_json::json;
use std::time::Instant;
use thiserror::Error;
use url::Url;

use crate::observability::metrics;

/// Connection-scoped headers that must not be relayed.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid upstream origin '{origin}': {reason}")]
    InvalidOrigin { origin: String, reason: String },

    #[error("could not build upstream URI: {0}")]
    InvalidUri(#[from] axum::http::uri::InvalidUri),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": "Bad Gateway",
            "message": self.to_string(),
        });
        (StatusCode::BAD_GATEWAY, Json(body)).into_response()
    }
}

/// HTTP client bound to a single origin.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    scheme: Scheme,
    authority: Authority,
    base_path: String,
}

impl Forwarder {
    pub fn new(origin: &Url) -> Result<Self, ForwardError> {
        let invalid = |reason: &str| ForwardError::InvalidOrigin {
            origin: origin.to_string(),
            reason: reason.to_string(),
        };

        if origin.scheme() != "http" {
            return Err(invalid("only http origins are supported"));
        }
        let host = origin.host_str().ok_or_else(|| invalid("missing host"))?;
        let authority = match origin.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let authority = authority
            .parse::<Authority>()
            .map_err(|e| invalid(&e.to_string()))?;

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Ok(Self {
            client,
            scheme: Scheme::HTTP,
            authority,
            base_path: origin.path().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_origin(origin: &str) -> Result<Self, ForwardError> {
        let url = Url::parse(origin).map_err(|e| ForwardError::InvalidOrigin {
            origin: origin.to_string(),
            reason: e.to_string(),
        })?;
        Self::new(&url)
    }

    pub fn origin(&self) -> String {
        format!("{}://{}{}", self.scheme, self.authority, self.base_path)
    }

    /// The upstream URI for an inbound one: origin, then base path, then the
    /// inbound path and query unchanged.
    pub fn target_uri(&self, inbound: &Uri) -> Result<Uri, ForwardError> {
        let path_and_query = inbound.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let target = format!(
            "{}://{}{}{}",
            self.scheme, self.authority, self.base_path, path_and_query
        );
        Ok(target.parse::<Uri>()?)
    }

    /// Relay one request and hand back the upstream response as is.
    pub async fn forward(&self, request: Request<Body>) -> Result<Response<Incoming>, ForwardError> {
        let start = Instant::now();
        let (parts, body) = request.into_parts();

        let uri = self.target_uri(&parts.uri)?;
        let bodyless = parts.method == Method::GET || parts.method == Method::HEAD;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        if bodyless {
            headers.remove(header::CONTENT_LENGTH);
        }

        let mut upstream = Request::new(if bodyless { Body::empty() } else { body });
        *upstream.method_mut() = parts.method;
        *upstream.uri_mut() = uri;
        *upstream.headers_mut() = headers;

        match self.client.request(upstream).await {
            Ok(response) => {
                metrics::record_upstream(Some(response.status().as_u16()), start);
                Ok(response)
            }
            Err(e) => {
                metrics::record_upstream(None, start);
                Err(ForwardError::Upstream(e))
            }
        }
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::try_from(name.trim()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}
