//! HTTP transport for the simplified sliding sync endpoint.

use std::time::Duration;

use glide_proto::{SyncRequest, SyncResponse};
use serde::Deserialize;
use url::Url;

use crate::transport::{M_UNKNOWN_POS, Transport, TransportError};

/// Path of the simplified sliding sync endpoint.
pub const SYNC_PATH: &str = "_matrix/client/unstable/org.matrix.simplified_msc3575/sync";

/// Slack added to the long-poll timeout before the HTTP request times out.
const REQUEST_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

/// Standard Matrix error body.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errcode: String,
    #[serde(default)]
    error: String,
}

/// [`Transport`] that POSTs JSON requests to a homeserver with a bearer
/// token.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
    access_token: String,
}

impl HttpTransport {
    /// Transport for `homeserver`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Network` if the endpoint URL cannot be built
    /// or the HTTP client cannot be initialized.
    pub fn new(homeserver: &Url, access_token: impl Into<String>) -> Result<Self, TransportError> {
        let mut base = homeserver.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let endpoint = base
            .join(SYNC_PATH)
            .map_err(|e| TransportError::Network(format!("invalid endpoint: {e}")))?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Network(format!("client init failed: {e}")))?;

        Ok(Self { client, endpoint, access_token: access_token.into() })
    }

    /// Sync endpoint URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn send(&self, request: SyncRequest) -> Result<SyncResponse, TransportError> {
        let body = request.to_json().map_err(|e| TransportError::Decode(e.to_string()))?;
        let timeout = Duration::from_millis(request.timeout_ms) + REQUEST_TIMEOUT_SLACK;

        let mut url = self.endpoint.clone();
        if let Some(pos) = &request.pos {
            url.query_pairs_mut().append_pair("pos", pos);
        }
        url.query_pairs_mut().append_pair("timeout", &request.timeout_ms.to_string());

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .timeout(timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| TransportError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &bytes));
        }

        SyncResponse::from_json(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

impl Transport for HttpTransport {
    fn sync(
        &self,
        request: SyncRequest,
    ) -> impl std::future::Future<Output = Result<SyncResponse, TransportError>> + Send {
        self.send(request)
    }
}

fn classify_error(status: u16, body: &[u8]) -> TransportError {
    let ErrorBody { errcode, error } = serde_json::from_slice(body).unwrap_or_default();
    if errcode == M_UNKNOWN_POS {
        return TransportError::UnknownPos;
    }
    TransportError::Server { status, errcode, message: error }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_keeps_homeserver_path() {
        let homeserver = Url::parse("https://example.org/base").unwrap();
        let transport = HttpTransport::new(&homeserver, "token").unwrap();
        assert_eq!(
            transport.endpoint().as_str(),
            "https://example.org/base/_matrix/client/unstable/org.matrix.simplified_msc3575/sync"
        );
    }

    #[test]
    fn error_bodies_are_classified() {
        let err = classify_error(400, br#"{"errcode":"M_UNKNOWN_POS","error":"gone"}"#);
        assert_eq!(err, TransportError::UnknownPos);

        let err = classify_error(401, br#"{"errcode":"M_UNKNOWN_TOKEN","error":"nope"}"#);
        assert!(err.is_fatal());

        let err = classify_error(502, b"<html>bad gateway</html>");
        assert_eq!(
            err,
            TransportError::Server { status: 502, errcode: String::new(), message: String::new() }
        );
        assert!(err.is_transient());
    }
}
