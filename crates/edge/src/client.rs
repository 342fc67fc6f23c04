//! HTTP client for the auth service's access registration endpoint.

use crate::error::{EdgeError, EdgeResult};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use stratum_core::{AccessGrant, DEFAULT_AUTH_SERVICE_ADDRESS};
use tracing::instrument;

const REGISTER_PATH: &str = "/v1/access";

/// Options for a registration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegisterAccessOptions {
    /// Allow anonymous reads through the linkshare service.
    pub public: bool,
}

/// S3-compatible credentials issued by the auth service.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct EdgeCredentials {
    pub access_key_id: String,
    pub secret_key: String,
    pub endpoint: String,
}

impl fmt::Debug for EdgeCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeCredentials")
            .field("access_key_id", &"[REDACTED]")
            .field("secret_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    access_grant: &'a str,
    public: bool,
}

/// Client for one auth service.
#[derive(Clone)]
pub struct AuthServiceClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl AuthServiceClient {
    /// Create a client for `address`.
    ///
    /// An empty address uses [`DEFAULT_AUTH_SERVICE_ADDRESS`]; an address
    /// without a scheme is assumed to be HTTPS.
    pub fn new(address: &str) -> EdgeResult<Self> {
        let endpoint = register_url(address)?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("stratum/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(EdgeError::Transport)?;
        Ok(Self { http, endpoint })
    }

    /// Register an access grant and receive edge credentials for it.
    ///
    /// Sends exactly one request; retrying is left to the caller.
    #[instrument(skip(self, grant), fields(auth_service = %self.endpoint, public = options.public))]
    pub async fn register(
        &self,
        grant: &AccessGrant,
        options: RegisterAccessOptions,
    ) -> EdgeResult<EdgeCredentials> {
        let serialized = grant.serialize()?;
        let request = RegisterRequest {
            access_grant: &serialized,
            public: options.public,
        };

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(EdgeError::Transport)?;
        let status = response.status();
        let body = response.text().await.map_err(EdgeError::Transport)?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "registration rejected");
            return Err(EdgeError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let credentials: EdgeCredentials = serde_json::from_str(&body)
            .map_err(|e| EdgeError::InvalidResponse(e.to_string()))?;
        for (field, value) in [
            ("access_key_id", &credentials.access_key_id),
            ("secret_key", &credentials.secret_key),
            ("endpoint", &credentials.endpoint),
        ] {
            if value.is_empty() {
                return Err(EdgeError::InvalidResponse(format!("{field} is empty")));
            }
        }

        tracing::info!(endpoint = %credentials.endpoint, "registered edge credentials");
        Ok(credentials)
    }
}

impl fmt::Debug for AuthServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthServiceClient")
            .field("endpoint", &self.endpoint.as_str())
            .finish()
    }
}

fn register_url(address: &str) -> EdgeResult<Url> {
    let address = address.trim();
    let address = if address.is_empty() {
        DEFAULT_AUTH_SERVICE_ADDRESS
    } else {
        address
    };

    let base = if address.contains("://") {
        address.to_string()
    } else {
        format!("https://{address}")
    };

    let url = Url::parse(&format!("{}{REGISTER_PATH}", base.trim_end_matches('/'))).map_err(
        |e| EdgeError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        },
    )?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(EdgeError::InvalidAddress {
            address: address.to_string(),
            reason: format!("unsupported scheme {other:?}"),
        }),
    }
}
