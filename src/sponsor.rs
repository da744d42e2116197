//! Sponsorship verification
//!
//! A sponsor token is checked once at startup against the remote
//! authorization service. The outcome is an immutable [`Sponsorship`] value
//! that bootstrap hands to whoever needs it.
//!
//! An unauthorized answer is not an error: the process simply continues
//! unsponsored. Only transport or RPC failures abort startup.

use crate::error::{Result, ResultExt, SeleneError};
use crate::logging::get_logger;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Built-in authorization host
pub const DEFAULT_HOST: &str = "https://sponsor.selene-energy.net";

/// Environment variable overriding [`DEFAULT_HOST`]
pub const HOST_ENV: &str = "SELENE_SPONSOR_URI";

/// Upper bound for one authorization round trip
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of sponsorship verification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sponsorship {
    subject: Option<String>,
}

impl Sponsorship {
    pub fn unsponsored() -> Self {
        Self::default()
    }

    pub fn sponsored_by(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
        }
    }

    /// The authorized subject, if the token was accepted
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn is_sponsored(&self) -> bool {
        self.subject.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub authorized: bool,
    #[serde(default)]
    pub subject: String,
}

/// The remote authorization RPC
#[async_trait::async_trait]
pub trait AuthClient: Send + Sync {
    async fn is_authorized(&self, request: AuthRequest) -> Result<AuthResponse>;
}

/// JSON-over-HTTP authorization client
pub struct HttpAuthClient {
    host: String,
    client: reqwest::Client,
}

impl HttpAuthClient {
    pub fn new(host: &str) -> Result<Self> {
        let host = host.trim().trim_end_matches('/');
        if host.is_empty() {
            return Err(SeleneError::config("empty sponsorship host"));
        }
        let host = if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };

        let client = reqwest::Client::builder()
            .timeout(AUTH_TIMEOUT)
            .user_agent(concat!("selene/", env!("APP_VERSION")))
            .build()?;

        Ok(Self { host, client })
    }

    /// Use the host from [`HOST_ENV`], falling back to [`DEFAULT_HOST`]
    pub fn from_env() -> Result<Self> {
        let host = std::env::var(HOST_ENV)
            .ok()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        Self::new(&host)
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

#[async_trait::async_trait]
impl AuthClient for HttpAuthClient {
    async fn is_authorized(&self, request: AuthRequest) -> Result<AuthResponse> {
        let resp = self
            .client
            .post(format!("{}/api/auth/authorize", self.host))
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SeleneError::api(format!(
                "authorization service returned {}",
                status
            )));
        }

        Ok(resp.json::<AuthResponse>().await?)
    }
}

/// Verify `token` through `client`, bounded by [`AUTH_TIMEOUT`]
pub async fn verify(client: &dyn AuthClient, token: &str) -> Result<Sponsorship> {
    let logger = get_logger("sponsor");

    let response = tokio::time::timeout(
        AUTH_TIMEOUT,
        client.is_authorized(AuthRequest {
            token: token.to_string(),
        }),
    )
    .await
    .map_err(|_| SeleneError::timeout("authorization request timed out"))
    .and_then(|res| res)
    .context("sponsortoken")?;

    if response.authorized {
        logger.info(&format!("sponsored by {}", response.subject));
        Ok(Sponsorship::sponsored_by(response.subject))
    } else {
        logger.debug("sponsor token not authorized, continuing unsponsored");
        Ok(Sponsorship::unsponsored())
    }
}

/// Verify the token against the configured authorization host
pub async fn configure_sponsorship(token: &str) -> Result<Sponsorship> {
    let client = HttpAuthClient::from_env().context("sponsortoken")?;
    verify(&client, token).await
}
