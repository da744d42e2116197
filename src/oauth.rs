//! OAuth2 tokens for vehicle APIs
//!
//! Providers implement [`TokenRefresher`] for their refresh-token exchange.
//! [`TokenSource`] hands out the cached token and refreshes it through the
//! provider when it has expired. Retry policy stays with the caller.

use crate::error::{Result, SeleneError};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Tokens expiring within this margin are treated as expired
const EXPIRY_DELTA_SECS: i64 = 10;

/// An OAuth2 token
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "TokenResponse")]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    pub refresh_token: String,
    pub expiry: Option<DateTime<Utc>>,
}

/// Token endpoint response body
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl From<TokenResponse> for Token {
    fn from(res: TokenResponse) -> Self {
        Self {
            access_token: res.access_token,
            token_type: res.token_type,
            refresh_token: res.refresh_token,
            // Lifetimes beyond the representable range never expire
            expiry: res
                .expires_in
                .filter(|secs| *secs > 0)
                .and_then(Duration::try_seconds)
                .and_then(|lifetime| Utc::now().checked_add_signed(lifetime)),
        }
    }
}

impl Token {
    /// A token carrying only a refresh token, forcing a refresh on first use
    pub fn from_refresh_token(refresh_token: &str) -> Self {
        Self {
            access_token: String::new(),
            token_type: String::new(),
            refresh_token: refresh_token.to_string(),
            expiry: None,
        }
    }

    /// Non-empty and not about to expire
    pub fn valid(&self) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_DELTA_SECS) > Utc::now(),
            None => true,
        }
    }
}

/// Exchanges a refresh token for a new token
#[async_trait::async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh_token(&self, token: &Token) -> Result<Token>;
}

/// Caches a token and refreshes it on demand
pub struct TokenSource {
    refresher: Box<dyn TokenRefresher>,
    token: tokio::sync::Mutex<Token>,
}

impl TokenSource {
    pub fn new(refresher: Box<dyn TokenRefresher>, token: Token) -> Self {
        Self {
            refresher,
            token: tokio::sync::Mutex::new(token),
        }
    }

    /// Current token, refreshed first if it is no longer valid
    pub async fn token(&self) -> Result<Token> {
        let mut current = self.token.lock().await;
        if current.valid() {
            return Ok(current.clone());
        }

        if current.refresh_token.is_empty() {
            return Err(SeleneError::auth("token expired and no refresh token available"));
        }

        let mut fresh = self.refresher.refresh_token(&current).await?;
        // Providers may omit the refresh token when it did not rotate
        if fresh.refresh_token.is_empty() {
            fresh.refresh_token = current.refresh_token.clone();
        }

        *current = fresh.clone();
        Ok(fresh)
    }
}
