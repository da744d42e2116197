//! Volkswagen token refresh service

use crate::error::{Result, SeleneError};
use crate::logging::{StructuredLogger, get_logger};
use crate::oauth::{Token, TokenRefresher};
use reqwest::header::ACCEPT;

/// VW token refresh endpoint
pub const OAUTH_TOKEN_URI: &str = "https://tokenrefreshservice.apps.emea.vwapps.io/refreshTokens";

const SCOPE: &str = "sc2:fal";

/// Refreshes VW identity tokens
pub struct VwTokenRefresher {
    client: reqwest::Client,
    client_id: String,
    token_uri: String,
    logger: StructuredLogger,
}

impl VwTokenRefresher {
    pub fn new(client_id: &str) -> Self {
        Self::with_token_uri(client_id, OAUTH_TOKEN_URI)
    }

    /// Use a different token endpoint
    pub fn with_token_uri(client_id: &str, token_uri: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id: client_id.to_string(),
            token_uri: token_uri.to_string(),
            logger: get_logger("vw"),
        }
    }
}

#[async_trait::async_trait]
impl TokenRefresher for VwTokenRefresher {
    async fn refresh_token(&self, token: &Token) -> Result<Token> {
        self.logger.debug("refreshing token");

        let resp = self
            .client
            .post(&self.token_uri)
            .header("X-Client-Id", &self.client_id)
            .header(ACCEPT, "application/json")
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", token.refresh_token.as_str()),
                ("scope", SCOPE),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SeleneError::api(format!(
                "token refresh failed: {}",
                status
            )));
        }

        Ok(resp.json::<Token>().await?)
    }
}
