//! Two-step credential exchange against the feed vendor.
//!
//! Step one trades the configured username/password for a session token;
//! step two trades the token for the subscriber (investor) id. The broker
//! expects the investor id as the MQTT username and the token as the
//! password.

use crate::error::{CollectorError, Result};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tickflow_config::DataFeedConfig;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Broker credentials for one feed session.
#[derive(Debug, Clone)]
pub struct FeedCredentials {
    /// Subscriber id, used as the broker username.
    pub investor_id: String,
    /// Session token, used as the broker password.
    pub token: String,
}

pub struct TokenClient {
    http: reqwest::Client,
    token_url: String,
    investor_url: String,
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvestorResponse {
    investor_id: Option<String>,
}

impl TokenClient {
    pub fn new(feed: &DataFeedConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            token_url: feed.token_url.clone(),
            investor_url: feed.investor_url.clone(),
            username: feed.username.clone(),
            password: feed.password.clone(),
        })
    }

    /// Run the full exchange. Any failure aborts the connect attempt; the
    /// caller retries on the next reconnect or scheduled reset, so there is
    /// no retry loop here.
    pub async fn exchange(&self) -> Result<FeedCredentials> {
        let token = self.fetch_token().await?;
        let investor_id = self.fetch_investor_id(&token).await?;
        debug!(investor_id, "feed credentials refreshed");
        Ok(FeedCredentials { investor_id, token })
    }

    async fn fetch_token(&self) -> Result<String> {
        let response: TokenResponse = self
            .http
            .post(&self.token_url)
            .json(&json!({
                "username": self.username,
                "password": self.password,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .token
            .ok_or(CollectorError::MalformedCredentials("token"))
    }

    async fn fetch_investor_id(&self, token: &str) -> Result<String> {
        let response: InvestorResponse = self
            .http
            .get(&self.investor_url)
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .investor_id
            .ok_or(CollectorError::MalformedCredentials("investorId"))
    }
}
