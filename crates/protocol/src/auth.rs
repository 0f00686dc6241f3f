//! Page-derived credential acquisition.
//!
//! The service authorizes turns with a short-lived token pair embedded in
//! the signed-in app page markup: the `SNlM0e` anti-forgery value and the
//! `cfb2h` client build tag. There is no official token endpoint; the
//! provider fetches the page and scrapes both. The pair lives inside the
//! conversation context it was acquired for, so re-acquisition happens
//! once per fresh conversation, never globally.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use shared::{TokenPair, TurnError};
use tokio_util::sync::CancellationToken;

use crate::config::WireConfig;

const AUTH_FIELD: &str = "SNlM0e";
const BUILD_FIELD: &str = "cfb2h";

/// Seam for credential acquisition, injectable so the engine can be
/// tested without a live page.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn acquire(&self, cancel: &CancellationToken) -> Result<TokenPair, TurnError>;
}

/// Production provider: scrapes the app page over the ambient cookie jar.
pub struct PageTokenSource {
    http: Client,
    config: Arc<WireConfig>,
}

impl PageTokenSource {
    pub fn new(config: Arc<WireConfig>) -> Result<Self> {
        Ok(Self {
            http: Client::builder()
                .timeout(Duration::from_secs(45))
                .cookie_store(true)
                .build()?,
            config,
        })
    }
}

#[async_trait]
impl TokenSource for PageTokenSource {
    async fn acquire(&self, cancel: &CancellationToken) -> Result<TokenPair, TurnError> {
        let fetch = async {
            let resp = self
                .http
                .get(&self.config.app_page)
                .send()
                .await
                .map_err(|e| TurnError::Network(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(TurnError::Auth(format!(
                    "app page returned {}",
                    resp.status()
                )));
            }
            let html = resp
                .text()
                .await
                .map_err(|e| TurnError::Network(e.to_string()))?;

            let auth_token = extract_field(AUTH_FIELD, &html).ok_or_else(|| {
                TurnError::Auth("no auth token in page markup; not signed in?".to_string())
            })?;
            // The build tag has a known-good fallback; the auth token does not.
            let routing_token =
                extract_field(BUILD_FIELD, &html).unwrap_or_else(|| self.config.build_tag.clone());

            tracing::debug!("acquired page token pair");
            Ok(TokenPair {
                auth_token,
                routing_token,
            })
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(TurnError::Cancelled),
            result = fetch => result,
        }
    }
}

/// Pull a `"name":"value"` pair out of inline page script.
fn extract_field(name: &str, html: &str) -> Option<String> {
    let pattern = format!(r#""{}":"([^"]+)""#, regex::escape(name));
    let re = Regex::new(&pattern).ok()?;
    Some(re.captures(html)?.get(1)?.as_str().to_string())
}
