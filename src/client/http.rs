//! Reqwest-based client for the LicenseChain REST API.
//!
//! Every request:
//! 1. Fails fast when no API key is configured
//! 2. Carries `Authorization: Bearer`, a fixed `User-Agent` and `X-Client-Id`
//! 3. Logs method and path at debug, failures at warn
//! 4. Maps non-2xx statuses to `BotError::Upstream` and connection
//!    failures to `BotError::Transport`

use crate::client::api::{ApiOutcome, LicenseApi};
use crate::config::BotConfig;
use crate::crypto::digest::key_fingerprint;
use crate::meter::usage::Period;
use crate::protocol::models::{
    parse_license, parse_license_listing, parse_listing, parse_single, parse_validation,
    AnalyticsReport, HealthStatus, LicenseAnalytics, LicensePatch, LicenseRecord, NewLicense,
    NewProduct, NewUser, Page, Product, UserPatch, UserProfile, ValidationOutcome, Webhook,
};
use crate::BotError;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Method, Response, Url};
use serde::Serialize;
use std::time::Duration;

/// Client identifier sent with every request.
pub const CLIENT_ID: &str = "licensebot-discord";

/// Versioned path prefix.
pub const API_VERSION: &str = "v1";

/// Hardware id reported when the caller supplies none.
pub const DEFAULT_HARDWARE_ID: &str = "discord-bot";

/// Status and body of an upstream response.
#[derive(Debug)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,

    /// Raw response body.
    pub body: Vec<u8>,
}

impl ApiResponse {
    async fn from_response(response: Response) -> Result<Self, BotError> {
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| BotError::Transport(format!("Failed to read body (HTTP {}): {}", status, e)))?
            .to_vec();
        Ok(Self { status, body })
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body on success, `Upstream` error carrying the upstream message otherwise.
    pub fn into_success(self) -> Result<Vec<u8>, BotError> {
        if self.is_success() {
            return Ok(self.body);
        }
        Err(BotError::upstream(Some(self.status), error_message(&self.body)))
    }
}

/// Pull a human-readable message out of an error body.
fn error_message(body: &[u8]) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_slice(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str())
        })
        .map(str::to_string)
        .unwrap_or_else(|| {
            let text = String::from_utf8_lossy(body);
            if text.trim().is_empty() {
                "empty response".to_string()
            } else {
                crate::validate::truncate_for_display(text.trim(), 200)
            }
        })
}

/// HTTP implementation of [`LicenseApi`].
pub struct HttpLicenseClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    user_agent: String,
}

impl HttpLicenseClient {
    /// Create a client from bot configuration.
    pub fn new(config: &BotConfig) -> Result<Self, BotError> {
        Self::with_settings(&config.api_url, config.api_key.clone(), config.request_timeout)
    }

    /// Create a client with an explicit base URL, key and timeout.
    pub fn with_settings(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BotError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| BotError::ConfigError(format!("Invalid API URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(BotError::ConfigError(format!(
                "API URL '{}' cannot carry paths",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BotError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key,
            user_agent: build_user_agent(),
        })
    }

    /// Base URL requests are made against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build a URL from path segments, percent-encoding each.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, BotError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BotError::ConfigError("API URL cannot carry paths".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn credential(&self) -> Result<&str, BotError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| BotError::upstream(None, "API credential not configured"))
    }

    async fn execute<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<ApiResponse, BotError> {
        let key = self.credential()?;
        let url = self.endpoint(segments)?;
        tracing::debug!(method = %method, path = %url.path(), "licensing API request");

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .header(AUTHORIZATION, format!("Bearer {}", key))
            .header(USER_AGENT, &self.user_agent)
            .header("X-Client-Id", CLIENT_ID)
            .header(ACCEPT, "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(method = %method, path = %url.path(), error = %e, "licensing API transport failure");
            BotError::Transport(format!("Request failed: {}", e))
        })?;

        let response = ApiResponse::from_response(response).await?;
        if !response.is_success() {
            tracing::warn!(
                method = %method,
                path = %url.path(),
                status = response.status,
                "licensing API returned an error"
            );
        }
        Ok(response)
    }

    async fn get(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Vec<u8>, BotError> {
        self.execute::<()>(Method::GET, segments, query, None)
            .await?
            .into_success()
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> Result<Vec<u8>, BotError> {
        self.execute(method, segments, &[], Some(body))
            .await?
            .into_success()
    }
}

fn page_query(page: u32, limit: u32) -> [(&'static str, String); 2] {
    [("page", page.to_string()), ("limit", limit.to_string())]
}

#[async_trait]
impl LicenseApi for HttpLicenseClient {
    async fn validate_license(
        &self,
        key: &str,
        hardware_id: Option<&str>,
    ) -> Result<ValidationOutcome, BotError> {
        tracing::debug!(key_fingerprint = %key_fingerprint(key), "validating license");
        let body = serde_json::json!({
            "key": key,
            "hardwareId": hardware_id.unwrap_or(DEFAULT_HARDWARE_ID),
        });
        let bytes = self
            .send_json(Method::POST, &[API_VERSION, "licenses", "verify"], &body)
            .await?;
        parse_validation(&bytes)
    }

    async fn get_license(&self, id: &str) -> Result<LicenseRecord, BotError> {
        let bytes = self.get(&[API_VERSION, "licenses", id], &[]).await?;
        parse_license(&bytes)
    }

    async fn create_license(
        &self,
        app_id: &str,
        data: &NewLicense,
    ) -> Result<LicenseRecord, BotError> {
        let bytes = self
            .send_json(Method::POST, &[API_VERSION, "apps", app_id, "licenses"], data)
            .await?;
        parse_license(&bytes)
    }

    async fn update_license(
        &self,
        id: &str,
        patch: &LicensePatch,
    ) -> Result<LicenseRecord, BotError> {
        let bytes = self
            .send_json(Method::PATCH, &[API_VERSION, "licenses", id], patch)
            .await?;
        parse_license(&bytes)
    }

    async fn revoke_license(&self, id: &str) -> Result<(), BotError> {
        self.execute::<()>(Method::DELETE, &[API_VERSION, "licenses", id], &[], None)
            .await?
            .into_success()
            .map(|_| ())
    }

    async fn list_licenses_for_app(&self, app_id: &str) -> Result<Vec<LicenseRecord>, BotError> {
        let bytes = self.get(&[API_VERSION, "apps", app_id, "licenses"], &[]).await?;
        parse_license_listing(&bytes)
    }

    async fn get_license_analytics(
        &self,
        id: &str,
        period: Period,
    ) -> Result<LicenseAnalytics, BotError> {
        let bytes = self
            .get(
                &[API_VERSION, "licenses", id, "analytics"],
                &[("period", period.to_string())],
            )
            .await?;
        parse_single(&bytes)
    }

    async fn get_analytics(
        &self,
        period: Period,
        metrics: &[&str],
    ) -> Result<AnalyticsReport, BotError> {
        let mut query = vec![("period", period.to_string())];
        if !metrics.is_empty() {
            query.push(("metrics", metrics.join(",")));
        }
        let bytes = self.get(&[API_VERSION, "analytics"], &query).await?;
        parse_single(&bytes)
    }

    async fn get_user(&self, id: &str) -> Result<ApiOutcome<UserProfile>, BotError> {
        let response = self
            .execute::<()>(Method::GET, &[API_VERSION, "users", id], &[], None)
            .await?;
        if matches!(response.status, 404 | 405 | 501) {
            tracing::debug!(status = response.status, "user lookup not supported upstream");
            return Ok(ApiOutcome::NotSupported {
                operation: "get_user",
            });
        }
        let bytes = response.into_success()?;
        parse_single(&bytes).map(ApiOutcome::Available)
    }

    async fn create_user(&self, user: &NewUser) -> Result<UserProfile, BotError> {
        let bytes = self
            .send_json(Method::POST, &[API_VERSION, "users"], user)
            .await?;
        parse_single(&bytes)
    }

    async fn update_user(&self, id: &str, patch: &UserPatch) -> Result<UserProfile, BotError> {
        let bytes = self
            .send_json(Method::PATCH, &[API_VERSION, "users", id], patch)
            .await?;
        parse_single(&bytes)
    }

    async fn list_users(&self, page: u32, limit: u32) -> Result<Page<UserProfile>, BotError> {
        let bytes = self
            .get(&[API_VERSION, "users"], &page_query(page, limit))
            .await?;
        parse_listing(&bytes)
    }

    async fn get_product(&self, id: &str) -> Result<Product, BotError> {
        let bytes = self.get(&[API_VERSION, "apps", id], &[]).await?;
        parse_single(&bytes)
    }

    async fn create_product(&self, product: &NewProduct) -> Result<Product, BotError> {
        let bytes = self
            .send_json(Method::POST, &[API_VERSION, "apps"], product)
            .await?;
        parse_single(&bytes)
    }

    async fn list_products(&self, page: u32, limit: u32) -> Result<Page<Product>, BotError> {
        let bytes = self
            .get(&[API_VERSION, "apps"], &page_query(page, limit))
            .await?;
        parse_listing(&bytes)
    }

    async fn list_webhooks(&self) -> Result<Vec<Webhook>, BotError> {
        let bytes = self.get(&[API_VERSION, "webhooks"], &[]).await?;
        parse_listing(&bytes).map(|page| page.items)
    }

    async fn health_check(&self) -> Result<HealthStatus, BotError> {
        let bytes = self.get(&["health"], &[]).await?;
        parse_single(&bytes)
    }
}

/// Build the User-Agent string.
///
/// Format: `licensebot/<version>`
pub fn build_user_agent() -> String {
    format!("licensebot/{}", env!("CARGO_PKG_VERSION"))
}
