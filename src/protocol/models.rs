//! LicenseChain wire structs and normalization into canonical records.
//!
//! The upstream API is inconsistent about field names (`key` vs `licenseKey`,
//! `plan` vs `planName`, several owner fields) and about wrapping bodies in a
//! `data` envelope. Everything is funnelled through this module so the rest
//! of the bot only sees [`LicenseRecord`] and friends.

use crate::BotError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Upstream owner fields, in default matching precedence.
pub const OWNER_FIELDS: [&str; 5] = ["userId", "discordId", "email", "issuedTo", "issuedEmail"];

/// Lifecycle state of a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    /// Usable.
    Active,
    /// Past its expiry.
    Expired,
    /// Revoked or suspended by an operator.
    Revoked,
    /// Anything the bot does not recognize.
    Unknown,
}

impl LicenseStatus {
    /// Lenient parse of upstream and database status strings.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" | "valid" => LicenseStatus::Active,
            "expired" => LicenseStatus::Expired,
            "revoked" | "suspended" | "banned" | "disabled" => LicenseStatus::Revoked,
            _ => LicenseStatus::Unknown,
        }
    }

    /// Lowercase name as stored locally.
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseStatus::Active => "active",
            LicenseStatus::Expired => "expired",
            LicenseStatus::Revoked => "revoked",
            LicenseStatus::Unknown => "unknown",
        }
    }
}

/// One owner-ish field found on an upstream license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerClaim {
    /// Upstream field name, e.g. `issuedEmail`.
    pub field: String,
    /// Field value.
    pub value: String,
}

/// Canonical license shape used by handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseRecord {
    /// Upstream identifier, when it differs from the key.
    pub id: Option<String>,
    /// License key.
    pub key: String,
    /// Normalized status.
    pub status: LicenseStatus,
    /// Plan name.
    pub plan_name: String,
    /// Expiry time, if any.
    pub expires_at: Option<DateTime<Utc>>,
    /// First owner claim by precedence.
    pub owner: Option<String>,
    /// Every owner field present upstream.
    #[serde(default)]
    pub owner_claims: Vec<OwnerClaim>,
    /// Application or product name.
    pub application: Option<String>,
}

/// Raw upstream license object.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLicense {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub license_key: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub plan_name: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default, rename = "expires_at")]
    pub expires_at_snake: Option<String>,
    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub discord_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub issued_to: Option<String>,
    #[serde(default)]
    pub issued_email: Option<String>,
    #[serde(default)]
    pub application_name: Option<String>,
    #[serde(default)]
    pub app_name: Option<String>,
}

impl LicenseRecord {
    /// Normalize a raw upstream license.
    ///
    /// Key precedence is `key`, then `licenseKey`, then `id`.
    pub fn from_upstream(raw: RawLicense) -> Result<Self, BotError> {
        let key = raw
            .key
            .clone()
            .or_else(|| raw.license_key.clone())
            .or_else(|| raw.id.clone())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| BotError::upstream(None, "license object without key or id"))?;

        let owner_claims: Vec<OwnerClaim> = [
            (OWNER_FIELDS[0], &raw.user_id),
            (OWNER_FIELDS[1], &raw.discord_id),
            (OWNER_FIELDS[2], &raw.email),
            (OWNER_FIELDS[3], &raw.issued_to),
            (OWNER_FIELDS[4], &raw.issued_email),
        ]
        .into_iter()
        .filter_map(|(field, value)| {
            value.as_ref().filter(|v| !v.is_empty()).map(|v| OwnerClaim {
                field: field.to_string(),
                value: v.clone(),
            })
        })
        .collect();

        let expires_at = raw
            .expires_at
            .as_deref()
            .or(raw.expires_at_snake.as_deref())
            .or(raw.expiry.as_deref())
            .and_then(parse_timestamp);

        Ok(Self {
            id: raw.id.filter(|id| *id != key),
            status: raw
                .status
                .as_deref()
                .map(LicenseStatus::parse)
                .unwrap_or(LicenseStatus::Unknown),
            plan_name: raw
                .plan_name
                .or(raw.plan)
                .unwrap_or_else(|| "standard".to_string()),
            expires_at,
            owner: owner_claims.first().map(|c| c.value.clone()),
            owner_claims,
            application: raw.application_name.or(raw.app_name),
            key,
        })
    }

    /// Identifier to use for by-id endpoints.
    pub fn api_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.key)
    }
}

/// Normalized answer of the verify endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationOutcome {
    /// Whether the license is currently valid.
    pub valid: bool,
    /// Upstream license id, when reported.
    pub license_id: Option<String>,
    /// Free-form message.
    pub message: Option<String>,
    /// Expiry time, if any.
    pub expires_at: Option<DateTime<Utc>>,
    /// Enabled features.
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawValidation {
    #[serde(default)]
    valid: bool,
    #[serde(default, deserialize_with = "lenient_string")]
    license_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    features: Vec<String>,
}

impl From<RawValidation> for ValidationOutcome {
    fn from(raw: RawValidation) -> Self {
        Self {
            valid: raw.valid,
            license_id: raw.license_id.or(raw.id),
            message: raw.message,
            expires_at: raw.expires_at.as_deref().and_then(parse_timestamp),
            features: raw.features,
        }
    }
}

/// Upstream user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Upstream identifier.
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Display name.
    #[serde(default, alias = "username")]
    pub name: Option<String>,
    /// Creation time as reported upstream.
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<String>,
}

/// Upstream product (application).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Upstream identifier.
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    /// Product name.
    #[serde(default)]
    pub name: Option<String>,
    /// Price in `currency`.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    /// ISO currency code.
    #[serde(default)]
    pub currency: Option<String>,
    /// Creation time as reported upstream.
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<String>,
}

/// Registered webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    /// Upstream identifier.
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    /// Delivery URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Subscribed events.
    #[serde(default)]
    pub events: Vec<String>,
    /// Creation time as reported upstream.
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<String>,
}

/// `/health` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Service status string.
    pub status: String,
    /// Deployed version.
    #[serde(default)]
    pub version: Option<String>,
    /// Server timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// One metric family in the analytics response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricBlock {
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub active: Option<f64>,
    #[serde(default)]
    pub inactive: Option<f64>,
    #[serde(default)]
    pub expired: Option<f64>,
    #[serde(default)]
    pub revoked: Option<f64>,
    #[serde(default)]
    pub rate: Option<f64>,
    #[serde(default)]
    pub growth: Option<f64>,
}

/// Aggregate analytics for the account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    #[serde(default)]
    pub revenue: Option<MetricBlock>,
    #[serde(default)]
    pub licenses: Option<MetricBlock>,
    #[serde(default)]
    pub users: Option<MetricBlock>,
    #[serde(default)]
    pub products: Option<MetricBlock>,
    #[serde(default)]
    pub conversions: Option<MetricBlock>,
    #[serde(default)]
    pub growth: Option<MetricBlock>,
    #[serde(default)]
    pub top_feature: Option<String>,
}

/// Validations on a single day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayUsage {
    pub date: String,
    pub validations: u64,
}

/// Per-license analytics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseAnalytics {
    #[serde(default)]
    pub total_validations: Option<u64>,
    #[serde(default)]
    pub unique_users: Option<u64>,
    #[serde(default)]
    pub average_validations_per_day: Option<f64>,
    #[serde(default)]
    pub peak_usage: Option<DayUsage>,
    #[serde(default)]
    pub usage_by_day: Vec<DayUsage>,
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Total items upstream, or the page length when unreported.
    pub total: u64,
}

/// Body for license creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLicense {
    pub plan: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Partial license update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicensePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LicenseStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Body for user creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub discord_id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Partial user update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserPatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none()
    }
}

/// Body for product creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProduct {
    pub name: String,
    pub price: f64,
    pub currency: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Single<T> {
    Wrapped { data: T },
    Bare(T),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Wrapped {
        data: Vec<T>,
        #[serde(default)]
        total: Option<u64>,
    },
    Licenses {
        licenses: Vec<T>,
        #[serde(default)]
        total: Option<u64>,
    },
    Bare(Vec<T>),
}

/// Parse a single object, with or without a `data` envelope.
pub fn parse_single<T: DeserializeOwned>(body: &[u8]) -> Result<T, BotError> {
    let parsed: Single<T> = serde_json::from_slice(body).map_err(|e| {
        BotError::upstream(None, format!("Failed to parse licensing API response: {}", e))
    })?;
    Ok(match parsed {
        Single::Wrapped { data } => data,
        Single::Bare(value) => value,
    })
}

/// Parse a list in any of the shapes the API emits.
pub fn parse_listing<T: DeserializeOwned>(body: &[u8]) -> Result<Page<T>, BotError> {
    let parsed: Listing<T> = serde_json::from_slice(body).map_err(|e| {
        BotError::upstream(None, format!("Failed to parse licensing API listing: {}", e))
    })?;
    let (items, total) = match parsed {
        Listing::Wrapped { data, total } => (data, total),
        Listing::Licenses { licenses, total } => (licenses, total),
        Listing::Bare(items) => (items, None),
    };
    let total = total.unwrap_or(items.len() as u64);
    Ok(Page { items, total })
}

/// Parse the verify endpoint response.
pub fn parse_validation(body: &[u8]) -> Result<ValidationOutcome, BotError> {
    parse_single::<RawValidation>(body).map(ValidationOutcome::from)
}

/// Parse a license response into a canonical record.
pub fn parse_license(body: &[u8]) -> Result<LicenseRecord, BotError> {
    parse_single::<RawLicense>(body).and_then(LicenseRecord::from_upstream)
}

/// Parse a license listing into canonical records, skipping unusable rows.
pub fn parse_license_listing(body: &[u8]) -> Result<Vec<LicenseRecord>, BotError> {
    let page = parse_listing::<RawLicense>(body)?;
    Ok(page
        .items
        .into_iter()
        .filter_map(|raw| match LicenseRecord::from_upstream(raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed license in listing");
                None
            }
        })
        .collect())
}

/// Parse RFC 3339, SQLite-style or unix-second timestamps.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WRAPPED_LICENSE: &str = r#"{
        "data": {
            "id": 42,
            "licenseKey": "ABCDEFGHIJKLMNOPQRSTUVWXYZ012345",
            "status": "ACTIVE",
            "planName": "yearly",
            "expiresAt": "2026-01-01T00:00:00Z",
            "issuedEmail": "dev@example.com",
            "applicationName": "Widget"
        }
    }"#;

    const BARE_LICENSE: &str = r#"{
        "id": "lic_1",
        "key": "KEY1",
        "licenseKey": "IGNORED",
        "plan": "monthly",
        "status": "suspended",
        "userId": "123",
        "email": "a@b.c"
    }"#;

    #[test]
    fn test_parse_wrapped_license() {
        let record = parse_license(WRAPPED_LICENSE.as_bytes()).unwrap();
        assert_eq!(record.key, "ABCDEFGHIJKLMNOPQRSTUVWXYZ012345");
        assert_eq!(record.id.as_deref(), Some("42"));
        assert_eq!(record.status, LicenseStatus::Active);
        assert_eq!(record.plan_name, "yearly");
        assert!(record.expires_at.is_some());
        assert_eq!(record.owner.as_deref(), Some("dev@example.com"));
        assert_eq!(record.application.as_deref(), Some("Widget"));
    }

    #[test]
    fn test_key_precedence_and_owner_claims() {
        let record = parse_license(BARE_LICENSE.as_bytes()).unwrap();
        assert_eq!(record.key, "KEY1");
        assert_eq!(record.status, LicenseStatus::Revoked);
        assert_eq!(record.plan_name, "monthly");
        assert_eq!(record.owner.as_deref(), Some("123"));
        assert_eq!(record.owner_claims.len(), 2);
        assert_eq!(record.owner_claims[1].field, "email");
    }

    #[test]
    fn test_id_used_as_key_fallback() {
        let record = parse_license(br#"{"id": "only-id"}"#).unwrap();
        assert_eq!(record.key, "only-id");
        assert_eq!(record.id, None);
        assert_eq!(record.api_id(), "only-id");
        assert_eq!(record.status, LicenseStatus::Unknown);
    }

    #[test]
    fn test_license_without_any_key_is_rejected() {
        let result = parse_license(br#"{"status": "active"}"#);
        assert!(matches!(result, Err(BotError::Upstream { .. })));
    }

    #[test]
    fn test_listing_shapes() {
        let wrapped = parse_license_listing(br#"{"data": [{"key": "A"}, {"key": "B"}], "total": 9}"#).unwrap();
        assert_eq!(wrapped.len(), 2);

        let licenses = parse_license_listing(br#"{"licenses": [{"licenseKey": "A"}]}"#).unwrap();
        assert_eq!(licenses[0].key, "A");

        let bare = parse_license_listing(br#"[{"id": 1}, {"status": "active"}]"#).unwrap();
        assert_eq!(bare.len(), 1, "row without key is skipped");
    }

    #[test]
    fn test_listing_total_defaults_to_len() {
        let page: Page<Webhook> = parse_listing(br#"[{"id": "w1", "url": "https://x", "events": ["a"]}]"#).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].events, vec!["a"]);
    }

    #[test]
    fn test_parse_validation() {
        let outcome = parse_validation(
            br#"{"valid": true, "licenseId": "lic_9", "features": ["pro"], "expiresAt": "2030-05-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(outcome.valid);
        assert_eq!(outcome.license_id.as_deref(), Some("lic_9"));
        assert_eq!(outcome.features, vec!["pro"]);
    }

    #[test]
    fn test_parse_validation_defaults_to_invalid() {
        let outcome = parse_validation(br#"{"message": "not found"}"#).unwrap();
        assert!(!outcome.valid);
        assert_eq!(outcome.message.as_deref(), Some("not found"));
    }

    #[test]
    fn test_parse_malformed_json() {
        let result = parse_validation(b"not json");
        assert!(matches!(result, Err(BotError::Upstream { status: None, .. })));
    }

    #[test]
    fn test_product_price_lenient() {
        let product: Product = parse_single(br#"{"data": {"id": 7, "name": "Pro", "price": "19.99"}}"#).unwrap();
        assert_eq!(product.id.as_deref(), Some("7"));
        assert_eq!(product.price, Some(19.99));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2025-01-15T12:00:00Z").is_some());
        assert!(parse_timestamp("2025-01-15 12:00:00").is_some());
        assert!(parse_timestamp("1736942400").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(LicenseStatus::parse("Valid"), LicenseStatus::Active);
        assert_eq!(LicenseStatus::parse("EXPIRED"), LicenseStatus::Expired);
        assert_eq!(LicenseStatus::parse("banned"), LicenseStatus::Revoked);
        assert_eq!(LicenseStatus::parse("pending"), LicenseStatus::Unknown);
    }

    #[test]
    fn test_license_patch_skips_unset_fields() {
        let patch = LicensePatch {
            status: Some(LicenseStatus::Revoked),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&patch).unwrap(), r#"{"status":"revoked"}"#);
    }
}
