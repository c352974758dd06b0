//! In-memory collaborators for handler and dispatcher tests.

use crate::client::{ApiOutcome, LicenseApi, RetryPolicy};
use crate::clock::{Clock, MockClock};
use crate::dispatch::{Caller, Dispatcher, HandlerSettings};
use crate::meter::usage::{BotStats, Period, UsageSummary};
use crate::policy::tier::PermissionResolver;
use crate::protocol::models::{
    AnalyticsReport, DayUsage, HealthStatus, LicenseAnalytics, LicensePatch, LicenseRecord,
    LicenseStatus, MetricBlock, NewLicense, NewProduct, NewUser, OwnerClaim, Page, Product,
    UserPatch, UserProfile, ValidationOutcome, Webhook,
};
use crate::store::{LicenseStore, UserRecord, UserUpdate, ValidationLogEntry};
use crate::BotError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const KEY_A: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ012345";
pub const KEY_B: &str = "ZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZ";
pub const OWNER: &str = "owner-1";
pub const ADMIN_ROLE: &str = "role-admin";
pub const NOW: &str = "2025-06-01T12:00:00Z";

pub fn user_caller(identity: &str) -> Caller {
    Caller::new(identity)
}

pub fn admin_caller(identity: &str) -> Caller {
    Caller::new(identity).with_roles([ADMIN_ROLE])
}

pub fn owner_caller() -> Caller {
    Caller::new(OWNER)
}

/// License owned by `discord_id`.
pub fn license(key: &str, discord_id: &str, status: LicenseStatus) -> LicenseRecord {
    LicenseRecord {
        id: None,
        key: key.to_string(),
        status,
        plan_name: "monthly".to_string(),
        expires_at: None,
        owner: Some(discord_id.to_string()),
        owner_claims: vec![OwnerClaim {
            field: "discordId".to_string(),
            value: discord_id.to_string(),
        }],
        application: Some("Demo App".to_string()),
    }
}

fn unavailable() -> BotError {
    BotError::upstream(Some(503), "service unavailable")
}

/// Licensing API double. Every call bumps `calls`; `fail_all` turns every
/// call into a 503.
#[derive(Default)]
pub struct MockApi {
    pub calls: AtomicUsize,
    pub fail_all: AtomicBool,
    pub user_endpoint: AtomicBool,
    /// Transient failures `revoke_license` returns before succeeding.
    pub revoke_failures: AtomicUsize,
    pub licenses: Mutex<Vec<LicenseRecord>>,
    pub created_users: Mutex<Vec<NewUser>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_licenses(licenses: Vec<LicenseRecord>) -> Self {
        let api = Self::new();
        *api.licenses.lock().unwrap() = licenses;
        api
    }

    pub fn failing() -> Self {
        let api = Self::new();
        api.fail_all.store(true, Ordering::SeqCst);
        api
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), BotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }

    /// Lookup by license key, as the verify endpoint does.
    fn find_by_key(&self, key: &str) -> Option<LicenseRecord> {
        self.licenses
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.key == key)
            .cloned()
    }

    /// Lookup by upstream id, as the `/licenses/{id}` endpoints do.
    fn find_by_id(&self, id: &str) -> Option<LicenseRecord> {
        self.licenses
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.api_id() == id)
            .cloned()
    }
}

#[async_trait]
impl LicenseApi for MockApi {
    async fn validate_license(
        &self,
        key: &str,
        _hardware_id: Option<&str>,
    ) -> Result<ValidationOutcome, BotError> {
        self.enter()?;
        let found = self.find_by_key(key);
        let valid = found
            .as_ref()
            .map(|l| l.status == LicenseStatus::Active)
            .unwrap_or(false);
        Ok(ValidationOutcome {
            valid,
            license_id: found.as_ref().map(|l| l.api_id().to_string()),
            message: Some(if valid { "License is valid" } else { "License not found" }.into()),
            expires_at: found.and_then(|l| l.expires_at),
            features: if valid { vec!["pro".into()] } else { vec![] },
        })
    }

    async fn get_license(&self, id: &str) -> Result<LicenseRecord, BotError> {
        self.enter()?;
        self.find_by_id(id)
            .ok_or_else(|| BotError::upstream(Some(404), "License not found"))
    }

    async fn create_license(
        &self,
        _app_id: &str,
        data: &NewLicense,
    ) -> Result<LicenseRecord, BotError> {
        self.enter()?;
        let key = data.key.clone().unwrap_or_else(|| KEY_B.to_string());
        let mut record = license(&key, data.user_id.as_deref().unwrap_or(""), LicenseStatus::Active);
        record.plan_name = data.plan.clone();
        if data.user_id.is_none() {
            record.owner = data.email.clone();
            record.owner_claims.clear();
        }
        self.licenses.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn update_license(
        &self,
        id: &str,
        patch: &LicensePatch,
    ) -> Result<LicenseRecord, BotError> {
        self.enter()?;
        let mut licenses = self.licenses.lock().unwrap();
        let record = licenses
            .iter_mut()
            .find(|l| l.api_id() == id)
            .ok_or_else(|| BotError::upstream(Some(404), "License not found"))?;
        if let Some(status) = patch.status {
            record.status = status;
        }
        Ok(record.clone())
    }

    async fn revoke_license(&self, id: &str) -> Result<(), BotError> {
        self.enter()?;
        let pending = self.revoke_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.revoke_failures.store(pending - 1, Ordering::SeqCst);
            return Err(unavailable());
        }
        let mut licenses = self.licenses.lock().unwrap();
        match licenses.iter_mut().find(|l| l.api_id() == id) {
            Some(record) => {
                record.status = LicenseStatus::Revoked;
                Ok(())
            }
            None => Err(BotError::upstream(Some(404), "License not found")),
        }
    }

    async fn list_licenses_for_app(&self, _app_id: &str) -> Result<Vec<LicenseRecord>, BotError> {
        self.enter()?;
        Ok(self.licenses.lock().unwrap().clone())
    }

    async fn get_license_analytics(
        &self,
        _id: &str,
        _period: Period,
    ) -> Result<LicenseAnalytics, BotError> {
        self.enter()?;
        Ok(LicenseAnalytics {
            total_validations: Some(42),
            unique_users: Some(3),
            average_validations_per_day: Some(1.4),
            peak_usage: Some(DayUsage {
                date: "2025-05-20".into(),
                validations: 9,
            }),
            usage_by_day: vec![DayUsage {
                date: "2025-05-31".into(),
                validations: 2,
            }],
        })
    }

    async fn get_analytics(
        &self,
        _period: Period,
        _metrics: &[&str],
    ) -> Result<AnalyticsReport, BotError> {
        self.enter()?;
        Ok(AnalyticsReport {
            revenue: Some(MetricBlock {
                total: Some(1250.0),
                growth: Some(12.5),
                ..Default::default()
            }),
            licenses: Some(MetricBlock {
                total: Some(10.0),
                active: Some(7.0),
                expired: Some(2.0),
                revoked: Some(1.0),
                ..Default::default()
            }),
            users: Some(MetricBlock {
                total: Some(5.0),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    async fn get_user(&self, id: &str) -> Result<ApiOutcome<UserProfile>, BotError> {
        self.enter()?;
        if !self.user_endpoint.load(Ordering::SeqCst) {
            return Ok(ApiOutcome::NotSupported {
                operation: "get_user",
            });
        }
        Ok(ApiOutcome::Available(UserProfile {
            id: Some(id.to_string()),
            email: Some("remote@example.com".into()),
            name: Some("Remote Name".into()),
            created_at: Some("2025-01-01".into()),
        }))
    }

    async fn create_user(&self, user: &NewUser) -> Result<UserProfile, BotError> {
        self.enter()?;
        self.created_users.lock().unwrap().push(user.clone());
        Ok(UserProfile {
            id: Some("u-1".into()),
            email: Some(user.email.clone()),
            name: user.name.clone(),
            created_at: None,
        })
    }

    async fn update_user(&self, id: &str, patch: &UserPatch) -> Result<UserProfile, BotError> {
        self.enter()?;
        Ok(UserProfile {
            id: Some(id.to_string()),
            email: patch.email.clone(),
            name: patch.name.clone(),
            created_at: None,
        })
    }

    async fn list_users(&self, _page: u32, limit: u32) -> Result<Page<UserProfile>, BotError> {
        self.enter()?;
        let items: Vec<UserProfile> = (1..=limit.min(2))
            .map(|i| UserProfile {
                id: Some(format!("u-{}", i)),
                email: Some(format!("user{}@example.com", i)),
                name: Some(format!("User {}", i)),
                created_at: None,
            })
            .collect();
        Ok(Page { items, total: 2 })
    }

    async fn get_product(&self, id: &str) -> Result<Product, BotError> {
        self.enter()?;
        Ok(Product {
            id: Some(id.to_string()),
            name: Some("Demo App".into()),
            price: Some(9.99),
            currency: Some("USD".into()),
            created_at: None,
        })
    }

    async fn create_product(&self, product: &NewProduct) -> Result<Product, BotError> {
        self.enter()?;
        Ok(Product {
            id: Some("p-1".into()),
            name: Some(product.name.clone()),
            price: Some(product.price),
            currency: Some(product.currency.clone()),
            created_at: None,
        })
    }

    async fn list_products(&self, _page: u32, _limit: u32) -> Result<Page<Product>, BotError> {
        self.enter()?;
        Ok(Page {
            items: vec![],
            total: 0,
        })
    }

    async fn list_webhooks(&self) -> Result<Vec<Webhook>, BotError> {
        self.enter()?;
        Ok(vec![Webhook {
            id: Some("wh-1".into()),
            url: Some("https://example.com/hook".into()),
            events: vec!["license.created".into()],
            created_at: None,
        }])
    }

    async fn health_check(&self) -> Result<HealthStatus, BotError> {
        self.enter()?;
        Ok(HealthStatus {
            status: "healthy".into(),
            version: Some("1.2.3".into()),
            timestamp: None,
        })
    }
}

#[derive(Default)]
struct StoreState {
    users: BTreeMap<String, UserRecord>,
    licenses: Vec<(String, LicenseRecord)>,
    validations: Vec<ValidationLogEntry>,
    commands: Vec<(String, String)>,
}

/// Store double backed by a mutex-guarded map.
#[derive(Default)]
pub struct MockStore {
    pub calls: AtomicUsize,
    pub fail_all: AtomicBool,
    state: Mutex<StoreState>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let store = Self::new();
        store.fail_all.store(true, Ordering::SeqCst);
        store
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seed_license(&self, identity: &str, record: LicenseRecord) {
        self.state
            .lock()
            .unwrap()
            .licenses
            .push((identity.to_string(), record));
    }

    pub fn validations(&self) -> Vec<ValidationLogEntry> {
        self.state.lock().unwrap().validations.clone()
    }

    pub fn commands(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn license_status(&self, key: &str) -> Option<LicenseStatus> {
        self.state
            .lock()
            .unwrap()
            .licenses
            .iter()
            .find(|(_, l)| l.key == key)
            .map(|(_, l)| l.status)
    }

    fn enter(&self) -> Result<(), BotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(BotError::StoreUnavailable("database is locked".into()));
        }
        Ok(())
    }

    fn user_entry<'a>(state: &'a mut StoreState, identity: &str) -> &'a mut UserRecord {
        let next_id = state.users.len() as i64 + 1;
        state
            .users
            .entry(identity.to_string())
            .or_insert_with(|| UserRecord {
                id: next_id,
                identity: identity.to_string(),
                username: None,
                email: None,
                created_at: 0,
                updated_at: 0,
            })
    }
}

#[async_trait]
impl LicenseStore for MockStore {
    async fn get_user(&self, identity: &str) -> Result<Option<UserRecord>, BotError> {
        self.enter()?;
        Ok(self.state.lock().unwrap().users.get(identity).cloned())
    }

    async fn get_or_create_user(
        &self,
        identity: &str,
        username: Option<&str>,
    ) -> Result<UserRecord, BotError> {
        self.enter()?;
        let mut state = self.state.lock().unwrap();
        let user = Self::user_entry(&mut state, identity);
        if user.username.is_none() {
            user.username = username.map(str::to_string);
        }
        Ok(user.clone())
    }

    async fn update_user(
        &self,
        identity: &str,
        update: &UserUpdate,
    ) -> Result<UserRecord, BotError> {
        self.enter()?;
        let mut state = self.state.lock().unwrap();
        let user = Self::user_entry(&mut state, identity);
        if let Some(name) = &update.username {
            user.username = Some(name.clone());
        }
        if let Some(email) = &update.email {
            user.email = Some(email.clone());
        }
        Ok(user.clone())
    }

    async fn get_user_licenses(&self, identity: &str) -> Result<Vec<LicenseRecord>, BotError> {
        self.enter()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .licenses
            .iter()
            .filter(|(owner, _)| owner == identity)
            .map(|(_, l)| l.clone())
            .collect())
    }

    async fn find_license(&self, key: &str) -> Result<Option<LicenseRecord>, BotError> {
        self.enter()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .licenses
            .iter()
            .find(|(_, l)| l.key == key)
            .map(|(_, l)| l.clone()))
    }

    async fn upsert_license(
        &self,
        identity: &str,
        license: &LicenseRecord,
    ) -> Result<(), BotError> {
        self.enter()?;
        let mut state = self.state.lock().unwrap();
        state.licenses.retain(|(_, l)| l.key != license.key);
        state.licenses.push((identity.to_string(), license.clone()));
        Ok(())
    }

    async fn set_license_status(
        &self,
        key: &str,
        status: LicenseStatus,
    ) -> Result<bool, BotError> {
        self.enter()?;
        let mut state = self.state.lock().unwrap();
        match state.licenses.iter_mut().find(|(_, l)| l.key == key) {
            Some((_, l)) => {
                l.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn log_validation(
        &self,
        identity: &str,
        key: &str,
        succeeded: bool,
    ) -> Result<(), BotError> {
        self.enter()?;
        self.state.lock().unwrap().validations.push(ValidationLogEntry {
            identity: identity.to_string(),
            license_key: key.to_string(),
            succeeded,
            timestamp: MockClock::from_rfc3339(NOW).now_utc(),
        });
        Ok(())
    }

    async fn log_command(&self, identity: &str, command: &str) -> Result<(), BotError> {
        self.enter()?;
        self.state
            .lock()
            .unwrap()
            .commands
            .push((identity.to_string(), command.to_string()));
        Ok(())
    }

    async fn get_usage_stats(
        &self,
        identity: &str,
        period: Period,
    ) -> Result<UsageSummary, BotError> {
        self.enter()?;
        let state = self.state.lock().unwrap();
        Ok(UsageSummary::tally(
            period,
            state
                .validations
                .iter()
                .filter(|v| v.identity == identity)
                .map(|v| (v.license_key.as_str(), v.succeeded)),
        ))
    }

    async fn get_bot_stats(&self) -> Result<BotStats, BotError> {
        self.enter()?;
        let state = self.state.lock().unwrap();
        Ok(BotStats {
            total_users: state.users.len() as u64,
            total_licenses: state.licenses.len() as u64,
            total_commands: state.commands.len() as u64,
            total_validations: state.validations.len() as u64,
        })
    }

    async fn close(&self) {}
}

/// Dispatcher over the full command table with the given doubles.
pub fn dispatcher(api: Arc<MockApi>, store: Arc<dyn LicenseStore>) -> Dispatcher {
    let settings = HandlerSettings {
        app_id: Some("app-1".to_string()),
        retry: RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::ZERO,
        },
        ..HandlerSettings::default()
    };
    Dispatcher::new(
        crate::commands::command_table().unwrap(),
        PermissionResolver::new(Some(OWNER.to_string()), vec![ADMIN_ROLE.to_string()]),
        api,
        store,
        Arc::new(MockClock::from_rfc3339(NOW)),
        settings,
    )
}
