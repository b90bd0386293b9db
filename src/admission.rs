//! Admission Control
//!
//! Authorization and credit checks applied before any remote generation call, and
//! consumption recording after a successful one. Charging happens only after success;
//! a failed recording is surfaced, never retried automatically.

use crate::config::{AdmissionConfig, CreditsConfig};
use crate::error::{AdmissionDenial, ApiError, ConsumptionError, StorageError};
use crate::step::{StepId, StepRegistry};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Environment variable that must be set to `1` for bypass mode to take effect.
pub const BYPASS_ENV_VAR: &str = "BRANDSTAGE_ADMISSION_BYPASS";

/// Usage reported after a successful generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    pub step: StepId,
    pub prompt_length: usize,
    pub credits: u64,
}

#[async_trait]
pub trait AdmissionController: Send + Sync {
    /// Decide whether a generation costing `required_credits` may start.
    async fn authorize(&self, required_credits: u64) -> Result<(), AdmissionDenial>;

    /// Record consumption for a generation that already succeeded.
    async fn record_consumption(&self, record: &ConsumptionRecord) -> Result<(), ConsumptionError>;
}

/// Credit cost per step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditPolicy {
    default_cost: u64,
    overrides: HashMap<StepId, u64>,
}

impl Default for CreditPolicy {
    fn default() -> Self {
        Self::flat(1)
    }
}

impl CreditPolicy {
    pub fn flat(cost: u64) -> Self {
        Self {
            default_cost: cost,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, step: StepId, cost: u64) -> Self {
        self.overrides.insert(step, cost);
        self
    }

    /// Build from configuration, resolving step keys against the registry.
    pub fn from_config(config: &CreditsConfig, registry: &StepRegistry) -> Result<Self, ApiError> {
        let mut policy = Self::flat(config.default_cost);
        for (key, cost) in &config.overrides {
            let step = registry.resolve(key).ok_or_else(|| {
                ApiError::ConfigError(format!("Credit override for unknown step '{}'", key))
            })?;
            policy.overrides.insert(step.id, *cost);
        }
        Ok(policy)
    }

    pub fn credits_for(&self, step: StepId) -> u64 {
        self.overrides
            .get(&step)
            .copied()
            .unwrap_or(self.default_cost)
    }
}

#[derive(Debug)]
struct LedgerState {
    balance: u64,
    history: Vec<ConsumptionRecord>,
}

/// In-memory credit ledger for one account.
#[derive(Debug)]
pub struct CreditLedger {
    account_id: Option<String>,
    state: Mutex<LedgerState>,
}

impl CreditLedger {
    pub fn new(account_id: Option<String>, balance: u64) -> Self {
        Self {
            account_id,
            state: Mutex::new(LedgerState {
                balance,
                history: Vec::new(),
            }),
        }
    }

    /// Ledger with no signed-in account; every authorization is denied.
    pub fn anonymous() -> Self {
        Self::new(None, 0)
    }

    pub fn balance(&self) -> u64 {
        self.state.lock().balance
    }

    pub fn grant(&self, credits: u64) -> u64 {
        let mut state = self.state.lock();
        state.balance = state.balance.saturating_add(credits);
        state.balance
    }

    pub fn history(&self) -> Vec<ConsumptionRecord> {
        self.state.lock().history.clone()
    }
}

#[async_trait]
impl AdmissionController for CreditLedger {
    async fn authorize(&self, required_credits: u64) -> Result<(), AdmissionDenial> {
        if self.account_id.is_none() {
            return Err(AdmissionDenial::NotAuthenticated);
        }
        let available = self.state.lock().balance;
        check_balance(required_credits, available)
    }

    async fn record_consumption(&self, record: &ConsumptionRecord) -> Result<(), ConsumptionError> {
        let mut state = self.state.lock();
        // Authorization happened before generation; the balance may have moved since.
        state.balance = state.balance.saturating_sub(record.credits);
        state.history.push(record.clone());
        debug!(
            step = %record.step,
            credits = record.credits,
            balance = state.balance,
            "Recorded credit consumption"
        );
        Ok(())
    }
}

const TREE_CREDITS: &str = "credits";

/// Credit ledger whose balance lives in a sled tree, keyed by account.
pub struct SledCreditLedger {
    account_id: Option<String>,
    tree: sled::Tree,
}

impl SledCreditLedger {
    pub fn open(db: &sled::Db, account_id: Option<String>) -> Result<Self, StorageError> {
        let tree = db.open_tree(TREE_CREDITS)?;
        Ok(Self { account_id, tree })
    }

    /// Seed the balance if this account has never been seen.
    pub fn ensure_initial_balance(&self, credits: u64) -> Result<(), StorageError> {
        if let Some(account) = &self.account_id {
            let _ = self.tree.compare_and_swap(
                account.as_bytes(),
                None as Option<&[u8]>,
                Some(&credits.to_be_bytes()[..]),
            )?;
            self.tree.flush()?;
        }
        Ok(())
    }

    pub fn balance(&self) -> Result<u64, StorageError> {
        let Some(account) = &self.account_id else {
            return Ok(0);
        };
        Ok(self
            .tree
            .get(account.as_bytes())?
            .map(|raw| decode_balance(&raw))
            .unwrap_or(0))
    }

    pub fn grant(&self, credits: u64) -> Result<u64, StorageError> {
        self.update(|balance| balance.saturating_add(credits))
    }

    fn update(&self, apply: impl Fn(u64) -> u64) -> Result<u64, StorageError> {
        let Some(account) = &self.account_id else {
            return Err(StorageError::Database(
                "no account configured for the credit ledger".to_string(),
            ));
        };
        let updated = self.tree.update_and_fetch(account.as_bytes(), |current| {
            let balance = current.map(decode_balance).unwrap_or(0);
            Some(apply(balance).to_be_bytes().to_vec())
        })?;
        self.tree.flush()?;
        Ok(updated.map(|raw| decode_balance(&raw)).unwrap_or(0))
    }
}

fn decode_balance(raw: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    if raw.len() == 8 {
        bytes.copy_from_slice(raw);
    }
    u64::from_be_bytes(bytes)
}

#[async_trait]
impl AdmissionController for SledCreditLedger {
    async fn authorize(&self, required_credits: u64) -> Result<(), AdmissionDenial> {
        if self.account_id.is_none() {
            return Err(AdmissionDenial::NotAuthenticated);
        }
        check_stored_balance(required_credits, self.balance())
    }

    async fn record_consumption(&self, record: &ConsumptionRecord) -> Result<(), ConsumptionError> {
        let credits = record.credits;
        self.update(|balance| balance.saturating_sub(credits))
            .map(|balance| {
                debug!(step = %record.step, credits, balance, "Recorded credit consumption");
            })
            .map_err(|err| ConsumptionError {
                step: record.step,
                reason: err.to_string(),
            })
    }
}

fn check_stored_balance(
    required: u64,
    stored: Result<u64, StorageError>,
) -> Result<(), AdmissionDenial> {
    match stored {
        Ok(available) => check_balance(required, available),
        Err(err) => {
            error!(error = %err, "Failed to read credit balance");
            Err(AdmissionDenial::Unavailable(err.to_string()))
        }
    }
}

fn check_balance(required: u64, available: u64) -> Result<(), AdmissionDenial> {
    if available < required {
        return Err(AdmissionDenial::InsufficientCredits {
            required,
            available,
        });
    }
    Ok(())
}

/// Developer mode: every request is admitted and nothing is charged.
#[derive(Debug, Default)]
pub struct BypassAdmission;

#[async_trait]
impl AdmissionController for BypassAdmission {
    async fn authorize(&self, required_credits: u64) -> Result<(), AdmissionDenial> {
        debug!(required_credits, "Admission bypassed");
        Ok(())
    }

    async fn record_consumption(&self, record: &ConsumptionRecord) -> Result<(), ConsumptionError> {
        debug!(step = %record.step, "Consumption not recorded (admission bypassed)");
        Ok(())
    }
}

/// True only when both the config flag and the environment gate are set.
pub fn bypass_enabled(config: &AdmissionConfig) -> bool {
    config.bypass
        && std::env::var(BYPASS_ENV_VAR)
            .map(|value| value.trim() == "1")
            .unwrap_or(false)
}

/// Build the admission controller the configuration asks for.
pub fn admission_from_config(
    config: &AdmissionConfig,
    db: &sled::Db,
) -> Result<Arc<dyn AdmissionController>, ApiError> {
    if bypass_enabled(config) {
        warn!(
            env = BYPASS_ENV_VAR,
            "Admission bypass is active: generations are neither authorized nor charged"
        );
        return Ok(Arc::new(BypassAdmission));
    }
    if config.bypass {
        warn!(
            env = BYPASS_ENV_VAR,
            "admission.bypass is set but the environment gate is not; using the credit ledger"
        );
    }

    let ledger = SledCreditLedger::open(db, config.account_id.clone())?;
    ledger.ensure_initial_balance(config.initial_balance)?;
    info!(
        account = config.account_id.as_deref().unwrap_or("<none>"),
        "Credit ledger ready"
    );
    Ok(Arc::new(ledger))
}
