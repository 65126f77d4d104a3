//! Token budget guard
//!
//! Keeps a running ledger of billed chat usage and decides whether free chat
//! may still be used this period. Reads fail open: an unreadable ledger counts
//! as zero usage for that read only, and is never written back.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::BudgetConfig;
use crate::storage::{keys, MemoryStore};

/// Share of the monthly budget at which free chat is refused
pub const DENY_RATIO: f64 = 0.95;

/// Cumulative usage of the billed chat capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUsageLedger {
    pub total_tokens: u64,
    pub total_requests: u64,
    /// USD spent so far
    pub total_cost: f64,
    pub daily_limit: u64,
    pub monthly_budget: f64,
    /// Fixed at creation; never rolled forward
    pub reset_date: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl TokenUsageLedger {
    pub fn new(config: &BudgetConfig, now: DateTime<Utc>) -> Self {
        Self {
            total_tokens: 0,
            total_requests: 0,
            total_cost: 0.0,
            daily_limit: config.daily_limit,
            monthly_budget: config.monthly_budget,
            reset_date: now + Duration::days(config.reset_after_days),
            last_updated: now,
        }
    }

    /// Add one billed request
    pub fn record(&mut self, tokens_used: u64, cost_per_1k_tokens: f64, now: DateTime<Utc>) {
        self.total_tokens += tokens_used;
        self.total_requests += 1;
        self.total_cost += cost_for(tokens_used, cost_per_1k_tokens);
        self.last_updated = now;
    }

    fn ratio_used(&self) -> f64 {
        if self.monthly_budget > 0.0 {
            self.total_cost / self.monthly_budget
        } else {
            1.0
        }
    }

    /// Spend as a percentage of the monthly budget
    pub fn percentage_used(&self) -> f64 {
        self.ratio_used() * 100.0
    }

    /// Threshold alert for the current spend, if any
    pub fn alert(&self) -> Option<BudgetAlert> {
        let percentage = self.percentage_used();
        let (level, message) = if percentage >= 90.0 {
            (
                AlertLevel::Danger,
                format!(
                    "Ha consumido el {:.0}% del presupuesto mensual. El chat libre se bloqueará al 95%.",
                    percentage
                ),
            )
        } else if percentage >= 80.0 {
            (
                AlertLevel::Warning,
                format!("Ha consumido el {:.0}% del presupuesto mensual.", percentage),
            )
        } else if percentage >= 50.0 {
            (
                AlertLevel::Info,
                format!("Ha usado la mitad del presupuesto mensual ({:.0}%).", percentage),
            )
        } else {
            return None;
        };

        Some(BudgetAlert {
            level,
            message,
            percentage,
        })
    }

    /// Whether a billed request may be made now
    pub fn permit(&self) -> UsagePermit {
        if self.ratio_used() >= DENY_RATIO {
            UsagePermit {
                allowed: false,
                reason: Some(format!(
                    "Límite de presupuesto alcanzado ({:.1}% de {:.2} USD)",
                    self.percentage_used(),
                    self.monthly_budget
                )),
            }
        } else {
            UsagePermit {
                allowed: true,
                reason: None,
            }
        }
    }

    /// Whole days left until the reset date. Goes negative once it has passed.
    pub fn days_until_reset(&self, now: DateTime<Utc>) -> i64 {
        (self.reset_date - now).num_days()
    }
}

/// Cost in USD of a request that used `tokens` tokens
pub fn cost_for(tokens: u64, cost_per_1k_tokens: f64) -> f64 {
    tokens as f64 / 1000.0 * cost_per_1k_tokens
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAlert {
    pub level: AlertLevel,
    pub message: String,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsagePermit {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Persistent guard over the [`TokenUsageLedger`]
pub struct TokenBudget {
    store: MemoryStore,
    config: BudgetConfig,
    /// Serializes seeding and load-add-save cycles
    writes: Mutex<()>,
}

impl TokenBudget {
    pub fn new(store: MemoryStore, config: BudgetConfig) -> Self {
        Self {
            store,
            config,
            writes: Mutex::new(()),
        }
    }

    /// Current ledger, created (and persisted) on first read
    pub async fn ledger(&self) -> TokenUsageLedger {
        match self.store.read(keys::TOKEN_USAGE).await {
            Ok(Some(ledger)) => ledger,
            Ok(None) => {
                let _guard = self.writes.lock().await;
                self.load_or_seed().await.unwrap_or_else(|| self.fresh())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token ledger unreadable, assuming no usage");
                self.fresh()
            }
        }
    }

    pub async fn record_usage(&self, tokens_used: u64) -> TokenUsageLedger {
        let _guard = self.writes.lock().await;
        let Some(mut ledger) = self.load_or_seed().await else {
            let mut ledger = self.fresh();
            ledger.record(tokens_used, self.config.cost_per_1k_tokens, Utc::now());
            tracing::warn!(tokens_used, "Token ledger unreadable, usage not recorded");
            return ledger;
        };

        ledger.record(tokens_used, self.config.cost_per_1k_tokens, Utc::now());
        self.persist(&ledger).await;

        tracing::debug!(
            tokens_used,
            total_tokens = ledger.total_tokens,
            total_cost = ledger.total_cost,
            "Recorded token usage"
        );
        ledger
    }

    pub async fn check_limits(&self) -> Option<BudgetAlert> {
        self.ledger().await.alert()
    }

    pub async fn can_use_tokens(&self) -> UsagePermit {
        self.ledger().await.permit()
    }

    /// Start a fresh ledger. Only used by an explicit memory wipe.
    pub async fn reset_usage(&self) -> TokenUsageLedger {
        let _guard = self.writes.lock().await;
        let ledger = self.fresh();
        self.persist(&ledger).await;
        ledger
    }

    fn fresh(&self) -> TokenUsageLedger {
        TokenUsageLedger::new(&self.config, Utc::now())
    }

    /// Stored ledger, seeding it when absent. `None` when the store could not
    /// be read. Callers hold `writes`.
    async fn load_or_seed(&self) -> Option<TokenUsageLedger> {
        match self.store.read(keys::TOKEN_USAGE).await {
            Ok(Some(ledger)) => Some(ledger),
            Ok(None) => {
                let ledger = self.fresh();
                self.persist(&ledger).await;
                Some(ledger)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token ledger unreadable");
                None
            }
        }
    }

    async fn persist(&self, ledger: &TokenUsageLedger) {
        if let Err(e) = self.store.save(keys::TOKEN_USAGE, ledger).await {
            tracing::warn!(error = %e, "Failed to persist token ledger");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::FlakyStore;
    use std::sync::Arc;

    fn ledger_with_cost(total_cost: f64) -> TokenUsageLedger {
        let mut ledger = TokenUsageLedger::new(&BudgetConfig::default(), Utc::now());
        ledger.total_cost = total_cost;
        ledger
    }

    #[test]
    fn test_cost_is_proportional() {
        assert!((cost_for(1000, 0.002) - 0.002).abs() < 1e-12);
        assert!((cost_for(250, 0.002) - 0.0005).abs() < 1e-12);
        assert_eq!(cost_for(0, 0.002), 0.0);
    }

    #[test]
    fn test_alert_thresholds() {
        // Default monthly budget is 10 USD
        assert!(ledger_with_cost(4.99).alert().is_none());
        assert_eq!(ledger_with_cost(5.0).alert().unwrap().level, AlertLevel::Info);
        assert_eq!(ledger_with_cost(8.0).alert().unwrap().level, AlertLevel::Warning);
        assert_eq!(ledger_with_cost(9.0).alert().unwrap().level, AlertLevel::Danger);

        let alert = ledger_with_cost(8.5).alert().unwrap();
        assert!((alert.percentage - 85.0).abs() < 1e-9);
    }

    #[test]
    fn test_alert_repeats_without_hysteresis() {
        let ledger = ledger_with_cost(9.2);
        assert_eq!(ledger.alert(), ledger.alert());
    }

    #[test]
    fn test_permit_boundary() {
        assert!(ledger_with_cost(9.49).permit().allowed);

        let denied = ledger_with_cost(9.5).permit();
        assert!(!denied.allowed);
        assert!(denied.reason.is_some());

        assert!(!ledger_with_cost(12.0).permit().allowed);
    }

    #[test]
    fn test_reset_date_is_fixed_and_can_go_negative() {
        let created = Utc::now();
        let ledger = TokenUsageLedger::new(&BudgetConfig::default(), created);
        assert_eq!(ledger.reset_date, created + Duration::days(12));
        assert_eq!(ledger.days_until_reset(created + Duration::days(2)), 10);
        assert_eq!(ledger.days_until_reset(created + Duration::days(20)), -8);
    }

    #[tokio::test]
    async fn test_record_usage_is_additive() {
        let budget = TokenBudget::new(MemoryStore::in_memory(), BudgetConfig::default());

        budget.record_usage(1200).await;
        let ledger = budget.record_usage(800).await;

        assert_eq!(ledger.total_tokens, 2000);
        assert_eq!(ledger.total_requests, 2);
        let expected = cost_for(1200, 0.002) + cost_for(800, 0.002);
        assert!((ledger.total_cost - expected).abs() < 1e-12);

        // Persisted
        assert_eq!(budget.ledger().await, ledger);
    }

    #[tokio::test]
    async fn test_reset_date_survives_reloads() {
        let budget = TokenBudget::new(MemoryStore::in_memory(), BudgetConfig::default());
        let first = budget.ledger().await;
        budget.record_usage(10).await;
        let later = budget.ledger().await;
        assert_eq!(first.reset_date, later.reset_date);
    }

    #[tokio::test]
    async fn test_can_use_tokens_denies_near_budget() {
        let config = BudgetConfig {
            monthly_budget: 1.0,
            cost_per_1k_tokens: 1.0,
            ..BudgetConfig::default()
        };
        let budget = TokenBudget::new(MemoryStore::in_memory(), config);

        budget.record_usage(900).await;
        assert!(budget.can_use_tokens().await.allowed);
        assert_eq!(
            budget.check_limits().await.map(|a| a.level),
            Some(AlertLevel::Danger)
        );

        budget.record_usage(60).await;
        assert!(!budget.can_use_tokens().await.allowed);
    }

    #[tokio::test]
    async fn test_reset_usage_clears_totals() {
        let budget = TokenBudget::new(MemoryStore::in_memory(), BudgetConfig::default());
        budget.record_usage(5000).await;
        let fresh = budget.reset_usage().await;
        assert_eq!(fresh.total_tokens, 0);
        assert_eq!(budget.ledger().await.total_tokens, 0);
    }

    #[tokio::test]
    async fn test_failed_read_does_not_reset_ledger() {
        let backend = Arc::new(FlakyStore::new());
        let budget = TokenBudget::new(MemoryStore::new(backend.clone()), BudgetConfig::default());

        let before = budget.record_usage(4_800_000).await;

        backend.fail_reads(1);
        // Fails open for this read only
        assert!(budget.check_limits().await.is_none());

        let after = budget.ledger().await;
        assert_eq!(after.total_tokens, before.total_tokens);
        assert_eq!(after.reset_date, before.reset_date);
        assert!(!budget.can_use_tokens().await.allowed);
    }

    #[tokio::test]
    async fn test_failed_read_skips_recording() {
        let backend = Arc::new(FlakyStore::new());
        let budget = TokenBudget::new(MemoryStore::new(backend.clone()), BudgetConfig::default());
        budget.record_usage(1000).await;

        backend.fail_reads(1);
        budget.record_usage(500).await;

        let ledger = budget.ledger().await;
        assert_eq!(ledger.total_tokens, 1000);
        assert_eq!(ledger.total_requests, 1);
    }

    #[tokio::test]
    async fn test_concurrent_usage_is_not_lost() {
        let store = MemoryStore::new(Arc::new(FlakyStore::new()));
        let budget = Arc::new(TokenBudget::new(store, BudgetConfig::default()));

        let tasks: Vec<_> = [100, 200, 300]
            .into_iter()
            .map(|tokens| {
                let budget = budget.clone();
                tokio::spawn(async move { budget.record_usage(tokens).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let ledger = budget.ledger().await;
        assert_eq!(ledger.total_tokens, 600);
        assert_eq!(ledger.total_requests, 3);
    }
}
