//! Risk engine orchestrator
//!
//! Owns the quote, asset-pair and trading-condition caches plus the FPL,
//! account-state and swap services built on them. Collaborators are wired
//! once in the constructor and shared through `Arc`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use types::account::Account;
use types::errors::{QuoteError, TradingError};
use types::ids::AccountId;
use types::order::{Order, RejectReason};
use types::quote::BestPrice;

use crate::account_state::AccountStateCache;
use crate::assets::{AssetPairsCache, TradingConditionsCache};
use crate::events::RiskEvent;
use crate::fpl::FplService;
use crate::margin;
use crate::quotes::QuoteCache;
use crate::swap::{SwapCommissionService, SwapSettings};

/// Risk engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskEngineConfig {
    pub swap: SwapSettings,
}

/// Risk engine service
pub struct RiskEngine {
    quotes: Arc<QuoteCache>,
    asset_pairs: Arc<AssetPairsCache>,
    trading_conditions: Arc<TradingConditionsCache>,
    fpl: Arc<FplService>,
    accounts: Arc<AccountStateCache>,
    swaps: Arc<SwapCommissionService>,
}

impl RiskEngine {
    pub fn new(config: RiskEngineConfig) -> Self {
        let quotes = Arc::new(QuoteCache::new());
        let asset_pairs = Arc::new(AssetPairsCache::new());
        let trading_conditions = Arc::new(TradingConditionsCache::new());
        let fpl = Arc::new(FplService::new(
            Arc::clone(&quotes),
            Arc::clone(&asset_pairs),
            Arc::clone(&trading_conditions),
        ));
        let accounts = Arc::new(AccountStateCache::new(Arc::clone(&fpl), Arc::clone(&trading_conditions)));
        let swaps = Arc::new(SwapCommissionService::new(
            config.swap,
            Arc::clone(&fpl),
            Arc::clone(&trading_conditions),
        ));

        info!(cutoff_hour = swaps.settings().cutoff_hour, "Risk engine created");
        Self {
            quotes,
            asset_pairs,
            trading_conditions,
            fpl,
            accounts,
            swaps,
        }
    }

    pub fn quotes(&self) -> &Arc<QuoteCache> {
        &self.quotes
    }

    pub fn asset_pairs(&self) -> &Arc<AssetPairsCache> {
        &self.asset_pairs
    }

    pub fn trading_conditions(&self) -> &Arc<TradingConditionsCache> {
        &self.trading_conditions
    }

    pub fn fpl(&self) -> &Arc<FplService> {
        &self.fpl
    }

    pub fn accounts(&self) -> &Arc<AccountStateCache> {
        &self.accounts
    }

    pub fn swaps(&self) -> &Arc<SwapCommissionService> {
        &self.swaps
    }

    /// Store a quote and invalidate every account holding its instrument.
    ///
    /// Returns the invalidated accounts.
    pub fn set_quote(&self, quote: BestPrice) -> Result<Vec<AccountId>, QuoteError> {
        let instrument = quote.instrument.clone();
        self.quotes.set_quote(quote)?;
        let affected = self.accounts.on_quote(&instrument);
        debug!(instrument = %instrument, accounts = affected.len(), "Quote applied");
        Ok(affected)
    }

    /// Post-match check of a freshly filled order against its account; the
    /// position is held by the account only when no reason comes back.
    pub fn open_position(&self, order: &mut Order) -> Result<Option<RejectReason>, TradingError> {
        self.accounts.open_position(order)
    }

    /// Pre-trade check for a pending order: its initial margin at the
    /// expected price must fit the available margin.
    pub fn check_pending_order(&self, order: &Order) -> Result<Option<RejectReason>, TradingError> {
        let required = self.fpl.margin_init_for(order)?;
        let account = self.accounts.state(&order.account_id)?;
        Ok(margin::check_margin_available(&account, required))
    }

    pub fn account_state(&self, account_id: &AccountId) -> Result<Account, TradingError> {
        self.accounts.state(account_id)
    }

    pub fn evaluate_account(
        &self,
        account_id: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<(Account, Option<RiskEvent>), TradingError> {
        self.accounts.evaluate(account_id, now)
    }
}

impl Default for RiskEngine {
    fn default() -> Self {
        Self::new(RiskEngineConfig::default())
    }
}
