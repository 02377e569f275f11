//! Instrument metadata and trading-condition settings

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::info;
use types::errors::AssetPairError;
use types::ids::InstrumentId;
use types::instrument::{AccountAssetPair, AccountGroup, AssetPair};

/// Known asset pairs, keyed by instrument
#[derive(Debug, Default)]
pub struct AssetPairsCache {
    pairs: RwLock<HashMap<InstrumentId, AssetPair>>,
}

impl AssetPairsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&self, pairs: Vec<AssetPair>) {
        let mut guard = self.pairs.write();
        guard.clear();
        guard.extend(pairs.into_iter().map(|pair| (pair.id.clone(), pair)));
        info!(pairs = guard.len(), "Asset pairs initialised");
    }

    pub fn add_or_replace(&self, pair: AssetPair) {
        self.pairs.write().insert(pair.id.clone(), pair);
    }

    pub fn get(&self, instrument: &InstrumentId) -> Result<AssetPair, AssetPairError> {
        self.pairs
            .read()
            .get(instrument)
            .cloned()
            .ok_or_else(|| AssetPairError::NotFound {
                instrument: instrument.to_string(),
            })
    }

    /// A pair made of `asset1` and `asset2`, in either orientation.
    ///
    /// Lookups are deterministic: the lowest instrument id wins when
    /// several pairs qualify.
    pub fn find_pair(&self, asset1: &str, asset2: &str) -> Result<AssetPair, AssetPairError> {
        self.pairs
            .read()
            .values()
            .filter(|pair| {
                (pair.base_asset_id == asset1 && pair.quote_asset_id == asset2)
                    || (pair.base_asset_id == asset2 && pair.quote_asset_id == asset1)
            })
            .min_by(|a, b| a.id.cmp(&b.id))
            .cloned()
            .ok_or_else(|| AssetPairError::CrossPairNotFound {
                asset1: asset1.to_string(),
                asset2: asset2.to_string(),
            })
    }
}

type AccountAssetKey = (String, String, InstrumentId);
type AccountGroupKey = (String, String);

/// Per trading condition: instrument settings and account margin thresholds
#[derive(Debug, Default)]
pub struct TradingConditionsCache {
    account_assets: RwLock<HashMap<AccountAssetKey, AccountAssetPair>>,
    account_groups: RwLock<HashMap<AccountGroupKey, AccountGroup>>,
}

impl TradingConditionsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&self, account_assets: Vec<AccountAssetPair>, account_groups: Vec<AccountGroup>) {
        {
            let mut assets = self.account_assets.write();
            assets.clear();
            for entry in account_assets {
                assets.insert(Self::asset_key(&entry), entry);
            }
        }
        let mut groups = self.account_groups.write();
        groups.clear();
        for group in account_groups {
            groups.insert((group.trading_condition_id.clone(), group.base_asset_id.clone()), group);
        }
        info!(groups = groups.len(), "Trading conditions initialised");
    }

    pub fn set_account_asset(&self, entry: AccountAssetPair) {
        self.account_assets.write().insert(Self::asset_key(&entry), entry);
    }

    pub fn set_account_group(&self, group: AccountGroup) {
        self.account_groups
            .write()
            .insert((group.trading_condition_id.clone(), group.base_asset_id.clone()), group);
    }

    pub fn get_account_asset(
        &self,
        trading_condition_id: &str,
        base_asset_id: &str,
        instrument: &InstrumentId,
    ) -> Result<AccountAssetPair, AssetPairError> {
        let key = (
            trading_condition_id.to_string(),
            base_asset_id.to_string(),
            instrument.clone(),
        );
        self.account_assets
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| AssetPairError::AccountAssetNotFound {
                trading_condition_id: trading_condition_id.to_string(),
                base_asset_id: base_asset_id.to_string(),
                instrument: instrument.to_string(),
            })
    }

    pub fn get_account_group(
        &self,
        trading_condition_id: &str,
        base_asset_id: &str,
    ) -> Result<AccountGroup, AssetPairError> {
        self.account_groups
            .read()
            .get(&(trading_condition_id.to_string(), base_asset_id.to_string()))
            .cloned()
            .ok_or_else(|| AssetPairError::AccountGroupNotFound {
                trading_condition_id: trading_condition_id.to_string(),
                base_asset_id: base_asset_id.to_string(),
            })
    }

    fn asset_key(entry: &AccountAssetPair) -> AccountAssetKey {
        (
            entry.trading_condition_id.clone(),
            entry.base_asset_id.clone(),
            entry.instrument.clone(),
        )
    }
}
