//! Risk event definitions
//!
//! Emitted when an account's margin level worsens to margin call or
//! stop-out.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::account::{Account, AccountLevel};
use types::ids::{AccountId, ClientId};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvent {
    pub event_id: Uuid,
    pub account_id: AccountId,
    pub client_id: ClientId,
    pub event_type: RiskEventType,
    pub margin_usage_level: Decimal,
    pub total_capital: Decimal,
    pub used_margin: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskEventType {
    /// Usage reached the margin-call threshold
    MarginCall,
    /// Usage reached the stop-out threshold; positions must be closed
    StopOut,
}

impl RiskEvent {
    pub fn new(account: &Account, event_type: RiskEventType, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            account_id: account.id,
            client_id: account.client_id.clone(),
            event_type,
            margin_usage_level: account.margin_usage_level(),
            total_capital: account.total_capital(),
            used_margin: account.fpl_state.used_margin,
            timestamp,
        }
    }
}

/// Event for a level transition, if the new level warrants one.
///
/// Staying at the same level emits nothing; improving emits nothing.
pub fn event_for_transition(
    account: &Account,
    previous: AccountLevel,
    current: AccountLevel,
    timestamp: DateTime<Utc>,
) -> Option<RiskEvent> {
    match (previous, current) {
        (AccountLevel::StopOut, AccountLevel::StopOut) => None,
        (_, AccountLevel::StopOut) => Some(RiskEvent::new(account, RiskEventType::StopOut, timestamp)),
        (AccountLevel::None, AccountLevel::MarginCall) => {
            Some(RiskEvent::new(account, RiskEventType::MarginCall, timestamp))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account() -> Account {
        Account::new(ClientId::from("c1"), "tc1", "USD", dec!(100))
    }

    #[test]
    fn test_margin_call_on_worsening() {
        let event = event_for_transition(&account(), AccountLevel::None, AccountLevel::MarginCall, Utc::now());
        assert_eq!(event.unwrap().event_type, RiskEventType::MarginCall);
    }

    #[test]
    fn test_stop_out_from_any_level() {
        for previous in [AccountLevel::None, AccountLevel::MarginCall] {
            let event = event_for_transition(&account(), previous, AccountLevel::StopOut, Utc::now());
            assert_eq!(event.unwrap().event_type, RiskEventType::StopOut);
        }
    }

    #[test]
    fn test_no_event_when_unchanged_or_improving() {
        let acc = account();
        assert!(event_for_transition(&acc, AccountLevel::MarginCall, AccountLevel::MarginCall, Utc::now()).is_none());
        assert!(event_for_transition(&acc, AccountLevel::StopOut, AccountLevel::StopOut, Utc::now()).is_none());
        assert!(event_for_transition(&acc, AccountLevel::StopOut, AccountLevel::MarginCall, Utc::now()).is_none());
        assert!(event_for_transition(&acc, AccountLevel::MarginCall, AccountLevel::None, Utc::now()).is_none());
    }

    #[test]
    fn test_event_serialization() {
        let event = RiskEvent::new(&account(), RiskEventType::StopOut, Utc::now());
        let json = serde_json::to_string(&event).unwrap();
        let restored: RiskEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, restored);
    }
}
