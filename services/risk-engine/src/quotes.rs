//! Latest best bid/ask per instrument
//!
//! Fed by the quote stream and by the matching engines' own top-of-book
//! updates. Readers always see a whole quote, never a half-written one.

use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::{trace, warn};
use types::errors::QuoteError;
use types::ids::InstrumentId;
use types::order::Side;
use types::quote::BestPrice;

#[derive(Debug, Default)]
pub struct QuoteCache {
    quotes: DashMap<InstrumentId, BestPrice>,
}

impl QuoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a quote; quotes with a non-positive side are refused
    pub fn set_quote(&self, quote: BestPrice) -> Result<(), QuoteError> {
        if quote.bid <= Decimal::ZERO || quote.ask <= Decimal::ZERO {
            warn!(instrument = %quote.instrument, bid = %quote.bid, ask = %quote.ask, "Quote refused");
            return Err(QuoteError::InvalidPrice {
                instrument: quote.instrument.to_string(),
            });
        }
        trace!(instrument = %quote.instrument, bid = %quote.bid, ask = %quote.ask, "Quote stored");
        self.quotes.insert(quote.instrument.clone(), quote);
        Ok(())
    }

    pub fn get_quote(&self, instrument: &InstrumentId) -> Result<BestPrice, QuoteError> {
        self.quotes
            .get(instrument)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| QuoteError::NotFound {
                instrument: instrument.to_string(),
            })
    }

    /// Price for exposure on `side`: ask for buys, bid for sells
    pub fn best_price(&self, instrument: &InstrumentId, side: Side) -> Result<Decimal, QuoteError> {
        Ok(self.get_quote(instrument)?.price_for(side))
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}
