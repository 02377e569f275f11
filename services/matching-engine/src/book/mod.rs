//! Order book infrastructure module
//!
//! Price levels, bid/ask ladders, the per-instrument order book and the
//! per-engine collection of books.

pub mod price_level;
pub mod bid_book;
pub mod ask_book;
pub mod order_book;
pub mod collection;

pub use price_level::PriceLevel;
pub use bid_book::BidBook;
pub use ask_book::AskBook;
pub use order_book::OrderBook;
pub use collection::{OrderBookCollection, SetOrdersModel};
