//! Domain layer: economic entities, price brackets and market events.
//!
//! These types carry no storage concerns; the persistence layer maps them
//! to store records and the service layer transforms them.

pub mod bracket;
pub mod colony;
pub mod market_event;
pub mod money;
pub mod thing;

pub use bracket::{BracketMatch, BracketTable, PriceBracket};
pub use colony::Colony;
pub use market_event::{MarketEvent, SaleItem};
pub use thing::{BmvVotes, Thing, TradeHistory, VoteTally};
