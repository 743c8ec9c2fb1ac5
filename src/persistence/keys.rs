//! Store key layout.
//!
//! Keys are colon-separated paths. All keys are relative to the market the
//! store is scoped to.

use chrono::NaiveDate;

/// Set of every known Thing hash.
pub const THING_INDEX: &str = "Things:Index";
/// Set of languages with localized Thing names.
pub const KNOWN_LANGUAGES: &str = "Things:Locale:KnownLanguages";
/// Prefix of the per-character Thing name index.
pub const THING_NAME_INDEX_PREFIX: &str = "Things:NameIndex:";
/// List of every known Colony hash.
pub const COLONY_INDEX: &str = "Colonies:Index";
/// Prefix of the per-character Colony name index.
pub const COLONY_NAME_INDEX_PREFIX: &str = "Colonies:NameIndex:";
/// Hash holding the market's runtime settings.
pub const SETTINGS: &str = "MarketKeeper:Settings";
/// Set of Things currently on sale.
pub const ON_SALE_NOW: &str = "MarketKeeper:Sale:OnSaleNow";
/// Sorted set of Things in sale cool-down, scored by cool-down expiry.
pub const RECENTLY_ON_SALE: &str = "MarketKeeper:Sale:RecentlyOnSale";
/// Run-lock flag read by the game API.
pub const MAINTENANCE_MODE: &str = "API:MaintenanceMode";
/// Published maintenance window (`Start`/`Stop` epochs).
pub const MAINTENANCE_WINDOW: &str = "API:MaintenanceWindow";
/// List of JSON market events awaiting delivery.
pub const EVENT_OUTBOX: &str = "Events:Outbox";

/// Thing metadata hash.
#[must_use]
pub fn thing_metadata(hash: &str) -> String {
    format!("Things:Metadata:{hash}")
}

/// Thing base market value votes.
#[must_use]
pub fn thing_votes(hash: &str) -> String {
    format!("Things:BMVVotes:{hash}")
}

/// Thing trade counters for one day.
#[must_use]
pub fn thing_trade_history(date: NaiveDate, hash: &str) -> String {
    format!("Things:TradeHistory:{}:{hash}", date.format("%Y-%m-%d"))
}

/// Proposed localized names of a Thing.
#[must_use]
pub fn thing_name_proposals(language: &str, hash: &str) -> String {
    format!("Things:Locale:{language}:Proposals:{hash}")
}

/// Canonical localized name of a Thing.
#[must_use]
pub fn thing_localized_name(language: &str, hash: &str) -> String {
    format!("Things:Locale:{language}:Name:{hash}")
}

/// Colony metadata hash.
#[must_use]
pub fn colony_metadata(hash: &str) -> String {
    format!("Colonies:Metadata:{hash}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_history_key_embeds_iso_date() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7);
        assert_eq!(
            date.map(|d| thing_trade_history(d, "abc")),
            Some("Things:TradeHistory:2026-03-07:abc".to_string())
        );
    }
}
