//! Wire-boundary message types for the feed adapter
//!
//! The exchange sends prices and sizes as textual decimal strings; parsing
//! to `Decimal` happens here, once, on ingestion. Parsing is tolerant at
//! the entry level: a malformed price or size skips that single entry,
//! never the whole message.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::order_book::PriceLevel;

/// A full order book replacement at a point-in-time sequence cursor.
///
/// Levels with size 0 in a snapshot simply mean "not present" — a snapshot
/// carries no delete semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    /// Bid levels as (price, size) decimal strings.
    pub bids: Vec<(String, String)>,
    /// Ask levels as (price, size) decimal strings.
    pub asks: Vec<(String, String)>,
    /// Sequence cursor this snapshot is current through.
    pub last_update_id: u64,
}

/// A sparse differential update to the book, tagged with a sequence range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookUpdate {
    /// Changed bid levels; size "0" deletes the level at that price.
    pub bids: Vec<(String, String)>,
    /// Changed ask levels; size "0" deletes the level at that price.
    pub asks: Vec<(String, String)>,
    /// Last sequence id covered by this update.
    pub last_update_id: u64,
    /// First sequence id covered by this update, when the feed provides it.
    pub first_update_id: Option<u64>,
}

/// A single trade print from the live feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Execution price.
    pub price: Decimal,
    /// Traded quantity.
    pub quantity: Decimal,
    /// Execution timestamp in Unix milliseconds.
    pub timestamp_ms: i64,
    /// Whether the taker was the seller.
    pub taker_is_sell: bool,
    /// Exchange-assigned trade identifier.
    pub trade_id: u64,
}

/// Parse one (price, size) pair, or `None` if either field is malformed.
fn parse_level(price: &str, size: &str) -> Option<PriceLevel> {
    let price = match Decimal::from_str_exact(price) {
        Ok(p) => p,
        Err(_) => {
            debug!(price, "Skipping level with unparseable price");
            return None;
        }
    };
    let size = match Decimal::from_str_exact(size) {
        Ok(s) => s,
        Err(_) => {
            debug!(size, "Skipping level with unparseable size");
            return None;
        }
    };
    Some(PriceLevel { price, size })
}

/// Parse snapshot levels: malformed entries are skipped, and entries with
/// a non-positive size are dropped (absent, not deleted).
pub fn parse_levels(raw: &[(String, String)]) -> Vec<PriceLevel> {
    raw.iter()
        .filter_map(|(price, size)| parse_level(price, size))
        .filter(|level| level.size > Decimal::ZERO)
        .collect()
}

/// Parse update levels: malformed entries are skipped, but zero sizes
/// survive — in a diff, size 0 is the delete sentinel.
pub fn parse_levels_with_zeros(raw: &[(String, String)]) -> Vec<PriceLevel> {
    raw.iter()
        .filter_map(|(price, size)| parse_level(price, size))
        .collect()
}
