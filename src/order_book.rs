//! Reconciled order book state for a single symbol
//!
//! Maintains a mirrored two-sided ladder from feed snapshots and diffs.
//! Uses `BTreeMap` for deterministic sorted iteration; all arithmetic
//! uses `Decimal`.
//!
//! The engine processes:
//! - `BookSnapshot` → wholesale replacement of both sides
//! - `BookUpdate` → sparse merge, guarded by staleness and sequence-gap
//!   checks; a gapped update is rejected wholesale, never partially applied
//!
//! After every applied event the exposed `BookView` is rebuilt from
//! scratch (sort, spread, mid, VWAP) — no incremental metric maintenance.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::events::{parse_levels, parse_levels_with_zeros, BookSnapshot, BookUpdate};

/// Number of levels per side included in the VWAP window. Deeper
/// liquidity is excluded as low-signal.
const VWAP_DEPTH: usize = 20;

/// A single price level on one side of the book.
///
/// A size of 0 is a wire-level delete sentinel and is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// The price of this level — unique key within one side.
    pub price: Decimal,
    /// Resting quantity at this level.
    pub size: Decimal,
}

/// Immutable snapshot of the reconciled book exposed to readers.
///
/// Bids are in descending price order, asks ascending (best first on both
/// sides). Spread, mid and VWAP degrade to 0 when either side is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookView {
    /// Bid levels in descending price order.
    pub bids: Vec<PriceLevel>,
    /// Ask levels in ascending price order.
    pub asks: Vec<PriceLevel>,
    /// Sequence cursor the book is current through.
    pub last_update_id: u64,
    /// Best ask minus best bid.
    pub spread: Decimal,
    /// Midpoint of best bid and best ask.
    pub mid_price: Decimal,
    /// Volume-weighted average price over the top levels of each side,
    /// averaged across sides.
    pub vwap: Decimal,
}

impl BookView {
    fn empty() -> Self {
        Self {
            bids: Vec::new(),
            asks: Vec::new(),
            last_update_id: 0,
            spread: Decimal::ZERO,
            mid_price: Decimal::ZERO,
            vwap: Decimal::ZERO,
        }
    }

    /// Best bid level, if any.
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    /// Best ask level, if any.
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }
}

/// Outcome of applying a differential update.
///
/// Gap and stale are expected feed conditions, not faults: the caller
/// reacts to `Gap` by fetching a fresh snapshot out-of-band, and drops
/// `Stale` on the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Update merged; the view was rebuilt.
    Applied,
    /// Duplicate or out-of-order replay; state unchanged.
    Stale,
    /// Sequence discontinuity; state unchanged, resync required.
    Gap { expected: u64, actual: u64 },
}

/// Reconciled order book for a single symbol.
///
/// Single-writer: exactly one logical event stream drives an instance,
/// applied strictly in arrival order. Queries read the last fully
/// materialized view.
#[derive(Debug, Clone)]
pub struct OrderBookEngine {
    /// Bid levels: price → size (BTreeMap sorts ascending, reversed for
    /// best-bid-first reads).
    bids: BTreeMap<Decimal, Decimal>,
    /// Ask levels: price → size (ascending = best ask first).
    asks: BTreeMap<Decimal, Decimal>,
    /// Last applied sequence cursor.
    last_update_id: u64,
    /// Materialized view, rebuilt wholesale on every applied event.
    view: BookView,
    /// Total updates merged.
    updates_applied: u64,
    /// Total stale updates dropped.
    updates_stale: u64,
    /// Total gaps detected.
    gaps_detected: u64,
}

impl OrderBookEngine {
    /// Create an empty book.
    pub fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update_id: 0,
            view: BookView::empty(),
            updates_applied: 0,
            updates_stale: 0,
            gaps_detected: 0,
        }
    }

    /// Replace the entire book from a snapshot.
    ///
    /// Zero-size levels are discarded during parse. Always succeeds; no
    /// prior state is required.
    pub fn apply_snapshot(&mut self, snapshot: &BookSnapshot) -> &BookView {
        self.bids = parse_levels(&snapshot.bids)
            .into_iter()
            .map(|level| (level.price, level.size))
            .collect();
        self.asks = parse_levels(&snapshot.asks)
            .into_iter()
            .map(|level| (level.price, level.size))
            .collect();
        self.last_update_id = snapshot.last_update_id;

        self.rebuild_view();
        &self.view
    }

    /// Merge a differential update into the book.
    ///
    /// Staleness is checked first: re-applying an already-covered update
    /// is a silent drop, not a gap. A genuine sequence gap rejects the
    /// update wholesale and leaves the view untouched.
    pub fn apply_update(&mut self, update: &BookUpdate) -> ApplyOutcome {
        if update.last_update_id <= self.last_update_id {
            debug!(
                last_update_id = self.last_update_id,
                update_id = update.last_update_id,
                "Dropping stale book update"
            );
            self.updates_stale += 1;
            return ApplyOutcome::Stale;
        }

        if let Some(first) = update.first_update_id {
            let expected = self.last_update_id + 1;
            if first != expected {
                warn!(
                    expected,
                    actual = first,
                    "Sequence gap detected — resync required"
                );
                self.gaps_detected += 1;
                return ApplyOutcome::Gap {
                    expected,
                    actual: first,
                };
            }
        }

        merge_side(&mut self.bids, &parse_levels_with_zeros(&update.bids));
        merge_side(&mut self.asks, &parse_levels_with_zeros(&update.asks));
        self.last_update_id = update.last_update_id;
        self.updates_applied += 1;

        self.rebuild_view();
        ApplyOutcome::Applied
    }

    /// The latest materialized view. Pure read.
    pub fn view(&self) -> &BookView {
        &self.view
    }

    /// Last applied sequence cursor.
    pub fn last_update_id(&self) -> u64 {
        self.last_update_id
    }

    /// Number of bid price levels.
    pub fn bid_depth(&self) -> usize {
        self.bids.len()
    }

    /// Number of ask price levels.
    pub fn ask_depth(&self) -> usize {
        self.asks.len()
    }

    /// Total updates merged since creation.
    pub fn updates_applied(&self) -> u64 {
        self.updates_applied
    }

    /// Total stale updates dropped since creation.
    pub fn updates_stale(&self) -> u64 {
        self.updates_stale
    }

    /// Total gaps detected since creation.
    pub fn gaps_detected(&self) -> u64 {
        self.gaps_detected
    }

    /// Rebuild the exposed view from the level maps.
    ///
    /// The new view is constructed fully before publication so readers
    /// never observe a partially updated book.
    fn rebuild_view(&mut self) {
        // Best bid = highest price (last in BTreeMap), hence .rev()
        let bids: Vec<PriceLevel> = self
            .bids
            .iter()
            .rev()
            .map(|(&price, &size)| PriceLevel { price, size })
            .collect();

        let asks: Vec<PriceLevel> = self
            .asks
            .iter()
            .map(|(&price, &size)| PriceLevel { price, size })
            .collect();

        let (spread, mid_price, vwap) = derive_metrics(&bids, &asks);

        self.view = BookView {
            bids,
            asks,
            last_update_id: self.last_update_id,
            spread,
            mid_price,
            vwap,
        };
    }
}

impl Default for OrderBookEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply a sparse diff to one side: non-positive size deletes the level,
/// positive size inserts or overwrites. Unlisted prices are untouched.
fn merge_side(side: &mut BTreeMap<Decimal, Decimal>, updates: &[PriceLevel]) {
    for level in updates {
        if level.size <= Decimal::ZERO {
            side.remove(&level.price);
        } else {
            side.insert(level.price, level.size);
        }
    }
}

/// Compute spread, mid and VWAP from already-sorted sides.
///
/// All three degrade to 0 when either side is empty — never divide by
/// zero or index an empty side.
fn derive_metrics(bids: &[PriceLevel], asks: &[PriceLevel]) -> (Decimal, Decimal, Decimal) {
    let (best_bid, best_ask) = match (bids.first(), asks.first()) {
        (Some(bid), Some(ask)) => (bid.price, ask.price),
        _ => return (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
    };

    let spread = best_ask - best_bid;
    let mid_price = (best_bid + best_ask) / Decimal::from(2);
    let vwap = (side_vwap(bids) + side_vwap(asks)) / Decimal::from(2);

    (spread, mid_price, vwap)
}

/// VWAP over the top `VWAP_DEPTH` levels of one side, 0 if no volume.
fn side_vwap(levels: &[PriceLevel]) -> Decimal {
    let top = &levels[..levels.len().min(VWAP_DEPTH)];

    let total_volume: Decimal = top.iter().map(|level| level.size).sum();
    if total_volume == Decimal::ZERO {
        return Decimal::ZERO;
    }

    let weighted_sum: Decimal = top.iter().map(|level| level.price * level.size).sum();
    weighted_sum / total_volume
}

/// The first `count` levels of a side, in the side's own sort order.
pub fn top_levels(levels: &[PriceLevel], count: usize) -> Vec<PriceLevel> {
    levels.iter().take(count).cloned().collect()
}

/// Replace each level's size with the running total from the top of the
/// side — depth-chart input.
pub fn cumulative_sizes(levels: &[PriceLevel]) -> Vec<PriceLevel> {
    let mut cumulative = Decimal::ZERO;
    levels
        .iter()
        .map(|level| {
            cumulative += level.size;
            PriceLevel {
                price: level.price,
                size: cumulative,
            }
        })
        .collect()
}
