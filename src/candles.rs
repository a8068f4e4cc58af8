//! OHLCV candle aggregation from trade prints
//!
//! Buckets trades into fixed-interval candles for one symbol/interval
//! pair. Exactly one candle is open at a time; a trade landing in a
//! different bucket seals the open candle into closed history and starts
//! a fresh one. All arithmetic uses `Decimal`; `max`/`min` are non-strict
//! so a trade at the current high/low leaves it unchanged.
//!
//! Candle boundaries are aligned to epoch (e.g. 1m candles open on minute
//! boundaries).

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::Trade;

/// Supported candle intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Interval {
    /// 1 minute
    M1,
    /// 5 minutes
    M5,
    /// 15 minutes
    M15,
    /// 30 minutes
    M30,
    /// 1 hour
    H1,
    /// 2 hours
    H2,
    /// 4 hours
    H4,
    /// 6 hours
    H6,
    /// 8 hours
    H8,
    /// 12 hours
    H12,
    /// 1 day
    D1,
    /// 3 days
    D3,
    /// 1 week
    W1,
    /// 1 month (30 days)
    Mo1,
}

/// An interval string the feed does not support.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported interval: {0}")]
pub struct ParseIntervalError(pub String);

impl Interval {
    /// Duration of this interval in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        const MINUTE: i64 = 60_000;
        const HOUR: i64 = 3_600_000;
        const DAY: i64 = 86_400_000;

        match self {
            Interval::M1 => MINUTE,
            Interval::M5 => 5 * MINUTE,
            Interval::M15 => 15 * MINUTE,
            Interval::M30 => 30 * MINUTE,
            Interval::H1 => HOUR,
            Interval::H2 => 2 * HOUR,
            Interval::H4 => 4 * HOUR,
            Interval::H6 => 6 * HOUR,
            Interval::H8 => 8 * HOUR,
            Interval::H12 => 12 * HOUR,
            Interval::D1 => DAY,
            Interval::D3 => 3 * DAY,
            Interval::W1 => 7 * DAY,
            Interval::Mo1 => 30 * DAY,
        }
    }

    /// The exchange-format interval string ("1m", "4h", "1d", ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H2 => "2h",
            Interval::H4 => "4h",
            Interval::H6 => "6h",
            Interval::H8 => "8h",
            Interval::H12 => "12h",
            Interval::D1 => "1d",
            Interval::D3 => "3d",
            Interval::W1 => "1w",
            Interval::Mo1 => "1M",
        }
    }

    /// Floor a timestamp to this interval's bucket boundary.
    pub fn bucket_start(&self, timestamp_ms: i64) -> i64 {
        let duration = self.duration_ms();
        (timestamp_ms / duration) * duration
    }
}

impl FromStr for Interval {
    type Err = ParseIntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Interval::M1),
            "5m" => Ok(Interval::M5),
            "15m" => Ok(Interval::M15),
            "30m" => Ok(Interval::M30),
            "1h" => Ok(Interval::H1),
            "2h" => Ok(Interval::H2),
            "4h" => Ok(Interval::H4),
            "6h" => Ok(Interval::H6),
            "8h" => Ok(Interval::H8),
            "12h" => Ok(Interval::H12),
            "1d" => Ok(Interval::D1),
            "3d" => Ok(Interval::D3),
            "1w" => Ok(Interval::W1),
            "1M" => Ok(Interval::Mo1),
            other => Err(ParseIntervalError(other.to_string())),
        }
    }
}

/// A single OHLCV candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket open time in Unix milliseconds — an exact multiple of the
    /// interval duration.
    pub bucket_start_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub trade_count: u64,
}

impl Candle {
    /// Seed a new candle from the first trade in its bucket.
    fn from_trade(trade: &Trade, bucket_start_ms: i64) -> Self {
        Self {
            bucket_start_ms,
            open: trade.price,
            high: trade.price,
            low: trade.price,
            close: trade.price,
            volume: trade.quantity,
            trade_count: 1,
        }
    }

    /// Fold a trade into this candle.
    fn update(&mut self, trade: &Trade) {
        if trade.price > self.high {
            self.high = trade.price;
        }
        if trade.price < self.low {
            self.low = trade.price;
        }
        self.close = trade.price;
        self.volume += trade.quantity;
        self.trade_count += 1;
    }

    /// Validate OHLCV invariants.
    pub fn is_valid(&self) -> bool {
        self.high >= self.open
            && self.high >= self.close
            && self.high >= self.low
            && self.low <= self.open
            && self.low <= self.close
            && self.volume >= Decimal::ZERO
    }
}

/// Result of feeding one trade to the aggregator.
///
/// This is the consumer's render signal: `NewBar` means append a bar,
/// `BarUpdated` means redraw the last bar in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandleUpdate {
    /// A new bucket opened; the previous open candle (if any) was sealed.
    NewBar(Candle),
    /// The open candle absorbed the trade.
    BarUpdated(Candle),
}

impl CandleUpdate {
    /// The candle carried by this outcome.
    pub fn candle(&self) -> &Candle {
        match self {
            CandleUpdate::NewBar(candle) | CandleUpdate::BarUpdated(candle) => candle,
        }
    }

    /// Whether this outcome opened a new bucket.
    pub fn is_new_bar(&self) -> bool {
        matches!(self, CandleUpdate::NewBar(_))
    }
}

/// Aggregates a trade stream into candles for one symbol/interval pair.
///
/// Two states: no open candle (fresh or cleared), or one open candle
/// accumulating. Sealed candles are immutable history.
#[derive(Debug, Clone)]
pub struct CandleAggregator {
    interval: Interval,
    /// Currently accumulating candle, if any trade has arrived.
    current: Option<Candle>,
    /// Sealed candles in chronological seal order.
    closed: Vec<Candle>,
}

impl CandleAggregator {
    /// Create an empty aggregator for the given interval.
    pub fn new(interval: Interval) -> Self {
        Self {
            interval,
            current: None,
            closed: Vec::new(),
        }
    }

    /// The interval this aggregator buckets into.
    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// Feed one trade.
    ///
    /// A trade in the open candle's bucket updates it in place and returns
    /// `BarUpdated`. Any other bucket seals the open candle (if one
    /// exists) and returns `NewBar` with the freshly opened candle.
    ///
    /// A trade timestamped behind the open bucket is not special-cased:
    /// it opens whichever bucket its floored timestamp selects.
    pub fn add_trade(&mut self, trade: &Trade) -> CandleUpdate {
        let bucket_start = self.interval.bucket_start(trade.timestamp_ms);

        match &mut self.current {
            Some(open) if open.bucket_start_ms == bucket_start => {
                open.update(trade);
                CandleUpdate::BarUpdated(open.clone())
            }
            _ => {
                if let Some(sealed) = self.current.take() {
                    self.closed.push(sealed);
                }
                let candle = Candle::from_trade(trade, bucket_start);
                self.current = Some(candle.clone());
                CandleUpdate::NewBar(candle)
            }
        }
    }

    /// The open (still accumulating) candle, if any.
    pub fn current_candle(&self) -> Option<&Candle> {
        self.current.as_ref()
    }

    /// Sealed candles only, oldest first.
    pub fn closed_candles(&self) -> &[Candle] {
        &self.closed
    }

    /// Sealed history with the open candle appended, if present.
    pub fn all_candles(&self) -> Vec<Candle> {
        let mut result = self.closed.clone();
        if let Some(current) = &self.current {
            result.push(current.clone());
        }
        result
    }

    /// Candles whose bucket start falls in `[start_ms, end_ms]`, open
    /// candle included.
    pub fn candles_in_range(&self, start_ms: i64, end_ms: i64) -> Vec<Candle> {
        self.all_candles()
            .into_iter()
            .filter(|candle| candle.bucket_start_ms >= start_ms && candle.bucket_start_ms <= end_ms)
            .collect()
    }

    /// The most recent `count` candles, open candle included.
    pub fn latest_candles(&self, count: usize) -> Vec<Candle> {
        let all = self.all_candles();
        let skip = all.len().saturating_sub(count);
        all.into_iter().skip(skip).collect()
    }

    /// Seed closed history from the historical-data collaborator before
    /// live trades arrive. Seeded candles are already sealed records and
    /// are appended as-is.
    pub fn seed_history(&mut self, candles: Vec<Candle>) {
        self.closed.extend(candles);
    }

    /// Reset to the empty state. Used when the symbol or interval changes
    /// and history must not carry over.
    pub fn clear(&mut self) {
        self.closed.clear();
        self.current = None;
    }
}

/// Batch-aggregate a set of trades into candles.
///
/// Backfill APIs may deliver trades out of submission order, so the batch
/// is stably sorted by timestamp before replay. Returns closed history
/// plus the final open candle.
pub fn aggregate(trades: &[Trade], interval: Interval) -> Vec<Candle> {
    let mut sorted: Vec<Trade> = trades.to_vec();
    sorted.sort_by_key(|trade| trade.timestamp_ms);

    let mut aggregator = CandleAggregator::new(interval);
    for trade in &sorted {
        aggregator.add_trade(trade);
    }
    aggregator.all_candles()
}

/// Percent change from `previous` to `current`; 0 when `previous` is 0.
pub fn price_change(current: Decimal, previous: Decimal) -> Decimal {
    if previous == Decimal::ZERO {
        return Decimal::ZERO;
    }
    (current - previous) / previous * Decimal::from(100)
}

/// Render a percent change with explicit sign and two decimals.
pub fn format_price_change(change: Decimal) -> String {
    let sign = if change >= Decimal::ZERO { "+" } else { "" };
    format!("{sign}{:.2}%", change)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    fn trade(price: &str, quantity: &str, timestamp_ms: i64, trade_id: u64) -> Trade {
        Trade {
            price: dec(price),
            quantity: dec(quantity),
            timestamp_ms,
            taker_is_sell: false,
            trade_id,
        }
    }

    // 2022-01-01 00:00:00 UTC, an exact minute boundary
    const T0: i64 = 1_640_995_200_000;

    fn bucket_scenario() -> Vec<Trade> {
        vec![
            trade("50000", "0.1", T0, 1),
            trade("50050", "0.2", T0 + 5_000, 2),
            trade("49950", "0.15", T0 + 10_000, 3),
            trade("50100", "0.3", T0 + 60_000, 4),
        ]
    }

    #[test]
    fn test_interval_parse() {
        assert_eq!("1m".parse::<Interval>().unwrap(), Interval::M1);
        assert_eq!("4h".parse::<Interval>().unwrap(), Interval::H4);
        assert_eq!("1M".parse::<Interval>().unwrap(), Interval::Mo1);
        assert_eq!(Interval::W1.as_str(), "1w");
    }

    #[test]
    fn test_interval_parse_rejects_unknown() {
        let err = "7x".parse::<Interval>().unwrap_err();
        assert_eq!(err, ParseIntervalError("7x".to_string()));
    }

    #[test]
    fn test_interval_durations() {
        assert_eq!(Interval::M1.duration_ms(), 60_000);
        assert_eq!(Interval::H1.duration_ms(), 3_600_000);
        assert_eq!(Interval::D1.duration_ms(), 86_400_000);
        assert_eq!(Interval::W1.duration_ms(), 604_800_000);
    }

    #[test]
    fn test_bucket_start_floors_to_boundary() {
        assert_eq!(Interval::M1.bucket_start(T0 + 30_000), T0);
        assert_eq!(Interval::M1.bucket_start(T0), T0);
        assert_eq!(Interval::M5.bucket_start(T0 + 4 * 60_000), T0);
        assert_eq!(Interval::M1.bucket_start(T0) % Interval::M1.duration_ms(), 0);
    }

    #[test]
    fn test_new_bar_vs_bar_updated_signaling() {
        let mut aggregator = CandleAggregator::new(Interval::M1);
        let trades = bucket_scenario();

        let first = aggregator.add_trade(&trades[0]);
        assert!(first.is_new_bar());
        assert_eq!(first.candle().bucket_start_ms, T0);
        assert_eq!(first.candle().open, dec("50000"));

        assert!(!aggregator.add_trade(&trades[1]).is_new_bar());
        assert!(!aggregator.add_trade(&trades[2]).is_new_bar());

        let rollover = aggregator.add_trade(&trades[3]);
        assert!(rollover.is_new_bar());
        assert_eq!(rollover.candle().bucket_start_ms, T0 + 60_000);
        assert_eq!(rollover.candle().open, dec("50100"));
    }

    #[test]
    fn test_ohlcv_accumulation() {
        let mut aggregator = CandleAggregator::new(Interval::M1);
        for t in &bucket_scenario()[..3] {
            aggregator.add_trade(t);
        }

        let current = aggregator.current_candle().unwrap();
        assert_eq!(current.open, dec("50000"));
        assert_eq!(current.high, dec("50050"));
        assert_eq!(current.low, dec("49950"));
        assert_eq!(current.close, dec("49950"));
        assert_eq!(current.volume, dec("0.45"));
        assert_eq!(current.trade_count, 3);
        assert!(current.is_valid());
    }

    #[test]
    fn test_rollover_seals_previous_candle() {
        let mut aggregator = CandleAggregator::new(Interval::M1);
        for t in &bucket_scenario() {
            aggregator.add_trade(t);
        }

        let closed = aggregator.closed_candles();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].open, dec("50000"));
        assert_eq!(closed[0].high, dec("50050"));
        assert_eq!(closed[0].low, dec("49950"));
        assert_eq!(closed[0].close, dec("49950"));
        assert_eq!(closed[0].volume, dec("0.45"));
        assert_eq!(closed[0].trade_count, 3);

        let current = aggregator.current_candle().unwrap();
        assert_eq!(current.bucket_start_ms, T0 + 60_000);
        assert_eq!(current.trade_count, 1);
    }

    #[test]
    fn test_trade_at_current_high_keeps_high() {
        let mut aggregator = CandleAggregator::new(Interval::M1);
        aggregator.add_trade(&trade("50000", "1.0", T0, 1));
        aggregator.add_trade(&trade("50000", "2.0", T0 + 1_000, 2));

        let current = aggregator.current_candle().unwrap();
        assert_eq!(current.high, dec("50000"));
        assert_eq!(current.low, dec("50000"));
        assert_eq!(current.volume, dec("3.0"));
    }

    #[test]
    fn test_all_candles_appends_open() {
        let mut aggregator = CandleAggregator::new(Interval::M1);
        for t in &bucket_scenario() {
            aggregator.add_trade(t);
        }

        let all = aggregator.all_candles();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].bucket_start_ms, T0);
        assert_eq!(all[1].bucket_start_ms, T0 + 60_000);
    }

    #[test]
    fn test_clear_resets_to_empty() {
        let mut aggregator = CandleAggregator::new(Interval::M1);
        for t in &bucket_scenario() {
            aggregator.add_trade(t);
        }

        aggregator.clear();
        assert!(aggregator.current_candle().is_none());
        assert!(aggregator.closed_candles().is_empty());
        assert!(aggregator.all_candles().is_empty());
    }

    #[test]
    fn test_seed_history_precedes_live_candles() {
        let mut aggregator = CandleAggregator::new(Interval::M1);

        let seed = vec![Candle {
            bucket_start_ms: T0 - 60_000,
            open: dec("49900"),
            high: dec("49950"),
            low: dec("49850"),
            close: dec("49920"),
            volume: dec("3.2"),
            trade_count: 17,
        }];
        aggregator.seed_history(seed.clone());
        aggregator.add_trade(&trade("50000", "0.1", T0, 1));

        let all = aggregator.all_candles();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], seed[0]);
        assert_eq!(all[1].bucket_start_ms, T0);
    }

    #[test]
    fn test_out_of_order_trade_reopens_earlier_bucket() {
        // Literal streaming behavior: a trade behind the open bucket seals
        // the open candle and starts a new one at the earlier bucket.
        let mut aggregator = CandleAggregator::new(Interval::M1);
        aggregator.add_trade(&trade("50000", "0.1", T0 + 60_000, 1));

        let late = aggregator.add_trade(&trade("49900", "0.2", T0, 2));
        assert!(late.is_new_bar());
        assert_eq!(late.candle().bucket_start_ms, T0);

        let closed = aggregator.closed_candles();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].bucket_start_ms, T0 + 60_000);
    }

    #[test]
    fn test_batch_aggregate_sorts_by_timestamp() {
        let mut trades = bucket_scenario();
        trades.reverse();

        let candles = aggregate(&trades, Interval::M1);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].bucket_start_ms, T0);
        assert_eq!(candles[0].open, dec("50000"));
        assert_eq!(candles[0].close, dec("49950"));
        assert_eq!(candles[0].volume, dec("0.45"));
        assert_eq!(candles[1].bucket_start_ms, T0 + 60_000);
    }

    #[test]
    fn test_batch_aggregate_five_minute_interval() {
        let trades = vec![
            trade("50000", "0.1", T0, 1),
            trade("50100", "0.2", T0 + 5_000, 2),
            trade("50200", "0.3", T0 + 10 * 60_000, 3),
        ];

        let candles = aggregate(&trades, Interval::M5);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].trade_count, 2);
        assert_eq!(candles[1].open, dec("50200"));
    }

    #[test]
    fn test_candles_in_range() {
        let mut aggregator = CandleAggregator::new(Interval::M1);
        for t in &bucket_scenario() {
            aggregator.add_trade(t);
        }

        let in_range = aggregator.candles_in_range(T0, T0);
        assert_eq!(in_range.len(), 1);
        assert_eq!(in_range[0].bucket_start_ms, T0);

        let all = aggregator.candles_in_range(T0, T0 + 60_000);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_latest_candles() {
        let mut aggregator = CandleAggregator::new(Interval::M1);
        for minute in 0..5 {
            aggregator.add_trade(&trade("50000", "1.0", T0 + minute * 60_000, minute as u64));
        }

        let latest = aggregator.latest_candles(2);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].bucket_start_ms, T0 + 3 * 60_000);
        assert_eq!(latest[1].bucket_start_ms, T0 + 4 * 60_000);

        // Asking for more than exist returns everything
        assert_eq!(aggregator.latest_candles(100).len(), 5);
    }

    #[test]
    fn test_candle_integrity_validation() {
        let invalid = Candle {
            bucket_start_ms: T0,
            open: dec("50000"),
            high: dec("49000"), // high < open
            low: dec("48000"),
            close: dec("49500"),
            volume: dec("1"),
            trade_count: 1,
        };
        assert!(!invalid.is_valid());
    }

    #[test]
    fn test_price_change() {
        assert_eq!(price_change(dec("105"), dec("100")), dec("5"));
        assert_eq!(price_change(dec("95"), dec("100")), dec("-5"));
        assert_eq!(price_change(dec("100"), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_format_price_change() {
        assert_eq!(format_price_change(dec("5")), "+5.00%");
        assert_eq!(format_price_change(dec("-2.5")), "-2.50%");
        assert_eq!(format_price_change(Decimal::ZERO), "+0.00%");
    }

    #[test]
    fn test_candle_serialization_roundtrip() {
        let mut aggregator = CandleAggregator::new(Interval::M1);
        aggregator.add_trade(&trade("50000", "0.1", T0, 1));

        let candle = aggregator.current_candle().unwrap();
        let json = serde_json::to_string(candle).unwrap();
        let deserialized: Candle = serde_json::from_str(&json).unwrap();
        assert_eq!(candle, &deserialized);
    }
}
