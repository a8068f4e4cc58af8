//! Market-data state reconciliation engine
//!
//! Consumes a raw exchange feed (book snapshots, book diffs, trade prints)
//! and maintains two derived, continuously updated views:
//! - A reconciled top-of-book price ladder with spread/mid/VWAP metrics
//! - A fixed-interval OHLCV candle series
//!
//! Both engines are single-writer state machines: the feed adapter applies
//! events strictly in arrival order, consumers pull the latest materialized
//! view. Sequence gaps and stale replays are detected and surfaced as
//! outcomes, never silently merged.
//!
//! # Architecture
//!
//! ```text
//!   Exchange feed adapter (external)
//!        │                  │
//!   snapshots/diffs       trades
//!        │                  │
//!   ┌────▼─────────┐  ┌─────▼───────────┐
//!   │OrderBookEngine│  │CandleAggregator │ ◄── seed candles (REST, external)
//!   └────┬─────────┘  └─────┬───────────┘
//!        │                  │
//!    BookView          Candle series
//!        │                  │
//!   ┌────▼──────────────────▼──┐
//!   │   Consumers (pull-only)  │
//!   └──────────────────────────┘
//! ```

pub mod candles;
pub mod events;
pub mod order_book;
pub mod snapshot;

// Library version
pub const LIB_VERSION: &str = "0.1.0";
