//! Order book structures — what the reconstruction engine publishes.
//!
//! A [`BookSnapshot`] carries both ladder sides at once, so downstream
//! consumers never observe a bid-only or ask-only intermediate state. Once
//! published (as `Arc<BookSnapshot>`) a snapshot is never mutated.
//!
//! # Timestamp convention
//!
//! All timestamps are in **microseconds since Unix epoch** (us), taken when
//! the read pass that carried the events started.

/// Feed-assigned order identifier, unique among live orders of one instrument.
pub type OrderId = u64;

/// Tolerance for floating-point price comparison.
pub const PRICE_EPS: f64 = 1e-10;

/// Tolerance for floating-point quantity comparison.
pub const QTY_EPS: f64 = 1e-10;

// ---------------------------------------------------------------------------
// BookLevel
// ---------------------------------------------------------------------------

/// One aggregated price level of a ladder.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BookLevel {
    pub price: f64,
    /// Sum of the quantities of all live orders at `price`.
    pub qty: f64,
}

impl BookLevel {
    pub fn new(price: f64, qty: f64) -> Self {
        Self { price, qty }
    }

    /// Returns `true` if `price` is the same level as this one.
    #[inline]
    pub fn is_same_price(&self, price: f64) -> bool {
        (self.price - price).abs() < PRICE_EPS
    }
}

// ---------------------------------------------------------------------------
// BookSnapshot
// ---------------------------------------------------------------------------

/// A depth-limited, de-duplicated two-sided price ladder.
///
/// - `bids` are sorted **descending** by price (best bid first).
/// - `asks` are sorted **ascending** by price (best ask first).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BookSnapshot {
    pub time_us: u64,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl BookSnapshot {
    /// Best (highest) bid, if any.
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    /// Best (lowest) ask, if any.
    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    /// Returns `true` if the book has no levels on either side.
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

impl std::fmt::Display for BookLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}x{:.2}", self.price, self.qty)
    }
}

impl std::fmt::Display for BookSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Book(")?;
        match self.best_bid() {
            Some(level) => write!(f, "bid={level}")?,
            None => write!(f, "bid=-")?,
        }
        match self.best_ask() {
            Some(level) => write!(f, " ask={level}")?,
            None => write!(f, " ask=-")?,
        }
        write!(f, " levels={}/{} t={})", self.bids.len(), self.asks.len(), self.time_us)
    }
}
