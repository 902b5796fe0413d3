//! Per-instrument order book reconstruction.
//!
//! The feed is order-by-order: every event names one resting order. A
//! [`Security`] keeps the live orders of one instrument and, on
//! [`Security::flush`], materializes a depth-limited ladder per side.
//!
//! Only the best `max_levels + additional_levels` orders of a side are sorted
//! and merged. Orders sharing a price collapse into one level, so the merged
//! ladder can come out shorter than needed; the side's `additional_levels`
//! slack then grows by the shortfall and the side is rebuilt. The slack never
//! shrinks, so later flushes start from a depth that already covered the
//! merges seen so far.

use std::cmp::Ordering;
use std::sync::Arc;

use ahash::AHashMap;
use thiserror::Error;
use tracing::{debug, warn};
use trdk_core::{BookLevel, BookSnapshot, OrderId, QTY_EPS};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookError {
    #[error("{symbol}: order {order_id} already exists")]
    DuplicateOrderId { symbol: String, order_id: OrderId },
}

/// Result of a modify or cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderUpdate {
    Applied,
    /// Known order, same quantity.
    Unchanged,
    UnknownOrder,
}

#[derive(Debug, Clone, Copy)]
struct RawOrder {
    time: u64,
    is_buy: bool,
    price: f64,
    qty: f64,
}

#[derive(Debug, Default)]
struct SideState {
    dirty: bool,
    additional_levels: usize,
    /// Scratch `(price, qty)` entries, reused across flushes.
    cache: Vec<BookLevel>,
}

const BID: usize = 0;
const ASK: usize = 1;

#[inline]
fn side_of(is_buy: bool) -> usize {
    if is_buy { BID } else { ASK }
}

pub struct Security {
    symbol: String,
    max_levels: usize,
    orders: AHashMap<OrderId, RawOrder>,
    sides: [SideState; 2],
    max_new_order_id: OrderId,
    failed: bool,
    last: Option<Arc<BookSnapshot>>,
}

impl Security {
    /// `max_levels` is clamped to at least one level.
    pub fn new(symbol: impl Into<String>, max_levels: usize) -> Self {
        Self {
            symbol: symbol.into(),
            max_levels: max_levels.max(1),
            orders: AHashMap::new(),
            sides: Default::default(),
            max_new_order_id: 0,
            failed: false,
            last: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Set by a duplicate order id; cleared by [`Security::clear_book`].
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Current slack of the bid and ask sides.
    pub fn additional_levels(&self) -> (usize, usize) {
        (self.sides[BID].additional_levels, self.sides[ASK].additional_levels)
    }

    /// Last published snapshot.
    pub fn last_snapshot(&self) -> Option<&Arc<BookSnapshot>> {
        self.last.as_ref()
    }

    pub fn on_new_order(
        &mut self,
        time: u64,
        is_buy: bool,
        order_id: OrderId,
        price: f64,
        qty: f64,
    ) -> Result<(), BookError> {
        if self.orders.contains_key(&order_id) {
            self.failed = true;
            return Err(BookError::DuplicateOrderId { symbol: self.symbol.clone(), order_id });
        }
        self.orders.insert(order_id, RawOrder { time, is_buy, price, qty });
        self.sides[side_of(is_buy)].dirty = true;
        self.max_new_order_id = self.max_new_order_id.max(order_id);
        Ok(())
    }

    pub fn on_order_modify(&mut self, time: u64, order_id: OrderId, qty: f64) -> OrderUpdate {
        let Some(order) = self.orders.get_mut(&order_id) else {
            self.report_unknown("modify", order_id);
            return OrderUpdate::UnknownOrder;
        };
        order.time = time;
        if (order.qty - qty).abs() < QTY_EPS {
            return OrderUpdate::Unchanged;
        }
        order.qty = qty;
        self.sides[side_of(order.is_buy)].dirty = true;
        OrderUpdate::Applied
    }

    pub fn on_order_cancel(&mut self, _time: u64, order_id: OrderId) -> OrderUpdate {
        match self.orders.remove(&order_id) {
            Some(order) => {
                self.sides[side_of(order.is_buy)].dirty = true;
                OrderUpdate::Applied
            }
            None => {
                self.report_unknown("cancel", order_id);
                OrderUpdate::UnknownOrder
            }
        }
    }

    /// Ids below the highest id ever added most likely belong to orders
    /// removed before a resubscribe.
    fn report_unknown(&self, action: &str, order_id: OrderId) {
        if order_id >= self.max_new_order_id {
            warn!("[{}] failed to {action} unknown order {order_id}", self.symbol);
        } else {
            debug!("[{}] failed to {action} old unknown order {order_id}", self.symbol);
        }
    }

    /// Drop every order. The next flush publishes an empty book.
    pub fn clear_book(&mut self) {
        self.orders.clear();
        for side in &mut self.sides {
            side.dirty = true;
        }
        self.failed = false;
    }

    /// Rebuild the dirty sides and publish both as one snapshot.
    ///
    /// Returns `None` when nothing changed since the last flush or when the
    /// book is failed.
    pub fn flush(&mut self, time: u64) -> Option<Arc<BookSnapshot>> {
        if self.failed || !(self.sides[BID].dirty || self.sides[ASK].dirty) {
            return None;
        }

        let bids = if self.sides[BID].dirty {
            self.build_side(BID)
        } else {
            self.last.as_ref().map(|s| s.bids.clone()).unwrap_or_default()
        };
        let asks = if self.sides[ASK].dirty {
            self.build_side(ASK)
        } else {
            self.last.as_ref().map(|s| s.asks.clone()).unwrap_or_default()
        };

        for side in &mut self.sides {
            side.dirty = false;
        }
        let snapshot = Arc::new(BookSnapshot { time_us: time, bids, asks });
        self.last = Some(snapshot.clone());
        Some(snapshot)
    }

    fn build_side(&mut self, side: usize) -> Vec<BookLevel> {
        let is_buy = side == BID;
        let compare: fn(&BookLevel, &BookLevel) -> Ordering = if is_buy {
            |a, b| b.price.total_cmp(&a.price)
        } else {
            |a, b| a.price.total_cmp(&b.price)
        };
        let max_levels = self.max_levels;
        let orders = &self.orders;
        let state = &mut self.sides[side];

        loop {
            let depth = max_levels + state.additional_levels;

            state.cache.clear();
            state.cache.extend(
                orders
                    .values()
                    .filter(|o| o.is_buy == is_buy)
                    .map(|o| BookLevel::new(o.price, o.qty)),
            );

            let truncated = state.cache.len() > depth;
            if truncated {
                state.cache.select_nth_unstable_by(depth - 1, compare);
                state.cache.truncate(depth);
            }
            state.cache.sort_unstable_by(compare);

            let mut ladder = merge_levels(&state.cache);

            // With truncation only the levels strictly better than the worst
            // selected price are complete.
            if truncated && ladder.len() <= max_levels {
                state.additional_levels += max_levels + 1 - ladder.len();
                continue;
            }

            ladder.truncate(max_levels);
            return ladder;
        }
    }
}

/// Collapse adjacent entries of a sorted list that share a price.
fn merge_levels(sorted: &[BookLevel]) -> Vec<BookLevel> {
    let mut ladder: Vec<BookLevel> = Vec::with_capacity(sorted.len());
    for entry in sorted {
        match ladder.last_mut() {
            Some(level) if level.is_same_price(entry.price) => level.qty += entry.qty,
            _ => ladder.push(*entry),
        }
    }
    ladder
}
