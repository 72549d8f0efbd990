//! Midpoint order matching with quantity stealing.
//!
//! An incoming midpoint order is matched against the standing midpoint orders
//! of the other side in two passes. Pass 1 tentatively assigns executable
//! quantity, stealing already-assigned quantity back from lower-precedence
//! chances when a standing order would otherwise miss its minimum fill. Pass 2
//! re-verifies each tentative assignment (price crossing, volatility guard)
//! and emits the trades at the midpoint price.

use crate::order::{MatchError, Order, Trade};
use crate::price_range::VolatilityGuard;
use crate::types::{OrderId, Price, Side, Timestamp};
use rust_decimal::Decimal;

/// One standing order's tentatively assigned executable quantity.
/// Never sinks below the order's own minimum fill.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionChance {
    pub order_id: OrderId,
    pub assigned: Decimal,
    pub min_fill: Decimal,
}

impl ExecutionChance {
    fn stealable(&self) -> Decimal {
        self.assigned - self.min_fill
    }
}

/// Stack of chances in collection order: the earliest entry has the highest
/// matching precedence, the top of the stack the lowest. Stealing drains from
/// the top down, never taking a donor below its minimum-fill floor.
#[derive(Debug, Default)]
pub struct QuantityCollector {
    chances: Vec<ExecutionChance>,
}

impl QuantityCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chance: ExecutionChance) {
        self.chances.push(chance);
    }

    /// Total quantity that could be reclaimed without violating any floor.
    pub fn stealable(&self) -> Decimal {
        self.chances.iter().map(ExecutionChance::stealable).sum()
    }

    /// Reclaim exactly `needed` from the lowest-precedence donors first.
    /// Callers must check `stealable()` beforehand; stealing is all-or-nothing.
    pub fn steal(&mut self, needed: Decimal) -> Decimal {
        debug_assert!(self.stealable() >= needed);
        let mut outstanding = needed;
        for chance in self.chances.iter_mut().rev() {
            if outstanding <= Decimal::ZERO {
                break;
            }
            let take = chance.stealable().min(outstanding);
            chance.assigned -= take;
            outstanding -= take;
        }
        needed - outstanding
    }

    pub fn get(&self, order_id: OrderId) -> Option<&ExecutionChance> {
        self.chances.iter().find(|c| c.order_id == order_id)
    }

    pub fn len(&self) -> usize {
        self.chances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chances.is_empty()
    }
}

/// Outcome of one midpoint match attempt.
#[derive(Debug, Clone)]
pub struct MidpointMatch {
    /// The incoming order with its cumulative fill advanced.
    pub incoming: Order,
    pub trades: Vec<Trade>,
    /// Standing orders still open, in their original queue order.
    pub remaining_other_side: Vec<Order>,
}

/// Match an incoming midpoint order against the other side's standing
/// midpoint queue at the prevailing midpoint price.
pub fn match_midpoint(
    incoming: &Order,
    other_side: &[Order],
    midpoint: Price,
    guard: &VolatilityGuard,
    now: Timestamp,
) -> Result<MidpointMatch, MatchError> {
    let collector = collect_quantities(incoming, other_side, midpoint);
    generate_trades(incoming, other_side, midpoint, guard, now, collector)
}

// Pass 1: walk the other side in priority order, assigning executable
// quantity and stealing back from already-collected chances when a standing
// order would miss its minimum fill. Skipped orders stay fully in the book.
fn collect_quantities(incoming: &Order, other_side: &[Order], midpoint: Price) -> QuantityCollector {
    let mut collector = QuantityCollector::new();
    if !crosses(incoming, midpoint) {
        return collector;
    }

    let mut remaining = incoming.remaining();
    for standing in other_side {
        if remaining <= Decimal::ZERO {
            break;
        }
        if standing.is_filled() || !crosses(standing, midpoint) {
            continue;
        }

        let candidate = remaining.min(standing.remaining());
        if candidate >= standing.min_fill {
            collector.push(ExecutionChance {
                order_id: standing.id,
                assigned: candidate,
                min_fill: standing.min_fill,
            });
            remaining -= candidate;
            continue;
        }

        // Below the order's floor: steal the shortfall, lowest-precedence
        // donors first. All or nothing; the incoming quantity only shrinks by
        // the fresh candidate, the stolen part merely moves between chances.
        let shortfall = standing.min_fill - candidate;
        if standing.min_fill <= standing.remaining() && collector.stealable() >= shortfall {
            let stolen = collector.steal(shortfall);
            collector.push(ExecutionChance {
                order_id: standing.id,
                assigned: candidate + stolen,
                min_fill: standing.min_fill,
            });
            remaining -= candidate;
        }
    }
    collector
}

// Pass 2: walk the queue again in its original order, re-verify every chance,
// emit trades at the midpoint, and hand back what stays in the book.
fn generate_trades(
    incoming: &Order,
    other_side: &[Order],
    midpoint: Price,
    guard: &VolatilityGuard,
    now: Timestamp,
    collector: QuantityCollector,
) -> Result<MidpointMatch, MatchError> {
    let mut trades = Vec::new();
    let mut remaining_other_side = Vec::new();
    let mut incoming_fill = Decimal::ZERO;

    for standing in other_side {
        let admissible = collector
            .get(standing.id)
            .filter(|_| crosses(standing, midpoint) && crosses(incoming, midpoint))
            .filter(|_| guard.check(midpoint, now).is_none());

        let Some(chance) = admissible else {
            remaining_other_side.push(standing.clone());
            continue;
        };

        let (buy, sell) = match incoming.side {
            Side::Buy => (incoming, standing),
            Side::Sell => (standing, incoming),
        };
        trades.push(Trade::new(buy, sell, midpoint, chance.assigned, now)?);
        incoming_fill += chance.assigned;

        let executed = standing.with_filled(chance.assigned);
        if !executed.is_filled() {
            remaining_other_side.push(executed);
        }
    }

    Ok(MidpointMatch {
        incoming: incoming.with_filled(incoming_fill),
        trades,
        remaining_other_side,
    })
}

// Direction-adjusted crossing at the midpoint: a buy limit must sit at or
// above it, a sell limit at or below. Unlimited midpoint orders always cross.
fn crosses(order: &Order, midpoint: Price) -> bool {
    match order.price {
        None => true,
        Some(limit) if order.side.is_buy() => limit >= midpoint,
        Some(limit) => limit <= midpoint,
    }
}
