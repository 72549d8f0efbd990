//! Order records and the auction order book.
//!
//! Orders are immutable value records: every "update" returns a new record, so
//! standing book state never aliases in-flight match candidates. The book keeps
//! both sides ranked with market orders ahead of any limit, then price
//! aggressiveness, then time, then id.

use crate::types::{MemberId, OrderId, Price, Side, Timestamp};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Limit order with a specified price.
    Limit,
    /// Market order. Ranks ahead of every limit order.
    Market,
    /// Midpoint order. Matched only against other midpoint orders at the
    /// prevailing midpoint price.
    Midpoint,
}

/// Order time in force options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Valid for the current trading day.
    Day,
    /// Valid until the order's good-till date.
    GoodTillDate,
    /// Fill what is possible immediately, cancel the rest.
    ImmediateOrCancel,
}

impl Default for TimeInForce {
    fn default() -> Self {
        Self::Day
    }
}

/// What a submission asks the venue to do with the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmitType {
    New,
    Modify,
    Cancel,
}

/// Closed set of caller-facing reject reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    BelowMinimumSize,
    InvalidGoodTillDate,
    UnsupportedOrderType,
    CallPhaseNotOpen,
}

/// Typed submission outcome. Validation failures are data, not faults, so the
/// caller can always react programmatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Ok,
    Reject(RejectReason),
    Error(String),
}

impl SubmitOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, SubmitOutcome::Ok)
    }

    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            SubmitOutcome::Reject(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// A standing or incoming order. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub member_id: MemberId,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    /// Cumulative executed quantity.
    pub filled: Decimal,
    /// None for market orders.
    pub price: Option<Price>,
    /// Smallest quantity this order accepts in a single match. Zero = none.
    pub min_fill: Decimal,
    pub time_in_force: TimeInForce,
    pub good_till: Option<NaiveDate>,
    pub created_at: Timestamp,
}

impl Order {
    pub fn new_limit(
        id: OrderId,
        member_id: MemberId,
        side: Side,
        quantity: Decimal,
        price: Price,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            member_id,
            side,
            order_type: OrderType::Limit,
            quantity,
            filled: Decimal::ZERO,
            price: Some(price),
            min_fill: Decimal::ZERO,
            time_in_force: TimeInForce::Day,
            good_till: None,
            created_at: timestamp,
        }
    }

    pub fn new_market(
        id: OrderId,
        member_id: MemberId,
        side: Side,
        quantity: Decimal,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            member_id,
            side,
            order_type: OrderType::Market,
            quantity,
            filled: Decimal::ZERO,
            price: None,
            min_fill: Decimal::ZERO,
            time_in_force: TimeInForce::Day,
            good_till: None,
            created_at: timestamp,
        }
    }

    pub fn new_midpoint(
        id: OrderId,
        member_id: MemberId,
        side: Side,
        quantity: Decimal,
        limit: Option<Price>,
        min_fill: Decimal,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            member_id,
            side,
            order_type: OrderType::Midpoint,
            quantity,
            filled: Decimal::ZERO,
            price: limit,
            min_fill,
            time_in_force: TimeInForce::Day,
            good_till: None,
            created_at: timestamp,
        }
    }

    pub fn with_good_till(self, date: NaiveDate) -> Self {
        Self {
            time_in_force: TimeInForce::GoodTillDate,
            good_till: Some(date),
            ..self
        }
    }

    pub fn remaining(&self) -> Decimal {
        self.quantity - self.filled
    }

    pub fn is_filled(&self) -> bool {
        self.remaining() <= Decimal::ZERO
    }

    /// New record with `quantity` more executed. Never mutates in place.
    pub fn with_filled(&self, quantity: Decimal) -> Self {
        debug_assert!(quantity <= self.remaining(), "cannot fill more than remaining");
        Self {
            filled: self.filled + quantity,
            ..self.clone()
        }
    }

    /// New record with a replaced open quantity (order modification).
    pub fn with_quantity(&self, quantity: Decimal) -> Self {
        Self {
            quantity,
            ..self.clone()
        }
    }

    pub fn is_market(&self) -> bool {
        self.order_type == OrderType::Market
    }
}

/// Book ranking key: market orders first, then price aggressiveness (bids
/// store the negated price so ascending key order is best-first on both
/// sides), then time, then id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct RankKey {
    limit_rank: u8,
    keyed_price: Decimal,
    timestamp: Timestamp,
    order_id: OrderId,
}

impl RankKey {
    fn for_order(order: &Order) -> Self {
        let (limit_rank, keyed_price) = match order.price {
            None => (0, Decimal::ZERO),
            Some(p) if order.side.is_buy() => (1, -p.value()),
            Some(p) => (1, p.value()),
        };
        Self {
            limit_rank,
            keyed_price,
            timestamp: order.created_at,
            order_id: order.id,
        }
    }
}

/// How far the book is closed to incoming flow.
///
/// Partially closed: cancels and modifications are accepted, new entries only
/// through a running call phase. Fully closed: nothing is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookState {
    FullyClosed,
    PartiallyClosed,
}

/// Auction order book: two ranked sides plus an id index.
#[derive(Debug, Clone)]
pub struct OrderBook {
    bids: BTreeMap<RankKey, Order>,
    asks: BTreeMap<RankKey, Order>,
    order_index: HashMap<OrderId, (Side, RankKey)>,
    state: BookState,
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            order_index: HashMap::new(),
            state: BookState::FullyClosed,
        }
    }

    pub fn state(&self) -> BookState {
        self.state
    }

    pub fn close_partially(&mut self) {
        self.state = BookState::PartiallyClosed;
    }

    pub fn close_fully(&mut self) {
        self.state = BookState::FullyClosed;
    }

    pub fn insert(&mut self, order: Order) {
        let key = RankKey::for_order(&order);
        self.order_index.insert(order.id, (order.side, key));
        match order.side {
            Side::Buy => self.bids.insert(key, order),
            Side::Sell => self.asks.insert(key, order),
        };
    }

    pub fn remove(&mut self, order_id: OrderId) -> Option<Order> {
        let (side, key) = self.order_index.remove(&order_id)?;
        match side {
            Side::Buy => self.bids.remove(&key),
            Side::Sell => self.asks.remove(&key),
        }
    }

    pub fn get(&self, order_id: OrderId) -> Option<&Order> {
        let (side, key) = self.order_index.get(&order_id)?;
        match side {
            Side::Buy => self.bids.get(key),
            Side::Sell => self.asks.get(key),
        }
    }

    /// Replace a standing order with a new record under the same id.
    pub fn replace(&mut self, order: Order) -> Option<Order> {
        let previous = self.remove(order.id)?;
        self.insert(order);
        Some(previous)
    }

    /// Standing orders on one side, best-ranked first.
    pub fn side(&self, side: Side) -> impl Iterator<Item = &Order> {
        match side {
            Side::Buy => self.bids.values(),
            Side::Sell => self.asks.values(),
        }
    }

    /// Limit prices on one side in rank order. Market orders carry no price
    /// and do not appear here.
    pub fn limit_prices(&self, side: Side) -> Vec<Price> {
        self.side(side).filter_map(|o| o.price).collect()
    }

    /// Total open quantity on one side, market orders included.
    pub fn side_quantity(&self, side: Side) -> Decimal {
        self.side(side).map(|o| o.remaining()).sum()
    }

    /// Open quantity on one side at least as aggressive as `worst`: bids
    /// priced at or above it, asks at or below it. Market orders always count.
    pub fn matchable_quantity(&self, side: Side, worst: Price) -> Decimal {
        self.side(side)
            .filter(|o| match o.price {
                None => true,
                Some(p) if side.is_buy() => p >= worst,
                Some(p) => p <= worst,
            })
            .map(|o| o.remaining())
            .sum()
    }

    pub fn order_count(&self) -> usize {
        self.bids.len() + self.asks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

/// A match between one buy and one sell order at a single price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub buy_order: OrderId,
    pub sell_order: OrderId,
    pub buyer: MemberId,
    pub seller: MemberId,
    pub price: Price,
    pub quantity: Decimal,
    pub executed_at: Timestamp,
}

impl Trade {
    pub fn new(
        buy: &Order,
        sell: &Order,
        price: Price,
        quantity: Decimal,
        executed_at: Timestamp,
    ) -> Result<Self, MatchError> {
        if quantity <= Decimal::ZERO {
            return Err(MatchError::NonPositiveQuantity(quantity));
        }
        Ok(Self {
            buy_order: buy.id,
            sell_order: sell.id,
            buyer: buy.member_id,
            seller: sell.member_id,
            price,
            quantity,
            executed_at,
        })
    }
}

/// Errors fatal to a single match attempt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error("trade quantity {0} is not positive")]
    NonPositiveQuantity(Decimal),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn limit(id: u64, side: Side, price: Decimal, qty: Decimal, ts: i64) -> Order {
        Order::new_limit(
            OrderId(id),
            MemberId(1),
            side,
            qty,
            Price::new_unchecked(price),
            Timestamp::from_millis(ts),
        )
    }

    #[test]
    fn empty_book() {
        let book = OrderBook::new();
        assert!(book.is_empty());
        assert_eq!(book.state(), BookState::FullyClosed);
        assert!(book.limit_prices(Side::Buy).is_empty());
    }

    #[test]
    fn bids_rank_highest_price_first() {
        let mut book = OrderBook::new();
        book.insert(limit(1, Side::Buy, dec!(200), dec!(100), 0));
        book.insert(limit(2, Side::Buy, dec!(202), dec!(100), 10));
        book.insert(limit(3, Side::Buy, dec!(201), dec!(100), 5));

        let ids: Vec<u64> = book.side(Side::Buy).map(|o| o.id.0).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn asks_rank_lowest_price_first() {
        let mut book = OrderBook::new();
        book.insert(limit(1, Side::Sell, dec!(200), dec!(100), 0));
        book.insert(limit(2, Side::Sell, dec!(197), dec!(100), 10));
        book.insert(limit(3, Side::Sell, dec!(198), dec!(100), 5));

        let ids: Vec<u64> = book.side(Side::Sell).map(|o| o.id.0).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn market_orders_rank_ahead_of_any_limit() {
        let mut book = OrderBook::new();
        book.insert(limit(1, Side::Buy, dec!(500), dec!(100), 0));
        book.insert(Order::new_market(
            OrderId(2),
            MemberId(1),
            Side::Buy,
            dec!(50),
            Timestamp::from_millis(100),
        ));

        let ids: Vec<u64> = book.side(Side::Buy).map(|o| o.id.0).collect();
        assert_eq!(ids, vec![2, 1]);
        // market orders contribute quantity but no limit price
        assert_eq!(book.limit_prices(Side::Buy).len(), 1);
        assert_eq!(book.side_quantity(Side::Buy), dec!(150));
    }

    #[test]
    fn same_price_ranks_by_time_then_id() {
        let mut book = OrderBook::new();
        book.insert(limit(5, Side::Sell, dec!(200), dec!(1), 100));
        book.insert(limit(3, Side::Sell, dec!(200), dec!(1), 50));
        book.insert(limit(4, Side::Sell, dec!(200), dec!(1), 50));

        let ids: Vec<u64> = book.side(Side::Sell).map(|o| o.id.0).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[test]
    fn matchable_quantity_filters_by_aggressiveness() {
        let mut book = OrderBook::new();
        book.insert(limit(1, Side::Buy, dec!(202), dec!(200), 0));
        book.insert(limit(2, Side::Buy, dec!(201), dec!(200), 0));
        book.insert(limit(3, Side::Buy, dec!(200), dec!(300), 0));

        assert_eq!(
            book.matchable_quantity(Side::Buy, Price::new_unchecked(dec!(201))),
            dec!(400)
        );
        assert_eq!(
            book.matchable_quantity(Side::Buy, Price::new_unchecked(dec!(200))),
            dec!(700)
        );
    }

    #[test]
    fn remove_and_replace() {
        let mut book = OrderBook::new();
        book.insert(limit(1, Side::Buy, dec!(200), dec!(100), 0));

        let modified = book.get(OrderId(1)).unwrap().with_quantity(dec!(50));
        book.replace(modified);
        assert_eq!(book.get(OrderId(1)).unwrap().quantity, dec!(50));

        assert!(book.remove(OrderId(1)).is_some());
        assert!(book.is_empty());
        assert!(book.remove(OrderId(1)).is_none());
    }

    #[test]
    fn fill_returns_new_record() {
        let order = limit(1, Side::Buy, dec!(200), dec!(100), 0);
        let filled = order.with_filled(dec!(40));
        assert_eq!(order.filled, dec!(0));
        assert_eq!(filled.remaining(), dec!(60));
        assert!(!filled.is_filled());
        assert!(filled.with_filled(dec!(60)).is_filled());
    }

    #[test]
    fn trade_rejects_non_positive_quantity() {
        let buy = limit(1, Side::Buy, dec!(200), dec!(100), 0);
        let sell = limit(2, Side::Sell, dec!(200), dec!(100), 0);
        let err = Trade::new(
            &buy,
            &sell,
            Price::new_unchecked(dec!(200)),
            dec!(0),
            Timestamp::from_millis(0),
        );
        assert!(matches!(err, Err(MatchError::NonPositiveQuantity(_))));
    }
}
