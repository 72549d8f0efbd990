//! The continuous trading form.
//!
//! Two phases, stopped and running, and a midpoint order facility: midpoint
//! orders entered while running are matched immediately against the standing
//! midpoint queue of the other side at the prevailing midpoint price.
//! Continuous price/time limit matching is deliberately absent.

use crate::midpoint::match_midpoint;
use crate::order::{Order, OrderType, RejectReason, SubmitOutcome, Trade};
use crate::price_range::VolatilityGuard;
use crate::state::{ContinuousState, InvalidTransition, StateMachine, TradingFormState, Transition};
use crate::types::{Price, Side, Timestamp};

/// Result of entering a midpoint order.
#[derive(Debug)]
pub struct MidpointEntry {
    pub outcome: SubmitOutcome,
    pub trades: Vec<Trade>,
}

impl MidpointEntry {
    fn rejected(reason: RejectReason) -> Self {
        Self {
            outcome: SubmitOutcome::Reject(reason),
            trades: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct ContinuousTrading {
    machine: StateMachine<ContinuousState>,
    midpoint_bids: Vec<Order>,
    midpoint_asks: Vec<Order>,
}

impl Default for ContinuousTrading {
    fn default() -> Self {
        Self::new()
    }
}

impl ContinuousTrading {
    pub fn new() -> Self {
        Self {
            machine: StateMachine::new(
                ContinuousState::default_state(),
                ContinuousState::transition_table(),
            ),
            midpoint_bids: Vec::new(),
            midpoint_asks: Vec::new(),
        }
    }

    pub fn current_state(&self) -> ContinuousState {
        self.machine.current_state()
    }

    pub fn is_active(&self) -> bool {
        self.current_state().is_active()
    }

    pub fn start(&mut self) -> Result<Option<Transition<ContinuousState>>, InvalidTransition<ContinuousState>> {
        self.machine.transition_to(ContinuousState::Running)
    }

    pub fn stop(&mut self) -> Result<Option<Transition<ContinuousState>>, InvalidTransition<ContinuousState>> {
        self.machine.transition_to(ContinuousState::Stopped)
    }

    /// Standing midpoint orders on one side in priority order.
    pub fn midpoint_queue(&self, side: Side) -> &[Order] {
        match side {
            Side::Buy => &self.midpoint_bids,
            Side::Sell => &self.midpoint_asks,
        }
    }

    /// Enter a midpoint order: match what can be matched right now, rest the
    /// remainder. A failed match attempt surfaces as an `Error` outcome and
    /// leaves both queues untouched.
    pub fn submit_midpoint(
        &mut self,
        order: Order,
        midpoint: Price,
        guard: &VolatilityGuard,
        now: Timestamp,
    ) -> MidpointEntry {
        if self.current_state() != ContinuousState::Running {
            return MidpointEntry::rejected(RejectReason::CallPhaseNotOpen);
        }
        if order.order_type != OrderType::Midpoint {
            return MidpointEntry::rejected(RejectReason::UnsupportedOrderType);
        }

        let other_side = self.midpoint_queue(order.side.opposite()).to_vec();
        let matched = match match_midpoint(&order, &other_side, midpoint, guard, now) {
            Ok(matched) => matched,
            Err(e) => {
                return MidpointEntry {
                    outcome: SubmitOutcome::Error(e.to_string()),
                    trades: Vec::new(),
                }
            }
        };

        *self.queue_mut(order.side.opposite()) = matched.remaining_other_side;
        if !matched.incoming.is_filled() {
            self.queue_mut(order.side).push(matched.incoming);
        }
        MidpointEntry {
            outcome: SubmitOutcome::Ok,
            trades: matched.trades,
        }
    }

    fn queue_mut(&mut self, side: Side) -> &mut Vec<Order> {
        match side {
            Side::Buy => &mut self.midpoint_bids,
            Side::Sell => &mut self.midpoint_asks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price_range::PriceRange;
    use crate::types::{MemberId, OrderId};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn guard() -> VolatilityGuard {
        VolatilityGuard::new(
            PriceRange::new(Price::new_unchecked(dec!(100)), dec!(50)),
            PriceRange::new(Price::new_unchecked(dec!(100)), dec!(40)),
        )
        .unwrap()
    }

    fn midpoint(id: u64, side: Side, qty: Decimal) -> Order {
        Order::new_midpoint(
            OrderId(id),
            MemberId(id),
            side,
            qty,
            None,
            Decimal::ZERO,
            Timestamp::from_millis(id as i64),
        )
    }

    #[test]
    fn entry_requires_running_form() {
        let mut continuous = ContinuousTrading::new();
        let entry = continuous.submit_midpoint(
            midpoint(1, Side::Buy, dec!(10)),
            Price::new_unchecked(dec!(100)),
            &guard(),
            Timestamp::from_millis(0),
        );
        assert_eq!(entry.outcome.reject_reason(), Some(RejectReason::CallPhaseNotOpen));
    }

    #[test]
    fn non_midpoint_orders_are_rejected() {
        let mut continuous = ContinuousTrading::new();
        continuous.start().unwrap();
        let entry = continuous.submit_midpoint(
            Order::new_market(OrderId(1), MemberId(1), Side::Buy, dec!(10), Timestamp::from_millis(0)),
            Price::new_unchecked(dec!(100)),
            &guard(),
            Timestamp::from_millis(0),
        );
        assert_eq!(entry.outcome.reject_reason(), Some(RejectReason::UnsupportedOrderType));
    }

    #[test]
    fn unmatched_order_rests_in_the_queue() {
        let mut continuous = ContinuousTrading::new();
        continuous.start().unwrap();

        let entry = continuous.submit_midpoint(
            midpoint(1, Side::Buy, dec!(10)),
            Price::new_unchecked(dec!(100)),
            &guard(),
            Timestamp::from_millis(0),
        );
        assert!(entry.outcome.is_ok());
        assert!(entry.trades.is_empty());
        assert_eq!(continuous.midpoint_queue(Side::Buy).len(), 1);
    }

    #[test]
    fn crossing_midpoint_orders_trade_at_the_midpoint() {
        let mut continuous = ContinuousTrading::new();
        continuous.start().unwrap();

        continuous.submit_midpoint(
            midpoint(1, Side::Sell, dec!(60)),
            Price::new_unchecked(dec!(100)),
            &guard(),
            Timestamp::from_millis(0),
        );
        let entry = continuous.submit_midpoint(
            midpoint(2, Side::Buy, dec!(40)),
            Price::new_unchecked(dec!(100)),
            &guard(),
            Timestamp::from_millis(10),
        );

        assert_eq!(entry.trades.len(), 1);
        assert_eq!(entry.trades[0].price, Price::new_unchecked(dec!(100)));
        assert_eq!(entry.trades[0].quantity, dec!(40));
        // seller keeps the remainder, buyer is done
        assert_eq!(continuous.midpoint_queue(Side::Sell)[0].remaining(), dec!(20));
        assert!(continuous.midpoint_queue(Side::Buy).is_empty());
    }

    #[test]
    fn stop_round_trip_keeps_queues() {
        let mut continuous = ContinuousTrading::new();
        continuous.start().unwrap();
        continuous.submit_midpoint(
            midpoint(1, Side::Sell, dec!(60)),
            Price::new_unchecked(dec!(100)),
            &guard(),
            Timestamp::from_millis(0),
        );
        continuous.stop().unwrap();
        assert!(!continuous.is_active());
        assert_eq!(continuous.midpoint_queue(Side::Sell).len(), 1);
    }
}
