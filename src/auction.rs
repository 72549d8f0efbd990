//! The auction trading form.
//!
//! Wraps the auction state machine around its phase side effects: opening and
//! closing the order book, running price determination, and balancing the
//! book afterwards. Order submission is gated on the current phase and the
//! validator chain; failures are typed outcomes, never faults.

use crate::order::{BookState, Order, OrderBook, RejectReason, SubmitOutcome, SubmitType};
use crate::price_determination::{determine_price, PriceDeterminationResult};
use crate::price_range::{VolatilityGuard, VolatilityInterruption};
use crate::state::{AuctionState, InvalidTransition, StateMachine, TradingFormState, Transition};
use crate::types::{OrderId, Price, Timestamp};
use crate::validators::ValidatorChain;
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// What a phase operation did: the transitions it performed plus any phase
/// side products.
#[derive(Debug, Default)]
pub struct AuctionPhaseReport {
    pub transitions: Vec<Transition<AuctionState>>,
    pub determination: Option<PriceDeterminationResult>,
    pub interruption: Option<VolatilityInterruption>,
    pub balancing: Option<BalancingReport>,
}

/// Surplus left open after the last price determination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalancingReport {
    pub bid_surplus: Decimal,
    pub ask_surplus: Decimal,
}

#[derive(Debug)]
pub struct Auction {
    machine: StateMachine<AuctionState>,
    book: OrderBook,
    validators: ValidatorChain,
    reference_price: Option<Price>,
    last_determination: Option<PriceDeterminationResult>,
}

impl Auction {
    pub fn new(validators: ValidatorChain) -> Self {
        Self {
            machine: StateMachine::new(
                AuctionState::default_state(),
                AuctionState::transition_table(),
            ),
            book: OrderBook::new(),
            validators,
            reference_price: None,
            last_determination: None,
        }
    }

    pub fn current_state(&self) -> AuctionState {
        self.machine.current_state()
    }

    pub fn is_active(&self) -> bool {
        self.current_state().is_active()
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn reference_price(&self) -> Option<Price> {
        self.reference_price
    }

    pub fn set_reference_price(&mut self, price: Option<Price>) {
        self.reference_price = price;
    }

    pub fn last_determination(&self) -> Option<&PriceDeterminationResult> {
        self.last_determination.as_ref()
    }

    /// Open the call phase. The book is left only partially closed: cancels
    /// and modifications stay possible, new entries come in through `submit`.
    pub fn start_call_phase(
        &mut self,
    ) -> Result<AuctionPhaseReport, InvalidTransition<AuctionState>> {
        let mut report = AuctionPhaseReport::default();
        self.transition(AuctionState::CallRunning, &mut report)?;
        self.book.close_partially();
        Ok(report)
    }

    /// Close the call phase and the book with it.
    pub fn stop_call_phase(
        &mut self,
    ) -> Result<AuctionPhaseReport, InvalidTransition<AuctionState>> {
        let mut report = AuctionPhaseReport::default();
        self.transition(AuctionState::CallStopped, &mut report)?;
        self.book.close_fully();
        Ok(report)
    }

    /// Run price determination over the closed book. The indicative price is
    /// checked against the volatility guard; an interruption is reported, not
    /// raised, and the phase still completes.
    pub fn determine_price(
        &mut self,
        guard: Option<&VolatilityGuard>,
        now: Timestamp,
    ) -> Result<AuctionPhaseReport, InvalidTransition<AuctionState>> {
        let mut report = AuctionPhaseReport::default();
        self.transition(AuctionState::PriceDeterminationRunning, &mut report)?;

        let result = determine_price(&self.book, self.reference_price);
        if let (Some(price), Some(guard)) = (result.auction_price, guard) {
            report.interruption = guard.check(price, now);
        }
        self.last_determination = Some(result.clone());
        report.determination = Some(result);

        self.transition(AuctionState::PriceDeterminationStopped, &mut report)?;
        Ok(report)
    }

    /// Orderbook balancing: exposes the surplus left by the last price
    /// determination while the book stays closed.
    pub fn balance_orderbook(
        &mut self,
    ) -> Result<AuctionPhaseReport, InvalidTransition<AuctionState>> {
        let mut report = AuctionPhaseReport::default();
        self.transition(AuctionState::OrderbookBalancingRunning, &mut report)?;

        report.balancing = self.last_determination.as_ref().map(|d| BalancingReport {
            bid_surplus: d.bid_surplus(),
            ask_surplus: d.ask_surplus(),
        });

        self.transition(AuctionState::OrderbookBalancingStopped, &mut report)?;
        Ok(report)
    }

    /// Return to the idle state from any stopped phase.
    pub fn close(&mut self) -> Result<AuctionPhaseReport, InvalidTransition<AuctionState>> {
        let mut report = AuctionPhaseReport::default();
        self.transition(AuctionState::Inactive, &mut report)?;
        Ok(report)
    }

    /// Order submission boundary. New entries need a running call phase;
    /// modifications and cancels only need a partially closed book.
    pub fn submit(&mut self, order: Order, submit_type: SubmitType, today: NaiveDate) -> SubmitOutcome {
        match submit_type {
            SubmitType::New => {
                if self.current_state() != AuctionState::CallRunning {
                    return SubmitOutcome::Reject(RejectReason::CallPhaseNotOpen);
                }
                if let Some(reason) = self.validators.validate(&order, today) {
                    return SubmitOutcome::Reject(reason);
                }
                self.book.insert(order);
                SubmitOutcome::Ok
            }
            SubmitType::Modify => {
                if self.book.state() == BookState::FullyClosed {
                    return SubmitOutcome::Reject(RejectReason::CallPhaseNotOpen);
                }
                if let Some(reason) = self.validators.validate(&order, today) {
                    return SubmitOutcome::Reject(reason);
                }
                if self.book.replace(order).is_none() {
                    return SubmitOutcome::Error("no standing order under that id".into());
                }
                SubmitOutcome::Ok
            }
            SubmitType::Cancel => {
                if self.book.state() == BookState::FullyClosed {
                    return SubmitOutcome::Reject(RejectReason::CallPhaseNotOpen);
                }
                if self.cancel(order.id).is_none() {
                    return SubmitOutcome::Error("no standing order under that id".into());
                }
                SubmitOutcome::Ok
            }
        }
    }

    pub fn cancel(&mut self, order_id: OrderId) -> Option<Order> {
        self.book.remove(order_id)
    }

    fn transition(
        &mut self,
        target: AuctionState,
        report: &mut AuctionPhaseReport,
    ) -> Result<(), InvalidTransition<AuctionState>> {
        if let Some(change) = self.machine.transition_to(target)? {
            report.transitions.push(change);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price_range::PriceRange;
    use crate::types::{MemberId, Side};
    use crate::validators::standard_chain;
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    fn auction() -> Auction {
        Auction::new(standard_chain(dec!(1)))
    }

    fn limit(id: u64, side: Side, px: Decimal, qty: Decimal) -> Order {
        Order::new_limit(
            OrderId(id),
            MemberId(1),
            side,
            qty,
            Price::new_unchecked(px),
            Timestamp::from_millis(id as i64),
        )
    }

    #[test]
    fn new_orders_need_a_running_call_phase() {
        let mut auction = auction();
        let order = limit(1, Side::Buy, dec!(200), dec!(100));

        let outcome = auction.submit(order.clone(), SubmitType::New, today());
        assert_eq!(outcome.reject_reason(), Some(RejectReason::CallPhaseNotOpen));

        auction.start_call_phase().unwrap();
        assert!(auction.submit(order, SubmitType::New, today()).is_ok());
        assert_eq!(auction.book().order_count(), 1);
    }

    #[test]
    fn call_phase_leaves_book_partially_closed() {
        let mut auction = auction();
        auction.start_call_phase().unwrap();
        assert_eq!(auction.book().state(), BookState::PartiallyClosed);

        auction.submit(limit(1, Side::Buy, dec!(200), dec!(100)), SubmitType::New, today());
        auction.stop_call_phase().unwrap();
        assert_eq!(auction.book().state(), BookState::FullyClosed);

        // fully closed: not even cancels go through
        let outcome = auction.submit(limit(1, Side::Buy, dec!(200), dec!(100)), SubmitType::Cancel, today());
        assert_eq!(outcome.reject_reason(), Some(RejectReason::CallPhaseNotOpen));
    }

    #[test]
    fn modify_and_cancel_during_call_phase() {
        let mut auction = auction();
        auction.start_call_phase().unwrap();
        auction.submit(limit(1, Side::Buy, dec!(200), dec!(100)), SubmitType::New, today());

        let modified = limit(1, Side::Buy, dec!(201), dec!(50));
        assert!(auction.submit(modified, SubmitType::Modify, today()).is_ok());
        assert_eq!(auction.book().get(OrderId(1)).unwrap().quantity, dec!(50));

        assert!(auction
            .submit(limit(1, Side::Buy, dec!(201), dec!(50)), SubmitType::Cancel, today())
            .is_ok());
        assert!(auction.book().is_empty());

        // cancel of an unknown order is an error, not a reject
        let outcome = auction.submit(limit(9, Side::Buy, dec!(201), dec!(50)), SubmitType::Cancel, today());
        assert!(matches!(outcome, SubmitOutcome::Error(_)));
    }

    #[test]
    fn full_lifecycle_with_price_determination() {
        let mut auction = auction();
        auction.start_call_phase().unwrap();
        auction.submit(limit(1, Side::Buy, dec!(202), dec!(400)), SubmitType::New, today());
        auction.submit(limit(2, Side::Buy, dec!(201), dec!(200)), SubmitType::New, today());
        auction.submit(limit(3, Side::Sell, dec!(199), dec!(300)), SubmitType::New, today());
        auction.submit(limit(4, Side::Sell, dec!(198), dec!(200)), SubmitType::New, today());
        auction.stop_call_phase().unwrap();

        let report = auction.determine_price(None, Timestamp::from_millis(0)).unwrap();
        assert_eq!(auction.current_state(), AuctionState::PriceDeterminationStopped);
        assert_eq!(report.transitions.len(), 2);

        let result = report.determination.unwrap();
        assert_eq!(result.auction_price, Some(Price::new_unchecked(dec!(201))));
        assert_eq!(result.bid_surplus(), dec!(100));

        let report = auction.balance_orderbook().unwrap();
        let balancing = report.balancing.unwrap();
        assert_eq!(balancing.bid_surplus, dec!(100));
        assert_eq!(balancing.ask_surplus, dec!(0));

        auction.close().unwrap();
        assert_eq!(auction.current_state(), AuctionState::Inactive);
    }

    #[test]
    fn determination_outside_guard_reports_interruption() {
        let guard = VolatilityGuard::new(
            PriceRange::new(Price::new_unchecked(dec!(100)), dec!(5)),
            PriceRange::new(Price::new_unchecked(dec!(100)), dec!(2)),
        )
        .unwrap();

        let mut auction = auction();
        auction.start_call_phase().unwrap();
        auction.submit(limit(1, Side::Buy, dec!(200), dec!(100)), SubmitType::New, today());
        auction.submit(limit(2, Side::Sell, dec!(200), dec!(100)), SubmitType::New, today());
        auction.stop_call_phase().unwrap();

        let report = auction
            .determine_price(Some(&guard), Timestamp::from_millis(5))
            .unwrap();
        let interruption = report.interruption.unwrap();
        assert_eq!(interruption.indicative_price, Price::new_unchecked(dec!(200)));
        // the phase still completed
        assert_eq!(auction.current_state(), AuctionState::PriceDeterminationStopped);
    }

    #[test]
    fn phase_operations_fail_out_of_order() {
        let mut auction = auction();
        assert!(auction.stop_call_phase().is_err());
        assert!(auction.balance_orderbook().is_ok()); // Inactive -> balancing is in the table
        let mut auction = Auction::new(standard_chain(dec!(1)));
        auction.start_call_phase().unwrap();
        assert!(auction.close().is_err()); // CallRunning only reaches CallStopped
        assert_eq!(auction.current_state(), AuctionState::CallRunning);
    }
}
