//! Pre-submission order validators.
//!
//! A validator either passes an order or names one reject reason from the
//! closed set. The chain runs them in order; the first hit wins. The core
//! treats this as a filter in front of the book, nothing more.

use crate::order::{Order, OrderType, RejectReason, TimeInForce};
use chrono::NaiveDate;
use rust_decimal::Decimal;

pub trait OrderValidator: Send {
    fn validate(&self, order: &Order, today: NaiveDate) -> Option<RejectReason>;
}

/// Ordered validator chain, first reject wins.
#[derive(Default)]
pub struct ValidatorChain {
    validators: Vec<Box<dyn OrderValidator>>,
}

impl std::fmt::Debug for ValidatorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorChain")
            .field("len", &self.validators.len())
            .finish()
    }
}

impl ValidatorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, validator: impl OrderValidator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    pub fn validate(&self, order: &Order, today: NaiveDate) -> Option<RejectReason> {
        self.validators
            .iter()
            .find_map(|v| v.validate(order, today))
    }
}

/// Rejects orders below the instrument's minimum size.
#[derive(Debug, Clone)]
pub struct MinimumSize {
    pub minimum: Decimal,
}

impl OrderValidator for MinimumSize {
    fn validate(&self, order: &Order, _today: NaiveDate) -> Option<RejectReason> {
        (order.quantity < self.minimum).then_some(RejectReason::BelowMinimumSize)
    }
}

/// A good-till-date order must carry a date, and that date must not already
/// have passed.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoodTillDateWindow;

impl OrderValidator for GoodTillDateWindow {
    fn validate(&self, order: &Order, today: NaiveDate) -> Option<RejectReason> {
        if order.time_in_force != TimeInForce::GoodTillDate {
            return None;
        }
        match order.good_till {
            Some(date) if date >= today => None,
            _ => Some(RejectReason::InvalidGoodTillDate),
        }
    }
}

/// Restricts which order types a phase accepts.
#[derive(Debug, Clone)]
pub struct PhaseOrderType {
    pub accepted: Vec<OrderType>,
}

impl OrderValidator for PhaseOrderType {
    fn validate(&self, order: &Order, _today: NaiveDate) -> Option<RejectReason> {
        (!self.accepted.contains(&order.order_type)).then_some(RejectReason::UnsupportedOrderType)
    }
}

/// The chain the auction call phase runs: limit and market entry only,
/// minimum size, sane good-till dates.
pub fn standard_chain(min_order_size: Decimal) -> ValidatorChain {
    ValidatorChain::new()
        .push(PhaseOrderType {
            accepted: vec![OrderType::Limit, OrderType::Market],
        })
        .push(MinimumSize {
            minimum: min_order_size,
        })
        .push(GoodTillDateWindow)
}
