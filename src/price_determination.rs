//! Auction clearing-price determination.
//!
//! Runs over a closed order book: finds the worst matchable price on each
//! side, sums the quantity at least as aggressive as it, and picks the
//! auction price by surplus or by proximity to an external reference price.
//! Market orders rank best on their side and contribute quantity but never a
//! price; a side is "empty" here when it holds no limit price at all.

use crate::order::OrderBook;
use crate::types::{Price, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Outcome of one price determination run.
///
/// `bid_price` / `ask_price` are the worst matchable prices (absent when the
/// book does not cross or a side has no limits); surpluses are derived, so
/// they can never both be positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceDeterminationResult {
    pub bid_price: Option<Price>,
    pub ask_price: Option<Price>,
    pub bid_quantity: Decimal,
    pub ask_quantity: Decimal,
    pub auction_price: Option<Price>,
}

impl PriceDeterminationResult {
    pub fn bid_surplus(&self) -> Decimal {
        (self.bid_quantity - self.ask_quantity).max(Decimal::ZERO)
    }

    pub fn ask_surplus(&self) -> Decimal {
        (self.ask_quantity - self.bid_quantity).max(Decimal::ZERO)
    }
}

/// Derive the auction price and matchable quantities from a closed book.
pub fn determine_price(book: &OrderBook, reference: Option<Price>) -> PriceDeterminationResult {
    let bid_prices = book.limit_prices(Side::Buy);
    let ask_prices = book.limit_prices(Side::Sell);

    let (bid_top, ask_top) = match (bid_prices.first(), ask_prices.first()) {
        (Some(&bid_top), Some(&ask_top)) => (bid_top, ask_top),
        // No limit price on either side (only market orders, or nothing at
        // all): the auction price defaults to the reference and the raw
        // unfiltered quantities are reported, no crossing check applied.
        // With limits on exactly one side no price can be derived from
        // crossing either; same degenerate treatment, reference fallback.
        _ => {
            return PriceDeterminationResult {
                bid_price: None,
                ask_price: None,
                bid_quantity: book.side_quantity(Side::Buy),
                ask_quantity: book.side_quantity(Side::Sell),
                auction_price: reference,
            };
        }
    };

    let worst_bid = worst_matchable(&bid_prices, ask_top, |p| p >= ask_top);
    let worst_ask = worst_matchable(&ask_prices, bid_top, |p| p <= bid_top);

    match (worst_bid, worst_ask) {
        (Some(wb), Some(wa)) => {
            let bid_quantity = book.matchable_quantity(Side::Buy, wb);
            let ask_quantity = book.matchable_quantity(Side::Sell, wa);
            let bid_surplus = (bid_quantity - ask_quantity).max(Decimal::ZERO);
            let ask_surplus = (ask_quantity - bid_quantity).max(Decimal::ZERO);

            let auction_price = match reference {
                None => {
                    if bid_surplus > ask_surplus {
                        wb
                    } else {
                        wa
                    }
                }
                Some(r) => closest_to_reference(wb, wa, r),
            };

            PriceDeterminationResult {
                bid_price: Some(wb),
                ask_price: Some(wa),
                bid_quantity,
                ask_quantity,
                auction_price: Some(auction_price),
            }
        }
        // The book does not cross. With a reference price the auction price
        // falls to whichever best limit sits closer to it; without one no
        // price can be derived.
        _ => PriceDeterminationResult {
            bid_price: None,
            ask_price: None,
            bid_quantity: Decimal::ZERO,
            ask_quantity: Decimal::ZERO,
            auction_price: reference.map(|r| closest_to_reference(bid_top, ask_top, r)),
        },
    }
}

// Linear nearest-value search over prices already in rank order: distance to
// the target shrinks toward the matchable boundary and grows past it, so the
// scan stops as soon as it starts increasing.
fn worst_matchable(
    prices: &[Price],
    target: Price,
    matchable: impl Fn(Price) -> bool,
) -> Option<Price> {
    let mut found = None;
    let mut last_distance: Option<Decimal> = None;
    for &price in prices {
        let distance = price.distance(target);
        if let Some(previous) = last_distance {
            if distance > previous {
                break;
            }
        }
        last_distance = Some(distance);
        if matchable(price) {
            found = Some(price);
        }
    }
    found
}

// Exact equality with the reference wins outright; otherwise the smaller
// absolute distance, ties taking the higher of the two candidates.
fn closest_to_reference(a: Price, b: Price, reference: Price) -> Price {
    if a == reference {
        return a;
    }
    if b == reference {
        return b;
    }
    let da = a.distance(reference);
    let db = b.distance(reference);
    if da < db {
        a
    } else if db < da {
        b
    } else {
        a.max(b)
    }
}
