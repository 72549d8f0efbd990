//! Price corridors and the volatility interruption safeguard.
//!
//! Two independently maintained ranges — static and dynamic — are kept around
//! their own reference prices. Trading is interrupted when an indicative price
//! falls inside neither. The pair must always overlap; an update that would
//! pull them apart is rejected and leaves both ranges untouched.

use crate::types::{Price, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Symmetric percentage band around a reference price.
///
/// Bounds are `ref * (100 ∓ deviation) / 100`; containment is closed on both
/// ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    reference: Price,
    deviation_pct: Decimal,
    lower: Decimal,
    upper: Decimal,
}

impl PriceRange {
    pub fn new(reference: Price, deviation_pct: Decimal) -> Self {
        let hundred = dec!(100);
        let lower = reference.value() * (hundred - deviation_pct) / hundred;
        let upper = reference.value() * (hundred + deviation_pct) / hundred;
        Self {
            reference,
            deviation_pct,
            lower,
            upper,
        }
    }

    pub fn reference(&self) -> Price {
        self.reference
    }

    pub fn deviation_pct(&self) -> Decimal {
        self.deviation_pct
    }

    pub fn lower(&self) -> Decimal {
        self.lower
    }

    pub fn upper(&self) -> Decimal {
        self.upper
    }

    /// Closed-interval containment, boundaries inclusive.
    pub fn contains(&self, price: Price) -> bool {
        self.lower <= price.value() && price.value() <= self.upper
    }

    /// Two ranges intersect iff neither is strictly above nor strictly below
    /// the other, boundaries inclusive.
    pub fn intersects(&self, other: &PriceRange) -> bool {
        !(self.lower > other.upper || self.upper < other.lower)
    }
}

/// Raised when an indicative price escapes both corridors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityInterruption {
    pub timestamp: Timestamp,
    pub indicative_price: Price,
    pub static_range: PriceRange,
    pub dynamic_range: PriceRange,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RangeError {
    #[error("reference price {reference} would leave the static and dynamic ranges disjoint")]
    InvalidReferencePrice { reference: Price },
}

/// Joint safeguard over the static and dynamic ranges.
#[derive(Debug, Clone)]
pub struct VolatilityGuard {
    static_range: PriceRange,
    dynamic_range: PriceRange,
}

impl VolatilityGuard {
    /// Fails when the two initial ranges do not overlap.
    pub fn new(static_range: PriceRange, dynamic_range: PriceRange) -> Result<Self, RangeError> {
        if !static_range.intersects(&dynamic_range) {
            return Err(RangeError::InvalidReferencePrice {
                reference: dynamic_range.reference(),
            });
        }
        Ok(Self {
            static_range,
            dynamic_range,
        })
    }

    pub fn static_range(&self) -> &PriceRange {
        &self.static_range
    }

    pub fn dynamic_range(&self) -> &PriceRange {
        &self.dynamic_range
    }

    /// Interruption iff the price is inside neither range.
    pub fn check(&self, indicative: Price, timestamp: Timestamp) -> Option<VolatilityInterruption> {
        if self.static_range.contains(indicative) || self.dynamic_range.contains(indicative) {
            return None;
        }
        Some(VolatilityInterruption {
            timestamp,
            indicative_price: indicative,
            static_range: self.static_range,
            dynamic_range: self.dynamic_range,
        })
    }

    /// Rebuild the static range around a new reference at the same deviation.
    /// Rejected, with neither range mutated, if the replacement no longer
    /// overlaps the dynamic range.
    pub fn update_static(&mut self, reference: Price) -> Result<(), RangeError> {
        let candidate = PriceRange::new(reference, self.static_range.deviation_pct());
        if !candidate.intersects(&self.dynamic_range) {
            return Err(RangeError::InvalidReferencePrice { reference });
        }
        self.static_range = candidate;
        Ok(())
    }

    /// Rebuild the dynamic range around a new reference at the same deviation.
    pub fn update_dynamic(&mut self, reference: Price) -> Result<(), RangeError> {
        let candidate = PriceRange::new(reference, self.dynamic_range.deviation_pct());
        if !candidate.intersects(&self.static_range) {
            return Err(RangeError::InvalidReferencePrice { reference });
        }
        self.dynamic_range = candidate;
        Ok(())
    }
}
