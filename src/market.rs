//! Market configuration and the facade over one instrument's trading day.
//!
//! A market wires the pieces together: config, calendar, volatility guard,
//! trading session, runner. While the runner is up the session lives on the
//! event worker and is only reachable through the command queue; in between,
//! it is held here and can be driven deterministically.

use crate::auction::Auction;
use crate::calendar::TradingCalendar;
use crate::events::EventSink;
use crate::price_range::{PriceRange, RangeError, VolatilityGuard};
use crate::runner::{MarketRunner, ScheduleError};
use crate::session::{PhaseCommand, TradingSession};
use crate::types::Price;
use crate::validators::standard_chain;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Static per-instrument configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Instrument name, e.g. "SAP.DE".
    pub instrument: String,
    /// Minimum order size accepted into the book.
    pub min_order_size: Decimal,
    /// Deviation percentage of the static volatility corridor.
    pub static_deviation_pct: Decimal,
    /// Deviation percentage of the dynamic volatility corridor.
    pub dynamic_deviation_pct: Decimal,
}

impl MarketConfig {
    /// A plain cash-equity setup.
    pub fn equity(instrument: &str) -> Self {
        Self {
            instrument: instrument.to_string(),
            min_order_size: dec!(1),
            static_deviation_pct: dec!(10),
            dynamic_deviation_pct: dec!(2),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    #[error("market already started")]
    AlreadyStarted,

    #[error("market not started")]
    NotStarted,

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

pub struct Market {
    config: MarketConfig,
    calendar: TradingCalendar,
    session: Option<TradingSession>,
    runner: Option<MarketRunner>,
}

impl Market {
    /// Wire a market up. With a reference price both volatility corridors are
    /// centered on it at the configured deviations; without one the guard is
    /// absent and price determination runs unguarded.
    pub fn new(
        config: MarketConfig,
        calendar: TradingCalendar,
        reference_price: Option<Price>,
        sink: Box<dyn EventSink>,
    ) -> Result<Self, MarketError> {
        let mut auction = Auction::new(standard_chain(config.min_order_size));
        auction.set_reference_price(reference_price);

        let mut session = TradingSession::new(auction, sink);
        if let Some(reference) = reference_price {
            let guard = VolatilityGuard::new(
                PriceRange::new(reference, config.static_deviation_pct),
                PriceRange::new(reference, config.dynamic_deviation_pct),
            )?;
            session = session.with_guard(guard);
        }

        Ok(Self {
            config,
            calendar,
            session: Some(session),
            runner: None,
        })
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        self.calendar.is_trading_day(date)
    }

    /// The session, while no runner owns it.
    pub fn session(&self) -> Option<&TradingSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut TradingSession> {
        self.session.as_mut()
    }

    /// Hand the session to a runner for the given date.
    pub fn start(&mut self, date: NaiveDate, now: DateTime<Utc>) -> Result<(), MarketError> {
        if self.runner.is_some() {
            return Err(MarketError::AlreadyStarted);
        }
        let session = self.session.take().ok_or(MarketError::NotStarted)?;
        match MarketRunner::start(session, &self.calendar, date, now) {
            Ok(runner) => {
                self.runner = Some(runner);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.runner.as_ref().is_some_and(MarketRunner::is_running)
    }

    /// Feed a command to the running market's event queue.
    pub fn submit_command(&self, command: PhaseCommand) -> Result<(), MarketError> {
        let runner = self.runner.as_ref().ok_or(MarketError::NotStarted)?;
        runner.submit(command);
        Ok(())
    }

    /// Stop the runner and take the session back.
    pub fn stop(&mut self) -> Result<(), MarketError> {
        let runner = self.runner.take().ok_or(MarketError::NotStarted)?;
        self.session = runner.stop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SharedCollector;
    use crate::state::AuctionState;
    use chrono::TimeZone;

    fn empty_calendar() -> TradingCalendar {
        TradingCalendar::builder()
            .trading_day(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn construction_wires_guard_from_reference() {
        let market = Market::new(
            MarketConfig::equity("SAP.DE"),
            empty_calendar(),
            Some(Price::new_unchecked(dec!(200))),
            Box::new(SharedCollector::new()),
        )
        .unwrap();

        let guard = market.session().unwrap().guard().unwrap();
        assert_eq!(guard.static_range().lower(), dec!(180));
        assert_eq!(guard.static_range().upper(), dec!(220));
        assert_eq!(guard.dynamic_range().lower(), dec!(196));
        assert_eq!(guard.dynamic_range().upper(), dec!(204));
    }

    #[test]
    fn no_reference_no_guard() {
        let market = Market::new(
            MarketConfig::equity("SAP.DE"),
            empty_calendar(),
            None,
            Box::new(SharedCollector::new()),
        )
        .unwrap();
        assert!(market.session().unwrap().guard().is_none());
    }

    #[test]
    fn off_calendar_start_keeps_market_idle() {
        let sink = SharedCollector::new();
        let mut market = Market::new(
            MarketConfig::equity("SAP.DE"),
            empty_calendar(),
            None,
            Box::new(sink.clone()),
        )
        .unwrap();

        let now = Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap();
        market
            .start(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(), now)
            .unwrap();
        assert!(!market.is_running());

        market.stop().unwrap();
        assert!(sink.is_empty());
        assert_eq!(
            market.session().unwrap().auction().current_state(),
            AuctionState::Inactive
        );
    }

    #[test]
    fn double_start_is_an_error() {
        let mut market = Market::new(
            MarketConfig::equity("SAP.DE"),
            empty_calendar(),
            None,
            Box::new(SharedCollector::new()),
        )
        .unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();

        market.start(date, now).unwrap();
        assert!(matches!(
            market.start(date, now),
            Err(MarketError::AlreadyStarted)
        ));
        market.stop().unwrap();
        assert!(matches!(market.stop(), Err(MarketError::NotStarted)));
    }
}
