//! Trading calendar: permitted trading dates plus the per-form trigger
//! schedules that describe one trading day declaratively.
//!
//! Calendars are built once before a session starts and are read-only during
//! it. Schedule problems are configuration errors and fail the build — a bad
//! calendar never reaches the runner.

use crate::state::{AuctionState, ContinuousState, FormKind, Phase};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The flavour of schedule a trigger belongs to. Carried on notifications so
/// sinks can tell an opening auction from a closing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunType {
    OpeningAuction,
    IntradayAuction,
    ClosingAuction,
    Continuous,
}

/// How a trigger fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitiatorType {
    FixedTime,
    WaitForState,
}

/// Exactly one of: a fixed wall-clock time, or a predecessor phase to wait
/// for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Initiator {
    FixedTime(DateTime<Utc>),
    WaitForState(Phase),
}

/// One step of a trading-day schedule: perform the transition to `target`
/// when the initiator fires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradingPhaseTrigger {
    pub target: Phase,
    pub run_type: Option<RunType>,
    pub initiator: Initiator,
}

impl TradingPhaseTrigger {
    pub fn at(time: DateTime<Utc>, target: Phase) -> Self {
        Self {
            target,
            run_type: None,
            initiator: Initiator::FixedTime(time),
        }
    }

    pub fn after(predecessor: Phase, target: Phase) -> Self {
        Self {
            target,
            run_type: None,
            initiator: Initiator::WaitForState(predecessor),
        }
    }

    pub fn with_run_type(mut self, run_type: RunType) -> Self {
        self.run_type = Some(run_type);
        self
    }

    pub fn form(&self) -> FormKind {
        self.target.form()
    }

    pub fn initiator_type(&self) -> InitiatorType {
        match self.initiator {
            Initiator::FixedTime(_) => InitiatorType::FixedTime,
            Initiator::WaitForState(_) => InitiatorType::WaitForState,
        }
    }

    pub fn fixed_time(&self) -> Option<DateTime<Utc>> {
        match self.initiator {
            Initiator::FixedTime(time) => Some(time),
            Initiator::WaitForState(_) => None,
        }
    }

    pub fn predecessor(&self) -> Option<Phase> {
        match self.initiator {
            Initiator::FixedTime(_) => None,
            Initiator::WaitForState(phase) => Some(phase),
        }
    }
}

/// The ordered trigger sequence of one trading form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSchedule {
    pub form: FormKind,
    pub triggers: Vec<TradingPhaseTrigger>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalendarError {
    #[error("first trigger of the {0:?} schedule must be fixed-time")]
    FirstTriggerNotFixedTime(FormKind),

    #[error("duration of {millis}ms is not representable")]
    DurationOverflow { millis: i64 },
}

/// Permitted trading dates plus the per-form schedules.
#[derive(Debug, Clone)]
pub struct TradingCalendar {
    trading_days: BTreeSet<NaiveDate>,
    schedules: Vec<FormSchedule>,
}

impl TradingCalendar {
    pub fn builder() -> CalendarBuilder {
        CalendarBuilder::default()
    }

    /// Exact calendar-date membership. No business-day inference.
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        self.trading_days.contains(&date)
    }

    pub fn trading_days(&self) -> impl Iterator<Item = &NaiveDate> {
        self.trading_days.iter()
    }

    pub fn schedules(&self) -> &[FormSchedule] {
        &self.schedules
    }

    /// All triggers in declaration order across forms.
    pub fn triggers(&self) -> impl Iterator<Item = &TradingPhaseTrigger> {
        self.schedules.iter().flat_map(|s| s.triggers.iter())
    }
}

#[derive(Debug, Default)]
pub struct CalendarBuilder {
    trading_days: BTreeSet<NaiveDate>,
    schedules: Vec<FormSchedule>,
}

impl CalendarBuilder {
    pub fn trading_day(mut self, date: NaiveDate) -> Self {
        self.trading_days.insert(date);
        self
    }

    pub fn trading_days(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.trading_days.extend(dates);
        self
    }

    pub fn schedule(mut self, schedule: FormSchedule) -> Self {
        self.schedules.push(schedule);
        self
    }

    /// A form cannot be kicked off by waiting on a state that does not yet
    /// exist, so every schedule must open with a fixed-time trigger.
    pub fn build(self) -> Result<TradingCalendar, CalendarError> {
        for schedule in &self.schedules {
            match schedule.triggers.first() {
                None => continue,
                Some(first) if first.initiator_type() == InitiatorType::FixedTime => continue,
                Some(_) => return Err(CalendarError::FirstTriggerNotFixedTime(schedule.form)),
            }
        }
        Ok(TradingCalendar {
            trading_days: self.trading_days,
            schedules: self.schedules,
        })
    }
}

/// Declares one auction run: call phase start, minimum call duration, a
/// bounded random extension on top of it, and whether orderbook balancing
/// follows price determination.
///
/// The extension is drawn uniformly from `[0, max)` milliseconds out of the
/// injected generator — callers needing reproducibility pass a seeded one.
#[derive(Debug, Clone)]
pub struct AuctionScheduleBuilder {
    call_start: DateTime<Utc>,
    min_call_duration_ms: i64,
    max_random_extension_ms: i64,
    with_balancing: bool,
    run_type: RunType,
}

impl AuctionScheduleBuilder {
    pub fn new(call_start: DateTime<Utc>) -> Self {
        Self {
            call_start,
            min_call_duration_ms: 0,
            max_random_extension_ms: 0,
            with_balancing: false,
            run_type: RunType::IntradayAuction,
        }
    }

    pub fn min_call_duration_ms(mut self, millis: i64) -> Self {
        self.min_call_duration_ms = millis;
        self
    }

    pub fn max_random_extension_ms(mut self, millis: i64) -> Self {
        self.max_random_extension_ms = millis;
        self
    }

    pub fn with_orderbook_balancing(mut self, enabled: bool) -> Self {
        self.with_balancing = enabled;
        self
    }

    pub fn run_type(mut self, run_type: RunType) -> Self {
        self.run_type = run_type;
        self
    }

    pub fn build(self, rng: &mut impl Rng) -> Result<FormSchedule, CalendarError> {
        let extension = if self.max_random_extension_ms > 0 {
            rng.gen_range(0..self.max_random_extension_ms)
        } else {
            0
        };
        let total_ms = self
            .min_call_duration_ms
            .checked_add(extension)
            .ok_or(CalendarError::DurationOverflow {
                millis: self.min_call_duration_ms,
            })?;
        let call_duration = Duration::try_milliseconds(total_ms)
            .ok_or(CalendarError::DurationOverflow { millis: total_ms })?;
        let call_stop = self
            .call_start
            .checked_add_signed(call_duration)
            .ok_or(CalendarError::DurationOverflow { millis: total_ms })?;

        let mut triggers = vec![
            TradingPhaseTrigger::at(self.call_start, Phase::Auction(AuctionState::CallRunning))
                .with_run_type(self.run_type),
            TradingPhaseTrigger::at(call_stop, Phase::Auction(AuctionState::CallStopped)),
            TradingPhaseTrigger::after(
                Phase::Auction(AuctionState::CallStopped),
                Phase::Auction(AuctionState::PriceDeterminationRunning),
            ),
        ];
        if self.with_balancing {
            triggers.push(TradingPhaseTrigger::after(
                Phase::Auction(AuctionState::PriceDeterminationStopped),
                Phase::Auction(AuctionState::OrderbookBalancingRunning),
            ));
        }
        Ok(FormSchedule {
            form: FormKind::Auction,
            triggers,
        })
    }
}

/// Declares the continuous-trading start/stop pair.
#[derive(Debug, Clone)]
pub struct ContinuousScheduleBuilder {
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
}

impl ContinuousScheduleBuilder {
    pub fn new(start: DateTime<Utc>, stop: DateTime<Utc>) -> Self {
        Self { start, stop }
    }

    pub fn build(self) -> FormSchedule {
        FormSchedule {
            form: FormKind::ContinuousTrading,
            triggers: vec![
                TradingPhaseTrigger::at(self.start, Phase::Continuous(ContinuousState::Running))
                    .with_run_type(RunType::Continuous),
                TradingPhaseTrigger::at(self.stop, Phase::Continuous(ContinuousState::Stopped)),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn nine_am() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
    }

    #[test]
    fn trading_day_membership_is_exact() {
        let calendar = TradingCalendar::builder()
            .trading_day(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap())
            .trading_day(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap())
            .build()
            .unwrap();

        assert!(calendar.is_trading_day(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()));
        assert!(!calendar.is_trading_day(NaiveDate::from_ymd_opt(2024, 3, 6).unwrap()));
    }

    #[test]
    fn auction_schedule_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let schedule = AuctionScheduleBuilder::new(nine_am())
            .min_call_duration_ms(120_000)
            .max_random_extension_ms(30_000)
            .with_orderbook_balancing(true)
            .run_type(RunType::OpeningAuction)
            .build(&mut rng)
            .unwrap();

        assert_eq!(schedule.form, FormKind::Auction);
        assert_eq!(schedule.triggers.len(), 4);

        let first = &schedule.triggers[0];
        assert_eq!(first.initiator_type(), InitiatorType::FixedTime);
        assert_eq!(first.target, Phase::Auction(AuctionState::CallRunning));
        assert_eq!(first.run_type, Some(RunType::OpeningAuction));
        assert_eq!(first.fixed_time(), Some(nine_am()));

        let stop = &schedule.triggers[1];
        let stop_time = stop.fixed_time().unwrap();
        let elapsed = (stop_time - nine_am()).num_milliseconds();
        assert!((120_000..150_000).contains(&elapsed), "stop at min+[0,max)");

        assert_eq!(
            schedule.triggers[2].predecessor(),
            Some(Phase::Auction(AuctionState::CallStopped))
        );
        assert_eq!(
            schedule.triggers[3].target,
            Phase::Auction(AuctionState::OrderbookBalancingRunning)
        );
    }

    #[test]
    fn seeded_rng_reproduces_the_schedule() {
        let build = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            AuctionScheduleBuilder::new(nine_am())
                .min_call_duration_ms(60_000)
                .max_random_extension_ms(10_000)
                .build(&mut rng)
                .unwrap()
        };
        assert_eq!(build(42), build(42));
    }

    #[test]
    fn no_extension_without_a_bound() {
        let mut rng = StdRng::seed_from_u64(1);
        let schedule = AuctionScheduleBuilder::new(nine_am())
            .min_call_duration_ms(60_000)
            .build(&mut rng)
            .unwrap();
        let stop = schedule.triggers[1].fixed_time().unwrap();
        assert_eq!((stop - nine_am()).num_milliseconds(), 60_000);
    }

    #[test]
    fn oversized_duration_is_a_build_error() {
        let mut rng = StdRng::seed_from_u64(1);
        let result = AuctionScheduleBuilder::new(nine_am())
            .min_call_duration_ms(i64::MAX)
            .build(&mut rng);
        assert!(matches!(
            result,
            Err(CalendarError::DurationOverflow { .. })
        ));
    }

    #[test]
    fn continuous_schedule_is_a_start_stop_pair() {
        let stop = Utc.with_ymd_and_hms(2024, 3, 4, 17, 30, 0).unwrap();
        let schedule = ContinuousScheduleBuilder::new(nine_am(), stop).build();

        assert_eq!(schedule.form, FormKind::ContinuousTrading);
        assert_eq!(schedule.triggers.len(), 2);
        assert_eq!(
            schedule.triggers[0].target,
            Phase::Continuous(ContinuousState::Running)
        );
        assert_eq!(
            schedule.triggers[1].target,
            Phase::Continuous(ContinuousState::Stopped)
        );
        assert!(schedule
            .triggers
            .iter()
            .all(|t| t.initiator_type() == InitiatorType::FixedTime));
    }

    #[test]
    fn calendar_rejects_wait_first_schedules() {
        let bad = FormSchedule {
            form: FormKind::Auction,
            triggers: vec![TradingPhaseTrigger::after(
                Phase::Auction(AuctionState::CallStopped),
                Phase::Auction(AuctionState::PriceDeterminationRunning),
            )],
        };
        let result = TradingCalendar::builder().schedule(bad).build();
        assert_eq!(
            result.unwrap_err(),
            CalendarError::FirstTriggerNotFixedTime(FormKind::Auction)
        );
    }
}
