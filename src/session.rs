// 9.0: serialized dispatch for one market. the session owns both trading
// forms, the volatility guard, the FIFO wait-trigger queue and the pending
// command queue, and is their only writer. commands drain strictly one at a
// time, so state transitions are totally ordered without any locking.

use crate::auction::{Auction, AuctionPhaseReport};
use crate::calendar::{RunType, TradingCalendar, TradingPhaseTrigger};
use crate::continuous::ContinuousTrading;
use crate::events::{EventSink, MarketEvent, RunTypeChangedEvent, StateChangedEvent};
use crate::price_range::VolatilityGuard;
use crate::state::{
    AuctionState, ContinuousState, InvalidTransition, Phase, Transition,
};
use crate::types::Timestamp;
use std::collections::VecDeque;
use tracing::{debug, warn};

// 9.1: the concrete operation a trigger's target state resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOp {
    StartCallPhase,
    StopCallPhase,
    DeterminePrice,
    BalanceOrderbook,
    CloseAuction,
    StartContinuous,
    StopContinuous,
}

/// A resolved, queueable state-change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseCommand {
    pub op: PhaseOp,
    pub run_type: Option<RunType>,
}

impl PhaseCommand {
    pub fn new(op: PhaseOp) -> Self {
        Self { op, run_type: None }
    }
}

/// Map an abstract "move to state X" trigger onto the concrete trading-form
/// operation. Unmapped targets are logged and dropped, never fatal.
pub fn resolve_command(trigger: &TradingPhaseTrigger) -> Option<PhaseCommand> {
    let op = match trigger.target {
        Phase::Auction(AuctionState::CallRunning) => PhaseOp::StartCallPhase,
        Phase::Auction(AuctionState::CallStopped) => PhaseOp::StopCallPhase,
        Phase::Auction(AuctionState::PriceDeterminationRunning) => PhaseOp::DeterminePrice,
        Phase::Auction(AuctionState::OrderbookBalancingRunning) => PhaseOp::BalanceOrderbook,
        Phase::Auction(AuctionState::Inactive) => PhaseOp::CloseAuction,
        Phase::Continuous(ContinuousState::Running) => PhaseOp::StartContinuous,
        Phase::Continuous(ContinuousState::Stopped) => PhaseOp::StopContinuous,
        target => {
            warn!(?target, "no operation mapped to trigger target, dropping");
            return None;
        }
    };
    Some(PhaseCommand {
        op,
        run_type: trigger.run_type,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("auction: {0}")]
    Auction(#[from] InvalidTransition<AuctionState>),
    #[error("continuous trading: {0}")]
    Continuous(#[from] InvalidTransition<ContinuousState>),
}

// 9.2: the session proper.
pub struct TradingSession {
    auction: Auction,
    continuous: ContinuousTrading,
    guard: Option<VolatilityGuard>,
    sink: Box<dyn EventSink>,
    wait_queue: VecDeque<TradingPhaseTrigger>,
    pending: VecDeque<PhaseCommand>,
    run_type: Option<RunType>,
    current_time: Timestamp,
}

impl std::fmt::Debug for TradingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingSession")
            .field("auction", &self.auction.current_state())
            .field("continuous", &self.continuous.current_state())
            .field("outstanding_waits", &self.wait_queue.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl TradingSession {
    pub fn new(auction: Auction, sink: Box<dyn EventSink>) -> Self {
        Self {
            auction,
            continuous: ContinuousTrading::new(),
            guard: None,
            sink,
            wait_queue: VecDeque::new(),
            pending: VecDeque::new(),
            run_type: None,
            current_time: Timestamp::from_millis(0),
        }
    }

    pub fn with_guard(mut self, guard: VolatilityGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn auction(&self) -> &Auction {
        &self.auction
    }

    pub fn auction_mut(&mut self) -> &mut Auction {
        &mut self.auction
    }

    pub fn continuous(&self) -> &ContinuousTrading {
        &self.continuous
    }

    pub fn continuous_mut(&mut self) -> &mut ContinuousTrading {
        &mut self.continuous
    }

    pub fn guard(&self) -> Option<&VolatilityGuard> {
        self.guard.as_ref()
    }

    pub fn run_type(&self) -> Option<RunType> {
        self.run_type
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn advance_time(&mut self, millis: i64) {
        self.current_time = Timestamp::from_millis(self.current_time.as_millis() + millis);
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    /// Arm the calendar's wait-for-state triggers, in declaration order.
    /// Only the head of this queue is ever eligible to fire.
    pub fn load_wait_triggers(&mut self, calendar: &TradingCalendar) {
        self.wait_queue = calendar
            .triggers()
            .filter(|t| t.predecessor().is_some())
            .copied()
            .collect();
    }

    pub fn outstanding_wait_triggers(&self) -> usize {
        self.wait_queue.len()
    }

    pub fn submit(&mut self, command: PhaseCommand) {
        self.pending.push_back(command);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn take_pending(&mut self) -> Option<PhaseCommand> {
        self.pending.pop_front()
    }

    /// Drain the pending queue serially. Commands enqueued by wait-trigger
    /// firings run in submission order after everything already queued.
    /// This is the deterministic, synchronous scheduler tests run against.
    pub fn run_until_idle(&mut self) {
        while let Some(command) = self.pending.pop_front() {
            self.execute(command);
        }
    }

    /// Execute one command. A failed transition is local to this command:
    /// logged, swallowed, and the session keeps going.
    pub fn execute(&mut self, command: PhaseCommand) {
        if let Some(run_type) = command.run_type {
            self.change_run_type(run_type);
        }
        if let Err(e) = self.dispatch(command.op) {
            warn!(op = ?command.op, error = %e, "phase command failed");
        }
    }

    fn dispatch(&mut self, op: PhaseOp) -> Result<(), SessionError> {
        match op {
            PhaseOp::StartCallPhase => {
                self.suspend_continuous_for_auction();
                let report = self.auction.start_call_phase()?;
                self.absorb_auction_report(report);
            }
            PhaseOp::StopCallPhase => {
                let report = self.auction.stop_call_phase()?;
                self.absorb_auction_report(report);
            }
            PhaseOp::DeterminePrice => {
                self.suspend_continuous_for_auction();
                let now = self.current_time;
                let report = self.auction.determine_price(self.guard.as_ref(), now)?;
                self.absorb_auction_report(report);
            }
            PhaseOp::BalanceOrderbook => {
                self.suspend_continuous_for_auction();
                let report = self.auction.balance_orderbook()?;
                self.absorb_auction_report(report);
            }
            PhaseOp::CloseAuction => {
                let report = self.auction.close()?;
                self.absorb_auction_report(report);
            }
            PhaseOp::StartContinuous => {
                // never two active forms: the auction must close first. if it
                // cannot (mid-phase), continuous stays down.
                if self.auction.is_active() {
                    let report = self.auction.close()?;
                    self.absorb_auction_report(report);
                }
                let change = self.continuous.start()?;
                self.absorb_continuous_transition(change);
            }
            PhaseOp::StopContinuous => {
                let change = self.continuous.stop()?;
                self.absorb_continuous_transition(change);
            }
        }
        Ok(())
    }

    // an auction phase starting while continuous trading runs interrupts it.
    fn suspend_continuous_for_auction(&mut self) {
        if !self.continuous.is_active() {
            return;
        }
        match self.continuous.stop() {
            Ok(change) => self.absorb_continuous_transition(change),
            Err(e) => warn!(error = %e, "could not suspend continuous trading"),
        }
    }

    fn absorb_auction_report(&mut self, report: AuctionPhaseReport) {
        for change in &report.transitions {
            self.notify_state_change(
                Phase::Auction(change.from),
                Phase::Auction(change.to),
            );
        }
        if let Some(interruption) = report.interruption {
            self.sink
                .publish(MarketEvent::VolatilityInterrupted(interruption));
        }
        if let Some(determination) = &report.determination {
            if let Some(price) = determination.auction_price {
                // the auction price becomes the next reference, for pricing
                // and for the dynamic corridor
                self.auction.set_reference_price(Some(price));
                if let Some(guard) = self.guard.as_mut() {
                    if let Err(e) = guard.update_dynamic(price) {
                        warn!(error = %e, "dynamic range kept, new reference rejected");
                    }
                }
            }
        }
    }

    fn absorb_continuous_transition(&mut self, change: Option<Transition<ContinuousState>>) {
        if let Some(change) = change {
            self.notify_state_change(
                Phase::Continuous(change.from),
                Phase::Continuous(change.to),
            );
        }
    }

    // every real transition lands here: notify the sink, then check the head
    // of the wait queue. only the head is eligible; a change that does not
    // match it is recorded and nothing fires.
    fn notify_state_change(&mut self, previous: Phase, current: Phase) {
        self.sink.publish(MarketEvent::StateChanged(StateChangedEvent {
            form: current.form(),
            previous,
            current,
            timestamp: self.current_time,
        }));

        match self.wait_queue.front() {
            Some(head) if head.predecessor() == Some(current) => {
                let trigger = self.wait_queue.pop_front().expect("head just checked");
                if let Some(command) = resolve_command(&trigger) {
                    self.pending.push_back(command);
                }
            }
            Some(head) => {
                debug!(?current, waiting_on = ?head.predecessor(), "state change recorded");
            }
            None => {}
        }
    }

    fn change_run_type(&mut self, next: RunType) {
        if self.run_type == Some(next) {
            return;
        }
        self.sink.publish(MarketEvent::RunTypeChanged(RunTypeChangedEvent {
            previous: self.run_type,
            current: next,
        }));
        self.run_type = Some(next);
    }
}
