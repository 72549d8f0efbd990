//! Table-driven trading-form state machines.
//!
//! A trading form is an explicit enum of phases plus an injected
//! allowed-transition table — one generic machine, one instantiation per form,
//! no inheritance. Self-transitions are always permitted as silent no-ops;
//! anything else must be in the table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// A closed set of named phases for one trading form.
pub trait TradingFormState: Copy + Eq + Hash + fmt::Debug {
    /// Whether an instrument in this phase counts as actively trading.
    fn is_active(&self) -> bool;
}

/// Allowed transitions: state → set of states directly reachable from it.
/// Total over every state that can become current.
#[derive(Debug, Clone)]
pub struct TransitionTable<S: TradingFormState> {
    allowed: HashMap<S, Vec<S>>,
}

impl<S: TradingFormState> TransitionTable<S> {
    pub fn new(entries: impl IntoIterator<Item = (S, Vec<S>)>) -> Self {
        Self {
            allowed: entries.into_iter().collect(),
        }
    }

    pub fn allows(&self, from: S, to: S) -> bool {
        self.allowed
            .get(&from)
            .map_or(false, |targets| targets.contains(&to))
    }

    pub fn allowed_from(&self, from: S) -> &[S] {
        self.allowed.get(&from).map_or(&[], Vec::as_slice)
    }

    pub fn has_entry(&self, state: S) -> bool {
        self.allowed.contains_key(&state)
    }
}

/// A completed state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<S> {
    pub from: S,
    pub to: S,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transition {from:?} -> {to:?} not allowed (allowed: {allowed:?})")]
pub struct InvalidTransition<S: fmt::Debug> {
    pub from: S,
    pub to: S,
    pub allowed: Vec<S>,
}

type StateListener<S> = Box<dyn FnMut(S, S) + Send>;

/// One trading form's current phase, its table, and an optional listener
/// notified on every real transition.
pub struct StateMachine<S: TradingFormState> {
    current: S,
    table: TransitionTable<S>,
    listener: Option<StateListener<S>>,
}

impl<S: TradingFormState> fmt::Debug for StateMachine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("current", &self.current)
            .finish()
    }
}

impl<S: TradingFormState> StateMachine<S> {
    /// The initial state must be an inactive/idle one.
    pub fn new(initial: S, table: TransitionTable<S>) -> Self {
        debug_assert!(!initial.is_active(), "initial state must be inactive");
        Self {
            current: initial,
            table,
            listener: None,
        }
    }

    pub fn set_listener(&mut self, listener: StateListener<S>) {
        self.listener = Some(listener);
    }

    pub fn current_state(&self) -> S {
        self.current
    }

    /// No-op when `target` equals the current state (no notification).
    /// Otherwise the transition must be in the table; failure leaves the
    /// state untouched and is never retried here.
    pub fn transition_to(&mut self, target: S) -> Result<Option<Transition<S>>, InvalidTransition<S>> {
        if target == self.current {
            return Ok(None);
        }
        if !self.table.allows(self.current, target) {
            return Err(InvalidTransition {
                from: self.current,
                to: target,
                allowed: self.table.allowed_from(self.current).to_vec(),
            });
        }
        let from = self.current;
        self.current = target;
        if let Some(listener) = self.listener.as_mut() {
            listener(from, target);
        }
        Ok(Some(Transition { from, to: target }))
    }
}

/// Auction lifecycle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuctionState {
    Inactive,
    CallRunning,
    CallStopped,
    PriceDeterminationRunning,
    PriceDeterminationStopped,
    OrderbookBalancingRunning,
    OrderbookBalancingStopped,
}

impl TradingFormState for AuctionState {
    fn is_active(&self) -> bool {
        !matches!(self, AuctionState::Inactive)
    }
}

impl AuctionState {
    pub fn transition_table() -> TransitionTable<AuctionState> {
        use AuctionState::*;
        TransitionTable::new([
            (
                Inactive,
                vec![CallRunning, PriceDeterminationRunning, OrderbookBalancingRunning],
            ),
            (CallRunning, vec![CallStopped]),
            (CallStopped, vec![Inactive, PriceDeterminationRunning]),
            (PriceDeterminationRunning, vec![PriceDeterminationStopped]),
            (
                PriceDeterminationStopped,
                vec![Inactive, OrderbookBalancingRunning],
            ),
            (OrderbookBalancingRunning, vec![OrderbookBalancingStopped]),
            (OrderbookBalancingStopped, vec![Inactive]),
        ])
    }

    pub fn default_state() -> AuctionState {
        AuctionState::Inactive
    }
}

/// Continuous-trading phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContinuousState {
    Stopped,
    Running,
}

impl TradingFormState for ContinuousState {
    fn is_active(&self) -> bool {
        matches!(self, ContinuousState::Running)
    }
}

impl ContinuousState {
    pub fn transition_table() -> TransitionTable<ContinuousState> {
        use ContinuousState::*;
        TransitionTable::new([(Stopped, vec![Running]), (Running, vec![Stopped])])
    }

    pub fn default_state() -> ContinuousState {
        ContinuousState::Stopped
    }
}

/// Which trading form a phase or trigger refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormKind {
    Auction,
    ContinuousTrading,
}

/// A phase of either trading form, used wherever the two must mix
/// (triggers, notifications, the wait queue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Auction(AuctionState),
    Continuous(ContinuousState),
}

impl Phase {
    pub fn form(&self) -> FormKind {
        match self {
            Phase::Auction(_) => FormKind::Auction,
            Phase::Continuous(_) => FormKind::ContinuousTrading,
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            Phase::Auction(s) => s.is_active(),
            Phase::Continuous(s) => s.is_active(),
        }
    }
}
