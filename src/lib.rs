// venue-core: securities trading venue core engine.
// phase-first architecture: auctions, schedules, and price safeguards take
// priority. all state is in-memory and transient for one trading session.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: OrderId, MemberId, Side, Price, Timestamp
//   2.x  order.rs: order records, ranked auction book, trades
//   3.x  price_range.rs: static/dynamic corridors, volatility guard
//   4.x  price_determination.rs: auction clearing price + surpluses
//   5.x  midpoint.rs: quantity-stealing midpoint matcher
//   6.x  state.rs: table-driven trading-form state machines
//   7.x  auction.rs: auction form: call phase, determination, balancing
//   7.5x continuous.rs: continuous form: start/stop, midpoint entry
//   8.x  calendar.rs: trading days, phase triggers, schedule builders
//   9.x  session.rs: command resolution, FIFO wait triggers, dispatch
//   9.5x runner.rs: event + timer workers, start/stop lifecycle
//   10.x events.rs: notification boundary and sinks
//   11.x validators.rs: pre-submission filter chain
//   12.x market.rs: per-instrument facade and config

// core trading modules
pub mod auction;
pub mod continuous;
pub mod midpoint;
pub mod order;
pub mod price_determination;
pub mod state;
pub mod types;

// safeguards and scheduling
pub mod calendar;
pub mod price_range;
pub mod runner;
pub mod session;

// integration modules
pub mod events;
pub mod market;
pub mod validators;

// re exports for convenience
pub use auction::{Auction, AuctionPhaseReport, BalancingReport};
pub use calendar::{
    AuctionScheduleBuilder, CalendarError, ContinuousScheduleBuilder, FormSchedule, Initiator,
    InitiatorType, RunType, TradingCalendar, TradingPhaseTrigger,
};
pub use continuous::{ContinuousTrading, MidpointEntry};
pub use events::{
    EventCollector, EventSink, MarketEvent, NullSink, RunTypeChangedEvent, SharedCollector,
    StateChangedEvent,
};
pub use market::{Market, MarketConfig, MarketError};
pub use midpoint::{match_midpoint, ExecutionChance, MidpointMatch, QuantityCollector};
pub use order::{
    BookState, MatchError, Order, OrderBook, OrderType, RejectReason, SubmitOutcome, SubmitType,
    TimeInForce, Trade,
};
pub use price_determination::{determine_price, PriceDeterminationResult};
pub use price_range::{PriceRange, RangeError, VolatilityGuard, VolatilityInterruption};
pub use runner::{MarketRunner, ScheduleError};
pub use session::{resolve_command, PhaseCommand, PhaseOp, SessionError, TradingSession};
pub use state::{
    AuctionState, ContinuousState, FormKind, InvalidTransition, Phase, StateMachine,
    TradingFormState, Transition, TransitionTable,
};
pub use types::{MemberId, OrderId, Price, Side, Timestamp};
pub use validators::{
    standard_chain, GoodTillDateWindow, MinimumSize, OrderValidator, PhaseOrderType,
    ValidatorChain,
};
