//! Threaded market runner.
//!
//! Each market owns exactly two sequential workers: an event worker that
//! executes one command at a time against the trading session, and a timer
//! worker whose only job is to sleep out fixed-time delays and forward the
//! armed commands onto the event channel. Timers never touch a trading form
//! directly, so every state transition of a market is totally ordered no
//! matter which timer or listener produced it.
//!
//! Shutdown is coarse: both workers stop, pending timers and undelivered
//! commands are discarded, and a form may be left in a non-terminal active
//! state.

use crate::calendar::TradingCalendar;
use crate::session::{resolve_command, PhaseCommand, TradingSession};
use crate::types::Timestamp;
use chrono::{DateTime, NaiveDate, Utc};
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    #[error("fixed trigger time {time} is already in the past (now {now})")]
    FixedTimeInPast {
        time: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("worker thread could not be spawned: {0}")]
    SpawnFailed(String),
}

/// Whole milliseconds between two instants. Always the total elapsed time —
/// a sub-second delta must not collapse to its nanosecond component.
pub(crate) fn delay_millis(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_milliseconds()
}

pub struct MarketRunner {
    cmd_tx: Option<Sender<PhaseCommand>>,
    shutdown_tx: Option<Sender<()>>,
    event_worker: Option<JoinHandle<TradingSession>>,
    timer_worker: Option<JoinHandle<()>>,
    /// Holds the session when today is not a trading day and nothing ran.
    idle_session: Option<TradingSession>,
}

impl MarketRunner {
    /// Arm the calendar against `date` and start both workers.
    ///
    /// A date outside the calendar starts nothing at all: no timers, no
    /// listeners, zero notifications. A fixed trigger already in the past is
    /// a configuration error and fails the whole start.
    pub fn start(
        mut session: TradingSession,
        calendar: &TradingCalendar,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Self, ScheduleError> {
        if !calendar.is_trading_day(date) {
            info!(%date, "not a trading day, market stays idle");
            return Ok(Self {
                cmd_tx: None,
                shutdown_tx: None,
                event_worker: None,
                timer_worker: None,
                idle_session: Some(session),
            });
        }

        session.load_wait_triggers(calendar);

        let mut timers: Vec<(i64, PhaseCommand)> = Vec::new();
        for trigger in calendar.triggers() {
            let Some(time) = trigger.fixed_time() else {
                continue;
            };
            let delay = delay_millis(now, time);
            if delay < 0 {
                return Err(ScheduleError::FixedTimeInPast { time, now });
            }
            if let Some(command) = resolve_command(trigger) {
                timers.push((delay, command));
            }
        }
        timers.sort_by_key(|(delay, _)| *delay);

        let (cmd_tx, cmd_rx) = unbounded::<PhaseCommand>();
        let (shutdown_tx, shutdown_rx) = unbounded::<()>();

        let event_worker = spawn_event_worker(session, cmd_rx, cmd_tx.clone(), shutdown_rx.clone())?;
        let timer_worker = spawn_timer_worker(timers, cmd_tx.clone(), shutdown_rx)?;

        Ok(Self {
            cmd_tx: Some(cmd_tx),
            shutdown_tx: Some(shutdown_tx),
            event_worker: Some(event_worker),
            timer_worker: Some(timer_worker),
            idle_session: None,
        })
    }

    pub fn is_running(&self) -> bool {
        self.event_worker.is_some()
    }

    /// Submit a command onto the market's event queue from outside the
    /// schedule (same queue, same total order).
    pub fn submit(&self, command: PhaseCommand) {
        if let Some(tx) = &self.cmd_tx {
            let _ = tx.send(command);
        }
    }

    /// Shut both workers down and hand the session back. Undelivered timers
    /// and queued commands are dropped on the floor.
    pub fn stop(mut self) -> Option<TradingSession> {
        if let Some(session) = self.idle_session.take() {
            return Some(session);
        }
        drop(self.shutdown_tx.take());
        drop(self.cmd_tx.take());
        if let Some(worker) = self.timer_worker.take() {
            let _ = worker.join();
        }
        self.event_worker
            .take()
            .and_then(|worker| worker.join().ok())
    }
}

impl Drop for MarketRunner {
    fn drop(&mut self) {
        // dropping the senders is enough: both workers exit on disconnect
        drop(self.shutdown_tx.take());
        drop(self.cmd_tx.take());
    }
}

fn spawn_event_worker(
    mut session: TradingSession,
    cmd_rx: Receiver<PhaseCommand>,
    cmd_tx: Sender<PhaseCommand>,
    shutdown_rx: Receiver<()>,
) -> Result<JoinHandle<TradingSession>, ScheduleError> {
    thread::Builder::new()
        .name("venue-event".into())
        .spawn(move || {
            loop {
                crossbeam::select! {
                    recv(cmd_rx) -> msg => match msg {
                        Ok(command) => {
                            session.set_time(Timestamp::now());
                            session.execute(command);
                            // wait-trigger firings go back through the same
                            // queue, behind anything already enqueued
                            while let Some(follow_up) = session.take_pending() {
                                if cmd_tx.send(follow_up).is_err() {
                                    return session;
                                }
                            }
                        }
                        Err(_) => return session,
                    },
                    recv(shutdown_rx) -> _ => return session,
                }
            }
        })
        .map_err(|e| ScheduleError::SpawnFailed(e.to_string()))
}

fn spawn_timer_worker(
    timers: Vec<(i64, PhaseCommand)>,
    cmd_tx: Sender<PhaseCommand>,
    shutdown_rx: Receiver<()>,
) -> Result<JoinHandle<()>, ScheduleError> {
    thread::Builder::new()
        .name("venue-timer".into())
        .spawn(move || {
            let armed_at = Instant::now();
            for (delay, command) in timers {
                let due = Duration::from_millis(delay as u64);
                let remaining = due.saturating_sub(armed_at.elapsed());
                crossbeam::select! {
                    recv(shutdown_rx) -> _ => return,
                    default(remaining) => {
                        if cmd_tx.send(command).is_err() {
                            return;
                        }
                    }
                }
            }
        })
        .map_err(|e| ScheduleError::SpawnFailed(e.to_string()))
}
