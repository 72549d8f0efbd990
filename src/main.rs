//! Trading Venue Core Simulation.
//!
//! Walks one instrument through a full trading day: opening auction call
//! phase, price determination under the volatility guard, orderbook
//! balancing, continuous midpoint trading, and a scheduled day driven by the
//! calendar triggers.

use rust_decimal_macros::dec;
use venue_core::*;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("Trading Venue Core Simulation");
    println!("Single instrument, auction + continuous forms, full day\n");

    scenario_1_auction_lifecycle();
    scenario_2_price_determination_examples();
    scenario_3_volatility_interruption();
    scenario_4_midpoint_stealing();
    scenario_5_scheduled_day();

    println!("\nAll simulations completed successfully.");
}

fn limit(id: u64, member: u64, side: Side, px: rust_decimal::Decimal, qty: rust_decimal::Decimal) -> Order {
    Order::new_limit(
        OrderId(id),
        MemberId(member),
        side,
        qty,
        Price::new_unchecked(px),
        Timestamp::from_millis(id as i64),
    )
}

/// One auction from call phase to close, by hand.
fn scenario_1_auction_lifecycle() {
    println!("Scenario 1: Auction Lifecycle\n");

    let today = chrono::Utc::now().date_naive();
    let mut auction = Auction::new(standard_chain(dec!(1)));

    auction.start_call_phase().unwrap();
    println!("  Call phase open, state: {:?}", auction.current_state());

    for order in [
        limit(1, 1, Side::Buy, dec!(202), dec!(200)),
        limit(2, 1, Side::Buy, dec!(201), dec!(200)),
        limit(3, 2, Side::Buy, dec!(200), dec!(300)),
        limit(4, 3, Side::Sell, dec!(200), dec!(100)),
        limit(5, 3, Side::Sell, dec!(198), dec!(200)),
        limit(6, 4, Side::Sell, dec!(197), dec!(400)),
    ] {
        let outcome = auction.submit(order, SubmitType::New, today);
        assert!(outcome.is_ok());
    }
    println!("  6 orders entered, book holds {}", auction.book().order_count());

    auction.stop_call_phase().unwrap();
    let report = auction.determine_price(None, Timestamp::now()).unwrap();
    let result = report.determination.unwrap();
    println!(
        "  Auction price {} on {} matchable per side",
        result.auction_price.unwrap(),
        result.bid_quantity
    );

    auction.balance_orderbook().unwrap();
    auction.close().unwrap();
    println!("  Back to {:?}\n", auction.current_state());
}

/// The clearing-price tie-break rules on small books.
fn scenario_2_price_determination_examples() {
    println!("Scenario 2: Price Determination\n");

    let mut book = OrderBook::new();
    book.insert(limit(1, 1, Side::Buy, dec!(202), dec!(400)));
    book.insert(limit(2, 1, Side::Buy, dec!(201), dec!(200)));
    book.insert(limit(3, 2, Side::Sell, dec!(199), dec!(300)));
    book.insert(limit(4, 2, Side::Sell, dec!(198), dec!(200)));

    let no_ref = determine_price(&book, None);
    println!(
        "  Without reference: price {} (bid surplus {})",
        no_ref.auction_price.unwrap(),
        no_ref.bid_surplus()
    );

    let with_ref = determine_price(&book, Some(Price::new_unchecked(dec!(198.5))));
    println!(
        "  Reference 198.5: price {} (nearest worst matchable)",
        with_ref.auction_price.unwrap()
    );

    let tied = determine_price(&book, Some(Price::new_unchecked(dec!(200))));
    println!(
        "  Reference 200: price {} (distance tie takes the higher)\n",
        tied.auction_price.unwrap()
    );
}

/// An indicative price outside both corridors interrupts trading.
fn scenario_3_volatility_interruption() {
    println!("Scenario 3: Volatility Interruption\n");

    let mut guard = VolatilityGuard::new(
        PriceRange::new(Price::new_unchecked(dec!(10)), dec!(20)),
        PriceRange::new(Price::new_unchecked(dec!(12)), dec!(10)),
    )
    .unwrap();
    println!(
        "  Static [{}, {}], dynamic [{}, {}]",
        guard.static_range().lower(),
        guard.static_range().upper(),
        guard.dynamic_range().lower(),
        guard.dynamic_range().upper()
    );

    for px in [dec!(13.2), dec!(13.21), dec!(8), dec!(7.9)] {
        let verdict = match guard.check(Price::new_unchecked(px), Timestamp::now()) {
            None => "inside",
            Some(_) => "INTERRUPTION",
        };
        println!("  Indicative {px}: {verdict}");
    }

    let rejected = guard.update_dynamic(Price::new_unchecked(dec!(100)));
    println!("  Dynamic update to 100 rejected: {}\n", rejected.is_err());
}

/// Minimum-fill shortfalls are covered by stealing from lower precedence.
fn scenario_4_midpoint_stealing() {
    println!("Scenario 4: Midpoint Quantity Stealing\n");

    let guard = VolatilityGuard::new(
        PriceRange::new(Price::new_unchecked(dec!(100)), dec!(50)),
        PriceRange::new(Price::new_unchecked(dec!(100)), dec!(40)),
    )
    .unwrap();

    let mut continuous = ContinuousTrading::new();
    continuous.start().unwrap();

    let mid = Price::new_unchecked(dec!(100));
    let now = Timestamp::now();
    for (id, qty, min_fill) in [(1u64, dec!(90), dec!(0)), (2, dec!(50), dec!(20))] {
        let order = Order::new_midpoint(
            OrderId(id),
            MemberId(id),
            Side::Sell,
            qty,
            None,
            min_fill,
            now,
        );
        continuous.submit_midpoint(order, mid, &guard, now);
    }

    let incoming = Order::new_midpoint(
        OrderId(3),
        MemberId(3),
        Side::Buy,
        dec!(100),
        None,
        dec!(0),
        now,
    );
    let entry = continuous.submit_midpoint(incoming, mid, &guard, now);
    for trade in &entry.trades {
        println!(
            "  Trade {} @ {} ({:?} sold)",
            trade.quantity, trade.price, trade.sell_order
        );
    }
    println!();
}

/// A whole trading day off the calendar, on the deterministic session.
fn scenario_5_scheduled_day() {
    println!("Scenario 5: Scheduled Trading Day\n");

    use chrono::TimeZone;
    use rand::SeedableRng;

    let mut rng = rand::rngs::StdRng::seed_from_u64(17);
    let open = chrono::Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
    let calendar = TradingCalendar::builder()
        .trading_day(chrono::NaiveDate::from_ymd_opt(2024, 3, 4).unwrap())
        .schedule(
            AuctionScheduleBuilder::new(open)
                .min_call_duration_ms(120_000)
                .max_random_extension_ms(30_000)
                .with_orderbook_balancing(true)
                .run_type(RunType::OpeningAuction)
                .build(&mut rng)
                .unwrap(),
        )
        .build()
        .unwrap();

    let sink = SharedCollector::new();
    let mut session = TradingSession::new(
        Auction::new(standard_chain(dec!(1))),
        Box::new(sink.clone()),
    );
    session.load_wait_triggers(&calendar);

    // replay the fixed triggers in time order, as the timer worker would
    for trigger in calendar.triggers().filter(|t| t.fixed_time().is_some()) {
        if let Some(command) = resolve_command(trigger) {
            session.submit(command);
        }
    }
    session.run_until_idle();

    println!("  Final auction state: {:?}", session.auction().current_state());
    println!("  Events observed: {}", sink.len());
    for event in sink.snapshot() {
        match event {
            MarketEvent::StateChanged(e) => {
                println!("    {:?} -> {:?}", e.previous, e.current)
            }
            MarketEvent::RunTypeChanged(e) => {
                println!("    run type -> {:?}", e.current)
            }
            MarketEvent::VolatilityInterrupted(v) => {
                println!("    volatility interruption at {}", v.indicative_price)
            }
        }
    }
}
