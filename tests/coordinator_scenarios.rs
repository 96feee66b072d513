//! End-to-end scenarios driven entirely through the public `Coordinator`
//! API, matching the concrete walkthroughs used to design the engine.

use prophet_market_engine::coordinator::Coordinator;
use prophet_market_engine::market::MarketId;
use prophet_market_engine::orders::Side;
use prophet_market_engine::wire::cents_to_dollars;

fn market() -> MarketId {
    MarketId::new("alice", 480)
}

#[test]
fn simple_cross() {
    let mut c = Coordinator::new();
    c.mint_by_activity("alice", 1_000_00);
    c.mint_by_activity("bob", 1_000_00);

    c.place_order(market(), Side::Sell, 60, 10, 1, "alice").unwrap();
    let outcome = c.place_order(market(), Side::Buy, 60, 10, 2, "bob").unwrap();

    assert_eq!(outcome.trades.len(), 1);
    assert_eq!(outcome.trades[0].price, 60);
    assert_eq!(outcome.trades[0].quantity, 10);

    assert_eq!(c.get_balance("alice").available, 1_000_00 + 600);
    assert_eq!(c.get_balance("bob").locked, 0);
    assert_eq!(c.get_balance("alice").positions, vec![(market(), -10)]);
    assert_eq!(c.get_balance("bob").positions, vec![(market(), 10)]);
}

#[test]
fn price_improvement_refunds_the_difference() {
    let mut c = Coordinator::new();
    c.mint_by_activity("bob", 1_000_00);

    c.place_order(market(), Side::Sell, 40, 5, 1, "alice").unwrap();
    let before = c.get_balance("bob").available;
    c.place_order(market(), Side::Buy, 60, 5, 2, "bob").unwrap();

    // bob pays 40*5 = 200 total, not 60*5 = 300
    assert_eq!(before - c.get_balance("bob").available, 200);
    assert_eq!(c.get_balance("bob").locked, 0);
}

#[test]
fn partial_fill_rests_the_remainder() {
    let mut c = Coordinator::new();
    c.mint_by_activity("bob", 1_000_00);

    c.place_order(market(), Side::Sell, 50, 3, 1, "alice").unwrap();
    let outcome = c.place_order(market(), Side::Buy, 50, 10, 2, "bob").unwrap();

    assert_eq!(outcome.trades.len(), 1);
    assert_eq!(outcome.trades[0].quantity, 3);
    assert_eq!(outcome.resting_qty, 7);
    assert_eq!(c.get_balance("bob").locked, 7 * 50);
}

#[test]
fn fifo_at_a_price_level() {
    let mut c = Coordinator::new();
    c.mint_by_activity("bob", 1_000_00);

    c.place_order(market(), Side::Sell, 50, 5, 1, "alice").unwrap();
    c.place_order(market(), Side::Sell, 50, 5, 2, "carol").unwrap();
    let outcome = c.place_order(market(), Side::Buy, 50, 5, 3, "bob").unwrap();

    assert_eq!(outcome.trades.len(), 1);
    let alice_available_delta = c.get_balance("alice").available;
    assert_eq!(alice_available_delta, 250);
    assert_eq!(c.get_balance("carol").available, 0);
}

#[test]
fn cancel_is_exact_and_frees_the_order_id() {
    let mut c = Coordinator::new();
    c.mint_by_activity("alice", 1_000_00);

    c.place_order(market(), Side::Buy, 40, 10, 1, "alice").unwrap();
    assert_eq!(c.get_balance("alice").locked, 400);

    let outcome = c.cancel_order(1, "alice").unwrap();
    assert_eq!(outcome.refunded, 400);
    assert_eq!(c.get_balance("alice").locked, 0);
    assert_eq!(c.get_balance("alice").available, 1_000_00);

    // the same id can be placed again now that it's gone
    c.place_order(market(), Side::Buy, 40, 5, 1, "alice").unwrap();
}

#[test]
fn settlement_pays_terminal_value_and_closes_the_market() {
    let mut c = Coordinator::new();
    c.mint_by_activity("bob", 1_000_00);

    c.place_order(market(), Side::Sell, 50, 10, 1, "dave").unwrap();
    c.place_order(market(), Side::Buy, 50, 10, 2, "bob").unwrap();

    let dave_before = c.get_balance("dave").available;
    let bob_before = c.get_balance("bob").available;

    let outcome = c.settle("alice", 500).unwrap();
    assert_eq!(outcome.trades.len(), 2);

    // terminal = 1 cent; bob (long 10) is credited, dave (short 10) is debited
    assert_eq!(c.get_balance("bob").available, bob_before + 10);
    assert_eq!(c.get_balance("dave").available, dave_before - 10);
    assert_eq!(cents_to_dollars(10), "0.10");

    assert!(c.place_order(market(), Side::Buy, 10, 1, 3, "bob").is_err());
}
