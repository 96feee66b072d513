//! Single-market matcher: price–time priority on GTC limit orders.

use crate::errors::BookError;
use crate::market::MarketId;
use crate::orders::{Order, OrderId, Side, UserId};
use crate::trade::Trade;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{info, warn};

/// FIFO queue of orders resting at a single price.
type PriceLevel = VecDeque<Order>;

/// An order that was canceled — either by explicit request or as a side
/// effect of settlement — carried back to the Coordinator so it can reverse
/// any locked cash.
#[derive(Debug, Clone)]
pub struct CanceledOrder {
    pub id: OrderId,
    pub user_id: UserId,
    pub side: Side,
    pub price: u64,
    pub quantity: u64,
}

/// Observability snapshot of one side of the book: `(price, total_qty)` in
/// best-first order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookSnapshot {
    pub bids: Vec<(u64, u64)>,
    pub asks: Vec<(u64, u64)>,
}

/// The order book for a single market: two price-keyed ladders, an
/// order-id index for O(1) location, and the position ledger used at
/// settlement.
///
/// `bids`/`asks` are `BTreeMap<price, PriceLevel>` rather than a heap with
/// lazy deletion: an ordered tree gives O(log n) best-price lookups with no
/// stale-key bookkeeping, which this implementation takes as the resolved
/// choice between the two canonical designs (see the design notes).
pub struct Book {
    pub name: String,
    pub active: bool,
    pub bids: BTreeMap<u64, PriceLevel>,
    pub asks: BTreeMap<u64, PriceLevel>,
    /// order id -> (side, price), enough to re-enter the level map in O(1).
    index: HashMap<OrderId, (Side, u64)>,
    /// user id -> net contracts held in this market; long positive, short negative.
    pub positions: HashMap<UserId, i64>,
}

impl Book {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: true,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
            positions: HashMap::new(),
        }
    }

    pub fn best_bid(&self) -> Option<u64> {
        self.bids.keys().next_back().copied()
    }

    pub fn best_ask(&self) -> Option<u64> {
        self.asks.keys().next().copied()
    }

    fn adjust_position(&mut self, user: UserId, delta: i64) {
        let entry = self.positions.entry(user).or_insert(0);
        *entry += delta;
    }

    /// Matches `incoming` against the book, then rests any remainder.
    /// Returns the trades produced and the quantity that ended up resting
    /// (0 if the order fully filled). `filled_makers` lists the order ids
    /// of resting orders this call consumed entirely, so the Engine can
    /// retire them from its global registry.
    pub fn place(
        &mut self,
        side: Side,
        price: u64,
        qty: u64,
        order_id: OrderId,
        user_id: UserId,
        timestamp: u64,
        market: MarketId,
    ) -> Result<(Vec<Trade>, u64, Vec<OrderId>), BookError> {
        if !self.active {
            return Err(BookError::InactiveMarket(market));
        }
        if price == 0 {
            return Err(BookError::NonPositivePrice);
        }
        if qty == 0 {
            return Err(BookError::NonPositiveQty);
        }
        if self.index.contains_key(&order_id) {
            return Err(BookError::DuplicateOrderId(order_id));
        }

        info!(order_id, ?side, price, qty, market = %market, "placing order");

        let mut remaining = qty;
        let mut trades = Vec::new();
        let mut filled_makers = Vec::new();

        match side {
            Side::Buy => {
                while remaining > 0 {
                    let Some(&ask_price) = self.asks.keys().next() else {
                        break;
                    };
                    if ask_price > price {
                        break;
                    }
                    remaining = self.fill_level(
                        Side::Sell,
                        ask_price,
                        remaining,
                        user_id,
                        market.clone(),
                        &mut trades,
                        &mut filled_makers,
                    );
                }
            }
            Side::Sell => {
                while remaining > 0 {
                    let Some(&bid_price) = self.bids.keys().next_back() else {
                        break;
                    };
                    if bid_price < price {
                        break;
                    }
                    remaining = self.fill_level(
                        Side::Buy,
                        bid_price,
                        remaining,
                        user_id,
                        market.clone(),
                        &mut trades,
                        &mut filled_makers,
                    );
                }
            }
        }

        if remaining > 0 {
            warn!(order_id, remaining, "resting unfilled quantity");
            let order = Order {
                id: order_id,
                user_id,
                side,
                price,
                quantity: remaining,
                timestamp,
                market,
            };
            let level = match side {
                Side::Buy => self.bids.entry(price).or_default(),
                Side::Sell => self.asks.entry(price).or_default(),
            };
            level.push_back(order);
            self.index.insert(order_id, (side, price));
        }

        Ok((trades, remaining, filled_makers))
    }

    /// Fills the FIFO queue of makers at `maker_price` on `maker_side`
    /// against the taker, mutating positions and `trades` in place. Returns
    /// the taker quantity still remaining after this level is exhausted or
    /// the taker is satisfied.
    fn fill_level(
        &mut self,
        maker_side: Side,
        maker_price: u64,
        mut remaining: u64,
        taker_user: UserId,
        market: MarketId,
        trades: &mut Vec<Trade>,
        filled_makers: &mut Vec<OrderId>,
    ) -> u64 {
        let book_side = match maker_side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let level = book_side.get_mut(&maker_price).expect("level must exist");

        while remaining > 0 {
            let Some(maker) = level.front_mut() else {
                break;
            };
            let trade_qty = remaining.min(maker.quantity);
            let maker_id = maker.id;
            let maker_user = maker.user_id;

            let (buyer, seller, taker_side) = match maker_side {
                Side::Buy => (maker_user, taker_user, Side::Sell),
                Side::Sell => (taker_user, maker_user, Side::Buy),
            };

            trades.push(Trade {
                market: market.clone(),
                buyer,
                seller,
                price: maker_price,
                quantity: trade_qty,
                taker_side,
                seq: 0,
            });

            self.adjust_position(buyer, trade_qty as i64);
            self.adjust_position(seller, -(trade_qty as i64));

            maker.quantity -= trade_qty;
            remaining -= trade_qty;

            if maker.quantity == 0 {
                self.index.remove(&maker_id);
                filled_makers.push(maker_id);
                level.pop_front();
            }
        }

        if level.is_empty() {
            book_side.remove(&maker_price);
        }
        remaining
    }

    /// O(1) location via the order-id index, then an unlink within that
    /// (small, same-price) level's FIFO queue.
    pub fn cancel(&mut self, order_id: OrderId) -> Option<CanceledOrder> {
        let (side, price) = self.index.remove(&order_id)?;
        let book_side = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let level = book_side.get_mut(&price)?;
        let pos = level.iter().position(|o| o.id == order_id)?;
        let order = level.remove(pos)?;
        if level.is_empty() {
            book_side.remove(&price);
        }
        info!(order_id, "canceled order");
        Some(CanceledOrder {
            id: order.id,
            user_id: order.user_id,
            side: order.side,
            price: order.price,
            quantity: order.quantity,
        })
    }

    /// Closes the market: cancels every resting order, then liquidates
    /// every open position at `terminal_price` with the symbolic
    /// counterparty "House". Returns the canceled resting orders (so the
    /// Coordinator can release their locks) and the synthetic settlement
    /// trades.
    pub fn settle(
        &mut self,
        terminal_price: u8,
        market: MarketId,
    ) -> (Vec<CanceledOrder>, Vec<Trade>) {
        self.active = false;

        let mut canceled = Vec::new();
        for level in self.bids.values_mut().chain(self.asks.values_mut()) {
            for order in level.drain(..) {
                canceled.push(CanceledOrder {
                    id: order.id,
                    user_id: order.user_id,
                    side: order.side,
                    price: order.price,
                    quantity: order.quantity,
                });
            }
        }
        self.bids.clear();
        self.asks.clear();
        self.index.clear();

        let terminal = terminal_price as u64;
        let mut trades = Vec::new();
        let mut positions: Vec<_> = self.positions.drain().collect();
        positions.sort_by_key(|(user, _)| *user);
        for (user, qty) in positions {
            if qty > 0 {
                trades.push(Trade {
                    market: market.clone(),
                    buyer: u64::MAX, // symbolic "House"
                    seller: user,
                    price: terminal,
                    quantity: qty as u64,
                    taker_side: Side::Sell,
                    seq: 0,
                });
            } else if qty < 0 {
                trades.push(Trade {
                    market: market.clone(),
                    buyer: user,
                    seller: u64::MAX,
                    price: terminal,
                    quantity: (-qty) as u64,
                    taker_side: Side::Buy,
                    seq: 0,
                });
            }
        }
        warn!(market = %market, terminal_price, trades = trades.len(), "market settled");
        (canceled, trades)
    }

    /// Every order id currently resting in this book, across both sides.
    pub fn resting_order_ids(&self) -> impl Iterator<Item = OrderId> + '_ {
        self.bids
            .values()
            .chain(self.asks.values())
            .flat_map(|level| level.iter().map(|o| o.id))
    }

    /// Every order currently resting in this book, across both sides, for
    /// the whole-state snapshot.
    pub fn resting_orders(&self) -> impl Iterator<Item = &Order> + '_ {
        self.bids.values().chain(self.asks.values()).flat_map(|level| level.iter())
    }

    /// Re-inserts an order produced by [`crate::persistence::load_state`]
    /// directly into its level and the index, with no matching. Trusted:
    /// the caller guarantees `order.id` is not already present.
    pub fn restore_order(&mut self, order: Order) {
        let level = match order.side {
            Side::Buy => self.bids.entry(order.price).or_default(),
            Side::Sell => self.asks.entry(order.price).or_default(),
        };
        self.index.insert(order.id, (order.side, order.price));
        level.push_back(order);
    }

    pub fn snapshot(&self) -> BookSnapshot {
        let level_totals = |levels: &BTreeMap<u64, PriceLevel>| -> Vec<(u64, u64)> {
            levels
                .iter()
                .map(|(price, level)| (*price, level.iter().map(|o| o.quantity).sum()))
                .collect()
        };
        BookSnapshot {
            bids: level_totals(&self.bids).into_iter().rev().collect(),
            asks: level_totals(&self.asks),
        }
    }
}
