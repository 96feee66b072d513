//! Multi-market router: owns every [`Book`] plus the global order registry
//! that lets cancellation and lookup stay O(1) regardless of which market
//! an order lives in.

use crate::book::{Book, BookSnapshot, CanceledOrder};
use crate::errors::BookError;
use crate::market::MarketId;
use crate::orders::{OrderId, Side, UserId};
use crate::trade::Trade;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// What the registry remembers about a currently-resting order, enough to
/// route a cancel straight to its book without scanning anything.
#[derive(Debug, Clone)]
struct RegistryEntry {
    market: MarketId,
}

pub struct Engine {
    books: HashMap<MarketId, Book>,
    registry: HashMap<OrderId, RegistryEntry>,
    next_timestamp: u64,
    next_trade_seq: u64,
}

/// A row of `get_markets`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSummary {
    pub market: MarketId,
    pub name: String,
    pub best_bid: Option<u64>,
    pub best_ask: Option<u64>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            books: HashMap::new(),
            registry: HashMap::new(),
            next_timestamp: 0,
            next_trade_seq: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        let ts = self.next_timestamp;
        self.next_timestamp += 1;
        ts
    }

    /// Assigns monotonic, engine-wide sequence numbers to a freshly
    /// produced batch of trades, in place.
    fn sequence(&mut self, trades: &mut [Trade]) {
        for t in trades {
            t.seq = self.next_trade_seq;
            self.next_trade_seq += 1;
        }
    }

    /// Ensures a book exists for `market`, creating and naming it (after the
    /// subject) on first contact.
    fn book_mut(&mut self, market: &MarketId) -> &mut Book {
        self.books
            .entry(market.clone())
            .or_insert_with(|| Book::new(market.subject.clone()))
    }

    pub fn place(
        &mut self,
        market: MarketId,
        side: Side,
        price: u64,
        qty: u64,
        order_id: OrderId,
        user_id: UserId,
    ) -> Result<(Vec<Trade>, u64), BookError> {
        if self.registry.contains_key(&order_id) {
            return Err(BookError::DuplicateOrderId(order_id));
        }
        let timestamp = self.tick();
        let book = self.book_mut(&market);
        let (mut trades, resting, filled_makers) =
            book.place(side, price, qty, order_id, user_id, timestamp, market.clone())?;

        for id in filled_makers {
            self.registry.remove(&id);
        }
        if resting > 0 {
            self.registry
                .insert(order_id, RegistryEntry { market: market.clone() });
        }
        self.sequence(&mut trades);
        info!(order_id, market = %market, trades = trades.len(), resting, "engine: order placed");
        Ok((trades, resting))
    }

    /// O(1): looks the market up in the registry, delegates to that book.
    pub fn cancel(&mut self, order_id: OrderId) -> Option<CanceledOrder> {
        let entry = self.registry.remove(&order_id)?;
        let book = self.books.get_mut(&entry.market)?;
        let canceled = book.cancel(order_id);
        if canceled.is_some() {
            info!(order_id, market = %entry.market, "engine: order canceled");
        }
        canceled
    }

    /// Settles every active market belonging to `subject`, deriving
    /// `terminal_price` per-market from `observed_value >= threshold`.
    /// Returns the concatenated synthetic trades and the resting orders
    /// canceled as a side effect of closing each book.
    pub fn settle_all_for_subject(
        &mut self,
        subject: &str,
        observed_value: u64,
    ) -> (Vec<Trade>, Vec<CanceledOrder>) {
        let mut all_trades = Vec::new();
        let mut all_canceled = Vec::new();

        let market_ids: Vec<MarketId> = self
            .books
            .keys()
            .filter(|m| m.subject == subject)
            .cloned()
            .collect();

        for market in market_ids {
            let terminal_price: u8 = if observed_value >= market.threshold { 1 } else { 0 };
            let book = self.books.get_mut(&market).expect("just listed");
            let (canceled, mut trades) = book.settle(terminal_price, market.clone());
            for c in &canceled {
                self.registry.remove(&c.id);
            }
            self.sequence(&mut trades);
            info!(market = %market, terminal_price, trades = trades.len(), "engine: market settled");
            all_canceled.extend(canceled);
            all_trades.extend(trades);
        }

        (all_trades, all_canceled)
    }

    pub fn list_active_markets(&self) -> Vec<MarketSummary> {
        self.books
            .iter()
            .filter(|(_, b)| b.active)
            .map(|(market, book)| MarketSummary {
                market: market.clone(),
                name: book.name.clone(),
                best_bid: book.best_bid(),
                best_ask: book.best_ask(),
            })
            .collect()
    }

    pub fn snapshot(&self, market: &MarketId) -> Option<BookSnapshot> {
        self.books.get(market).map(Book::snapshot)
    }

    pub fn books(&self) -> &HashMap<MarketId, Book> {
        &self.books
    }

    pub fn books_mut(&mut self) -> &mut HashMap<MarketId, Book> {
        &mut self.books
    }

    pub fn registry_len(&self) -> usize {
        self.registry.len()
    }

    /// Every order id the registry currently believes is live, regardless
    /// of which book it rests in. Used by the auditor to check that this
    /// set is exactly the union of order ids resting across all books.
    pub fn registered_order_ids(&self) -> impl Iterator<Item = OrderId> + '_ {
        self.registry.keys().copied()
    }

    pub fn next_timestamp(&self) -> u64 {
        self.next_timestamp
    }

    /// Re-registers an order loaded from a snapshot. Used only during
    /// [`crate::persistence::load_state`]; it does not re-run matching.
    pub fn reindex_resting_order(&mut self, order_id: OrderId, market: MarketId) {
        self.registry.insert(order_id, RegistryEntry { market });
    }

    pub fn set_next_timestamp(&mut self, ts: u64) {
        self.next_timestamp = ts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mkt(subject: &str, threshold: u64) -> MarketId {
        MarketId::new(subject, threshold)
    }

    #[test]
    fn creates_book_lazily_on_first_place() {
        let mut engine = Engine::new();
        assert!(engine.list_active_markets().is_empty());
        engine
            .place(mkt("alice", 480), Side::Buy, 40, 10, 1, 1)
            .unwrap();
        assert_eq!(engine.list_active_markets().len(), 1);
    }

    #[test]
    fn duplicate_order_id_rejected_even_across_markets() {
        let mut engine = Engine::new();
        engine
            .place(mkt("alice", 480), Side::Buy, 40, 10, 1, 1)
            .unwrap();
        let err = engine
            .place(mkt("bob", 10), Side::Buy, 40, 10, 1, 2)
            .unwrap_err();
        assert_eq!(err, BookError::DuplicateOrderId(1));
    }

    #[test]
    fn cancel_routes_to_the_right_book_in_one_lookup() {
        let mut engine = Engine::new();
        engine
            .place(mkt("alice", 480), Side::Buy, 40, 10, 1, 1)
            .unwrap();
        engine
            .place(mkt("bob", 10), Side::Buy, 40, 10, 2, 1)
            .unwrap();
        let canceled = engine.cancel(2).unwrap();
        assert_eq!(canceled.id, 2);
        assert_eq!(engine.registry_len(), 1);
        assert!(engine.cancel(2).is_none());
    }

    #[test]
    fn settle_all_for_subject_only_touches_that_subjects_markets() {
        let mut engine = Engine::new();
        engine
            .place(mkt("alice", 480), Side::Sell, 50, 10, 1, 2)
            .unwrap();
        engine
            .place(mkt("alice", 480), Side::Buy, 50, 10, 2, 3)
            .unwrap();
        engine
            .place(mkt("bob", 10), Side::Buy, 20, 5, 3, 4)
            .unwrap();

        let (trades, canceled) = engine.settle_all_for_subject("alice", 500);
        assert_eq!(trades.len(), 2);
        assert!(canceled.is_empty());
        assert_eq!(engine.list_active_markets().len(), 1);
        assert_eq!(engine.list_active_markets()[0].market, mkt("bob", 10));
    }

    #[test]
    fn different_thresholds_on_the_same_subject_can_settle_differently() {
        let mut engine = Engine::new();
        engine
            .place(mkt("alice", 100), Side::Buy, 10, 1, 1, 9)
            .unwrap();
        engine
            .place(mkt("alice", 900), Side::Buy, 10, 1, 2, 9)
            .unwrap();

        let (_, canceled) = engine.settle_all_for_subject("alice", 500);
        // both resting buys get canceled as part of closing their books
        assert_eq!(canceled.len(), 2);
        let books = engine.books();
        assert!(!books[&mkt("alice", 100)].active);
        assert!(!books[&mkt("alice", 900)].active);
    }

    #[test]
    fn trade_sequence_numbers_are_monotonic_across_markets() {
        let mut engine = Engine::new();
        engine
            .place(mkt("alice", 480), Side::Sell, 50, 1, 1, 1)
            .unwrap();
        let (t1, _) = engine
            .place(mkt("alice", 480), Side::Buy, 50, 1, 2, 2)
            .unwrap();
        engine
            .place(mkt("bob", 10), Side::Sell, 20, 1, 3, 1)
            .unwrap();
        let (t2, _) = engine
            .place(mkt("bob", 10), Side::Buy, 20, 1, 4, 2)
            .unwrap();
        assert_eq!(t1[0].seq, 0);
        assert_eq!(t2[0].seq, 1);
    }
}
