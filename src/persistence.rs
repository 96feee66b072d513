//! Two independent persistence mechanisms:
//!
//! - A whole-state JSON snapshot (`dump_state`/`load_state`) that can fully
//!   reconstruct a [`Coordinator`] — engine books, ledger accounts, and the
//!   id mapper. Written between commands only (never mid-command).
//! - A ParityDB-backed append-only trade archive (`TradeStore`), adapted
//!   from the teacher's `store.rs`, for paginated historical trade lookup.
//!   It is never required to reconstruct engine state.

use crate::book::Book;
use crate::coordinator::Coordinator;
use crate::engine::Engine;
use crate::ledger::{Account, Ledger};
use crate::id_mapper::IdMapper;
use crate::market::MarketId;
use crate::orders::{Order, OrderId, Side, UserId};
use crate::trade::Trade;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use bincode::config::{self, standard};
use bincode::error::{DecodeError, EncodeError};
use parity_db::{BTreeIterator, ColId, Db, Options};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ParityDB error: {0}")]
    Parity(#[from] parity_db::Error),
    #[error("bincode encode error: {0}")]
    BincodeEncode(#[from] EncodeError),
    #[error("bincode decode error: {0}")]
    BincodeDecode(#[from] DecodeError),
    #[error("invalid cursor")]
    BadCursor,
}

pub type PersistResult<T> = Result<T, PersistenceError>;

// --- whole-state JSON snapshot -------------------------------------------

#[derive(Serialize, Deserialize)]
struct PersistedOrder {
    id: OrderId,
    user_id: UserId,
    price: u64,
    qty: u64,
    side: Side,
    timestamp: u64,
}

#[derive(Serialize, Deserialize)]
struct PersistedMarket {
    name: String,
    active: bool,
    bids: Vec<PersistedOrder>,
    asks: Vec<PersistedOrder>,
}

#[derive(Serialize, Deserialize)]
struct PersistedEngine {
    markets: HashMap<String, PersistedMarket>,
    next_timestamp: u64,
}

#[derive(Serialize, Deserialize)]
struct PersistedAccount {
    available: u64,
    locked: u64,
    portfolio: HashMap<String, i64>,
}

#[derive(Serialize, Deserialize)]
struct PersistedMapper {
    map: HashMap<String, UserId>,
    next_id: UserId,
}

#[derive(Serialize, Deserialize)]
struct PersistedState {
    engine: PersistedEngine,
    economy: HashMap<String, PersistedAccount>,
    mapper: PersistedMapper,
}

/// Serializes the full Coordinator state to the documented JSON layout and
/// writes it to `path`. Intended to be called only between commands.
pub fn dump_state(coordinator: &Coordinator, path: impl AsRef<Path>) -> PersistResult<()> {
    let engine = coordinator.engine();

    let markets = engine
        .books()
        .iter()
        .map(|(market, book)| {
            let to_persisted = |o: &Order| PersistedOrder {
                id: o.id,
                user_id: o.user_id,
                price: o.price,
                qty: o.quantity,
                side: o.side,
                timestamp: o.timestamp,
            };
            let bids: Vec<_> = book
                .resting_orders()
                .filter(|o| o.side == Side::Buy)
                .map(to_persisted)
                .collect();
            let asks: Vec<_> = book
                .resting_orders()
                .filter(|o| o.side == Side::Sell)
                .map(to_persisted)
                .collect();
            (
                market.code(),
                PersistedMarket { name: book.name.clone(), active: book.active, bids, asks },
            )
        })
        .collect();

    let economy = coordinator
        .ledger()
        .accounts()
        .iter()
        .map(|(user, account): (&String, &Account)| {
            let portfolio = account.portfolio.iter().map(|(m, qty)| (m.code(), *qty)).collect();
            (
                user.clone(),
                PersistedAccount { available: account.available, locked: account.locked, portfolio },
            )
        })
        .collect();

    let mapper = PersistedMapper {
        map: coordinator.mapper().map().clone(),
        next_id: coordinator.mapper().next_id(),
    };

    let state = PersistedState {
        engine: PersistedEngine { markets, next_timestamp: engine.next_timestamp() },
        economy,
        mapper,
    };

    let json = serde_json::to_vec_pretty(&state)?;
    std::fs::write(path.as_ref(), json)?;
    info!(path = %path.as_ref().display(), "wrote state snapshot");
    Ok(())
}

/// Reconstructs a [`Coordinator`] from a JSON snapshot written by [`dump_state`].
pub fn load_state(path: impl AsRef<Path>) -> PersistResult<Coordinator> {
    let bytes = std::fs::read(path.as_ref())?;
    let state: PersistedState = serde_json::from_slice(&bytes)?;

    let mut engine = Engine::new();
    for (code, persisted_market) in state.engine.markets {
        let market = MarketId::parse(&code)
            .ok_or_else(|| PersistenceError::Json(serde::de::Error::custom(format!("bad market id {code:?}"))))?;
        let mut book = Book::new(persisted_market.name);
        book.active = persisted_market.active;
        for po in persisted_market.bids.into_iter().chain(persisted_market.asks) {
            engine.reindex_resting_order(po.id, market.clone());
            book.restore_order(Order {
                id: po.id,
                user_id: po.user_id,
                side: po.side,
                price: po.price,
                quantity: po.qty,
                timestamp: po.timestamp,
                market: market.clone(),
            });
        }
        engine.books_mut().insert(market, book);
    }
    engine.set_next_timestamp(state.engine.next_timestamp);

    let mut ledger = Ledger::new();
    for (user, persisted_account) in state.economy {
        let portfolio = persisted_account
            .portfolio
            .into_iter()
            .map(|(code, qty)| {
                MarketId::parse(&code)
                    .map(|m| (m, qty))
                    .ok_or_else(|| PersistenceError::Json(serde::de::Error::custom(format!("bad market id {code:?}"))))
            })
            .collect::<PersistResult<HashMap<_, _>>>()?;
        ledger
            .accounts_mut()
            .insert(user, Account { available: persisted_account.available, locked: persisted_account.locked, portfolio });
    }
    ledger.seed_totals_from_accounts();

    let mapper = IdMapper::from_parts(state.mapper.map, state.mapper.next_id);

    info!("loaded state snapshot");
    Ok(Coordinator::from_parts(engine, ledger, mapper))
}

// --- ParityDB trade archive, adapted from the teacher's `store.rs` ------

#[derive(Serialize, Deserialize)]
struct Cursor {
    v: u8,
    seq: u64,
}

/// Append-only archive of executed trades, keyed for chronological paging
/// within a market. Unlike the teacher's store, which built a composite
/// key from timestamp + maker/taker ids to break ties, trades here already
/// carry a single engine-wide monotonic `seq`, so that alone is the key.
pub struct TradeStore {
    db: Db,
}

impl TradeStore {
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let mut opts = Options::with_columns(path.as_ref(), 1);
        opts.columns[0].btree_index = true;
        let db = Db::open_or_create(&opts)?;
        Ok(Self { db })
    }

    fn prefix(market: &str) -> Vec<u8> {
        let mut k = Vec::with_capacity(market.len() + 1);
        k.extend_from_slice(market.as_bytes());
        k.push(b':');
        k
    }

    fn encode_key(market: &str, seq: u64) -> Vec<u8> {
        let mut key = Self::prefix(market);
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    fn encode_cursor(seq: u64) -> String {
        B64.encode(serde_json::to_vec(&Cursor { v: 1, seq }).unwrap())
    }

    fn decode_cursor(s: &str) -> PersistResult<Cursor> {
        let bytes = B64.decode(s).map_err(|_| PersistenceError::BadCursor)?;
        let c: Cursor = serde_json::from_slice(&bytes).map_err(|_| PersistenceError::BadCursor)?;
        if c.v != 1 {
            return Err(PersistenceError::BadCursor);
        }
        Ok(c)
    }

    /// Appends `trade` to the archive under its market's prefix.
    pub fn insert_trade(&mut self, trade: &Trade) -> PersistResult<()> {
        let col: ColId = 0;
        let key = Self::encode_key(&trade.market.code(), trade.seq);
        let value = bincode::serde::encode_to_vec(trade, standard())?;
        self.db.commit(vec![(col, key, Some(value))])?;
        Ok(())
    }

    /// Pages forward (ascending `seq`) through a market's trades, starting
    /// strictly after `after`. Returns `(items, next_cursor)` via
    /// look-ahead: `next_cursor` is `Some` only if another item exists
    /// beyond this page.
    pub fn page_trade_asc(
        &self,
        market: &str,
        after: Option<&str>,
        limit: usize,
    ) -> PersistResult<(Vec<Trade>, Option<String>)> {
        let col: ColId = 0;
        let mut it: BTreeIterator<'_> = self.db.iter(col)?;
        let prefix = Self::prefix(market);

        match after {
            None => {
                it.seek(&prefix)?;
            }
            Some(s) => {
                let cursor = Self::decode_cursor(s)?;
                let full = Self::encode_key(market, cursor.seq);
                it.seek(&full)?;
                match it.next()? {
                    Some((k, _)) if k == full => {}
                    _ => return Err(PersistenceError::BadCursor),
                }
            }
        }

        let mut items = Vec::with_capacity(limit.min(256));
        let mut last_cursor: Option<String> = None;
        let mut read = 0usize;

        while read < limit + 1 {
            match it.next()? {
                Some((k, v)) if k.starts_with(&prefix) => {
                    let (trade, _): (Trade, usize) = bincode::serde::decode_from_slice(&v, config::standard())?;
                    if items.len() < limit {
                        last_cursor = Some(Self::encode_cursor(trade.seq));
                        items.push(trade);
                    }
                    read += 1;
                }
                _ => break,
            }
        }

        let next = if read > limit && !items.is_empty() { last_cursor } else { None };
        Ok((items, next))
    }

    pub fn iter_trades(&self) -> PersistResult<impl Iterator<Item = Trade>> {
        let config = config::standard();
        let mut iter = self.db.iter(0)?;
        iter.seek_to_first()?;
        Ok(std::iter::from_fn(move || match iter.next() {
            Ok(Some((_key, raw))) => {
                let (decoded, _): (Trade, usize) = bincode::serde::decode_from_slice(&raw[..], config).ok()?;
                Some(decoded)
            }
            _ => None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::Side;
    use tempfile::tempdir;

    fn mkt(subject: &str, threshold: u64) -> MarketId {
        MarketId::new(subject, threshold)
    }

    fn trade(market: MarketId, seq: u64) -> Trade {
        Trade { market, buyer: 1, seller: 2, price: 50, quantity: 1, taker_side: Side::Buy, seq }
    }

    #[test]
    fn paging_two_trades_limit_one_exposes_a_next_cursor() {
        let dir = tempdir().unwrap();
        let mut store = TradeStore::open(dir.path()).unwrap();
        let m = mkt("alice", 480);
        store.insert_trade(&trade(m.clone(), 1)).unwrap();
        store.insert_trade(&trade(m.clone(), 2)).unwrap();

        let (p1, c1) = store.page_trade_asc(&m.code(), None, 1).unwrap();
        assert_eq!(p1.len(), 1);
        assert_eq!(p1[0].seq, 1);
        assert!(c1.is_some());

        let (p2, c2) = store.page_trade_asc(&m.code(), c1.as_deref(), 1).unwrap();
        assert_eq!(p2.len(), 1);
        assert_eq!(p2[0].seq, 2);
        assert!(c2.is_none());
    }

    #[test]
    fn cursor_from_a_different_market_is_rejected() {
        let dir = tempdir().unwrap();
        let mut store = TradeStore::open(dir.path()).unwrap();
        let alice = mkt("alice", 480);
        let bob = mkt("bob", 10);
        store.insert_trade(&trade(alice.clone(), 1)).unwrap();
        store.insert_trade(&trade(alice.clone(), 2)).unwrap();
        store.insert_trade(&trade(bob.clone(), 1)).unwrap();

        let (_page, alice_cursor) = store.page_trade_asc(&alice.code(), None, 1).unwrap();
        let bad = store.page_trade_asc(&bob.code(), alice_cursor.as_deref(), 1);
        assert!(matches!(bad, Err(PersistenceError::BadCursor)));
    }

    #[test]
    fn malformed_cursor_is_rejected() {
        let dir = tempdir().unwrap();
        let store = TradeStore::open(dir.path()).unwrap();
        let bad = store.page_trade_asc("alice,480", Some("not-base64!!"), 10);
        assert!(matches!(bad, Err(PersistenceError::BadCursor)));
    }

    #[test]
    fn dump_then_load_then_dump_is_byte_identical() {
        let dir = tempdir().unwrap();
        let snap_path = dir.path().join("state.json");

        let mut coordinator = Coordinator::new();
        coordinator.mint_by_activity("alice", 10_000);
        coordinator.mint_by_activity("bob", 10_000);
        coordinator
            .place_order(mkt("alice", 480), Side::Sell, 60, 5, 1, "alice")
            .unwrap();
        coordinator
            .place_order(mkt("alice", 480), Side::Buy, 60, 3, 2, "bob")
            .unwrap();

        dump_state(&coordinator, &snap_path).unwrap();
        let first = std::fs::read(&snap_path).unwrap();

        let reloaded = load_state(&snap_path).unwrap();
        dump_state(&reloaded, &snap_path).unwrap();
        let second = std::fs::read(&snap_path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn load_preserves_fifo_priority_via_timestamps() {
        let dir = tempdir().unwrap();
        let snap_path = dir.path().join("state.json");

        let mut coordinator = Coordinator::new();
        coordinator.mint_by_activity("bob", 10_000);
        coordinator
            .place_order(mkt("alice", 480), Side::Sell, 50, 5, 1, "alice")
            .unwrap();
        coordinator
            .place_order(mkt("alice", 480), Side::Sell, 50, 5, 2, "carol")
            .unwrap();
        dump_state(&coordinator, &snap_path).unwrap();

        let mut reloaded = load_state(&snap_path).unwrap();
        // the earlier resting order (alice's) must still be consumed first
        let outcome = reloaded
            .place_order(mkt("alice", 480), Side::Buy, 50, 5, 3, "bob")
            .unwrap();
        assert_eq!(outcome.trades.len(), 1);
        let alice_id = reloaded.mapper().get("alice").unwrap();
        assert_eq!(outcome.trades[0].seller, alice_id);
    }
}
