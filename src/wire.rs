//! The single point where external representations convert to and from the
//! internal integer-cents world: decimal dollar strings for money, and the
//! `proof_of_walk`/`doomscroll_burn` unit conversions. No other module is
//! allowed to parse or format money, and nothing in this crate ever does
//! arithmetic on `f64`.

use crate::book::BookSnapshot;
use crate::coordinator::{BalanceOutcome, CancelOrderOutcome, PlaceOrderOutcome, SettleOutcome};
use crate::engine::MarketSummary;
use crate::errors::CoreError;
use crate::market::MarketId;
use crate::orders::{OrderId, Side};
use crate::trade::Trade;
use serde::{Deserialize, Serialize};

/// 1 cent per 20 steps, rounded down.
pub const CENTS_PER_STEP_BATCH: u64 = 1;
pub const STEPS_PER_CENT_BATCH: u64 = 20;

/// 1 cent per minute.
pub const CENTS_PER_MINUTE: u64 = 1;

pub fn steps_to_cents(steps: u64) -> u64 {
    (steps / STEPS_PER_CENT_BATCH) * CENTS_PER_STEP_BATCH
}

pub fn minutes_to_cents(minutes: u64) -> u64 {
    minutes * CENTS_PER_MINUTE
}

/// Formats integer cents as a fixed-point decimal dollar string, e.g.
/// `1234` -> `"12.34"`. Never routes through a float.
pub fn cents_to_dollars(cents: u64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

/// Parses a two-fractional-digit decimal dollar string back to integer
/// cents. Returns `None` on anything that isn't exactly `\d+\.\d{2}`.
pub fn dollars_to_cents(s: &str) -> Option<u64> {
    let (whole, frac) = s.split_once('.')?;
    if frac.len() != 2 {
        return None;
    }
    let whole: u64 = whole.parse().ok()?;
    let frac: u64 = frac.parse().ok()?;
    whole.checked_mul(100)?.checked_add(frac)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireRequest {
    GetMarkets,
    GetSnapshot {
        market_id: String,
    },
    PlaceOrder {
        market_id: String,
        user_id: String,
        side: Side,
        price: u64,
        qty: u64,
        id: OrderId,
    },
    CancelOrder {
        id: OrderId,
        user_id: String,
    },
    Balance {
        user_id: String,
    },
    ProofOfWalk {
        user_id: String,
        steps: u64,
    },
    DoomscrollBurn {
        user_id: String,
        minutes: u64,
    },
    Settle {
        target_user_id: String,
        actual_value: u64,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct WireMarketSummary {
    pub id: String,
    pub name: String,
    pub best_bid: Option<u64>,
    pub best_ask: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireLevel {
    pub price: u64,
    pub qty: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireTrade {
    pub market_id: String,
    pub buyer: String,
    pub seller: String,
    pub price: u64,
    pub qty: u64,
    pub taker_side: Side,
    pub seq: u64,
}

fn wire_trade(t: &Trade, mapper: &crate::id_mapper::IdMapper) -> WireTrade {
    let resolve = |uid: u64| -> String {
        if uid == u64::MAX {
            "house".to_string()
        } else {
            mapper.external_of(uid).map(str::to_string).unwrap_or_else(|| uid.to_string())
        }
    };
    WireTrade {
        market_id: t.market.code(),
        buyer: resolve(t.buyer),
        seller: resolve(t.seller),
        price: t.price,
        qty: t.quantity,
        taker_side: t.taker_side,
        seq: t.seq,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum WireResponse {
    Markets {
        markets: Vec<WireMarketSummary>,
    },
    Snapshot {
        bids: Vec<WireLevel>,
        asks: Vec<WireLevel>,
    },
    PlaceOrder {
        status: &'static str,
        trades: Vec<WireTrade>,
        resting_qty: u64,
    },
    CancelOrder {
        status: &'static str,
        refunded: String,
    },
    Balance {
        available: String,
        locked: String,
        positions: Vec<(String, i64)>,
    },
    Minted {
        minted: String,
    },
    Burned {
        burned: String,
    },
    Settle {
        trades: Vec<WireTrade>,
    },
    Error {
        status: &'static str,
        error: String,
    },
}

pub fn error_response(err: &CoreError) -> WireResponse {
    WireResponse::Error { status: err.tag(), error: err.to_string() }
}

pub fn markets_response(markets: Vec<MarketSummary>) -> WireResponse {
    WireResponse::Markets {
        markets: markets
            .into_iter()
            .map(|m| WireMarketSummary {
                id: m.market.code(),
                name: m.name,
                best_bid: m.best_bid,
                best_ask: m.best_ask,
            })
            .collect(),
    }
}

pub fn snapshot_response(snap: BookSnapshot) -> WireResponse {
    WireResponse::Snapshot {
        bids: snap.bids.into_iter().map(|(price, qty)| WireLevel { price, qty }).collect(),
        asks: snap.asks.into_iter().map(|(price, qty)| WireLevel { price, qty }).collect(),
    }
}

pub fn place_order_response(outcome: PlaceOrderOutcome, mapper: &crate::id_mapper::IdMapper) -> WireResponse {
    WireResponse::PlaceOrder {
        status: "ok",
        trades: outcome.trades.iter().map(|t| wire_trade(t, mapper)).collect(),
        resting_qty: outcome.resting_qty,
    }
}

pub fn cancel_order_response(outcome: CancelOrderOutcome) -> WireResponse {
    WireResponse::CancelOrder { status: "ok", refunded: cents_to_dollars(outcome.refunded) }
}

pub fn balance_response(outcome: BalanceOutcome) -> WireResponse {
    WireResponse::Balance {
        available: cents_to_dollars(outcome.available),
        locked: cents_to_dollars(outcome.locked),
        positions: outcome
            .positions
            .into_iter()
            .map(|(m, qty)| (m.code(), qty))
            .collect(),
    }
}

pub fn settle_response(outcome: SettleOutcome, mapper: &crate::id_mapper::IdMapper) -> WireResponse {
    WireResponse::Settle { trades: outcome.trades.iter().map(|t| wire_trade(t, mapper)).collect() }
}

pub fn parse_market_id(s: &str) -> Result<MarketId, CoreError> {
    MarketId::parse(s).ok_or_else(|| CoreError::InvalidArgument(format!("malformed market id {s:?}")))
}
