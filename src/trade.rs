use crate::market::MarketId;
use crate::orders::{Side, UserId};
use serde::{Deserialize, Serialize};

/// An executed match between a resting maker and an incoming taker.
///
/// - `price` is always the maker's resting price (the taker may have been
///   willing to pay/accept worse — see price improvement).
/// - `taker_side` records which side was the aggressor, for display and for
///   the Coordinator's price-improvement refund logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub market: MarketId,
    pub buyer: UserId,
    pub seller: UserId,
    pub price: u64,
    pub quantity: u64,
    pub taker_side: Side,
    /// Monotonic sequence number assigned by the [`crate::engine::Engine`]
    /// across all books; used as the trade archive's tie-breaker.
    pub seq: u64,
}
