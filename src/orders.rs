use crate::market::MarketId;
use serde::{Deserialize, Serialize};

/// Opaque, client-assigned, globally unique order identifier.
pub type OrderId = u32;

/// Internal user identifier; never exposed across the wire (see [`crate::id_mapper`]).
pub type UserId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// A resting order. GTC limit only — there are no market orders and no
/// order types beyond limit + explicit cancel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub side: Side,
    /// Price in cents; unconstrained by the type but expected to be 1..=99.
    pub price: u64,
    /// Contracts remaining; decremented in place as the order fills.
    pub quantity: u64,
    /// Monotonic logical clock, not wall time, so FIFO order survives a
    /// snapshot/reload verbatim.
    pub timestamp: u64,
    pub market: MarketId,
}
