use crate::market::MarketId;
use crate::orders::OrderId;
use thiserror::Error;

/// Errors a single [`crate::book::Book`] can raise from `place`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookError {
    #[error("market {0} is no longer active")]
    InactiveMarket(MarketId),
    #[error("order id {0} already exists in this market")]
    DuplicateOrderId(OrderId),
    #[error("price must be positive")]
    NonPositivePrice,
    #[error("quantity must be positive")]
    NonPositiveQty,
}

/// Errors the [`crate::ledger::Ledger`] can raise.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient available funds")]
    InsufficientFunds,
}

/// The error surface of the [`crate::coordinator::Coordinator`], serialized
/// to the wire as a stable string tag (see [`crate::wire`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("order id {0} already exists")]
    DuplicateOrderId(OrderId),
    #[error("market {0} is no longer active")]
    InactiveMarket(MarketId),
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("unknown order {0}")]
    UnknownOrder(OrderId),
    #[error("internal invariant violated: {0}")]
    InternalInvariantViolated(String),
}

impl CoreError {
    /// Stable machine-readable tag for the wire `status`/`error` field.
    pub fn tag(&self) -> &'static str {
        match self {
            CoreError::InvalidArgument(_) => "invalid_argument",
            CoreError::DuplicateOrderId(_) => "duplicate_order_id",
            CoreError::InactiveMarket(_) => "inactive_market",
            CoreError::InsufficientFunds => "insufficient_funds",
            CoreError::UnknownOrder(_) => "unknown_order",
            CoreError::InternalInvariantViolated(_) => "internal_invariant_violated",
        }
    }
}

impl From<BookError> for CoreError {
    fn from(e: BookError) -> Self {
        match e {
            BookError::InactiveMarket(m) => CoreError::InactiveMarket(m),
            BookError::DuplicateOrderId(id) => CoreError::DuplicateOrderId(id),
            BookError::NonPositivePrice => {
                CoreError::InvalidArgument("price must be positive".into())
            }
            BookError::NonPositiveQty => {
                CoreError::InvalidArgument("quantity must be positive".into())
            }
        }
    }
}

impl From<LedgerError> for CoreError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientFunds => CoreError::InsufficientFunds,
        }
    }
}
