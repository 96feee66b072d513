//! The single writer: orchestrates Engine, Ledger, IdMapper and the
//! Auditor behind one typed `Command` dispatch. This is the only place in
//! the crate that mutates more than one subsystem for a single request.

use crate::auditor;
use crate::book::{BookSnapshot, CanceledOrder};
use crate::engine::{Engine, MarketSummary};
use crate::errors::CoreError;
use crate::id_mapper::IdMapper;
use crate::ledger::{Account, Ledger};
use crate::market::MarketId;
use crate::orders::{OrderId, Side};
use crate::trade::Trade;
use tracing::{error, info, warn};

pub struct Coordinator {
    engine: Engine,
    ledger: Ledger,
    mapper: IdMapper,
    /// Set once the Auditor reports a violated invariant. Every dispatch
    /// short-circuits on this before touching state.
    poisoned: bool,
}

#[derive(Debug, Clone)]
pub struct PlaceOrderOutcome {
    pub trades: Vec<Trade>,
    pub resting_qty: u64,
}

#[derive(Debug, Clone)]
pub struct CancelOrderOutcome {
    pub refunded: u64,
}

#[derive(Debug, Clone)]
pub struct SettleOutcome {
    pub trades: Vec<Trade>,
}

#[derive(Debug, Clone)]
pub struct BalanceOutcome {
    pub available: u64,
    pub locked: u64,
    pub positions: Vec<(MarketId, i64)>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            engine: Engine::new(),
            ledger: Ledger::new(),
            mapper: IdMapper::new(),
            poisoned: false,
        }
    }

    /// Reconstructs a Coordinator from loaded subsystem state, e.g. after
    /// [`crate::persistence::load_state`]. Assumed consistent on entry; the
    /// next mutating dispatch will audit it regardless.
    pub fn from_parts(engine: Engine, ledger: Ledger, mapper: IdMapper) -> Self {
        Self { engine, ledger, mapper, poisoned: false }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn mapper(&self) -> &IdMapper {
        &self.mapper
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn poisoned_check(&self) -> Result<(), CoreError> {
        if self.poisoned {
            return Err(CoreError::InternalInvariantViolated(
                "coordinator is poisoned; reload from a snapshot to continue".into(),
            ));
        }
        Ok(())
    }

    fn audit(&mut self) -> Result<(), CoreError> {
        if let Err(e) = auditor::audit(&self.engine, &self.ledger, &self.mapper) {
            error!(error = %e, "auditor detected a violated invariant; coordinator is now poisoned");
            self.poisoned = true;
            return Err(e);
        }
        Ok(())
    }

    /// Validates, locks funds if needed, matches, applies trades (with
    /// price-improvement refunds), audits.
    #[allow(clippy::too_many_arguments)]
    pub fn place_order(
        &mut self,
        market: MarketId,
        side: Side,
        price: u64,
        qty: u64,
        order_id: OrderId,
        user: &str,
    ) -> Result<PlaceOrderOutcome, CoreError> {
        self.poisoned_check()?;
        if price == 0 {
            return Err(CoreError::InvalidArgument("price must be positive".into()));
        }
        if qty == 0 {
            return Err(CoreError::InvalidArgument("quantity must be positive".into()));
        }

        let internal_user = self.mapper.intern(user);

        if side == Side::Buy {
            self.ledger.lock_for_buy(user, price, qty).map_err(|e| {
                warn!(user, price, qty, "place_order rejected: insufficient funds");
                CoreError::from(e)
            })?;
        }

        let (trades, resting_qty) = match self
            .engine
            .place(market.clone(), side, price, qty, order_id, internal_user)
        {
            Ok(result) => result,
            Err(e) => {
                // roll back the lock: the book never saw this order
                if side == Side::Buy {
                    self.ledger.release_lock(user, price, qty);
                }
                warn!(order_id, market = %market, error = %e, "place_order rejected");
                return Err(CoreError::from(e));
            }
        };

        for trade in &trades {
            if side == Side::Buy && trade.buyer == internal_user && trade.price < price {
                let improvement = price - trade.price;
                self.ledger.release_lock(user, improvement, trade.quantity);
            }
            let buyer_ext = self.external_id_of(trade.buyer);
            let seller_ext = self.external_id_of(trade.seller);
            self.ledger
                .apply_trade(&market, &buyer_ext, &seller_ext, trade.price, trade.quantity);
        }

        self.audit()?;
        info!(order_id, market = %market, trades = trades.len(), resting_qty, "place_order complete");
        Ok(PlaceOrderOutcome { trades, resting_qty })
    }

    pub fn cancel_order(&mut self, order_id: OrderId, user: &str) -> Result<CancelOrderOutcome, CoreError> {
        self.poisoned_check()?;
        let canceled = self
            .engine
            .cancel(order_id)
            .ok_or(CoreError::UnknownOrder(order_id))?;

        let refunded = if canceled.side == Side::Buy {
            let amount = canceled.price * canceled.quantity;
            self.ledger.release_lock(user, canceled.price, canceled.quantity);
            amount
        } else {
            0
        };

        self.audit()?;
        info!(order_id, refunded, "cancel_order complete");
        Ok(CancelOrderOutcome { refunded })
    }

    /// Settles every market belonging to `subject` at a terminal price
    /// derived from `actual_value`, releasing locks for canceled resting
    /// buys and applying every synthetic settlement trade.
    pub fn settle(&mut self, subject: &str, actual_value: u64) -> Result<SettleOutcome, CoreError> {
        self.poisoned_check()?;
        let (trades, canceled) = self.engine.settle_all_for_subject(subject, actual_value);

        for c in &canceled {
            if c.side == Side::Buy {
                let user = self.external_id_of(c.user_id);
                self.ledger.release_lock(&user, c.price, c.quantity);
            }
        }

        for trade in &trades {
            // exactly one side of a settlement trade is the real user, the
            // other is the symbolic House sentinel.
            if trade.buyer != u64::MAX {
                let user = self.external_id_of(trade.buyer);
                self.ledger
                    .apply_settlement_trade(&user, &trade.market, Side::Buy, trade.quantity, trade.price as u8);
            }
            if trade.seller != u64::MAX {
                let user = self.external_id_of(trade.seller);
                self.ledger
                    .apply_settlement_trade(&user, &trade.market, Side::Sell, trade.quantity, trade.price as u8);
            }
        }

        self.audit()?;
        info!(subject, actual_value, trades = trades.len(), canceled = canceled.len(), "settle complete");
        Ok(SettleOutcome { trades })
    }

    pub fn get_markets(&self) -> Vec<MarketSummary> {
        self.engine.list_active_markets()
    }

    pub fn get_snapshot(&self, market: &MarketId) -> Result<BookSnapshot, CoreError> {
        self.engine
            .snapshot(market)
            .ok_or_else(|| CoreError::InvalidArgument(format!("unknown market {market}")))
    }

    pub fn get_balance(&self, user: &str) -> BalanceOutcome {
        let account: Account = self.ledger.account(user);
        BalanceOutcome {
            available: account.available,
            locked: account.locked,
            positions: account.portfolio.into_iter().collect(),
        }
    }

    pub fn mint_by_activity(&mut self, user: &str, amount: u64) -> u64 {
        self.ledger.mint(user, amount);
        info!(user, amount, "mint_by_activity complete");
        amount
    }

    pub fn burn_by_usage(&mut self, user: &str, amount: u64) -> u64 {
        let burned = self.ledger.burn(user, amount);
        info!(user, requested = amount, burned, "burn_by_usage complete");
        burned
    }

    /// Reverse-looks-up the external string for an internal user id, for
    /// trades that only carry the integer form. The House sentinel
    /// (`u64::MAX`) must never reach this path.
    fn external_id_of(&self, internal: crate::orders::UserId) -> String {
        debug_assert_ne!(internal, u64::MAX, "House sentinel has no external identity");
        self.mapper
            .external_of(internal)
            .map(str::to_string)
            .unwrap_or_else(|| internal.to_string())
    }
}
