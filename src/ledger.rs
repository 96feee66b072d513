//! Capital and portfolio bookkeeping. Everything here is denominated in
//! integer cents; the wire module is the only place that ever converts to
//! or from a decimal dollar string.

use crate::errors::LedgerError;
use crate::market::MarketId;
use crate::orders::Side;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    pub available: u64,
    pub locked: u64,
    pub portfolio: HashMap<MarketId, i64>,
}

#[derive(Debug, Default)]
pub struct Ledger {
    accounts: HashMap<String, Account>,
    /// Total cents ever minted, for the cash-conservation invariant.
    total_minted: u64,
    /// Total cents actually removed from circulation by `burn` (bounded by
    /// what each account had available — see `burn_shortfall`).
    total_burned: u64,
    /// Cents requested to be burned beyond what was available; `burn` is
    /// floored at zero rather than going negative (§9), so this tracks the
    /// resulting gap in the conservation law.
    burn_shortfall: u64,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    fn account_mut(&mut self, user: &str) -> &mut Account {
        self.accounts.entry(user.to_string()).or_default()
    }

    pub fn account(&self, user: &str) -> Account {
        self.accounts.get(user).cloned().unwrap_or_default()
    }

    pub fn accounts(&self) -> &HashMap<String, Account> {
        &self.accounts
    }

    pub fn accounts_mut(&mut self) -> &mut HashMap<String, Account> {
        &mut self.accounts
    }

    pub fn total_minted(&self) -> u64 {
        self.total_minted
    }

    pub fn total_burned(&self) -> u64 {
        self.total_burned
    }

    pub fn burn_shortfall(&self) -> u64 {
        self.burn_shortfall
    }

    /// Establishes a fresh minted/burned baseline after loading accounts
    /// from a snapshot, which persists only current balances and not the
    /// full minting history. Sets `total_minted` to whatever cash the
    /// loaded accounts hold and zeroes `total_burned`/`burn_shortfall`, so
    /// the cash-conservation invariant holds starting from this snapshot.
    pub fn seed_totals_from_accounts(&mut self) {
        self.total_minted = self.accounts.values().map(|a| a.available + a.locked).sum();
        self.total_burned = 0;
        self.burn_shortfall = 0;
    }

    /// Moves `price * qty` from `available` to `locked`; rejects if short.
    /// Sell orders never call this — short sales don't lock cash.
    pub fn lock_for_buy(&mut self, user: &str, price: u64, qty: u64) -> Result<(), LedgerError> {
        let cost = price * qty;
        let account = self.account_mut(user);
        if account.available < cost {
            warn!(user, cost, available = account.available, "insufficient funds to lock");
            return Err(LedgerError::InsufficientFunds);
        }
        account.available -= cost;
        account.locked += cost;
        Ok(())
    }

    /// Inverse of `lock_for_buy`: used on cancel and on price-improvement refunds.
    pub fn release_lock(&mut self, user: &str, price: u64, qty: u64) {
        let amount = price * qty;
        let account = self.account_mut(user);
        account.locked = account.locked.saturating_sub(amount);
        account.available += amount;
    }

    /// Settles one trade's cash and position legs. The buyer's locked cash
    /// is consumed (assumed already reduced to `price` by any upstream
    /// price-improvement refund); the seller is credited fresh.
    pub fn apply_trade(
        &mut self,
        market: &MarketId,
        buyer: &str,
        seller: &str,
        price: u64,
        qty: u64,
    ) {
        let proceeds = price * qty;

        let buyer_acct = self.account_mut(buyer);
        buyer_acct.locked = buyer_acct.locked.saturating_sub(proceeds);
        *buyer_acct.portfolio.entry(market.clone()).or_insert(0) += qty as i64;

        let seller_acct = self.account_mut(seller);
        seller_acct.available += proceeds;
        *seller_acct.portfolio.entry(market.clone()).or_insert(0) -= qty as i64;

        info!(market = %market, buyer, seller, price, qty, "ledger: trade applied");
    }

    /// Terminal liquidation of one user's position in a settled market.
    pub fn apply_settlement_trade(
        &mut self,
        user: &str,
        market: &MarketId,
        side: Side,
        qty: u64,
        terminal_price: u8,
    ) {
        let proceeds = terminal_price as u64 * qty;
        let account = self.account_mut(user);
        match side {
            // user is the buyer leg of the settlement trade (was short, House sold to them): they pay
            Side::Buy => account.available = account.available.saturating_sub(proceeds),
            // user is the seller leg (was long, House bought from them): they are paid
            Side::Sell => account.available += proceeds,
        }
        account.portfolio.insert(market.clone(), 0);
        info!(market = %market, user, ?side, qty, terminal_price, "ledger: settlement trade applied");
    }

    /// External economic event: credits `amount` cents (e.g. `proof_of_walk`).
    pub fn mint(&mut self, user: &str, amount: u64) {
        self.account_mut(user).available += amount;
        self.total_minted += amount;
        info!(user, amount, "ledger: minted");
    }

    /// External economic event: debits up to `amount` cents, floored at
    /// zero (e.g. `doomscroll_burn`). Returns the amount actually burned.
    pub fn burn(&mut self, user: &str, amount: u64) -> u64 {
        let account = self.account_mut(user);
        let burned = amount.min(account.available);
        account.available -= burned;
        self.total_burned += burned;
        self.burn_shortfall += amount - burned;
        info!(user, requested = amount, burned, "ledger: burned");
        burned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mkt() -> MarketId {
        MarketId::new("alice", 480)
    }

    #[test]
    fn lock_for_buy_moves_cash_from_available_to_locked() {
        let mut l = Ledger::new();
        l.mint("bob", 1000);
        l.lock_for_buy("bob", 60, 10).unwrap();
        let acct = l.account("bob");
        assert_eq!(acct.available, 400);
        assert_eq!(acct.locked, 600);
    }

    #[test]
    fn lock_for_buy_rejects_when_short() {
        let mut l = Ledger::new();
        l.mint("bob", 100);
        assert_eq!(
            l.lock_for_buy("bob", 60, 10).unwrap_err(),
            LedgerError::InsufficientFunds
        );
        // no partial mutation on rejection
        assert_eq!(l.account("bob").available, 100);
        assert_eq!(l.account("bob").locked, 0);
    }

    #[test]
    fn release_lock_is_the_exact_inverse_of_lock_for_buy() {
        let mut l = Ledger::new();
        l.mint("bob", 1000);
        l.lock_for_buy("bob", 40, 10).unwrap();
        l.release_lock("bob", 40, 10);
        let acct = l.account("bob");
        assert_eq!(acct.available, 1000);
        assert_eq!(acct.locked, 0);
    }

    #[test]
    fn apply_trade_moves_proceeds_and_updates_portfolios() {
        let mut l = Ledger::new();
        l.mint("bob", 1000);
        l.lock_for_buy("bob", 60, 10).unwrap();
        l.apply_trade(&mkt(), "bob", "alice", 60, 10);

        let bob = l.account("bob");
        assert_eq!(bob.locked, 0);
        assert_eq!(*bob.portfolio.get(&mkt()).unwrap(), 10);

        let alice = l.account("alice");
        assert_eq!(alice.available, 600);
        assert_eq!(*alice.portfolio.get(&mkt()).unwrap(), -10);
    }

    #[test]
    fn apply_settlement_trade_credits_the_seller_leg_and_debits_the_buyer_leg() {
        let mut l = Ledger::new();
        l.mint("dave", 1000);
        // bob was long (closes out as the seller leg against House)
        l.apply_settlement_trade("bob", &mkt(), Side::Sell, 10, 1);
        // dave was short (closes out as the buyer leg against House)
        l.apply_settlement_trade("dave", &mkt(), Side::Buy, 10, 1);

        assert_eq!(l.account("bob").available, 10);
        assert_eq!(l.account("dave").available, 990);
        assert_eq!(*l.account("bob").portfolio.get(&mkt()).unwrap(), 0);
    }

    #[test]
    fn burn_floors_at_zero_and_records_shortfall() {
        let mut l = Ledger::new();
        l.mint("bob", 50);
        let burned = l.burn("bob", 80);
        assert_eq!(burned, 50);
        assert_eq!(l.account("bob").available, 0);
        assert_eq!(l.total_burned(), 50);
        assert_eq!(l.burn_shortfall(), 30);
    }

    #[test]
    fn mint_then_burn_is_the_only_source_and_sink_of_cash() {
        let mut l = Ledger::new();
        l.mint("bob", 200);
        l.burn("bob", 50);
        assert_eq!(l.total_minted(), 200);
        assert_eq!(l.total_burned(), 50);
        assert_eq!(l.account("bob").available, 150);
    }
}
