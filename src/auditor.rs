//! Stateless invariant checks run by the Coordinator after every mutation.
//!
//! None of these functions hold any state of their own; they take a
//! snapshot view of the Engine, Ledger, and IdMapper and either return
//! `Ok(())` or a `CoreError::InternalInvariantViolated` describing exactly
//! what broke. A violation here means a bug upstream, not bad input — the
//! Coordinator treats it as fatal and stops serving further mutations.

use crate::engine::Engine;
use crate::errors::CoreError;
use crate::id_mapper::IdMapper;
use crate::ledger::Ledger;
use std::collections::HashSet;

/// Runs every check in turn, short-circuiting on the first failure.
pub fn audit(engine: &Engine, ledger: &Ledger, mapper: &IdMapper) -> Result<(), CoreError> {
    check_contract_conservation(engine)?;
    check_registry_bijectivity(engine)?;
    check_cash_conservation(engine, ledger)?;
    check_position_consistency(engine, ledger, mapper)?;
    Ok(())
}

/// Every market's open positions must net to exactly zero: for each
/// contract bought, someone else sold one.
fn check_contract_conservation(engine: &Engine) -> Result<(), CoreError> {
    for (market, book) in engine.books() {
        let sum: i64 = book.positions.values().sum();
        if sum != 0 {
            return Err(CoreError::InternalInvariantViolated(format!(
                "contract conservation violated in market {market}: positions sum to {sum}"
            )));
        }
    }
    Ok(())
}

/// The engine's global registry must name exactly the order ids that are
/// actually resting in some book — no more, no less.
fn check_registry_bijectivity(engine: &Engine) -> Result<(), CoreError> {
    let registered: HashSet<_> = engine.registered_order_ids().collect();
    let resting: HashSet<_> = engine
        .books()
        .values()
        .flat_map(|book| book.resting_order_ids())
        .collect();

    if registered != resting {
        let only_registered: Vec<_> = registered.difference(&resting).copied().collect();
        let only_resting: Vec<_> = resting.difference(&registered).copied().collect();
        return Err(CoreError::InternalInvariantViolated(format!(
            "registry out of sync with books: registered-but-not-resting={only_registered:?}, resting-but-not-registered={only_resting:?}"
        )));
    }
    Ok(())
}

/// Cash conservation: the cents held across every account (available +
/// locked) must equal everything minted minus everything actually burned.
/// `burn_shortfall` covers the gap between what a burn requested and what
/// an account could actually pay, so the equality holds exactly even when
/// a burn was floored.
fn check_cash_conservation(engine: &Engine, ledger: &Ledger) -> Result<(), CoreError> {
    let _ = engine; // positions don't carry cash; kept for a uniform signature
    let held: u64 = ledger
        .accounts()
        .values()
        .map(|a| a.available + a.locked)
        .sum();
    let expected = ledger.total_minted() - ledger.total_burned();
    if held != expected {
        return Err(CoreError::InternalInvariantViolated(format!(
            "cash conservation violated: accounts hold {held} cents, expected {expected} \
             (minted {}, burned {}, shortfall {})",
            ledger.total_minted(),
            ledger.total_burned(),
            ledger.burn_shortfall()
        )));
    }
    Ok(())
}

/// Every live resting order's owning user must have a position in the
/// Ledger that reflects their net contracts in that market, and vice versa:
/// `Book.positions` (keyed by internal UserId) and `Ledger.Account.portfolio`
/// (keyed by external user string) are independently mutated and only ever
/// stitched together by the Coordinator's sequencing, so nothing else
/// catches the two silently drifting apart.
fn check_position_consistency(engine: &Engine, ledger: &Ledger, mapper: &IdMapper) -> Result<(), CoreError> {
    for (market, book) in engine.books() {
        for (&user_id, &book_qty) in &book.positions {
            if book_qty == 0 {
                continue;
            }
            let external = mapper.external_of(user_id).ok_or_else(|| {
                CoreError::InternalInvariantViolated(format!(
                    "position consistency violated: user id {user_id} holds {book_qty} in market {market} but has no external identity"
                ))
            })?;
            let ledger_qty = ledger.account(external).portfolio.get(market).copied().unwrap_or(0);
            if ledger_qty != book_qty {
                return Err(CoreError::InternalInvariantViolated(format!(
                    "position consistency violated: {external} holds {book_qty} in book {market} but {ledger_qty} in the ledger"
                )));
            }
        }
    }

    for (user, account) in ledger.accounts() {
        for (market, &ledger_qty) in &account.portfolio {
            if ledger_qty == 0 {
                continue;
            }
            let book_qty = mapper
                .get(user)
                .and_then(|uid| engine.books().get(market).and_then(|book| book.positions.get(&uid).copied()))
                .unwrap_or(0);
            if book_qty != ledger_qty {
                return Err(CoreError::InternalInvariantViolated(format!(
                    "position consistency violated: {user} holds {ledger_qty} in the ledger for {market} but {book_qty} in the book"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MarketId;
    use crate::orders::Side;

    #[test]
    fn passes_on_a_freshly_constructed_pair() {
        let engine = Engine::new();
        let ledger = Ledger::new();
        let mapper = IdMapper::new();
        assert!(audit(&engine, &ledger, &mapper).is_ok());
    }

    #[test]
    fn passes_after_a_balanced_trade() {
        let mut engine = Engine::new();
        let mut ledger = Ledger::new();
        let mut mapper = IdMapper::new();
        let market = MarketId::new("alice", 480);

        let carol = mapper.intern("carol");
        let bob = mapper.intern("bob");

        ledger.mint("bob", 1000);
        ledger.lock_for_buy("bob", 50, 10).unwrap();
        engine.place(market.clone(), Side::Sell, 50, 10, 1, carol).unwrap();
        engine.place(market.clone(), Side::Buy, 50, 10, 2, bob).unwrap();
        ledger.apply_trade(&market, "bob", "carol", 50, 10);
        assert!(audit(&engine, &ledger, &mapper).is_ok());
    }

    #[test]
    fn contract_conservation_catches_an_unbalanced_book() {
        let mut engine = Engine::new();
        let ledger = Ledger::new();
        let mapper = IdMapper::new();
        let market = MarketId::new("alice", 480);
        engine.books_mut().insert(market.clone(), crate::book::Book::new("alice"));
        engine
            .books_mut()
            .get_mut(&market)
            .unwrap()
            .positions
            .insert(42, 5);
        let err = audit(&engine, &ledger, &mapper).unwrap_err();
        assert_eq!(err.tag(), "internal_invariant_violated");
    }

    #[test]
    fn cash_conservation_catches_a_phantom_balance() {
        let engine = Engine::new();
        let mut ledger = Ledger::new();
        let mapper = IdMapper::new();
        ledger.mint("bob", 100);
        ledger.accounts_mut().get_mut("bob").unwrap().available += 1;
        let err = audit(&engine, &ledger, &mapper).unwrap_err();
        assert_eq!(err.tag(), "internal_invariant_violated");
    }

    #[test]
    fn position_consistency_catches_a_desynced_portfolio() {
        let mut engine = Engine::new();
        let ledger = Ledger::new();
        let mut mapper = IdMapper::new();
        let market = MarketId::new("alice", 480);
        let bob = mapper.intern("bob");
        let carol = mapper.intern("carol");

        // the book thinks bob and carol traded 5 contracts; the ledger
        // never saw a matching `apply_trade` call.
        engine.books_mut().insert(market.clone(), crate::book::Book::new("alice"));
        let book = engine.books_mut().get_mut(&market).unwrap();
        book.positions.insert(bob, 5);
        book.positions.insert(carol, -5);

        let err = audit(&engine, &ledger, &mapper).unwrap_err();
        assert_eq!(err.tag(), "internal_invariant_violated");
    }
}
