//! Integration tests for the vault factory and vault lifecycle.
//!
//! These tests drive a factory end to end against a shared ledger and a
//! manual clock: deposits before and after the unlock time, sole and split
//! redemptions, token transfer failures, and redemption attempts on a vault
//! that has not matured.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use crowdvault_contracts::{
    CreateVault, ErrorKind, FactoryConfig, FactoryError, ShareAllocation, StaticAssetRegistry,
    VaultAttributes, VaultEnv, VaultError, VaultEvent, VaultFactory, VaultState, VaultTerms,
};
use crowdvault_ledger::{AssetId, Ledger, ManualClock};

struct Fixture {
    factory: Arc<VaultFactory>,
    ledger: Arc<Ledger>,
    registry: Arc<StaticAssetRegistry>,
    clock: Arc<ManualClock>,
    start: DateTime<Utc>,
}

/// Helper: a factory over a ledger with USDC registered and a few funded
/// depositors.
fn fixture() -> Fixture {
    let ledger = Arc::new(Ledger::new());
    ledger.register_token("USDC");
    ledger.register_token("DAI");
    for depositor in ["backer1", "backer2"] {
        ledger.mint(&AssetId::Native, depositor, 10_000_000).unwrap();
        ledger.mint(&AssetId::token("USDC"), depositor, 10_000_000).unwrap();
        ledger.mint(&AssetId::token("DAI"), depositor, 10_000_000).unwrap();
    }

    let registry = Arc::new(StaticAssetRegistry::with_assets(["USDC"]));
    let start = Utc::now();
    let clock = Arc::new(ManualClock::new(start));
    let env = VaultEnv {
        ledger: Arc::clone(&ledger),
        registry: registry.clone(),
        clock: clock.clone(),
    };
    let config = FactoryConfig {
        address: "factory".into(),
        minter: "issuer".into(),
        fee_recipient: "fees".into(),
        treasury: "treasury".into(),
    };

    Fixture {
        factory: Arc::new(VaultFactory::new(config, env)),
        ledger,
        registry,
        clock,
        start,
    }
}

/// Helper: creates a vault unlocking one day after the fixture start.
fn create_vault(fx: &Fixture, target: u64, fee_bps: u16, holders: &[(&str, u64)]) -> String {
    let request = CreateVault {
        attributes: VaultAttributes {
            name: "Solar Roof".into(),
            description: "Panels for the community center".into(),
            ..Default::default()
        },
        terms: VaultTerms {
            target_balance: target,
            unlock_time: fx.start + Duration::days(1),
            withdrawal_fee_bps: fee_bps,
        },
        allocations: holders
            .iter()
            .map(|(holder, shares)| ShareAllocation {
                holder: holder.to_string(),
                shares: *shares,
            })
            .collect(),
    };
    fx.factory.create_vault("issuer", request).unwrap()
}

fn native(fx: &Fixture, holder: &str) -> u64 {
    fx.ledger.balance_of(&AssetId::Native, holder)
}

fn usdc(fx: &Fixture, holder: &str) -> u64 {
    fx.ledger.balance_of(&AssetId::token("USDC"), holder)
}

fn deposit_usdc(fx: &Fixture, class: &str, amount: u64) {
    let vault = fx.factory.vault_address(class).unwrap();
    assert!(fx.ledger.transfer_token("USDC", "backer2", &vault, amount).unwrap());
}

fn state_changes(fx: &Fixture, class: &str) -> Vec<(VaultState, VaultState)> {
    fx.factory
        .events(class)
        .unwrap()
        .into_iter()
        .filter_map(|e| match e {
            VaultEvent::StateChanged { from, to } => Some((from, to)),
            _ => None,
        })
        .collect()
}

/// Helper: funds a vault with native currency and moves past the unlock time.
fn matured(fx: &Fixture, class: &str, native_amount: u64) {
    fx.clock.set(fx.start + Duration::days(2));
    assert_eq!(
        fx.factory.deposit_native(class, "backer1", native_amount).unwrap(),
        VaultState::Unlocked
    );
}

// ---------------------------------------------------------------------------
// Maturity
// ---------------------------------------------------------------------------

#[test]
fn deposit_before_unlock_time_stays_locked_then_auto_unlocks() {
    let fx = fixture();
    let class = create_vault(&fx, 100, 0, &[("alice", 100)]);

    fx.clock.set(fx.start + Duration::hours(1));
    assert_eq!(fx.factory.deposit_native(&class, "backer1", 50).unwrap(), VaultState::Locked);

    fx.clock.set(fx.start + Duration::days(1) + Duration::seconds(1));
    assert_eq!(fx.factory.deposit_native(&class, "backer1", 50).unwrap(), VaultState::Unlocked);

    assert_eq!(
        state_changes(&fx, &class),
        vec![(VaultState::Locked, VaultState::Unlocked)]
    );
}

#[test]
fn balance_without_time_or_time_without_balance_does_not_unlock() {
    let fx = fixture();
    let class = create_vault(&fx, 100, 0, &[("alice", 100)]);

    fx.factory.deposit_native(&class, "backer1", 100).unwrap();
    assert_eq!(fx.factory.vault_state(&class).unwrap(), VaultState::Locked);

    let other = create_vault(&fx, 100, 0, &[("alice", 100)]);
    fx.clock.set(fx.start + Duration::days(3));
    assert_eq!(fx.factory.deposit_native(&other, "backer1", 99).unwrap(), VaultState::Locked);
    let err = fx.factory.check_maturity(&other).unwrap_err();
    assert!(matches!(err, FactoryError::Vault(VaultError::NotMatured { .. })));
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
}

#[test]
fn token_funded_vault_unlocks_through_explicit_check_only_once() {
    let fx = fixture();
    let class = create_vault(&fx, 1_000, 0, &[("alice", 10)]);
    deposit_usdc(&fx, &class, 1_000);
    fx.clock.set(fx.start + Duration::days(2));

    // No hook on token receipt.
    assert_eq!(fx.factory.vault_state(&class).unwrap(), VaultState::Locked);

    assert_eq!(fx.factory.check_maturity(&class).unwrap(), VaultState::Unlocked);
    let err = fx.factory.check_maturity(&class).unwrap_err();
    assert_eq!(
        err,
        FactoryError::Vault(VaultError::AlreadyUnlocked(VaultState::Unlocked))
    );
    assert_eq!(state_changes(&fx, &class).len(), 1);
}

#[test]
fn aggregate_balance_follows_registry() {
    let fx = fixture();
    let class = create_vault(&fx, 1_000, 0, &[("alice", 10)]);
    let vault = fx.factory.vault_address(&class).unwrap();

    fx.factory.deposit_native(&class, "backer1", 300).unwrap();
    deposit_usdc(&fx, &class, 200);
    assert!(fx.ledger.transfer_token("DAI", "backer2", &vault, 500).unwrap());

    // DAI is not whitelisted yet.
    assert_eq!(fx.factory.aggregate_balance(&class).unwrap(), 500);

    fx.registry.add("DAI");
    assert_eq!(fx.factory.aggregate_balance(&class).unwrap(), 1_000);

    fx.registry.remove("USDC");
    assert_eq!(fx.factory.aggregate_balance(&class).unwrap(), 800);
}

// ---------------------------------------------------------------------------
// Payouts
// ---------------------------------------------------------------------------

#[test]
fn sole_holder_redeems_everything_and_opens_vault() {
    let fx = fixture();
    let class = create_vault(&fx, 1_000, 250, &[("alice", 1_000)]);
    matured(&fx, &class, 1_000);

    let report = fx.factory.request_payout("alice", &class).unwrap();
    assert_eq!(report.state, VaultState::Open);
    assert_eq!(native(&fx, "alice"), 975);
    assert_eq!(native(&fx, "fees"), 25);
    assert_eq!(fx.factory.aggregate_balance(&class).unwrap(), 0);

    assert_eq!(fx.factory.balance_of(&class, "alice"), 0);
    assert_eq!(fx.factory.total_supply(&class), 0);
    assert_eq!(
        state_changes(&fx, &class).last(),
        Some(&(VaultState::Unlocked, VaultState::Open))
    );
}

#[test]
fn zero_balance_and_dust_assets_are_skipped() {
    let fx = fixture();
    let class = create_vault(&fx, 100, 100, &[("alice", 1), ("bob", 2)]);
    // 1/3 of a single USDC truncates to nothing for alice.
    deposit_usdc(&fx, &class, 1);
    matured(&fx, &class, 99);
    // Whitelisted, but the vault holds none.
    fx.registry.add("DAI");
    let before = fx.factory.events(&class).unwrap().len();

    let report = fx.factory.request_payout("alice", &class).unwrap();
    assert_eq!(report.paid.len(), 1);
    assert!(report.split_for(&AssetId::token("USDC")).is_none());
    assert!(report.split_for(&AssetId::token("DAI")).is_none());
    assert!(report.failures.is_empty());
    assert_eq!(usdc(&fx, "alice"), 0);
    assert_eq!(usdc(&fx, "fees"), 0);

    // Native 99 * 1/3 = 33 with a fee that truncates to 0: one withdrawal,
    // no fee event, nothing for the skipped tokens.
    let events = fx.factory.events(&class).unwrap();
    assert_eq!(
        &events[before..],
        &[VaultEvent::Withdrawal {
            asset: AssetId::Native,
            recipient: "alice".into(),
            amount: 33,
        }]
    );

    // The dust goes to the last redeemer.
    let report = fx.factory.request_payout("bob", &class).unwrap();
    assert_eq!(report.split_for(&AssetId::token("USDC")).unwrap().gross, 1);
    assert!(report.split_for(&AssetId::token("DAI")).is_none());
    assert_eq!(usdc(&fx, "bob"), 1);
    assert_eq!(native(&fx, "bob"), 66);
}

#[test]
fn split_holders_are_paid_against_live_balances() {
    let fx = fixture();
    let class = create_vault(&fx, 1_000, 100, &[("alice", 75), ("bob", 25)]);
    deposit_usdc(&fx, &class, 400);
    matured(&fx, &class, 1_000);

    let first = fx.factory.request_payout("alice", &class).unwrap();
    assert_eq!(first.state, VaultState::Unlocked);
    assert_eq!(native(&fx, "alice"), 743); // 750 - 7
    assert_eq!(usdc(&fx, "alice"), 297); // 300 - 3
    assert_eq!(fx.factory.total_supply(&class), 25);

    let second = fx.factory.request_payout("bob", &class).unwrap();
    assert_eq!(second.state, VaultState::Open);
    assert_eq!(native(&fx, "bob"), 248); // 250 - 2
    assert_eq!(usdc(&fx, "bob"), 99); // 100 - 1
    assert_eq!(native(&fx, "fees"), 9);
    assert_eq!(usdc(&fx, "fees"), 4);
    assert_eq!(fx.factory.aggregate_balance(&class).unwrap(), 0);

    let changes = state_changes(&fx, &class);
    assert_eq!(
        changes,
        vec![
            (VaultState::Locked, VaultState::Unlocked),
            (VaultState::Unlocked, VaultState::Open),
        ]
    );
}

#[test]
fn failing_token_does_not_block_native_payout() {
    let fx = fixture();
    let class = create_vault(&fx, 100, 0, &[("alice", 10)]);
    deposit_usdc(&fx, &class, 50);
    matured(&fx, &class, 100);
    fx.ledger.pause_token("USDC");

    let report = fx.factory.request_payout("alice", &class).unwrap();
    assert_eq!(report.state, VaultState::Open);
    assert_eq!(native(&fx, "alice"), 100);
    assert_eq!(usdc(&fx, "alice"), 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].asset, AssetId::token("USDC"));

    let events = fx.factory.events(&class).unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        VaultEvent::TransferFailed { asset, amount: 50, .. } if *asset == AssetId::token("USDC")
    )));

    // Shares are burned even though the token leg failed; the leftover is
    // recoverable by the treasury sweep.
    assert_eq!(fx.factory.total_supply(&class), 0);
    fx.ledger.unpause_token("USDC");
    let sweep = fx.factory.sweep(&class).unwrap();
    assert_eq!(sweep.swept, vec![(AssetId::token("USDC"), 50)]);
    assert_eq!(usdc(&fx, "treasury"), 50);
}

#[test]
fn payout_before_unlock_is_rejected_without_side_effects() {
    let fx = fixture();
    let class = create_vault(&fx, 1_000, 100, &[("alice", 10)]);
    fx.factory.deposit_native(&class, "backer1", 500).unwrap();
    let events_before = fx.factory.events(&class).unwrap().len();

    let err = fx.factory.request_payout("alice", &class).unwrap_err();
    assert_eq!(
        err,
        FactoryError::Vault(VaultError::VaultNotUnlocked(VaultState::Locked))
    );
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    assert_eq!(native(&fx, "alice"), 0);
    assert_eq!(fx.factory.aggregate_balance(&class).unwrap(), 500);
    assert_eq!(fx.factory.balance_of(&class, "alice"), 10);
    assert_eq!(fx.factory.events(&class).unwrap().len(), events_before);
}

#[test]
fn native_transfer_failure_aborts_payout_and_keeps_shares() {
    let fx = fixture();
    let class = create_vault(&fx, 100, 500, &[("alice", 10)]);
    matured(&fx, &class, 100);
    fx.ledger.reject_native("fees");

    let err = fx.factory.request_payout("alice", &class).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransferFailed);
    assert_eq!(fx.factory.vault_state(&class).unwrap(), VaultState::Unlocked);
    assert_eq!(fx.factory.balance_of(&class, "alice"), 10);
    assert_eq!(native(&fx, "alice"), 0);

    fx.ledger.accept_native("fees");
    let report = fx.factory.request_payout("alice", &class).unwrap();
    assert_eq!(report.state, VaultState::Open);
    assert_eq!(native(&fx, "alice"), 95);
}

#[test]
fn holder_without_shares_cannot_redeem() {
    let fx = fixture();
    let class = create_vault(&fx, 100, 0, &[("alice", 10)]);
    matured(&fx, &class, 100);

    let err = fx.factory.request_payout("carol", &class).unwrap_err();
    assert!(matches!(err, FactoryError::NoShares { .. }));
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);

    let err = fx.factory.request_payout("alice", "no-such-class").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn payouts_sum_to_original_balance_across_many_holders() {
    let fx = fixture();
    let holders: Vec<(String, u64)> = [13u64, 7, 29, 1, 50, 3, 97]
        .iter()
        .enumerate()
        .map(|(i, s)| (format!("holder{}", i), *s))
        .collect();
    let refs: Vec<(&str, u64)> = holders.iter().map(|(h, s)| (h.as_str(), *s)).collect();
    let total: u64 = holders.iter().map(|(_, s)| s).sum();

    let class = create_vault(&fx, 1_000, 333, &refs);
    deposit_usdc(&fx, &class, 77_777);
    matured(&fx, &class, 1_000_003);
    let original_native = 1_000_003u64;
    let original_usdc = 77_777u64;

    // Redeem in an order unrelated to allocation order.
    let order = [4usize, 0, 6, 2, 5, 1, 3];
    let n = holders.len() as u64;
    let mut gross_native = 0u64;
    let mut gross_usdc = 0u64;
    for &i in &order {
        let (holder, shares) = &holders[i];
        let report = fx.factory.request_payout(holder, &class).unwrap();

        let n_split = report.split_for(&AssetId::Native).unwrap();
        let ideal = original_native * shares / total;
        assert!(n_split.gross >= ideal && n_split.gross <= ideal + n);
        gross_native += n_split.gross;

        let u_split = report.split_for(&AssetId::token("USDC")).unwrap();
        let ideal = original_usdc * shares / total;
        assert!(u_split.gross >= ideal && u_split.gross <= ideal + n);
        gross_usdc += u_split.gross;
    }

    assert_eq!(gross_native, original_native);
    assert_eq!(gross_usdc, original_usdc);

    let paid_native: u64 = holders.iter().map(|(h, _)| native(&fx, h)).sum::<u64>() + native(&fx, "fees");
    let paid_usdc: u64 = holders.iter().map(|(h, _)| usdc(&fx, h)).sum::<u64>() + usdc(&fx, "fees");
    assert_eq!(paid_native, original_native);
    assert_eq!(paid_usdc, original_usdc);
    assert_eq!(fx.factory.vault_state(&class).unwrap(), VaultState::Open);
}

// ---------------------------------------------------------------------------
// Lifecycle guards
// ---------------------------------------------------------------------------

#[test]
fn open_vault_never_regresses() {
    let fx = fixture();
    let class = create_vault(&fx, 10, 0, &[("alice", 1)]);
    matured(&fx, &class, 10);
    fx.factory.request_payout("alice", &class).unwrap();

    assert_eq!(
        fx.factory.check_maturity(&class).unwrap_err(),
        FactoryError::Vault(VaultError::AlreadyUnlocked(VaultState::Open))
    );
    assert_eq!(
        fx.factory.deposit_native(&class, "backer1", 10).unwrap_err(),
        FactoryError::Vault(VaultError::DepositsClosed)
    );
    assert_eq!(fx.factory.vault_state(&class).unwrap(), VaultState::Open);
}

#[test]
fn sweep_requires_open_vault() {
    let fx = fixture();
    let class = create_vault(&fx, 10, 0, &[("alice", 1)]);
    matured(&fx, &class, 10);

    assert_eq!(
        fx.factory.sweep(&class).unwrap_err(),
        FactoryError::Vault(VaultError::NotOpen(VaultState::Unlocked))
    );
}

#[test]
fn only_minter_creates_vaults_and_mints_while_locked() {
    let fx = fixture();
    let request = CreateVault {
        attributes: VaultAttributes::default(),
        terms: VaultTerms {
            target_balance: 1,
            unlock_time: fx.start,
            withdrawal_fee_bps: 0,
        },
        allocations: vec![ShareAllocation {
            holder: "alice".into(),
            shares: 1,
        }],
    };
    let err = fx.factory.create_vault("mallory", request.clone()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let mut bad_fee = request.clone();
    bad_fee.terms.withdrawal_fee_bps = 10_001;
    assert_eq!(
        fx.factory.create_vault("issuer", bad_fee).unwrap_err(),
        FactoryError::Vault(VaultError::InvalidFee(10_001))
    );
    assert!(fx.factory.share_classes().is_empty());

    let class = fx.factory.create_vault("issuer", request).unwrap();
    fx.factory.mint_shares("issuer", &class, "bob", 4).unwrap();
    assert_eq!(fx.factory.total_supply(&class), 5);

    matured(&fx, &class, 1);
    let err = fx.factory.mint_shares("issuer", &class, "bob", 1).unwrap_err();
    assert!(matches!(err, FactoryError::MintClosed { state: VaultState::Unlocked, .. }));
}

#[test]
fn transferred_shares_redeem_for_new_holder() {
    let fx = fixture();
    let class = create_vault(&fx, 100, 0, &[("alice", 10)]);
    fx.factory.transfer_shares(&class, "alice", "dave", 4).unwrap();
    matured(&fx, &class, 100);

    fx.factory.request_payout("dave", &class).unwrap();
    assert_eq!(native(&fx, "dave"), 40);
    assert_eq!(
        fx.factory.holders(&class),
        vec![("alice".to_string(), 6)]
    );
}

// ---------------------------------------------------------------------------
// Concurrency & persistence
// ---------------------------------------------------------------------------

#[test]
fn concurrent_redemptions_by_one_holder_pay_once() {
    let fx = fixture();
    let class = create_vault(&fx, 1_000, 0, &[("alice", 60), ("bob", 40)]);
    matured(&fx, &class, 1_000);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let factory = Arc::clone(&fx.factory);
            let class = class.clone();
            std::thread::spawn(move || factory.request_payout("alice", &class))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, FactoryError::NoShares { .. })));
    assert_eq!(native(&fx, "alice"), 600);
    assert_eq!(fx.factory.vault_state(&class).unwrap(), VaultState::Unlocked);
}

#[test]
fn snapshot_restores_vaults_and_shares() {
    let fx = fixture();
    let class = create_vault(&fx, 100, 200, &[("alice", 3), ("bob", 1)]);
    matured(&fx, &class, 400);
    fx.factory.request_payout("alice", &class).unwrap();

    let json = serde_json::to_string(&fx.factory.snapshot().unwrap()).unwrap();
    let snapshot = serde_json::from_str(&json).unwrap();
    let env = VaultEnv {
        ledger: Arc::clone(&fx.ledger),
        registry: fx.registry.clone(),
        clock: fx.clock.clone(),
    };
    let restored = VaultFactory::restore(snapshot, env).unwrap();

    assert_eq!(restored.share_classes(), vec![class.clone()]);
    assert_eq!(restored.vault_state(&class).unwrap(), VaultState::Unlocked);
    assert_eq!(restored.total_supply(&class), 1);
    assert_eq!(restored.record(&class).unwrap().terms.withdrawal_fee_bps, 200);

    let report = restored.request_payout("bob", &class).unwrap();
    assert_eq!(report.state, VaultState::Open);
    assert_eq!(native(&fx, "bob"), 98); // 100 - 2
}
