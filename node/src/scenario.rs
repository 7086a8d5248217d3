//! # Scenario Runner
//!
//! A scenario is a JSON document describing a factory, the accounts and
//! tokens that exist on the ledger, the vaults to create, and an ordered
//! list of steps to replay against them under a manual clock.
//!
//! ```json
//! {
//!   "start": "2026-01-01T00:00:00Z",
//!   "factory": { "address": "factory", "minter": "issuer",
//!                "fee_recipient": "fees", "treasury": "treasury" },
//!   "tokens": ["USDC"],
//!   "accounts": [{ "address": "backer", "native": 5000, "tokens": { "USDC": 500 } }],
//!   "vaults": [{ "label": "roof", "attributes": { "name": "Solar Roof" },
//!                "terms": { "target_balance": 1000,
//!                           "unlock_time": "2026-01-02T00:00:00Z",
//!                           "withdrawal_fee_bps": 100 },
//!                "allocations": [{ "holder": "alice", "shares": 75 }] }],
//!   "steps": [{ "action": "deposit_native", "vault": "roof", "from": "backer", "amount": 1000 },
//!             { "action": "advance_time", "seconds": 172800 },
//!             { "action": "payout", "vault": "roof", "holder": "alice" }]
//! }
//! ```
//!
//! Vaults are referred to by their scenario label. A failing step is
//! logged and recorded in the report; with `strict` the run stops there.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crowdvault_contracts::{
    CreateVault, ErrorKind, FactoryConfig, FactoryError, FactorySnapshot, PayoutReport,
    ShareClassId, StaticAssetRegistry, SweepReport, VaultEnv, VaultFactory, VaultState,
};
use crowdvault_ledger::{AssetId, Clock, Ledger, LedgerError, ManualClock};

use crate::metrics::VaultMetrics;

// ---------------------------------------------------------------------------
// Scenario file
// ---------------------------------------------------------------------------

/// A complete simulation input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Initial clock reading.
    pub start: DateTime<Utc>,
    /// Factory addresses.
    pub factory: FactoryConfig,
    /// Tokens that exist on the ledger.
    #[serde(default)]
    pub tokens: Vec<String>,
    /// Tokens whitelisted in the registry. Defaults to every token.
    #[serde(default)]
    pub whitelist: Option<Vec<String>>,
    /// Initial balances.
    #[serde(default)]
    pub accounts: Vec<AccountSeed>,
    /// Vaults created before the first step, in order.
    #[serde(default)]
    pub vaults: Vec<VaultDefinition>,
    /// Actions replayed in order.
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Starting balances of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSeed {
    /// Account address.
    pub address: String,
    /// Native currency.
    #[serde(default)]
    pub native: u64,
    /// Token balances by symbol.
    #[serde(default)]
    pub tokens: BTreeMap<String, u64>,
    /// Whether the account refuses incoming native transfers.
    #[serde(default)]
    pub rejects_native: bool,
}

/// A vault to create, with the label steps use to refer to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultDefinition {
    /// Scenario-local name.
    pub label: String,
    /// Creation request passed to the factory.
    #[serde(flatten)]
    pub request: CreateVault,
}

/// One action in a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Native deposit through the vault.
    DepositNative { vault: String, from: String, amount: u64 },
    /// Plain token transfer to the vault's address.
    DepositToken {
        vault: String,
        token: String,
        from: String,
        amount: u64,
    },
    /// Moves the clock forward.
    AdvanceTime { seconds: u32 },
    /// Permissionless maturity check.
    CheckMaturity { vault: String },
    /// Redeems all of `holder`'s shares.
    Payout { vault: String, holder: String },
    /// Sends an open vault's leftovers to the treasury.
    Sweep { vault: String },
    /// Moves shares between holders.
    TransferShares {
        vault: String,
        from: String,
        to: String,
        amount: u64,
    },
    /// Whitelists a token.
    AddAsset { token: String },
    /// Removes a token from the whitelist.
    RemoveAsset { token: String },
    /// Freezes every transfer of a token.
    PauseToken { token: String },
    /// Lifts a pause.
    UnpauseToken { token: String },
}

impl Step {
    fn action(&self) -> &'static str {
        match self {
            Step::DepositNative { .. } => "deposit_native",
            Step::DepositToken { .. } => "deposit_token",
            Step::AdvanceTime { .. } => "advance_time",
            Step::CheckMaturity { .. } => "check_maturity",
            Step::Payout { .. } => "payout",
            Step::Sweep { .. } => "sweep",
            Step::TransferShares { .. } => "transfer_shares",
            Step::AddAsset { .. } => "add_asset",
            Step::RemoveAsset { .. } => "remove_asset",
            Step::PauseToken { .. } => "pause_token",
            Step::UnpauseToken { .. } => "unpause_token",
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// What a step produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepResult {
    /// The step went through.
    Applied {
        /// State of the addressed vault afterwards, if the step had one.
        #[serde(skip_serializing_if = "Option::is_none")]
        state: Option<VaultState>,
    },
    /// A payout went through.
    Paid(PayoutReport),
    /// A sweep went through.
    Swept(SweepReport),
    /// The step was rejected.
    Failed {
        /// Error message.
        error: String,
        /// Classification, for errors raised by vaults or the factory.
        #[serde(skip_serializing_if = "Option::is_none")]
        kind: Option<ErrorKind>,
    },
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    /// Position in the scenario, starting at 0.
    pub index: usize,
    /// Clock reading when the step ran.
    pub at: DateTime<Utc>,
    /// The step itself.
    pub step: Step,
    /// What happened.
    pub result: StepResult,
}

/// Final view of one vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultSummary {
    /// Scenario label.
    pub label: String,
    /// Share class id.
    pub share_class: ShareClassId,
    /// Ledger address.
    pub address: String,
    /// Final state.
    pub state: VaultState,
    /// Outstanding shares.
    pub total_supply: u64,
    /// Remaining balance per asset.
    pub balances: BTreeMap<String, u64>,
}

/// Everything `simulate` prints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    /// Per-step outcomes.
    pub steps: Vec<StepOutcome>,
    /// Vaults in definition order.
    pub vaults: Vec<VaultSummary>,
    /// Balances of every seeded account plus fee recipient and treasury.
    pub accounts: BTreeMap<String, BTreeMap<String, u64>>,
    /// Factory snapshot at the end of the run.
    pub snapshot: FactorySnapshot,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
enum StepError {
    #[error("unknown vault label: {0}")]
    UnknownLabel(String),

    #[error("token transfer of {amount} {token} from {from} was refused")]
    TokenRefused { token: String, from: String, amount: u64 },

    #[error("token {0} is not whitelisted")]
    NotWhitelisted(String),

    #[error(transparent)]
    Factory(#[from] FactoryError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl StepError {
    fn kind(&self) -> Option<ErrorKind> {
        match self {
            StepError::Factory(e) => Some(e.kind()),
            _ => None,
        }
    }
}

struct Simulation<'m> {
    ledger: Arc<Ledger>,
    registry: Arc<StaticAssetRegistry>,
    clock: Arc<ManualClock>,
    factory: VaultFactory,
    labels: HashMap<String, ShareClassId>,
    order: Vec<String>,
    tokens: Vec<String>,
    allocated: Vec<String>,
    metrics: &'m VaultMetrics,
}

/// Builds the world a scenario describes and replays its steps.
///
/// # Errors
///
/// Fails if the scenario itself is inconsistent (duplicate labels, a vault
/// the factory refuses to create, unseedable balances), or, with `strict`,
/// on the first failing step.
pub fn run(scenario: Scenario, metrics: &VaultMetrics, strict: bool) -> Result<SimulationReport> {
    let sim = Simulation::setup(&scenario, metrics)?;
    info!(
        vaults = sim.order.len(),
        steps = scenario.steps.len(),
        "scenario loaded"
    );

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.into_iter().enumerate() {
        let at = sim.clock.now();
        let before = sim.states();
        let result = match sim.apply(&step) {
            Ok(result) => result,
            Err(e) => {
                warn!(index, action = step.action(), error = %e, "step failed");
                if strict {
                    bail!("step {} ({}) failed: {}", index, step.action(), e);
                }
                StepResult::Failed {
                    kind: e.kind(),
                    error: e.to_string(),
                }
            }
        };
        sim.record_transitions(&before);
        steps.push(StepOutcome {
            index,
            at,
            step,
            result,
        });
    }

    sim.report(steps, &scenario.accounts)
}

impl<'m> Simulation<'m> {
    fn setup(scenario: &Scenario, metrics: &'m VaultMetrics) -> Result<Self> {
        let ledger = Arc::new(Ledger::new());
        for token in &scenario.tokens {
            ledger.register_token(token);
        }
        let whitelist = scenario.whitelist.as_ref().unwrap_or(&scenario.tokens);
        let registry = Arc::new(StaticAssetRegistry::with_assets(whitelist));

        for account in &scenario.accounts {
            if account.native > 0 {
                ledger
                    .mint(&AssetId::Native, &account.address, account.native)
                    .with_context(|| format!("seeding native balance of {}", account.address))?;
            }
            for (token, amount) in &account.tokens {
                ledger
                    .mint(&AssetId::token(token), &account.address, *amount)
                    .with_context(|| format!("seeding {} balance of {}", token, account.address))?;
            }
            if account.rejects_native {
                ledger.reject_native(&account.address);
            }
        }

        let clock = Arc::new(ManualClock::new(scenario.start));
        let env = VaultEnv {
            ledger: Arc::clone(&ledger),
            registry: registry.clone(),
            clock: clock.clone(),
        };
        let factory = VaultFactory::new(scenario.factory.clone(), env);

        let mut labels = HashMap::new();
        let mut order = Vec::new();
        let mut allocated = Vec::new();
        for definition in &scenario.vaults {
            if labels.contains_key(&definition.label) {
                bail!("duplicate vault label: {}", definition.label);
            }
            let share_class = factory
                .create_vault(&scenario.factory.minter, definition.request.clone())
                .with_context(|| format!("creating vault {}", definition.label))?;
            labels.insert(definition.label.clone(), share_class);
            order.push(definition.label.clone());
            allocated.extend(definition.request.allocations.iter().map(|a| a.holder.clone()));
        }

        Ok(Self {
            ledger,
            registry,
            clock,
            factory,
            labels,
            order,
            tokens: scenario.tokens.clone(),
            allocated,
            metrics,
        })
    }

    fn class(&self, label: &str) -> Result<&str, StepError> {
        self.labels
            .get(label)
            .map(String::as_str)
            .ok_or_else(|| StepError::UnknownLabel(label.to_string()))
    }

    fn apply(&self, step: &Step) -> Result<StepResult, StepError> {
        let applied = |state| StepResult::Applied { state };
        let result = match step {
            Step::DepositNative {
                vault,
                from,
                amount,
            } => applied(Some(
                self.factory.deposit_native(self.class(vault)?, from, *amount)?,
            )),
            Step::DepositToken {
                vault,
                token,
                from,
                amount,
            } => {
                let class = self.class(vault)?;
                let address = self.factory.vault_address(class)?;
                if !self.ledger.transfer_token(token, from, &address, *amount)? {
                    return Err(StepError::TokenRefused {
                        token: token.clone(),
                        from: from.clone(),
                        amount: *amount,
                    });
                }
                applied(Some(self.factory.vault_state(class)?))
            }
            Step::AdvanceTime { seconds } => {
                self.clock.advance(Duration::seconds(i64::from(*seconds)));
                applied(None)
            }
            Step::CheckMaturity { vault } => {
                applied(Some(self.factory.check_maturity(self.class(vault)?)?))
            }
            Step::Payout { vault, holder } => {
                let report = self.factory.request_payout(holder, self.class(vault)?)?;
                self.metrics.observe_payout(&report);
                StepResult::Paid(report)
            }
            Step::Sweep { vault } => {
                let report = self.factory.sweep(self.class(vault)?)?;
                self.metrics.observe_sweep(&report);
                StepResult::Swept(report)
            }
            Step::TransferShares {
                vault,
                from,
                to,
                amount,
            } => {
                self.factory
                    .transfer_shares(self.class(vault)?, from, to, *amount)?;
                applied(None)
            }
            Step::AddAsset { token } => {
                self.registry.add(token);
                applied(None)
            }
            Step::RemoveAsset { token } => {
                if !self.registry.remove(token) {
                    return Err(StepError::NotWhitelisted(token.clone()));
                }
                applied(None)
            }
            Step::PauseToken { token } => {
                self.ledger.pause_token(token);
                applied(None)
            }
            Step::UnpauseToken { token } => {
                self.ledger.unpause_token(token);
                applied(None)
            }
        };
        Ok(result)
    }

    fn states(&self) -> HashMap<ShareClassId, VaultState> {
        self.labels
            .values()
            .filter_map(|class| {
                self.factory
                    .vault_state(class)
                    .ok()
                    .map(|state| (class.clone(), state))
            })
            .collect()
    }

    fn record_transitions(&self, before: &HashMap<ShareClassId, VaultState>) {
        for (class, after) in self.states() {
            let mut from = before.get(&class).copied().unwrap_or(VaultState::Locked);
            // A single step can cross more than one edge.
            while from < after {
                from = match from {
                    VaultState::Locked => VaultState::Unlocked,
                    _ => VaultState::Open,
                };
                self.metrics.observe_transition(from);
            }
        }
    }

    fn balances(&self, holder: &str) -> BTreeMap<String, u64> {
        std::iter::once(AssetId::Native)
            .chain(self.tokens.iter().map(|t| AssetId::token(t)))
            .map(|asset| {
                let balance = self.ledger.balance_of(&asset, holder);
                (asset.to_string(), balance)
            })
            .collect()
    }

    fn report(&self, steps: Vec<StepOutcome>, seeds: &[AccountSeed]) -> Result<SimulationReport> {
        let mut vaults = Vec::with_capacity(self.order.len());
        for label in &self.order {
            let class = self.class(label)?;
            let address = self.factory.vault_address(class)?;
            vaults.push(VaultSummary {
                label: label.clone(),
                share_class: class.to_string(),
                state: self.factory.vault_state(class)?,
                total_supply: self.factory.total_supply(class),
                balances: self.balances(&address),
                address,
            });
        }

        let config = self.factory.config();
        let accounts = seeds
            .iter()
            .map(|s| s.address.as_str())
            .chain([config.fee_recipient.as_str(), config.treasury.as_str()])
            .chain(self.holders().iter().map(String::as_str))
            .map(|holder| (holder.to_string(), self.balances(holder)))
            .collect();

        Ok(SimulationReport {
            steps,
            vaults,
            accounts,
            snapshot: self.factory.snapshot()?,
        })
    }

    /// Initial allocation holders plus anyone who received shares later.
    fn holders(&self) -> Vec<String> {
        let mut holders = self.allocated.clone();
        for class in self.labels.values() {
            holders.extend(self.factory.holders(class).into_iter().map(|(holder, _)| holder));
        }
        holders.sort();
        holders.dedup();
        holders
    }
}
