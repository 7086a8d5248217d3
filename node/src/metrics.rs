//! # Prometheus Metrics
//!
//! Counters collected while a scenario runs, rendered in the Prometheus
//! text exposition format when the run finishes.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crowdvault_contracts::{PayoutReport, SweepReport, VaultState};

/// Holds all Prometheus metric handles for a simulation.
#[derive(Clone)]
pub struct VaultMetrics {
    registry: Registry,
    /// Successful payouts.
    pub payouts_total: IntCounter,
    /// Fees that reached the fee recipient, by asset.
    pub fees_collected_total: IntCounterVec,
    /// Vault state transitions, by target state.
    pub state_transitions_total: IntCounterVec,
    /// Token legs that failed during payouts and sweeps.
    pub token_transfer_failures_total: IntCounter,
}

impl VaultMetrics {
    /// Creates and registers all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("crowdvault".into()), None)?;

        let payouts_total = IntCounter::new("payouts_total", "Total number of completed payouts")?;
        registry.register(Box::new(payouts_total.clone()))?;

        let fees_collected_total = IntCounterVec::new(
            Opts::new(
                "fees_collected_total",
                "Withdrawal fees delivered to the fee recipient, in base units",
            ),
            &["asset"],
        )?;
        registry.register(Box::new(fees_collected_total.clone()))?;

        let state_transitions_total = IntCounterVec::new(
            Opts::new("state_transitions_total", "Vault lifecycle transitions"),
            &["to"],
        )?;
        registry.register(Box::new(state_transitions_total.clone()))?;

        let token_transfer_failures_total = IntCounter::new(
            "token_transfer_failures_total",
            "Token transfers that failed and were skipped",
        )?;
        registry.register(Box::new(token_transfer_failures_total.clone()))?;

        Ok(Self {
            registry,
            payouts_total,
            fees_collected_total,
            state_transitions_total,
            token_transfer_failures_total,
        })
    }

    /// Records a completed payout. Fees whose transfer failed are not
    /// counted as collected.
    pub fn observe_payout(&self, report: &PayoutReport) {
        self.payouts_total.inc();
        for paid in report.paid.iter().filter(|p| p.split.fee > 0 && p.fee_delivered) {
            self.fees_collected_total
                .with_label_values(&[&paid.asset.to_string()])
                .inc_by(paid.split.fee);
        }
        self.token_transfer_failures_total
            .inc_by(report.failures.len() as u64);
    }

    /// Records failed legs of a sweep.
    pub fn observe_sweep(&self, report: &SweepReport) {
        self.token_transfer_failures_total
            .inc_by(report.failures.len() as u64);
    }

    /// Records one lifecycle transition.
    pub fn observe_transition(&self, to: VaultState) {
        self.state_transitions_total
            .with_label_values(&[&to.to_string()])
            .inc();
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowdvault_contracts::math::Split;
    use crowdvault_contracts::vault::AssetPayout;
    use crowdvault_contracts::TransferError;
    use crowdvault_ledger::AssetId;

    #[test]
    fn transitions_are_labelled_by_target_state() {
        let metrics = VaultMetrics::new().unwrap();
        metrics.observe_transition(VaultState::Unlocked);
        metrics.observe_transition(VaultState::Open);
        metrics.observe_transition(VaultState::Unlocked);

        assert_eq!(
            metrics
                .state_transitions_total
                .with_label_values(&["Unlocked"])
                .get(),
            2
        );
        let text = metrics.encode().unwrap();
        assert!(text.contains("crowdvault_state_transitions_total{to=\"Open\"} 1"));
    }

    #[test]
    fn empty_payout_report_counts_one_payout() {
        let metrics = VaultMetrics::new().unwrap();
        let report = PayoutReport {
            share_class: "class".into(),
            state: VaultState::Unlocked,
            paid: Vec::new(),
            failures: Vec::new(),
        };
        metrics.observe_payout(&report);
        assert_eq!(metrics.payouts_total.get(), 1);
        assert_eq!(metrics.token_transfer_failures_total.get(), 0);
    }

    #[test]
    fn failed_net_leg_does_not_hide_collected_fee() {
        // The redeemer is also the fee recipient; only the net leg failed.
        let metrics = VaultMetrics::new().unwrap();
        let usdc = AssetId::token("USDC");
        let report = PayoutReport {
            share_class: "class".into(),
            state: VaultState::Open,
            paid: vec![AssetPayout {
                asset: usdc.clone(),
                balance: 100,
                split: Split {
                    gross: 100,
                    fee: 10,
                    net: 90,
                },
                net_delivered: false,
                fee_delivered: true,
            }],
            failures: vec![TransferError {
                asset: usdc,
                recipient: "fees".into(),
                amount: 90,
                reason: "token transfer returned false".into(),
            }],
        };
        metrics.observe_payout(&report);

        assert_eq!(
            metrics
                .fees_collected_total
                .with_label_values(&["token:USDC"])
                .get(),
            10
        );
        assert_eq!(metrics.token_transfer_failures_total.get(), 1);
    }
}
