//! Gas estimation for execution waves and conversion of gas to cost

use crate::batch::BatchOperation;

use alloy_primitives::U256;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Converts an amount of gas into a monetary estimate (wei)
pub trait GasPricer: Send + Sync {
    fn cost_of(&self, gas: u64) -> U256;
}

impl<F> GasPricer for F
where
    F: Fn(u64) -> U256 + Send + Sync,
{
    fn cost_of(&self, gas: u64) -> U256 {
        self(gas)
    }
}

/// Flat per-gas price, typically taken from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedGasPrice {
    price_per_gas_wei: U256,
}

impl FixedGasPrice {
    pub fn new(price_per_gas_wei: u64) -> Self {
        Self {
            price_per_gas_wei: U256::from(price_per_gas_wei),
        }
    }
}

impl GasPricer for FixedGasPrice {
    fn cost_of(&self, gas: u64) -> U256 {
        U256::from(gas).saturating_mul(self.price_per_gas_wei)
    }
}

/// Gas estimator for waves of operations
#[derive(Clone)]
pub struct GasEstimator {
    pricer: Arc<dyn GasPricer>,
}

impl GasEstimator {
    /// Create a new gas estimator around a price function
    pub fn new(pricer: Arc<dyn GasPricer>) -> Self {
        Self { pricer }
    }

    /// Estimate gas for a wave.
    ///
    /// Concurrent submissions to distinct targets do not serialize cost, so a
    /// parallel wave costs as much as its most expensive member. A sequential
    /// wave costs the sum of its members.
    pub fn estimate_wave_gas<'a, I>(&self, members: I, parallelizable: bool) -> u64
    where
        I: IntoIterator<Item = &'a BatchOperation>,
    {
        let limits = members.into_iter().map(|op| op.gas_limit);
        if parallelizable {
            limits.max().unwrap_or(0)
        } else {
            limits.fold(0u64, |acc, gas| acc.saturating_add(gas))
        }
    }

    /// Naive gas total when every operation is submitted on its own
    pub fn total_gas<'a, I>(&self, operations: I) -> u64
    where
        I: IntoIterator<Item = &'a BatchOperation>,
    {
        self.estimate_wave_gas(operations, false)
    }

    /// Calculate total cost in wei
    pub fn calculate_cost(&self, gas: u64) -> U256 {
        self.pricer.cost_of(gas)
    }
}

impl fmt::Debug for GasEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GasEstimator").finish_non_exhaustive()
    }
}

/// Gas saved by grouping operations into waves
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GasSavings {
    pub gas_before: u64,
    pub gas_after: u64,
    pub gas_saved: u64,
    pub percent_saved: f64,
}

impl GasSavings {
    pub fn compute(gas_before: u64, gas_after: u64) -> Self {
        let gas_saved = gas_before.saturating_sub(gas_after);
        let percent_saved = if gas_before == 0 {
            0.0
        } else {
            gas_saved as f64 * 100.0 / gas_before as f64
        };

        Self {
            gas_before,
            gas_after,
            gas_saved,
            percent_saved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(limits: &[u64]) -> Vec<BatchOperation> {
        limits
            .iter()
            .enumerate()
            .map(|(i, &gas)| {
                BatchOperation::builder(format!("op-{}", i), format!("0x{}", i))
                    .gas_limit(gas)
                    .build()
            })
            .collect()
    }

    #[test]
    fn test_parallel_wave_uses_max() {
        let estimator = GasEstimator::new(Arc::new(FixedGasPrice::new(1)));
        let wave = ops(&[50_000, 80_000, 30_000]);
        assert_eq!(estimator.estimate_wave_gas(&wave, true), 80_000);
        assert_eq!(estimator.estimate_wave_gas(&wave, false), 160_000);
    }

    #[test]
    fn test_empty_wave_is_free() {
        let estimator = GasEstimator::new(Arc::new(FixedGasPrice::new(1)));
        let empty: Vec<BatchOperation> = Vec::new();
        assert_eq!(estimator.estimate_wave_gas(&empty, true), 0);
        assert_eq!(estimator.total_gas(&empty), 0);
    }

    #[test]
    fn test_cost_uses_injected_pricer() {
        let estimator = GasEstimator::new(Arc::new(|gas: u64| U256::from(gas * 3)));
        assert_eq!(estimator.calculate_cost(100), U256::from(300));

        let fixed = GasEstimator::new(Arc::new(FixedGasPrice::new(2_000_000_000)));
        assert_eq!(
            fixed.calculate_cost(21_000),
            U256::from(42_000_000_000_000u64)
        );
    }

    #[test]
    fn test_savings_percentage() {
        let savings = GasSavings::compute(200_000, 150_000);
        assert_eq!(savings.gas_saved, 50_000);
        assert!((savings.percent_saved - 25.0).abs() < f64::EPSILON);

        let none = GasSavings::compute(0, 0);
        assert_eq!(none.percent_saved, 0.0);
    }
}
