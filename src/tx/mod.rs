//! Gas estimation and the submission capability

mod gas;
mod sender;

pub use gas::{FixedGasPrice, GasEstimator, GasPricer, GasSavings};
pub use sender::{
    DryRunSubmitter, FnSubmitter, SubmissionOutcome, Submitter, DRY_RUN_HANDLE_PREFIX,
};

#[cfg(test)]
pub use sender::MockSubmitter;
