//! Submission capability consumed by the executor
//!
//! The executor never signs or broadcasts anything itself. It hands each
//! operation to a [`Submitter`] and interprets the [`SubmissionOutcome`].
//! Callers that want retries wrap their own submitter.

use crate::batch::BatchOperation;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::collections::HashSet;
use std::future::Future;
use tracing::debug;

/// Prefix that marks a handle as simulated
pub const DRY_RUN_HANDLE_PREFIX: &str = "dryrun:";

/// What the external system reported for one submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionOutcome {
    pub success: bool,
    /// Transaction hash or other receipt handle
    pub handle: Option<String>,
    pub error: Option<String>,
    /// Gas actually consumed, when the submitter knows it
    pub gas_used: Option<u64>,
}

impl SubmissionOutcome {
    pub fn confirmed(handle: impl Into<String>) -> Self {
        Self {
            success: true,
            handle: Some(handle.into()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_gas_used(mut self, gas_used: u64) -> Self {
        self.gas_used = Some(gas_used);
        self
    }
}

/// Performs one operation against its target system.
///
/// Implementations may be asynchronous, side-effecting and non-idempotent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, operation: &BatchOperation) -> SubmissionOutcome;
}

/// Adapts an async closure into a [`Submitter`]
pub struct FnSubmitter<F> {
    f: F,
}

impl<F, Fut> FnSubmitter<F>
where
    F: Fn(BatchOperation) -> Fut + Send + Sync,
    Fut: Future<Output = SubmissionOutcome> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Submitter for FnSubmitter<F>
where
    F: Fn(BatchOperation) -> Fut + Send + Sync,
    Fut: Future<Output = SubmissionOutcome> + Send,
{
    async fn submit(&self, operation: &BatchOperation) -> SubmissionOutcome {
        (self.f)(operation.clone()).await
    }
}

/// Simulates submissions without touching any external system.
///
/// Handles are derived from the operation id, so repeated runs produce the
/// same output and a simulated handle can never be mistaken for a real hash.
#[derive(Debug, Clone, Default)]
pub struct DryRunSubmitter {
    fail_ids: HashSet<String>,
}

impl DryRunSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the given operation ids report failure
    pub fn failing<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fail_ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Deterministic handle for an operation id
    pub fn simulated_handle(id: &str) -> String {
        let digest = Keccak256::digest(id.as_bytes());
        format!("{}0x{}", DRY_RUN_HANDLE_PREFIX, hex::encode(&digest[..8]))
    }
}

#[async_trait]
impl Submitter for DryRunSubmitter {
    async fn submit(&self, operation: &BatchOperation) -> SubmissionOutcome {
        if self.fail_ids.contains(&operation.id) {
            debug!("Dry run: simulating failure for {}", operation.id);
            return SubmissionOutcome::failed(format!(
                "dry run: simulated failure for {}",
                operation.id
            ));
        }

        debug!("Dry run: simulating submission of {}", operation.id);
        SubmissionOutcome::confirmed(Self::simulated_handle(&operation.id))
            .with_gas_used(operation.gas_limit)
    }
}
