use bon::Builder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Ok,
    Failing,
}

/// Persisted reconciliation progress for one test module.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, Builder)]
pub struct StatusCheckpoint {
    #[builder(into)]
    pub module: String,
    /// Upload horizon already incorporated, in microseconds. Never decreases.
    pub status_timestamp: i64,
    pub status: Status,
    #[builder(default)]
    pub failing_test_cases: BTreeSet<String>,
    #[builder(default)]
    pub pass_count: usize,
    #[builder(default)]
    pub fail_count: usize,
}
