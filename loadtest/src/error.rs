//! Error types for profile setup and request execution.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors in the settings of a [`Profile`](crate::Profile).
#[derive(Debug, Error)]
pub enum ProfileError {
    /// The operation weights cannot be sampled, e.g. because all of them are zero.
    #[error("invalid operation weights: {0}")]
    Weights(#[from] rand_distr::weighted::Error),

    /// The minimum wait time exceeds the maximum.
    #[error("invalid wait time: min {min:?} is larger than max {max:?}")]
    WaitTime { min: Duration, max: Duration },

    /// The spawn rate is not a positive number, or too small to space out client starts.
    #[error("invalid spawn rate: {0}")]
    SpawnRate(f64),

    /// A profile needs at least one client.
    #[error("profile has no clients")]
    NoClients,
}

/// A failed request, as recorded in the metrics.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request did not produce a response, e.g. connection refused or timeout.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response status is not accepted by the operation.
    #[error("unexpected status: {0}")]
    UnexpectedStatus(StatusCode),
}
