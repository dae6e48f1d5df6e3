//! Load tester for the product API.
//!
//! Runs groups of simulated clients that issue a weighted random mix of health probes, product
//! reads and product creates against a target, then prints per-operation metrics.
#![warn(missing_debug_implementations)]

fn main() -> anyhow::Result<()> {
    loadtest::cli::execute()
}
