//! Per-operation metrics collected during a run, and the summary printed at the end.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use sketches_ddsketch::{DDSketch, DDSketchError};
use yansi::Paint;

use crate::error::RequestError;
use crate::http::Transport;
use crate::operation::OperationKind;

/// Outcome counts and latencies for a single operation kind.
#[derive(Default)]
pub struct OperationMetrics {
    /// Latency in seconds of every request that received a response.
    timing: DDSketch,
    /// Requests classified as successful.
    pub successes: u64,
    /// Requests that failed for any reason.
    pub failures: u64,
    /// Failed requests by response status.
    pub unexpected_statuses: BTreeMap<u16, u64>,
    /// Requests that did not receive a response.
    pub transport_errors: u64,
}

impl OperationMetrics {
    /// Records the outcome of one request.
    pub fn record(&mut self, elapsed: Duration, result: &Result<(), RequestError>) {
        match result {
            Ok(()) => {
                self.successes += 1;
                self.timing.add(elapsed.as_secs_f64());
            }
            Err(RequestError::UnexpectedStatus(status)) => {
                self.failures += 1;
                *self.unexpected_statuses.entry(status.as_u16()).or_default() += 1;
                self.timing.add(elapsed.as_secs_f64());
            }
            Err(RequestError::Transport(_)) => {
                self.failures += 1;
                self.transport_errors += 1;
            }
        }
    }

    /// Total number of recorded requests.
    pub fn requests(&self) -> u64 {
        self.successes + self.failures
    }

    /// Returns the latency at the given quantile, if any request received a response.
    pub fn latency(&self, quantile: f64) -> Option<Duration> {
        let seconds = self.timing.quantile(quantile).ok().flatten()?;
        Some(Duration::from_secs_f64(seconds.max(0.0)))
    }

    /// Average latency of all requests that received a response.
    pub fn average_latency(&self) -> Option<Duration> {
        let count = self.timing.count();
        let sum = self.timing.sum()?;
        (count > 0).then(|| Duration::from_secs_f64((sum / count as f64).max(0.0)))
    }

    fn merge(&mut self, other: &Self) -> Result<(), DDSketchError> {
        self.timing.merge(&other.timing)?;
        self.successes += other.successes;
        self.failures += other.failures;
        for (status, count) in &other.unexpected_statuses {
            *self.unexpected_statuses.entry(*status).or_default() += count;
        }
        self.transport_errors += other.transport_errors;
        Ok(())
    }
}

impl fmt::Debug for OperationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationMetrics")
            .field("successes", &self.successes)
            .field("failures", &self.failures)
            .field("unexpected_statuses", &self.unexpected_statuses)
            .field("transport_errors", &self.transport_errors)
            .finish_non_exhaustive()
    }
}

/// Metrics of all operations performed within one profile.
#[derive(Debug, Default)]
pub struct ProfileMetrics {
    operations: BTreeMap<OperationKind, OperationMetrics>,
}

impl ProfileMetrics {
    /// Records the outcome of one request of the given kind.
    pub fn record(
        &mut self,
        kind: OperationKind,
        elapsed: Duration,
        result: &Result<(), RequestError>,
    ) {
        self.operations
            .entry(kind)
            .or_default()
            .record(elapsed, result);
    }

    /// Metrics of a single operation kind, if it was performed at all.
    pub fn get(&self, kind: OperationKind) -> Option<&OperationMetrics> {
        self.operations.get(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (OperationKind, &OperationMetrics)> {
        self.operations.iter().map(|(kind, metrics)| (*kind, metrics))
    }

    /// Total number of recorded requests across all operations.
    pub fn requests(&self) -> u64 {
        self.operations.values().map(|m| m.requests()).sum()
    }

    /// Total number of failed requests across all operations.
    pub fn failures(&self) -> u64 {
        self.operations.values().map(|m| m.failures).sum()
    }

    /// Adds all metrics of `other` into this instance.
    pub fn merge(&mut self, other: &Self) -> Result<(), DDSketchError> {
        for (kind, metrics) in &other.operations {
            self.operations.entry(*kind).or_default().merge(metrics)?;
        }
        Ok(())
    }
}

/// Summary of a single profile after a run.
#[derive(Debug)]
pub struct ProfileReport {
    pub name: String,
    pub clients: usize,
    /// Clients that stopped abnormally. Their metrics are not included.
    pub failed_clients: usize,
    pub transport: Transport,
    pub metrics: ProfileMetrics,
}

/// Summary of a completed run.
#[derive(Debug)]
pub struct Report {
    /// Wall time the clients were running.
    pub elapsed: Duration,
    pub profiles: Vec<ProfileReport>,
    /// Metrics of all profiles combined.
    pub totals: ProfileMetrics,
}

impl Report {
    pub(crate) fn new(
        elapsed: Duration,
        profiles: Vec<ProfileReport>,
    ) -> Result<Self, DDSketchError> {
        let mut totals = ProfileMetrics::default();
        for profile in &profiles {
            totals.merge(&profile.metrics)?;
        }

        Ok(Self {
            elapsed,
            profiles,
            totals,
        })
    }

    /// Number of clients across all profiles whose metrics are missing.
    pub fn failed_clients(&self) -> usize {
        self.profiles.iter().map(|p| p.failed_clients).sum()
    }

    /// Prints the report to stdout.
    pub fn print(&self) {
        for profile in &self.profiles {
            println!();
            println!(
                "{} {} (transport: {:?}, clients: {})",
                "## Profile".bold(),
                profile.name.bold().blue(),
                profile.transport,
                profile.clients.bold()
            );
            if profile.failed_clients > 0 {
                println!(
                    "  {}",
                    format!("{} clients failed, metrics incomplete", profile.failed_clients)
                        .bold()
                        .red()
                );
            }
            print_metrics(&profile.metrics, self.elapsed);
        }

        println!();
        println!("{}", "## TOTALS".bold());
        let failed_clients = self.failed_clients();
        if failed_clients > 0 {
            println!("  {}", format!("{failed_clients} clients failed").bold().red());
        }
        print_metrics(&self.totals, self.elapsed);
        println!();
    }
}

fn print_metrics(metrics: &ProfileMetrics, duration: Duration) {
    for (kind, operation) in metrics.iter() {
        print!(
            "{} ({} ops",
            format!("{kind}:").bold().green(),
            operation.requests().bold()
        );
        if operation.failures > 0 {
            print!(
                ", {}",
                format!("{} FAILURES", operation.failures).bold().red()
            );
        }
        println!(")");

        print_ops(operation.requests(), duration);
        print_percentiles(operation);
        print_failures(operation);
    }
}

fn print_ops(ops: u64, duration: Duration) {
    let ops_ps = ops as f64 / duration.as_secs_f64().max(f64::EPSILON);
    println!("  {:.2} operations/s", ops_ps.bold());
}

fn print_percentiles(metrics: &OperationMetrics) {
    let Some(avg) = metrics.average_latency() else {
        return;
    };
    let p50 = metrics.latency(0.5).unwrap_or_default();
    let p90 = metrics.latency(0.9).unwrap_or_default();
    let p99 = metrics.latency(0.99).unwrap_or_default();
    println!(
        "  avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
        avg.bold()
    );
}

fn print_failures(metrics: &OperationMetrics) {
    for (status, count) in &metrics.unexpected_statuses {
        println!("  {} status {status}", count.red());
    }
    if metrics.transport_errors > 0 {
        println!("  {} transport errors", metrics.transport_errors.red());
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::*;

    #[test]
    fn records_outcomes() {
        let mut metrics = ProfileMetrics::default();
        let ms = Duration::from_millis(10);

        metrics.record(OperationKind::ReadProduct, ms, &Ok(()));
        metrics.record(OperationKind::ReadProduct, ms, &Ok(()));
        metrics.record(
            OperationKind::ReadProduct,
            ms,
            &Err(RequestError::UnexpectedStatus(StatusCode::INTERNAL_SERVER_ERROR)),
        );
        metrics.record(
            OperationKind::ReadMissingProduct,
            ms,
            &Err(RequestError::UnexpectedStatus(StatusCode::OK)),
        );

        let reads = metrics.get(OperationKind::ReadProduct).unwrap();
        assert_eq!(reads.successes, 2);
        assert_eq!(reads.failures, 1);
        assert_eq!(reads.unexpected_statuses[&500], 1);
        assert!(reads.latency(0.5).is_some());

        assert!(metrics.get(OperationKind::Health).is_none());
        assert_eq!(metrics.requests(), 4);
        assert_eq!(metrics.failures(), 2);
    }

    #[test]
    fn totals_merge_profiles() {
        let mut first = ProfileMetrics::default();
        first.record(OperationKind::Health, Duration::from_millis(1), &Ok(()));
        let mut second = ProfileMetrics::default();
        second.record(OperationKind::Health, Duration::from_millis(3), &Ok(()));
        second.record(
            OperationKind::CreateProduct,
            Duration::from_millis(2),
            &Err(RequestError::UnexpectedStatus(StatusCode::BAD_REQUEST)),
        );

        let profiles = [first, second]
            .into_iter()
            .enumerate()
            .map(|(i, metrics)| ProfileReport {
                name: format!("profile-{i}"),
                clients: 1,
                failed_clients: i,
                transport: Transport::Pooled,
                metrics,
            })
            .collect();
        let report = Report::new(Duration::from_secs(1), profiles).unwrap();

        let health = report.totals.get(OperationKind::Health).unwrap();
        assert_eq!(health.successes, 2);
        assert_eq!(report.failed_clients(), 1);
        assert_eq!(report.totals.failures(), 1);
        assert_eq!(
            report.totals.get(OperationKind::CreateProduct).unwrap().unexpected_statuses[&400],
            1
        );

        let avg = health.average_latency().unwrap();
        assert!(avg > Duration::from_millis(1) && avg < Duration::from_millis(3));
    }
}
