//! Run profiles of simulated clients concurrently against the product API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::http::HttpRemote;
use crate::profile::{Profile, SimulatedClient};
use crate::report::{ProfileMetrics, ProfileReport, Report};

/// Runs the given profiles concurrently against the target.
///
/// All clients stop once `duration` has elapsed or `shutdown` is cancelled, whichever comes first.
/// Requests still in flight at that point are abandoned and do not show up in the report.
pub async fn run(
    target: &str,
    profiles: Vec<Profile>,
    duration: Duration,
    shutdown: CancellationToken,
) -> Result<Report> {
    let bar = ProgressBar::new_spinner()
        .with_style(ProgressStyle::with_template("{spinner} {msg} {elapsed}")?)
        .with_message("Running load test:");
    bar.enable_steady_tick(Duration::from_millis(100));

    let stop = shutdown.child_token();
    let start = Instant::now();
    tokio::spawn(cancel_after(stop.clone(), duration));

    tracing::info!(url = %target, profiles = profiles.len(), ?duration, "starting load test");
    let tasks = profiles
        .into_iter()
        .map(|profile| run_profile(target, profile, stop.clone()));
    let result = futures::future::try_join_all(tasks).await;

    // Make sure the timer does not outlive the run.
    stop.cancel();
    bar.finish_and_clear();

    let elapsed = start.elapsed();
    tracing::info!(?elapsed, "load test finished");

    Report::new(elapsed, result?).context("failed to merge metrics")
}

async fn cancel_after(stop: CancellationToken, duration: Duration) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => stop.cancel(),
        _ = stop.cancelled() => {}
    }
}

async fn run_profile(
    target: &str,
    profile: Profile,
    stop: CancellationToken,
) -> Result<ProfileReport> {
    let remote = HttpRemote::new(target, profile.transport, profile.request_timeout)
        .context("failed to build HTTP client")?;
    let profile = Arc::new(profile);

    let mut tasks = Vec::with_capacity(profile.clients);
    for index in 0..profile.clients {
        if let Some(interval) = profile.spawn_interval.filter(|_| index > 0) {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        let client = profile.client(index);
        tasks.push(tokio::spawn(run_client(
            client,
            remote.clone(),
            profile.strict_status,
            stop.clone(),
        )));
    }
    tracing::debug!(profile = profile.name(), clients = tasks.len(), "clients started");

    let (metrics, failed_clients) = join_clients(profile.name(), tasks).await?;

    Ok(ProfileReport {
        name: profile.name.clone(),
        clients: profile.clients,
        failed_clients,
        transport: remote.transport(),
        metrics,
    })
}

/// Waits for all clients and merges their metrics.
///
/// Returns the merged metrics along with the number of clients that panicked or were cancelled,
/// whose metrics are lost.
async fn join_clients(
    profile: &str,
    tasks: Vec<JoinHandle<ProfileMetrics>>,
) -> Result<(ProfileMetrics, usize)> {
    let mut metrics = ProfileMetrics::default();
    let mut failed = 0;

    for task in futures::future::join_all(tasks).await {
        match task {
            Ok(client_metrics) => metrics
                .merge(&client_metrics)
                .context("failed to merge client metrics")?,
            Err(err) => {
                failed += 1;
                tracing::error!(
                    profile,
                    error = &err as &dyn std::error::Error,
                    "simulated client failed"
                );
            }
        }
    }

    Ok((metrics, failed))
}

async fn run_client(
    mut client: SimulatedClient,
    remote: HttpRemote,
    strict: bool,
    stop: CancellationToken,
) -> ProfileMetrics {
    let mut metrics = ProfileMetrics::default();

    while !stop.is_cancelled() {
        let operation = client.next_operation();
        let kind = operation.kind();

        let start = Instant::now();
        let result = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            result = remote.execute(&operation, strict) => result,
        };
        let elapsed = start.elapsed();

        if let Err(err) = &result {
            tracing::debug!(
                client = client.index(),
                operation = %kind,
                error = err as &dyn std::error::Error,
                "request failed"
            );
        }
        metrics.record(kind, elapsed, &result);

        let wait = client.next_wait();
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    metrics
}

#[cfg(test)]
mod tests {
    use crate::operation::OperationKind;

    use super::*;

    #[tokio::test]
    async fn panicked_clients_are_counted() {
        let healthy = tokio::spawn(async {
            let mut metrics = ProfileMetrics::default();
            metrics.record(OperationKind::Health, Duration::from_millis(1), &Ok(()));
            metrics
        });
        let panicked: JoinHandle<ProfileMetrics> =
            tokio::spawn(async { panic!("client crashed") });

        let (metrics, failed) = join_clients("test", vec![healthy, panicked])
            .await
            .unwrap();

        assert_eq!(failed, 1);
        assert_eq!(metrics.requests(), 1);
    }
}
