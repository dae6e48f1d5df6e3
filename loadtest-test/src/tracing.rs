use tracing_subscriber::EnvFilter;

/// Crates whose logs are captured at full verbosity.
const CRATE_NAMES: &[&str] = &["loadtest", "loadtest_test"];

/// Initialize the logger for testing.
///
/// Logs go to the writer captured by the Rust test runner. `RUST_LOG` takes precedence if set,
/// otherwise only the load tester crates are logged at `TRACE` and everything else at `ERROR`.
///
/// # Example
///
/// ```
/// loadtest_test::tracing::init();
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        CRATE_NAMES
            .iter()
            .filter_map(|name| format!("{name}=TRACE").parse().ok())
            .fold(EnvFilter::new("ERROR"), EnvFilter::add_directive)
    });

    tracing_subscriber::fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}
