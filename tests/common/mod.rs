pub mod builders;
pub mod fake_backend;

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Supervisor options tuned for tests: fast polling, no cool-down.
#[allow(dead_code)]
pub fn fast_run_options(max_queued: usize) -> pipedag::config::RunOptions {
    pipedag::config::RunOptions {
        mode: pipedag::config::ExecMode::Background,
        max_queued,
        time_between_checks: 0.01,
        time_cool_down: 0.0,
        flag_verbose: false,
        ..Default::default()
    }
}

/// Initializer options against a mock logs directory, without the verbose
/// chatter.
#[allow(dead_code)]
pub fn quiet_init_options(path_logs: &str) -> pipedag::config::InitOptions {
    let mut opts = pipedag::config::InitOptions::new(path_logs);
    opts.flag_verbose = false;
    opts
}
