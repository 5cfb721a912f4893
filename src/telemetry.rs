//! Logging setup
//!
//! Console logging goes to stderr so stdout stays free for streamed text.
//! When a log directory is given, JSON lines are also written to a daily
//! rolling file.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process, or buffered
/// file logs are lost.
pub fn init_tracing(verbose: bool, log_dir: Option<&Path>) -> std::io::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug,hyper=info,reqwest=info,h2=info,rustls=info")
        } else {
            EnvFilter::new("info,hyper=warn,reqwest=warn,h2=warn,rustls=warn")
        }
    });

    // Console output only in verbose mode (no noise between fragments)
    let console = verbose.then(|| {
        fmt::layer()
            .with_target(false)
            .compact()
            .with_writer(std::io::stderr)
    });

    let (file, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, "evalai.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            (Some(fmt::layer().json().with_writer(non_blocking)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .try_init()
        .ok();

    tracing::debug!(verbose, log_dir = ?log_dir, "Tracing initialized");
    Ok(guard)
}
