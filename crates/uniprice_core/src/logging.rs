use std::path::Path;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default directive for a verbosity level given by repeated `-v` flags.
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn,uniprice_app=info,uniprice_chain=info,uniprice_core=info",
        1 => "info,uniprice_app=debug,uniprice_chain=debug,uniprice_core=debug",
        _ => "debug,uniprice_app=trace,uniprice_chain=trace,uniprice_core=trace",
    }
}

/// Initializes console logging on stderr, plus a daily rolling file under
/// `logs_dir` when one is given. `RUST_LOG` overrides `filter`.
///
/// Returns the file writer guard, which must be kept alive until exit.
pub fn init_logging(filter: &str, logs_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let console = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact();

    let (file, guard) = match logs_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, "uniprice");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(false)
                .with_writer(non_blocking);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_levels() {
        assert!(default_filter(0).starts_with("warn"));
        assert!(default_filter(1).contains("uniprice_chain=debug"));
        assert_eq!(default_filter(2), default_filter(7));
    }

    #[test]
    fn test_default_filters_parse() {
        for verbosity in 0..3 {
            let filter = EnvFilter::try_new(default_filter(verbosity));
            assert!(filter.is_ok(), "invalid filter for -v x{verbosity}");
        }
    }

    #[test]
    fn test_init_logging_creates_directory() {
        let tmp = tempfile::tempdir().expect("Failed to create tempdir");
        let logs_dir = tmp.path().join("build").join("cache").join("logs");
        assert!(!logs_dir.exists());

        // The global subscriber can only be installed once per process, so
        // the result may be an error; the directory is created either way.
        let result = init_logging("warn", Some(&logs_dir));
        assert!(logs_dir.exists());

        match result {
            Ok(guard) => assert!(guard.is_some()),
            Err(e) => assert!(e.to_string().contains("logging")),
        }
    }
}
