use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::core::config::AppPaths;

const LOG_FILE: &str = "server.log";
const LOG_ENV: &str = "DOCQA_LOG";
/// Service logs at `info`; per-statement sqlx logs and hyper connection
/// chatter stay at `warn`.
const DEFAULT_DIRECTIVES: &str = "info,sqlx=warn,hyper=warn,object_store=warn";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs stdout and daily-rolling file logging under `paths.log_dir`.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init(paths: &AppPaths) {
    let log_dir = &paths.log_dir;
    let _ = std::fs::create_dir_all(log_dir);

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    if LOG_GUARD.set(guard).is_err() {
        return;
    }

    let directives = filter_directives(|key| std::env::var(key).ok());
    let env_filter =
        EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(non_blocking);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();
}

/// `DOCQA_LOG` wins over `RUST_LOG`; blank values are ignored.
fn filter_directives<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    [LOG_ENV, "RUST_LOG"]
        .into_iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVES.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_quiet_noisy_crates() {
        let directives = filter_directives(lookup(&[]));
        assert_eq!(directives, DEFAULT_DIRECTIVES);
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn service_variable_overrides_rust_log() {
        let directives = filter_directives(lookup(&[("DOCQA_LOG", "debug"), ("RUST_LOG", "trace")]));
        assert_eq!(directives, "debug");

        let directives = filter_directives(lookup(&[("DOCQA_LOG", "  "), ("RUST_LOG", "warn")]));
        assert_eq!(directives, "warn");
    }
}
